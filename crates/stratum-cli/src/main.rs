mod commands;
mod config;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::runtime_config::RuntimeConfigArgs;
use commands::{EXIT_FAILURE, EXIT_INVALID_ARGS, EXIT_STORE_ERROR};
use config::Settings;
use std::path::PathBuf;
use std::process::ExitCode;
use stratum_core::Engine;

#[derive(Debug, Parser)]
#[command(
    name = "stratum",
    version,
    about = "Resolve tagged images in OCI image layouts and generate OCI runtime configurations"
)]
struct Cli {
    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    /// Settings file (default: $XDG_CONFIG_HOME/stratum/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Generate an OCI runtime configuration for a tagged image.
    #[command(visible_alias = "config")]
    RuntimeConfig(RuntimeConfigArgs),
    /// Resolve a tagged image and print its descriptor path.
    Resolve {
        /// Image layout and tag, as <path>[:<tag>].
        #[arg(long)]
        image: String,
    },
    /// List the reference names tagged in an image layout.
    Tags {
        /// Path to the OCI image layout.
        #[arg(long)]
        layout: PathBuf,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("STRATUM_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let engine = Engine::new();
    let json_output = cli.json;

    let result = Settings::resolve(cli.config.as_deref()).and_then(|settings| match cli.command {
        Commands::RuntimeConfig(args) => {
            commands::runtime_config::run(&engine, &settings, &args, json_output)
        }
        Commands::Resolve { image } => {
            commands::resolve::run(&engine, &settings, &image, json_output)
        }
        Commands::Tags { layout } => commands::tags::run(&engine, &layout, json_output),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        Commands::ManPages { dir } => commands::man_pages::run::<Cli>(&dir),
    });

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with(commands::INVALID_ARGUMENT) {
                EXIT_INVALID_ARGS
            } else if msg.starts_with(commands::STORE_ERROR) {
                EXIT_STORE_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}
