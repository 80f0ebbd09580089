use super::{describe, invalid_argument, json_pretty, EXIT_SUCCESS};
use crate::config::Settings;
use clap::Args;
use std::path::PathBuf;
use stratum_core::{Engine, RuntimeConfigRequest};
use stratum_schema::ImageRef;

#[derive(Debug, Args)]
pub struct RuntimeConfigArgs {
    /// Image layout and tag, as <path>[:<tag>].
    #[arg(long)]
    pub image: String,

    /// Directory holding the image's unpacked root filesystem. Users, groups,
    /// and volume ownership are read from it instead of the image defaults.
    #[arg(long)]
    pub rootfs: Option<PathBuf>,

    /// User ID mapping <container:host[:size]>. Repeatable.
    #[arg(long = "uid-map", value_name = "MAP")]
    pub uid_map: Vec<String>,

    /// Group ID mapping <container:host[:size]>. Repeatable.
    #[arg(long = "gid-map", value_name = "MAP")]
    pub gid_map: Vec<String>,

    /// Generate a configuration suitable for an unprivileged user.
    #[arg(long, default_value_t = false)]
    pub rootless: bool,

    /// Where to write the runtime configuration.
    pub output: PathBuf,
}

impl RuntimeConfigArgs {
    pub fn request(&self, settings: &Settings) -> Result<RuntimeConfigRequest, String> {
        let image = ImageRef::parse(&self.image, settings.default_tag()).map_err(invalid_argument)?;
        Ok(RuntimeConfigRequest {
            image,
            rootfs: self.rootfs.clone(),
            output: self.output.clone(),
            uid_map: settings.uid_map(&self.uid_map),
            gid_map: settings.gid_map(&self.gid_map),
            rootless: settings.rootless(self.rootless),
        })
    }
}

pub fn run(
    engine: &Engine,
    settings: &Settings,
    args: &RuntimeConfigArgs,
    json: bool,
) -> Result<u8, String> {
    let request = args.request(settings)?;
    let outcome = engine
        .generate_runtime_config(&request)
        .map_err(|e| describe(&e))?;

    if json {
        println!("{}", json_pretty(&outcome)?);
    } else {
        println!(
            "wrote {} ({} bytes, {} layers) for {}",
            outcome.output.display(),
            outcome.bytes,
            outcome.layers.len(),
            outcome.reference
        );
        println!("manifest: {}", outcome.descriptor_path.descriptor().digest());
    }
    Ok(EXIT_SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> RuntimeConfigArgs {
        RuntimeConfigArgs {
            image: "/srv/images/app".to_owned(),
            rootfs: None,
            uid_map: Vec::new(),
            gid_map: Vec::new(),
            rootless: false,
            output: PathBuf::from("config.json"),
        }
    }

    #[test]
    fn settings_supply_tag_and_maps() {
        let settings = Settings {
            default_tag: Some("stable".to_owned()),
            uid_map: vec!["0:1000:1".to_owned()],
            rootless: true,
            ..Settings::default()
        };
        let req = args().request(&settings).unwrap();
        assert_eq!(req.image.tag.as_str(), "stable");
        assert_eq!(req.uid_map, vec!["0:1000:1".to_owned()]);
        assert!(req.rootless);
    }

    #[test]
    fn explicit_tag_wins() {
        let mut a = args();
        a.image = "/srv/images/app:v1".to_owned();
        let settings = Settings {
            default_tag: Some("stable".to_owned()),
            ..Settings::default()
        };
        let req = a.request(&settings).unwrap();
        assert_eq!(req.image.tag.as_str(), "v1");
    }

    #[test]
    fn bad_reference_is_invalid_argument() {
        let mut a = args();
        a.image = "/srv/images/app:".to_owned();
        let err = a.request(&Settings::default()).unwrap_err();
        assert!(err.starts_with("invalid argument:"));
    }
}
