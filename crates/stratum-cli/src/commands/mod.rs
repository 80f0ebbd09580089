pub mod completions;
pub mod man_pages;
pub mod resolve;
pub mod runtime_config;
pub mod tags;

use stratum_core::CoreError;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_INVALID_ARGS: u8 = 2;
pub const EXIT_STORE_ERROR: u8 = 3;

/// Message prefixes the exit code is derived from.
pub const INVALID_ARGUMENT: &str = "invalid argument:";
pub const STORE_ERROR: &str = "store error:";

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn invalid_argument(msg: impl std::fmt::Display) -> String {
    format!("{INVALID_ARGUMENT} {msg}")
}

/// Render a core error with the prefix its exit code is chosen by.
pub fn describe(e: &CoreError) -> String {
    let msg = e.to_string();
    if e.is_invalid_input() {
        invalid_argument(msg)
    } else if e.is_store_error() && !msg.starts_with(STORE_ERROR) {
        format!("{STORE_ERROR} {msg}")
    } else {
        msg
    }
}
