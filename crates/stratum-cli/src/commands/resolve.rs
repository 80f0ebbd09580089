use super::{describe, invalid_argument, json_pretty, EXIT_SUCCESS};
use crate::config::Settings;
use stratum_core::Engine;
use stratum_schema::ImageRef;

pub fn run(engine: &Engine, settings: &Settings, image: &str, json: bool) -> Result<u8, String> {
    let image = ImageRef::parse(image, settings.default_tag()).map_err(invalid_argument)?;
    let resolved = engine
        .resolve_reference(&image)
        .map_err(|e| describe(&e))?;

    if json {
        let out = serde_json::json!({
            "reference": image.to_string(),
            "descriptor_path": resolved.path,
            "layers": resolved.manifest.layers().len(),
        });
        println!("{}", json_pretty(&out)?);
    } else {
        println!("{}", resolved.path);
    }
    Ok(EXIT_SUCCESS)
}
