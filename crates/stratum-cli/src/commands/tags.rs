use super::{describe, json_pretty, EXIT_SUCCESS};
use std::path::Path;
use stratum_core::Engine;

pub fn run(engine: &Engine, layout: &Path, json: bool) -> Result<u8, String> {
    let tags = engine.list_tags(layout).map_err(|e| describe(&e))?;
    if json {
        println!("{}", json_pretty(&serde_json::json!({ "tags": tags }))?);
    } else if tags.is_empty() {
        println!("no tags found in {}", layout.display());
    } else {
        for tag in &tags {
            println!("{tag}");
        }
    }
    Ok(EXIT_SUCCESS)
}
