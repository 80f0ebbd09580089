//! Validation of a manifest's layer sequence without reading layer content.

use crate::SynthesisError;
use oci_spec::image::ImageManifest;
use serde::Serialize;
use stratum_schema::Digest;
use stratum_store::{descriptor_digest, is_layer_media_type};

/// One layer in apply order. Later entries override earlier ones on path conflicts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerEntry {
    pub index: usize,
    pub digest: Digest,
    pub diff_id: Digest,
    pub media_type: String,
    pub size: u64,
}

/// Walk `manifest.layers` bottom to top, pairing each with its uncompressed
/// `diff_id` from the image configuration.
pub fn walk_layers(
    manifest: &ImageManifest,
    diff_ids: &[String],
) -> Result<Vec<LayerEntry>, SynthesisError> {
    let layers = manifest.layers();
    if layers.len() != diff_ids.len() {
        return Err(SynthesisError::LayerWalk(format!(
            "manifest lists {} layers but the image configuration has {} diff_ids",
            layers.len(),
            diff_ids.len()
        )));
    }

    layers
        .iter()
        .zip(diff_ids)
        .enumerate()
        .map(|(index, (layer, diff_id))| {
            let media_type = layer.media_type().to_string();
            if !is_layer_media_type(&media_type) {
                return Err(SynthesisError::LayerWalk(format!(
                    "layer {index} has non-layer media type {media_type}"
                )));
            }
            let (digest, size) = descriptor_digest(layer)
                .map_err(|e| SynthesisError::LayerWalk(format!("layer {index}: {e}")))?;
            let diff_id = Digest::parse(diff_id)
                .map_err(|e| SynthesisError::LayerWalk(format!("layer {index} diff_id: {e}")))?;

            Ok(LayerEntry {
                index,
                digest,
                diff_id,
                media_type,
                size,
            })
        })
        .collect()
}
