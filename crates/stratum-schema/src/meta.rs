//! Versioned envelope carrying one resolution result into synthesis.

use crate::idmap::MapOptions;
use crate::path::DescriptorPath;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Envelope schema version understood by this build. Anything else is refused.
pub const META_VERSION: &str = "2";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetaError {
    #[error("metadata version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: String, found: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    pub version: String,
    #[serde(rename = "from_descriptor_path")]
    pub from: DescriptorPath,
    pub map_options: MapOptions,
}

impl Meta {
    pub fn new(from: DescriptorPath, map_options: MapOptions) -> Self {
        Self {
            version: META_VERSION.to_owned(),
            from,
            map_options,
        }
    }

    /// Fail closed on any version other than [`META_VERSION`], newer ones included.
    pub fn verify_version(&self) -> Result<(), MetaError> {
        if self.version != META_VERSION {
            return Err(MetaError::VersionMismatch {
                expected: META_VERSION.to_owned(),
                found: self.version.clone(),
            });
        }
        Ok(())
    }
}
