//! Core pipeline for Stratum.
//!
//! This crate ties the store, schema, and runtime crates together into the
//! `Engine`: parse ID mappings, open an image layout under a scoped guard,
//! resolve a tag to exactly one image manifest, synthesize the runtime
//! configuration, and write it atomically to its destination.

pub mod engine;
pub mod guard;
pub mod resolve;
pub mod sink;

pub use engine::{Engine, RuntimeConfigOutcome, RuntimeConfigRequest};
pub use guard::StoreGuard;
pub use resolve::{resolve, ResolveError, Resolved};
pub use sink::write_atomic;

use stratum_runtime::SynthesisError;
use stratum_schema::MappingError;
use stratum_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("cannot resolve '{reference}': {source}")]
    Resolve {
        reference: String,
        #[source]
        source: ResolveError,
    },
    #[error("invalid mapping: {0}")]
    Mapping(#[from] MappingError),
    #[error("runtime config synthesis failed: {0}")]
    Synthesize(#[from] SynthesisError),
    #[error("cannot write '{path}': {source}")]
    Sink {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl CoreError {
    /// Errors caused by the invocation itself rather than the store or host.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, CoreError::Mapping(_))
    }

    /// Errors about the image store's contents or reachability: missing,
    /// ambiguous, unsupported, or corrupt references and blobs.
    pub fn is_store_error(&self) -> bool {
        match self {
            CoreError::Resolve { .. } | CoreError::Store(_) => true,
            CoreError::Synthesize(e) => matches!(
                e,
                SynthesisError::Store(_)
                    | SynthesisError::Corrupt { .. }
                    | SynthesisError::UnsupportedMediaType(_)
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratum_schema::IdKind;

    #[test]
    fn resolve_error_names_reference() {
        let e = CoreError::Resolve {
            reference: "/images/app:v1".to_owned(),
            source: ResolveError::Ambiguous {
                name: "v1".to_owned(),
                count: 2,
            },
        };
        let msg = e.to_string();
        assert!(msg.contains("/images/app:v1"));
        assert!(msg.contains("ambiguous"));
        assert!(e.is_store_error());
        assert!(!e.is_invalid_input());
    }

    #[test]
    fn classification() {
        let mapping = CoreError::Mapping(MappingError::ZeroSize {
            kind: IdKind::Uid,
            directive: "0:1000:0".to_owned(),
        });
        assert!(mapping.is_invalid_input());
        assert!(!mapping.is_store_error());

        let sink = CoreError::Sink {
            path: "/ro/config.json".to_owned(),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(!sink.is_store_error());
        assert!(!sink.is_invalid_input());

        let layer = CoreError::Synthesize(SynthesisError::LayerWalk("x".to_owned()));
        assert!(!layer.is_store_error());
    }
}
