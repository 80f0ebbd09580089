//! Runtime configuration synthesis for Stratum.
//!
//! This crate turns a resolved image manifest into an OCI runtime
//! configuration document without unpacking any layer: the layer sequence is
//! walked and validated, the image configuration is applied over a default
//! Linux template, and an optional already-unpacked root filesystem is
//! consulted for user, group, and volume ownership. ID mappings are applied
//! last, and any identifier outside the configured ranges is rejected.

pub mod document;
pub mod generate;
pub mod layers;
pub mod rootfs;
pub mod user;

pub use document::{
    Capabilities, DeviceRule, Linux, Mount, Namespace, NamespaceKind, Process, Resources, Rlimit,
    Root, RuntimeConfig, RuntimeUser, OCI_RUNTIME_VERSION,
};
pub use generate::{synthesize, to_bytes, write_runtime_config, Synthesis};
pub use layers::{walk_layers, LayerEntry};
pub use rootfs::Rootfs;
pub use user::{resolve_exec_user, ExecUser};

use stratum_schema::{IdKind, MetaError};
use stratum_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("unsupported media type for image configuration: {0}")]
    UnsupportedMediaType(String),
    #[error("corrupt image configuration '{digest}': {reason}")]
    Corrupt { digest: String, reason: String },
    #[error("layer walk failed: {0}")]
    LayerWalk(String),
    #[error("root filesystem '{path}' is unavailable: {reason}")]
    SecondaryFsUnavailable { path: String, reason: String },
    #[error("{kind} {id} ({context}) is outside the configured {kind} mappings")]
    MappingApplication {
        kind: IdKind,
        id: u32,
        context: String,
    },
    #[error(transparent)]
    Meta(#[from] MetaError),
    #[error("cannot resolve user: {0}")]
    UnresolvableUser(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("runtime config I/O error: {0}")]
    Io(#[from] std::io::Error),
}
