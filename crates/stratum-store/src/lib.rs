//! Content-addressable OCI image-layout access for Stratum.
//!
//! This crate provides the storage boundary the pipeline reads through: the
//! `ContentStore` trait (descriptor-path listing, verified blob fetches, and
//! explicit close), `LayoutStore` for on-disk OCI image layouts, `MemoryStore`
//! as an in-memory double, `LayoutWriter` for producing layouts, and the
//! media-type-tagged `BlobContent` decoding step.

pub mod blobs;
pub mod layout;
pub mod media;
pub mod mock;
pub mod refs;
pub mod writer;

pub use blobs::{descriptor_digest, verify_blob, Blob, BlobContent};
pub use layout::{LayoutStore, IMAGE_LAYOUT_VERSION};
pub use media::{
    is_layer_media_type, ANNOTATION_REF_NAME, MEDIA_TYPE_IMAGE_CONFIG, MEDIA_TYPE_IMAGE_INDEX,
    MEDIA_TYPE_IMAGE_MANIFEST, MEDIA_TYPE_LAYER_GZIP, MEDIA_TYPE_LAYER_TAR, MEDIA_TYPE_LAYER_ZSTD,
};
pub use mock::MemoryStore;
pub use refs::{list_references, resolve_descriptor_paths, MAX_INDEX_DEPTH};
pub use writer::LayoutWriter;

use oci_spec::image::{Descriptor, ImageIndex};
use stratum_schema::{DescriptorPath, DigestError};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not an OCI image layout at {path}: {reason}")]
    NotALayout { path: String, reason: String },
    #[error("unsupported image layout version: expected {expected}, found {found}")]
    VersionMismatch { expected: String, found: String },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid digest: {0}")]
    InvalidDigest(#[from] DigestError),
    #[error("unsupported digest algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("blob not found: {0}")]
    BlobNotFound(String),
    #[error("blob '{digest}' has negative or oversized size {size}")]
    InvalidSize { digest: String, size: String },
    #[error("blob '{digest}' size mismatch: descriptor says {expected}, blob has {actual}")]
    SizeMismatch {
        digest: String,
        expected: u64,
        actual: u64,
    },
    #[error("blob '{digest}' failed verification: content hashes to {actual}")]
    DigestMismatch { digest: String, actual: String },
    #[error("malformed {media_type} blob '{digest}': {reason}")]
    Malformed {
        digest: String,
        media_type: String,
        reason: String,
    },
    #[error("store handle is closed")]
    Closed,
}

impl StoreError {
    /// True for errors that mean the stored content itself is bad, as opposed
    /// to the store being unreachable or misused.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            StoreError::SizeMismatch { .. }
                | StoreError::DigestMismatch { .. }
                | StoreError::Malformed { .. }
                | StoreError::InvalidSize { .. }
                | StoreError::InvalidDigest(_)
        )
    }
}

/// Read-only access to a content-addressable image store.
///
/// Implementations hold whatever the store needs while open; callers must
/// call [`close`](Self::close) when done, on every exit path.
pub trait ContentStore {
    /// The store's root index.
    fn index(&self) -> Result<&ImageIndex, StoreError>;

    /// Fetch and verify the blob a descriptor points to.
    fn fetch_blob(&self, descriptor: &Descriptor) -> Result<Blob, StoreError>;

    /// Release the handle. Further calls fail with [`StoreError::Closed`].
    fn close(&mut self) -> Result<(), StoreError>;

    /// Every descriptor path reachable from index entries tagged `name`.
    fn list_descriptor_paths(&self, name: &str) -> Result<Vec<DescriptorPath>, StoreError> {
        resolve_descriptor_paths(self, name)
    }

    /// Sorted, de-duplicated reference names present in the root index.
    fn list_references(&self) -> Result<Vec<String>, StoreError> {
        Ok(list_references(self.index()?))
    }
}

/// Fsync a directory so that a preceding `rename()` is durable.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

/// Build a descriptor from its parts. Goes through serde so it stays
/// independent of the builder API of the OCI types crate.
pub fn make_descriptor(
    media_type: &str,
    digest: &str,
    size: u64,
    ref_name: Option<&str>,
) -> Result<Descriptor, StoreError> {
    let mut value = serde_json::json!({
        "mediaType": media_type,
        "digest": digest,
        "size": size,
    });
    if let Some(name) = ref_name {
        let mut annotations = serde_json::Map::new();
        annotations.insert(ANNOTATION_REF_NAME.to_owned(), name.into());
        value["annotations"] = serde_json::Value::Object(annotations);
    }
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_display_blob_not_found() {
        let e = StoreError::BlobNotFound("sha256:abc".to_owned());
        assert!(e.to_string().contains("sha256:abc"));
    }

    #[test]
    fn store_error_display_version_mismatch() {
        let e = StoreError::VersionMismatch {
            expected: "1.0.0".to_owned(),
            found: "2.0.0".to_owned(),
        };
        let msg = e.to_string();
        assert!(msg.contains("1.0.0"));
        assert!(msg.contains("2.0.0"));
    }

    #[test]
    fn store_error_display_malformed() {
        let e = StoreError::Malformed {
            digest: "sha256:abc".to_owned(),
            media_type: MEDIA_TYPE_IMAGE_MANIFEST.to_owned(),
            reason: "missing field `layers`".to_owned(),
        };
        let msg = e.to_string();
        assert!(msg.contains("layers"));
        assert!(msg.contains("manifest"));
    }

    #[test]
    fn corruption_classification() {
        assert!(StoreError::DigestMismatch {
            digest: "d".to_owned(),
            actual: "a".to_owned()
        }
        .is_corruption());
        assert!(!StoreError::Closed.is_corruption());
        assert!(!StoreError::BlobNotFound("d".to_owned()).is_corruption());
    }

    #[test]
    fn make_descriptor_with_ref_name() {
        let digest = format!("sha256:{}", "e".repeat(64));
        let d = make_descriptor(MEDIA_TYPE_IMAGE_MANIFEST, &digest, 42, Some("v1")).unwrap();
        assert_eq!(d.media_type().to_string(), MEDIA_TYPE_IMAGE_MANIFEST);
        assert_eq!(d.digest().to_string(), digest);
        assert_eq!(refs::ref_name(&d), Some("v1"));
    }
}
