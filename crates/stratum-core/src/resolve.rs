//! Reference Resolver: from a tag to exactly one image manifest.

use oci_spec::image::ImageManifest;
use stratum_schema::DescriptorPath;
use stratum_store::{BlobContent, ContentStore, StoreError, MEDIA_TYPE_IMAGE_INDEX};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("reference '{0}' not found")]
    NotFound(String),
    #[error("reference '{name}' is ambiguous: {count} descriptor paths match")]
    Ambiguous { name: String, count: usize },
    #[error("unsupported media type {0}: only image manifests can be resolved")]
    UnsupportedMediaType(String),
    #[error("corrupt image content: {0}")]
    Corrupt(#[source] StoreError),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ResolveError {
    fn from(e: StoreError) -> Self {
        if e.is_corruption() {
            ResolveError::Corrupt(e)
        } else {
            ResolveError::Store(e)
        }
    }
}

/// A reference resolved to its single descriptor path and decoded manifest.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub path: DescriptorPath,
    pub manifest: ImageManifest,
}

/// Resolve `name` to exactly one image manifest.
///
/// Zero matching paths is `NotFound` and more than one is `Ambiguous`; the
/// resolver never picks among candidates. Only the terminal blob of the single
/// path is fetched.
pub fn resolve<S: ContentStore + ?Sized>(store: &S, name: &str) -> Result<Resolved, ResolveError> {
    let mut paths = store.list_descriptor_paths(name)?;

    let path = match paths.len() {
        0 => return Err(ResolveError::NotFound(name.to_owned())),
        1 => paths.remove(0),
        count => {
            return Err(ResolveError::Ambiguous {
                name: name.to_owned(),
                count,
            })
        }
    };

    let blob = store.fetch_blob(path.descriptor())?;
    let manifest = match blob.decode()? {
        BlobContent::Manifest(manifest) => manifest,
        BlobContent::Index(_) => {
            return Err(ResolveError::UnsupportedMediaType(
                MEDIA_TYPE_IMAGE_INDEX.to_owned(),
            ))
        }
        BlobContent::Unsupported(media_type) => {
            return Err(ResolveError::UnsupportedMediaType(media_type))
        }
    };

    debug!(
        "reference '{name}' resolved to manifest {} with {} layer(s)",
        blob.digest.short(),
        manifest.layers().len()
    );
    Ok(Resolved { path, manifest })
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratum_store::{MemoryStore, MEDIA_TYPE_IMAGE_CONFIG, MEDIA_TYPE_IMAGE_MANIFEST};

    fn manifest_bytes(marker: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "schemaVersion": 2,
            "mediaType": MEDIA_TYPE_IMAGE_MANIFEST,
            "config": {
                "mediaType": MEDIA_TYPE_IMAGE_CONFIG,
                "digest": format!("sha256:{}", "c".repeat(64)),
                "size": 2,
            },
            "layers": [],
            "annotations": { "marker": marker },
        }))
        .unwrap()
    }

    #[test]
    fn not_found_fetches_nothing() {
        let mut store = MemoryStore::new();
        let m = store
            .put_blob(MEDIA_TYPE_IMAGE_MANIFEST, &manifest_bytes("a"))
            .unwrap();
        store.add_reference("latest", &m).unwrap();

        match resolve(&store, "v9") {
            Err(ResolveError::NotFound(name)) => assert_eq!(name, "v9"),
            other => panic!("expected NotFound, got {other:?}"),
        }
        assert_eq!(store.fetch_count(), 0);
    }

    #[test]
    fn ambiguous_never_picks() {
        let mut store = MemoryStore::new();
        let a = store
            .put_blob(MEDIA_TYPE_IMAGE_MANIFEST, &manifest_bytes("a"))
            .unwrap();
        let b = store
            .put_blob(MEDIA_TYPE_IMAGE_MANIFEST, &manifest_bytes("b"))
            .unwrap();
        store.add_reference("v1", &a).unwrap();
        store.add_reference("v1", &b).unwrap();

        match resolve(&store, "v1") {
            Err(ResolveError::Ambiguous { name, count }) => {
                assert_eq!(name, "v1");
                assert_eq!(count, 2);
            }
            other => panic!("expected Ambiguous, got {other:?}"),
        }
        assert_eq!(store.fetch_count(), 0);
    }

    #[test]
    fn single_manifest_resolves() {
        let mut store = MemoryStore::new();
        let m = store
            .put_blob(MEDIA_TYPE_IMAGE_MANIFEST, &manifest_bytes("a"))
            .unwrap();
        store.add_reference("latest", &m).unwrap();

        let resolved = resolve(&store, "latest").unwrap();
        assert_eq!(resolved.path.descriptor().digest(), m.digest());
        assert!(resolved.manifest.layers().is_empty());
        assert_eq!(store.fetch_count(), 1);
    }

    #[test]
    fn unsupported_media_type_is_preserved() {
        let mut store = MemoryStore::new();
        let c = store.put_blob(MEDIA_TYPE_IMAGE_CONFIG, b"{}").unwrap();
        store.add_reference("cfg", &c).unwrap();

        match resolve(&store, "cfg") {
            Err(ResolveError::UnsupportedMediaType(mt)) => assert_eq!(mt, MEDIA_TYPE_IMAGE_CONFIG),
            other => panic!("expected UnsupportedMediaType, got {other:?}"),
        }
    }

    #[test]
    fn malformed_manifest_is_corrupt_not_unsupported() {
        let mut store = MemoryStore::new();
        let m = store
            .put_blob(MEDIA_TYPE_IMAGE_MANIFEST, br#"{"schemaVersion":2}"#)
            .unwrap();
        store.add_reference("bad", &m).unwrap();

        assert!(matches!(
            resolve(&store, "bad"),
            Err(ResolveError::Corrupt(_))
        ));
    }

    #[test]
    fn closed_store_is_a_store_error() {
        let mut store = MemoryStore::new();
        store.close().unwrap();
        assert!(matches!(
            resolve(&store, "latest"),
            Err(ResolveError::Store(StoreError::Closed))
        ));
    }
}
