use crate::blobs::{verify_blob, Blob};
use crate::{ContentStore, StoreError};
use oci_spec::image::{Descriptor, ImageIndex};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use stratum_schema::Digest;
use tracing::debug;

/// The only `imageLayoutVersion` this store reads and writes.
pub const IMAGE_LAYOUT_VERSION: &str = "1.0.0";

pub(crate) const LAYOUT_FILE: &str = "oci-layout";
pub(crate) const INDEX_FILE: &str = "index.json";
pub(crate) const BLOBS_DIR: &str = "blobs";

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct LayoutMarker {
    #[serde(rename = "imageLayoutVersion")]
    pub(crate) image_layout_version: String,
}

/// A read-only handle on an OCI image layout directory.
///
/// Opening checks the `oci-layout` marker, loads `index.json`, and requires
/// a `blobs/` directory. Every blob read is verified against its descriptor.
#[derive(Debug)]
pub struct LayoutStore {
    root: PathBuf,
    index: ImageIndex,
    closed: bool,
}

impl LayoutStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        let not_a_layout = |reason: String| StoreError::NotALayout {
            path: root.display().to_string(),
            reason,
        };

        if !root.is_dir() {
            return Err(not_a_layout("not a directory".to_owned()));
        }

        let marker_path = root.join(LAYOUT_FILE);
        let marker = match fs::read(&marker_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(not_a_layout(format!("missing {LAYOUT_FILE} file")));
            }
            Err(e) => return Err(e.into()),
        };
        let marker: LayoutMarker = serde_json::from_slice(&marker)
            .map_err(|e| not_a_layout(format!("invalid {LAYOUT_FILE} file: {e}")))?;
        if marker.image_layout_version != IMAGE_LAYOUT_VERSION {
            return Err(StoreError::VersionMismatch {
                expected: IMAGE_LAYOUT_VERSION.to_owned(),
                found: marker.image_layout_version,
            });
        }

        if !root.join(BLOBS_DIR).is_dir() {
            return Err(not_a_layout(format!("missing {BLOBS_DIR}/ directory")));
        }

        let index_bytes = match fs::read(root.join(INDEX_FILE)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(not_a_layout(format!("missing {INDEX_FILE}")));
            }
            Err(e) => return Err(e.into()),
        };
        let index: ImageIndex = serde_json::from_slice(&index_bytes)
            .map_err(|e| not_a_layout(format!("invalid {INDEX_FILE}: {e}")))?;

        debug!(
            "opened image layout at {} ({} index entries)",
            root.display(),
            index.manifests().len()
        );
        Ok(Self {
            root,
            index,
            closed: false,
        })
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the blob for `digest` lives: `blobs/<algorithm>/<encoded>`.
    #[inline]
    pub fn blob_path(&self, digest: &Digest) -> PathBuf {
        self.root
            .join(BLOBS_DIR)
            .join(digest.algorithm())
            .join(digest.encoded())
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

impl ContentStore for LayoutStore {
    fn index(&self) -> Result<&ImageIndex, StoreError> {
        self.ensure_open()?;
        Ok(&self.index)
    }

    fn fetch_blob(&self, descriptor: &Descriptor) -> Result<Blob, StoreError> {
        self.ensure_open()?;
        // Parsing first keeps malformed digests from ever reaching the filesystem.
        let digest = Digest::parse(&descriptor.digest().to_string())?;
        let path = self.blob_path(&digest);

        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::BlobNotFound(digest.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let digest = verify_blob(descriptor, &data)?;

        Ok(Blob {
            descriptor: descriptor.clone(),
            digest,
            media_type: descriptor.media_type().to_string(),
            data,
        })
    }

    fn close(&mut self) -> Result<(), StoreError> {
        if !self.closed {
            debug!("closing image layout at {}", self.root.display());
            self.closed = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MEDIA_TYPE_IMAGE_CONFIG;
    use crate::writer::LayoutWriter;

    #[test]
    fn open_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let err = LayoutStore::open(dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, StoreError::NotALayout { .. }));
    }

    #[test]
    fn open_without_marker() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join(BLOBS_DIR)).unwrap();
        fs::write(dir.path().join(INDEX_FILE), r#"{"schemaVersion":2,"manifests":[]}"#).unwrap();
        let err = LayoutStore::open(dir.path()).unwrap_err();
        assert!(err.to_string().contains(LAYOUT_FILE));
    }

    #[test]
    fn open_wrong_version() {
        let dir = tempfile::tempdir().unwrap();
        LayoutWriter::create(dir.path()).unwrap();
        fs::write(
            dir.path().join(LAYOUT_FILE),
            r#"{"imageLayoutVersion":"2.0.0"}"#,
        )
        .unwrap();
        assert!(matches!(
            LayoutStore::open(dir.path()),
            Err(StoreError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn open_without_index() {
        let dir = tempfile::tempdir().unwrap();
        LayoutWriter::create(dir.path()).unwrap();
        fs::remove_file(dir.path().join(INDEX_FILE)).unwrap();
        let err = LayoutStore::open(dir.path()).unwrap_err();
        assert!(err.to_string().contains(INDEX_FILE));
    }

    #[test]
    fn open_without_blobs_dir() {
        let dir = tempfile::tempdir().unwrap();
        LayoutWriter::create(dir.path()).unwrap();
        fs::remove_dir_all(dir.path().join(BLOBS_DIR)).unwrap();
        assert!(matches!(
            LayoutStore::open(dir.path()),
            Err(StoreError::NotALayout { .. })
        ));
    }

    #[test]
    fn blob_path_layout() {
        let dir = tempfile::tempdir().unwrap();
        LayoutWriter::create(dir.path()).unwrap();
        let store = LayoutStore::open(dir.path()).unwrap();
        let digest = Digest::parse(&format!("sha256:{}", "c".repeat(64))).unwrap();
        assert_eq!(
            store.blob_path(&digest),
            dir.path().join("blobs").join("sha256").join("c".repeat(64))
        );
    }

    #[test]
    fn fetch_verifies_content() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = LayoutWriter::create(dir.path()).unwrap();
        let d = writer.put_blob(MEDIA_TYPE_IMAGE_CONFIG, b"{}").unwrap();

        let store = LayoutStore::open(dir.path()).unwrap();
        assert_eq!(store.fetch_blob(&d).unwrap().data, b"{}");

        let digest = Digest::parse(&d.digest().to_string()).unwrap();
        fs::write(store.blob_path(&digest), b"[]").unwrap();
        let err = store.fetch_blob(&d).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn fetch_missing_blob() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = LayoutWriter::create(dir.path()).unwrap();
        let d = writer.put_blob(MEDIA_TYPE_IMAGE_CONFIG, b"{}").unwrap();
        let store = LayoutStore::open(dir.path()).unwrap();

        let digest = Digest::parse(&d.digest().to_string()).unwrap();
        fs::remove_file(store.blob_path(&digest)).unwrap();
        assert!(matches!(
            store.fetch_blob(&d),
            Err(StoreError::BlobNotFound(_))
        ));
    }

    #[test]
    fn close_is_idempotent_and_final() {
        let dir = tempfile::tempdir().unwrap();
        LayoutWriter::create(dir.path()).unwrap();
        let mut store = LayoutStore::open(dir.path()).unwrap();
        store.close().unwrap();
        store.close().unwrap();
        assert!(matches!(store.index(), Err(StoreError::Closed)));
    }
}
