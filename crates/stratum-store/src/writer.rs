use crate::blobs::{descriptor_digest, hash_hex};
use crate::layout::{LayoutMarker, BLOBS_DIR, IMAGE_LAYOUT_VERSION, INDEX_FILE, LAYOUT_FILE};
use crate::media::MEDIA_TYPE_IMAGE_INDEX;
use crate::{make_descriptor, StoreError};
use oci_spec::image::Descriptor;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Produces OCI image layouts: sha256 blobs plus tagged root index entries.
///
/// Every file is written to a temporary sibling and renamed into place, so a
/// reader never observes a partially written blob or index.
#[derive(Debug)]
pub struct LayoutWriter {
    root: PathBuf,
    entries: Vec<Descriptor>,
}

impl LayoutWriter {
    /// Initialize an empty layout at `root`, creating the directory if needed.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(root.join(BLOBS_DIR).join("sha256"))?;

        let marker = LayoutMarker {
            image_layout_version: IMAGE_LAYOUT_VERSION.to_owned(),
        };
        write_atomic(&root, &root.join(LAYOUT_FILE), &serde_json::to_vec(&marker)?)?;

        let writer = Self {
            root,
            entries: Vec::new(),
        };
        writer.write_index()?;
        Ok(writer)
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store raw bytes as a blob and return the descriptor pointing at them.
    pub fn put_blob(&mut self, media_type: &str, data: &[u8]) -> Result<Descriptor, StoreError> {
        let encoded = hash_hex("sha256", data)
            .ok_or_else(|| StoreError::UnsupportedAlgorithm("sha256".to_owned()))?;
        let dir = self.root.join(BLOBS_DIR).join("sha256");
        let path = dir.join(&encoded);

        if !path.exists() {
            write_atomic(&dir, &path, data)?;
        }
        debug!("wrote blob sha256:{} ({} bytes)", &encoded[..12], data.len());
        make_descriptor(media_type, &format!("sha256:{encoded}"), data.len() as u64, None)
    }

    /// Serialize `value` as compact JSON and store it as a blob.
    pub fn put_json<T: Serialize>(
        &mut self,
        media_type: &str,
        value: &T,
    ) -> Result<Descriptor, StoreError> {
        let data = serde_json::to_vec(value)?;
        self.put_blob(media_type, &data)
    }

    /// Append a root index entry tagging `descriptor` as `name`.
    pub fn add_reference(&mut self, name: &str, descriptor: &Descriptor) -> Result<(), StoreError> {
        let (digest, size) = descriptor_digest(descriptor)?;
        let entry = make_descriptor(
            &descriptor.media_type().to_string(),
            &digest.to_string(),
            size,
            Some(name),
        )?;
        self.entries.push(entry);
        self.write_index()
    }

    fn write_index(&self) -> Result<(), StoreError> {
        let index = serde_json::json!({
            "schemaVersion": 2,
            "mediaType": MEDIA_TYPE_IMAGE_INDEX,
            "manifests": self.entries,
        });
        write_atomic(
            &self.root,
            &self.root.join(INDEX_FILE),
            &serde_json::to_vec_pretty(&index)?,
        )
    }
}

fn write_atomic(dir: &Path, path: &Path, data: &[u8]) -> Result<(), StoreError> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    crate::fsync_dir(dir)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MEDIA_TYPE_IMAGE_CONFIG;

    #[test]
    fn create_writes_marker_and_empty_index() {
        let dir = tempfile::tempdir().unwrap();
        LayoutWriter::create(dir.path()).unwrap();

        let marker = fs::read_to_string(dir.path().join(LAYOUT_FILE)).unwrap();
        assert!(marker.contains(IMAGE_LAYOUT_VERSION));
        let index: serde_json::Value =
            serde_json::from_slice(&fs::read(dir.path().join(INDEX_FILE)).unwrap()).unwrap();
        assert_eq!(index["manifests"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn put_blob_is_content_addressed() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = LayoutWriter::create(dir.path()).unwrap();
        let a = writer.put_blob(MEDIA_TYPE_IMAGE_CONFIG, b"{}").unwrap();
        let b = writer.put_blob(MEDIA_TYPE_IMAGE_CONFIG, b"{}").unwrap();
        assert_eq!(a.digest(), b.digest());

        let files = fs::read_dir(dir.path().join("blobs").join("sha256"))
            .unwrap()
            .count();
        assert_eq!(files, 1);
    }

    #[test]
    fn put_json_is_compact() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = LayoutWriter::create(dir.path()).unwrap();
        let d = writer
            .put_json(MEDIA_TYPE_IMAGE_CONFIG, &serde_json::json!({"a": 1}))
            .unwrap();
        let size = serde_json::to_value(&d).unwrap()["size"].as_u64().unwrap();
        assert_eq!(size, br#"{"a":1}"#.len() as u64);
    }

    #[test]
    fn add_reference_persists_tag() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = LayoutWriter::create(dir.path()).unwrap();
        let d = writer.put_blob(MEDIA_TYPE_IMAGE_CONFIG, b"{}").unwrap();
        writer.add_reference("v1", &d).unwrap();

        let raw = fs::read_to_string(dir.path().join(INDEX_FILE)).unwrap();
        assert!(raw.contains("org.opencontainers.image.ref.name"));
        assert!(raw.contains("\"v1\""));
    }
}
