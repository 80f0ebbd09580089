use crate::blobs::{descriptor_digest, hash_hex, verify_blob, Blob};
use crate::media::MEDIA_TYPE_IMAGE_INDEX;
use crate::{make_descriptor, ContentStore, StoreError};
use oci_spec::image::{Descriptor, ImageIndex};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory content store. Blobs are verified on fetch exactly like the
/// on-disk layout, and every fetch is counted so callers can assert which
/// operations touched blob content.
pub struct MemoryStore {
    blobs: HashMap<String, Vec<u8>>,
    entries: Vec<Descriptor>,
    index: ImageIndex,
    fetches: AtomicUsize,
    closed: bool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            blobs: HashMap::new(),
            entries: Vec::new(),
            index: build_index(&[]).unwrap_or_default(),
            fetches: AtomicUsize::new(0),
            closed: false,
        }
    }
}

fn build_index(entries: &[Descriptor]) -> Result<ImageIndex, StoreError> {
    Ok(serde_json::from_value(serde_json::json!({
        "schemaVersion": 2,
        "mediaType": MEDIA_TYPE_IMAGE_INDEX,
        "manifests": entries,
    }))?)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `data` under its sha256 digest and return a descriptor for it.
    pub fn put_blob(&mut self, media_type: &str, data: &[u8]) -> Result<Descriptor, StoreError> {
        let encoded = hash_hex("sha256", data)
            .ok_or_else(|| StoreError::UnsupportedAlgorithm("sha256".to_owned()))?;
        let digest = format!("sha256:{encoded}");
        self.blobs.insert(digest.clone(), data.to_vec());
        make_descriptor(media_type, &digest, data.len() as u64, None)
    }

    /// Append a root index entry for `descriptor` tagged `name`. Existing
    /// entries with the same name are kept, as the image layout allows.
    pub fn add_reference(&mut self, name: &str, descriptor: &Descriptor) -> Result<(), StoreError> {
        let (digest, size) = descriptor_digest(descriptor)?;
        let entry = make_descriptor(
            &descriptor.media_type().to_string(),
            &digest.to_string(),
            size,
            Some(name),
        )?;
        self.entries.push(entry);
        self.index = build_index(&self.entries)?;
        Ok(())
    }

    /// Number of `fetch_blob` calls made so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl ContentStore for MemoryStore {
    fn index(&self) -> Result<&ImageIndex, StoreError> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        Ok(&self.index)
    }

    fn fetch_blob(&self, descriptor: &Descriptor) -> Result<Blob, StoreError> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let key = descriptor.digest().to_string();
        let data = self
            .blobs
            .get(&key)
            .ok_or_else(|| StoreError::BlobNotFound(key.clone()))?;
        let digest = verify_blob(descriptor, data)?;

        Ok(Blob {
            descriptor: descriptor.clone(),
            digest,
            media_type: descriptor.media_type().to_string(),
            data: data.clone(),
        })
    }

    fn close(&mut self) -> Result<(), StoreError> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MEDIA_TYPE_IMAGE_CONFIG;

    #[test]
    fn put_fetch_roundtrip_counts() {
        let mut store = MemoryStore::new();
        let d = store.put_blob(MEDIA_TYPE_IMAGE_CONFIG, b"{}").unwrap();
        let blob = store.fetch_blob(&d).unwrap();
        assert_eq!(blob.data, b"{}");
        assert_eq!(blob.media_type, MEDIA_TYPE_IMAGE_CONFIG);
        assert_eq!(store.fetch_count(), 1);
    }

    #[test]
    fn missing_blob() {
        let mut other = MemoryStore::new();
        let d = other.put_blob(MEDIA_TYPE_IMAGE_CONFIG, b"{}").unwrap();
        let store = MemoryStore::new();
        assert!(matches!(
            store.fetch_blob(&d),
            Err(StoreError::BlobNotFound(_))
        ));
    }

    #[test]
    fn closed_store_refuses_access() {
        let mut store = MemoryStore::new();
        let d = store.put_blob(MEDIA_TYPE_IMAGE_CONFIG, b"{}").unwrap();
        store.close().unwrap();
        assert!(store.is_closed());
        assert!(matches!(store.index(), Err(StoreError::Closed)));
        assert!(matches!(store.fetch_blob(&d), Err(StoreError::Closed)));
    }

    #[test]
    fn references_are_annotated() {
        let mut store = MemoryStore::new();
        let d = store.put_blob(MEDIA_TYPE_IMAGE_CONFIG, b"{}").unwrap();
        store.add_reference("latest", &d).unwrap();
        let index = store.index().unwrap();
        assert_eq!(index.manifests().len(), 1);
        assert_eq!(crate::refs::ref_name(&index.manifests()[0]), Some("latest"));
    }
}
