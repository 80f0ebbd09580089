use crate::media::{MEDIA_TYPE_IMAGE_INDEX, MEDIA_TYPE_IMAGE_MANIFEST};
use crate::StoreError;
use oci_spec::image::{Descriptor, ImageIndex, ImageManifest};
use serde::de::DeserializeOwned;
use sha2::{Digest as _, Sha256, Sha512};
use stratum_schema::Digest;

/// A verified blob together with the descriptor it was fetched through.
#[derive(Debug, Clone)]
pub struct Blob {
    pub descriptor: Descriptor,
    pub digest: Digest,
    pub media_type: String,
    pub data: Vec<u8>,
}

/// Blob content decoded according to its declared media type.
#[derive(Debug, Clone)]
pub enum BlobContent {
    Manifest(ImageManifest),
    Index(ImageIndex),
    /// Any media type this crate does not decode. Carries the declared type.
    Unsupported(String),
}

impl Blob {
    /// Decode into the closed set of variants selected by the declared media type.
    ///
    /// A manifest or index that fails to parse is `Malformed`; it never falls
    /// through to `Unsupported`.
    pub fn decode(&self) -> Result<BlobContent, StoreError> {
        match self.media_type.as_str() {
            MEDIA_TYPE_IMAGE_MANIFEST => self.decode_json().map(BlobContent::Manifest),
            MEDIA_TYPE_IMAGE_INDEX => self.decode_json().map(BlobContent::Index),
            other => Ok(BlobContent::Unsupported(other.to_owned())),
        }
    }

    /// Decode the blob as JSON of type `T`.
    pub fn decode_json<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        serde_json::from_slice(&self.data).map_err(|e| StoreError::Malformed {
            digest: self.digest.to_string(),
            media_type: self.media_type.clone(),
            reason: e.to_string(),
        })
    }
}

pub(crate) fn hash_hex(algorithm: &str, data: &[u8]) -> Option<String> {
    match algorithm {
        "sha256" => Some(hex::encode(Sha256::digest(data))),
        "sha512" => Some(hex::encode(Sha512::digest(data))),
        _ => None,
    }
}

/// Parse a descriptor's digest and declared size.
pub fn descriptor_digest(descriptor: &Descriptor) -> Result<(Digest, u64), StoreError> {
    let digest = Digest::parse(&descriptor.digest().to_string())?;
    // The size field is signed in the descriptor type; read it back as JSON to reject negatives.
    let raw_size = serde_json::to_value(descriptor)?
        .get("size")
        .cloned()
        .unwrap_or(serde_json::Value::Null);
    let size = raw_size.as_u64().ok_or_else(|| StoreError::InvalidSize {
        digest: digest.to_string(),
        size: raw_size.to_string(),
    })?;
    Ok((digest, size))
}

/// Check `data` against the size and digest a descriptor declares.
pub fn verify_blob(descriptor: &Descriptor, data: &[u8]) -> Result<Digest, StoreError> {
    let (digest, expected_size) = descriptor_digest(descriptor)?;

    let actual_size = data.len() as u64;
    if actual_size != expected_size {
        return Err(StoreError::SizeMismatch {
            digest: digest.to_string(),
            expected: expected_size,
            actual: actual_size,
        });
    }

    let actual = hash_hex(digest.algorithm(), data)
        .ok_or_else(|| StoreError::UnsupportedAlgorithm(digest.algorithm().to_owned()))?;
    if actual != digest.encoded() {
        return Err(StoreError::DigestMismatch {
            digest: digest.to_string(),
            actual: format!("{}:{actual}", digest.algorithm()),
        });
    }

    Ok(digest)
}
