//! Reference lookup: from a tag name to every descriptor path it reaches.

use crate::blobs::BlobContent;
use crate::media::{ANNOTATION_REF_NAME, MEDIA_TYPE_IMAGE_INDEX};
use crate::{ContentStore, StoreError};
use oci_spec::image::{Descriptor, ImageIndex};
use stratum_schema::DescriptorPath;
use tracing::{debug, trace};

/// Deepest chain of nested indexes followed before giving up.
pub const MAX_INDEX_DEPTH: usize = 32;

/// The reference name annotation of a descriptor, if any.
pub fn ref_name(descriptor: &Descriptor) -> Option<&str> {
    descriptor
        .annotations()
        .as_ref()
        .and_then(|a| a.get(ANNOTATION_REF_NAME))
        .map(String::as_str)
}

/// Sorted, de-duplicated reference names of a root index.
pub fn list_references(index: &ImageIndex) -> Vec<String> {
    let mut names: Vec<String> = index
        .manifests()
        .iter()
        .filter_map(ref_name)
        .map(str::to_owned)
        .collect();
    names.sort();
    names.dedup();
    names
}

/// Walk every index entry tagged `name` down to its non-index leaves.
///
/// Nested indexes are expanded child by child, so a tagged multi-platform
/// index yields one path per platform manifest. Nothing is fetched for
/// entries that do not match `name` or that are not themselves indexes.
pub fn resolve_descriptor_paths<S: ContentStore + ?Sized>(
    store: &S,
    name: &str,
) -> Result<Vec<DescriptorPath>, StoreError> {
    let index = store.index()?;
    let mut paths = Vec::new();

    for root in index.manifests() {
        if ref_name(root) != Some(name) {
            continue;
        }
        walk(store, DescriptorPath::root(root.clone()), 0, &mut paths)?;
    }

    debug!("reference '{name}' resolved to {} descriptor path(s)", paths.len());
    Ok(paths)
}

fn walk<S: ContentStore + ?Sized>(
    store: &S,
    path: DescriptorPath,
    depth: usize,
    out: &mut Vec<DescriptorPath>,
) -> Result<(), StoreError> {
    let current = path.descriptor();
    if current.media_type().to_string() != MEDIA_TYPE_IMAGE_INDEX {
        trace!("descriptor path terminates at {path}");
        out.push(path);
        return Ok(());
    }

    let digest = current.digest().to_string();
    if depth >= MAX_INDEX_DEPTH {
        return Err(StoreError::Malformed {
            digest,
            media_type: MEDIA_TYPE_IMAGE_INDEX.to_owned(),
            reason: format!("indexes nested deeper than {MAX_INDEX_DEPTH} levels"),
        });
    }

    let blob = store.fetch_blob(current)?;
    let BlobContent::Index(child_index) = blob.decode()? else {
        return Err(StoreError::Malformed {
            digest,
            media_type: MEDIA_TYPE_IMAGE_INDEX.to_owned(),
            reason: "blob did not decode as an image index".to_owned(),
        });
    };

    for child in child_index.manifests() {
        walk(store, path.child(child.clone()), depth + 1, out)?;
    }
    Ok(())
}
