//! OCI media type strings recognised by the store and the synthesizer.

pub const MEDIA_TYPE_IMAGE_INDEX: &str = "application/vnd.oci.image.index.v1+json";
pub const MEDIA_TYPE_IMAGE_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const MEDIA_TYPE_IMAGE_CONFIG: &str = "application/vnd.oci.image.config.v1+json";

pub const MEDIA_TYPE_LAYER_TAR: &str = "application/vnd.oci.image.layer.v1.tar";
pub const MEDIA_TYPE_LAYER_GZIP: &str = "application/vnd.oci.image.layer.v1.tar+gzip";
pub const MEDIA_TYPE_LAYER_ZSTD: &str = "application/vnd.oci.image.layer.v1.tar+zstd";
pub const MEDIA_TYPE_LAYER_NONDIST_TAR: &str =
    "application/vnd.oci.image.layer.nondistributable.v1.tar";
pub const MEDIA_TYPE_LAYER_NONDIST_GZIP: &str =
    "application/vnd.oci.image.layer.nondistributable.v1.tar+gzip";
pub const MEDIA_TYPE_LAYER_NONDIST_ZSTD: &str =
    "application/vnd.oci.image.layer.nondistributable.v1.tar+zstd";

/// Annotation carrying the reference name of an index entry.
pub const ANNOTATION_REF_NAME: &str = "org.opencontainers.image.ref.name";

const LAYER_MEDIA_TYPES: &[&str] = &[
    MEDIA_TYPE_LAYER_TAR,
    MEDIA_TYPE_LAYER_GZIP,
    MEDIA_TYPE_LAYER_ZSTD,
    MEDIA_TYPE_LAYER_NONDIST_TAR,
    MEDIA_TYPE_LAYER_NONDIST_GZIP,
    MEDIA_TYPE_LAYER_NONDIST_ZSTD,
];

pub fn is_layer_media_type(media_type: &str) -> bool {
    LAYER_MEDIA_TYPES.contains(&media_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_types() {
        assert!(is_layer_media_type(MEDIA_TYPE_LAYER_GZIP));
        assert!(is_layer_media_type(MEDIA_TYPE_LAYER_NONDIST_ZSTD));
        assert!(!is_layer_media_type(MEDIA_TYPE_IMAGE_CONFIG));
        assert!(!is_layer_media_type(
            "application/vnd.docker.image.rootfs.diff.tar.gzip"
        ));
    }
}
