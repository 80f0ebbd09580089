//! On-disk image layout tests: a layout produced by `LayoutWriter` is read
//! back through `LayoutStore` and walked by reference name.

use stratum_store::{
    ContentStore, LayoutStore, LayoutWriter, StoreError, MEDIA_TYPE_IMAGE_CONFIG,
    MEDIA_TYPE_IMAGE_INDEX, MEDIA_TYPE_IMAGE_MANIFEST,
};
use std::fs;

fn manifest(writer: &mut LayoutWriter, marker: &str) -> oci_spec::image::Descriptor {
    let config = writer
        .put_json(
            MEDIA_TYPE_IMAGE_CONFIG,
            &serde_json::json!({
                "architecture": "amd64",
                "os": "linux",
                "config": { "Labels": { "marker": marker } },
                "rootfs": { "type": "layers", "diff_ids": [] }
            }),
        )
        .unwrap();
    writer
        .put_json(
            MEDIA_TYPE_IMAGE_MANIFEST,
            &serde_json::json!({
                "schemaVersion": 2,
                "mediaType": MEDIA_TYPE_IMAGE_MANIFEST,
                "config": config,
                "layers": []
            }),
        )
        .unwrap()
}

#[test]
fn written_layout_reopens_with_tags() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = LayoutWriter::create(dir.path()).unwrap();
    let a = manifest(&mut writer, "a");
    let b = manifest(&mut writer, "b");
    writer.add_reference("latest", &a).unwrap();
    writer.add_reference("v1", &b).unwrap();

    let store = LayoutStore::open(dir.path()).unwrap();
    assert_eq!(store.list_references().unwrap(), vec!["latest", "v1"]);

    let paths = store.list_descriptor_paths("v1").unwrap();
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].descriptor().digest(), b.digest());
}

#[test]
fn nested_index_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = LayoutWriter::create(dir.path()).unwrap();
    let a = manifest(&mut writer, "amd64");
    let b = manifest(&mut writer, "arm64");
    let idx = writer
        .put_json(
            MEDIA_TYPE_IMAGE_INDEX,
            &serde_json::json!({
                "schemaVersion": 2,
                "mediaType": MEDIA_TYPE_IMAGE_INDEX,
                "manifests": [a, b]
            }),
        )
        .unwrap();
    writer.add_reference("multi", &idx).unwrap();

    let store = LayoutStore::open(dir.path()).unwrap();
    let paths = store.list_descriptor_paths("multi").unwrap();
    assert_eq!(paths.len(), 2);
    assert!(paths.iter().all(|p| p.len() == 2));
}

#[test]
fn tampered_nested_index_is_corruption() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = LayoutWriter::create(dir.path()).unwrap();
    let a = manifest(&mut writer, "amd64");
    let idx = writer
        .put_json(
            MEDIA_TYPE_IMAGE_INDEX,
            &serde_json::json!({ "schemaVersion": 2, "manifests": [a] }),
        )
        .unwrap();
    writer.add_reference("multi", &idx).unwrap();

    let encoded = idx.digest().to_string();
    let encoded = encoded.trim_start_matches("sha256:");
    let blob = dir.path().join("blobs").join("sha256").join(encoded);
    let mut data = fs::read(&blob).unwrap();
    data[0] = b' ';
    fs::write(&blob, data).unwrap();

    let store = LayoutStore::open(dir.path()).unwrap();
    let err = store.list_descriptor_paths("multi").unwrap_err();
    assert!(err.is_corruption(), "unexpected error: {err}");
}

#[test]
fn index_json_garbage_is_not_a_layout() {
    let dir = tempfile::tempdir().unwrap();
    LayoutWriter::create(dir.path()).unwrap();
    fs::write(dir.path().join("index.json"), b"not json").unwrap();
    assert!(matches!(
        LayoutStore::open(dir.path()),
        Err(StoreError::NotALayout { .. })
    ));
}
