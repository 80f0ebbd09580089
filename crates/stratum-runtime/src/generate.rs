use crate::document::{Mount, RuntimeConfig, DEFAULT_PATH};
use crate::layers::{walk_layers, LayerEntry};
use crate::rootfs::Rootfs;
use crate::user::{parse_group, parse_passwd, resolve_exec_user};
use crate::SynthesisError;
use oci_spec::image::{ImageConfiguration, ImageManifest};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;
use stratum_schema::{IdKind, MapOptions, Meta};
use stratum_store::{ContentStore, StoreError, MEDIA_TYPE_IMAGE_CONFIG};
use tracing::{debug, info, warn};

const ANNOTATION_OS: &str = "org.opencontainers.image.os";
const ANNOTATION_ARCH: &str = "org.opencontainers.image.architecture";
const ANNOTATION_AUTHOR: &str = "org.opencontainers.image.author";
const ANNOTATION_CREATED: &str = "org.opencontainers.image.created";
const ANNOTATION_STOP_SIGNAL: &str = "org.opencontainers.image.stopSignal";
const ANNOTATION_EXPOSED_PORTS: &str = "org.opencontainers.image.exposedPorts";

/// A synthesized document plus the layer sequence it was derived from.
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub document: RuntimeConfig,
    pub layers: Vec<LayerEntry>,
}

/// The parts of an image configuration that feed the runtime document.
#[derive(Debug)]
struct ImageSettings {
    user: String,
    env: Vec<(String, String)>,
    entrypoint: Vec<String>,
    cmd: Vec<String>,
    working_dir: String,
    volumes: Vec<String>,
    exposed_ports: Vec<String>,
    labels: Vec<(String, String)>,
    stop_signal: Option<String>,
    os: String,
    architecture: String,
    author: Option<String>,
    created: Option<String>,
    diff_ids: Vec<String>,
}

impl ImageSettings {
    fn from_oci_config(
        digest: &str,
        oci_config: &ImageConfiguration,
    ) -> Result<Self, SynthesisError> {
        let config = oci_config.config().as_ref();
        let list = |v: Option<&Vec<String>>| v.cloned().unwrap_or_default();

        let env = list(config.and_then(|c| c.env().as_ref()))
            .iter()
            .map(|entry| match entry.split_once('=') {
                Some((key, value)) if !key.is_empty() => Ok((key.to_owned(), value.to_owned())),
                _ => Err(SynthesisError::Corrupt {
                    digest: digest.to_owned(),
                    reason: format!("malformed Env entry '{entry}': expected KEY=VALUE"),
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            user: config.and_then(|c| c.user().clone()).unwrap_or_default(),
            env,
            entrypoint: list(config.and_then(|c| c.entrypoint().as_ref())),
            cmd: list(config.and_then(|c| c.cmd().as_ref())),
            working_dir: config
                .and_then(|c| c.working_dir().clone())
                .unwrap_or_default(),
            volumes: list(config.and_then(|c| c.volumes().as_ref())),
            exposed_ports: list(config.and_then(|c| c.exposed_ports().as_ref())),
            labels: config
                .and_then(|c| c.labels().as_ref())
                .map(|l| l.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .unwrap_or_default(),
            stop_signal: config.and_then(|c| c.stop_signal().clone()),
            os: oci_config.os().to_string(),
            architecture: oci_config.architecture().to_string(),
            author: oci_config.author().clone(),
            created: oci_config.created().clone(),
            diff_ids: oci_config.rootfs().diff_ids().clone(),
        })
    }
}

/// Produce the runtime configuration for `manifest`.
///
/// When `rootfs` is given it must be an already-unpacked root filesystem of
/// the same image. Its `/etc/passwd`, `/etc/group`, and volume ownership take
/// precedence over anything derived from the image configuration.
pub fn synthesize<S: ContentStore + ?Sized>(
    store: &S,
    meta: &Meta,
    manifest: &ImageManifest,
    rootfs: Option<&Path>,
) -> Result<Synthesis, SynthesisError> {
    meta.verify_version()?;
    let map_options = &meta.map_options;

    let rootfs = rootfs.map(Rootfs::open).transpose()?;
    if let Some(rootfs) = &rootfs {
        warn!(
            "using {} as the source of truth for users and volume ownership; \
             the result may differ from a configuration generated by unpacking the image",
            rootfs.root().display()
        );
    }

    let config_digest = manifest.config().digest().to_string();
    let settings =
        ImageSettings::from_oci_config(&config_digest, &fetch_image_config(store, manifest)?)?;

    let layers = walk_layers(manifest, &settings.diff_ids)?;
    for layer in &layers {
        debug!(
            "layer {}: {} ({} bytes, {}, diff_id {})",
            layer.index,
            layer.digest.short(),
            layer.size,
            layer.media_type,
            layer.diff_id.short()
        );
    }

    let mut document = RuntimeConfig::linux_default();
    if map_options.rootless() {
        document.make_rootless();
    }

    apply_process(&mut document, &settings, rootfs.as_ref())?;
    apply_volumes(&mut document, &settings, rootfs.as_ref(), map_options)?;
    apply_annotations(&mut document, &settings);

    document.set_id_mappings(map_options);
    check_container_ids(&document, map_options)?;

    info!(
        "synthesized runtime config from {} layer(s) for {}/{}",
        layers.len(),
        settings.os,
        settings.architecture
    );
    Ok(Synthesis { document, layers })
}

fn fetch_image_config<S: ContentStore + ?Sized>(
    store: &S,
    manifest: &ImageManifest,
) -> Result<ImageConfiguration, SynthesisError> {
    let descriptor = manifest.config();
    let media_type = descriptor.media_type().to_string();
    if media_type != MEDIA_TYPE_IMAGE_CONFIG {
        return Err(SynthesisError::UnsupportedMediaType(media_type));
    }

    let digest = descriptor.digest().to_string();
    let corrupt_or_store = |e: StoreError| {
        if e.is_corruption() {
            SynthesisError::Corrupt {
                digest: digest.clone(),
                reason: e.to_string(),
            }
        } else {
            SynthesisError::Store(e)
        }
    };

    let blob = store.fetch_blob(descriptor).map_err(corrupt_or_store)?;
    let mut raw: serde_json::Value = blob.decode_json().map_err(corrupt_or_store)?;

    // `history` is optional in image configs but the decoder requires it.
    if let Some(fields) = raw.as_object_mut() {
        if matches!(fields.get("history"), None | Some(serde_json::Value::Null)) {
            fields.insert("history".to_owned(), serde_json::Value::Array(Vec::new()));
        }
    }
    serde_json::from_value(raw).map_err(|e| SynthesisError::Corrupt {
        digest,
        reason: e.to_string(),
    })
}

fn apply_process(
    document: &mut RuntimeConfig,
    settings: &ImageSettings,
    rootfs: Option<&Rootfs>,
) -> Result<(), SynthesisError> {
    let args: Vec<String> = settings
        .entrypoint
        .iter()
        .chain(&settings.cmd)
        .cloned()
        .collect();
    if args.is_empty() {
        warn!("image has neither Entrypoint nor Cmd; keeping the default process arguments");
    } else {
        document.process.args = args;
    }

    document.process.env.clear();
    for (key, value) in &settings.env {
        document.set_env(key, value);
    }
    if document.env_value("PATH").is_none() {
        document.set_env("PATH", DEFAULT_PATH);
    }

    document.process.cwd = match settings.working_dir.as_str() {
        "" => "/".to_owned(),
        dir if dir.starts_with('/') => dir.to_owned(),
        dir => format!("/{dir}"),
    };

    let (passwd, groups) = match rootfs {
        Some(rootfs) => (
            rootfs.read_to_string("/etc/passwd")?.map(|s| parse_passwd(&s)),
            rootfs.read_to_string("/etc/group")?.map(|s| parse_group(&s)),
        ),
        None => (None, None),
    };
    let exec = resolve_exec_user(&settings.user, passwd.as_deref(), groups.as_deref())?;
    debug!(
        "process user '{}' resolved to {}:{} (home {})",
        settings.user, exec.uid, exec.gid, exec.home
    );

    document.process.user.uid = exec.uid;
    document.process.user.gid = exec.gid;
    document.process.user.additional_gids = exec.additional_gids;
    if document.env_value("HOME").is_none() {
        document.set_env("HOME", &exec.home);
    }
    Ok(())
}

fn apply_volumes(
    document: &mut RuntimeConfig,
    settings: &ImageSettings,
    rootfs: Option<&Rootfs>,
    map_options: &MapOptions,
) -> Result<(), SynthesisError> {
    let volumes: BTreeSet<String> = settings
        .volumes
        .iter()
        .map(|v| {
            if v.starts_with('/') {
                v.clone()
            } else {
                format!("/{v}")
            }
        })
        .collect();

    for volume in volumes {
        let mut mount = Mount::volume(&volume);

        if let Some((uid, gid)) = rootfs.map(|r| r.owner(&volume)).transpose()?.flatten() {
            let context = format!("owner of volume {volume}");
            let uid = to_container(map_options, IdKind::Uid, uid, &context)?;
            let gid = to_container(map_options, IdKind::Gid, gid, &context)?;
            mount.options.push(format!("uid={uid}"));
            mount.options.push(format!("gid={gid}"));
        }

        debug!("volume {volume} mounted as tmpfs");
        document.mounts.push(mount);
    }
    Ok(())
}

fn apply_annotations(document: &mut RuntimeConfig, settings: &ImageSettings) {
    let annotations = &mut document.annotations;
    annotations.extend(settings.labels.iter().cloned());

    annotations.insert(ANNOTATION_OS.to_owned(), settings.os.clone());
    annotations.insert(ANNOTATION_ARCH.to_owned(), settings.architecture.clone());
    if let Some(author) = &settings.author {
        annotations.insert(ANNOTATION_AUTHOR.to_owned(), author.clone());
    }
    if let Some(created) = &settings.created {
        annotations.insert(ANNOTATION_CREATED.to_owned(), created.clone());
    }
    if let Some(signal) = &settings.stop_signal {
        annotations.insert(ANNOTATION_STOP_SIGNAL.to_owned(), signal.clone());
    }
    if !settings.exposed_ports.is_empty() {
        let ports: BTreeSet<&str> = settings.exposed_ports.iter().map(String::as_str).collect();
        let ports: Vec<&str> = ports.into_iter().collect();
        annotations.insert(ANNOTATION_EXPOSED_PORTS.to_owned(), ports.join(","));
    }
}

fn to_container(
    map_options: &MapOptions,
    kind: IdKind,
    host_id: u32,
    context: &str,
) -> Result<u32, SynthesisError> {
    map_options
        .to_container(kind, host_id)
        .ok_or_else(|| SynthesisError::MappingApplication {
            kind,
            id: host_id,
            context: context.to_owned(),
        })
}

/// Every container-space ID in the document must be covered by a mapping.
fn check_container_ids(
    document: &RuntimeConfig,
    map_options: &MapOptions,
) -> Result<(), SynthesisError> {
    let check = |kind: IdKind, id: u32, context: String| {
        if map_options.to_host(kind, id).is_some() {
            Ok(())
        } else {
            Err(SynthesisError::MappingApplication { kind, id, context })
        }
    };

    let user = &document.process.user;
    check(IdKind::Uid, user.uid, "process user".to_owned())?;
    check(IdKind::Gid, user.gid, "process group".to_owned())?;
    for gid in &user.additional_gids {
        check(IdKind::Gid, *gid, "process supplementary group".to_owned())?;
    }

    for mount in &document.mounts {
        if let Some(uid) = mount.id_option("uid") {
            check(IdKind::Uid, uid, format!("mount {}", mount.destination))?;
        }
        if let Some(gid) = mount.id_option("gid") {
            check(IdKind::Gid, gid, format!("mount {}", mount.destination))?;
        }
    }
    Ok(())
}

/// Serialize a document: two-space indented JSON with a trailing newline.
pub fn to_bytes(document: &RuntimeConfig) -> Result<Vec<u8>, SynthesisError> {
    let mut bytes = serde_json::to_vec_pretty(document)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Serialize `document` completely, then write it to `sink` in one call.
pub fn write_runtime_config<W: Write>(
    document: &RuntimeConfig,
    sink: &mut W,
) -> Result<(), SynthesisError> {
    let bytes = to_bytes(document)?;
    sink.write_all(&bytes)?;
    sink.flush()?;
    Ok(())
}
