use crate::guard::StoreGuard;
use crate::resolve::{resolve, Resolved};
use crate::sink::write_atomic;
use crate::CoreError;
use serde::Serialize;
use std::path::{Path, PathBuf};
use stratum_runtime::{synthesize, to_bytes, LayerEntry, Synthesis};
use stratum_schema::{DescriptorPath, ImageRef, MapOptions, Meta};
use stratum_store::{ContentStore, LayoutStore};
use tracing::{debug, info};

/// Everything one `runtime-config` invocation needs, built once by the caller.
#[derive(Debug, Clone)]
pub struct RuntimeConfigRequest {
    pub image: ImageRef,
    pub rootfs: Option<PathBuf>,
    pub output: PathBuf,
    pub uid_map: Vec<String>,
    pub gid_map: Vec<String>,
    pub rootless: bool,
}

/// What a successful `runtime-config` run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeConfigOutcome {
    pub reference: String,
    pub descriptor_path: DescriptorPath,
    pub layers: Vec<LayerEntry>,
    pub output: PathBuf,
    pub bytes: usize,
}

/// Orchestrates resolution and synthesis against OCI image layouts.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    /// Host IDs used for the rootless default mapping. `None` means the
    /// effective IDs of the current process.
    host_ids: Option<(u32, u32)>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// An engine whose rootless default maps container root onto these host IDs.
    pub fn with_host_ids(uid: u32, gid: u32) -> Self {
        Self {
            host_ids: Some((uid, gid)),
        }
    }

    pub fn map_options(&self, request: &RuntimeConfigRequest) -> Result<MapOptions, CoreError> {
        let options = match self.host_ids {
            Some((uid, gid)) => MapOptions::parse_for_host(
                &request.uid_map,
                &request.gid_map,
                request.rootless,
                uid,
                gid,
            )?,
            None => MapOptions::parse(&request.uid_map, &request.gid_map, request.rootless)?,
        };
        Ok(options)
    }

    /// Resolve the request's image, synthesize its runtime configuration, and
    /// write it to `request.output`.
    ///
    /// Mappings are validated before the store is opened. The store is closed
    /// on every exit path. Nothing is written unless synthesis succeeds.
    pub fn generate_runtime_config(
        &self,
        request: &RuntimeConfigRequest,
    ) -> Result<RuntimeConfigOutcome, CoreError> {
        let map_options = self.map_options(request)?;
        let store = StoreGuard::new(LayoutStore::open(request.image.path())?);
        self.generate_with_store(store, request, map_options)
    }

    /// Same as [`generate_runtime_config`](Self::generate_runtime_config) on an already-open store.
    pub fn generate_with_store<S: ContentStore>(
        &self,
        store: StoreGuard<S>,
        request: &RuntimeConfigRequest,
        map_options: MapOptions,
    ) -> Result<RuntimeConfigOutcome, CoreError> {
        let reference = request.image.to_string();
        let tag = request.image.tag.as_str();

        let Resolved { path, manifest } =
            resolve(&*store, tag).map_err(|source| CoreError::Resolve {
                reference: reference.clone(),
                source,
            })?;
        debug!("{reference} resolved through {path}");

        let meta = Meta::new(path, map_options);
        let Synthesis { document, layers } =
            synthesize(&*store, &meta, &manifest, request.rootfs.as_deref())?;
        let bytes = to_bytes(&document)?;
        store.close()?;

        write_atomic(&request.output, &bytes).map_err(|source| CoreError::Sink {
            path: request.output.display().to_string(),
            source,
        })?;
        info!(
            "wrote runtime config for {reference} to {}",
            request.output.display()
        );

        Ok(RuntimeConfigOutcome {
            reference,
            descriptor_path: meta.from,
            layers,
            output: request.output.clone(),
            bytes: bytes.len(),
        })
    }

    /// Resolve an image reference without synthesizing anything.
    pub fn resolve_reference(&self, image: &ImageRef) -> Result<Resolved, CoreError> {
        let store = StoreGuard::new(LayoutStore::open(image.path())?);
        let resolved = resolve(&*store, image.tag.as_str()).map_err(|source| {
            CoreError::Resolve {
                reference: image.to_string(),
                source,
            }
        })?;
        store.close()?;
        Ok(resolved)
    }

    /// Reference names tagged in a layout's root index.
    pub fn list_tags(&self, layout: &Path) -> Result<Vec<String>, CoreError> {
        let store = StoreGuard::new(LayoutStore::open(layout)?);
        let tags = store.list_references()?;
        store.close()?;
        Ok(tags)
    }
}
