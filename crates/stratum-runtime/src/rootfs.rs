//! Read-only access to an already-unpacked root filesystem.
//!
//! Paths inside the rootfs are resolved component by component, following
//! symlinks as if the rootfs were `/`, so neither `..` nor an absolute link
//! target can escape it.

use crate::SynthesisError;
use std::collections::VecDeque;
use std::ffi::OsString;
use std::fs;
use std::io::{self, ErrorKind};
use std::os::unix::fs::MetadataExt;
use std::path::{Component, Path, PathBuf};
use tracing::trace;

const MAX_SYMLINKS: usize = 255;

#[derive(Debug, Clone)]
pub struct Rootfs {
    root: PathBuf,
}

impl Rootfs {
    /// Open `path` as a rootfs. It must be a readable directory.
    pub fn open(path: &Path) -> Result<Self, SynthesisError> {
        let unavailable = |reason: String| SynthesisError::SecondaryFsUnavailable {
            path: path.display().to_string(),
            reason,
        };

        let meta = fs::metadata(path).map_err(|e| unavailable(e.to_string()))?;
        if !meta.is_dir() {
            return Err(unavailable("not a directory".to_owned()));
        }
        fs::read_dir(path).map_err(|e| unavailable(e.to_string()))?;

        Ok(Self {
            root: path.to_path_buf(),
        })
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Host path for `inner`, interpreted relative to the rootfs.
    ///
    /// Components that do not exist are joined lexically, so the result may
    /// point at nothing.
    pub fn resolve(&self, inner: &str) -> Result<PathBuf, SynthesisError> {
        let mut pending: VecDeque<OsString> = components(Path::new(inner));
        let mut resolved: Vec<OsString> = Vec::new();
        let mut links = 0usize;

        while let Some(part) = pending.pop_front() {
            if part == ".." {
                resolved.pop();
                continue;
            }
            resolved.push(part);

            let candidate = self.join(&resolved);
            let meta = match fs::symlink_metadata(&candidate) {
                Ok(meta) => meta,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            if !meta.file_type().is_symlink() {
                continue;
            }

            links += 1;
            if links > MAX_SYMLINKS {
                return Err(io::Error::other(format!(
                    "too many symlinks resolving '{inner}' in {}",
                    self.root.display()
                ))
                .into());
            }

            let target = fs::read_link(&candidate)?;
            resolved.pop();
            if target.is_absolute() {
                resolved.clear();
            }
            let mut next = components(&target);
            next.extend(pending);
            pending = next;
        }

        let path = self.join(&resolved);
        trace!("rootfs path {inner} -> {}", path.display());
        Ok(path)
    }

    fn join(&self, parts: &[OsString]) -> PathBuf {
        let mut path = self.root.clone();
        path.extend(parts);
        path
    }

    /// Contents of a file inside the rootfs, or `None` if it does not exist.
    pub fn read_to_string(&self, inner: &str) -> Result<Option<String>, SynthesisError> {
        let path = self.resolve(inner)?;
        match fs::read_to_string(&path) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// On-disk `(uid, gid)` owner of a path inside the rootfs, if it exists.
    /// These are host IDs.
    pub fn owner(&self, inner: &str) -> Result<Option<(u32, u32)>, SynthesisError> {
        let path = self.resolve(inner)?;
        match fs::symlink_metadata(&path) {
            Ok(meta) => Ok(Some((meta.uid(), meta.gid()))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn components(path: &Path) -> VecDeque<OsString> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_os_string()),
            Component::ParentDir => Some(OsString::from("..")),
            Component::RootDir | Component::CurDir | Component::Prefix(_) => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;

    #[test]
    fn open_requires_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Rootfs::open(&dir.path().join("missing")),
            Err(SynthesisError::SecondaryFsUnavailable { .. })
        ));

        let file = dir.path().join("file");
        fs::write(&file, b"x").unwrap();
        let err = Rootfs::open(&file).unwrap_err();
        assert!(err.to_string().contains("not a directory"));

        assert!(Rootfs::open(dir.path()).is_ok());
    }

    #[test]
    fn dotdot_stays_inside() {
        let dir = tempfile::tempdir().unwrap();
        let rootfs = Rootfs::open(dir.path()).unwrap();
        assert_eq!(
            rootfs.resolve("/../../etc/passwd").unwrap(),
            dir.path().join("etc").join("passwd")
        );
        assert_eq!(
            rootfs.resolve("a/./b/../c").unwrap(),
            dir.path().join("a").join("c")
        );
    }

    #[test]
    fn absolute_symlink_is_rebased() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("real/etc")).unwrap();
        fs::write(dir.path().join("real/etc/passwd"), "root:x:0:0::/root:/bin/sh\n").unwrap();
        symlink("/real/etc", dir.path().join("etc")).unwrap();

        let rootfs = Rootfs::open(dir.path()).unwrap();
        assert_eq!(
            rootfs.resolve("/etc/passwd").unwrap(),
            dir.path().join("real").join("etc").join("passwd")
        );
        assert!(rootfs.read_to_string("/etc/passwd").unwrap().is_some());
    }

    #[test]
    fn escaping_relative_symlink_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        symlink("../../../../outside", dir.path().join("link")).unwrap();
        let rootfs = Rootfs::open(dir.path()).unwrap();
        assert_eq!(
            rootfs.resolve("/link").unwrap(),
            dir.path().join("outside")
        );
    }

    #[test]
    fn symlink_loop_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        symlink("/b", dir.path().join("a")).unwrap();
        symlink("/a", dir.path().join("b")).unwrap();
        let rootfs = Rootfs::open(dir.path()).unwrap();
        assert!(rootfs.resolve("/a").is_err());
    }

    #[test]
    fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let rootfs = Rootfs::open(dir.path()).unwrap();
        assert!(rootfs.read_to_string("/etc/group").unwrap().is_none());
        assert!(rootfs.owner("/data").unwrap().is_none());
    }

    #[test]
    fn owner_reports_host_ids() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("data")).unwrap();
        let rootfs = Rootfs::open(dir.path()).unwrap();
        let expected = fs::metadata(dir.path().join("data")).unwrap();
        assert_eq!(
            rootfs.owner("/data").unwrap(),
            Some((expected.uid(), expected.gid()))
        );
    }
}
