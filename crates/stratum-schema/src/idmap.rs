//! User and group ID remapping between host and container namespaces.
//!
//! Directives use the `<container>:<host>[:<size>]` form. A `MapOptions`
//! value is validated once at construction and never mutated afterwards;
//! an empty mapping list means identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdKind {
    Uid,
    Gid,
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdKind::Uid => write!(f, "uid"),
            IdKind::Gid => write!(f, "gid"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    #[error("invalid {kind} mapping '{directive}': expected <container>:<host>[:<size>]")]
    InvalidFormat { kind: IdKind, directive: String },
    #[error("invalid {kind} mapping '{directive}': {field} is not a valid id")]
    InvalidNumber {
        kind: IdKind,
        directive: String,
        field: &'static str,
    },
    #[error("invalid {kind} mapping '{directive}': size must be greater than zero")]
    ZeroSize { kind: IdKind, directive: String },
    #[error("invalid {kind} mapping '{directive}': range exceeds the 32-bit id space")]
    Overflow { kind: IdKind, directive: String },
    #[error("invalid {kind} mapping: container ranges of {first} and {second} overlap")]
    OverlappingContainer {
        kind: IdKind,
        first: IdMapping,
        second: IdMapping,
    },
    #[error("invalid {kind} mapping: host ranges of {first} and {second} overlap")]
    OverlappingHost {
        kind: IdKind,
        first: IdMapping,
        second: IdMapping,
    },
}

/// One contiguous range: container IDs `container_id..container_id + size`
/// correspond to host IDs `host_id..host_id + size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdMapping {
    #[serde(rename = "containerID")]
    pub container_id: u32,
    #[serde(rename = "hostID")]
    pub host_id: u32,
    pub size: u32,
}

impl IdMapping {
    fn contains_container(&self, id: u32) -> bool {
        id >= self.container_id
            && u64::from(id) < u64::from(self.container_id) + u64::from(self.size)
    }

    fn contains_host(&self, id: u32) -> bool {
        id >= self.host_id && u64::from(id) < u64::from(self.host_id) + u64::from(self.size)
    }

    fn validate(&self, kind: IdKind, directive: &str) -> Result<(), MappingError> {
        if self.size == 0 {
            return Err(MappingError::ZeroSize {
                kind,
                directive: directive.to_owned(),
            });
        }
        let limit = u64::from(u32::MAX) + 1;
        if u64::from(self.container_id) + u64::from(self.size) > limit
            || u64::from(self.host_id) + u64::from(self.size) > limit
        {
            return Err(MappingError::Overflow {
                kind,
                directive: directive.to_owned(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for IdMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.container_id, self.host_id, self.size)
    }
}

/// Parse a single `<container>:<host>[:<size>]` directive. Size defaults to 1.
pub fn parse_id_mapping(kind: IdKind, directive: &str) -> Result<IdMapping, MappingError> {
    let parts: Vec<&str> = directive.split(':').collect();
    if !(2..=3).contains(&parts.len()) {
        return Err(MappingError::InvalidFormat {
            kind,
            directive: directive.to_owned(),
        });
    }

    let field = |idx: usize, name: &'static str| -> Result<u32, MappingError> {
        parts[idx]
            .trim()
            .parse::<u32>()
            .map_err(|_| MappingError::InvalidNumber {
                kind,
                directive: directive.to_owned(),
                field: name,
            })
    };

    let mapping = IdMapping {
        container_id: field(0, "container id")?,
        host_id: field(1, "host id")?,
        size: if parts.len() == 3 { field(2, "size")? } else { 1 },
    };
    mapping.validate(kind, directive)?;
    Ok(mapping)
}

fn check_overlaps(kind: IdKind, mappings: &[IdMapping]) -> Result<(), MappingError> {
    let overlaps = |a_start: u32, b_start: u32, a_size: u32, b_size: u32| {
        u64::from(a_start) < u64::from(b_start) + u64::from(b_size)
            && u64::from(b_start) < u64::from(a_start) + u64::from(a_size)
    };

    for (i, first) in mappings.iter().enumerate() {
        for second in &mappings[i + 1..] {
            if overlaps(
                first.container_id,
                second.container_id,
                first.size,
                second.size,
            ) {
                return Err(MappingError::OverlappingContainer {
                    kind,
                    first: *first,
                    second: *second,
                });
            }
            if overlaps(first.host_id, second.host_id, first.size, second.size) {
                return Err(MappingError::OverlappingHost {
                    kind,
                    first: *first,
                    second: *second,
                });
            }
        }
    }
    Ok(())
}

/// Validated UID/GID mapping options for one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawMapOptions")]
pub struct MapOptions {
    uid_mappings: Vec<IdMapping>,
    gid_mappings: Vec<IdMapping>,
    rootless: bool,
}

#[derive(Deserialize)]
struct RawMapOptions {
    #[serde(default)]
    uid_mappings: Vec<IdMapping>,
    #[serde(default)]
    gid_mappings: Vec<IdMapping>,
    #[serde(default)]
    rootless: bool,
}

impl TryFrom<RawMapOptions> for MapOptions {
    type Error = MappingError;

    fn try_from(raw: RawMapOptions) -> Result<Self, Self::Error> {
        Self::from_mappings(raw.uid_mappings, raw.gid_mappings, raw.rootless)
    }
}

impl MapOptions {
    /// No remapping at all.
    pub fn identity() -> Self {
        Self::default()
    }

    /// Parse user-supplied directives. In rootless mode, an absent mapping
    /// list defaults to mapping container 0 onto the caller's effective ID.
    pub fn parse(
        uid_directives: &[String],
        gid_directives: &[String],
        rootless: bool,
    ) -> Result<Self, MappingError> {
        Self::parse_for_host(
            uid_directives,
            gid_directives,
            rootless,
            effective_uid(),
            effective_gid(),
        )
    }

    /// Like [`parse`](Self::parse), with the rootless default host IDs given explicitly.
    pub fn parse_for_host(
        uid_directives: &[String],
        gid_directives: &[String],
        rootless: bool,
        host_uid: u32,
        host_gid: u32,
    ) -> Result<Self, MappingError> {
        let mut uid_mappings = uid_directives
            .iter()
            .map(|d| parse_id_mapping(IdKind::Uid, d))
            .collect::<Result<Vec<_>, _>>()?;
        let mut gid_mappings = gid_directives
            .iter()
            .map(|d| parse_id_mapping(IdKind::Gid, d))
            .collect::<Result<Vec<_>, _>>()?;

        if rootless {
            if uid_mappings.is_empty() {
                uid_mappings.push(IdMapping {
                    container_id: 0,
                    host_id: host_uid,
                    size: 1,
                });
            }
            if gid_mappings.is_empty() {
                gid_mappings.push(IdMapping {
                    container_id: 0,
                    host_id: host_gid,
                    size: 1,
                });
            }
        }

        Self::from_mappings(uid_mappings, gid_mappings, rootless)
    }

    /// Build from already-structured mappings, applying the same validation as `parse`.
    pub fn from_mappings(
        uid_mappings: Vec<IdMapping>,
        gid_mappings: Vec<IdMapping>,
        rootless: bool,
    ) -> Result<Self, MappingError> {
        for m in &uid_mappings {
            m.validate(IdKind::Uid, &m.to_string())?;
        }
        for m in &gid_mappings {
            m.validate(IdKind::Gid, &m.to_string())?;
        }
        check_overlaps(IdKind::Uid, &uid_mappings)?;
        check_overlaps(IdKind::Gid, &gid_mappings)?;
        Ok(Self {
            uid_mappings,
            gid_mappings,
            rootless,
        })
    }

    pub fn uid_mappings(&self) -> &[IdMapping] {
        &self.uid_mappings
    }

    pub fn gid_mappings(&self) -> &[IdMapping] {
        &self.gid_mappings
    }

    pub fn rootless(&self) -> bool {
        self.rootless
    }

    pub fn mappings(&self, kind: IdKind) -> &[IdMapping] {
        match kind {
            IdKind::Uid => &self.uid_mappings,
            IdKind::Gid => &self.gid_mappings,
        }
    }

    /// True when neither UIDs nor GIDs are remapped.
    pub fn is_identity(&self) -> bool {
        self.uid_mappings.is_empty() && self.gid_mappings.is_empty()
    }

    /// Translate a host ID into container space. `None` if no range covers it.
    pub fn to_container(&self, kind: IdKind, host_id: u32) -> Option<u32> {
        let mappings = self.mappings(kind);
        if mappings.is_empty() {
            return Some(host_id);
        }
        mappings
            .iter()
            .find(|m| m.contains_host(host_id))
            .map(|m| m.container_id + (host_id - m.host_id))
    }

    /// Translate a container ID into host space. `None` if no range covers it.
    pub fn to_host(&self, kind: IdKind, container_id: u32) -> Option<u32> {
        let mappings = self.mappings(kind);
        if mappings.is_empty() {
            return Some(container_id);
        }
        mappings
            .iter()
            .find(|m| m.contains_container(container_id))
            .map(|m| m.host_id + (container_id - m.container_id))
    }
}

#[allow(unsafe_code)]
fn effective_uid() -> u32 {
    // SAFETY: geteuid() takes no arguments and cannot fail.
    unsafe { libc::geteuid() }
}

#[allow(unsafe_code)]
fn effective_gid() -> u32 {
    // SAFETY: getegid() takes no arguments and cannot fail.
    unsafe { libc::getegid() }
}
