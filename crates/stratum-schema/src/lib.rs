//! Reference names, digests, descriptor paths, ID mapping, and the metadata envelope for Stratum.
//!
//! This crate defines the schema layer shared by every other crate: image
//! references (`ImageRef`, `RefName`), content digests (`Digest`), resolved
//! descriptor chains (`DescriptorPath`), user/group ID remapping rules
//! (`MapOptions`), and the versioned `Meta` envelope that carries a resolution
//! result into runtime config synthesis.

pub mod digest;
pub mod idmap;
pub mod meta;
pub mod path;
pub mod reference;

pub use digest::{Digest, DigestError};
pub use idmap::{parse_id_mapping, IdKind, IdMapping, MapOptions, MappingError};
pub use meta::{Meta, MetaError, META_VERSION};
pub use path::DescriptorPath;
pub use reference::{ImageRef, RefName, ReferenceError, DEFAULT_TAG};
