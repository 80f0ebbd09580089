//! Resolved descriptor chains from an index entry down to a target blob.

use oci_spec::image::Descriptor;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An ordered walk of descriptors. The first element is the tagged entry in
/// the layout's `index.json`; each following element was found inside the
/// blob referenced by its predecessor. The last element is the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptorPath {
    walk: Vec<Descriptor>,
}

impl DescriptorPath {
    /// Start a path at a root descriptor.
    pub fn root(descriptor: Descriptor) -> Self {
        Self {
            walk: vec![descriptor],
        }
    }

    /// Build from an existing walk. Returns `None` for an empty walk.
    pub fn from_walk(walk: Vec<Descriptor>) -> Option<Self> {
        if walk.is_empty() {
            None
        } else {
            Some(Self { walk })
        }
    }

    /// Extend a copy of this path by one descriptor.
    #[must_use]
    pub fn child(&self, descriptor: Descriptor) -> Self {
        let mut walk = self.walk.clone();
        walk.push(descriptor);
        Self { walk }
    }

    pub fn walk(&self) -> &[Descriptor] {
        &self.walk
    }

    /// The tagged index entry the walk started from.
    pub fn root_descriptor(&self) -> &Descriptor {
        &self.walk[0]
    }

    /// The terminal descriptor, i.e. the blob this path resolves to.
    pub fn descriptor(&self) -> &Descriptor {
        &self.walk[self.walk.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.walk.len()
    }

    pub fn is_empty(&self) -> bool {
        self.walk.is_empty()
    }
}

impl fmt::Display for DescriptorPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, d) in self.walk.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{}", d.digest())?;
        }
        Ok(())
    }
}
