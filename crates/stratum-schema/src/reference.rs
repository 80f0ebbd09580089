//! Image reference parsing: `<image-path>[:<tag>]` and OCI reference names.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Tag used when an image reference carries none.
pub const DEFAULT_TAG: &str = "latest";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReferenceError {
    #[error("image reference must not be empty")]
    Empty,
    #[error("image path must not be empty in '{0}'")]
    EmptyPath(String),
    #[error("tag must not be empty in '{0}'")]
    EmptyTag(String),
    #[error("invalid reference name '{0}'")]
    InvalidName(String),
}

/// A validated reference name, as stored in the
/// `org.opencontainers.image.ref.name` annotation of an index entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RefName(String);

impl RefName {
    pub fn new(s: impl Into<String>) -> Result<Self, ReferenceError> {
        let s = s.into();
        if !is_valid_ref_name(&s) {
            return Err(ReferenceError::InvalidName(s));
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Deref for RefName {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RefName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RefName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for RefName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for RefName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl TryFrom<String> for RefName {
    type Error = ReferenceError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RefName> for String {
    fn from(r: RefName) -> Self {
        r.0
    }
}

/// Check a name against the OCI image-layout ref-name grammar:
///
/// ```text
/// name      := component ("/" component)*
/// component := alnum+ (separator alnum+)*
/// separator := [-._:@+] | "--"
/// ```
pub fn is_valid_ref_name(name: &str) -> bool {
    !name.is_empty() && name.split('/').all(valid_component)
}

fn valid_component(component: &str) -> bool {
    let bytes = component.as_bytes();
    let mut i = 0;
    loop {
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_alphanumeric() {
            i += 1;
        }
        if i == start {
            return false;
        }
        if i == bytes.len() {
            return true;
        }
        if bytes[i] == b'-' && bytes.get(i + 1) == Some(&b'-') {
            i += 2;
        } else if matches!(bytes[i], b'-' | b'.' | b'_' | b':' | b'@' | b'+') {
            i += 1;
        } else {
            return false;
        }
    }
}

/// `--image` argument: a layout directory plus the tag to resolve inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub path: PathBuf,
    pub tag: RefName,
}

impl ImageRef {
    /// Parse `<image-path>[:<tag>]`, falling back to `default_tag`.
    ///
    /// The split happens at the last `:` whose suffix contains no `/`, so
    /// paths like `./dir:with:colons/image` keep their colons.
    pub fn parse(input: &str, default_tag: &str) -> Result<Self, ReferenceError> {
        if input.is_empty() {
            return Err(ReferenceError::Empty);
        }

        let (path, tag) = match input.rsplit_once(':') {
            Some((path, tag)) if !tag.contains('/') => (path, tag),
            _ => (input, default_tag),
        };

        if path.is_empty() {
            return Err(ReferenceError::EmptyPath(input.to_owned()));
        }
        if tag.is_empty() {
            return Err(ReferenceError::EmptyTag(input.to_owned()));
        }

        Ok(Self {
            path: PathBuf::from(path),
            tag: RefName::new(tag)?,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.path.display(), self.tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_path_and_tag() {
        let r = ImageRef::parse("images/alpine:3.19", DEFAULT_TAG).unwrap();
        assert_eq!(r.path, PathBuf::from("images/alpine"));
        assert_eq!(r.tag, "3.19");
    }

    #[test]
    fn defaults_tag() {
        let r = ImageRef::parse("images/alpine", DEFAULT_TAG).unwrap();
        assert_eq!(r.tag, "latest");
    }

    #[test]
    fn custom_default_tag() {
        let r = ImageRef::parse("images/alpine", "stable").unwrap();
        assert_eq!(r.tag, "stable");
    }

    #[test]
    fn colon_in_directory_is_not_a_tag() {
        let r = ImageRef::parse("/srv/a:b/image", DEFAULT_TAG).unwrap();
        assert_eq!(r.path, PathBuf::from("/srv/a:b/image"));
        assert_eq!(r.tag, "latest");
    }

    #[test]
    fn rejects_empty_inputs() {
        assert_eq!(ImageRef::parse("", DEFAULT_TAG), Err(ReferenceError::Empty));
        assert!(matches!(
            ImageRef::parse(":v1", DEFAULT_TAG),
            Err(ReferenceError::EmptyPath(_))
        ));
        assert!(matches!(
            ImageRef::parse("image:", DEFAULT_TAG),
            Err(ReferenceError::EmptyTag(_))
        ));
    }

    #[test]
    fn rejects_invalid_tag() {
        assert!(matches!(
            ImageRef::parse("image:-bad", DEFAULT_TAG),
            Err(ReferenceError::InvalidName(_))
        ));
    }

    #[test]
    fn ref_name_grammar() {
        for ok in ["latest", "v1", "1.0.0", "a--b", "a_b", "org/app", "x@y+z"] {
            assert!(is_valid_ref_name(ok), "{ok} should be valid");
        }
        for bad in ["", "-a", "a-", "a---b", "a..b", "a/", "/a", "a b", "a//b"] {
            assert!(!is_valid_ref_name(bad), "{bad} should be invalid");
        }
    }

    #[test]
    fn ref_name_serde_validates() {
        let ok: RefName = serde_json::from_str("\"v1\"").unwrap();
        assert_eq!(ok.as_str(), "v1");
        assert!(serde_json::from_str::<RefName>("\"bad name\"").is_err());
    }
}
