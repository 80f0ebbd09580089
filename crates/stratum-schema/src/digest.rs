//! Content digests in the OCI `<algorithm>:<encoded>` form.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DigestError {
    #[error("digest '{0}' is missing the '<algorithm>:' prefix")]
    MissingAlgorithm(String),
    #[error("digest '{0}' has an invalid algorithm component")]
    InvalidAlgorithm(String),
    #[error("digest '{0}' has an invalid encoded component")]
    InvalidEncoding(String),
    #[error("digest '{digest}' must have {expected} lowercase hex characters for {algorithm}")]
    InvalidLength {
        digest: String,
        algorithm: String,
        expected: usize,
    },
}

/// A parsed content digest such as `sha256:6c3c62...`.
///
/// Registered algorithms (`sha256`, `sha512`) are checked for their exact
/// lowercase-hex length. Other algorithms only have to satisfy the grammar,
/// so a store can still report them as unsupported rather than malformed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest {
    algorithm: String,
    encoded: String,
}

impl Digest {
    pub fn parse(s: &str) -> Result<Self, DigestError> {
        let (algorithm, encoded) = s
            .split_once(':')
            .ok_or_else(|| DigestError::MissingAlgorithm(s.to_owned()))?;

        if !valid_algorithm(algorithm) {
            return Err(DigestError::InvalidAlgorithm(s.to_owned()));
        }
        if encoded.is_empty()
            || !encoded
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'=' | b'_' | b'-'))
        {
            return Err(DigestError::InvalidEncoding(s.to_owned()));
        }

        let expected = match algorithm {
            "sha256" => Some(64),
            "sha512" => Some(128),
            _ => None,
        };
        if let Some(expected) = expected {
            let lower_hex = encoded
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
            if encoded.len() != expected || !lower_hex {
                return Err(DigestError::InvalidLength {
                    digest: s.to_owned(),
                    algorithm: algorithm.to_owned(),
                    expected,
                });
            }
        }

        Ok(Self {
            algorithm: algorithm.to_owned(),
            encoded: encoded.to_owned(),
        })
    }

    #[inline]
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    #[inline]
    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    /// First 12 characters of the encoded part, for log lines.
    pub fn short(&self) -> &str {
        &self.encoded[..12.min(self.encoded.len())]
    }
}

// algorithm := component ([+._-] component)*, component := [a-z0-9]+
fn valid_algorithm(s: &str) -> bool {
    if s.is_empty() {
        return false;
    }
    let mut prev_sep = true;
    for b in s.bytes() {
        if b.is_ascii_lowercase() || b.is_ascii_digit() {
            prev_sep = false;
        } else if matches!(b, b'+' | b'.' | b'_' | b'-') {
            if prev_sep {
                return false;
            }
            prev_sep = true;
        } else {
            return false;
        }
    }
    !prev_sep
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.encoded)
    }
}

impl FromStr for Digest {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
