//! Cache keys and key hashing
//!
//! A [`CacheKey`] is an ordered list of primitive parts. It is hashed into a
//! fixed-length hex identifier before it reaches a backend, so backends only
//! ever see 64-character keys.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

/// One primitive component of a cache key
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum KeyPart {
    Str(String),
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Bytes(Vec<u8>),
}

impl KeyPart {
    /// Type-tagged, length-prefixed bytes fed to the hasher
    fn feed(&self, hasher: &mut Sha256) {
        match self {
            KeyPart::Str(s) => {
                hasher.update(b"s");
                hasher.update((s.len() as u64).to_le_bytes());
                hasher.update(s.as_bytes());
            }
            // Every integer type shares one encoding so 5i32 and 5u64 match
            KeyPart::Int(i) => {
                hasher.update(b"i");
                hasher.update(i128::from(*i).to_le_bytes());
            }
            KeyPart::UInt(u) => {
                hasher.update(b"i");
                hasher.update(i128::from(*u).to_le_bytes());
            }
            KeyPart::Float(f) => {
                hasher.update(b"f");
                // -0.0 and 0.0 compare equal, so they must hash equal
                let normalized = if *f == 0.0 { 0.0f64 } else { *f };
                hasher.update(normalized.to_bits().to_le_bytes());
            }
            KeyPart::Bool(b) => {
                hasher.update(b"b");
                hasher.update([u8::from(*b)]);
            }
            KeyPart::Bytes(bytes) => {
                hasher.update(b"x");
                hasher.update((bytes.len() as u64).to_le_bytes());
                hasher.update(bytes);
            }
        }
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Str(s) => f.write_str(s),
            KeyPart::Int(i) => write!(f, "{}", i),
            KeyPart::UInt(u) => write!(f, "{}", u),
            KeyPart::Float(x) => write!(f, "{}", x),
            KeyPart::Bool(b) => write!(f, "{}", b),
            KeyPart::Bytes(bytes) => write!(f, "0x{}", hex::encode(bytes)),
        }
    }
}

impl From<&str> for KeyPart {
    fn from(s: &str) -> Self {
        KeyPart::Str(s.to_owned())
    }
}

impl From<String> for KeyPart {
    fn from(s: String) -> Self {
        KeyPart::Str(s)
    }
}

impl From<i64> for KeyPart {
    fn from(i: i64) -> Self {
        KeyPart::Int(i)
    }
}

impl From<i32> for KeyPart {
    fn from(i: i32) -> Self {
        KeyPart::Int(i64::from(i))
    }
}

impl From<u64> for KeyPart {
    fn from(u: u64) -> Self {
        KeyPart::UInt(u)
    }
}

impl From<u32> for KeyPart {
    fn from(u: u32) -> Self {
        KeyPart::UInt(u64::from(u))
    }
}

impl From<f64> for KeyPart {
    fn from(f: f64) -> Self {
        KeyPart::Float(f)
    }
}

impl From<Vec<u8>> for KeyPart {
    fn from(bytes: Vec<u8>) -> Self {
        KeyPart::Bytes(bytes)
    }
}

impl From<&[u8]> for KeyPart {
    fn from(bytes: &[u8]) -> Self {
        KeyPart::Bytes(bytes.to_vec())
    }
}

impl From<bool> for KeyPart {
    fn from(b: bool) -> Self {
        KeyPart::Bool(b)
    }
}

/// Ordered sequence of key parts identifying a cached value
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheKey(Vec<KeyPart>);

impl CacheKey {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a part
    pub fn with(mut self, part: impl Into<KeyPart>) -> Self {
        self.0.push(part.into());
        self
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Hash into a 64-character hex string.
    ///
    /// `namespace`, when set, is hashed ahead of the parts so that entries
    /// written under a different namespace are never found.
    pub fn hash(&self, namespace: Option<&str>) -> String {
        let mut hasher = Sha256::new();
        match namespace {
            Some(ns) => {
                hasher.update(b"n");
                KeyPart::Str(ns.to_owned()).feed(&mut hasher);
            }
            None => hasher.update(b"-"),
        }
        for part in &self.0 {
            part.feed(&mut hasher);
        }
        hex::encode(hasher.finalize())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            write!(f, "{}", part)?;
        }
        Ok(())
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self(vec![KeyPart::from(s)])
    }
}

impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        Self(vec![KeyPart::from(s)])
    }
}

impl From<Vec<KeyPart>> for CacheKey {
    fn from(parts: Vec<KeyPart>) -> Self {
        Self(parts)
    }
}

impl<P: Into<KeyPart>> FromIterator<P> for CacheKey {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}
