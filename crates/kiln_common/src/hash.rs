//! Content hashing for stable, collision-resistant cache keys.

use std::fmt;

/// A 128-bit content hash computed using XXH3.
///
/// Two inputs with the same `ContentHash` are assumed to be identical. Used
/// to derive legible cache keys that stay stable across runs and platforms.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 16]);

impl ContentHash {
    /// Computes a content hash from a byte slice using XXH3-128.
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = xxhash_rust::xxh3::xxh3_128(data);
        Self(hash.to_le_bytes())
    }

    /// Computes a content hash over an ordered sequence of parts.
    ///
    /// Every part is length-prefixed, so `["ab", "c"]` and `["a", "bc"]`
    /// hash differently.
    pub fn from_parts<I, P>(parts: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<[u8]>,
    {
        let mut buf = Vec::new();
        for part in parts {
            let part = part.as_ref();
            buf.extend_from_slice(&(part.len() as u64).to_le_bytes());
            buf.extend_from_slice(part);
        }
        Self::from_bytes(&buf)
    }

    /// Returns the first `digits` uppercase hex digits of the hash.
    ///
    /// `digits` is clamped to the 32 digits a 128-bit hash has.
    pub fn short_hex(&self, digits: usize) -> String {
        let mut out = String::with_capacity(32);
        for byte in &self.0 {
            out.push_str(&format!("{byte:02X}"));
        }
        out.truncate(digits.min(32));
        out
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let a = ContentHash::from_bytes(b"hello world");
        let b = ContentHash::from_bytes(b"hello world");
        assert_eq!(a, b);
    }

    #[test]
    fn different_inputs_differ() {
        let a = ContentHash::from_bytes(b"hello");
        let b = ContentHash::from_bytes(b"world");
        assert_ne!(a, b);
    }

    #[test]
    fn parts_are_length_prefixed() {
        let a = ContentHash::from_parts(["ab", "c"]);
        let b = ContentHash::from_parts(["a", "bc"]);
        assert_ne!(a, b);
        assert_eq!(a, ContentHash::from_parts(vec!["ab".to_string(), "c".to_string()]));
    }

    #[test]
    fn short_hex_is_uppercase_prefix() {
        let h = ContentHash::from_bytes(b"test");
        let short = h.short_hex(8);
        assert_eq!(short.len(), 8);
        assert!(short.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        assert!(h.to_string().to_uppercase().starts_with(&short));
        assert_eq!(h.short_hex(100).len(), 32);
    }

    #[test]
    fn display_format() {
        let h = ContentHash::from_bytes(b"test");
        let s = format!("{h}");
        assert_eq!(s.len(), 32, "Display should be 32 hex chars");
        assert!(s.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn debug_abbreviated() {
        let h = ContentHash::from_bytes(b"test");
        let s = format!("{h:?}");
        assert!(s.starts_with("ContentHash("));
        assert!(s.ends_with(")"));
    }
}
