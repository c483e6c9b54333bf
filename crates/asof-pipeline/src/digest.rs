//! Content digests for replay checks.
//!
//! A digest is BLAKE3 over the compact JSON encoding of a value. Every
//! artifact hashed here is built from ordered maps and vectors, so equal
//! values always encode to the same bytes.

use serde::Serialize;

/// Hex-encoded BLAKE3 digest of `value`'s JSON encoding.
pub fn content_digest<T>(value: &T) -> Result<String, serde_json::Error>
where
    T: Serialize + ?Sized,
{
    let bytes = serde_json::to_vec(value)?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

/// The first 8 hex characters of the digest of `bytes`.
#[must_use]
pub fn short_digest(bytes: &[u8]) -> String {
    let mut hex = blake3::hash(bytes).to_hex().to_string();
    hex.truncate(8);
    hex
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn test_equal_values_equal_digests() {
        let a = BTreeMap::from([("x", 1.5), ("y", 2.0)]);
        let b = BTreeMap::from([("y", 2.0), ("x", 1.5)]);
        let da = content_digest(&a).unwrap();
        assert_eq!(da, content_digest(&b).unwrap());
        assert_eq!(da.len(), 64);
        assert_ne!(da, content_digest(&BTreeMap::from([("x", 1.5)])).unwrap());
    }

    #[test]
    fn test_short_digest() {
        let d = short_digest(b"run");
        assert_eq!(d.len(), 8);
        assert!(d.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
