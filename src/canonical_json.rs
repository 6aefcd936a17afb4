//! The hashing domain of the whole system (spec §4.5, REDESIGN FLAGS).
//!
//! Canonical JSON here means: UTF-8, no whitespace, no non-ASCII escaping,
//! member order preserved as produced by the source structure. We do *not*
//! sort keys — `serde_json`'s `preserve_order` feature backs `Map` with an
//! `IndexMap`, so a value built or decoded in a given order serializes back
//! in that same order. This is the single most error-prone portability
//! point in the system; every hash and binding computation goes through
//! `to_canonical_bytes`.

use openssl::sha::sha256;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum CanonicalJsonError {
    #[error("failed to serialize value to canonical JSON: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Serializes `value` the same way `json.dumps(v, ensure_ascii=False,
/// separators=(',', ':'))` does: compact, insertion-order, UTF-8.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, CanonicalJsonError> {
    Ok(serde_json::to_vec(value)?)
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(sha256(bytes))
}

/// `sha256(canonical_json(value))`, hex-encoded. Used for every binding
/// hash field (`taskConfigHash`, `templateInfoHash`, ...).
pub fn canonical_sha256_hex<T: Serialize>(value: &T) -> Result<String, CanonicalJsonError> {
    Ok(sha256_hex(&to_canonical_bytes(value)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn preserves_insertion_order_not_sorted() {
        let v = json!({"b": 1, "a": 2});
        let bytes = to_canonical_bytes(&v).unwrap();
        assert_eq!(bytes, br#"{"b":1,"a":2}"#);
    }

    #[test]
    fn no_whitespace_no_ascii_escaping() {
        let v = json!({"name": "Jos\u{e9}"});
        let bytes = to_canonical_bytes(&v).unwrap();
        assert_eq!(bytes, "{\"name\":\"José\"}".as_bytes());
    }

    #[test]
    fn hash_matches_manual_sha256() {
        let v = json!({"x": 1});
        let got = canonical_sha256_hex(&v).unwrap();
        let want = hex::encode(sha256(br#"{"x":1}"#));
        assert_eq!(got, want);
    }
}
