//! The request signature scheme used by [`TokenAuthenticator`] (§4.1):
//! hex lower-case SHA-256 over the sorted, concatenated scalar field values
//! of a request plus the merchant's stored password hash.
//!
//! [`TokenAuthenticator`]: https://en.wikipedia.org/wiki/HMAC (conceptually; see spec §4.1)

use std::collections::BTreeMap;

use serde_json::Value;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Returns `true` if `value` is scalar (string, number, or bool) and thus
/// included in the signature; nested objects and arrays are excluded.
fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => unreachable!("caller filtered to scalar values"),
    }
}

/// Computes the lower-case hex-encoded SHA-256 signature over `fields`'
/// scalar values (excluding the key `"Token"`) plus `password_hash`, in
/// sorted-by-key order. Field order in the input does not matter.
pub fn compute_signature(
    fields: &BTreeMap<String, Value>,
    password_hash: &str,
) -> String {
    // The `(Password, passwordHash)` entry sorts wherever "Password" falls
    // lexicographically among the request's own keys.
    let mut entries: Vec<(&str, String)> = fields
        .iter()
        .filter(|(k, v)| k.as_str() != "Token" && is_scalar(v))
        .map(|(k, v)| (k.as_str(), scalar_to_string(v)))
        .collect();
    entries.push(("Password", password_hash.to_owned()));
    entries.sort_by(|a, b| a.0.cmp(b.0));

    let mut concatenated = String::new();
    for (_, value) in entries {
        concatenated.push_str(&value);
    }

    let digest = Sha256::digest(concatenated.as_bytes());
    hex::encode(digest)
}

/// Verifies `provided_token` against the signature recomputed from `fields`
/// and `password_hash`. Constant-time; case-insensitive (tokens are
/// lower-cased before comparison).
pub fn verify_signature(
    fields: &BTreeMap<String, Value>,
    password_hash: &str,
    provided_token: &str,
) -> bool {
    let expected = compute_signature(fields, password_hash);
    let provided = provided_token.to_ascii_lowercase();
    // `ct_eq` requires equal-length slices; an attacker-controlled length
    // mismatch is not itself a secret worth hiding in constant time.
    if expected.len() != provided.len() {
        return false;
    }
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}
