//! # Binding Digest
//!
//! The hash that binds a decision to the exact inputs and facts the policy
//! was evaluated against, plus the policy version that produced it.
//!
//! Layout of the hashed preimage:
//!
//! ```text
//! hex(canonical_json(inputs)) | hex(canonical_json(facts)) | decimal(version)
//! ```
//!
//! The same digest is recomputed at execute time from the *current* inputs
//! and freshly resolved facts; any drift fails the bind with
//! `decision-mismatch`.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Compute the binding hash for a decision.
///
/// Infallible for plain JSON values: `canonical_json_string` can only fail
/// for non-JSON-representable types, which `Value` is not.
pub fn binding_hash(inputs: &Value, facts: &Value, policy_version: i32) -> String {
    let inputs_canon = crate::canonical::canonical_json_string(inputs).unwrap_or_default();
    let facts_canon = crate::canonical::canonical_json_string(facts).unwrap_or_default();
    let preimage = format!(
        "{}|{}|{}",
        hex_encode(inputs_canon.as_bytes()),
        hex_encode(facts_canon.as_bytes()),
        policy_version
    );
    let digest = Sha256::digest(preimage.as_bytes());
    hex_encode(&digest)
}

/// Encode bytes as a lowercase hex string.
pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hash_is_stable_across_key_order() {
        let a = json!({"amount": 10, "currency": "USD"});
        let b: Value = serde_json::from_str(r#"{"currency":"USD","amount":10}"#).unwrap();
        let facts = json!({"orders": 3});
        assert_eq!(binding_hash(&a, &facts, 1), binding_hash(&b, &facts, 1));
    }

    #[test]
    fn hash_changes_with_inputs() {
        let facts = json!({});
        let h1 = binding_hash(&json!({"amount": 10}), &facts, 1);
        let h2 = binding_hash(&json!({"amount": 11}), &facts, 1);
        assert_ne!(h1, h2);
    }

    #[test]
    fn hash_changes_with_facts() {
        let inputs = json!({});
        let h1 = binding_hash(&inputs, &json!({"orders": 1}), 1);
        let h2 = binding_hash(&inputs, &json!({"orders": 2}), 1);
        assert_ne!(h1, h2);
    }

    #[test]
    fn hash_changes_with_policy_version() {
        let inputs = json!({"a": 1});
        let facts = json!({"b": 2});
        assert_ne!(
            binding_hash(&inputs, &facts, 1),
            binding_hash(&inputs, &facts, 2)
        );
    }

    #[test]
    fn hash_is_lowercase_hex_sha256() {
        let h = binding_hash(&json!({}), &json!({}), 0);
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn hex_encode_known_value() {
        assert_eq!(hex_encode(&[0xde, 0xad, 0xbe, 0xef]), "deadbeef");
        assert_eq!(hex_encode(&[]), "");
    }
}
