//! DPoP key binding via JWK thumbprint.

use std::collections::BTreeMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::jose::{decode_unverified_header, JoseError};

/// Members kept in the canonical key. EC members only; other key types hash
/// whatever subset they carry.
const CANONICAL_MEMBERS: [&str; 4] = ["crv", "kty", "x", "y"];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DpopError {
    #[error("malformed DPoP proof: {0}")]
    MalformedProof(#[from] JoseError),
    #[error("DPoP proof header carries no jwk object")]
    MissingKey,
    #[error("canonical jwk serialization failed")]
    Canonicalize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DpopBinder;

impl DpopBinder {
    /// Thumbprint of the proof's embedded public key, used as `dpop_jkt`.
    pub fn extract_thumbprint(&self, dpop_proof: &str) -> Result<String, DpopError> {
        let header = decode_unverified_header(dpop_proof)?;
        let Some(Value::Object(jwk)) = header.get("jwk") else {
            return Err(DpopError::MissingKey);
        };

        // BTreeMap keeps members sorted; serde_json writes it without whitespace.
        let canonical: BTreeMap<&str, &Value> = CANONICAL_MEMBERS
            .iter()
            .filter_map(|name| jwk.get(*name).map(|v| (*name, v)))
            .collect();
        let bytes = serde_json::to_vec(&canonical).map_err(|_| DpopError::Canonicalize)?;

        Ok(URL_SAFE_NO_PAD.encode(Sha256::digest(&bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jose::test_support::compact;
    use serde_json::json;

    fn proof(jwk: Value) -> String {
        compact(
            &json!({"typ": "dpop+jwt", "alg": "ES256", "jwk": jwk}),
            &json!({"htm": "POST", "htu": "https://example.test/auth/login", "iat": 1}),
        )
    }

    fn ec_key() -> Value {
        json!({"kty": "EC", "crv": "P-256", "x": "f83OJ3D2xF1Bg8vub9tLe1gHMzV76e8Tus9uPHvRVEU", "y": "x_FEzRu9m36HLN_tue659LNpXW6pCyStikYjKIWI5a0"})
    }

    #[test]
    fn thumbprint_matches_sorted_compact_digest() {
        let jkt = DpopBinder.extract_thumbprint(&proof(ec_key())).unwrap();

        let expected = URL_SAFE_NO_PAD.encode(Sha256::digest(
            br#"{"crv":"P-256","kty":"EC","x":"f83OJ3D2xF1Bg8vub9tLe1gHMzV76e8Tus9uPHvRVEU","y":"x_FEzRu9m36HLN_tue659LNpXW6pCyStikYjKIWI5a0"}"#,
        ));
        assert_eq!(jkt, expected);
        assert_eq!(jkt.len(), 43);
        assert!(!jkt.contains('='));
    }

    #[test]
    fn ignores_member_order_and_extra_members() {
        let reordered = json!({
            "y": "x_FEzRu9m36HLN_tue659LNpXW6pCyStikYjKIWI5a0",
            "use": "sig",
            "kid": "device-1",
            "x": "f83OJ3D2xF1Bg8vub9tLe1gHMzV76e8Tus9uPHvRVEU",
            "crv": "P-256",
            "kty": "EC"
        });
        assert_eq!(
            DpopBinder.extract_thumbprint(&proof(ec_key())).unwrap(),
            DpopBinder.extract_thumbprint(&proof(reordered)).unwrap()
        );
    }

    #[test]
    fn each_canonical_member_changes_the_thumbprint() {
        let base = DpopBinder.extract_thumbprint(&proof(ec_key())).unwrap();
        for (member, value) in [("crv", "P-384"), ("kty", "OKP"), ("x", "AAAA"), ("y", "BBBB")] {
            let mut jwk = ec_key();
            jwk[member] = json!(value);
            let other = DpopBinder.extract_thumbprint(&proof(jwk)).unwrap();
            assert_ne!(base, other, "changing {member} must change the jkt");
        }
    }

    #[test]
    fn rsa_key_hashes_degenerate_but_stable_form() {
        let rsa = json!({"kty": "RSA", "n": "0vx7agoebG", "e": "AQAB"});
        let a = DpopBinder.extract_thumbprint(&proof(rsa.clone())).unwrap();
        let b = DpopBinder.extract_thumbprint(&proof(rsa)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, URL_SAFE_NO_PAD.encode(Sha256::digest(br#"{"kty":"RSA"}"#)));
    }

    #[test]
    fn missing_or_non_object_jwk() {
        let no_jwk = compact(&json!({"alg": "ES256"}), &json!({}));
        assert_eq!(DpopBinder.extract_thumbprint(&no_jwk), Err(DpopError::MissingKey));

        let string_jwk = compact(&json!({"alg": "ES256", "jwk": "abc"}), &json!({}));
        assert_eq!(DpopBinder.extract_thumbprint(&string_jwk), Err(DpopError::MissingKey));
    }

    #[test]
    fn undecodable_proof() {
        assert!(matches!(
            DpopBinder.extract_thumbprint("only.two"),
            Err(DpopError::MalformedProof(_))
        ));
    }
}
