//! Compact JWS decoding without signature verification.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum JoseError {
    #[error("expected 3 dot-separated segments, found {0}")]
    Segments(usize),
    #[error("segment is not base64url")]
    Encoding,
    #[error("segment is not a JSON object")]
    NotObject,
}

/// Header of a compact token whose header and claim segments are both JSON
/// objects. The signature segment is never checked.
pub fn decode_unverified_header(token: &str) -> Result<Map<String, Value>, JoseError> {
    let segments: Vec<&str> = token.trim().split('.').collect();
    let [header, claims, _signature] = segments.as_slice() else {
        return Err(JoseError::Segments(segments.len()));
    };

    decode_segment(claims)?;
    decode_segment(header)
}

fn decode_segment(segment: &str) -> Result<Map<String, Value>, JoseError> {
    let raw = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| JoseError::Encoding)?;
    match serde_json::from_slice::<Value>(&raw) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(JoseError::NotObject),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use serde_json::Value;

    /// Assembles a compact token from arbitrary JSON parts with a junk signature.
    pub fn compact(header: &Value, claims: &Value) -> String {
        format!(
            "{}.{}.c2lnbmF0dXJl",
            URL_SAFE_NO_PAD.encode(header.to_string()),
            URL_SAFE_NO_PAD.encode(claims.to_string())
        )
    }
}
