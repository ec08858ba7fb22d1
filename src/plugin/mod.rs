//! Plugin side of the invocation protocol.
//!
//! A plugin receives exactly one positional argument: base64-encoded UTF-8
//! JSON holding a [`Payload`]. [`load_invocation_payload`] is the only entry
//! point plugins need.

pub mod paths;

use crate::core::error::{Error, Result};
use crate::core::types::Payload;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// Serialise and encode a payload for the command line.
pub fn encode_payload(payload: &Payload) -> Result<String> {
    let json = serde_json::to_vec(payload)
        .map_err(|e| Error::Payload(format!("could not serialise: {}", e)))?;
    Ok(STANDARD.encode(json))
}

/// Inverse of [`encode_payload`].
pub fn decode_payload(encoded: &str) -> Result<Payload> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| Error::Payload(format!("invalid base64: {}", e)))?;
    serde_json::from_slice(&bytes).map_err(|e| Error::Payload(format!("invalid JSON: {}", e)))
}

/// Decode the payload from a plugin's argv (program name first).
pub fn load_invocation_payload<I>(args: I) -> Result<Payload>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter().skip(1);
    let (Some(encoded), None) = (args.next(), args.next()) else {
        return Err(Error::Payload(
            "expected exactly one argument holding the encoded payload".to_string(),
        ));
    };
    decode_payload(&encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Binding;
    use serde_json::json;

    fn payload() -> Payload {
        let mut binding = Binding::new();
        binding.insert("user".to_string(), "a".to_string());
        Payload {
            name: "motd".to_string(),
            plugin: "paths".to_string(),
            variables: json!({"paths": [{"path": "/etc/motd", "ensure": "file"}]}),
            files: [("t".to_string(), "abc_template".to_string())]
                .into_iter()
                .collect(),
            binding,
        }
    }

    #[test]
    fn test_load_invocation_payload() {
        let encoded = encode_payload(&payload()).unwrap();
        let loaded =
            load_invocation_payload(vec!["./paths".to_string(), encoded]).unwrap();
        assert_eq!(loaded, payload());
    }

    #[test]
    fn test_load_rejects_wrong_arity() {
        assert!(matches!(
            load_invocation_payload(vec!["./paths".to_string()]),
            Err(Error::Payload(_))
        ));
        assert!(matches!(
            load_invocation_payload(vec!["p".to_string(), "a".to_string(), "b".to_string()]),
            Err(Error::Payload(_))
        ));
    }

    #[test]
    fn test_decode_rejects_non_json() {
        let encoded = STANDARD.encode("not json");
        let err = decode_payload(&encoded).unwrap_err();
        assert!(err.to_string().contains("invalid JSON"));
    }

    #[test]
    fn test_decode_accepts_missing_optional_fields() {
        let encoded = STANDARD.encode(r#"{"name": "n", "plugin": "p"}"#);
        let p = decode_payload(&encoded).unwrap();
        assert!(p.files.is_empty());
        assert!(p.binding.is_empty());
    }
}
