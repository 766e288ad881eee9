//! Canonical JSON encoding
//!
//! The canonical form is what gets digested and signed, so two spans with the
//! same content must always produce identical bytes:
//!
//! - object keys sorted by their UTF-8 bytes, at every level
//! - no insignificant whitespace
//! - integers without a decimal point; floats in shortest round-trip form
//! - strings escaped only where JSON requires it
//! - absent optional fields omitted
//!
//! NaN and infinities have no JSON form and are rejected.

use crate::error::Result;
use crate::span::Span;
use serde_json::Value as Json;
use std::io::Write;

/// Canonical bytes of the span exactly as given
pub fn canonicalize(span: &Span) -> Result<Vec<u8>> {
    span.ensure_finite()?;
    let tree = serde_json::to_value(span)?;
    let mut out = Vec::with_capacity(512);
    write_canonical(&mut out, &tree)?;
    Ok(out)
}

/// Canonical bytes of the span with digest and signature cleared
///
/// This is the preimage of the span digest. Re-signing an already signed
/// span goes through here so the previous digest never feeds the new one.
pub fn canonicalize_unsigned(span: &Span) -> Result<Vec<u8>> {
    canonicalize(&span.unsigned())
}

fn write_canonical(out: &mut Vec<u8>, value: &Json) -> Result<()> {
    match value {
        Json::Null => out.extend_from_slice(b"null"),
        Json::Bool(true) => out.extend_from_slice(b"true"),
        Json::Bool(false) => out.extend_from_slice(b"false"),
        Json::Number(n) => write!(out, "{}", n).map_err(serde_json::Error::io)?,
        Json::String(s) => serde_json::to_writer(&mut *out, s)?,
        Json::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(out, item)?;
            }
            out.push(b']');
        }
        Json::Object(map) => {
            let mut entries: Vec<(&String, &Json)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

            out.push(b'{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                serde_json::to_writer(&mut *out, key)?;
                out.push(b':');
                write_canonical(out, item)?;
            }
            out.push(b'}');
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EnvelopeError;
    use crate::span::{Metadata, Signature};
    use crate::value::{Value, ValueMap};

    fn span_with_input(input: ValueMap) -> Span {
        Span::new(
            "s1",
            "activity",
            "observer",
            "focused",
            "device:a",
            "complete",
            Metadata::at("2025-10-31T18:00:00Z"),
            "private",
        )
        .with_input(input)
    }

    #[test]
    fn test_keys_sorted_and_compact() {
        let mut input = ValueMap::new();
        input.insert("zeta".into(), Value::Int(1));
        input.insert("alpha".into(), Value::Bool(true));

        let bytes = canonicalize(&span_with_input(input)).unwrap();
        let text = String::from_utf8(bytes).unwrap();

        assert!(text.starts_with(r#"{"did":"focused","entity_type":"activity","id":"s1","input":{"alpha":true,"zeta":1}"#));
        assert!(!text.contains(' '));
        assert!(text.contains(r#""metadata":{"ts":"2025-10-31T18:00:00Z"}"#));
    }

    #[test]
    fn test_number_forms() {
        let mut input = ValueMap::new();
        input.insert("i".into(), Value::Int(-7));
        input.insert("f".into(), Value::Float(2.0));
        input.insert("g".into(), Value::Float(0.1));

        let text = String::from_utf8(canonicalize(&span_with_input(input)).unwrap()).unwrap();
        assert!(text.contains(r#""f":2.0"#));
        assert!(text.contains(r#""g":0.1"#));
        assert!(text.contains(r#""i":-7"#));
    }

    #[test]
    fn test_string_escaping_is_minimal() {
        let mut input = ValueMap::new();
        input.insert("s".into(), Value::from("caf\u{e9} \"q\"\n/"));

        let text = String::from_utf8(canonicalize(&span_with_input(input)).unwrap()).unwrap();
        assert!(text.contains("\"s\":\"caf\u{e9} \\\"q\\\"\\n/\""));
    }

    #[test]
    fn test_non_finite_rejected() {
        let mut input = ValueMap::new();
        input.insert("bad".into(), Value::Float(f64::INFINITY));

        let err = canonicalize(&span_with_input(input)).unwrap_err();
        assert!(matches!(err, EnvelopeError::NonFiniteFloat { ref path } if path == "input.bad"));
    }

    #[test]
    fn test_unsigned_ignores_signature_fields() {
        let plain = span_with_input(ValueMap::new());
        let mut signed = plain.clone();
        signed.digest = Some("b3:abc".into());
        signed.signature = Some(Signature {
            algo: "ed25519".into(),
            pubkey_hex: "00".into(),
            sig_hex: "11".into(),
        });

        assert_eq!(
            canonicalize_unsigned(&signed).unwrap(),
            canonicalize(&plain).unwrap()
        );
        assert_ne!(canonicalize(&signed).unwrap(), canonicalize(&plain).unwrap());
    }
}
