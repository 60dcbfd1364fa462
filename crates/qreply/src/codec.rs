// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Payload codec: typed value <-> JSON body.
//!
//! Decoding has one fallback for a legacy producer format. Those producers
//! wrapped the JSON document behind a serializer preamble that always ends at
//! the first comma:
//!
//! ```text
//! <preamble>,{"CreditScore":700}
//! ```
//!
//! When the body fails to decode, everything up to and including the first
//! comma is dropped and decoding is retried exactly once.

use crate::envelope::Envelope;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Payload decode failures.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Body bytes are not UTF-8
    #[error("body is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// Body is not a JSON document of the expected shape
    #[error("body does not match the expected payload: {0}")]
    Json(#[source] serde_json::Error),
}

/// Serialize `value` into an envelope with no metadata set.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Envelope, serde_json::Error> {
    let body = serde_json::to_vec(value)?;
    Ok(Envelope::new(body))
}

/// Decode an envelope body into `T`.
pub fn decode<T: DeserializeOwned>(envelope: &Envelope) -> Result<T, DecodeError> {
    decode_body(&envelope.body)
}

/// Decode raw body bytes into `T`, applying the legacy fallback once.
pub fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, DecodeError> {
    let text = std::str::from_utf8(body)?;

    match serde_json::from_str(text) {
        Ok(value) => Ok(value),
        Err(primary) => match strip_legacy_preamble(text) {
            Some(stripped) => {
                tracing::debug!("primary decode failed ({}), retrying legacy format", primary);
                serde_json::from_str(stripped).map_err(DecodeError::Json)
            }
            None => Err(DecodeError::Json(primary)),
        },
    }
}

/// Text after the first comma, if there is one.
fn strip_legacy_preamble(text: &str) -> Option<&str> {
    text.find(',').map(|idx| &text[idx + 1..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Probe {
        marker: String,
        value: i64,
    }

    #[test]
    fn encode_sets_no_metadata() {
        let env = encode(&Probe {
            marker: "a".into(),
            value: 1,
        })
        .unwrap();
        assert!(env.reply_to.is_none());
        assert!(env.reply_to_session_id.is_none());
        assert!(env.session_id.is_none());
        assert!(env.message_id.is_none());
    }

    #[test]
    fn roundtrip_struct_and_scalars() {
        let probe = Probe {
            marker: "ünïcode, with comma".into(),
            value: -42,
        };
        let back: Probe = decode(&encode(&probe).unwrap()).unwrap();
        assert_eq!(back, probe);

        let n: u64 = decode(&encode(&7u64).unwrap()).unwrap();
        assert_eq!(n, 7);

        let v: Vec<String> = decode(&encode(&vec!["x", "y"]).unwrap()).unwrap();
        assert_eq!(v, vec!["x", "y"]);
    }

    #[test]
    fn legacy_preamble_is_stripped() {
        let body = br#"@string3http://schemas.microsoft.com/2003/10/Serialization/,{"marker":"m","value":3}"#;
        let probe: Probe = decode_body(body).unwrap();
        assert_eq!(probe.value, 3);
    }

    #[test]
    fn fallback_fails_when_stripped_text_is_not_json() {
        // first comma sits inside the document, stripped remainder is garbage
        let body = br#"junk{"marker":"m","value":3}"#;
        let err = decode_body::<Probe>(body).unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
    }

    #[test]
    fn no_comma_means_no_retry() {
        let err = decode_body::<Probe>(b"definitely not json").unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
    }

    #[test]
    fn fallback_runs_at_most_once() {
        // two preambles: a single strip still leaves one in front
        let body = br#"first,second,{"marker":"m","value":3}"#;
        assert!(decode_body::<Probe>(body).is_err());
    }

    #[test]
    fn invalid_utf8_is_a_decode_fault() {
        let err = decode_body::<Probe>(&[0xff, 0xfe, b',', b'{']).unwrap_err();
        assert!(matches!(err, DecodeError::Utf8(_)));
    }
}
