//! Self-contained share tokens.
//!
//! `base64url(json({body, checksum}))` where `body` is the JSON payload and
//! `checksum` its CRC-32 in 8 lowercase hex digits. The checksum catches
//! corruption and casual edits; it is not an authenticity guarantee.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::checksum::crc32_hex;
use crate::dataset::DatasetVariant;
use crate::error::QuizResult;
use crate::scoring::ScoreResult;

/// Payload version this codec writes and accepts.
pub const SHARE_VERSION: &str = "1";

/// URL-safe alphabet, no padding on encode, padding tolerated on decode.
const TOKEN_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharePayload {
    pub v: String,
    pub variant: DatasetVariant,
    pub seed: String,
    pub count: usize,
    pub accuracy: f64,
    pub duration_ms: u64,
    pub composite: f64,
    pub created_at: DateTime<Utc>,
}

impl SharePayload {
    pub fn new(variant: DatasetVariant, seed: impl Into<String>, count: usize, result: &ScoreResult) -> Self {
        Self {
            v: SHARE_VERSION.to_string(),
            variant,
            seed: seed.into(),
            count,
            accuracy: result.accuracy,
            duration_ms: result.duration_ms,
            composite: result.composite,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    body: String,
    checksum: String,
}

/// Why a token was rejected. Only for diagnostics; callers should present
/// every variant the same way.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token is not valid base64url: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("token is not valid utf-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("token envelope is malformed: {0}")]
    Envelope(serde_json::Error),

    #[error("token envelope is missing body or checksum")]
    Incomplete,

    #[error("checksum mismatch: stored {stored}, computed {computed}")]
    Checksum { stored: String, computed: String },

    #[error("token payload is malformed: {0}")]
    Payload(serde_json::Error),

    #[error("unsupported token version {0:?}")]
    Version(String),
}

pub fn encode_share_token(payload: &SharePayload) -> QuizResult<String> {
    let body = serde_json::to_string(payload)?;
    let checksum = crc32_hex(body.as_bytes());
    let envelope = serde_json::to_string(&Envelope { body, checksum })?;
    Ok(TOKEN_ENGINE.encode(envelope))
}

/// Decode and verify, reporting the reason for rejection.
pub fn try_decode_share_token(token: &str) -> Result<SharePayload, TokenError> {
    let bytes = TOKEN_ENGINE.decode(token.trim())?;
    let text = String::from_utf8(bytes)?;
    let envelope: Envelope = serde_json::from_str(&text).map_err(TokenError::Envelope)?;
    if envelope.body.is_empty() || envelope.checksum.is_empty() {
        return Err(TokenError::Incomplete);
    }

    let computed = crc32_hex(envelope.body.as_bytes());
    if computed != envelope.checksum {
        return Err(TokenError::Checksum {
            stored: envelope.checksum,
            computed,
        });
    }

    let payload: SharePayload =
        serde_json::from_str(&envelope.body).map_err(TokenError::Payload)?;
    if payload.v != SHARE_VERSION {
        return Err(TokenError::Version(payload.v));
    }
    Ok(payload)
}

/// Decode and verify. Any defect yields `None`.
pub fn decode_share_token(token: &str) -> Option<SharePayload> {
    match try_decode_share_token(token) {
        Ok(payload) => Some(payload),
        Err(e) => {
            debug!("rejected share token: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::score;

    fn make_payload() -> SharePayload {
        SharePayload {
            v: SHARE_VERSION.into(),
            variant: DatasetVariant::S,
            seed: "weekly-challenge".into(),
            count: 10,
            accuracy: 0.7,
            duration_ms: 300_000,
            composite: 70.0,
            created_at: "2024-03-01T12:34:56.789Z".parse().unwrap(),
        }
    }

    #[test]
    fn test_roundtrip() {
        let p = make_payload();
        let token = encode_share_token(&p).unwrap();
        assert_eq!(decode_share_token(&token), Some(p));
    }

    #[test]
    fn test_roundtrip_unicode_seed_and_fresh_timestamp() {
        let result = score(7, 3, 412_345);
        let p = SharePayload::new(DatasetVariant::M, "sëed/+?&=🙂", 7, &result);
        let token = encode_share_token(&p).unwrap();
        assert_eq!(decode_share_token(&token), Some(p));
    }

    #[test]
    fn test_token_is_url_safe() {
        let token = encode_share_token(&make_payload()).unwrap();
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_wire_field_names() {
        let token = encode_share_token(&make_payload()).unwrap();
        let envelope: serde_json::Value =
            serde_json::from_slice(&TOKEN_ENGINE.decode(&token).unwrap()).unwrap();
        let body: serde_json::Value =
            serde_json::from_str(envelope["body"].as_str().unwrap()).unwrap();
        for key in ["v", "variant", "seed", "count", "accuracy", "durationMs", "composite", "createdAt"] {
            assert!(body.get(key).is_some(), "missing {key}");
        }
        assert_eq!(body["variant"], "s");
        assert_eq!(envelope["checksum"].as_str().unwrap().len(), 8);
    }

    #[test]
    fn test_padded_token_accepted() {
        let p = make_payload();
        let mut token = encode_share_token(&p).unwrap();
        while token.len() % 4 != 0 {
            token.push('=');
        }
        assert_eq!(decode_share_token(&token), Some(p));
    }

    #[test]
    fn test_single_char_flip_rejected() {
        let token = encode_share_token(&make_payload()).unwrap();
        for i in 0..token.len() {
            let mut chars: Vec<char> = token.chars().collect();
            chars[i] = if chars[i] == 'A' { 'B' } else { 'A' };
            let tampered: String = chars.into_iter().collect();
            assert_eq!(decode_share_token(&tampered), None, "flip at {i} accepted");
        }
    }

    #[test]
    fn test_checksum_mismatch_reported() {
        let body = serde_json::to_string(&make_payload()).unwrap();
        let envelope = serde_json::json!({"body": body, "checksum": "00000000"});
        let token = TOKEN_ENGINE.encode(envelope.to_string());
        assert!(matches!(
            try_decode_share_token(&token),
            Err(TokenError::Checksum { .. })
        ));
    }

    #[test]
    fn test_wrong_version_rejected() {
        let mut p = make_payload();
        p.v = "2".into();
        let token = encode_share_token(&p).unwrap();
        assert!(matches!(
            try_decode_share_token(&token),
            Err(TokenError::Version(v)) if v == "2"
        ));
        assert_eq!(decode_share_token(&token), None);
    }

    #[test]
    fn test_garbage_is_none() {
        for token in ["", "!!!", "bm90IGpzb24", "e30", "eyJib2R5IjoiIiwiY2hlY2tzdW0iOiIifQ"] {
            assert_eq!(decode_share_token(token), None, "{token}");
        }
    }
}
