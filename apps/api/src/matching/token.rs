//! Matching-id codec — deterministic, HMAC-signed identifier that lets a
//! client recall a score without server-side persistence.
//!
//! Format: `v1.<base64url(payload)>.<base64url(hmac-sha256)>`, no padding.
//! Payload: `{"resume_id":"<uuid>","job_id":"<uuid>"}` with compact
//! separators, so encoding is byte-for-byte deterministic.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_VERSION: &str = "v1";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,

    #[error("unsupported token version")]
    BadVersion,

    #[error("signature mismatch")]
    SignatureMismatch,

    #[error("invalid token payload")]
    BadPayload,
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenPayload {
    resume_id: Uuid,
    job_id: Uuid,
}

pub fn encode_matching_id(secret: &str, resume_id: Uuid, job_id: Uuid) -> String {
    let payload =
        serde_json::to_vec(&TokenPayload { resume_id, job_id }).expect("payload is serializable");
    let payload_b64 = URL_SAFE_NO_PAD.encode(payload);
    let signature_b64 = URL_SAFE_NO_PAD.encode(sign(secret, &payload_b64));
    format!("{TOKEN_VERSION}.{payload_b64}.{signature_b64}")
}

/// Verifies the signature in constant time and returns
/// `(resume_id, job_id)`. Callers surface every failure kind identically.
pub fn decode_matching_id(secret: &str, token: &str) -> Result<(Uuid, Uuid), TokenError> {
    let parts: Vec<&str> = token.split('.').collect();
    let [version, payload_b64, signature_b64] = parts.as_slice() else {
        return Err(TokenError::Malformed);
    };
    if *version != TOKEN_VERSION {
        return Err(TokenError::BadVersion);
    }

    let signature = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| TokenError::Malformed)?;
    mac_over(secret, payload_b64)
        .verify_slice(&signature)
        .map_err(|_| TokenError::SignatureMismatch)?;

    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| TokenError::Malformed)?;
    let payload: TokenPayload =
        serde_json::from_slice(&payload_bytes).map_err(|_| TokenError::BadPayload)?;
    Ok((payload.resume_id, payload.job_id))
}

fn mac_over(secret: &str, payload_b64: &str) -> HmacSha256 {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(TOKEN_VERSION.as_bytes());
    mac.update(b".");
    mac.update(payload_b64.as_bytes());
    mac
}

fn sign(secret: &str, payload_b64: &str) -> Vec<u8> {
    mac_over(secret, payload_b64).finalize().into_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn test_round_trip_is_identity() {
        let resume_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();
        let token = encode_matching_id(SECRET, resume_id, job_id);
        assert_eq!(
            decode_matching_id(SECRET, &token).unwrap(),
            (resume_id, job_id)
        );
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let resume_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();
        assert_eq!(
            encode_matching_id(SECRET, resume_id, job_id),
            encode_matching_id(SECRET, resume_id, job_id)
        );
    }

    #[test]
    fn test_token_shape() {
        let token = encode_matching_id(SECRET, Uuid::new_v4(), Uuid::new_v4());
        let parts: Vec<&str> = token.split('.').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "v1");
        assert!(!token.contains('='), "base64url must be unpadded");
    }

    #[test]
    fn test_tampered_signature_fails() {
        let token = encode_matching_id(SECRET, Uuid::new_v4(), Uuid::new_v4());
        let mut chars: Vec<char> = token.chars().collect();
        let last = chars.len() - 1;
        chars[last] = if chars[last] == 'A' { 'B' } else { 'A' };
        let tampered: String = chars.into_iter().collect();
        assert!(decode_matching_id(SECRET, &tampered).is_err());
    }

    #[test]
    fn test_tampered_payload_fails() {
        let token = encode_matching_id(SECRET, Uuid::new_v4(), Uuid::new_v4());
        let parts: Vec<&str> = token.split('.').collect();
        let mut payload: Vec<char> = parts[1].chars().collect();
        payload[0] = if payload[0] == 'e' { 'f' } else { 'e' };
        let tampered = format!(
            "{}.{}.{}",
            parts[0],
            payload.into_iter().collect::<String>(),
            parts[2]
        );
        assert_eq!(
            decode_matching_id(SECRET, &tampered),
            Err(TokenError::SignatureMismatch)
        );
    }

    #[test]
    fn test_wrong_secret_fails() {
        let token = encode_matching_id(SECRET, Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(
            decode_matching_id("other-secret", &token),
            Err(TokenError::SignatureMismatch)
        );
    }

    #[test]
    fn test_wrong_version_fails() {
        let token = encode_matching_id(SECRET, Uuid::new_v4(), Uuid::new_v4());
        let swapped = format!("v2.{}", token.strip_prefix("v1.").unwrap());
        assert_eq!(
            decode_matching_id(SECRET, &swapped),
            Err(TokenError::BadVersion)
        );
    }

    #[test]
    fn test_malformed_tokens_fail() {
        for bad in ["", "v1", "v1.abc", "v1.a.b.c", "not-a-token", "v1..", "v1.!!.@@"] {
            assert!(decode_matching_id(SECRET, bad).is_err(), "{bad}");
        }
    }
}
