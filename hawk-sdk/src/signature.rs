//! Signing of outbound trade-action webhooks.
//!
//! Every webhook body is sent with
//!
//! ```text
//! Hawk-Signature: {unix_timestamp}.{base64(HMAC-SHA256("{unix_timestamp}.{json}", secret))}
//! ```
//!
//! A receiver recomputes the MAC over the exact body bytes it got, using the
//! same [`WebhookSigner`], and rejects signatures older than
//! [`MAX_SIGNATURE_AGE`] seconds.

use ring::hmac;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Header name for the HMAC signature.
pub const SIGNATURE_HEADER: &str = "Hawk-Signature";

/// Header name for admin authentication (plaintext secret).
pub const ADMIN_AUTH_HEADER: &str = "Hawk-Admin-Authorization";

/// Maximum allowed age of a signature (in seconds).
pub const MAX_SIGNATURE_AGE: i64 = 5 * 60;

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("invalid header format")]
    InvalidFormat,
    #[error("invalid base64 encoding")]
    InvalidBase64,
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid signature")]
    SignatureMismatch,
    #[error("signature expired")]
    Expired,
}

/// A serialized body and the header value that authenticates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPayload {
    pub json: String,
    pub header: String,
}

/// Signs and verifies webhook bodies with one shared secret.
pub struct WebhookSigner {
    key: hmac::Key,
}

impl std::fmt::Debug for WebhookSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookSigner").finish_non_exhaustive()
    }
}

impl WebhookSigner {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
        }
    }

    /// Serialize `body` and sign it with the current time.
    pub fn sign<T: Serialize>(&self, body: &T) -> Result<SignedPayload, serde_json::Error> {
        self.sign_at(body, time::OffsetDateTime::now_utc().unix_timestamp())
    }

    fn sign_at<T: Serialize>(
        &self,
        body: &T,
        timestamp: i64,
    ) -> Result<SignedPayload, serde_json::Error> {
        let json = serde_json::to_string(body)?;
        let tag = hmac::sign(&self.key, signed_data(timestamp, &json).as_bytes());
        let header = format!(
            "{timestamp}.{}",
            fast32::base64::RFC4648_NOPAD.encode(tag.as_ref())
        );
        Ok(SignedPayload { json, header })
    }

    /// Check `header` against the raw `json` body, then deserialize it.
    pub fn verify<T: DeserializeOwned>(&self, header: &str, json: &str) -> Result<T, SignatureError> {
        let (timestamp, tag) = parse_header(header)?;
        hmac::verify(&self.key, signed_data(timestamp, json).as_bytes(), &tag)
            .map_err(|_| SignatureError::SignatureMismatch)?;

        let age = time::OffsetDateTime::now_utc().unix_timestamp() - timestamp;
        if age > MAX_SIGNATURE_AGE {
            return Err(SignatureError::Expired);
        }
        Ok(serde_json::from_str(json)?)
    }
}

fn signed_data(timestamp: i64, json: &str) -> String {
    format!("{timestamp}.{json}")
}

fn parse_header(value: &str) -> Result<(i64, Vec<u8>), SignatureError> {
    let (timestamp, encoded) = value.split_once('.').ok_or(SignatureError::InvalidFormat)?;
    let timestamp = timestamp
        .parse()
        .map_err(|_| SignatureError::InvalidFormat)?;
    let tag = fast32::base64::RFC4648_NOPAD
        .decode_str(encoded)
        .map_err(|_| SignatureError::InvalidBase64)?;
    Ok((timestamp, tag))
}
