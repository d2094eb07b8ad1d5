//! Stateless continuation-token codec.
//!
//! Wire format: `base64url(JSON payload) + "." + base64url(HMAC-SHA512)`.
//! The signature is computed over the encoded payload segment with a
//! process-wide secret. Tokens guarantee integrity and authenticity, not
//! confidentiality — the payload is readable by anyone holding the token.

use std::fmt::{Display, Formatter};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha512;

use crate::{AppError, Result};

type HmacSha512 = Hmac<Sha512>;

/// Claims carried by a continuation token.
///
/// Field names follow the wire format of the `pi-pull-next` header;
/// timestamps are epoch milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenPayload {
    /// Participant the token was issued to.
    pub ispb: String,
    /// Thread slot assigned at issuance.
    pub thread: u8,
    /// Monotonic cursor sequence of the delivered batch.
    #[serde(rename = "cursorSeq")]
    pub cursor_seq: i64,
    /// Opaque position marker (stream id of the delivered batch).
    #[serde(rename = "cursorOffset")]
    pub cursor_offset: String,
    /// Shard identifier, `{region}:{ispb}`.
    pub shard: String,
    /// Issuance timestamp.
    #[serde(rename = "issuedAt")]
    pub issued_at: i64,
    /// Expiry timestamp; tokens past this instant are never accepted.
    pub exp: i64,
}

/// Verification failure kinds, surfaced verbatim to the protocol layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    /// Token does not have the `payload.signature` shape.
    Malformed,
    /// Signature does not match the payload segment.
    BadSignature,
    /// Signature is valid but the expiry has passed.
    Expired,
}

impl Display for TokenError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed => write!(f, "malformed token"),
            Self::BadSignature => write!(f, "invalid signature"),
            Self::Expired => write!(f, "token expired"),
        }
    }
}

impl std::error::Error for TokenError {}

/// Encoder/verifier for continuation tokens. Pure, no I/O.
#[derive(Clone)]
pub struct TokenCodec {
    secret: Vec<u8>,
}

impl TokenCodec {
    /// Create a codec signing with the given process-wide secret.
    #[must_use]
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Serialize and sign a payload into an opaque token.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Token` if the payload cannot be serialized or the
    /// MAC cannot be keyed.
    pub fn encode(&self, payload: &TokenPayload) -> Result<String> {
        let json = serde_json::to_vec(payload)
            .map_err(|err| AppError::Token(format!("payload serialization failed: {err}")))?;
        let encoded = URL_SAFE_NO_PAD.encode(json);
        let signature = URL_SAFE_NO_PAD.encode(self.sign(encoded.as_bytes())?);
        Ok(format!("{encoded}.{signature}"))
    }

    /// Verify a token and return its payload.
    ///
    /// The signature is checked with a constant-time comparison before the
    /// payload is decoded; expiry is checked only after the signature passes.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Malformed`] when the token lacks the two-part
    /// shape or the payload segment does not decode, [`TokenError::BadSignature`]
    /// on signature mismatch, and [`TokenError::Expired`] when `exp` has passed.
    pub fn verify(&self, token: &str) -> std::result::Result<TokenPayload, TokenError> {
        let (encoded, provided) = token.split_once('.').ok_or(TokenError::Malformed)?;
        if encoded.is_empty() || provided.is_empty() {
            return Err(TokenError::Malformed);
        }

        let provided = URL_SAFE_NO_PAD
            .decode(provided)
            .map_err(|_| TokenError::BadSignature)?;
        let mut mac = HmacSha512::new_from_slice(&self.secret)
            .map_err(|_| TokenError::BadSignature)?;
        mac.update(encoded.as_bytes());
        mac.verify_slice(&provided)
            .map_err(|_| TokenError::BadSignature)?;

        let raw = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| TokenError::Malformed)?;
        let payload: TokenPayload =
            serde_json::from_slice(&raw).map_err(|_| TokenError::Malformed)?;

        if Utc::now().timestamp_millis() > payload.exp {
            return Err(TokenError::Expired);
        }

        Ok(payload)
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut mac = HmacSha512::new_from_slice(&self.secret)
            .map_err(|err| AppError::Token(format!("invalid mac key: {err}")))?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // Never expose the secret through debug output.
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}
