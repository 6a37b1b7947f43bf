//! Request signing for the token endpoint.
//!
//! The digest (HMAC-SHA1) and the message layout are fixed by the service;
//! a signature built any other way is rejected.

use super::Credentials;
use crate::error::{AppError, AppResult};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// Sign `appId=<app_key>&timestamp=<timestamp>` with the shared secret.
///
/// Pure and deterministic: the same three inputs always give the same
/// base64 string.
pub fn sign(app_key: &str, secret: &str, timestamp: i64) -> AppResult<String> {
    let message = format!("appId={}&timestamp={}", app_key, timestamp);
    let mut mac = HmacSha1::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Signing(e.to_string()))?;
    mac.update(message.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// Body of `POST /auth/generateToken`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedRequest {
    pub signature: String,
    pub app_key: String,
    /// Unix time in seconds
    pub timestamp: i64,
}

impl SignedRequest {
    /// Build a request signed for `timestamp`.
    pub fn new(credentials: &Credentials, timestamp: i64) -> AppResult<Self> {
        Ok(Self {
            signature: sign(&credentials.app_key, credentials.secret(), timestamp)?,
            app_key: credentials.app_key.clone(),
            timestamp,
        })
    }

    /// Build a request signed for the current time.
    pub fn now(credentials: &Credentials) -> AppResult<Self> {
        Self::new(credentials, chrono::Utc::now().timestamp())
    }
}
