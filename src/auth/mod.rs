//! # Authentication
//!
//! Turns the account credentials into a short-lived bearer token that
//! authorizes one WebSocket upgrade.
//!
//! ## Flow:
//! 1. **signature**: `HMAC-SHA1(secret, "appId=<key>&timestamp=<ts>")`, base64
//! 2. **token**: POST the signed request to `/auth/generateToken`, read `data.token`
//!
//! Nothing is cached: every token request is signed with a fresh timestamp.

pub mod signature; // Request signing
pub mod token; // Token endpoint client

pub use signature::SignedRequest;
pub use token::TokenClient;

/// Account credentials, immutable for the lifetime of the process.
#[derive(Clone)]
pub struct Credentials {
    /// Application identifier (sent as `appKey`, signed as `appId`)
    pub app_key: String,
    /// Shared secret, only ever used as the HMAC key
    secret: String,
    /// Service host without scheme
    pub host: String,
}

impl Credentials {
    pub fn new(app_key: String, secret: String, host: String) -> Self {
        Self {
            app_key,
            secret,
            host,
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// The secret with everything but its first and last two characters hidden,
    /// for the startup banner.
    pub fn masked_secret(&self) -> String {
        let chars: Vec<char> = self.secret.chars().collect();
        if chars.len() <= 4 {
            return "*".repeat(chars.len());
        }
        let head: String = chars[..2].iter().collect();
        let tail: String = chars[chars.len() - 2..].iter().collect();
        format!("{}{}{}", head, "*".repeat(chars.len() - 4), tail)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("app_key", &self.app_key)
            .field("secret", &self.masked_secret())
            .field("host", &self.host)
            .finish()
    }
}
