//! Token endpoint client.
//!
//! One call, one request: sign, POST, check the body code, return the token.
//! A failure here ends the run, so there is no retry.

use super::{Credentials, SignedRequest};
use crate::error::{AppError, AppResult};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

/// Body code the service uses for success.
pub const SUCCESS_CODE: &str = "00000";

/// HTTP client for `POST /auth/generateToken`.
pub struct TokenClient {
    client: Client,
    endpoint: String,
}

/// Response envelope: `{"code": "00000", "data": {"token": "..."}}`.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    code: Option<Value>,
    #[serde(default)]
    data: Option<Value>,
}

/// A JSON value as text: strings as-is, other scalars in their JSON form,
/// null or absent as empty.
fn text_of(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

impl TokenResponse {
    /// The code as text; numeric codes are accepted too.
    fn code_text(&self) -> String {
        text_of(self.code.as_ref())
    }

    /// `data.token`, empty when `data` is missing or has no token.
    fn token_text(&self) -> String {
        text_of(self.data.as_ref().and_then(|data| data.get("token")))
    }
}

impl TokenClient {
    /// Create a client for the given token endpoint URL
    /// (e.g. "https://api.example.com/auth/generateToken").
    pub fn new(endpoint: String) -> AppResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::TokenRequest(format!("HTTP client setup: {}", e)))?;

        Ok(Self { client, endpoint })
    }

    /// Exchange a freshly signed request for a bearer token.
    ///
    /// ## Errors:
    /// - `TokenRequest`: the request could not be sent or the body not read
    /// - `TokenRejected`: the body code is not `"00000"`, the body is not
    ///   JSON, or the token is missing
    ///
    /// The HTTP status is not consulted; the body code is authoritative.
    pub async fn acquire_token(&self, credentials: &Credentials) -> AppResult<String> {
        let request = SignedRequest::now(credentials)?;
        debug!(
            endpoint = %self.endpoint,
            timestamp = request.timestamp,
            "Requesting session token"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::TokenRequest(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::TokenRequest(format!("reading body: {}", e)))?;

        let parsed: TokenResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) => {
                return Err(AppError::TokenRejected {
                    code: String::new(),
                    body,
                })
            }
        };

        let code = parsed.code_text();
        if code != SUCCESS_CODE {
            return Err(AppError::TokenRejected { code, body });
        }

        let token = parsed.token_text();
        if token.is_empty() {
            return Err(AppError::TokenRejected { code, body });
        }

        info!(status = %status.as_u16(), "Session token acquired");
        Ok(token)
    }
}
