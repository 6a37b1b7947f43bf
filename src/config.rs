//! # Configuration Management
//!
//! This module loads the run configuration from multiple sources:
//! - TOML configuration file (config.toml, optional)
//! - Environment variables (with APP_ prefix, `__` between nesting levels)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Shortcut variables `EVAL_HOST`, `EVAL_APP_KEY`, `EVAL_APP_SECRET`
//! 2. Environment variables (APP_SERVICE__HOST, APP_AUDIO__CHUNK_SIZE, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)
//!
//! The configuration is built once at startup and then only read. Every
//! component receives the part it needs by reference.

use crate::auth::Credentials;
use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Path of the token endpoint, relative to the service host.
pub const TOKEN_PATH: &str = "/auth/generateToken";

/// Main configuration for one evaluation run.
///
/// ## Why separate config structs:
/// The service account, the evaluation request, and the audio source change
/// independently (the same account evaluates many recordings).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub evaluation: EvaluationConfig,
    pub audio: AudioConfig,
}

/// Account and endpoint settings, as issued with the application key.
///
/// ## Fields:
/// - `host`: API host without scheme (e.g. "api.speech-eval.example.com")
/// - `app_key`: application identifier (uuid format)
/// - `app_secret`: shared secret used to sign token requests
/// - `secure`: use `https`/`wss` (true) or `http`/`ws` (false, local servers only)
#[derive(Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub host: String,
    pub app_key: String,
    pub app_secret: String,
    pub secure: bool,
}

/// Never print the secret, not even at debug level.
impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("host", &self.host)
            .field("app_key", &self.app_key)
            .field("app_secret", &"***")
            .field("secure", &self.secure)
            .finish()
    }
}

/// What to evaluate and how the server should interpret the audio.
///
/// ## Fields:
/// - `language`: language type, also the first path segment of the stream URL (e.g. "en-US")
/// - `mode`: assessment question type, the second path segment (e.g. "word", "sentence")
/// - `ref_text`: the text the speaker is expected to read
/// - `format` / `sample_rate`: declared audio format of the stream
/// - `attach_audio_url`: ask the server to include a link to the stored audio in results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    pub language: String,
    pub mode: String,
    pub ref_text: String,
    pub format: String,
    pub sample_rate: u32,
    pub attach_audio_url: bool,
}

/// Audio source and pacing.
///
/// ## Pacing:
/// The service expects audio at roughly real-time cadence. With the defaults
/// (7680 bytes every 240ms) a 16kHz 16-bit mono stream is sent at exactly
/// real-time speed: 16000 * 2 * 0.24 = 7680.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub path: String,
    pub chunk_size: usize,
    pub pacing_enabled: bool,
    pub pacing_interval_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                host: String::new(),
                app_key: String::new(),
                app_secret: String::new(),
                secure: true,
            },
            evaluation: EvaluationConfig {
                language: "en-US".to_string(),
                mode: "word".to_string(),
                ref_text: "supermarket".to_string(),
                format: "wav".to_string(),
                sample_rate: 16000,
                attach_audio_url: true,
            },
            audio: AudioConfig {
                path: "./supermarket.wav".to_string(),
                chunk_size: 7680,
                pacing_enabled: true,
                pacing_interval_ms: 240,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, `config.toml` and the environment.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVICE__HOST=api.example.com`
    /// - `APP_AUDIO__PACING_ENABLED=false`: send audio as fast as possible
    /// - `APP_EVALUATION__REF_TEXT="good morning"`
    /// - `EVAL_APP_SECRET=...`: shortcut for the secret
    pub fn load() -> AppResult<Self> {
        Self::load_with_file(config::File::with_name("config").required(false))
    }

    /// Same layering as [`AppConfig::load`], with the file layer supplied by the caller.
    pub fn load_with_file<S>(file: S) -> AppResult<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        Self::load_layers(file, Self::environment())
    }

    /// `APP_SECTION__FIELD` variables.
    ///
    /// Values stay strings here: numeric and boolean fields are converted
    /// when deserialized, and string fields such as secrets keep leading zeros.
    fn environment() -> config::Environment {
        config::Environment::with_prefix("APP")
            .prefix_separator("_")
            .separator("__")
    }

    fn load_layers<S>(file: S, environment: config::Environment) -> AppResult<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let mut settings = config::Config::builder()
            // 1. Start with defaults
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // 2. Configuration file
            .add_source(file)
            // 3. Environment variables
            .add_source(environment);

        // Shortcuts matching the names the credentials are delivered under
        for (var, key) in [
            ("EVAL_HOST", "service.host"),
            ("EVAL_APP_KEY", "service.app_key"),
            ("EVAL_APP_SECRET", "service.app_secret"),
        ] {
            if let Ok(value) = env::var(var) {
                settings = settings.set_override(key, value)?;
            }
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - The three account values are present
    /// - Language and mode are non-empty (they form the stream URL path)
    /// - Chunk size is greater than 0
    pub fn validate(&self) -> AppResult<()> {
        if self.service.host.trim().is_empty() {
            return Err(AppError::Config("service.host is required".to_string()));
        }
        if self.service.host.contains("://") {
            return Err(AppError::Config(
                "service.host must not include a scheme".to_string(),
            ));
        }
        if self.service.app_key.trim().is_empty() {
            return Err(AppError::Config("service.app_key is required".to_string()));
        }
        if self.service.app_secret.is_empty() {
            return Err(AppError::Config("service.app_secret is required".to_string()));
        }
        if self.evaluation.language.trim().is_empty() || self.evaluation.mode.trim().is_empty() {
            return Err(AppError::Config(
                "evaluation.language and evaluation.mode must not be empty".to_string(),
            ));
        }
        if self.audio.chunk_size == 0 {
            return Err(AppError::Config(
                "audio.chunk_size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Account credentials used for signing and token acquisition.
    pub fn credentials(&self) -> Credentials {
        Credentials::new(
            self.service.app_key.clone(),
            self.service.app_secret.clone(),
            self.service.host.clone(),
        )
    }

    /// `https://<host>/auth/generateToken`
    pub fn token_url(&self) -> String {
        let scheme = if self.service.secure { "https" } else { "http" };
        format!("{}://{}{}", scheme, self.service.host, TOKEN_PATH)
    }

    /// `wss://<host>/<language>/<mode>`
    pub fn stream_url(&self) -> String {
        let scheme = if self.service.secure { "wss" } else { "ws" };
        format!(
            "{}://{}/{}/{}",
            scheme, self.service.host, self.evaluation.language, self.evaluation.mode
        )
    }
}

impl AudioConfig {
    /// Delay before each chunk, or `None` when pacing is off.
    pub fn pacing_interval(&self) -> Option<Duration> {
        if self.pacing_enabled {
            Some(Duration::from_millis(self.pacing_interval_ms))
        } else {
            None
        }
    }
}
