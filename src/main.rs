//! # Speech Evaluation Client - Main Application Entry Point
//!
//! Streams a recorded audio file to a pronunciation evaluation service and
//! logs the assessment results as they arrive.
//!
//! ## What one run does:
//! 1. Signs the application credentials and exchanges them for a token
//! 2. Opens a WebSocket session for the configured language and mode
//! 3. Sends the start message and waits for the session's evalId
//! 4. Streams the audio in paced chunks while reading results concurrently
//! 5. Sends the stop message and waits for the completion signal
//!
//! ## Application Architecture:
//! - **config**: Layered configuration (defaults, config.toml, environment)
//! - **auth**: Request signing and token acquisition
//! - **websocket**: Connection with independent send and receive halves
//! - **session**: Wire messages, protocol state machine, run orchestration
//! - **audio**: Chunked audio source and the paced writer task
//! - **error**: Error types shared by every module

mod audio; // Audio source and writer task (audio/ directory)
mod auth; // Signing and token exchange (auth/ directory)
mod config; // Configuration management (config.rs)
mod error; // Error handling types (error.rs)
mod session; // Evaluation session (session/ directory)
mod websocket; // WebSocket transport (websocket.rs)

#[cfg(test)]
mod testing;

use anyhow::Result;
use config::AppConfig;
use tracing::{error, info, Instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// The main application entry point.
///
/// Exits non-zero when configuration, token acquisition, connection, or the
/// handshake fails. Failures after the handshake are logged and the run still
/// ends normally.
#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    let credentials = config.credentials();
    info!("Starting speech-eval-client v{}", env!("CARGO_PKG_VERSION"));
    info!(
        app_key = %credentials.app_key,
        host = %credentials.host,
        secret = %credentials.masked_secret(),
        "Configuration loaded"
    );
    info!(
        language = %config.evaluation.language,
        mode = %config.evaluation.mode,
        ref_text = %config.evaluation.ref_text,
        audio = %config.audio.path,
        "Evaluation request"
    );

    let span = tracing::info_span!("evaluation", run_id = %Uuid::new_v4());
    let report = match session::run(&config).instrument(span).await {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "Evaluation failed");
            return Err(e.into());
        }
    };

    info!(
        eval_id = %report.session.eval_id,
        chunks = report.streamed.map(|s| s.chunks).unwrap_or(0),
        partial_results = report.received.partial_results,
        final_results = report.received.final_results,
        completion = ?report.received.completion,
        "Evaluation run complete"
    );
    Ok(())
}

/// Initialize the tracing (logging) system.
///
/// ## Environment Variables:
/// - `RUST_LOG`: Controls what gets logged (e.g. "speech_eval_client=debug")
/// - If not set, defaults to "speech_eval_client=info"
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "speech_eval_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}
