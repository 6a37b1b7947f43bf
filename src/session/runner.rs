//! # Run Orchestration
//!
//! ## Sequence:
//! 1. **Preflight**: open the audio file (before spending a token)
//! 2. **Token**: sign and exchange for a bearer token
//! 3. **Connect**: WebSocket upgrade with `Authorization: Bearer <token>`
//! 4. **Handshake**: start message, wait for `started`
//! 5. **Streaming**: writer and reader run as two spawned tasks
//! 6. **Join**: the session drains once the reader exits; after the writer
//!    also finishes the connection is closed
//!
//! Steps 1 to 4 are fatal on failure. In step 5 a writer failure only ends
//! the writer; the run still waits for the reader and succeeds.

use crate::audio::{AudioSource, AudioStreamer, StreamSummary};
use crate::auth::TokenClient;
use crate::config::AppConfig;
use crate::error::AppResult;
use crate::session::protocol::{receive_results, EvaluationSession, ReceiveSummary, SessionProtocol};
use crate::websocket;
use tokio::io::AsyncRead;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, Instrument, Span};

/// Outcome of a run that got past the handshake.
#[derive(Debug)]
pub struct RunReport {
    pub session: EvaluationSession,
    pub received: ReceiveSummary,
    /// `None` when the writer gave up early
    pub streamed: Option<StreamSummary>,
}

/// Run one full evaluation with the given configuration.
pub async fn run(config: &AppConfig) -> AppResult<RunReport> {
    let source = AudioSource::open(&config.audio.path, config.audio.chunk_size).await?;

    let token = TokenClient::new(config.token_url())?
        .acquire_token(&config.credentials())
        .await?;

    run_session(config, source, &token).await
}

/// Connect with an already acquired token and run the session to completion.
pub async fn run_session<R>(
    config: &AppConfig,
    source: AudioSource<R>,
    token: &str,
) -> AppResult<RunReport>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let connection = websocket::connect(&config.stream_url(), token).await?;
    let (mut sender, mut receiver) = connection.split();

    let mut protocol = SessionProtocol::new(config.evaluation.clone());
    let session = protocol.handshake(&mut sender, &mut receiver).await?;
    // The evalId is what support asks for; print it where scripts can capture it
    println!("{}", session.eval_id);

    info!(
        eval_id = %session.eval_id,
        language = %session.language,
        mode = %session.mode,
        ref_text = %session.ref_text,
        format = %session.format,
        sample_rate = session.sample_rate,
        "Streaming audio"
    );

    let streamer = AudioStreamer::new(source, config.audio.pacing_interval());
    let eval_id = session.eval_id.clone();

    let reader = tokio::spawn(
        async move { receive_results(&mut receiver, &eval_id).await }.instrument(Span::current()),
    );
    let writer = tokio::spawn(
        async move {
            let result = streamer.run(&mut sender).await;
            (sender, result)
        }
        .instrument(Span::current()),
    );

    let (received, (mut sender, streamed)) = join_tasks(&mut protocol, reader, writer).await?;

    let streamed = match streamed {
        Ok(summary) => Some(summary),
        Err(e) => {
            error!(eval_id = %session.eval_id, error = %e, "Audio streaming ended early");
            None
        }
    };

    if let Err(e) = sender.close().await {
        debug!(error = %e, "Closing connection failed");
    }
    protocol.advance();

    info!(
        eval_id = %session.eval_id,
        state = protocol.state().as_str(),
        results = received.partial_results + received.final_results,
        final_results = received.final_results,
        frames = received.frames,
        warnings = received.warnings,
        errors = received.errors,
        read_errors = received.read_errors,
        "Session finished"
    );

    Ok(RunReport {
        session,
        received,
        streamed,
    })
}

/// Barrier over the two streaming tasks.
///
/// Both run concurrently from the moment they are spawned. The protocol moves
/// to `Draining` as soon as the reader exits, while the writer may still be
/// sending audio, and this returns once the writer has finished too.
async fn join_tasks<W>(
    protocol: &mut SessionProtocol,
    reader: JoinHandle<ReceiveSummary>,
    writer: JoinHandle<W>,
) -> AppResult<(ReceiveSummary, W)> {
    let received = reader.await?;
    protocol.advance();
    let written = writer.await?;
    Ok((received, written))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::session::protocol::Completion;
    use crate::session::protocol::SessionState;
    use crate::testing::{spawn_token_mock, MockEvalServer, Script};
    use std::io::Cursor;
    use std::time::Duration;
    use tokio_tungstenite::tungstenite::Message;

    fn local_config(server: &MockEvalServer) -> AppConfig {
        let mut config = AppConfig::default();
        config.service.host = server.host();
        config.service.app_key = "app-1".to_string();
        config.service.app_secret = "secret".to_string();
        config.service.secure = false;
        config.audio.pacing_enabled = false;
        config
    }

    fn audio(len: usize) -> AudioSource<Cursor<Vec<u8>>> {
        AudioSource::new(Cursor::new(vec![0x2a; len]), 7680)
    }

    #[tokio::test]
    async fn test_end_to_end_session() {
        let server = MockEvalServer::start(Script::started("E1").with_after_stop(&[
            r#"{"ack":"result","eof":0,"evalId":"E1","result":{"overall":30}}"#,
            r#"{"ack":"result","eof":0,"evalId":"E1","result":{"overall":65}}"#,
            r#"{"ack":"result","eof":1,"evalId":"E1","result":{"overall":88}}"#,
            r#"{"evalId":"E1","status":"completed"}"#,
        ]))
        .await;
        let config = local_config(&server);

        let report = run_session(&config, audio(76_800), "tok-e2e").await.unwrap();
        assert_eq!(report.session.eval_id, "E1");
        assert_eq!(report.streamed, Some(StreamSummary { chunks: 10, bytes: 76_800 }));
        assert_eq!(report.received.partial_results, 2);
        assert_eq!(report.received.final_results, 1);
        assert_eq!(report.received.completion, Completion::Signal);

        let recorded = server.finish().await;
        assert_eq!(recorded.path, "/en-US/word");
        assert_eq!(recorded.authorization.as_deref(), Some("Bearer tok-e2e"));

        // start, 10 audio frames, stop, close
        let binary = recorded.binary_frames();
        assert_eq!(binary.len(), 10);
        assert_eq!(binary.iter().map(|data| data.len()).sum::<usize>(), 76_800);

        let texts = recorded.text_frames();
        assert_eq!(texts.len(), 2);
        assert_eq!(texts[0]["common"]["cmd"], "start");
        assert_eq!(texts[0]["payload"]["params"]["refText"], "supermarket");
        assert_eq!(texts[1]["common"]["cmd"], "stop");

        // Audio strictly between start and stop
        assert!(matches!(recorded.frames[0], Message::Text(_)));
        assert!(matches!(recorded.frames[11], Message::Text(_)));
        assert!(recorded.frames[1..11]
            .iter()
            .all(|frame| matches!(frame, Message::Binary(_))));
    }

    #[tokio::test]
    async fn test_early_completion_does_not_cut_writer_short() {
        let server = MockEvalServer::start(
            Script::started("E2").with_early(&[r#"{"ack":"warning"}"#, r#"{"status":"done"}"#]),
        )
        .await;
        let config = local_config(&server);

        let report = run_session(&config, audio(30_000), "tok").await.unwrap();
        assert_eq!(report.received.warnings, 1);
        assert_eq!(report.received.completion, Completion::Signal);
        assert_eq!(report.streamed.map(|s| s.chunks), Some(4));

        let recorded = server.finish().await;
        assert_eq!(recorded.binary_frames().len(), 4);
        assert_eq!(recorded.text_frames().last().unwrap()["common"]["cmd"], "stop");
    }

    #[tokio::test]
    async fn test_handshake_violation_aborts_run() {
        let mut script = Script::started("unused");
        script.first_reply = r#"{"ack":"error","msg":"unsupported mode"}"#.to_string();
        let server = MockEvalServer::start(script).await;
        let config = local_config(&server);

        match run_session(&config, audio(7680), "tok").await {
            Err(AppError::Handshake(msg)) => assert!(msg.contains("unsupported mode")),
            other => panic!("expected handshake failure, got {:?}", other),
        }

        // Only the start message was sent; no audio leaked out
        let recorded = server.finish().await;
        assert!(recorded.binary_frames().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_upgrade_aborts_run() {
        let server = MockEvalServer::start(Script::rejecting(403)).await;
        let config = local_config(&server);

        assert!(matches!(
            run_session(&config, audio(7680), "tok").await,
            Err(AppError::Connect(_))
        ));
        server.finish().await;
    }

    #[tokio::test]
    async fn test_missing_audio_fails_before_token_request() {
        let mut config = AppConfig::default();
        // Nothing listens here; reaching the network would be a TokenRequest error
        config.service.host = "127.0.0.1:9".to_string();
        config.service.secure = false;
        config.audio.path = "/no/such/recording.wav".to_string();

        assert!(matches!(run(&config).await, Err(AppError::AudioSource(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_draining_starts_when_reader_exits() {
        let mut protocol = SessionProtocol::new(AppConfig::default().evaluation);
        protocol.advance();
        protocol.advance();
        assert_eq!(protocol.state(), SessionState::Streaming);

        let start = tokio::time::Instant::now();
        let mut states = protocol.subscribe();
        let watcher = tokio::spawn(async move {
            states
                .wait_for(|state| *state == SessionState::Draining)
                .await
                .map(|_| ())
                .unwrap();
            tokio::time::Instant::now()
        });

        // Reader done immediately, writer still pacing for a second
        let reader = tokio::spawn(async { ReceiveSummary::default() });
        let writer = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            "written"
        });

        let (_, written) = join_tasks(&mut protocol, reader, writer).await.unwrap();
        assert_eq!(written, "written");
        assert_eq!(protocol.state(), SessionState::Draining);

        let drained_at = watcher.await.unwrap();
        assert!(drained_at - start < Duration::from_secs(1));
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    /// A config pointing at a local token endpoint, with a real audio file.
    async fn token_config(host: String) -> (AppConfig, std::path::PathBuf) {
        let path = std::env::temp_dir().join(format!("speech-eval-{}.wav", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, vec![0x2a; 7680]).await.unwrap();

        let mut config = AppConfig::default();
        config.service.host = host;
        config.service.app_key = "app-1".to_string();
        config.service.app_secret = "secret".to_string();
        config.service.secure = false;
        config.audio.path = path.to_str().unwrap().to_string();
        config.audio.pacing_enabled = false;
        (config, path)
    }

    #[actix_web::test]
    async fn test_rejected_token_aborts_run() {
        let (addr, requests) = spawn_token_mock(serde_json::json!({
            "code": "10001",
            "msg": "invalid signature"
        }));
        let (config, path) = token_config(addr.to_string()).await;

        match run(&config).await {
            Err(AppError::TokenRejected { code, .. }) => assert_eq!(code, "10001"),
            other => panic!("expected token rejection, got {:?}", other),
        }
        // One signed request, for the configured account
        let requests = requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0]["appKey"], "app-1");

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[actix_web::test]
    async fn test_accepted_token_moves_on_to_upgrade() {
        let (addr, requests) = spawn_token_mock(serde_json::json!({
            "code": "00000",
            "data": { "token": "tok-run" }
        }));
        let (config, path) = token_config(addr.to_string()).await;

        // The token host serves no WebSocket route, so the upgrade is refused
        match run(&config).await {
            Err(AppError::Connect(msg)) => assert!(msg.contains("404"), "{}", msg),
            other => panic!("expected refused upgrade, got {:?}", other),
        }
        assert_eq!(requests.lock().unwrap().len(), 1);

        tokio::fs::remove_file(&path).await.unwrap();
    }
}
