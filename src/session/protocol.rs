//! # Session Protocol State Machine
//!
//! ## Session Lifecycle:
//! 1. **Connecting**: transport being upgraded
//! 2. **AwaitingStart**: start message sent, waiting for `started`
//! 3. **Streaming**: writer sends audio, reader consumes results
//! 4. **Draining**: reader saw the completion signal; waiting for the writer
//! 5. **Completed**: both tasks joined, connection closed
//!
//! The handshake (steps 1 to 3) runs before any audio is sent. A wrong first
//! frame is a protocol violation and aborts the run.
//!
//! ## Receive loop dispatch (by `ack`):
//! - `warning` / `error`: logged, loop continues
//! - `result`: logged as partial or final (`eof == 1`), loop continues
//! - anything else: completion signal, loop exits
//! - read error: logged, loop calls `receive()` again
//! - connection closed: loop exits

use crate::config::EvaluationConfig;
use crate::error::{AppError, AppResult};
use crate::session::messages::{InboundMessage, StartRequest};
use crate::websocket::{Received, SessionReceiver, SessionSender, WsError};
use futures_util::{Sink, Stream};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    AwaitingStart,
    Streaming,
    Draining,
    Completed,
}

impl SessionState {
    /// The only state this one may move to. `Completed` is terminal.
    pub fn next(self) -> Option<SessionState> {
        match self {
            SessionState::Connecting => Some(SessionState::AwaitingStart),
            SessionState::AwaitingStart => Some(SessionState::Streaming),
            SessionState::Streaming => Some(SessionState::Draining),
            SessionState::Draining => Some(SessionState::Completed),
            SessionState::Completed => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Connecting => "connecting",
            SessionState::AwaitingStart => "awaiting_start",
            SessionState::Streaming => "streaming",
            SessionState::Draining => "draining",
            SessionState::Completed => "completed",
        }
    }
}

/// An acknowledged evaluation session.
///
/// `eval_id` is assigned by the server and identifies every result that follows.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationSession {
    pub eval_id: String,
    pub language: String,
    pub mode: String,
    pub ref_text: String,
    pub format: String,
    pub sample_rate: u32,
}

/// Drives one session through its states.
///
/// The current state lives in a watch channel so it can be observed while
/// the streaming tasks run.
pub struct SessionProtocol {
    state: watch::Sender<SessionState>,
    evaluation: EvaluationConfig,
}

impl SessionProtocol {
    pub fn new(evaluation: EvaluationConfig) -> Self {
        let (state, _) = watch::channel(SessionState::Connecting);
        Self { state, evaluation }
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    #[cfg(test)]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Move to the next state. Calling this on `Completed` has no effect.
    pub fn advance(&mut self) -> SessionState {
        let current = self.state();
        if let Some(next) = current.next() {
            debug!(from = current.as_str(), to = next.as_str(), "Session state change");
            self.state.send_replace(next);
        }
        self.state()
    }

    /// Send the start message and wait for the `started` acknowledgment.
    ///
    /// ## State Transition:
    /// Connecting → AwaitingStart → Streaming
    ///
    /// ## Errors:
    /// `Handshake` if the start message cannot be sent or the first inbound
    /// frame is anything other than a text frame with `ack == "started"`.
    pub async fn handshake<W, R>(
        &mut self,
        sender: &mut SessionSender<W>,
        receiver: &mut SessionReceiver<R>,
    ) -> AppResult<EvaluationSession>
    where
        W: Sink<Message, Error = WsError> + Unpin,
        R: Stream<Item = Result<Message, WsError>> + Unpin,
    {
        let state = self.state();
        if state != SessionState::Connecting {
            return Err(AppError::Handshake(format!(
                "handshake attempted in state {}",
                state.as_str()
            )));
        }

        sender
            .send_structured(&StartRequest::new(&self.evaluation))
            .await
            .map_err(|e| AppError::Handshake(format!("sending start message: {}", e)))?;
        self.advance();

        let frame = match receiver.receive().await {
            Received::Text(text) => text,
            Received::Binary(data) => {
                return Err(AppError::Handshake(format!(
                    "expected started message, got binary frame of {} bytes",
                    data.len()
                )))
            }
            Received::Error(e) => {
                return Err(AppError::Handshake(format!(
                    "reading started message: {}",
                    e
                )))
            }
            Received::Closed => {
                return Err(AppError::Handshake(
                    "connection closed before started message".to_string(),
                ))
            }
        };

        let started = match InboundMessage::parse(&frame) {
            InboundMessage::Started(started) => started,
            _ => {
                return Err(AppError::Handshake(format!(
                    "expected started message, got: {}",
                    frame
                )))
            }
        };

        if started.eval_id.is_empty() {
            warn!("Started message carries no evalId");
        }
        self.advance();
        info!(eval_id = %started.eval_id, "Evaluation session started");

        Ok(EvaluationSession {
            eval_id: started.eval_id,
            language: self.evaluation.language.clone(),
            mode: self.evaluation.mode.clone(),
            ref_text: self.evaluation.ref_text.clone(),
            format: self.evaluation.format.clone(),
            sample_rate: self.evaluation.sample_rate,
        })
    }
}

/// What the receive loop decided for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Continue,
    Complete,
}

/// Log one inbound message and decide whether the loop goes on.
pub fn dispatch(message: &InboundMessage, eval_id: &str) -> Dispatch {
    match message {
        InboundMessage::Warning(raw) => {
            warn!(eval_id = %eval_id, message = %raw, "Evaluation warning");
            Dispatch::Continue
        }
        InboundMessage::Error(raw) => {
            error!(eval_id = %eval_id, message = %raw, "Evaluation error");
            Dispatch::Continue
        }
        InboundMessage::Result(result) => {
            let kind = if result.is_final() { "final" } else { "partial" };
            info!(
                eval_id = %eval_id,
                kind = kind,
                message = %result.raw,
                "Successfully fetched results"
            );
            Dispatch::Continue
        }
        InboundMessage::Completed(raw) => {
            info!(eval_id = %eval_id, message = %raw, "Evaluation completed");
            Dispatch::Complete
        }
        // A second `started` is not expected mid-session; treat it like any
        // other unrecognised tag
        InboundMessage::Started(_) => {
            info!(eval_id = %eval_id, tag = message.tag(), "Evaluation completed");
            Dispatch::Complete
        }
    }
}

/// Why the receive loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// A frame with an unrecognised (or no) `ack`
    Signal,
    /// The connection closed first
    Closed,
}

/// Counters collected by the receive loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveSummary {
    pub frames: usize,
    pub warnings: usize,
    pub errors: usize,
    pub partial_results: usize,
    pub final_results: usize,
    pub read_errors: usize,
    pub completion: Completion,
}

impl Default for ReceiveSummary {
    fn default() -> Self {
        Self {
            frames: 0,
            warnings: 0,
            errors: 0,
            partial_results: 0,
            final_results: 0,
            read_errors: 0,
            completion: Completion::Closed,
        }
    }
}

impl ReceiveSummary {
    fn record(&mut self, message: &InboundMessage) {
        self.frames += 1;
        match message {
            InboundMessage::Warning(_) => self.warnings += 1,
            InboundMessage::Error(_) => self.errors += 1,
            InboundMessage::Result(result) if result.is_final() => self.final_results += 1,
            InboundMessage::Result(_) => self.partial_results += 1,
            InboundMessage::Started(_) | InboundMessage::Completed(_) => {}
        }
    }
}

/// The reader task: consume inbound frames until the completion signal.
///
/// Read errors do not end the loop. With the WebSocket transport a broken
/// connection yields one error and then [`Received::Closed`], which does.
pub async fn receive_results<R>(
    receiver: &mut SessionReceiver<R>,
    eval_id: &str,
) -> ReceiveSummary
where
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let mut summary = ReceiveSummary::default();

    loop {
        let message = match receiver.receive().await {
            Received::Text(text) => InboundMessage::parse(&text),
            Received::Binary(data) => InboundMessage::parse(&String::from_utf8_lossy(&data)),
            Received::Error(e) => {
                summary.read_errors += 1;
                warn!(eval_id = %eval_id, error = %e, "Read error on result stream");
                continue;
            }
            Received::Closed => {
                warn!(eval_id = %eval_id, "Connection closed before completion");
                summary.completion = Completion::Closed;
                break;
            }
        };

        summary.record(&message);
        if dispatch(&message, eval_id) == Dispatch::Complete {
            summary.completion = Completion::Signal;
            break;
        }
    }

    summary
}
