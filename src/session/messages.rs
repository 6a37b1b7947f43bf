//! # Wire Messages
//!
//! Typed versions of every JSON frame exchanged with the evaluation service.
//!
//! ## Client → Server:
//! - [`StartRequest`]: `{common:{api,cmd:"start"}, payload:{params:{refText,mode}, langType, attachAudioUrl, format, sampleRate}}`
//! - [`StopRequest`]: `{common:{cmd:"stop",api}}`
//! - audio: binary frames, not modelled here
//!
//! ## Server → Client:
//! Every frame carries an `ack` tag: `started`, `warning`, `error`, `result`.
//! Anything else, including a frame without `ack`, means the session is complete.
//!
//! Inbound parsing is lenient on purpose: a frame that is not valid JSON
//! simply has no `ack`, which classifies it as [`InboundMessage::Completed`].

use crate::config::EvaluationConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Value of `common.api` in every client message.
pub const API_NAME: &str = "speecheval";

/// `common` block shared by start and stop requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Common {
    pub api: String,
    pub cmd: String,
}

impl Common {
    fn command(cmd: &str) -> Self {
        Self {
            api: API_NAME.to_string(),
            cmd: cmd.to_string(),
        }
    }
}

/// First message of every session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartRequest {
    pub common: Common,
    pub payload: StartPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPayload {
    pub params: StartParams,
    pub lang_type: String,
    pub attach_audio_url: bool,
    pub format: String,
    pub sample_rate: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartParams {
    pub ref_text: String,
    pub mode: String,
}

impl StartRequest {
    pub fn new(evaluation: &EvaluationConfig) -> Self {
        Self {
            common: Common::command("start"),
            payload: StartPayload {
                params: StartParams {
                    ref_text: evaluation.ref_text.clone(),
                    mode: evaluation.mode.clone(),
                },
                lang_type: evaluation.language.clone(),
                attach_audio_url: evaluation.attach_audio_url,
                format: evaluation.format.clone(),
                sample_rate: evaluation.sample_rate,
            },
        }
    }
}

/// Sent by the writer once the audio source is exhausted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopRequest {
    pub common: Common,
}

impl StopRequest {
    pub fn new() -> Self {
        Self {
            common: Common::command("stop"),
        }
    }
}

impl Default for StopRequest {
    fn default() -> Self {
        Self::new()
    }
}

/// `{"ack":"started","evalId":"..."}`
#[derive(Debug, Clone, PartialEq)]
pub struct StartedResponse {
    pub eval_id: String,
}

/// A `result` frame. `eof == 1` marks the final result of the session.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultFrame {
    pub eof: i64,
    /// The frame as received, for logging
    pub raw: String,
}

impl ResultFrame {
    pub fn is_final(&self) -> bool {
        self.eof == 1
    }
}

/// One inbound frame, classified by its `ack` tag.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Started(StartedResponse),
    Warning(String),
    Error(String),
    Result(ResultFrame),
    /// Any other tag, or none at all
    Completed(String),
}

/// Only the fields used for classification; everything else stays in `raw`.
#[derive(Debug, Default, Deserialize)]
struct Envelope {
    #[serde(default)]
    ack: Option<Value>,
    #[serde(default, rename = "evalId")]
    eval_id: Option<Value>,
    #[serde(default)]
    eof: Option<Value>,
}

/// Read a JSON value as text the way a loose client would: strings as-is,
/// numbers and booleans in their JSON form, null or absent as empty.
fn text_of(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Read the `eof` flag as an integer. `"1"`, `1`, `1.0` and `true` all count as 1.
fn flag_of(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Some(Value::String(text)) => text
            .trim()
            .parse::<i64>()
            .or_else(|_| text.trim().parse::<f64>().map(|f| f as i64))
            .unwrap_or(0),
        Some(Value::Bool(true)) => 1,
        _ => 0,
    }
}

impl InboundMessage {
    /// Classify a text frame.
    pub fn parse(text: &str) -> Self {
        let envelope: Envelope = serde_json::from_str(text).unwrap_or_default();

        match text_of(envelope.ack.as_ref()).as_str() {
            "started" => InboundMessage::Started(StartedResponse {
                eval_id: text_of(envelope.eval_id.as_ref()),
            }),
            "warning" => InboundMessage::Warning(text.to_string()),
            "error" => InboundMessage::Error(text.to_string()),
            "result" => InboundMessage::Result(ResultFrame {
                eof: flag_of(envelope.eof.as_ref()),
                raw: text.to_string(),
            }),
            _ => InboundMessage::Completed(text.to_string()),
        }
    }

    /// The `ack` tag this message was classified under, for logging.
    pub fn tag(&self) -> &'static str {
        match self {
            InboundMessage::Started(_) => "started",
            InboundMessage::Warning(_) => "warning",
            InboundMessage::Error(_) => "error",
            InboundMessage::Result(_) => "result",
            InboundMessage::Completed(_) => "completed",
        }
    }
}
