//! Scripted servers for tests.
//!
//! [`MockEvalServer`] accepts exactly one WebSocket connection, records the
//! upgrade request and every frame the client sends, and replies according
//! to a [`Script`]: one reply to the start message, optional replies right
//! after it, and optional replies once the stop message arrives.
//!
//! [`spawn_token_mock`] serves the token endpoint with a canned reply.

use crate::config::TOKEN_PATH;
use actix_web::{web, App, HttpResponse, HttpServer};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Refuse the upgrade with this HTTP status
    pub reject: Option<u16>,
    /// Reply to the first frame
    pub first_reply: String,
    /// Sent immediately after `first_reply`
    pub early: Vec<String>,
    /// Sent once the stop message is received
    pub after_stop: Vec<String>,
}

impl Script {
    pub fn started(eval_id: &str) -> Self {
        Self {
            first_reply: format!(r#"{{"ack":"started","evalId":"{}"}}"#, eval_id),
            ..Self::default()
        }
    }

    pub fn rejecting(status: u16) -> Self {
        Self {
            reject: Some(status),
            ..Self::default()
        }
    }

    pub fn with_early(mut self, replies: &[&str]) -> Self {
        self.early = replies.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn with_after_stop(mut self, replies: &[&str]) -> Self {
        self.after_stop = replies.iter().map(|r| r.to_string()).collect();
        self
    }
}

/// Everything the server observed.
#[derive(Debug, Default)]
pub struct Recorded {
    pub path: String,
    pub authorization: Option<String>,
    pub frames: Vec<Message>,
}

impl Recorded {
    pub fn binary_frames(&self) -> Vec<&Vec<u8>> {
        self.frames
            .iter()
            .filter_map(|frame| match frame {
                Message::Binary(data) => Some(data),
                _ => None,
            })
            .collect()
    }

    pub fn text_frames(&self) -> Vec<serde_json::Value> {
        self.frames
            .iter()
            .filter_map(|frame| match frame {
                Message::Text(text) => serde_json::from_str(text).ok(),
                _ => None,
            })
            .collect()
    }
}

pub struct MockEvalServer {
    addr: SocketAddr,
    handle: JoinHandle<Recorded>,
}

fn is_stop(frame: &Message) -> bool {
    match frame {
        Message::Text(text) => serde_json::from_str::<serde_json::Value>(text)
            .map(|value| value["common"]["cmd"] == "stop")
            .unwrap_or(false),
        _ => false,
    }
}

impl MockEvalServer {
    pub async fn start(script: Script) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut recorded = Recorded::default();

            let accepted = accept_hdr_async(tcp, |req: &Request, resp: Response| {
                recorded.path = req.uri().path().to_string();
                recorded.authorization = req
                    .headers()
                    .get(AUTHORIZATION)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string);

                match script.reject {
                    Some(status) => {
                        let mut err = ErrorResponse::new(Some("unauthorized".to_string()));
                        *err.status_mut() = StatusCode::from_u16(status).unwrap();
                        Err(err)
                    }
                    None => Ok(resp),
                }
            })
            .await;

            let mut ws = match accepted {
                Ok(ws) => ws,
                Err(_) => return recorded,
            };

            // Start message, then the scripted acknowledgment
            match ws.next().await {
                Some(Ok(frame)) => recorded.frames.push(frame),
                _ => return recorded,
            }
            if ws.send(Message::Text(script.first_reply.clone())).await.is_err() {
                return recorded;
            }
            for reply in &script.early {
                let _ = ws.send(Message::Text(reply.clone())).await;
            }

            while let Some(Ok(frame)) = ws.next().await {
                let stop = is_stop(&frame);
                let close = matches!(frame, Message::Close(_));
                recorded.frames.push(frame);

                if stop {
                    for reply in &script.after_stop {
                        let _ = ws.send(Message::Text(reply.clone())).await;
                    }
                }
                if close {
                    break;
                }
            }
            recorded
        });

        Self { addr, handle }
    }

    pub fn host(&self) -> String {
        self.addr.to_string()
    }

    pub fn url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    /// Wait for the client to go away and return what was recorded.
    pub async fn finish(self) -> Recorded {
        self.handle.await.unwrap()
    }
}

/// Canned reply plus a log of every request body the mock received.
#[derive(Clone)]
struct TokenMockState {
    reply: Value,
    requests: Arc<Mutex<Vec<Value>>>,
}

async fn generate_token(state: web::Data<TokenMockState>, body: web::Json<Value>) -> HttpResponse {
    state.requests.lock().unwrap().push(body.into_inner());
    HttpResponse::Ok().json(state.reply.clone())
}

/// Start a token endpoint on an ephemeral port. Must run inside an actix
/// runtime (`#[actix_web::test]`).
pub fn spawn_token_mock(reply: Value) -> (SocketAddr, Arc<Mutex<Vec<Value>>>) {
    let state = TokenMockState {
        reply,
        requests: Arc::new(Mutex::new(Vec::new())),
    };
    let requests = state.requests.clone();

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .route(TOKEN_PATH, web::post().to(generate_token))
    })
    .workers(1)
    .bind(("127.0.0.1", 0))
    .unwrap();

    let addr = server.addrs()[0];
    actix_web::rt::spawn(server.run());

    (addr, requests)
}
