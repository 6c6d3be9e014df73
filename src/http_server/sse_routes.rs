//! # Streaming Demo
//!
//! `POST {prefix}/demo/sse` relays an OpenAI-style chat completion stream.
//! Each upstream `data:` line carrying a `choices[0].delta` with content is
//! re-emitted as `event: message`; the stream ends with `event: done` or, on
//! an undecodable chunk, with `event: error` holding a FAILED envelope.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::fmt::Display;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{post, MethodRouter};
use futures_util::{Stream, StreamExt};
use serde_json::{json, Value};
use tracing::{error, warn};

use super::routes::arg_error_reply;
use super::state::AppState;
use crate::resource::{parse_args, ArgumentSpec, Reply, RequestParams, RequestScope, ResponseEnvelope};

pub const UPSTREAM_FAILED: &str = "upstream request failed";
pub const UPSTREAM_NOT_CONFIGURED: &str = "upstream not configured";
pub const CHUNK_FAILED: &str = "failed to process upstream chunk";

/// One outbound event
#[derive(Debug, Clone, PartialEq)]
pub enum SseFrame {
    /// A `delta` object from the upstream
    Message(Value),
    Done,
    Error(String),
}

impl SseFrame {
    /// Done and Error end the stream
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SseFrame::Message(_))
    }

    pub fn into_event(self, request_id: &str) -> Event {
        match self {
            SseFrame::Message(delta) => Event::default().event("message").data(delta.to_string()),
            SseFrame::Done => Event::default().event("done").data("[DONE]"),
            SseFrame::Error(message) => {
                let envelope = ResponseEnvelope::failed(message, request_id);
                let body = serde_json::to_string(&envelope).unwrap_or_default();
                Event::default().event("error").data(body)
            }
        }
    }
}

/// Splits upstream bytes into lines and lines into frames
#[derive(Debug, Default)]
pub struct ChunkDecoder {
    buffer: Vec<u8>,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames completed by `chunk`; stops at the first terminal frame
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(frame) = decode_line(&String::from_utf8_lossy(&line)) {
                let terminal = frame.is_terminal();
                frames.push(frame);
                if terminal {
                    self.buffer.clear();
                    break;
                }
            }
        }
        frames
    }

    /// Decode whatever is left after the upstream closed
    pub fn finish(&mut self) -> Option<SseFrame> {
        let rest = std::mem::take(&mut self.buffer);
        decode_line(&String::from_utf8_lossy(&rest))
    }
}

fn decode_line(line: &str) -> Option<SseFrame> {
    let payload = line.trim().strip_prefix("data:")?.trim();
    if payload.is_empty() {
        return None;
    }
    if payload == "[DONE]" {
        return Some(SseFrame::Done);
    }

    let chunk: Value = match serde_json::from_str(payload) {
        Ok(chunk) => chunk,
        Err(err) => {
            error!(error = %err, line = payload, "Undecodable upstream chunk");
            return Some(SseFrame::Error(CHUNK_FAILED.to_string()));
        }
    };

    match chunk.pointer("/choices/0/delta") {
        Some(delta) if delta.get("content").is_some() => Some(SseFrame::Message(delta.clone())),
        Some(_) => None,
        None => {
            error!(line = payload, "Upstream chunk without choices[0].delta");
            Some(SseFrame::Error(CHUNK_FAILED.to_string()))
        }
    }
}

/// Pulls frames out of an upstream byte stream
pub struct SseRelay<S> {
    upstream: S,
    decoder: ChunkDecoder,
    pending: VecDeque<SseFrame>,
    upstream_closed: bool,
    finished: bool,
}

impl<S, B, E> SseRelay<S>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
{
    pub fn new(upstream: S) -> Self {
        Self {
            upstream,
            decoder: ChunkDecoder::new(),
            pending: VecDeque::new(),
            upstream_closed: false,
            finished: false,
        }
    }

    /// Next frame, or `None` once a terminal frame was handed out
    pub async fn next_frame(&mut self) -> Option<SseFrame> {
        loop {
            if self.finished {
                return None;
            }
            if let Some(frame) = self.pending.pop_front() {
                if frame.is_terminal() {
                    self.finished = true;
                    self.pending.clear();
                }
                return Some(frame);
            }
            if self.upstream_closed {
                // upstream ended without [DONE]
                self.finished = true;
                return Some(SseFrame::Done);
            }

            match self.upstream.next().await {
                Some(Ok(chunk)) => self.pending.extend(self.decoder.feed(chunk.as_ref())),
                Some(Err(err)) => {
                    warn!(error = %err, "Upstream stream failed");
                    self.pending.push_back(SseFrame::Error(UPSTREAM_FAILED.to_string()));
                }
                None => {
                    self.upstream_closed = true;
                    self.pending.extend(self.decoder.finish());
                }
            }
        }
    }

    /// Frames rendered as SSE events
    pub fn into_events(self, request_id: String) -> impl Stream<Item = Result<Event, Infallible>>
    where
        S: Send,
    {
        futures_util::stream::unfold(self, move |mut relay| {
            let request_id = request_id.clone();
            async move {
                let frame = relay.next_frame().await?;
                Some((Ok(frame.into_event(&request_id)), relay))
            }
        })
    }
}

fn sse_args() -> Vec<ArgumentSpec> {
    vec![
        ArgumentSpec::json_str("prompt").required(),
        ArgumentSpec::json_str("model").default_value(json!("gpt-4o-mini")),
    ]
}

fn bad_request(request_id: &str, message: &str) -> Response {
    Reply::failed(request_id, message)
        .with_status(StatusCode::BAD_REQUEST)
        .into_response()
}

/// `POST {prefix}/demo/sse`
pub async fn sse_demo_handler(
    State(state): State<AppState>,
    scope: RequestScope,
    params: RequestParams,
) -> Response {
    let request_id = scope.request_id;
    let args = match parse_args(&sse_args(), &params) {
        Ok(args) => args,
        Err(err) => return arg_error_reply(&request_id, &err).into_response(),
    };

    let Some(url) = state.config.sse.upstream_url.as_deref() else {
        return bad_request(&request_id, UPSTREAM_NOT_CONFIGURED);
    };

    let body = json!({
        "model": args.get("model").cloned().unwrap_or(Value::Null),
        "stream": true,
        "messages": [{"role": "user", "content": args.get("prompt").cloned().unwrap_or(Value::Null)}],
    });

    let mut request = state.http.post(url).json(&body);
    if let Some(key) = state.config.sse.upstream_api_key.as_deref() {
        request = request.bearer_auth(key);
    }

    let response = match request.send().await {
        Ok(response) => response,
        Err(err) => {
            error!(request_id = %request_id, error = %err, "Upstream request failed");
            return bad_request(&request_id, UPSTREAM_FAILED);
        }
    };
    if response.status() != reqwest::StatusCode::OK {
        error!(request_id = %request_id, status = %response.status(), "Upstream rejected request");
        return bad_request(&request_id, UPSTREAM_FAILED);
    }

    let relay = SseRelay::new(Box::pin(response.bytes_stream()));
    Sse::new(relay.into_events(request_id))
        .keep_alive(KeepAlive::default())
        .into_response()
}

pub fn sse_demo_route() -> MethodRouter<AppState> {
    post(sse_demo_handler)
}
