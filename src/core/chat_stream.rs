use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use memchr::memchr;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::ChatRequest;
use crate::core::credentials::CredentialProvider;
use crate::core::delivery::{Delivery, StreamSink};
use crate::core::message::Message;
use crate::utils::url::construct_api_url;

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";
const COMPLETIONS_ENDPOINT: &str = "chat/completions";

/// Terminal failure of a single send. Every variant is local to one
/// exchange; the transport stays usable afterwards.
#[derive(Debug)]
pub enum TransportError {
    /// No credential is configured. Raised before any network I/O.
    MissingCredential,
    /// Another streaming exchange is still in flight on this transport.
    Busy,
    /// The endpoint answered with a non-success status.
    Status { code: u16, body: String },
    /// The exchange failed below the HTTP layer.
    Network(String),
    /// A non-streaming reply matched none of the known response shapes.
    UnrecognizedResponse,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::MissingCredential => write!(f, "no API credential configured"),
            TransportError::Busy => write!(f, "another request is already in flight"),
            TransportError::Status { code, body } => {
                write!(f, "API request failed: {code} - {body}")
            }
            TransportError::Network(message) => write!(f, "network request failed: {message}"),
            TransportError::UnrecognizedResponse => write!(f, "unrecognized API response shape"),
        }
    }
}

impl Error for TransportError {}

fn choice_delta_content(value: &Value) -> Option<&str> {
    value
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
}

fn delta_content(value: &Value) -> Option<&str> {
    value.pointer("/delta/content").and_then(Value::as_str)
}

fn plain_content(value: &Value) -> Option<&str> {
    value.get("content").and_then(Value::as_str)
}

fn bare_string(value: &Value) -> Option<&str> {
    value.as_str()
}

fn choice_message_content(value: &Value) -> Option<&str> {
    value
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
}

/// Known shapes for streamed content increments, tried in priority order.
/// Endpoints disagree on where the increment lives; the first extractor that
/// yields non-empty text wins.
const DELTA_EXTRACTORS: &[fn(&Value) -> Option<&str>] = &[
    choice_delta_content,
    delta_content,
    plain_content,
    bare_string,
];

/// Known shapes for a full (non-streaming) assistant reply.
const REPLY_EXTRACTORS: &[fn(&Value) -> Option<&str>] =
    &[choice_message_content, plain_content, bare_string];

fn extract_delta(value: &Value) -> Option<&str> {
    DELTA_EXTRACTORS
        .iter()
        .find_map(|extract| extract(value).filter(|text| !text.is_empty()))
}

fn extract_reply(value: &Value) -> Option<&str> {
    REPLY_EXTRACTORS.iter().find_map(|extract| extract(value))
}

/// Pull a short human-readable summary out of an error response body.
/// Falls back to the trimmed body when it is not the usual JSON envelope.
fn summarize_error_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<no body>".to_string();
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let summary = value
            .pointer("/error/message")
            .and_then(Value::as_str)
            .or_else(|| value.get("error").and_then(Value::as_str))
            .or_else(|| value.get("message").and_then(Value::as_str));
        if let Some(summary) = summary {
            let collapsed = summary.split_whitespace().collect::<Vec<_>>().join(" ");
            if !collapsed.is_empty() {
                return collapsed;
            }
        }
    }

    trimmed.to_string()
}

type DiagnosticHook = Arc<dyn Fn(&str) + Send + Sync>;

/// One unit of decoder output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeEvent {
    /// A fragment of assistant-generated text.
    Delta(String),
    /// End of stream; no further events will be produced.
    Done,
}

/// Reassembles line-oriented records from arbitrarily chunked response
/// fragments and extracts content deltas from them.
///
/// The buffer is kept as raw bytes so a multi-byte UTF-8 sequence split
/// across two network reads survives reassembly. After every `push` the
/// buffer holds only the trailing record that has not yet seen its newline.
///
/// The decoder never fails on a malformed payload: a line that does not
/// parse degrades to a plain-text delta (or is skipped when empty), and the
/// stream keeps going.
pub struct StreamDecoder {
    buffer: Vec<u8>,
    done: bool,
    diagnostics: Option<DiagnosticHook>,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            done: false,
            diagnostics: None,
        }
    }

    /// Install a hook that observes payloads which failed structured parsing
    /// and were forwarded as plain text instead.
    pub fn with_diagnostics(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.diagnostics = Some(Arc::new(hook));
        self
    }

    fn set_diagnostics(&mut self, hook: Option<DiagnosticHook>) {
        self.diagnostics = hook;
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed one raw fragment and collect the events it completes. A single
    /// record split across fragments yields its events only once the
    /// terminating newline arrives.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<DecodeEvent> {
        let mut events = Vec::new();
        if self.done {
            return events;
        }

        self.buffer.extend_from_slice(chunk);
        while let Some(newline_pos) = memchr(b'\n', &self.buffer) {
            let line = match std::str::from_utf8(&self.buffer[..newline_pos]) {
                Ok(text) => text.to_owned(),
                Err(err) => {
                    warn!("dropping stream line with invalid UTF-8: {err}");
                    self.buffer.drain(..=newline_pos);
                    continue;
                }
            };
            self.buffer.drain(..=newline_pos);

            if line.trim().is_empty() {
                continue;
            }
            self.decode_line(&line, &mut events);
            if self.done {
                self.buffer.clear();
                break;
            }
        }
        events
    }

    /// Signal end of input. An unterminated trailing record is discarded,
    /// matching the wire producers this decoder targets.
    pub fn finish(&mut self) -> Vec<DecodeEvent> {
        if self.done {
            return Vec::new();
        }
        self.done = true;
        if !self.buffer.is_empty() {
            debug!(
                len = self.buffer.len(),
                "discarding unterminated record at end of stream"
            );
            self.buffer.clear();
        }
        vec![DecodeEvent::Done]
    }

    fn decode_line(&mut self, line: &str, events: &mut Vec<DecodeEvent>) {
        if let Some(payload) = line.strip_prefix(DATA_PREFIX) {
            let payload = payload.trim();
            if payload == DONE_SENTINEL {
                self.done = true;
                events.push(DecodeEvent::Done);
                return;
            }
            if payload.is_empty() {
                return;
            }
            match serde_json::from_str::<Value>(payload) {
                Ok(value) => {
                    if let Some(delta) = extract_delta(&value) {
                        events.push(DecodeEvent::Delta(delta.to_owned()));
                    }
                }
                Err(err) => {
                    debug!("stream payload is not structured ({err}); forwarding as text");
                    self.report_fallback(payload);
                    events.push(DecodeEvent::Delta(payload.to_owned()));
                }
            }
        } else {
            let line = line.trim();
            if line == DONE_SENTINEL {
                self.done = true;
                events.push(DecodeEvent::Done);
                return;
            }
            match serde_json::from_str::<Value>(line) {
                Ok(value) => {
                    if let Some(content) = plain_content(&value).filter(|text| !text.is_empty()) {
                        events.push(DecodeEvent::Delta(content.to_owned()));
                    }
                }
                Err(err) => {
                    debug!("bare stream line is not structured ({err}); forwarding as text");
                    self.report_fallback(line);
                    events.push(DecodeEvent::Delta(line.to_owned()));
                }
            }
        }
    }

    fn report_fallback(&self, payload: &str) {
        if let Some(hook) = &self.diagnostics {
            hook(payload);
        }
    }
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

struct SessionHandle {
    cancel_token: CancellationToken,
    finished: Arc<AtomicBool>,
}

impl SessionHandle {
    fn is_active(&self) -> bool {
        !self.finished.load(Ordering::Acquire)
    }
}

/// Marks the session finished on every exit path of the exchange task,
/// including a drop from cancellation.
struct FinishGuard(Arc<AtomicBool>);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

enum Outcome {
    Completed,
    Errored(TransportError),
    Cancelled,
}

/// Owns at most one in-flight streaming exchange against a chat-completion
/// endpoint.
///
/// A new send is rejected while another is still live; [`cancel`] aborts the
/// current exchange and resolves it silently. The credential provider is an
/// injected dependency so embedders and tests supply their own storage.
///
/// [`cancel`]: ChatTransport::cancel
pub struct ChatTransport<C> {
    client: reqwest::Client,
    base_url: String,
    credentials: C,
    session: Option<SessionHandle>,
    diagnostics: Option<DiagnosticHook>,
}

impl<C: CredentialProvider> ChatTransport<C> {
    pub fn new(base_url: impl Into<String>, credentials: C) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, credentials)
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        credentials: C,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            credentials,
            session: None,
            diagnostics: None,
        }
    }

    /// Observe payloads the decoder forwarded as plain text after structured
    /// parsing failed. Intended for logging and tests.
    pub fn set_decode_diagnostics(&mut self, hook: impl Fn(&str) + Send + Sync + 'static) {
        self.diagnostics = Some(Arc::new(hook));
    }

    pub fn credentials(&self) -> &C {
        &self.credentials
    }

    pub fn credentials_mut(&mut self) -> &mut C {
        &mut self.credentials
    }

    /// True while a streaming exchange is in flight.
    pub fn is_busy(&self) -> bool {
        self.session.as_ref().is_some_and(SessionHandle::is_active)
    }

    /// Start a streaming exchange for the given conversation history.
    ///
    /// Precondition failures (another send in flight, no credential) reach
    /// the sink's error callback synchronously and perform no network I/O.
    /// Otherwise the exchange runs on a spawned task: the sink receives zero
    /// or more chunks followed by exactly one terminal callback, or nothing
    /// further at all if the exchange is cancelled.
    pub fn send<S>(&mut self, messages: &[Message], sink: S)
    where
        S: StreamSink + Send + 'static,
    {
        let mut delivery = Delivery::new(sink);
        if self.is_busy() {
            delivery.error(TransportError::Busy);
            return;
        }
        let Some(credential) = self.credentials.get() else {
            delivery.error(TransportError::MissingCredential);
            return;
        };

        // A fresh token per send; a stale token from an earlier exchange
        // must never be able to abort this one.
        let cancel_token = CancellationToken::new();
        let finished = Arc::new(AtomicBool::new(false));
        self.session = Some(SessionHandle {
            cancel_token: cancel_token.clone(),
            finished: Arc::clone(&finished),
        });

        let request = ChatRequest {
            messages: messages.iter().map(Message::to_api).collect(),
            stream: true,
        };
        let client = self.client.clone();
        let url = construct_api_url(&self.base_url, COMPLETIONS_ENDPOINT);
        let mut decoder = StreamDecoder::new();
        decoder.set_diagnostics(self.diagnostics.clone());

        tokio::spawn(async move {
            let _guard = FinishGuard(finished);
            let outcome = tokio::select! {
                outcome = drive_exchange(
                    &client,
                    &url,
                    &credential,
                    &request,
                    &cancel_token,
                    decoder,
                    &mut delivery,
                ) => outcome,
                _ = cancel_token.cancelled() => Outcome::Cancelled,
            };
            match outcome {
                Outcome::Completed => delivery.complete(),
                Outcome::Errored(error) => delivery.error(error),
                Outcome::Cancelled => delivery.cancel(),
            }
        });
    }

    /// Abort the in-flight exchange, if any. Idempotent and safe to call
    /// when nothing is active. The aborted send terminates silently; it is
    /// never reported as an error.
    pub fn cancel(&mut self) {
        if let Some(session) = self.session.take() {
            session.cancel_token.cancel();
        }
    }

    /// Issue a non-streaming completion request and return the assistant
    /// reply as a single string.
    pub async fn complete(&self, messages: &[Message]) -> Result<String, TransportError> {
        let Some(credential) = self.credentials.get() else {
            return Err(TransportError::MissingCredential);
        };

        let request = ChatRequest {
            messages: messages.iter().map(Message::to_api).collect(),
            stream: false,
        };
        let url = construct_api_url(&self.base_url, COMPLETIONS_ENDPOINT);
        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {credential}"))
            .json(&request)
            .send()
            .await
            .map_err(|err| TransportError::Network(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(TransportError::Status {
                code: status.as_u16(),
                body: summarize_error_body(&body),
            });
        }

        let value: Value = response
            .json()
            .await
            .map_err(|err| TransportError::Network(err.to_string()))?;
        extract_reply(&value)
            .map(str::to_owned)
            .ok_or(TransportError::UnrecognizedResponse)
    }
}

async fn drive_exchange<S: StreamSink>(
    client: &reqwest::Client,
    url: &str,
    credential: &str,
    request: &ChatRequest,
    cancel_token: &CancellationToken,
    mut decoder: StreamDecoder,
    delivery: &mut Delivery<S>,
) -> Outcome {
    let response = match client
        .post(url)
        .header("Content-Type", "application/json")
        .header("Authorization", format!("Bearer {credential}"))
        .json(request)
        .send()
        .await
    {
        Ok(response) => response,
        Err(err) => return read_failure(cancel_token, err),
    };

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());
        return Outcome::Errored(TransportError::Status {
            code: status.as_u16(),
            body: summarize_error_body(&body),
        });
    }

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        // Cooperative cancellation boundary: lines already decoded were
        // delivered, but no further fragment is consumed once cancelled.
        if cancel_token.is_cancelled() {
            return Outcome::Cancelled;
        }
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(err) => return read_failure(cancel_token, err),
        };
        for event in decoder.push(&bytes) {
            match event {
                DecodeEvent::Delta(text) => delivery.chunk(&text),
                DecodeEvent::Done => return Outcome::Completed,
            }
        }
    }

    decoder.finish();
    Outcome::Completed
}

/// A failed read during a cancelled exchange is the cancellation, not an
/// error of its own.
fn read_failure(cancel_token: &CancellationToken, err: reqwest::Error) -> Outcome {
    if cancel_token.is_cancelled() {
        Outcome::Cancelled
    } else {
        Outcome::Errored(TransportError::Network(err.to_string()))
    }
}
