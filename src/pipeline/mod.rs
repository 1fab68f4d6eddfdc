//! Per-request admission pipeline.
//!
//! # Data Flow
//! ```text
//! START
//!     → BOT_CHECK       signature.rs    Deny(BOT)        403
//!     → RATE_CHECK      rate_limit/     Deny(RATE_LIMIT) 429 + Retry-After
//!     → HEADER_INSPECT  inspection/     Deny(WAF_HEADER) 403
//!     → (buffer body, bounded by max_body_bytes → 413, broken stream → 400)
//!     → BODY_INSPECT    inspection/     Deny(WAF_BODY)   403
//!     → FORWARD         forward.rs      origin reply, or 502
//! ```
//!
//! # Design Decisions
//! - A stage runs only if every earlier stage allowed the request
//! - Every denial appends exactly one LogEntry before the response is written
//! - Mode is read once, at the rate check, and the same value picks the message
//! - The origin's reply is relayed without retry or transformation

pub mod forward;
pub mod request;
pub mod verdict;

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::{Body, Bytes};
use axum::http::header::{CONTENT_LENGTH, RETRY_AFTER};
use axum::http::request::Parts;
use axum::http::{HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::StreamExt;
use serde::Serialize;

use crate::events::{EventLog, LogEntry};
use crate::http::request::RequestIdExt;
use crate::inspection::InspectionEngine;
use crate::observability::metrics;
use crate::security::{ClientKey, ClientKeyExtractor, ModeController, OperatingMode, RateLimiter, SignatureFilter};

use self::forward::Forwarder;
use self::request::{RequestView, Upstream};
use self::verdict::{Denial, DenyReason, Verdict};

/// Pipeline state a request is in when it leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    BotCheck,
    RateCheck,
    HeaderInspect,
    BodyInspect,
    Forward,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::BotCheck => "bot_check",
            Stage::RateCheck => "rate_check",
            Stage::HeaderInspect => "header_inspect",
            Stage::BodyInspect => "body_inspect",
            Stage::Forward => "forward",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collaborators the pipeline is assembled from.
pub struct PipelineParts {
    pub keys: ClientKeyExtractor,
    pub signatures: SignatureFilter,
    pub limiter: Arc<RateLimiter>,
    pub mode: Arc<ModeController>,
    /// `None` skips both inspection phases.
    pub inspector: Option<InspectionEngine>,
    pub events: Arc<EventLog>,
    pub forwarder: Arc<dyn Forwarder>,
    pub upstream: Upstream,
    pub max_body_bytes: usize,
}

pub struct AdmissionPipeline {
    keys: ClientKeyExtractor,
    signatures: SignatureFilter,
    limiter: Arc<RateLimiter>,
    mode: Arc<ModeController>,
    inspector: Option<InspectionEngine>,
    events: Arc<EventLog>,
    forwarder: Arc<dyn Forwarder>,
    upstream: Upstream,
    max_body_bytes: usize,
}

/// How evaluation ended, before any response is built.
enum Outcome {
    Admitted(Bytes),
    Denied {
        stage: Stage,
        denial: Denial,
        mode: OperatingMode,
    },
    BodyTooLarge,
    BodyUnreadable,
}

/// Why the request body could not be buffered.
enum BodyError {
    TooLarge,
    Stream(axum::Error),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<DenyReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rule_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<&'a str>,
}

impl AdmissionPipeline {
    pub fn new(parts: PipelineParts) -> Self {
        Self {
            keys: parts.keys,
            signatures: parts.signatures,
            limiter: parts.limiter,
            mode: parts.mode,
            inspector: parts.inspector,
            events: parts.events,
            forwarder: parts.forwarder,
            upstream: parts.upstream,
            max_body_bytes: parts.max_body_bytes,
        }
    }

    pub fn mode(&self) -> &Arc<ModeController> {
        &self.mode
    }

    pub fn events(&self) -> &Arc<EventLog> {
        &self.events
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Run one request through every stage and produce the client response.
    pub async fn handle(&self, request: Request<Body>, peer: SocketAddr) -> Response {
        let start = Instant::now();
        let (parts, body) = request.into_parts();
        let client = self.keys.extract(&parts.headers, peer);
        let request_id = parts.headers.request_id().map(str::to_string);

        match self.evaluate(&parts, body, &client, peer).await {
            Outcome::Admitted(bytes) => {
                self.events.append(LogEntry::now(
                    client.clone(),
                    Verdict::Allow,
                    request_id.clone(),
                    parts.uri.path(),
                ));
                self.forward(parts, bytes, &client, request_id.as_deref(), start).await
            }
            Outcome::Denied { stage, denial, mode } => {
                self.deny(&parts, client, stage, denial, mode, request_id, start)
            }
            Outcome::BodyTooLarge => {
                tracing::warn!(
                    request_id = request_id.as_deref().unwrap_or("-"),
                    client = %client,
                    limit = self.max_body_bytes,
                    "Request body too large"
                );
                metrics::record_request("rejected", start);
                error_response(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    ErrorBody {
                        error: "Request body too large",
                        reason: None,
                        rule_id: None,
                        request_id: request_id.as_deref(),
                    },
                )
            }
            Outcome::BodyUnreadable => {
                metrics::record_request("rejected", start);
                error_response(
                    StatusCode::BAD_REQUEST,
                    ErrorBody {
                        error: "Invalid request body",
                        reason: None,
                        rule_id: None,
                        request_id: request_id.as_deref(),
                    },
                )
            }
        }
    }

    async fn evaluate(&self, parts: &Parts, body: Body, client: &ClientKey, peer: SocketAddr) -> Outcome {
        let view = RequestView::from_parts(parts);

        if let Verdict::Deny(denial) = self.signatures.check(view.user_agent().as_deref()) {
            return Outcome::Denied {
                stage: Stage::BotCheck,
                denial,
                mode: self.mode.get(),
            };
        }

        let mode = self.mode.get();
        if let Verdict::Deny(denial) = self.limiter.check(client, mode).await {
            return Outcome::Denied {
                stage: Stage::RateCheck,
                denial,
                mode,
            };
        }

        let mut inspection = self.inspector.as_ref().map(|engine| engine.begin(&view, client, peer));

        if let Some(inspection) = inspection.as_mut() {
            if let Verdict::Deny(denial) = inspection.inspect_headers(&view) {
                return Outcome::Denied {
                    stage: Stage::HeaderInspect,
                    denial,
                    mode,
                };
            }
        }

        if declared_length(parts).is_some_and(|len| len > self.max_body_bytes as u64) {
            return Outcome::BodyTooLarge;
        }
        let bytes = match read_body(body, self.max_body_bytes).await {
            Ok(bytes) => bytes,
            Err(BodyError::TooLarge) => return Outcome::BodyTooLarge,
            Err(BodyError::Stream(e)) => {
                tracing::debug!(client = %client, error = %e, "Failed to read request body");
                return Outcome::BodyUnreadable;
            }
        };

        if let Some(inspection) = inspection.as_mut() {
            if let Verdict::Deny(denial) = inspection.inspect_body(&view.with_body(&bytes)) {
                return Outcome::Denied {
                    stage: Stage::BodyInspect,
                    denial,
                    mode,
                };
            }
        }

        Outcome::Admitted(bytes)
    }

    #[allow(clippy::too_many_arguments)]
    fn deny(
        &self,
        parts: &Parts,
        client: ClientKey,
        stage: Stage,
        denial: Denial,
        mode: OperatingMode,
        request_id: Option<String>,
        start: Instant,
    ) -> Response {
        let reason = denial.reason;
        let rule_id = denial.rule.as_ref().map(|r| r.id.clone());

        tracing::warn!(
            request_id = request_id.as_deref().unwrap_or("-"),
            client = %client,
            stage = %stage,
            reason = %reason,
            rule_id = rule_id.as_deref().unwrap_or("-"),
            mode = %mode,
            path = parts.uri.path(),
            "Request denied"
        );
        metrics::record_denial(reason);
        metrics::record_request("denied", start);

        let retry_after = denial.retry_after;
        self.events.append(LogEntry::now(
            client,
            Verdict::Deny(denial),
            request_id.clone(),
            parts.uri.path(),
        ));

        let mut response = error_response(
            reason.status_code(),
            ErrorBody {
                error: deny_message(reason, mode),
                reason: Some(reason),
                rule_id: rule_id.as_deref(),
                request_id: request_id.as_deref(),
            },
        );

        if let Some(wait) = retry_after {
            let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(secs.max(1)));
        }
        response
    }

    async fn forward(
        &self,
        mut parts: Parts,
        body: Bytes,
        client: &ClientKey,
        request_id: Option<&str>,
        start: Instant,
    ) -> Response {
        self.upstream.rewrite_host(&mut parts.headers);

        let result = match self.upstream.target_uri(&parts.uri) {
            Ok(uri) => {
                parts.uri = uri;
                self.forwarder.forward(Request::from_parts(parts, Body::from(body))).await
            }
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(response) => {
                tracing::debug!(
                    request_id = request_id.unwrap_or("-"),
                    client = %client,
                    status = response.status().as_u16(),
                    "Request forwarded"
                );
                metrics::record_request("allowed", start);
                response
            }
            Err(e) => {
                tracing::error!(
                    request_id = request_id.unwrap_or("-"),
                    client = %client,
                    stage = %Stage::Forward,
                    upstream = %self.upstream.authority(),
                    error = %e,
                    "Upstream error"
                );
                metrics::record_dependency_failure("upstream");
                metrics::record_request("error", start);
                error_response(
                    StatusCode::BAD_GATEWAY,
                    ErrorBody {
                        error: "Upstream request failed",
                        reason: None,
                        rule_id: None,
                        request_id,
                    },
                )
            }
        }
    }
}

/// Client-facing text for a denial. RATE_LIMIT wording follows the mode in force at the check.
pub fn deny_message(reason: DenyReason, mode: OperatingMode) -> &'static str {
    match (reason, mode) {
        (DenyReason::RateLimit, OperatingMode::Restricted) => "Restricted mode active: rate limit exceeded",
        _ => reason.message(),
    }
}

/// Buffer `body`, stopping as soon as it exceeds `limit` bytes.
async fn read_body(body: Body, limit: usize) -> Result<Bytes, BodyError> {
    let mut stream = body.into_data_stream();
    let mut buf = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(BodyError::Stream)?;
        if buf.len() + chunk.len() > limit {
            return Err(BodyError::TooLarge);
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(buf))
}

fn declared_length(parts: &Parts) -> Option<u64> {
    parts
        .headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

fn error_response(status: StatusCode, body: ErrorBody<'_>) -> Response {
    (status, Json(body)).into_response()
}
