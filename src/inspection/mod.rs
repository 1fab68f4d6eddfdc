//! Request inspection subsystem.
//!
//! # Data Flow
//! ```text
//! InspectionEngine::begin(view, client)
//!     → new transaction: connection, uri, method, protocol
//! Inspection::inspect_headers(view)
//!     → add every header → headers phase → Allow | Deny(WAF_HEADER)
//! Inspection::inspect_body(view)
//!     → body phase → Allow | Deny(WAF_BODY)
//! drop(Inspection)
//!     → transaction closed
//! ```
//!
//! # Design Decisions
//! - One transaction per request, released on every path by the guard
//! - Engine errors in the body phase fail open, like rate store errors
//! - Rule grammar lives entirely behind [`RuleEngine`]

pub mod engine;
pub mod patterns;

use std::net::SocketAddr;
use std::sync::Arc;

pub use self::engine::{EngineError, Interruption, RuleEngine, Transaction};
pub use self::patterns::PatternRuleEngine;

use crate::observability::metrics;
use crate::pipeline::request::RequestView;
use crate::pipeline::verdict::{DenyReason, Verdict};
use crate::security::client_key::ClientKey;

/// Adapter between the pipeline and a [`RuleEngine`].
#[derive(Clone)]
pub struct InspectionEngine {
    engine: Arc<dyn RuleEngine>,
}

impl InspectionEngine {
    pub fn new(engine: Arc<dyn RuleEngine>) -> Self {
        Self { engine }
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    /// Open a transaction for one request.
    pub fn begin(&self, view: &RequestView<'_>, client: &ClientKey, peer: SocketAddr) -> Inspection {
        let mut tx = self.engine.new_transaction();
        tx.process_connection(client.as_str(), peer.port());
        tx.process_uri(view.target(), view.method.as_str(), view.protocol());
        Inspection { tx }
    }
}

/// Per-request transaction guard; closes the transaction when dropped.
pub struct Inspection {
    tx: Box<dyn Transaction>,
}

impl Inspection {
    pub fn inspect_headers(&mut self, view: &RequestView<'_>) -> Verdict {
        for (name, value) in view.headers.iter() {
            let value = String::from_utf8_lossy(value.as_bytes());
            self.tx.add_request_header(name.as_str(), &value);
        }

        match self.tx.process_request_headers() {
            Some(it) => Verdict::deny_rule(DenyReason::WafHeader, it.rule_id, it.message),
            None => Verdict::Allow,
        }
    }

    pub fn inspect_body(&mut self, view: &RequestView<'_>) -> Verdict {
        let body = view.body.unwrap_or_default();

        match self.tx.process_request_body(body) {
            Ok(Some(it)) => Verdict::deny_rule(DenyReason::WafBody, it.rule_id, it.message),
            Ok(None) => Verdict::Allow,
            Err(e) => {
                tracing::error!(
                    uri = view.target(),
                    error = %e,
                    "Body inspection failed, admitting request"
                );
                metrics::record_dependency_failure("inspection");
                Verdict::Allow
            }
        }
    }
}

impl Drop for Inspection {
    fn drop(&mut self) {
        self.tx.close();
    }
}
