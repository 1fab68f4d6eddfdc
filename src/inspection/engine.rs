//! Interface of the rule-matching capability the gateway delegates to.
//!
//! The engine owns rule grammar and evaluation. The gateway only opens one
//! transaction per request, feeds it request data phase by phase, reads back
//! interruptions, and closes it.

use thiserror::Error;

/// A rule fired and the request must be interrupted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interruption {
    pub rule_id: String,
    pub message: String,
}

/// Engine failures that are not rule matches.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("body of {size} bytes exceeds inspection limit of {limit} bytes")]
    BodyTooLarge { size: usize, limit: usize },

    #[error("inspection engine failure: {0}")]
    Internal(String),
}

/// Factory for per-request transactions.
pub trait RuleEngine: Send + Sync {
    fn new_transaction(&self) -> Box<dyn Transaction>;

    fn name(&self) -> &'static str;
}

/// State accumulated for a single request.
///
/// Calls arrive in order: connection, uri, headers (repeated), headers phase,
/// body phase, close. `close` is called exactly once on every path.
pub trait Transaction: Send {
    fn process_connection(&mut self, client: &str, port: u16);

    fn process_uri(&mut self, uri: &str, method: &str, protocol: &str);

    fn add_request_header(&mut self, name: &str, value: &str);

    fn process_request_headers(&mut self) -> Option<Interruption>;

    fn process_request_body(&mut self, body: &[u8]) -> Result<Option<Interruption>, EngineError>;

    fn close(&mut self);
}
