//! Stage outcomes.

use std::fmt;
use std::time::Duration;

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenyReason {
    Bot,
    RateLimit,
    WafHeader,
    WafBody,
}

impl DenyReason {
    pub const ALL: [DenyReason; 4] = [
        DenyReason::Bot,
        DenyReason::RateLimit,
        DenyReason::WafHeader,
        DenyReason::WafBody,
    ];

    pub fn status_code(&self) -> StatusCode {
        match self {
            DenyReason::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            DenyReason::Bot | DenyReason::WafHeader | DenyReason::WafBody => StatusCode::FORBIDDEN,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::Bot => "BOT",
            DenyReason::RateLimit => "RATE_LIMIT",
            DenyReason::WafHeader => "WAF_HEADER",
            DenyReason::WafBody => "WAF_BODY",
        }
    }

    /// Short human-readable text sent to the client.
    pub fn message(&self) -> &'static str {
        match self {
            DenyReason::Bot => "Bad bot detected",
            DenyReason::RateLimit => "Rate limit exceeded",
            DenyReason::WafHeader => "Malicious request detected",
            DenyReason::WafBody => "Malicious body detected",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rule that interrupted an inspection phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleMatch {
    pub id: String,
    pub message: String,
}

/// Details of a refusal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Denial {
    pub reason: DenyReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<RuleMatch>,
    /// Hint for rate-limited clients.
    #[serde(skip)]
    pub retry_after: Option<Duration>,
}

/// Outcome of a single stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Allow,
    Deny(Denial),
}

impl Verdict {
    pub fn deny(reason: DenyReason) -> Self {
        Verdict::Deny(Denial {
            reason,
            rule: None,
            retry_after: None,
        })
    }

    pub fn deny_rule(reason: DenyReason, id: impl Into<String>, message: impl Into<String>) -> Self {
        Verdict::Deny(Denial {
            reason,
            rule: Some(RuleMatch {
                id: id.into(),
                message: message.into(),
            }),
            retry_after: None,
        })
    }

    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        Verdict::Deny(Denial {
            reason: DenyReason::RateLimit,
            rule: None,
            retry_after,
        })
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, Verdict::Allow)
    }

    pub fn reason(&self) -> Option<DenyReason> {
        match self {
            Verdict::Allow => None,
            Verdict::Deny(denial) => Some(denial.reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(DenyReason::Bot.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(DenyReason::RateLimit.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(DenyReason::WafHeader.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(DenyReason::WafBody.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn serializes_with_reason_code() {
        let verdict = Verdict::deny_rule(DenyReason::WafBody, "1001", "SQL Injection Attempt Detected");
        let json = serde_json::to_value(&verdict).unwrap();
        assert_eq!(json["action"], "DENY");
        assert_eq!(json["reason"], "WAF_BODY");
        assert_eq!(json["rule"]["id"], "1001");

        let json = serde_json::to_value(Verdict::Allow).unwrap();
        assert_eq!(json["action"], "ALLOW");
    }
}
