//! Built-in regex rule engine.
//!
//! # Responsibilities
//! - Compile configured rules once at startup
//! - Evaluate headers-phase rules against uri, query args and headers
//! - Evaluate body-phase rules against everything, including form args and raw body
//!
//! # Design Decisions
//! - First matching rule wins, in configuration order
//! - Args are percent-decoded before matching
//! - Bodies above `max_inspect_bytes` skip the form and raw body targets; other
//!   body-phase targets still run, and a clean result is reported as an engine error

use std::sync::Arc;

use regex::Regex;
use url::form_urlencoded;

use crate::config::{InspectionConfig, RuleConfig, RulePhase, RuleTarget};
use crate::inspection::engine::{EngineError, Interruption, RuleEngine, Transaction};

#[derive(Debug)]
struct CompiledRule {
    id: String,
    phase: RulePhase,
    targets: Vec<RuleTarget>,
    regex: Regex,
    message: String,
}

impl CompiledRule {
    fn compile(config: &RuleConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            id: config.id.clone(),
            phase: config.phase,
            targets: config.targets.clone(),
            regex: Regex::new(&config.pattern)?,
            message: config.message.clone(),
        })
    }

    fn interruption(&self) -> Interruption {
        Interruption {
            rule_id: self.id.clone(),
            message: self.message.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PatternRuleEngine {
    rules: Arc<Vec<CompiledRule>>,
    max_inspect_bytes: usize,
}

impl PatternRuleEngine {
    pub fn from_config(config: &InspectionConfig) -> Result<Self, regex::Error> {
        let rules = config
            .rules
            .iter()
            .map(CompiledRule::compile)
            .collect::<Result<Vec<_>, _>>()?;

        tracing::info!(rules = rules.len(), "Pattern rule engine compiled");

        Ok(Self {
            rules: Arc::new(rules),
            max_inspect_bytes: config.max_inspect_bytes,
        })
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

impl RuleEngine for PatternRuleEngine {
    fn new_transaction(&self) -> Box<dyn Transaction> {
        Box::new(PatternTransaction {
            rules: Arc::clone(&self.rules),
            max_inspect_bytes: self.max_inspect_bytes,
            uri: String::new(),
            query: None,
            headers: Vec::new(),
            form_body: false,
            closed: false,
        })
    }

    fn name(&self) -> &'static str {
        "patterns"
    }
}

struct PatternTransaction {
    rules: Arc<Vec<CompiledRule>>,
    max_inspect_bytes: usize,
    uri: String,
    query: Option<String>,
    headers: Vec<(String, String)>,
    form_body: bool,
    closed: bool,
}

/// Request data visible to a rule in its phase.
struct Subject<'a> {
    uri: &'a str,
    args: &'a [(String, String)],
    headers: &'a [(String, String)],
    body: Option<&'a str>,
}

impl Subject<'_> {
    fn matches(&self, rule: &CompiledRule) -> bool {
        rule.targets.iter().any(|target| match target {
            RuleTarget::Uri => rule.regex.is_match(self.uri),
            RuleTarget::Args => self.args.iter().any(|(_, v)| rule.regex.is_match(v)),
            RuleTarget::Headers => self
                .headers
                .iter()
                .any(|(k, v)| rule.regex.is_match(&format!("{}: {}", k, v))),
            RuleTarget::Body => self.body.map(|b| rule.regex.is_match(b)).unwrap_or(false),
        })
    }
}

impl PatternTransaction {
    fn query_args(&self) -> Vec<(String, String)> {
        self.query
            .as_deref()
            .map(|q| form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default()
    }

    fn first_match(&self, phase: RulePhase, subject: &Subject<'_>) -> Option<Interruption> {
        self.rules
            .iter()
            .filter(|rule| rule.phase == phase)
            .find(|rule| subject.matches(rule))
            .map(CompiledRule::interruption)
    }
}

impl Transaction for PatternTransaction {
    fn process_connection(&mut self, client: &str, port: u16) {
        tracing::trace!(client, port, "Inspection transaction opened");
    }

    fn process_uri(&mut self, uri: &str, _method: &str, _protocol: &str) {
        self.uri = uri.to_string();
        self.query = uri.split_once('?').map(|(_, q)| q.to_string());
    }

    fn add_request_header(&mut self, name: &str, value: &str) {
        if name.eq_ignore_ascii_case("content-type")
            && value.to_ascii_lowercase().starts_with("application/x-www-form-urlencoded")
        {
            self.form_body = true;
        }
        self.headers.push((name.to_string(), value.to_string()));
    }

    fn process_request_headers(&mut self) -> Option<Interruption> {
        let args = self.query_args();
        let subject = Subject {
            uri: &self.uri,
            args: &args,
            headers: &self.headers,
            body: None,
        };
        self.first_match(RulePhase::Headers, &subject)
    }

    fn process_request_body(&mut self, body: &[u8]) -> Result<Option<Interruption>, EngineError> {
        let mut args = self.query_args();

        if body.len() > self.max_inspect_bytes {
            // body targets are skipped; uri, query args and headers still apply
            let subject = Subject {
                uri: &self.uri,
                args: &args,
                headers: &self.headers,
                body: None,
            };
            return match self.first_match(RulePhase::Body, &subject) {
                Some(interruption) => Ok(Some(interruption)),
                None => Err(EngineError::BodyTooLarge {
                    size: body.len(),
                    limit: self.max_inspect_bytes,
                }),
            };
        }

        if self.form_body {
            args.extend(form_urlencoded::parse(body).into_owned());
        }
        let text = String::from_utf8_lossy(body);
        let subject = Subject {
            uri: &self.uri,
            args: &args,
            headers: &self.headers,
            body: Some(&text),
        };
        Ok(self.first_match(RulePhase::Body, &subject))
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.headers.clear();
            tracing::trace!(uri = %self.uri, "Inspection transaction closed");
        }
    }
}
