//! Agent-string deny-list.

use crate::pipeline::verdict::{DenyReason, Verdict};

/// Matches the declared `User-Agent` against fixed substrings.
#[derive(Debug, Clone)]
pub struct SignatureFilter {
    /// Lower-cased, non-empty patterns.
    deny_list: Vec<String>,
}

impl SignatureFilter {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let deny_list = patterns
            .into_iter()
            .map(|p| p.as_ref().trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        Self { deny_list }
    }

    /// A missing or empty agent is not a signal on its own.
    pub fn check(&self, agent: Option<&str>) -> Verdict {
        match self.matching(agent) {
            Some(_) => Verdict::deny(DenyReason::Bot),
            None => Verdict::Allow,
        }
    }

    /// First deny-list entry contained in `agent`.
    pub fn matching(&self, agent: Option<&str>) -> Option<&str> {
        let agent = agent?.to_lowercase();
        if agent.is_empty() {
            return None;
        }
        self.deny_list
            .iter()
            .find(|pattern| agent.contains(pattern.as_str()))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.deny_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deny_list.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> SignatureFilter {
        SignatureFilter::new(["python-requests", "Go-HTTP-Client", "malicious-bot", ""])
    }

    #[test]
    fn denies_listed_agent_regardless_of_case() {
        let f = filter();
        assert_eq!(f.check(Some("python-requests/2.31")).reason(), Some(DenyReason::Bot));
        assert_eq!(f.check(Some("PYTHON-REQUESTS/2.31")).reason(), Some(DenyReason::Bot));
        assert_eq!(f.check(Some("go-http-client/1.1")).reason(), Some(DenyReason::Bot));
        assert_eq!(f.matching(Some("Mozilla/5.0 malicious-bot")), Some("malicious-bot"));
    }

    #[test]
    fn allows_unlisted_agent() {
        let f = filter();
        assert!(f.check(Some("curl/8.0")).is_allow());
        assert!(f.check(Some("Mozilla/5.0 (X11; Linux x86_64)")).is_allow());
    }

    #[test]
    fn allows_missing_or_empty_agent() {
        let f = filter();
        assert!(f.check(None).is_allow());
        assert!(f.check(Some("")).is_allow());
    }

    #[test]
    fn blank_patterns_are_dropped() {
        assert_eq!(filter().len(), 3);
        assert!(SignatureFilter::new(Vec::<String>::new()).check(Some("anything")).is_allow());
    }
}
