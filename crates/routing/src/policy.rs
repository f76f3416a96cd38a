//! Who may accept connection requests without sitting in an aggregation
//! conversation.

use handover_config::RoutingConfig;

use crate::model::Participant;

pub trait OperatorPolicy: Send + Sync {
    fn permits(&self, operator: &Participant) -> bool;
}

/// Only participants in an aggregation conversation may act as operators.
pub struct AggregationOnly;

impl OperatorPolicy for AggregationOnly {
    fn permits(&self, _operator: &Participant) -> bool {
        false
    }
}

/// Permits accounts matching any pattern, case-insensitively. `*` matches
/// any run of characters.
pub struct OperatorAllowlist {
    patterns: Vec<String>,
}

impl OperatorAllowlist {
    pub fn new(patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            patterns: patterns
                .into_iter()
                .map(|p| p.into().trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &RoutingConfig) -> Self {
        Self::new(config.operator_allowlist.iter().cloned())
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl OperatorPolicy for OperatorAllowlist {
    fn permits(&self, operator: &Participant) -> bool {
        let Some(account) = operator.account_id.as_deref() else {
            return false;
        };
        let account = account.to_lowercase();
        self.patterns.iter().any(|p| glob_match(p, &account))
    }
}

fn glob_match(pattern: &str, text: &str) -> bool {
    let mut parts = pattern.split('*');
    let Some(first) = parts.next() else {
        return pattern == text;
    };
    let Some(mut rest) = text.strip_prefix(first) else {
        return false;
    };
    let tail: Vec<&str> = parts.collect();
    let Some((last, middle)) = tail.split_last() else {
        // No wildcard at all.
        return rest.is_empty();
    };
    for part in middle.iter().filter(|p| !p.is_empty()) {
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    rest.ends_with(last)
}
