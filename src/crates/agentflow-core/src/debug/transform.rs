//! Transform stages applied to debug records before emission.

use regex::RegexSet;
use serde_json::Value;
use std::collections::HashSet;

/// Replacement text for redacted values.
const REDACTED: &str = "[redacted]";

/// One stage in the transform chain. Stages run in order; a stage
/// returning `None` drops the record.
#[derive(Debug, Clone)]
pub enum Stage {
    /// Pass only these event kinds.
    Include(HashSet<String>),
    /// Drop these event kinds.
    Exclude(HashSet<String>),
    /// Redact values whose keys match any of the patterns.
    Redact(RegexSet),
    /// Truncate strings longer than the limit.
    Truncate(usize),
    /// Keep non-error records with this probability; errors always pass.
    Sample(f64),
}

impl Stage {
    pub fn include(kinds: Vec<String>) -> Self {
        Self::Include(kinds.into_iter().collect())
    }

    pub fn exclude(kinds: Vec<String>) -> Self {
        Self::Exclude(kinds.into_iter().collect())
    }

    /// Build a redaction stage from key patterns. Patterns are matched
    /// case-insensitively as substrings of map keys; invalid patterns are
    /// skipped.
    pub fn redact(patterns: Vec<String>) -> Self {
        let escaped: Vec<String> = patterns
            .iter()
            .map(|p| format!("(?i){}", regex::escape(p)))
            .collect();
        Self::Redact(RegexSet::new(escaped).unwrap_or_else(|_| RegexSet::empty()))
    }

    /// Apply this stage to a serialized record.
    pub fn apply(&self, record: Value, kind: &str, is_error: bool) -> Option<Value> {
        match self {
            Self::Include(kinds) => kinds.contains(kind).then_some(record),
            Self::Exclude(kinds) => (!kinds.contains(kind)).then_some(record),
            Self::Redact(set) => Some(redact_value(record, set)),
            Self::Truncate(max) => Some(truncate_value(record, *max)),
            Self::Sample(rate) => {
                if is_error || rand::random::<f64>() < *rate {
                    Some(record)
                } else {
                    None
                }
            }
        }
    }
}

fn redact_value(value: Value, set: &RegexSet) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| {
                    if set.is_match(&k) {
                        (k, Value::String(REDACTED.to_string()))
                    } else {
                        (k, redact_value(v, set))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.into_iter().map(|v| redact_value(v, set)).collect())
        }
        other => other,
    }
}

fn truncate_value(value: Value, max: usize) -> Value {
    match value {
        Value::String(s) if s.chars().count() > max => {
            let cut: String = s.chars().take(max).collect();
            Value::String(format!("{}…", cut))
        }
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, truncate_value(v, max)))
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.into_iter().map(|v| truncate_value(v, max)).collect())
        }
        other => other,
    }
}
