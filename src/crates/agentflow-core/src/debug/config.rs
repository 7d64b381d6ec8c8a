//! Debug pipeline configuration and presets.

use serde::{Deserialize, Serialize};

use super::transform::Stage;

/// Default key patterns redacted from debug snapshots.
const DEFAULT_REDACT_PATTERNS: &[&str] = &["password", "api_key", "secret", "token", "authorization"];

/// Named transform-chain presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebugPreset {
    /// Redaction plus generous truncation; all event kinds pass.
    #[default]
    Default,
    /// Errors and warnings only.
    Minimal,
    /// Everything, untruncated.
    Verbose,
    /// Sampled, redacted, tightly truncated.
    Production,
    /// Node errors only.
    ErrorsOnly,
}

/// Configuration for the debug pipeline, deserialized from the spec's
/// `debug_config` field. Explicit fields override what the preset chose.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DebugConfig {
    #[serde(default)]
    pub preset: DebugPreset,
    /// Only these event kinds pass (after preset resolution).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<Vec<String>>,
    /// These event kinds are dropped.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
    /// Key patterns whose values are redacted from snapshots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redact_patterns: Option<Vec<String>>,
    /// Maximum string length in emitted records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncate_strings: Option<usize>,
    /// Keep-probability for non-error events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<f64>,
}

impl DebugConfig {
    /// Configuration for a preset with no overrides.
    pub fn preset(preset: DebugPreset) -> Self {
        Self {
            preset,
            ..Self::default()
        }
    }

    fn default_redact(&self) -> Vec<String> {
        self.redact_patterns.clone().unwrap_or_else(|| {
            DEFAULT_REDACT_PATTERNS
                .iter()
                .map(|s| s.to_string())
                .collect()
        })
    }

    /// Resolve the ordered transform chain.
    pub fn stages(&self) -> Vec<Stage> {
        let mut stages = Vec::new();

        let preset_include: Option<Vec<String>> = match self.preset {
            DebugPreset::Minimal => Some(
                ["node_error", "validation", "deadlock"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            ),
            DebugPreset::ErrorsOnly => Some(vec!["node_error".to_string()]),
            _ => None,
        };
        if let Some(include) = self.include.clone().or(preset_include) {
            stages.push(Stage::include(include));
        }
        if !self.exclude.is_empty() {
            stages.push(Stage::exclude(self.exclude.clone()));
        }

        match self.preset {
            DebugPreset::Verbose => {
                if let Some(patterns) = &self.redact_patterns {
                    stages.push(Stage::redact(patterns.clone()));
                }
                if let Some(max) = self.truncate_strings {
                    stages.push(Stage::Truncate(max));
                }
            }
            DebugPreset::Production => {
                stages.push(Stage::redact(self.default_redact()));
                stages.push(Stage::Truncate(self.truncate_strings.unwrap_or(500)));
                stages.push(Stage::Sample(self.sample_rate.unwrap_or(0.1)));
            }
            _ => {
                stages.push(Stage::redact(self.default_redact()));
                stages.push(Stage::Truncate(self.truncate_strings.unwrap_or(2000)));
                if let Some(rate) = self.sample_rate {
                    stages.push(Stage::Sample(rate));
                }
            }
        }

        stages
    }
}
