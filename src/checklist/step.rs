//! Checklist step definitions
//!
//! Defines the data structures for deserializing YAML checklists.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use crate::probe::Capability;

/// A complete checklist loaded from a YAML file
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct Checklist {
    /// Name of the checklist
    pub name: String,
    /// Optional description of what the checklist verifies
    pub description: Option<String>,
    /// The steps, in execution order
    pub steps: Vec<Step>,
}

/// A single verification step
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Step {
    /// Stable short identifier, unique within the checklist
    pub id: String,
    /// Human-readable summary
    pub title: String,
    /// Operator-facing directives, in order
    pub instructions: Vec<String>,
    /// What the operator should observe; the pass criterion for manual steps
    pub expected_outcome: String,
    /// Automated evidence gathered before asking the operator
    #[serde(default, alias = "check")]
    pub automated_check: Option<AutomatedCheck>,
    /// Whether a failed automated check may be retried
    #[serde(default)]
    pub retryable: bool,
    /// Whether a matching automated check alone may pass the step when
    /// `auto_pass_clean_checks` is enabled
    #[serde(default)]
    pub fully_automated: bool,
}

/// Reference to a probe capability with its parameters
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AutomatedCheck {
    /// Which probe adapter runs the check
    pub capability: Capability,
    /// Adapter parameters (e.g. codec, channel, preset)
    #[serde(default, deserialize_with = "scalar_map")]
    pub params: BTreeMap<String, String>,
    /// Per-step override of the attempt timeout
    pub timeout_secs: Option<u64>,
}

impl Step {
    /// A step the operator judges without automated evidence
    pub fn manual(id: &str, title: &str, expected_outcome: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            instructions: vec![title.to_string()],
            expected_outcome: expected_outcome.to_string(),
            automated_check: None,
            retryable: false,
            fully_automated: false,
        }
    }

    /// A step backed by a probe capability
    pub fn automated(id: &str, title: &str, expected_outcome: &str, capability: Capability) -> Self {
        Self {
            automated_check: Some(AutomatedCheck {
                capability,
                params: BTreeMap::new(),
                timeout_secs: None,
            }),
            ..Self::manual(id, title, expected_outcome)
        }
    }

    pub fn with_instructions<I, S>(mut self, instructions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.instructions = instructions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_param(mut self, key: &str, value: &str) -> Self {
        if let Some(check) = &mut self.automated_check {
            check.params.insert(key.to_string(), value.to_string());
        }
        self
    }

    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn fully_automated(mut self, fully_automated: bool) -> Self {
        self.fully_automated = fully_automated;
        self
    }
}

/// Accept YAML scalars of any type as parameter strings, so `channel: 1`
/// and `channel: "1"` mean the same
fn scalar_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let raw = BTreeMap::<String, serde_yaml::Value>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(key, value)| {
            let value = match value {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                other => {
                    return Err(D::Error::custom(format!(
                        "parameter '{}' must be a scalar, got {:?}",
                        key, other
                    )))
                }
            };
            Ok((key, value))
        })
        .collect()
}
