//! Step registry
//!
//! The ordered, immutable set of steps a session runs. Validation happens
//! once, at construction; nothing can add or remove a step afterwards.

use std::collections::HashSet;

use super::step::{Checklist, Step};
use crate::common::{Error, Result};
use crate::probe::{Capability, ProbeSet};

/// Validated, ordered steps
#[derive(Debug, Clone)]
pub struct Registry {
    name: String,
    steps: Vec<Step>,
}

impl Registry {
    /// Validate steps against the available probe adapters
    pub fn new(name: impl Into<String>, steps: Vec<Step>, probes: &ProbeSet) -> Result<Self> {
        if steps.is_empty() {
            return Err(Error::Configuration("checklist has no steps".to_string()));
        }

        let mut seen = HashSet::new();
        for step in &steps {
            if step.id.trim().is_empty() {
                return Err(Error::Configuration(format!(
                    "step '{}' has an empty id",
                    step.title
                )));
            }
            if !seen.insert(step.id.as_str()) {
                return Err(Error::DuplicateStep(step.id.clone()));
            }
            if step.instructions.is_empty() {
                return Err(Error::Configuration(format!(
                    "step '{}' has no instructions",
                    step.id
                )));
            }
            if let Some(check) = &step.automated_check {
                if !probes.contains(check.capability) {
                    return Err(Error::missing_capability(&step.id, check.capability));
                }
                if check.timeout_secs == Some(0) {
                    return Err(Error::Configuration(format!(
                        "step '{}' has a zero timeout",
                        step.id
                    )));
                }
            }
        }

        Ok(Self {
            name: name.into(),
            steps,
        })
    }

    /// Build from a loaded checklist
    pub fn from_checklist(checklist: Checklist, probes: &ProbeSet) -> Result<Self> {
        Self::new(checklist.name, checklist.steps, probes)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The steps in execution order
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Index of a step by id
    pub fn position(&self, id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == id)
    }

    /// Capabilities referenced by at least one step
    pub fn required_capabilities(&self) -> Vec<Capability> {
        let mut caps: Vec<Capability> = self
            .steps
            .iter()
            .filter_map(|s| s.automated_check.as_ref().map(|c| c.capability))
            .collect();
        caps.sort();
        caps.dedup();
        caps
    }
}
