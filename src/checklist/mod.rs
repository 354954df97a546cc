//! Checklists
//!
//! A checklist is the YAML description of the steps an operator walks
//! through; the [`Registry`] is its validated, immutable form.

mod registry;
mod step;

pub use registry::Registry;
pub use step::{AutomatedCheck, Checklist, Step};

use std::path::Path;

use crate::common::{Error, Result};

/// The release checklist shipped with the binary
pub const BUILTIN_CHECKLIST: &str = include_str!("../../checklists/release.yaml");

/// Parse checklist YAML; `origin` names the source in error messages
pub fn parse(content: &str, origin: &str) -> Result<Checklist> {
    serde_yaml::from_str(content).map_err(|e| Error::ChecklistParse {
        path: origin.to_string(),
        error: e.to_string(),
    })
}

/// Load a checklist file, or the built-in release checklist
pub fn load(path: Option<&Path>) -> Result<Checklist> {
    match path {
        Some(path) => {
            let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
                path: path.display().to_string(),
                error: e.to_string(),
            })?;
            parse(&content, &path.display().to_string())
        }
        None => parse(BUILTIN_CHECKLIST, "<built-in>"),
    }
}
