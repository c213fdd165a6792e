use itertools::Itertools;
use thiserror::Error;

use crate::fields::CanonicalField;

/// Structural failures that stop an analysis before any result is produced.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("No header matched the required field(s): {}", .missing.iter().map(|f| f.label()).join(", "))]
    MissingRequiredFields { missing: Vec<CanonicalField> },
    #[error("Input has {rows} row(s) but no header columns")]
    EmptyHeader { rows: usize },
}

impl AnalysisError {
    pub fn missing_fields(&self) -> &[CanonicalField] {
        match self {
            AnalysisError::MissingRequiredFields { missing } => missing,
            AnalysisError::EmptyHeader { .. } => &[],
        }
    }
}
