use serde::Serialize;
use thiserror::Error;

/// Fatal outcomes of an aggregation. Degraded sources and empty cells are not
/// errors; they are carried on the result.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AggregateError {
    #[error("failed to load {what}: {message}")]
    MissingMasterData { what: &'static str, message: String },

    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    #[error("invalid period {month}/{year}")]
    InvalidPeriod { month: u32, year: i32 },
}

impl AggregateError {
    pub fn code(&self) -> &'static str {
        match self {
            AggregateError::MissingMasterData { .. } => "missing_master_data",
            AggregateError::NotFound { .. } => "not_found",
            AggregateError::InvalidPeriod { .. } => "bad_params",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            AggregateError::MissingMasterData { what, .. } => {
                Some(serde_json::json!({ "masterData": what }))
            }
            AggregateError::NotFound { what, id } => {
                Some(serde_json::json!({ "entity": what, "id": id }))
            }
            AggregateError::InvalidPeriod { .. } => None,
        }
    }
}

/// Which upstream collection a value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceKind {
    Manual,
    Attendance,
    Evaluation,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Manual => "manual",
            SourceKind::Attendance => "attendance",
            SourceKind::Evaluation => "evaluation",
        }
    }
}

/// A recap source whose fetch failed. Every cell treats it as absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DegradedSource {
    pub source: SourceKind,
    pub message: String,
}
