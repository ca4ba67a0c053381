use thiserror::Error;

/// Failures of the resolve → filter → aggregate pipeline.
///
/// Preparation errors (`MissingRequiredColumn` and the resolution family)
/// are fatal for the loaded file. `EmptyResultSet` is expected during
/// normal use and is rendered as a placeholder.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PipelineError {
    #[error("required column '{column}' is missing (found: {})", found.join(", "))]
    MissingRequiredColumn { column: String, found: Vec<String> },

    #[error("none of the measurement columns [{}] are present in the file", expected.join(", "))]
    NoMeasurementColumns { expected: Vec<String> },

    #[error(
        "expected {required} measurement columns but resolved {}: found [{}], missing [{}]",
        found.len(),
        found.join(", "),
        missing.join(", ")
    )]
    IncompleteResolution {
        required: usize,
        found: Vec<String>,
        missing: Vec<String>,
    },

    #[error(
        "{which} marker column not found (accepted: {}); columns seen: {}",
        accepted.join(" | "),
        seen.join(", ")
    )]
    MarkerNotFound {
        which: MarkerKind,
        accepted: Vec<String>,
        seen: Vec<String>,
    },

    #[error("no numeric columns between '{start}' and '{end}'")]
    NoNumericColumns { start: String, end: String },

    #[error("'{0}' is not one of the measurement columns")]
    UnknownMeasurement(String),

    #[error("no rows match the current selection")]
    EmptyResultSet,

    #[error("column '{column}' has {found} values, expected {expected}")]
    RaggedTable {
        column: String,
        expected: usize,
        found: usize,
    },
}

/// Which end of a range scan a marker delimits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Start,
    End,
}

impl std::fmt::Display for MarkerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarkerKind::Start => write!(f, "start"),
            MarkerKind::End => write!(f, "end"),
        }
    }
}
