use std::fmt;

pub type PietResult<T> = Result<T, PietError>;

/// The kind of dataset entity a unique name was expected to resolve to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReferenceKind {
    Measure,
    Level,
    Hierarchy,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReferenceKind::Measure => "measure",
            ReferenceKind::Level => "level",
            ReferenceKind::Hierarchy => "hierarchy",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PietError {
    #[error("unresolved {kind} reference: {unique_name}")]
    UnresolvedReference {
        kind: ReferenceKind,
        unique_name: String,
    },

    #[error("query targets dataset {query} but was compiled against {dataset}")]
    DatasetMismatch { query: String, dataset: String },

    #[error("dataset {id}:{cube} not found")]
    DatasetNotFound { id: String, cube: String },

    #[error("invalid dataset metadata: {0}")]
    InvalidMetadata(String),

    #[error("index {index} out of bounds for collection of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("a filter for level {level} already exists")]
    DuplicateFilter { level: String },

    #[error("listener rejected change: {0}")]
    Listener(String),

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl PietError {
    pub(crate) fn unresolved(kind: ReferenceKind, unique_name: impl Into<String>) -> Self {
        PietError::UnresolvedReference {
            kind,
            unique_name: unique_name.into(),
        }
    }
}
