use thiserror::Error;

/// State load is all-or-nothing: any of these leaves the caller's existing
/// `AnalysisState` untouched, since the reader builds a fresh state and only
/// hands it back on full success.
#[derive(Debug, Error)]
pub enum StateLoadError {
    #[error("malformed XML: {0}")]
    Malformed(String),
    #[error("required element <{0}> missing")]
    MissingElement(&'static str),
    #[error("required attribute {attr:?} missing on <{element}>")]
    MissingAttribute { element: String, attr: &'static str },
    #[error("attribute {attr:?} on <{element}> is not a valid {expected}: {value:?}")]
    BadAttribute { element: String, attr: &'static str, expected: &'static str, value: String },
    #[error("filter type {0:?} is not registered with this loader")]
    UnknownFilterType(String),
    #[error("filter {path:?} rejected its own saved state: {reason}")]
    FilterRejectedState { path: String, reason: String },
    #[error("stash name {0:?} appears more than once")]
    DuplicateStashName(String),
    #[error("I/O error reading {path}: {reason}")]
    Io { path: String, reason: String },
}

#[derive(Debug, Error)]
pub enum StateSaveError {
    #[error("I/O error writing {path}: {reason}")]
    Io { path: String, reason: String },
    #[error("XML encoding error: {0}")]
    Encoding(String),
}
