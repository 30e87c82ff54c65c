use thiserror::Error;

/// Errors a filter's `refresh` can return. Every variant maps to a
/// human-readable `Display` string and to the small distinct integer code
/// the original tool's `refresh` returned (`code()`), with `0` reserved for
/// success and kept out of this enum entirely.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("operation aborted")]
    Aborted,
    #[error("out of memory")]
    OutOfMemory,
    #[error("invalid input geometry: {0}")]
    InvalidGeometry(String),
    #[error("I/O error on {path}: {reason}")]
    Io { path: String, reason: String },
    #[error("mesh extraction produced no surface")]
    NoMesh,
    #[error("{filter}: {reason}")]
    FilterSpecific { filter: String, reason: String },
}

impl FilterError {
    /// Stable per-variant integer code; `0` is reserved for success and is
    /// never returned here.
    pub fn code(&self) -> i32 {
        match self {
            FilterError::Aborted => 1,
            FilterError::OutOfMemory => 2,
            FilterError::InvalidGeometry(_) => 3,
            FilterError::Io { .. } => 4,
            FilterError::NoMesh => 5,
            FilterError::FilterSpecific { .. } => 6,
        }
    }
}

/// `set_property` never returns a `FilterError`: invalid parameters are
/// reported as a plain boolean per spec §4.1/§7, never propagated to
/// refresh.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid value {value:?} for property {key}")]
pub struct InvalidParameter {
    pub key: u32,
    pub value: String,
}
