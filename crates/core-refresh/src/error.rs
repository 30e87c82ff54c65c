use core_filter::FilterError;
use core_tree::NodeId;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// Another refresh is already in flight; the caller must wait or queue.
    #[error("a refresh is already in progress")]
    AlreadyRunning,
    /// Propagated from the failing node's `Filter::refresh`. The walk stops
    /// there; no partial outputs are retained, and caches valid before the
    /// refresh began remain valid.
    #[error("filter at node {node:?} failed: {source}")]
    NodeFailed { node: NodeId, source: FilterError },
}

impl RefreshError {
    pub fn is_aborted(&self) -> bool {
        matches!(self, RefreshError::NodeFailed { source: FilterError::Aborted, .. })
    }
}
