use thiserror::Error;

use crate::NodeId;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TreeError {
    #[error("node {0:?} does not exist")]
    NoSuchNode(NodeId),
    #[error("reparenting {id:?} under {new_parent:?} would create a cycle")]
    WouldCreateCycle { id: NodeId, new_parent: NodeId },
}
