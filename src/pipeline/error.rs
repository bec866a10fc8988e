//! Pipeline-specific error types.

use crate::pipeline::id::{NodeId, PlugRef, SocketRef};
use thiserror::Error;

/// Errors that can occur within the filter graph engine.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The plug's required pattern does not match the socket's connector type.
    #[error("Incompatible connector type: plug wants '{pattern}', socket offers '{offered}'")]
    IncompatibleType { pattern: String, offered: String },

    /// A connector match predicate refused the link.
    #[error("Incompatible capability between {socket:?} and {plug:?}")]
    IncompatibleCapability { socket: SocketRef, plug: PlugRef },

    #[error("No module matches registration '{0}'")]
    NoMatchingModule(String),

    #[error("Node {0} produced no backend context")]
    NoContext(NodeId),

    /// Upstream data is not available yet. Recoverable by resolving and retrying.
    #[error("Incomplete graph at {0:?}")]
    IncompleteGraph(PlugRef),

    #[error("Allocation failure: {0}")]
    AllocationFailure(String),

    #[error("Connecting {socket:?} to {plug:?} would create a cycle")]
    CycleDetected { socket: SocketRef, plug: PlugRef },

    #[error("Invalid node {0}")]
    InvalidNode(NodeId),

    #[error("Invalid plug {0:?}")]
    InvalidPlug(PlugRef),

    #[error("Invalid socket {0:?}")]
    InvalidSocket(SocketRef),

    #[error("Invalid option '{key}': {message}")]
    InvalidOption { key: String, message: String },

    #[error("Maximum recursion depth {0} exceeded")]
    RecursionLimit(usize),

    #[error("Node {node} error: {message}")]
    Runner { node: NodeId, message: String },

    /// Failure inside a context producer or context conversion.
    #[error("Context producer error: {0}")]
    Producer(#[from] anyhow::Error),
}

impl PipelineError {
    /// Stable integer status for the top-level API. `0` is reserved for success.
    pub fn code(&self) -> i32 {
        match self {
            PipelineError::IncompatibleType { .. } => 1,
            PipelineError::IncompatibleCapability { .. } => 2,
            PipelineError::NoMatchingModule(_) => 3,
            PipelineError::NoContext(_) => 4,
            PipelineError::IncompleteGraph(_) => 5,
            PipelineError::AllocationFailure(_) => 6,
            PipelineError::CycleDetected { .. } => 7,
            PipelineError::InvalidNode(_)
            | PipelineError::InvalidPlug(_)
            | PipelineError::InvalidSocket(_) => 8,
            PipelineError::InvalidOption { .. } => 9,
            PipelineError::RecursionLimit(_) => 10,
            PipelineError::Runner { .. } => 11,
            PipelineError::Producer(_) => 12,
        }
    }

    /// Only missing upstream data can be fixed by resolving and running again.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PipelineError::IncompleteGraph(_))
    }

    pub fn runner(node: NodeId, message: impl Into<String>) -> Self {
        PipelineError::Runner {
            node,
            message: message.into(),
        }
    }

    pub fn invalid_option(key: impl Into<String>, message: impl Into<String>) -> Self {
        PipelineError::InvalidOption {
            key: key.into(),
            message: message.into(),
        }
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_nonzero_and_distinct_per_kind() {
        let plug = PlugRef::new(NodeId(0), 0);
        let errs = [
            PipelineError::NoMatchingModule("x".into()),
            PipelineError::NoContext(NodeId(1)),
            PipelineError::IncompleteGraph(plug),
            PipelineError::AllocationFailure("x".into()),
            PipelineError::RecursionLimit(4),
        ];
        let mut codes: Vec<i32> = errs.iter().map(|e| e.code()).collect();
        assert!(codes.iter().all(|&c| c != 0));
        codes.dedup();
        assert_eq!(codes.len(), errs.len());
    }

    #[test]
    fn test_only_incomplete_graph_is_recoverable() {
        let plug = PlugRef::new(NodeId(0), 0);
        assert!(PipelineError::IncompleteGraph(plug).is_recoverable());
        assert!(!PipelineError::NoContext(NodeId(0)).is_recoverable());
    }

    #[test]
    fn test_producer_preserves_source() {
        let err = PipelineError::from(anyhow::anyhow!("profile unreadable"));
        assert!(err.to_string().contains("profile unreadable"));
    }
}
