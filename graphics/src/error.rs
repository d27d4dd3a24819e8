//! Graphics error types.

use std::fmt;

/// Errors that can occur while scheduling and recording GPU work.
///
/// Every variant except [`FenceTimeout`](Self::FenceTimeout) is fatal for the
/// frame that produced it. Results that are merely not available yet, such
/// as timestamp queries, are reported as `Ok(None)` instead of an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphicsError {
    /// A configuration value is out of range, or a budget was sized wrong.
    InvalidConfiguration(String),
    /// An invalid parameter was provided.
    InvalidParameter(String),
    /// Failed to create a GPU object (sub-pool, descriptor set, fence, ...).
    ResourceCreationFailed(String),
    /// The render graph contains a cycle through the named node.
    CyclicDependency {
        /// Name of a node that is part of the cycle.
        node: String,
    },
    /// Traversal stalled: some reachable nodes wait on predecessors that are
    /// not part of the executed graph.
    NoProgress {
        /// Nodes that could be ordered before the traversal stalled.
        executed: usize,
        /// Nodes reachable from the graph roots.
        reachable: usize,
    },
    /// A node was recorded before and cannot be recorded again this frame.
    AlreadyRecorded {
        /// Name of the node.
        node: String,
    },
    /// Waiting for a fence took longer than the configured timeout.
    FenceTimeout,
    /// Out of GPU memory.
    OutOfMemory,
    /// The GPU device was lost.
    DeviceLost,
    /// An internal error occurred.
    Internal(String),
}

impl fmt::Display for GraphicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfiguration(msg) => write!(f, "invalid configuration: {msg}"),
            Self::InvalidParameter(msg) => write!(f, "invalid parameter: {msg}"),
            Self::ResourceCreationFailed(msg) => write!(f, "resource creation failed: {msg}"),
            Self::CyclicDependency { node } => {
                write!(f, "render graph contains cyclic dependency through node '{node}'")
            }
            Self::NoProgress {
                executed,
                reachable,
            } => write!(
                f,
                "render graph traversal made no progress after {executed} of {reachable} nodes"
            ),
            Self::AlreadyRecorded { node } => {
                write!(f, "render graph node '{node}' was already recorded")
            }
            Self::FenceTimeout => write!(f, "timed out waiting for fence"),
            Self::OutOfMemory => write!(f, "out of GPU memory"),
            Self::DeviceLost => write!(f, "GPU device lost"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for GraphicsError {}
