use stronghold_transport::{ConnectionId, TransportError};

use crate::{TaskCategory, TaskId};

/// Errors raised by the task dispatcher and by task bodies.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// No identity rule was registered for the category.
    #[error("no identity rule registered for {0}")]
    MissingIdentityRule(TaskCategory),

    /// The stop parameter type differs from the one the rule was
    /// registered with.
    #[error("stop parameter for {category} must be {expected}")]
    StopParamMismatch {
        category: TaskCategory,
        expected: &'static str,
    },

    /// A task with the same identity is already running.
    #[error("task {0} is already running")]
    AlreadyRunning(TaskId),

    /// Tasks can only be started for a connection that has joined.
    #[error("{0} has no player bound")]
    Unbound(ConnectionId),

    /// A task body failed.
    #[error("task failed: {0}")]
    Failed(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
