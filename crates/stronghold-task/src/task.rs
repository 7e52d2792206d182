//! The contract every background task implements.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use stronghold_protocol::{PlayerId, Value};
use stronghold_transport::Connection;

use crate::{TaskCategory, TaskConfig, TaskError, TaskId};

/// Why a task ended without completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellationReason {
    /// Stopped by a caller, or the connection closed.
    Manual,
    /// The configured timeout elapsed.
    Timeout,
    /// The body returned an error.
    Error,
}

impl fmt::Display for CancellationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CancellationReason::Manual => "manual",
            CancellationReason::Timeout => "timeout",
            CancellationReason::Error => "error",
        })
    }
}

/// What a running task can see: who it runs for and how to reach them.
#[derive(Debug, Clone)]
pub struct TaskContext {
    connection: Arc<Connection>,
    player_id: PlayerId,
    task_id: TaskId,
    category: TaskCategory,
}

impl TaskContext {
    pub(crate) fn new(
        connection: Arc<Connection>,
        player_id: PlayerId,
        task_id: TaskId,
        category: TaskCategory,
    ) -> Self {
        Self {
            connection,
            player_id,
            task_id,
            category,
        }
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    pub fn player_id(&self) -> &PlayerId {
        &self.player_id
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn category(&self) -> TaskCategory {
        self.category
    }

    /// Sends `[tag, args...]` to the player's connection.
    pub async fn send_message(
        &self,
        tag: &str,
        args: impl IntoIterator<Item = Value>,
    ) -> Result<(), TaskError> {
        self.connection.send_message(tag, args).await?;
        Ok(())
    }
}

/// A unit of deferred or periodic work scoped to one player.
///
/// The dispatcher owns the task once started and drives its hooks in
/// order:
///
/// ```text
/// on_start → (start delay)
///   one-shot:  execute → on_task_complete
///   repeating: [on_iteration_start → execute → on_iteration_complete → (interval)]*
///              → on_task_complete
/// stopped:     on_cancelled(Manual) | on_force_complete
/// timed out:   on_cancelled(Timeout)
/// body error:  on_cancelled(Error)
/// ```
///
/// Exactly one terminal hook fires per lifecycle.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use stronghold_task::{ServerTask, TaskCategory, TaskConfig, TaskContext, TaskError};
///
/// struct Heartbeat;
///
/// impl ServerTask for Heartbeat {
///     type StopParam = ();
///
///     fn category(&self) -> TaskCategory {
///         TaskCategory::TimeUpdate
///     }
///
///     fn config(&self) -> TaskConfig {
///         TaskConfig::repeating(Duration::from_secs(1))
///     }
///
///     fn stop_param(&self) -> Self::StopParam {}
///
///     async fn execute(&mut self, ctx: &TaskContext) -> Result<(), TaskError> {
///         ctx.send_message("tu", []).await
///     }
/// }
/// ```
pub trait ServerTask: Send + 'static {
    /// The value the category's identity rule derives the task id from.
    type StopParam: Any + Send + Sync;

    fn category(&self) -> TaskCategory;

    fn config(&self) -> TaskConfig;

    /// The stop parameter identifying this instance.
    fn stop_param(&self) -> Self::StopParam;

    /// The task body.
    fn execute(
        &mut self,
        ctx: &TaskContext,
    ) -> impl Future<Output = Result<(), TaskError>> + Send;

    fn on_start(&mut self, _ctx: &TaskContext) -> impl Future<Output = ()> + Send {
        async {}
    }

    fn on_iteration_start(&mut self, _ctx: &TaskContext) -> impl Future<Output = ()> + Send {
        async {}
    }

    fn on_iteration_complete(&mut self, _ctx: &TaskContext) -> impl Future<Output = ()> + Send {
        async {}
    }

    fn on_task_complete(&mut self, _ctx: &TaskContext) -> impl Future<Output = ()> + Send {
        async {}
    }

    /// Runs when the task is stopped early with
    /// [`StopMode::ForceComplete`](crate::StopMode::ForceComplete).
    /// Defaults to [`on_task_complete`](Self::on_task_complete).
    fn on_force_complete(&mut self, ctx: &TaskContext) -> impl Future<Output = ()> + Send {
        self.on_task_complete(ctx)
    }

    fn on_cancelled(
        &mut self,
        _ctx: &TaskContext,
        _reason: CancellationReason,
    ) -> impl Future<Output = ()> + Send {
        async {}
    }
}
