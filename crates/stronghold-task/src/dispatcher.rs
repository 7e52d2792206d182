//! The task dispatcher: starts, tracks, and stops player-scoped tasks.
//!
//! # Lifecycle
//!
//! Every started task runs on its own Tokio task, under a child of the
//! connection's cancellation token. Stopping a task cancels that token;
//! the task observes it at its next wait (start delay or repeat
//! interval) or loop check, never in the middle of a body. Closing the
//! connection therefore stops every task started through it.
//!
//! # Concurrency
//!
//! Running instances live in a `DashMap` keyed by [`TaskId`], so
//! handlers on different connections start and stop tasks without a
//! global lock. Each instance carries a generation number: a lifecycle
//! that ends only removes its own entry, never one that replaced it.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::FutureExt;
use stronghold_protocol::PlayerId;
use stronghold_transport::{Connection, ConnectionId};
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use crate::identity::IdentityRules;
use crate::{CancellationReason, ServerTask, TaskCategory, TaskConfig, TaskContext, TaskError, TaskId};

/// How [`TaskDispatcher::stop_with`] ends a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopMode {
    /// Fires `on_cancelled(Manual)`.
    #[default]
    Cancel,
    /// Fires `on_force_complete`, e.g. when the player pays to finish early.
    ForceComplete,
}

/// A snapshot of a running task.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub id: TaskId,
    pub player_id: PlayerId,
    pub category: TaskCategory,
    pub conn_id: ConnectionId,
    pub config: TaskConfig,
    pub started_at: Instant,
}

struct TaskInstance {
    info: TaskInfo,
    token: CancellationToken,
    force_complete: Arc<AtomicBool>,
    generation: u64,
}

impl TaskInstance {
    fn stop(&self, mode: StopMode) {
        if mode == StopMode::ForceComplete {
            self.force_complete.store(true, Ordering::Release);
        }
        self.token.cancel();
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Registers identity rules and builds a [`TaskDispatcher`].
///
/// # Example
///
/// ```rust
/// use stronghold_task::{identity, TaskCategory, TaskDispatcher};
///
/// let dispatcher = TaskDispatcher::builder()
///     .identity_rule(TaskCategory::TimeUpdate, || (), |p, c, _: &()| {
///         identity::player_scoped(p, c)
///     })
///     .require([TaskCategory::TimeUpdate])
///     .build()
///     .unwrap();
/// assert!(dispatcher.is_empty());
/// ```
pub struct TaskDispatcherBuilder {
    rules: IdentityRules,
    required: Vec<TaskCategory>,
}

impl TaskDispatcherBuilder {
    fn new() -> Self {
        Self {
            rules: IdentityRules::default(),
            required: TaskCategory::ALL.to_vec(),
        }
    }

    /// Registers how ids for `category` are derived.
    ///
    /// `factory` builds a blank stop parameter for
    /// [`TaskDispatcher::stop_for`]; `derive` maps a filled-in one to the
    /// task id. Use the helpers in [`identity`](crate::identity) for the
    /// usual id shapes.
    pub fn identity_rule<P, F, D>(mut self, category: TaskCategory, factory: F, derive: D) -> Self
    where
        P: Any + Send + Sync,
        F: Fn() -> P + Send + Sync + 'static,
        D: Fn(&PlayerId, TaskCategory, &P) -> String + Send + Sync + 'static,
    {
        self.rules.insert(category, factory, derive);
        self
    }

    /// The categories that must have a rule. Defaults to
    /// [`TaskCategory::ALL`].
    pub fn require(mut self, categories: impl IntoIterator<Item = TaskCategory>) -> Self {
        self.required = categories.into_iter().collect();
        self
    }

    /// # Errors
    /// Returns [`TaskError::MissingIdentityRule`] for the first required
    /// category without a rule.
    pub fn build(self) -> Result<TaskDispatcher, TaskError> {
        if let Some(missing) = self.required.iter().find(|c| !self.rules.contains(**c)) {
            return Err(TaskError::MissingIdentityRule(*missing));
        }
        Ok(TaskDispatcher {
            inner: Arc::new(Inner {
                rules: self.rules,
                tasks: DashMap::new(),
                next_generation: AtomicU64::new(1),
            }),
        })
    }
}

// ---------------------------------------------------------------------------
// TaskDispatcher
// ---------------------------------------------------------------------------

struct Inner {
    rules: IdentityRules,
    tasks: DashMap<TaskId, TaskInstance>,
    next_generation: AtomicU64,
}

/// Starts and stops tasks by derived identity.
///
/// Cloning is cheap; clones share the same registry.
#[derive(Clone)]
pub struct TaskDispatcher {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for TaskDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDispatcher")
            .field("running", &self.inner.tasks.len())
            .finish()
    }
}

impl TaskDispatcher {
    pub fn builder() -> TaskDispatcherBuilder {
        TaskDispatcherBuilder::new()
    }

    /// Starts `task` for the player bound to `connection`.
    ///
    /// # Errors
    /// - [`TaskError::Unbound`] if the connection has not joined
    /// - [`TaskError::AlreadyRunning`] if a task with the same id runs
    /// - [`TaskError::MissingIdentityRule`] / [`TaskError::StopParamMismatch`]
    ///   if the id cannot be derived
    pub fn start<T: ServerTask>(
        &self,
        connection: &Arc<Connection>,
        task: T,
    ) -> Result<TaskId, TaskError> {
        self.launch(connection, task, false)
    }

    /// Starts `task`, first stopping any task with the same id.
    ///
    /// The replaced task sees `on_cancelled(Manual)`.
    pub fn restart<T: ServerTask>(
        &self,
        connection: &Arc<Connection>,
        task: T,
    ) -> Result<TaskId, TaskError> {
        self.launch(connection, task, true)
    }

    /// Cancels the task and forgets it. Returns `false` if nothing with
    /// that id was running. Idempotent.
    pub fn stop(&self, id: &TaskId) -> bool {
        self.stop_with(id, StopMode::Cancel)
    }

    /// Like [`stop`](Self::stop), choosing which terminal hook fires.
    pub fn stop_with(&self, id: &TaskId, mode: StopMode) -> bool {
        match self.inner.tasks.remove(id) {
            Some((_, instance)) => {
                debug!(task_id = %id, ?mode, "stopping task");
                instance.stop(mode);
                true
            }
            None => false,
        }
    }

    /// Stops the task identified by a stop parameter.
    ///
    /// The parameter is built by the category's factory and filled in by
    /// `configure`, then mapped through the category's identity rule.
    ///
    /// # Errors
    /// Fails if the category has no rule or its parameter is not a `P`.
    pub fn stop_for<P: Any>(
        &self,
        player_id: &PlayerId,
        category: TaskCategory,
        mode: StopMode,
        configure: impl FnOnce(&mut P),
    ) -> Result<bool, TaskError> {
        let id = self.inner.rules.derive_with(player_id, category, configure)?;
        Ok(self.stop_with(&id, mode))
    }

    /// Derives the id a task with this stop parameter would run under.
    pub fn task_id<P: Any>(
        &self,
        player_id: &PlayerId,
        category: TaskCategory,
        param: &P,
    ) -> Result<TaskId, TaskError> {
        self.inner.rules.derive(player_id, category, param)
    }

    /// Cancels every task of the player. Returns how many were stopped.
    pub fn stop_all_for_player(&self, player_id: &PlayerId) -> usize {
        // Collect first: removing while iterating would deadlock a shard.
        let ids: Vec<TaskId> = self
            .inner
            .tasks
            .iter()
            .filter(|entry| entry.info.player_id == *player_id)
            .map(|entry| entry.key().clone())
            .collect();

        let stopped = ids.iter().filter(|id| self.stop(id)).count();
        if stopped > 0 {
            debug!(%player_id, stopped, "stopped player tasks");
        }
        stopped
    }

    pub fn find(&self, id: &TaskId) -> Option<TaskInfo> {
        self.inner.tasks.get(id).map(|entry| entry.info.clone())
    }

    pub fn is_running(&self, id: &TaskId) -> bool {
        self.inner.tasks.contains_key(id)
    }

    /// Every running task of the player.
    pub fn running_for(&self, player_id: &PlayerId) -> Vec<TaskInfo> {
        self.inner
            .tasks
            .iter()
            .filter(|entry| entry.info.player_id == *player_id)
            .map(|entry| entry.info.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.tasks.is_empty()
    }

    /// Cancels every running task.
    pub fn shutdown(&self) {
        let ids: Vec<TaskId> = self.inner.tasks.iter().map(|e| e.key().clone()).collect();
        for id in &ids {
            self.stop(id);
        }
        debug!(stopped = ids.len(), "task dispatcher shut down");
    }

    fn launch<T: ServerTask>(
        &self,
        connection: &Arc<Connection>,
        task: T,
        replace: bool,
    ) -> Result<TaskId, TaskError> {
        let player_id = connection
            .player_id()
            .cloned()
            .ok_or(TaskError::Unbound(connection.id()))?;
        let category = task.category();
        let id = self
            .inner
            .rules
            .derive(&player_id, category, &task.stop_param())?;
        let config = task.config().validated();

        let token = connection.child_context();
        let force_complete = Arc::new(AtomicBool::new(false));
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let instance = TaskInstance {
            info: TaskInfo {
                id: id.clone(),
                player_id: player_id.clone(),
                category,
                conn_id: connection.id(),
                config: config.clone(),
                started_at: Instant::now(),
            },
            token: token.clone(),
            force_complete: Arc::clone(&force_complete),
            generation,
        };

        match self.inner.tasks.entry(id.clone()) {
            Entry::Occupied(mut slot) => {
                if !replace {
                    return Err(TaskError::AlreadyRunning(id));
                }
                debug!(task_id = %id, "replacing running task");
                slot.get().stop(StopMode::Cancel);
                slot.insert(instance);
            }
            Entry::Vacant(slot) => {
                slot.insert(instance);
            }
        }

        debug!(task_id = %id, %player_id, %category, "task started");

        let ctx = TaskContext::new(Arc::clone(connection), player_id, id.clone(), category);
        let control = Control {
            token,
            force_complete,
            generation,
        };
        tokio::spawn(supervise(Arc::clone(&self.inner), task, ctx, config, control));
        Ok(id)
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

struct Control {
    token: CancellationToken,
    force_complete: Arc<AtomicBool>,
    generation: u64,
}

enum Ending {
    Completed,
    Stopped,
    TimedOut,
    Failed(TaskError),
}

enum Interrupt {
    Stopped,
    TimedOut,
}

impl From<Interrupt> for Ending {
    fn from(interrupt: Interrupt) -> Self {
        match interrupt {
            Interrupt::Stopped => Ending::Stopped,
            Interrupt::TimedOut => Ending::TimedOut,
        }
    }
}

/// Runs the lifecycle, contains panics, and unregisters the instance.
async fn supervise<T: ServerTask>(
    inner: Arc<Inner>,
    mut task: T,
    ctx: TaskContext,
    config: TaskConfig,
    control: Control,
) {
    let mut ended = false;
    let outcome = AssertUnwindSafe(run(&mut task, &ctx, &config, &control, &mut ended))
        .catch_unwind()
        .await;
    if outcome.is_err() {
        error!(
            task_id = %ctx.task_id(),
            player_id = %ctx.player_id(),
            category = %ctx.category(),
            "task panicked"
        );
        // A panic before any terminal hook still owes the task one.
        if !ended
            && AssertUnwindSafe(task.on_cancelled(&ctx, CancellationReason::Error))
                .catch_unwind()
                .await
                .is_err()
        {
            error!(task_id = %ctx.task_id(), "on_cancelled panicked");
        }
    }

    inner
        .tasks
        .remove_if(ctx.task_id(), |_, instance| instance.generation == control.generation);
}

async fn run<T: ServerTask>(
    task: &mut T,
    ctx: &TaskContext,
    config: &TaskConfig,
    control: &Control,
    ended: &mut bool,
) {
    let deadline = config.timeout.map(|timeout| Instant::now() + timeout);

    task.on_start(ctx).await;
    let ending = drive(task, ctx, config, control, deadline).await;

    *ended = true;
    match ending {
        Ending::Completed => {
            trace!(task_id = %ctx.task_id(), "task complete");
            task.on_task_complete(ctx).await;
        }
        Ending::Stopped if control.force_complete.load(Ordering::Acquire) => {
            debug!(task_id = %ctx.task_id(), "task force-completed");
            task.on_force_complete(ctx).await;
        }
        Ending::Stopped => {
            debug!(task_id = %ctx.task_id(), "task cancelled");
            task.on_cancelled(ctx, CancellationReason::Manual).await;
        }
        Ending::TimedOut => {
            debug!(task_id = %ctx.task_id(), "task timed out");
            task.on_cancelled(ctx, CancellationReason::Timeout).await;
        }
        Ending::Failed(e) => {
            error!(
                task_id = %ctx.task_id(),
                player_id = %ctx.player_id(),
                category = %ctx.category(),
                error = %e,
                "task failed"
            );
            task.on_cancelled(ctx, CancellationReason::Error).await;
        }
    }
}

async fn drive<T: ServerTask>(
    task: &mut T,
    ctx: &TaskContext,
    config: &TaskConfig,
    control: &Control,
    deadline: Option<Instant>,
) -> Ending {
    if !config.start_delay.is_zero() {
        if let Err(interrupt) = pause(config.start_delay, deadline, &control.token).await {
            return interrupt.into();
        }
    }

    let Some(interval) = config.repeat_interval else {
        if let Err(interrupt) = check(deadline, &control.token) {
            return interrupt.into();
        }
        return match task.execute(ctx).await {
            Ok(()) => Ending::Completed,
            Err(e) => Ending::Failed(e),
        };
    };

    let mut iterations: u64 = 0;
    loop {
        if let Err(interrupt) = check(deadline, &control.token) {
            return interrupt.into();
        }

        iterations = iterations.saturating_add(1);
        trace!(task_id = %ctx.task_id(), iterations, "iteration");
        task.on_iteration_start(ctx).await;
        if let Err(e) = task.execute(ctx).await {
            return Ending::Failed(e);
        }
        task.on_iteration_complete(ctx).await;

        if reached_cap(iterations, config.max_repeats) {
            return Ending::Completed;
        }
        if let Err(interrupt) = pause(interval, deadline, &control.token).await {
            return interrupt.into();
        }
    }
}

/// Whether `iterations` completed runs exhaust the repeat cap.
fn reached_cap(iterations: u64, max_repeats: Option<u32>) -> bool {
    max_repeats.is_some_and(|max| iterations >= u64::from(max))
}

/// Sleeps for `duration`, cut short by cancellation or the deadline.
async fn pause(
    duration: Duration,
    deadline: Option<Instant>,
    token: &CancellationToken,
) -> Result<(), Interrupt> {
    let wake = Instant::now() + duration;
    match deadline {
        Some(deadline) if deadline <= wake => {
            tokio::select! {
                biased;
                () = token.cancelled() => Err(Interrupt::Stopped),
                () = tokio::time::sleep_until(deadline) => Err(Interrupt::TimedOut),
            }
        }
        _ => {
            tokio::select! {
                biased;
                () = token.cancelled() => Err(Interrupt::Stopped),
                () = tokio::time::sleep_until(wake) => Ok(()),
            }
        }
    }
}

fn check(deadline: Option<Instant>, token: &CancellationToken) -> Result<(), Interrupt> {
    if token.is_cancelled() {
        return Err(Interrupt::Stopped);
    }
    if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
        return Err(Interrupt::TimedOut);
    }
    Ok(())
}
