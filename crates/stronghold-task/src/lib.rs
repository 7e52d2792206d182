//! Player-scoped background tasks for Stronghold.
//!
//! Game timers (a building finishing, a mission returning, the periodic
//! server-time push) run as [`ServerTask`]s started through a
//! [`TaskDispatcher`]. Each task has a derived identity ([`TaskId`]) built
//! from its player, its [`TaskCategory`], and a category-specific stop
//! parameter, so a later message can cancel or force-complete exactly
//! that task.
//!
//! # Integration
//!
//! Handlers start tasks against the player's connection and stop them by
//! stop parameter:
//!
//! ```ignore
//! dispatcher.start(ctx.connection(), BuildingCreate::new(building_id, duration))?;
//!
//! dispatcher.stop_for(&player_id, category, StopMode::Cancel, |s: &mut BuildingStop| {
//!     s.building_id = building_id;
//! })?;
//! ```
//!
//! Tasks hang off the connection's cancellation token, so closing the
//! connection cancels them; the server also calls
//! [`TaskDispatcher::stop_all_for_player`] on teardown and when a player
//! rejoins from a new connection.
//!
//! # How it fits in the stack
//!
//! ```text
//! Handlers (above)      ← start / restart / stop_for while handling a message
//!     ↕
//! Task Layer (this crate)  ← identity rules, running-task table, lifecycles
//!     ↕
//! Transport (below)     ← Connection: send path and cancellation token
//! ```
//!
//! # Lifecycle at a glance
//!
//! A task moves through `on_start`, an optional start delay, then either
//! one `execute` or a loop of iterations separated by the repeat
//! interval. It ends in exactly one terminal hook:
//!
//! | Ending                           | Hook                          |
//! |----------------------------------|-------------------------------|
//! | body finished / repeat cap hit   | `on_task_complete`            |
//! | `StopMode::ForceComplete`        | `on_force_complete`           |
//! | stopped, replaced, conn closed   | `on_cancelled(Manual)`        |
//! | timeout elapsed                  | `on_cancelled(Timeout)`       |
//! | body returned `Err` or panicked  | `on_cancelled(Error)`         |
//!
//! # Identity
//!
//! Every category needs an identity rule before the dispatcher builds
//! (see [`identity`]). Two starts that derive the same [`TaskId`] cannot
//! run side by side: [`TaskDispatcher::start`] rejects the second one,
//! [`TaskDispatcher::restart`] replaces the first.

#![allow(async_fn_in_trait)]

mod category;
mod config;
mod dispatcher;
mod error;
pub mod identity;
mod task;

pub use category::{BuildingKind, ChoreKind, MissionKind, RecycleKind, TaskCategory, TaskId};
pub use config::TaskConfig;
pub use dispatcher::{StopMode, TaskDispatcher, TaskDispatcherBuilder, TaskInfo};
pub use error::TaskError;
pub use task::{CancellationReason, ServerTask, TaskContext};
