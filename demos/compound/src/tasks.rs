//! The compound's timed game operations.
//!
//! Every task notifies the client when it finishes so the client can
//! refresh the affected building, mission, or job.

use std::time::Duration;

use stronghold::prelude::*;
use stronghold::transport::unix_millis;

/// Server clock push.
pub const TIME_UPDATE: &str = "tu";
/// A building finished constructing, repairing, or upgrading.
pub const BUILDING_COMPLETE: &str = "bc";
/// A mission's survivors are back.
pub const MISSION_RETURN_COMPLETE: &str = "mrc";
/// A chore finished.
pub const TASK_COMPLETE: &str = "tc";
/// A recycling batch finished.
pub const BATCH_RECYCLE_COMPLETE: &str = "brc";

const CLOCK_TICK: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Stop parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone)]
pub struct BuildingStop {
    pub building_id: String,
}

#[derive(Debug, Default, Clone)]
pub struct MissionStop {
    pub mission_id: String,
}

#[derive(Debug, Default, Clone)]
pub struct ChoreStop {
    pub task_id: String,
}

#[derive(Debug, Default, Clone)]
pub struct RecycleStop {
    pub job_id: String,
}

/// A dispatcher with an identity rule for every category.
///
/// The clock is one per player; everything else is one per player per
/// building, mission, chore, or job.
pub fn dispatcher() -> Result<TaskDispatcher, TaskError> {
    let mut builder = TaskDispatcher::builder().identity_rule(
        TaskCategory::TimeUpdate,
        || (),
        |p, c, _: &()| identity::player_scoped(p, c),
    );
    for kind in [
        BuildingKind::Create,
        BuildingKind::Repair,
        BuildingKind::Upgrade,
    ] {
        builder = builder.identity_rule(
            TaskCategory::Building(kind),
            BuildingStop::default,
            |p, c, s: &BuildingStop| identity::keyed(p, c, &s.building_id),
        );
    }
    builder
        .identity_rule(
            TaskCategory::Mission(MissionKind::Return),
            MissionStop::default,
            |p, c, s: &MissionStop| identity::keyed(p, c, &s.mission_id),
        )
        .identity_rule(
            TaskCategory::Chore(ChoreKind::JunkRemoval),
            ChoreStop::default,
            |p, c, s: &ChoreStop| identity::keyed(p, c, &s.task_id),
        )
        .identity_rule(
            TaskCategory::BatchRecycle(RecycleKind::Complete),
            RecycleStop::default,
            |p, c, s: &RecycleStop| identity::keyed(p, c, &s.job_id),
        )
        .build()
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Pushes the server clock every second while the player is online.
#[derive(Debug, Default)]
pub struct TimeUpdate;

impl ServerTask for TimeUpdate {
    type StopParam = ();

    fn category(&self) -> TaskCategory {
        TaskCategory::TimeUpdate
    }

    fn config(&self) -> TaskConfig {
        TaskConfig::repeating(CLOCK_TICK).with_start_delay(CLOCK_TICK)
    }

    fn stop_param(&self) -> Self::StopParam {}

    async fn execute(&mut self, ctx: &TaskContext) -> Result<(), TaskError> {
        ctx.send_message(TIME_UPDATE, [Value::Double(unix_millis() as f64)])
            .await
    }
}

/// Construction, repair, or upgrade of one building.
#[derive(Debug)]
pub struct BuildingTimer {
    pub kind: BuildingKind,
    pub building_id: String,
    pub duration: Duration,
}

impl BuildingTimer {
    pub fn new(kind: BuildingKind, building_id: impl Into<String>, duration: Duration) -> Self {
        Self {
            kind,
            building_id: building_id.into(),
            duration,
        }
    }
}

impl ServerTask for BuildingTimer {
    type StopParam = BuildingStop;

    fn category(&self) -> TaskCategory {
        TaskCategory::Building(self.kind)
    }

    fn config(&self) -> TaskConfig {
        TaskConfig::once_after(self.duration)
    }

    fn stop_param(&self) -> BuildingStop {
        BuildingStop {
            building_id: self.building_id.clone(),
        }
    }

    async fn execute(&mut self, ctx: &TaskContext) -> Result<(), TaskError> {
        ctx.send_message(BUILDING_COMPLETE, [Value::from(self.building_id.as_str())])
            .await
    }

    async fn on_cancelled(&mut self, ctx: &TaskContext, reason: CancellationReason) {
        tracing::debug!(
            task_id = %ctx.task_id(),
            building_id = %self.building_id,
            %reason,
            "building timer cancelled"
        );
    }
}

#[derive(Debug)]
pub struct MissionReturn {
    pub mission_id: String,
    pub duration: Duration,
}

impl ServerTask for MissionReturn {
    type StopParam = MissionStop;

    fn category(&self) -> TaskCategory {
        TaskCategory::Mission(MissionKind::Return)
    }

    fn config(&self) -> TaskConfig {
        TaskConfig::once_after(self.duration)
    }

    fn stop_param(&self) -> MissionStop {
        MissionStop {
            mission_id: self.mission_id.clone(),
        }
    }

    async fn execute(&mut self, ctx: &TaskContext) -> Result<(), TaskError> {
        ctx.send_message(
            MISSION_RETURN_COMPLETE,
            [Value::from(self.mission_id.as_str())],
        )
        .await
    }
}

/// Clearing junk off the compound.
///
/// Speeding it up force-completes the task, which notifies the client
/// right away instead of after the remaining time.
#[derive(Debug)]
pub struct JunkRemoval {
    pub task_id: String,
    pub duration: Duration,
}

impl JunkRemoval {
    async fn notify(&self, ctx: &TaskContext) {
        if let Err(e) = ctx
            .send_message(TASK_COMPLETE, [Value::from(self.task_id.as_str())])
            .await
        {
            tracing::debug!(task_id = %ctx.task_id(), error = %e, "chore notice not sent");
        }
    }
}

impl ServerTask for JunkRemoval {
    type StopParam = ChoreStop;

    fn category(&self) -> TaskCategory {
        TaskCategory::Chore(ChoreKind::JunkRemoval)
    }

    fn config(&self) -> TaskConfig {
        TaskConfig::once_after(self.duration)
    }

    fn stop_param(&self) -> ChoreStop {
        ChoreStop {
            task_id: self.task_id.clone(),
        }
    }

    async fn execute(&mut self, ctx: &TaskContext) -> Result<(), TaskError> {
        self.notify(ctx).await;
        Ok(())
    }

    async fn on_force_complete(&mut self, ctx: &TaskContext) {
        self.notify(ctx).await;
    }
}

#[derive(Debug)]
pub struct BatchRecycle {
    pub job_id: String,
    pub duration: Duration,
}

impl ServerTask for BatchRecycle {
    type StopParam = RecycleStop;

    fn category(&self) -> TaskCategory {
        TaskCategory::BatchRecycle(RecycleKind::Complete)
    }

    fn config(&self) -> TaskConfig {
        TaskConfig::once_after(self.duration)
    }

    fn stop_param(&self) -> RecycleStop {
        RecycleStop {
            job_id: self.job_id.clone(),
        }
    }

    async fn execute(&mut self, ctx: &TaskContext) -> Result<(), TaskError> {
        ctx.send_message(BATCH_RECYCLE_COMPLETE, [Value::from(self.job_id.as_str())])
            .await
    }
}
