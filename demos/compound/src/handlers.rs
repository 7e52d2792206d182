//! Game handlers for the compound: init, auth, and save requests.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use stronghold::prelude::*;
use stronghold::transport::unix_millis;

use crate::tasks::{
    BatchRecycle, BuildingStop, BuildingTimer, ChoreStop, JunkRemoval, MissionReturn, TimeUpdate,
};

/// Key present once the client finished loading.
pub const INIT_COMPLETE: &str = "ic";
/// Key carrying a save request.
pub const SAVE: &str = "s";
/// Tag of a save response.
pub const SAVE_RESPONSE: &str = "r";

const BUILDING_KINDS: [BuildingKind; 3] = [
    BuildingKind::Create,
    BuildingKind::Repair,
    BuildingKind::Upgrade,
];

/// Acknowledges the client's auth message without replying.
#[derive(Debug, Default)]
pub struct AuthHandler;

#[async_trait]
impl MessageHandler for AuthHandler {
    fn name(&self) -> &str {
        "auth"
    }

    fn matches(&self, message: &Message) -> bool {
        message.is("auth")
    }

    async fn handle(&self, ctx: &mut HandlerContext<'_>) -> Result<(), StrongholdError> {
        tracing::debug!(conn_id = %ctx.connection().id(), "auth message ignored");
        Ok(())
    }
}

/// Marks the player online and starts their clock.
#[derive(Debug, Default)]
pub struct InitCompleteHandler;

#[async_trait]
impl MessageHandler for InitCompleteHandler {
    fn name(&self) -> &str {
        "init-complete"
    }

    fn matches(&self, message: &Message) -> bool {
        message.contains(INIT_COMPLETE)
    }

    async fn handle(&self, ctx: &mut HandlerContext<'_>) -> Result<(), StrongholdError> {
        let player_id = ctx.require_player()?.clone();
        ctx.sessions().lock().await.mark_online(&player_id)?;
        // A quick rejoin can still find the previous clock registered.
        ctx.restart_task(TimeUpdate)?;
        tracing::info!(%player_id, "player online");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Saves
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SaveRequest {
    id: Option<String>,
    #[serde(default)]
    data: serde_json::Value,
}

/// Payload of saves that target one thing and may carry a duration in
/// seconds.
#[derive(Debug, Deserialize)]
struct Timed {
    id: String,
    #[serde(default)]
    duration: f64,
}

impl Timed {
    fn duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.duration).unwrap_or_default()
    }
}

/// Handles `["s", <json>]` save requests, dispatching on `data._type`.
///
/// Every save is answered with `["r", <save id>, <server time>, <json>]`;
/// the JSON body carries `success` and, on failure, an `error`.
#[derive(Debug, Default)]
pub struct SaveHandler;

#[async_trait]
impl MessageHandler for SaveHandler {
    fn name(&self) -> &str {
        "save"
    }

    fn matches(&self, message: &Message) -> bool {
        message.contains(SAVE)
    }

    async fn handle(&self, ctx: &mut HandlerContext<'_>) -> Result<(), StrongholdError> {
        let player_id = ctx.require_player()?.clone();
        let request: SaveRequest = ctx
            .message()
            .get_json(SAVE)
            .ok_or_else(|| StrongholdError::BadRequest("save is not a JSON object".into()))?;
        let save_type = ctx.message().save_type().unwrap_or_default();
        tracing::debug!(%player_id, %save_type, "save request");

        let outcome = match save_type.as_str() {
            "building/create" => start_building(ctx, BuildingKind::Create, &request.data),
            "building/repair" => start_building(ctx, BuildingKind::Repair, &request.data),
            "building/upgrade" => start_building(ctx, BuildingKind::Upgrade, &request.data),
            "building/speedup" => speed_up_building(ctx, &player_id, &request.data),
            "building/cancel" => cancel_building(ctx, &player_id, &request.data),
            "mission/return" => payload(&request.data).and_then(|t: Timed| {
                started(ctx.start_task(MissionReturn {
                    mission_id: t.id.clone(),
                    duration: t.duration(),
                }))
            }),
            "task/junk" => payload(&request.data).and_then(|t: Timed| {
                started(ctx.start_task(JunkRemoval {
                    task_id: t.id.clone(),
                    duration: t.duration(),
                }))
            }),
            "task/speedup" => payload(&request.data).and_then(|t: Timed| {
                ctx.tasks()
                    .stop_for(
                        &player_id,
                        TaskCategory::Chore(ChoreKind::JunkRemoval),
                        StopMode::ForceComplete,
                        |s: &mut ChoreStop| s.task_id = t.id,
                    )
                    .map_err(StrongholdError::from)
            }),
            "recycle/batch" => payload(&request.data).and_then(|t: Timed| {
                started(ctx.start_task(BatchRecycle {
                    job_id: t.id.clone(),
                    duration: t.duration(),
                }))
            }),
            other => {
                tracing::warn!(%player_id, save_type = other, "unknown save type");
                Err(StrongholdError::BadRequest(format!(
                    "unknown save type {other:?}"
                )))
            }
        };

        let body = match outcome {
            Ok(success) => json!({ "success": success }),
            Err(StrongholdError::BadRequest(reason)) => {
                json!({ "success": false, "error": reason })
            }
            Err(e) => return Err(e),
        };
        respond(ctx, request.id.as_deref(), &body).await
    }
}

/// Sends `["r", <save id>, <now>, <body>]`. A save without an id is
/// answered under `"m"`.
async fn respond(
    ctx: &HandlerContext<'_>,
    save_id: Option<&str>,
    body: &serde_json::Value,
) -> Result<(), StrongholdError> {
    ctx.send_message(
        SAVE_RESPONSE,
        [
            Value::from(save_id.unwrap_or("m")),
            Value::Double(unix_millis() as f64),
            Value::json(body)?,
        ],
    )
    .await
}

fn payload<T: serde::de::DeserializeOwned>(data: &serde_json::Value) -> Result<T, StrongholdError> {
    T::deserialize(data).map_err(|e| StrongholdError::BadRequest(e.to_string()))
}

/// A duplicate start is answered as a failed save rather than an error.
fn started(result: Result<TaskId, StrongholdError>) -> Result<bool, StrongholdError> {
    match result {
        Ok(_) => Ok(true),
        Err(StrongholdError::Task(TaskError::AlreadyRunning(id))) => {
            tracing::debug!(task_id = %id, "task already running");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

fn start_building(
    ctx: &HandlerContext<'_>,
    kind: BuildingKind,
    data: &serde_json::Value,
) -> Result<bool, StrongholdError> {
    let t: Timed = payload(data)?;
    started(ctx.start_task(BuildingTimer::new(kind, t.id.as_str(), t.duration())))
}

/// Restarts whichever timer runs for the building with the new, shorter
/// duration.
fn speed_up_building(
    ctx: &HandlerContext<'_>,
    player_id: &PlayerId,
    data: &serde_json::Value,
) -> Result<bool, StrongholdError> {
    let t: Timed = payload(data)?;
    let stop = BuildingStop {
        building_id: t.id.clone(),
    };
    for kind in BUILDING_KINDS {
        let id = ctx
            .tasks()
            .task_id(player_id, TaskCategory::Building(kind), &stop)?;
        if ctx.tasks().is_running(&id) {
            ctx.restart_task(BuildingTimer::new(kind, t.id.as_str(), t.duration()))?;
            return Ok(true);
        }
    }
    Ok(false)
}

fn cancel_building(
    ctx: &HandlerContext<'_>,
    player_id: &PlayerId,
    data: &serde_json::Value,
) -> Result<bool, StrongholdError> {
    let t: Timed = payload(data)?;
    let mut stopped = false;
    for kind in BUILDING_KINDS {
        stopped |= ctx.tasks().stop_for(
            player_id,
            TaskCategory::Building(kind),
            StopMode::Cancel,
            |s: &mut BuildingStop| s.building_id = t.id.clone(),
        )?;
    }
    Ok(stopped)
}
