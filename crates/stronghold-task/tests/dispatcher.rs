//! Integration tests for the task dispatcher.
//!
//! Uses `start_paused = true` so Tokio auto-advances the clock whenever
//! every task is waiting; sleeping in the test lets timers fire in order.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use stronghold_protocol::PlayerId;
use stronghold_task::{
    BuildingKind, CancellationReason, ChoreKind, ServerTask, StopMode, TaskCategory, TaskConfig,
    TaskContext, TaskDispatcher, TaskError, identity,
};
use stronghold_transport::Connection;
use tokio::sync::mpsc;

// =========================================================================
// Helpers
// =========================================================================

type Log = Arc<Mutex<Vec<String>>>;

const CREATE: TaskCategory = TaskCategory::Building(BuildingKind::Create);
const JUNK: TaskCategory = TaskCategory::Chore(ChoreKind::JunkRemoval);

#[derive(Debug, Default, Clone)]
struct KeyStop {
    key: String,
}

/// Records every hook it sees into a shared log.
struct Recorder {
    category: TaskCategory,
    key: String,
    config: TaskConfig,
    log: Log,
    executions: u32,
    fail_on: Option<u32>,
}

impl Recorder {
    fn new(category: TaskCategory, key: &str, config: TaskConfig, log: &Log) -> Self {
        Self {
            category,
            key: key.to_owned(),
            config,
            log: Arc::clone(log),
            executions: 0,
            fail_on: None,
        }
    }

    fn failing_on(mut self, execution: u32) -> Self {
        self.fail_on = Some(execution);
        self
    }

    fn push(&self, entry: &str) {
        self.log.lock().unwrap().push(entry.to_owned());
    }
}

impl ServerTask for Recorder {
    type StopParam = KeyStop;

    fn category(&self) -> TaskCategory {
        self.category
    }

    fn config(&self) -> TaskConfig {
        self.config.clone()
    }

    fn stop_param(&self) -> KeyStop {
        KeyStop {
            key: self.key.clone(),
        }
    }

    async fn execute(&mut self, _ctx: &TaskContext) -> Result<(), TaskError> {
        self.executions += 1;
        self.push("execute");
        if self.fail_on == Some(self.executions) {
            return Err(TaskError::Failed("boom".into()));
        }
        Ok(())
    }

    async fn on_start(&mut self, _ctx: &TaskContext) {
        self.push("start");
    }

    async fn on_iteration_start(&mut self, _ctx: &TaskContext) {
        self.push("iteration_start");
    }

    async fn on_iteration_complete(&mut self, _ctx: &TaskContext) {
        self.push("iteration_complete");
    }

    async fn on_task_complete(&mut self, _ctx: &TaskContext) {
        self.push("complete");
    }

    async fn on_cancelled(&mut self, _ctx: &TaskContext, reason: CancellationReason) {
        self.push(&format!("cancelled:{reason}"));
    }
}

/// Panics in its body, recording the hooks around it.
struct Exploding {
    log: Log,
}

impl Exploding {
    fn new(log: &Log) -> Self {
        Self {
            log: Arc::clone(log),
        }
    }

    fn push(&self, entry: &str) {
        self.log.lock().unwrap().push(entry.to_owned());
    }
}

impl ServerTask for Exploding {
    type StopParam = KeyStop;

    fn category(&self) -> TaskCategory {
        JUNK
    }

    fn config(&self) -> TaskConfig {
        TaskConfig::default()
    }

    fn stop_param(&self) -> KeyStop {
        KeyStop { key: "boom".into() }
    }

    async fn execute(&mut self, _ctx: &TaskContext) -> Result<(), TaskError> {
        self.push("execute");
        panic!("task body exploded");
    }

    async fn on_start(&mut self, _ctx: &TaskContext) {
        self.push("start");
    }

    async fn on_task_complete(&mut self, _ctx: &TaskContext) {
        self.push("complete");
    }

    async fn on_cancelled(&mut self, _ctx: &TaskContext, reason: CancellationReason) {
        self.push(&format!("cancelled:{reason}"));
    }
}

fn dispatcher() -> TaskDispatcher {
    let mut builder = TaskDispatcher::builder();
    for category in TaskCategory::ALL {
        builder = builder.identity_rule(category, KeyStop::default, |p, c, s: &KeyStop| {
            identity::keyed(p, c, &s.key)
        });
    }
    builder.build().unwrap()
}

fn joined(player: &str) -> (Arc<Connection>, mpsc::Receiver<Vec<u8>>) {
    let addr: SocketAddr = "127.0.0.1:7777".parse().unwrap();
    let (conn, rx) = Connection::channel(addr, 64);
    conn.bind_player(PlayerId::new(player)).unwrap();
    (conn, rx)
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

async fn sleep_secs(secs: f64) {
    tokio::time::sleep(Duration::from_secs_f64(secs)).await;
}

// =========================================================================
// Lifecycle ordering
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_repeating_task_runs_hooks_in_order_until_max_repeats() {
    let tasks = dispatcher();
    let (conn, _rx) = joined("p1");
    let log = new_log();
    let config = TaskConfig::repeating(Duration::from_secs(1)).with_max_repeats(3);

    let id = tasks.start(&conn, Recorder::new(CREATE, "b1", config, &log)).unwrap();
    sleep_secs(10.0).await;

    let mut expected = vec!["start".to_owned()];
    for _ in 0..3 {
        expected.extend(["iteration_start", "execute", "iteration_complete"].map(String::from));
    }
    expected.push("complete".to_owned());
    assert_eq!(entries(&log), expected);
    assert!(!tasks.is_running(&id));
}

#[tokio::test(start_paused = true)]
async fn test_one_shot_waits_for_start_delay() {
    let tasks = dispatcher();
    let (conn, _rx) = joined("p1");
    let log = new_log();

    tasks
        .start(&conn, Recorder::new(CREATE, "b1", TaskConfig::once_after(Duration::from_secs(5)), &log))
        .unwrap();

    sleep_secs(4.0).await;
    assert_eq!(entries(&log), ["start"]);

    sleep_secs(2.0).await;
    assert_eq!(entries(&log), ["start", "execute", "complete"]);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_preempts_repeat_cap() {
    let tasks = dispatcher();
    let (conn, _rx) = joined("p1");
    let log = new_log();
    let config = TaskConfig::repeating(Duration::from_secs(1))
        .with_max_repeats(5)
        .with_timeout(Duration::from_millis(2500));

    tasks.start(&conn, Recorder::new(CREATE, "b1", config, &log)).unwrap();
    sleep_secs(10.0).await;

    let log = entries(&log);
    assert_eq!(log.iter().filter(|e| *e == "execute").count(), 3);
    assert_eq!(log.last().map(String::as_str), Some("cancelled:timeout"));
    assert!(!log.contains(&"complete".to_owned()));
}

#[tokio::test(start_paused = true)]
async fn test_body_error_cancels_with_error_reason() {
    let tasks = dispatcher();
    let (conn, _rx) = joined("p1");
    let log = new_log();
    let task = Recorder::new(CREATE, "b1", TaskConfig::repeating(Duration::from_secs(1)), &log)
        .failing_on(2);

    tasks.start(&conn, task).unwrap();
    sleep_secs(10.0).await;

    let log = entries(&log);
    assert_eq!(log.iter().filter(|e| *e == "execute").count(), 2);
    assert_eq!(log.last().map(String::as_str), Some("cancelled:error"));
    assert!(tasks.is_empty());
}

// =========================================================================
// Stopping
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_stop_during_delay_cancels_without_executing() {
    let tasks = dispatcher();
    let (conn, _rx) = joined("p1");
    let log = new_log();

    let id = tasks
        .start(&conn, Recorder::new(CREATE, "b1", TaskConfig::once_after(Duration::from_secs(60)), &log))
        .unwrap();
    sleep_secs(1.0).await;

    assert!(tasks.stop(&id));
    assert!(!tasks.is_running(&id));
    sleep_secs(120.0).await;

    assert_eq!(entries(&log), ["start", "cancelled:manual"]);
}

#[tokio::test(start_paused = true)]
async fn test_stop_is_idempotent() {
    let tasks = dispatcher();
    let (conn, _rx) = joined("p1");
    let log = new_log();

    let id = tasks
        .start(&conn, Recorder::new(CREATE, "b1", TaskConfig::repeating(Duration::from_secs(1)), &log))
        .unwrap();

    assert!(tasks.stop(&id));
    assert!(!tasks.stop(&id));
    sleep_secs(5.0).await;
    assert!(!tasks.stop(&id));

    let cancellations = entries(&log)
        .iter()
        .filter(|e| e.starts_with("cancelled"))
        .count();
    assert_eq!(cancellations, 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_for_derives_same_id_and_force_completes() {
    let tasks = dispatcher();
    let (conn, _rx) = joined("p1");
    let log = new_log();

    tasks
        .start(&conn, Recorder::new(JUNK, "t7", TaskConfig::once_after(Duration::from_secs(60)), &log))
        .unwrap();
    sleep_secs(1.0).await;

    let stopped = tasks
        .stop_for(&PlayerId::new("p1"), JUNK, StopMode::ForceComplete, |s: &mut KeyStop| {
            s.key = "t7".into();
        })
        .unwrap();
    assert!(stopped);
    sleep_secs(1.0).await;

    // `on_force_complete` defaults to `on_task_complete`; the body never ran.
    assert_eq!(entries(&log), ["start", "complete"]);
}

#[tokio::test(start_paused = true)]
async fn test_stop_for_wrong_param_type_is_rejected() {
    let tasks = dispatcher();
    let result = tasks.stop_for(&PlayerId::new("p1"), CREATE, StopMode::Cancel, |_: &mut u32| {});
    assert!(matches!(result, Err(TaskError::StopParamMismatch { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_stop_all_for_player_leaves_other_players_running() {
    let tasks = dispatcher();
    let (p1, _rx1) = joined("p1");
    let (p2, _rx2) = joined("p2");
    let log = new_log();
    let forever = || TaskConfig::repeating(Duration::from_secs(1));

    tasks.start(&p1, Recorder::new(CREATE, "b1", forever(), &log)).unwrap();
    tasks.start(&p1, Recorder::new(CREATE, "b2", forever(), &log)).unwrap();
    let other = tasks.start(&p2, Recorder::new(CREATE, "b1", forever(), &log)).unwrap();

    assert_eq!(tasks.stop_all_for_player(&PlayerId::new("p1")), 2);
    assert_eq!(tasks.stop_all_for_player(&PlayerId::new("p1")), 0);
    assert!(tasks.is_running(&other));
    assert_eq!(tasks.running_for(&PlayerId::new("p2")).len(), 1);
    assert!(tasks.running_for(&PlayerId::new("p1")).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_connection_shutdown_cancels_its_tasks() {
    let tasks = dispatcher();
    let (conn, _rx) = joined("p1");
    let log = new_log();

    tasks
        .start(&conn, Recorder::new(CREATE, "b1", TaskConfig::repeating(Duration::from_secs(1)), &log))
        .unwrap();
    sleep_secs(1.5).await;

    conn.shutdown();
    sleep_secs(5.0).await;

    assert_eq!(entries(&log).last().map(String::as_str), Some("cancelled:manual"));
    assert!(tasks.is_empty());
}

// =========================================================================
// Identity and uniqueness
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_duplicate_start_is_rejected() {
    let tasks = dispatcher();
    let (conn, _rx) = joined("p1");
    let log = new_log();
    let config = || TaskConfig::once_after(Duration::from_secs(60));

    let id = tasks.start(&conn, Recorder::new(CREATE, "b1", config(), &log)).unwrap();
    assert_eq!(id.as_str(), "BLD-CREATE-b1-p1");

    let dup = tasks.start(&conn, Recorder::new(CREATE, "b1", config(), &log));
    assert!(matches!(dup, Err(TaskError::AlreadyRunning(ref d)) if *d == id));

    // Same key, different category: a distinct identity.
    let repair = TaskCategory::Building(BuildingKind::Repair);
    let other = tasks.start(&conn, Recorder::new(repair, "b1", config(), &log)).unwrap();
    assert_ne!(other, id);
    assert_eq!(tasks.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_restart_replaces_running_task() {
    let tasks = dispatcher();
    let (conn, _rx) = joined("p1");
    let old_log = new_log();
    let new_log = new_log();

    let id = tasks
        .start(&conn, Recorder::new(CREATE, "b1", TaskConfig::once_after(Duration::from_secs(60)), &old_log))
        .unwrap();
    sleep_secs(1.0).await;

    let restarted = tasks
        .restart(&conn, Recorder::new(CREATE, "b1", TaskConfig::once_after(Duration::from_secs(5)), &new_log))
        .unwrap();
    assert_eq!(restarted, id);
    sleep_secs(10.0).await;

    assert_eq!(entries(&old_log), ["start", "cancelled:manual"]);
    assert_eq!(entries(&new_log), ["start", "execute", "complete"]);
    assert!(tasks.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_task_id_matches_started_id() {
    let tasks = dispatcher();
    let (conn, _rx) = joined("p1");
    let log = new_log();

    let started = tasks
        .start(&conn, Recorder::new(JUNK, "t1", TaskConfig::once_after(Duration::from_secs(60)), &log))
        .unwrap();
    let derived = tasks
        .task_id(&PlayerId::new("p1"), JUNK, &KeyStop { key: "t1".into() })
        .unwrap();

    assert_eq!(started, derived);
    let info = tasks.find(&started).unwrap();
    assert_eq!(info.category, JUNK);
    assert_eq!(info.player_id, PlayerId::new("p1"));
    assert_eq!(info.conn_id, conn.id());
}

#[tokio::test(start_paused = true)]
async fn test_start_on_unbound_connection_fails() {
    let tasks = dispatcher();
    let addr: SocketAddr = "127.0.0.1:7777".parse().unwrap();
    let (conn, _rx) = Connection::channel(addr, 8);
    let log = new_log();

    let result = tasks.start(&conn, Recorder::new(CREATE, "b1", TaskConfig::default(), &log));
    assert!(matches!(result, Err(TaskError::Unbound(id)) if id == conn.id()));
    assert!(tasks.is_empty());
}

#[test]
fn test_build_without_required_rule_fails() {
    let result = TaskDispatcher::builder()
        .identity_rule(TaskCategory::TimeUpdate, || (), |p, c, _: &()| {
            identity::player_scoped(p, c)
        })
        .build();
    assert!(matches!(result, Err(TaskError::MissingIdentityRule(c)) if c == CREATE));
}

// =========================================================================
// Fault containment
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_panicking_task_is_contained_and_unregistered() {
    let tasks = dispatcher();
    let (conn, _rx) = joined("p1");
    let log = new_log();

    tasks.start(&conn, Exploding::new(&log)).unwrap();
    sleep_secs(1.0).await;

    assert!(tasks.is_empty());
    assert!(!conn.is_closed());
    assert_eq!(entries(&log), vec!["start", "execute", "cancelled:error"]);
}
