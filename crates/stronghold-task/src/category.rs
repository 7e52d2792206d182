//! The closed set of background task kinds and their identifiers.
//!
//! Categories are namespaced: `Building.Create`, `Mission.Return`, and so
//! on. Each has a short stable code that prefixes the ids of its tasks:
//!
//! | Category                | Code            |
//! |-------------------------|-----------------|
//! | `TimeUpdate`            | `TU`            |
//! | `Building.Create`       | `BLD-CREATE`    |
//! | `Building.Repair`       | `BLD-REPAIR`    |
//! | `Building.Upgrade`      | `BLD-UPGRADE`   |
//! | `Mission.Return`        | `MIS-RETURN`    |
//! | `Task.JunkRemoval`      | `TASK-JUNK`     |
//! | `BatchRecycle.Complete` | `BATCH-RECYCLE` |
//!
//! The set is fixed at compile time; nothing registers categories at
//! runtime.

use std::fmt;

// ---------------------------------------------------------------------------
// TaskCategory
// ---------------------------------------------------------------------------

/// Building timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildingKind {
    Create,
    Repair,
    Upgrade,
}

/// Mission timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MissionKind {
    Return,
}

/// Compound chores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChoreKind {
    JunkRemoval,
}

/// Batch recycling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecycleKind {
    Complete,
}

/// What a background task is for.
///
/// Categories are hierarchical (`Building` → `Create`). Each one has a
/// short, stable [`code`](Self::code) that prefixes every task id derived
/// for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskCategory {
    /// The periodic server-time push.
    TimeUpdate,
    Building(BuildingKind),
    Mission(MissionKind),
    Chore(ChoreKind),
    BatchRecycle(RecycleKind),
}

impl TaskCategory {
    /// Every category, in declaration order.
    pub const ALL: [TaskCategory; 7] = [
        TaskCategory::TimeUpdate,
        TaskCategory::Building(BuildingKind::Create),
        TaskCategory::Building(BuildingKind::Repair),
        TaskCategory::Building(BuildingKind::Upgrade),
        TaskCategory::Mission(MissionKind::Return),
        TaskCategory::Chore(ChoreKind::JunkRemoval),
        TaskCategory::BatchRecycle(RecycleKind::Complete),
    ];

    /// The short code used as the task id prefix.
    pub fn code(self) -> &'static str {
        match self {
            TaskCategory::TimeUpdate => "TU",
            TaskCategory::Building(BuildingKind::Create) => "BLD-CREATE",
            TaskCategory::Building(BuildingKind::Repair) => "BLD-REPAIR",
            TaskCategory::Building(BuildingKind::Upgrade) => "BLD-UPGRADE",
            TaskCategory::Mission(MissionKind::Return) => "MIS-RETURN",
            TaskCategory::Chore(ChoreKind::JunkRemoval) => "TASK-JUNK",
            TaskCategory::BatchRecycle(RecycleKind::Complete) => "BATCH-RECYCLE",
        }
    }

    /// Looks a category up by its code.
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }

    /// The top level of the hierarchy.
    pub fn namespace(self) -> &'static str {
        match self {
            TaskCategory::TimeUpdate => "TimeUpdate",
            TaskCategory::Building(_) => "Building",
            TaskCategory::Mission(_) => "Mission",
            TaskCategory::Chore(_) => "Task",
            TaskCategory::BatchRecycle(_) => "BatchRecycle",
        }
    }

    /// The leaf of the hierarchy, if there is one.
    pub fn leaf(self) -> Option<&'static str> {
        match self {
            TaskCategory::TimeUpdate => None,
            TaskCategory::Building(BuildingKind::Create) => Some("Create"),
            TaskCategory::Building(BuildingKind::Repair) => Some("Repair"),
            TaskCategory::Building(BuildingKind::Upgrade) => Some("Upgrade"),
            TaskCategory::Mission(MissionKind::Return) => Some("Return"),
            TaskCategory::Chore(ChoreKind::JunkRemoval) => Some("JunkRemoval"),
            TaskCategory::BatchRecycle(RecycleKind::Complete) => Some("Complete"),
        }
    }
}

impl fmt::Display for TaskCategory {
    /// `Building.Create`, `TimeUpdate`, ...
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.leaf() {
            Some(leaf) => write!(f, "{}.{leaf}", self.namespace()),
            None => f.write_str(self.namespace()),
        }
    }
}

// ---------------------------------------------------------------------------
// TaskId
// ---------------------------------------------------------------------------

/// A derived task identity, e.g. `BLD-CREATE-b12-p1`.
///
/// At most one task runs per id at a time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_codes_are_unique() {
        let codes: HashSet<_> = TaskCategory::ALL.iter().map(|c| c.code()).collect();
        assert_eq!(codes.len(), TaskCategory::ALL.len());
    }

    #[test]
    fn test_from_code_finds_every_category() {
        for category in TaskCategory::ALL {
            assert_eq!(TaskCategory::from_code(category.code()), Some(category));
        }
        assert_eq!(TaskCategory::from_code("NOPE"), None);
    }

    #[test]
    fn test_display_is_hierarchical() {
        assert_eq!(
            TaskCategory::Building(BuildingKind::Create).to_string(),
            "Building.Create"
        );
        assert_eq!(TaskCategory::Chore(ChoreKind::JunkRemoval).to_string(), "Task.JunkRemoval");
        assert_eq!(TaskCategory::TimeUpdate.to_string(), "TimeUpdate");
    }
}
