//! Domain model: canonical identifiers, the remote resource hierarchy, and
//! executions.
//!
//! Resources are owned by the remote system. These types are short-lived
//! references threaded through a single workflow run, never a durable local
//! copy.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical resource identifier.
///
/// The remote API hands out numeric ids for most resources and opaque
/// business strings (`"exec_123"`) for a few. Both forms are carried
/// verbatim; numeric ids sort before tags so that ascending-id ordering is
/// total.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceId {
    Num(i64),
    Tag(String),
}

impl ResourceId {
    pub fn as_num(&self) -> Option<i64> {
        match self {
            ResourceId::Num(n) => Some(*n),
            ResourceId::Tag(_) => None,
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceId::Num(n) => write!(f, "{}", n),
            ResourceId::Tag(s) => f.write_str(s),
        }
    }
}

impl Ord for ResourceId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (ResourceId::Num(a), ResourceId::Num(b)) => a.cmp(b),
            (ResourceId::Num(_), ResourceId::Tag(_)) => Ordering::Less,
            (ResourceId::Tag(_), ResourceId::Num(_)) => Ordering::Greater,
            (ResourceId::Tag(a), ResourceId::Tag(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for ResourceId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<i64> for ResourceId {
    fn from(n: i64) -> Self {
        ResourceId::Num(n)
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        ResourceId::Tag(s.to_string())
    }
}

/// Kinds of remote resources, for created-resource reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Project,
    Goal,
    Journey,
    Checkpoint,
    Step,
    Execution,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Project => "project",
            ResourceKind::Goal => "goal",
            ResourceKind::Journey => "journey",
            ResourceKind::Checkpoint => "checkpoint",
            ResourceKind::Step => "step",
            ResourceKind::Execution => "execution",
        };
        f.write_str(name)
    }
}

/// Caller-facing description of a Goal to create.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalSpec {
    pub name: String,
    /// Target URL for the cascade's navigation step. When set and different
    /// from the auto-created step's target, that step is updated in place.
    #[serde(default)]
    pub url: Option<String>,
}

/// A Journey as listed by the remote API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JourneySummary {
    pub id: ResourceId,
    pub name: String,
    pub position: Option<u32>,
}

/// A Checkpoint as listed by the remote API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointSummary {
    pub id: ResourceId,
    pub name: String,
    pub position: Option<u32>,
}

/// A Step as listed by the remote API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSummary {
    pub id: ResourceId,
    pub action: String,
    pub position: Option<u32>,
    /// Navigation target, present on navigate steps.
    pub target: Option<String>,
}

impl StepSummary {
    pub fn is_navigation(&self) -> bool {
        self.action.eq_ignore_ascii_case("navigate")
    }
}

/// Status of an asynchronous Goal execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Queued,
    Running,
    Completed,
    Failed,
    /// Preserved verbatim for forward compatibility rather than dropped.
    Unknown(String),
}

impl ExecutionStatus {
    /// The remote reports status strings in mixed case and several
    /// spellings; all observed forms map into the four canonical states.
    pub fn from_wire(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "QUEUED" | "PENDING" | "WAITING" => ExecutionStatus::Queued,
            "RUNNING" | "EXECUTING" | "IN_PROGRESS" => ExecutionStatus::Running,
            "COMPLETED" | "FINISHED" | "PASSED" | "SUCCESS" => ExecutionStatus::Completed,
            "FAILED" | "ERROR" | "CANCELED" | "CANCELLED" => ExecutionStatus::Failed,
            _ => ExecutionStatus::Unknown(raw.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }
}

/// Completed/total step counts reported while an execution runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionProgress {
    pub completed: u64,
    pub total: u64,
}

/// An asynchronous remote run of a Goal. Mutated only by polling; terminal
/// at Completed/Failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub id: ResourceId,
    pub status: ExecutionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub progress: ExecutionProgress,
}
