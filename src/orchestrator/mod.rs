//! Workflow engine: multi-step, invariant-preserving creation plans over
//! the primitive remote operations, with partial-failure reporting.
//!
//! - [`Orchestrator::create_goal_cascade`] — goal creation plus discovery
//!   and reuse of the auto-created journey/checkpoint pair.
//! - [`Orchestrator::create_checkpoint_and_attach`] — checkpoint creation
//!   with the attachment invariant, surfacing orphans distinctly.
//! - [`Orchestrator::batch_create`] — depth-first tree creation with
//!   continue-and-aggregate failure handling.
//! - [`Orchestrator::execute_goal`] / [`Orchestrator::wait_for_execution`]
//!   — launching and polling asynchronous runs.

pub mod batch;
pub mod cascade;
pub mod checkpoint;
pub mod execution;

use std::sync::Arc;

use thiserror::Error;

use crate::client::ApiClient;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::model::{ResourceId, ResourceKind};

pub use batch::{
    BatchReport, CheckpointPlan, CheckpointReport, GoalPlan, GoalReport, JourneyPlan,
    JourneyReport, NodeOutcome, ProjectPlan, StepReport,
};
pub use cascade::CascadeOutcome;

/// One successfully created remote resource.
#[derive(Debug, Clone)]
pub struct CreatedResource {
    pub kind: ResourceKind,
    pub id: ResourceId,
    pub name: String,
}

/// Everything a workflow created, in creation order. Threaded through every
/// plan so failures can list what already exists remotely.
#[derive(Debug, Clone, Default)]
pub struct CreatedLog {
    entries: Vec<CreatedResource>,
}

impl CreatedLog {
    pub fn record(&mut self, kind: ResourceKind, id: &ResourceId, name: &str) {
        self.entries.push(CreatedResource {
            kind,
            id: id.clone(),
            name: name.to_string(),
        });
    }

    pub fn extend(&mut self, other: CreatedLog) {
        self.entries.extend(other.entries);
    }

    pub fn entries(&self) -> &[CreatedResource] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// A workflow failure: the plan step that failed, plus every resource
/// created before it. The remote offers no rollback, so the log is the
/// caller's only handle on what now exists.
#[derive(Debug, Error)]
#[error("{step}: {source}")]
pub struct PlanError {
    pub step: String,
    pub created: CreatedLog,
    #[source]
    pub source: ClientError,
}

impl PlanError {
    pub(crate) fn new(step: impl Into<String>, created: CreatedLog, source: ClientError) -> Self {
        Self {
            step: step.into(),
            created,
            source,
        }
    }
}

/// The workflow engine. Transport, retry policy, and breaker settings are
/// injected through the client; no package-level mutable state.
#[derive(Clone)]
pub struct Orchestrator {
    client: Arc<ApiClient>,
    max_goal_parallelism: usize,
    poll_interval_ms: u64,
    execution_deadline_ms: u64,
}

impl Orchestrator {
    pub fn new(client: Arc<ApiClient>, config: &ClientConfig) -> Self {
        Self {
            client,
            max_goal_parallelism: config.max_goal_parallelism.max(1),
            poll_interval_ms: config.poll_interval_ms,
            execution_deadline_ms: config.execution_deadline_ms,
        }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }
}
