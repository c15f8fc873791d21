//! Batch tree creation: Project → Goal[] → Journey[] → Checkpoint[] →
//! Step[], depth-first.
//!
//! The first journey/checkpoint of each goal reuses the goal cascade;
//! later siblings are created fresh. A failure at any node aborts only that
//! node's subtree; sibling subtrees continue and the report accumulates a
//! per-node outcome instead of aborting the whole batch.

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::cascade::CascadeOutcome;
use super::{CreatedLog, Orchestrator};
use crate::api::StepCommand;
use crate::error::{ClientError, ClientResult};
use crate::model::{GoalSpec, ResourceId, ResourceKind};
use crate::normalize::Extraction;

/// Input tree for [`Orchestrator::batch_create`]. The project must already
/// exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectPlan {
    pub project: ResourceId,
    pub goals: Vec<GoalPlan>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalPlan {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub journeys: Vec<JourneyPlan>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JourneyPlan {
    pub name: String,
    #[serde(default)]
    pub checkpoints: Vec<CheckpointPlan>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointPlan {
    pub name: String,
    #[serde(default)]
    pub steps: Vec<StepCommand>,
}

/// Outcome of one node in the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NodeOutcome {
    /// Created fresh with a trustworthy identifier.
    Created { id: ResourceId },
    /// An auto-created resource adopted by the engine.
    Reused { id: ResourceId },
    /// Created, but the API echoed the sentinel identifier.
    Placeholder { sentinel: i64 },
    /// Success reported with no identifier.
    NoId,
    Failed { step: String, error: String },
    /// Not attempted: an ancestor or earlier ordered sibling failed, or the
    /// batch was canceled.
    Skipped,
}

impl NodeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            NodeOutcome::Created { .. }
                | NodeOutcome::Reused { .. }
                | NodeOutcome::Placeholder { .. }
                | NodeOutcome::NoId
        )
    }

    /// The node's identifier, when it is trustworthy as a reference.
    pub fn id(&self) -> Option<&ResourceId> {
        match self {
            NodeOutcome::Created { id } | NodeOutcome::Reused { id } => Some(id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    /// 1-based order within the checkpoint plan.
    pub position: u32,
    pub action: String,
    #[serde(flatten)]
    pub outcome: NodeOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckpointReport {
    pub name: String,
    #[serde(flatten)]
    pub outcome: NodeOutcome,
    pub steps: Vec<StepReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JourneyReport {
    pub name: String,
    #[serde(flatten)]
    pub outcome: NodeOutcome,
    pub checkpoints: Vec<CheckpointReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GoalReport {
    pub name: String,
    #[serde(flatten)]
    pub outcome: NodeOutcome,
    pub journeys: Vec<JourneyReport>,
}

/// Per-node results for the whole batch, plus everything that was created.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub goals: Vec<GoalReport>,
    #[serde(skip)]
    pub created: CreatedLog,
}

impl BatchReport {
    /// True when every node in the tree succeeded.
    pub fn is_complete(&self) -> bool {
        self.goals.iter().all(|g| {
            g.outcome.is_success()
                && g.journeys.iter().all(|j| {
                    j.outcome.is_success()
                        && j.checkpoints.iter().all(|c| {
                            c.outcome.is_success()
                                && c.steps.iter().all(|s| s.outcome.is_success())
                        })
                })
        })
    }
}

impl Orchestrator {
    /// Create the whole tree, goal subtrees possibly in parallel.
    ///
    /// Returns `Err` only when canceled before any work started; a
    /// cancellation mid-flight marks the remaining nodes `Skipped` so the
    /// partial report is not lost.
    pub async fn batch_create(
        &self,
        plan: &ProjectPlan,
        cancel: &CancellationToken,
    ) -> ClientResult<BatchReport> {
        if cancel.is_cancelled() {
            return Err(ClientError::Canceled);
        }

        let mut created = CreatedLog::default();
        let mut goals = Vec::with_capacity(plan.goals.len());

        if self.max_goal_parallelism <= 1 || plan.goals.len() <= 1 {
            for goal_plan in &plan.goals {
                let (report, log) = self.run_goal(&plan.project, goal_plan, cancel).await;
                created.extend(log);
                goals.push(report);
            }
        } else {
            // Collect-then-merge: each worker returns its own results and
            // the merge is single-threaded after all workers complete.
            let mut results: Vec<Option<(GoalReport, CreatedLog)>> =
                plan.goals.iter().map(|_| None).collect();
            let mut join_set: JoinSet<(usize, (GoalReport, CreatedLog))> = JoinSet::new();
            let mut next = 0usize;

            while next < plan.goals.len() && join_set.len() < self.max_goal_parallelism {
                self.spawn_goal(&mut join_set, plan, next, cancel);
                next += 1;
            }
            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok((idx, outcome)) => results[idx] = Some(outcome),
                    Err(join_err) => {
                        tracing::warn!(error = %join_err, "goal worker aborted");
                    }
                }
                if next < plan.goals.len() {
                    self.spawn_goal(&mut join_set, plan, next, cancel);
                    next += 1;
                }
            }

            for (idx, slot) in results.into_iter().enumerate() {
                match slot {
                    Some((report, log)) => {
                        created.extend(log);
                        goals.push(report);
                    }
                    None => goals.push(GoalReport {
                        name: plan.goals[idx].name.clone(),
                        outcome: NodeOutcome::Failed {
                            step: "run goal subtree".into(),
                            error: "goal worker aborted".into(),
                        },
                        journeys: plan.goals[idx].journeys.iter().map(skipped_journey).collect(),
                    }),
                }
            }
        }

        Ok(BatchReport { goals, created })
    }

    fn spawn_goal(
        &self,
        join_set: &mut JoinSet<(usize, (GoalReport, CreatedLog))>,
        plan: &ProjectPlan,
        idx: usize,
        cancel: &CancellationToken,
    ) {
        let orchestrator = self.clone();
        let project = plan.project.clone();
        let goal_plan = plan.goals[idx].clone();
        let cancel = cancel.clone();
        join_set.spawn(async move {
            let outcome = orchestrator.run_goal(&project, &goal_plan, &cancel).await;
            (idx, outcome)
        });
    }

    /// One goal subtree. Never fails the batch; failures become per-node
    /// outcomes.
    async fn run_goal(
        &self,
        project: &ResourceId,
        plan: &GoalPlan,
        cancel: &CancellationToken,
    ) -> (GoalReport, CreatedLog) {
        let mut created = CreatedLog::default();
        let spec = GoalSpec {
            name: plan.name.clone(),
            url: plan.url.clone(),
        };
        let first_journey_name = plan.journeys.first().map(|j| j.name.as_str());

        let cascade = match self
            .create_goal_cascade(project, &spec, first_journey_name, cancel)
            .await
        {
            Ok(cascade) => cascade,
            Err(e) => {
                created.extend(e.created.clone());
                return (
                    GoalReport {
                        name: plan.name.clone(),
                        outcome: NodeOutcome::Failed {
                            step: e.step,
                            error: e.source.to_string(),
                        },
                        journeys: plan.journeys.iter().map(skipped_journey).collect(),
                    },
                    created,
                );
            }
        };
        created.extend(cascade.created.clone());

        let mut journeys = Vec::with_capacity(plan.journeys.len());
        for (idx, journey_plan) in plan.journeys.iter().enumerate() {
            if cancel.is_cancelled() {
                journeys.push(skipped_journey(journey_plan));
                continue;
            }
            let report = if idx == 0 {
                self.run_first_journey(&cascade, journey_plan, cancel, &mut created)
                    .await
            } else {
                self.run_new_journey(&cascade, journey_plan, cancel, &mut created)
                    .await
            };
            journeys.push(report);
        }

        (
            GoalReport {
                name: plan.name.clone(),
                outcome: NodeOutcome::Created {
                    id: cascade.goal.clone(),
                },
                journeys,
            },
            created,
        )
    }

    /// The goal's first journey: adopt the cascade's auto-created journey
    /// and its first checkpoint.
    async fn run_first_journey(
        &self,
        cascade: &CascadeOutcome,
        plan: &JourneyPlan,
        cancel: &CancellationToken,
        created: &mut CreatedLog,
    ) -> JourneyReport {
        let mut checkpoints = Vec::with_capacity(plan.checkpoints.len());
        for (idx, checkpoint_plan) in plan.checkpoints.iter().enumerate() {
            if cancel.is_cancelled() {
                checkpoints.push(skipped_checkpoint(checkpoint_plan));
                continue;
            }
            let report = if idx == 0 {
                // The auto-created checkpoint is the existing first one.
                let steps = self
                    .run_steps_on_reused_checkpoint(cascade, &checkpoint_plan.steps, cancel, created)
                    .await;
                CheckpointReport {
                    name: checkpoint_plan.name.clone(),
                    outcome: NodeOutcome::Reused {
                        id: cascade.checkpoint.clone(),
                    },
                    steps,
                }
            } else {
                self.run_new_checkpoint(cascade, &cascade.journey, checkpoint_plan, (idx + 1) as u32, cancel, created)
                    .await
            };
            checkpoints.push(report);
        }

        JourneyReport {
            name: plan.name.clone(),
            outcome: NodeOutcome::Reused {
                id: cascade.journey.clone(),
            },
            checkpoints,
        }
    }

    /// A sibling journey after the first: created fresh, all checkpoints
    /// fresh.
    async fn run_new_journey(
        &self,
        cascade: &CascadeOutcome,
        plan: &JourneyPlan,
        cancel: &CancellationToken,
        created: &mut CreatedLog,
    ) -> JourneyReport {
        let journey = match self
            .client
            .create_journey(&cascade.goal, &cascade.snapshot, &plan.name, cancel)
            .await
        {
            Ok(id) => {
                created.record(ResourceKind::Journey, &id, &plan.name);
                id
            }
            Err(e) => {
                return JourneyReport {
                    name: plan.name.clone(),
                    outcome: NodeOutcome::Failed {
                        step: "create journey".into(),
                        error: e.to_string(),
                    },
                    checkpoints: plan.checkpoints.iter().map(skipped_checkpoint).collect(),
                };
            }
        };

        let mut checkpoints = Vec::with_capacity(plan.checkpoints.len());
        for (idx, checkpoint_plan) in plan.checkpoints.iter().enumerate() {
            if cancel.is_cancelled() {
                checkpoints.push(skipped_checkpoint(checkpoint_plan));
                continue;
            }
            checkpoints.push(
                self.run_new_checkpoint(cascade, &journey, checkpoint_plan, (idx + 1) as u32, cancel, created)
                    .await,
            );
        }

        JourneyReport {
            name: plan.name.clone(),
            outcome: NodeOutcome::Created { id: journey },
            checkpoints,
        }
    }

    async fn run_new_checkpoint(
        &self,
        cascade: &CascadeOutcome,
        journey: &ResourceId,
        plan: &CheckpointPlan,
        position: u32,
        cancel: &CancellationToken,
        created: &mut CreatedLog,
    ) -> CheckpointReport {
        let checkpoint = match self
            .create_checkpoint_and_attach(
                &cascade.goal,
                &cascade.snapshot,
                journey,
                &plan.name,
                position,
                cancel,
            )
            .await
        {
            Ok(id) => {
                created.record(ResourceKind::Checkpoint, &id, &plan.name);
                id
            }
            Err(e) => {
                // Orphans land here too; the created log keeps their ids.
                created.extend(e.created.clone());
                return CheckpointReport {
                    name: plan.name.clone(),
                    outcome: NodeOutcome::Failed {
                        step: e.step,
                        error: e.source.to_string(),
                    },
                    steps: plan.steps.iter().map(|c| skipped_step(c, 0)).collect(),
                };
            }
        };

        let steps = self
            .create_steps(&checkpoint, &plan.steps, 1, cancel, created)
            .await;
        CheckpointReport {
            name: plan.name.clone(),
            outcome: NodeOutcome::Created { id: checkpoint },
            steps,
        }
    }

    /// Steps for the adopted first checkpoint. A leading navigate command
    /// maps onto the existing navigation step (updated in place when the
    /// target differs); a second navigation step is never created here.
    async fn run_steps_on_reused_checkpoint(
        &self,
        cascade: &CascadeOutcome,
        steps: &[StepCommand],
        cancel: &CancellationToken,
        created: &mut CreatedLog,
    ) -> Vec<StepReport> {
        let mut reports = Vec::with_capacity(steps.len());
        let mut remote_position = cascade.existing_steps + 1;
        let mut aborted = false;

        for (idx, command) in steps.iter().enumerate() {
            let plan_position = (idx + 1) as u32;
            if aborted || cancel.is_cancelled() {
                reports.push(skipped_step(command, plan_position));
                continue;
            }

            if idx == 0 && cascade.navigation_step.is_some() {
                if let StepCommand::Navigate { url } = command {
                    let step_id = cascade.navigation_step.clone().expect("checked above");
                    let outcome = if cascade.navigation_target.as_deref() == Some(url.as_str()) {
                        NodeOutcome::Reused { id: step_id }
                    } else {
                        match self.client.update_step_target(&step_id, url, cancel).await {
                            Ok(()) => NodeOutcome::Reused { id: step_id },
                            Err(e) => {
                                aborted = true;
                                NodeOutcome::Failed {
                                    step: "update navigation step".into(),
                                    error: e.to_string(),
                                }
                            }
                        }
                    };
                    reports.push(StepReport {
                        position: plan_position,
                        action: command.action().to_string(),
                        outcome,
                    });
                    continue;
                }
            }

            let report = self
                .create_one_step(&cascade.checkpoint, command, remote_position, plan_position, cancel, created)
                .await;
            remote_position += 1;
            if matches!(report.outcome, NodeOutcome::Failed { .. }) {
                aborted = true;
            }
            reports.push(report);
        }

        reports
    }

    /// Steps for a freshly created checkpoint, 1-based order preserved.
    async fn create_steps(
        &self,
        checkpoint: &ResourceId,
        steps: &[StepCommand],
        start_position: u32,
        cancel: &CancellationToken,
        created: &mut CreatedLog,
    ) -> Vec<StepReport> {
        let mut reports = Vec::with_capacity(steps.len());
        let mut aborted = false;

        for (idx, command) in steps.iter().enumerate() {
            let plan_position = (idx + 1) as u32;
            if aborted || cancel.is_cancelled() {
                reports.push(skipped_step(command, plan_position));
                continue;
            }
            let remote_position = start_position + idx as u32;
            let report = self
                .create_one_step(checkpoint, command, remote_position, plan_position, cancel, created)
                .await;
            if matches!(report.outcome, NodeOutcome::Failed { .. }) {
                // Later steps would land at wrong positions; skip the rest
                // of this checkpoint and let sibling checkpoints continue.
                aborted = true;
            }
            reports.push(report);
        }

        reports
    }

    async fn create_one_step(
        &self,
        checkpoint: &ResourceId,
        command: &StepCommand,
        remote_position: u32,
        plan_position: u32,
        cancel: &CancellationToken,
        created: &mut CreatedLog,
    ) -> StepReport {
        let outcome = match self
            .client
            .create_step(checkpoint, remote_position, command, cancel)
            .await
        {
            Ok(Extraction::Id(id)) => {
                created.record(ResourceKind::Step, &id, command.action());
                NodeOutcome::Created { id }
            }
            Ok(Extraction::Placeholder(sentinel)) => NodeOutcome::Placeholder { sentinel },
            Ok(Extraction::NoIdSuccess) => NodeOutcome::NoId,
            Err(e) => NodeOutcome::Failed {
                step: "create step".into(),
                error: e.to_string(),
            },
        };
        StepReport {
            position: plan_position,
            action: command.action().to_string(),
            outcome,
        }
    }
}

fn skipped_journey(plan: &JourneyPlan) -> JourneyReport {
    JourneyReport {
        name: plan.name.clone(),
        outcome: NodeOutcome::Skipped,
        checkpoints: plan.checkpoints.iter().map(skipped_checkpoint).collect(),
    }
}

fn skipped_checkpoint(plan: &CheckpointPlan) -> CheckpointReport {
    CheckpointReport {
        name: plan.name.clone(),
        outcome: NodeOutcome::Skipped,
        steps: plan
            .steps
            .iter()
            .enumerate()
            .map(|(idx, c)| skipped_step(c, (idx + 1) as u32))
            .collect(),
    }
}

fn skipped_step(command: &StepCommand, plan_position: u32) -> StepReport {
    StepReport {
        position: plan_position,
        action: command.action().to_string(),
        outcome: NodeOutcome::Skipped,
    }
}
