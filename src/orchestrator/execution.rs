//! Launching and polling asynchronous goal executions.
//!
//! Status polls are reads, so the retry executor applies to each one; the
//! launch itself is a write and is never re-sent.

use tokio_util::sync::CancellationToken;

use super::{CreatedLog, Orchestrator, PlanError};
use crate::error::{ClientError, ClientResult};
use crate::model::{Execution, ResourceId, ResourceKind};

impl Orchestrator {
    /// Launch an execution of `goal`.
    pub async fn execute_goal(
        &self,
        goal: &ResourceId,
        cancel: &CancellationToken,
    ) -> Result<ResourceId, PlanError> {
        let execution = self
            .client
            .execute_goal(goal, cancel)
            .await
            .map_err(|e| PlanError::new("execute goal", CreatedLog::default(), e))?;
        tracing::debug!(goal = %goal, execution = %execution, "execution launched");
        Ok(execution)
    }

    /// Poll until the execution reaches a terminal status, the deadline
    /// elapses, or the caller cancels.
    pub async fn wait_for_execution(
        &self,
        execution: &ResourceId,
        cancel: &CancellationToken,
    ) -> ClientResult<Execution> {
        let deadline = tokio::time::Instant::now()
            + std::time::Duration::from_millis(self.execution_deadline_ms);
        let interval = std::time::Duration::from_millis(self.poll_interval_ms);

        loop {
            let state = self.client.execution(execution, cancel).await?;
            if state.status.is_terminal() {
                return Ok(state);
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(ClientError::DeadlineExceeded {
                    waited_ms: self.execution_deadline_ms,
                });
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(ClientError::Canceled),
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    /// Launch and wait, in one call.
    pub async fn run_goal_to_completion(
        &self,
        goal: &ResourceId,
        cancel: &CancellationToken,
    ) -> Result<Execution, PlanError> {
        let execution = self.execute_goal(goal, cancel).await?;
        let mut created = CreatedLog::default();
        created.record(ResourceKind::Execution, &execution, "");
        self.wait_for_execution(&execution, cancel)
            .await
            .map_err(|e| PlanError::new("wait for execution", created, e))
    }
}
