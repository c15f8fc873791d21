//! Checkpoint creation with the attachment invariant.
//!
//! A checkpoint that exists but is not attached to a journey is an invalid,
//! trackable state, not an ordinary creation failure.

use tokio_util::sync::CancellationToken;

use super::{CreatedLog, Orchestrator, PlanError};
use crate::error::ClientError;
use crate::model::{ResourceId, ResourceKind};

impl Orchestrator {
    /// Create a Checkpoint and unconditionally attach it to `journey` at
    /// 1-based `position`.
    ///
    /// If creation succeeds and attachment fails, the error is an
    /// [`ClientError::Orphaned`] fault carrying the created checkpoint's
    /// identifier, so the caller can retry only the attach or discard the
    /// orphan.
    pub async fn create_checkpoint_and_attach(
        &self,
        goal: &ResourceId,
        snapshot: &ResourceId,
        journey: &ResourceId,
        name: &str,
        position: u32,
        cancel: &CancellationToken,
    ) -> Result<ResourceId, PlanError> {
        if position == 0 {
            return Err(PlanError::new(
                "validate checkpoint position",
                CreatedLog::default(),
                ClientError::Validation("checkpoint position is 1-based; 0 is not valid".into()),
            ));
        }

        let checkpoint = self
            .client
            .create_checkpoint(goal, snapshot, name, cancel)
            .await
            .map_err(|e| PlanError::new("create checkpoint", CreatedLog::default(), e))?;
        let mut created = CreatedLog::default();
        created.record(ResourceKind::Checkpoint, &checkpoint, name);

        if let Err(e) = self
            .client
            .attach_checkpoint(journey, &checkpoint, position, cancel)
            .await
        {
            tracing::warn!(
                checkpoint = %checkpoint,
                journey = %journey,
                position,
                "checkpoint created but attachment failed; resource is orphaned"
            );
            return Err(PlanError::new(
                "attach checkpoint",
                created,
                ClientError::Orphaned {
                    id: checkpoint,
                    action: "attach checkpoint".into(),
                    source: Box::new(e),
                },
            ));
        }

        Ok(checkpoint)
    }
}
