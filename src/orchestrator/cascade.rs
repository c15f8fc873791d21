//! Goal cascade: create a Goal, then discover and adopt the journey and
//! checkpoint the remote auto-creates alongside it.

use tokio_util::sync::CancellationToken;

use super::{CreatedLog, Orchestrator, PlanError};
use crate::error::ClientError;
use crate::model::{GoalSpec, ResourceId, ResourceKind, StepSummary};

/// Everything the cascade produced or discovered, ready for follow-up work
/// under the same goal.
#[derive(Debug, Clone)]
pub struct CascadeOutcome {
    pub goal: ResourceId,
    pub snapshot: ResourceId,
    /// The auto-created journey, renamed when a name was requested.
    pub journey: ResourceId,
    /// The auto-created first checkpoint of that journey.
    pub checkpoint: ResourceId,
    /// The checkpoint's leading navigation step, when present.
    pub navigation_step: Option<ResourceId>,
    /// The navigation step's target after any in-place update.
    pub navigation_target: Option<String>,
    /// Steps already present on the auto-created checkpoint.
    pub existing_steps: u32,
    pub created: CreatedLog,
}

/// Ascending-id ordering is the tie-break for "auto-created first".
///
/// This is an assumption about the remote's identifier allocation, not a
/// documented contract; every discovery in the engine routes through this
/// one predicate so a change lands in one place.
pub(crate) fn first_by_ascending_id<T>(items: &[T], id_of: impl Fn(&T) -> &ResourceId) -> Option<&T> {
    items.iter().min_by(|a, b| id_of(a).cmp(id_of(b)))
}

impl Orchestrator {
    /// Create a Goal and adopt its auto-created journey/checkpoint pair.
    ///
    /// The auto-created journey is renamed to `journey_name` when one is
    /// given; when `spec.url` differs from the auto-created navigation
    /// step's target, that step is updated in place. A second navigation
    /// step is never created for the first checkpoint of the first journey.
    pub async fn create_goal_cascade(
        &self,
        project: &ResourceId,
        spec: &GoalSpec,
        journey_name: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<CascadeOutcome, PlanError> {
        let mut created = CreatedLog::default();

        let goal = self
            .client
            .create_goal(project, spec, cancel)
            .await
            .map_err(|e| PlanError::new("create goal", created.clone(), e))?;
        created.record(ResourceKind::Goal, &goal, &spec.name);

        let snapshot = self
            .client
            .goal_snapshot(&goal, cancel)
            .await
            .map_err(|e| PlanError::new("fetch goal snapshot", created.clone(), e))?;

        let journeys = self
            .client
            .list_journeys(&goal, &snapshot, cancel)
            .await
            .map_err(|e| PlanError::new("discover auto-created journey", created.clone(), e))?;
        let auto_journey = first_by_ascending_id(&journeys, |j| &j.id).ok_or_else(|| {
            PlanError::new(
                "discover auto-created journey",
                created.clone(),
                ClientError::protocol(
                    format!("goal {} cascade produced no journey", goal),
                    String::new(),
                ),
            )
        })?;
        let journey = auto_journey.id.clone();

        if let Some(name) = journey_name {
            if name != auto_journey.name {
                self.client
                    .rename_journey(&journey, name, cancel)
                    .await
                    .map_err(|e| {
                        PlanError::new("rename auto-created journey", created.clone(), e)
                    })?;
            }
        }

        let checkpoints = self
            .client
            .list_checkpoints(&journey, cancel)
            .await
            .map_err(|e| PlanError::new("discover auto-created checkpoint", created.clone(), e))?;
        let checkpoint = first_by_ascending_id(&checkpoints, |c| &c.id)
            .map(|c| c.id.clone())
            .ok_or_else(|| {
                PlanError::new(
                    "discover auto-created checkpoint",
                    created.clone(),
                    ClientError::protocol(
                        format!("journey {} cascade produced no checkpoint", journey),
                        String::new(),
                    ),
                )
            })?;

        let steps = self
            .client
            .list_steps(&checkpoint, cancel)
            .await
            .map_err(|e| PlanError::new("discover navigation step", created.clone(), e))?;
        let nav = leading_navigation_step(&steps);
        let navigation_step = nav.map(|s| s.id.clone());
        let mut navigation_target = nav.and_then(|s| s.target.clone());

        if let Some(url) = &spec.url {
            match &navigation_step {
                Some(step) if navigation_target.as_deref() != Some(url.as_str()) => {
                    self.client
                        .update_step_target(step, url, cancel)
                        .await
                        .map_err(|e| {
                            PlanError::new("update navigation step", created.clone(), e)
                        })?;
                    navigation_target = Some(url.clone());
                }
                Some(_) => {}
                None => {
                    // The cascade contract promises a navigation step; a
                    // missing one with a URL to apply is a remote-contract
                    // violation, not a reason to create a duplicate.
                    return Err(PlanError::new(
                        "update navigation step",
                        created,
                        ClientError::protocol(
                            format!("checkpoint {} has no navigation step to update", checkpoint),
                            String::new(),
                        ),
                    ));
                }
            }
        }

        tracing::debug!(
            goal = %goal,
            journey = %journey,
            checkpoint = %checkpoint,
            "goal cascade resolved"
        );

        Ok(CascadeOutcome {
            goal,
            snapshot,
            journey,
            checkpoint,
            navigation_step,
            navigation_target,
            existing_steps: steps.len() as u32,
            created,
        })
    }
}

/// The checkpoint's leading navigation step: lowest position wins, with
/// ascending id as the tie-break when positions are missing.
fn leading_navigation_step(steps: &[StepSummary]) -> Option<&StepSummary> {
    steps
        .iter()
        .filter(|s| s.is_navigation())
        .min_by(|a, b| match (a.position, b.position) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.id.cmp(&b.id),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::JourneySummary;

    fn journey(id: ResourceId) -> JourneySummary {
        JourneySummary {
            id,
            name: String::new(),
            position: None,
        }
    }

    #[test]
    fn test_first_by_ascending_id_numeric() {
        let journeys = vec![
            journey(ResourceId::Num(30)),
            journey(ResourceId::Num(12)),
            journey(ResourceId::Num(19)),
        ];
        let first = first_by_ascending_id(&journeys, |j| &j.id).unwrap();
        assert_eq!(first.id, ResourceId::Num(12));
    }

    #[test]
    fn test_first_by_ascending_id_mixed_forms() {
        // Numeric ids order before opaque tags.
        let journeys = vec![
            journey(ResourceId::from("jrn_2")),
            journey(ResourceId::Num(900)),
        ];
        let first = first_by_ascending_id(&journeys, |j| &j.id).unwrap();
        assert_eq!(first.id, ResourceId::Num(900));
    }

    #[test]
    fn test_first_by_ascending_id_empty() {
        let journeys: Vec<JourneySummary> = Vec::new();
        assert!(first_by_ascending_id(&journeys, |j| &j.id).is_none());
    }

    #[test]
    fn test_leading_navigation_step_prefers_lowest_position() {
        let steps = vec![
            StepSummary {
                id: ResourceId::Num(5),
                action: "CLICK".into(),
                position: Some(2),
                target: None,
            },
            StepSummary {
                id: ResourceId::Num(9),
                action: "NAVIGATE".into(),
                position: Some(3),
                target: Some("https://b.example".into()),
            },
            StepSummary {
                id: ResourceId::Num(4),
                action: "NAVIGATE".into(),
                position: Some(1),
                target: Some("https://a.example".into()),
            },
        ];
        let nav = leading_navigation_step(&steps).unwrap();
        assert_eq!(nav.id, ResourceId::Num(4));
    }
}
