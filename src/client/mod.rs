//! Remote API client: one primitive operation per remote call, each running
//! encode → resilient transport call → normalize.
//!
//! Every operation takes a cancellation token; cancellation-awareness is a
//! calling convention here, not a separate method family. Writes are marked
//! non-idempotent so the retry executor refuses to re-send them once the
//! request may have gone out.

pub mod transport;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::api::command::{attach_payload, navigation_update_payload};
use crate::api::StepCommand;
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::model::{
    CheckpointSummary, Execution, ExecutionProgress, ExecutionStatus, GoalSpec, JourneySummary,
    ResourceId, StepSummary,
};
use crate::normalize::{coerce_count, coerce_id, extract_id, normalize_list, parse_timestamp, Extraction};
use crate::resilience::{run_with_retry, BreakerConfig, CircuitBreaker, Idempotency, RetryPolicy};

pub use transport::{ApiRequest, HttpTransport, Method, RawResponse, Transport};

/// Remote endpoint classes, each with its own circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointClass {
    Projects,
    Goals,
    Journeys,
    Checkpoints,
    Steps,
    Executions,
}

impl EndpointClass {
    fn name(self) -> &'static str {
        match self {
            EndpointClass::Projects => "projects",
            EndpointClass::Goals => "goals",
            EndpointClass::Journeys => "journeys",
            EndpointClass::Checkpoints => "checkpoints",
            EndpointClass::Steps => "steps",
            EndpointClass::Executions => "executions",
        }
    }
}

/// Lazily built breakers, one per endpoint class, shared across concurrent
/// workflow subtrees.
struct BreakerSet {
    config: BreakerConfig,
    inner: Mutex<HashMap<EndpointClass, Arc<CircuitBreaker>>>,
}

impl BreakerSet {
    fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(HashMap::new()),
        }
    }

    fn get(&self, class: EndpointClass) -> Arc<CircuitBreaker> {
        let mut inner = self.inner.lock();
        inner
            .entry(class)
            .or_insert_with(|| Arc::new(CircuitBreaker::new(class.name(), self.config.clone())))
            .clone()
    }
}

/// The remote API client.
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
    breakers: BreakerSet,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let transport = Arc::new(HttpTransport::new(config)?);
        Ok(Self::with_transport(
            transport,
            config.retry.clone(),
            config.breaker.clone(),
        ))
    }

    /// Client over an explicit transport; the seam tests and embedders use.
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        retry: RetryPolicy,
        breaker: BreakerConfig,
    ) -> Self {
        Self {
            transport,
            retry,
            breakers: BreakerSet::new(breaker),
        }
    }

    /// Run one remote call under retry + circuit breaking, attaching the
    /// operation name to any failure.
    async fn call(
        &self,
        op_name: &'static str,
        class: EndpointClass,
        idempotency: Idempotency,
        req: ApiRequest,
        cancel: &CancellationToken,
    ) -> ClientResult<RawResponse> {
        run_with_retry(op_name, &self.retry, idempotency, cancel, |_attempt| {
            let breaker = self.breakers.get(class);
            let transport = self.transport.clone();
            let req = req.clone();
            let cancel = cancel.clone();
            async move {
                breaker
                    .call(move || async move {
                        let response = transport.send(&req, &cancel).await?;
                        check_status(response)
                    })
                    .await
            }
        })
        .await
        .map_err(|e| e.with_op(op_name))
    }

    pub async fn create_project(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> ClientResult<ResourceId> {
        let req = ApiRequest::post("projects", json!({ "name": name }));
        let resp = self
            .call("create project", EndpointClass::Projects, Idempotency::Unsafe, req, cancel)
            .await?;
        extract_real_id(&resp.body, "create project")
    }

    pub async fn create_goal(
        &self,
        project: &ResourceId,
        spec: &GoalSpec,
        cancel: &CancellationToken,
    ) -> ClientResult<ResourceId> {
        let mut body = json!({ "projectId": project, "name": spec.name });
        if let Some(url) = &spec.url {
            body["url"] = json!(url);
        }
        let req = ApiRequest::post("goals", body);
        let resp = self
            .call("create goal", EndpointClass::Goals, Idempotency::Unsafe, req, cancel)
            .await?;
        extract_real_id(&resp.body, "create goal")
    }

    /// The versioning handle required to create journeys under a goal.
    pub async fn goal_snapshot(
        &self,
        goal: &ResourceId,
        cancel: &CancellationToken,
    ) -> ClientResult<ResourceId> {
        let req = ApiRequest::get(format!("goals/{}/snapshot", goal));
        let resp = self
            .call("fetch goal snapshot", EndpointClass::Goals, Idempotency::Safe, req, cancel)
            .await?;
        extract_real_id(&resp.body, "fetch goal snapshot")
    }

    pub async fn list_journeys(
        &self,
        goal: &ResourceId,
        snapshot: &ResourceId,
        cancel: &CancellationToken,
    ) -> ClientResult<Vec<JourneySummary>> {
        let req = ApiRequest::get(format!("goals/{}/snapshots/{}/journeys", goal, snapshot));
        let resp = self
            .call("list journeys", EndpointClass::Journeys, Idempotency::Safe, req, cancel)
            .await?;
        let items = normalize_list(&resp.body).map_err(|e| e.with_op("list journeys"))?;
        Ok(items.iter().filter_map(decode_journey).collect())
    }

    pub async fn create_journey(
        &self,
        goal: &ResourceId,
        snapshot: &ResourceId,
        name: &str,
        cancel: &CancellationToken,
    ) -> ClientResult<ResourceId> {
        let req = ApiRequest::post(
            "journeys",
            json!({ "goalId": goal, "snapshotId": snapshot, "name": name }),
        );
        let resp = self
            .call("create journey", EndpointClass::Journeys, Idempotency::Unsafe, req, cancel)
            .await?;
        extract_real_id(&resp.body, "create journey")
    }

    pub async fn rename_journey(
        &self,
        journey: &ResourceId,
        name: &str,
        cancel: &CancellationToken,
    ) -> ClientResult<()> {
        let req = ApiRequest::put(format!("journeys/{}", journey), json!({ "name": name }));
        let resp = self
            .call("rename journey", EndpointClass::Journeys, Idempotency::Unsafe, req, cancel)
            .await?;
        // Any distinguishable success is fine; there is nothing to store.
        extract_id(&resp.body).map(|_| ()).map_err(|e| e.with_op("rename journey"))
    }

    pub async fn create_checkpoint(
        &self,
        goal: &ResourceId,
        snapshot: &ResourceId,
        name: &str,
        cancel: &CancellationToken,
    ) -> ClientResult<ResourceId> {
        let req = ApiRequest::post(
            "checkpoints",
            json!({ "goalId": goal, "snapshotId": snapshot, "name": name }),
        );
        let resp = self
            .call("create checkpoint", EndpointClass::Checkpoints, Idempotency::Unsafe, req, cancel)
            .await?;
        extract_real_id(&resp.body, "create checkpoint")
    }

    pub async fn attach_checkpoint(
        &self,
        journey: &ResourceId,
        checkpoint: &ResourceId,
        position: u32,
        cancel: &CancellationToken,
    ) -> ClientResult<()> {
        let req = ApiRequest::post(
            format!("journeys/{}/checkpoints/attach", journey),
            attach_payload(checkpoint, position),
        );
        let resp = self
            .call("attach checkpoint", EndpointClass::Journeys, Idempotency::Unsafe, req, cancel)
            .await?;
        extract_id(&resp.body).map(|_| ()).map_err(|e| e.with_op("attach checkpoint"))
    }

    pub async fn list_checkpoints(
        &self,
        journey: &ResourceId,
        cancel: &CancellationToken,
    ) -> ClientResult<Vec<CheckpointSummary>> {
        let req = ApiRequest::get(format!("journeys/{}/checkpoints", journey));
        let resp = self
            .call("list checkpoints", EndpointClass::Checkpoints, Idempotency::Safe, req, cancel)
            .await?;
        let items = normalize_list(&resp.body).map_err(|e| e.with_op("list checkpoints"))?;
        Ok(items.iter().filter_map(decode_checkpoint).collect())
    }

    pub async fn list_steps(
        &self,
        checkpoint: &ResourceId,
        cancel: &CancellationToken,
    ) -> ClientResult<Vec<StepSummary>> {
        let req = ApiRequest::get(format!("checkpoints/{}/steps", checkpoint));
        let resp = self
            .call("list steps", EndpointClass::Steps, Idempotency::Safe, req, cancel)
            .await?;
        let items = normalize_list(&resp.body).map_err(|e| e.with_op("list steps"))?;
        Ok(items.iter().filter_map(decode_step).collect())
    }

    /// Create a step at 1-based `position`. The outcome keeps Placeholder
    /// and NoIdSuccess distinct from a real identifier so callers never
    /// store a sentinel.
    pub async fn create_step(
        &self,
        checkpoint: &ResourceId,
        position: u32,
        command: &StepCommand,
        cancel: &CancellationToken,
    ) -> ClientResult<Extraction> {
        let req = ApiRequest::post("steps", command.payload(checkpoint, position));
        let resp = self
            .call("create step", EndpointClass::Steps, Idempotency::Unsafe, req, cancel)
            .await?;
        let outcome = extract_id(&resp.body).map_err(|e| e.with_op("create step"))?;
        if let Extraction::Placeholder(n) = &outcome {
            if command.addressable() {
                tracing::warn!(
                    action = command.action(),
                    sentinel = n,
                    "placeholder identifier for an addressable command"
                );
            }
        }
        Ok(outcome)
    }

    /// Update a navigation step's target URL in place.
    pub async fn update_step_target(
        &self,
        step: &ResourceId,
        url: &str,
        cancel: &CancellationToken,
    ) -> ClientResult<()> {
        let req = ApiRequest::put(format!("steps/{}", step), navigation_update_payload(url));
        let resp = self
            .call("update step", EndpointClass::Steps, Idempotency::Unsafe, req, cancel)
            .await?;
        extract_id(&resp.body).map(|_| ()).map_err(|e| e.with_op("update step"))
    }

    pub async fn execute_goal(
        &self,
        goal: &ResourceId,
        cancel: &CancellationToken,
    ) -> ClientResult<ResourceId> {
        let req = ApiRequest::post(format!("goals/{}/execute", goal), json!({}));
        let resp = self
            .call("execute goal", EndpointClass::Executions, Idempotency::Unsafe, req, cancel)
            .await?;
        extract_real_id(&resp.body, "execute goal")
    }

    pub async fn execution(
        &self,
        execution: &ResourceId,
        cancel: &CancellationToken,
    ) -> ClientResult<Execution> {
        let req = ApiRequest::get(format!("executions/{}", execution));
        let resp = self
            .call("fetch execution", EndpointClass::Executions, Idempotency::Safe, req, cancel)
            .await?;
        decode_execution(&resp.body, execution).map_err(|e| e.with_op("fetch execution"))
    }
}

/// Extract an identifier and insist it is trustworthy, tagging failures
/// with the operation name.
fn extract_real_id(body: &[u8], op: &'static str) -> ClientResult<ResourceId> {
    let outcome = extract_id(body).map_err(|e| e.with_op(op))?;
    require_real_id(outcome, op)
}

/// Reject sentinel identifiers where a trustworthy reference is required.
fn require_real_id(outcome: Extraction, what: &str) -> ClientResult<ResourceId> {
    match outcome {
        Extraction::Id(id) => Ok(id),
        Extraction::Placeholder(n) => Err(ClientError::protocol(
            format!("{}: placeholder identifier {} where a real reference is required", what, n),
            String::new(),
        )),
        Extraction::NoIdSuccess => Err(ClientError::protocol(
            format!("{}: success reported without an identifier", what),
            String::new(),
        )),
    }
}

/// Map non-2xx responses into classified API errors, folding in the body's
/// error message and any retry-after hint.
fn check_status(response: RawResponse) -> ClientResult<RawResponse> {
    if response.is_success() {
        return Ok(response);
    }

    let (code, message) = error_body(&response.body)
        .unwrap_or_else(|| (None, format!("HTTP {}", response.status)));
    let mut context = crate::error::ErrorContext::classify_status(response.status, message.clone());
    if let Some(secs) = response.retry_after_secs {
        context = context.with_retry_after(secs);
    }
    Err(ClientError::Api {
        code,
        status: response.status,
        message,
        context,
    })
}

fn error_body(body: &[u8]) -> Option<(Option<String>, String)> {
    let root: Value = serde_json::from_slice(body).ok()?;
    match root.get("error") {
        Some(Value::String(msg)) if !msg.is_empty() => Some((None, msg.clone())),
        Some(Value::Object(obj)) => {
            let message = obj.get("message").and_then(Value::as_str)?.to_string();
            let code = obj.get("code").map(|c| match c {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            });
            Some((code, message))
        }
        _ => root
            .get("message")
            .and_then(Value::as_str)
            .map(|m| (None, m.to_string())),
    }
}

fn decode_journey(item: &Value) -> Option<JourneySummary> {
    Some(JourneySummary {
        id: item_id(item)?,
        name: item_name(item),
        position: item_position(item),
    })
}

fn decode_checkpoint(item: &Value) -> Option<CheckpointSummary> {
    Some(CheckpointSummary {
        id: item_id(item)?,
        name: item_name(item),
        position: item_position(item),
    })
}

fn decode_step(item: &Value) -> Option<StepSummary> {
    let action = item
        .get("action")
        .or_else(|| item.get("parsedStep").and_then(|p| p.get("action")))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let target = ["value", "url", "target"]
        .iter()
        .find_map(|k| {
            item.get(k)
                .or_else(|| item.get("parsedStep").and_then(|p| p.get(k)))
        })
        .and_then(Value::as_str)
        .map(str::to_string);
    Some(StepSummary {
        id: item_id(item)?,
        action,
        position: item_position(item),
        target,
    })
}

fn item_id(item: &Value) -> Option<ResourceId> {
    let id = coerce_id(item.get("id")?)?;
    match &id {
        // A sentinel in a listing is not a usable reference; skip the item.
        ResourceId::Num(n) if crate::normalize::is_placeholder(*n) => {
            tracing::debug!(sentinel = n, "skipping listed item with placeholder identifier");
            None
        }
        _ => Some(id),
    }
}

fn item_name(item: &Value) -> String {
    ["name", "title"]
        .iter()
        .find_map(|k| item.get(*k).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string()
}

fn item_position(item: &Value) -> Option<u32> {
    ["position", "index", "order"]
        .iter()
        .find_map(|k| item.get(*k).and_then(coerce_count))
        .and_then(|n| u32::try_from(n).ok())
}

fn decode_execution(body: &[u8], requested: &ResourceId) -> ClientResult<Execution> {
    let root: Value = serde_json::from_slice(body).map_err(|e| {
        ClientError::protocol(
            format!("execution response is not JSON: {}", e),
            String::from_utf8_lossy(body).into_owned(),
        )
    })?;

    let obj = ["execution", "item", "data", "result"]
        .iter()
        .find_map(|k| root.get(*k))
        .filter(|v| v.is_object())
        .unwrap_or(&root);

    let id = obj
        .get("id")
        .and_then(coerce_id)
        .unwrap_or_else(|| requested.clone());

    let status = ["status", "state", "outcome"]
        .iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(ExecutionStatus::from_wire)
        .unwrap_or_else(|| ExecutionStatus::Unknown(String::new()));

    let progress = decode_progress(obj);

    let started_at = ["startedAt", "startTime", "createdAt", "start"]
        .iter()
        .find_map(|k| obj.get(*k).and_then(|v| parse_timestamp(v)));
    let finished_at = ["finishedAt", "endTime", "completedAt", "end"]
        .iter()
        .find_map(|k| obj.get(*k).and_then(|v| parse_timestamp(v)));

    Ok(Execution {
        id,
        status,
        started_at,
        finished_at,
        progress,
    })
}

fn decode_progress(obj: &Value) -> ExecutionProgress {
    if let Some(p) = obj.get("progress") {
        return ExecutionProgress {
            completed: p.get("completed").and_then(coerce_count).unwrap_or(0),
            total: p.get("total").and_then(coerce_count).unwrap_or(0),
        };
    }
    ExecutionProgress {
        completed: obj.get("completedSteps").and_then(coerce_count).unwrap_or(0),
        total: obj.get("totalSteps").and_then(coerce_count).unwrap_or(0),
    }
}
