//! End-to-end workflow tests over a scripted transport.

use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use waypoint::client::{ApiClient, ApiRequest, Method, RawResponse, Transport};
use waypoint::error::{ClientError, ClientResult};
use waypoint::orchestrator::{
    CheckpointPlan, GoalPlan, JourneyPlan, NodeOutcome, Orchestrator, ProjectPlan,
};
use waypoint::resilience::{BreakerConfig, RetryPolicy};
use waypoint::{ClientConfig, GoalSpec, ResourceId, Selector, StepCommand};

/// A transport scripted by a closure, recording every request.
struct ScriptedTransport {
    handler: Box<dyn Fn(&ApiRequest) -> ClientResult<RawResponse> + Send + Sync>,
    log: Mutex<Vec<(Method, String, Option<Value>)>>,
}

impl ScriptedTransport {
    fn new(
        handler: impl Fn(&ApiRequest) -> ClientResult<RawResponse> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            log: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<(Method, String)> {
        self.log
            .lock()
            .iter()
            .map(|(m, p, _)| (*m, p.clone()))
            .collect()
    }

    fn bodies_for(&self, method: Method, path: &str) -> Vec<Value> {
        self.log
            .lock()
            .iter()
            .filter(|(m, p, _)| *m == method && p == path)
            .filter_map(|(_, _, b)| b.clone())
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, req: &ApiRequest, cancel: &CancellationToken) -> ClientResult<RawResponse> {
        if cancel.is_cancelled() {
            return Err(ClientError::Canceled);
        }
        self.log
            .lock()
            .push((req.method, req.path.clone(), req.body.clone()));
        (self.handler)(req)
    }
}

fn ok(body: Value) -> ClientResult<RawResponse> {
    Ok(RawResponse {
        status: 200,
        body: body.to_string().into_bytes(),
        retry_after_secs: None,
    })
}

fn http_error(status: u16, message: &str) -> ClientResult<RawResponse> {
    Ok(RawResponse {
        status,
        body: json!({ "error": message }).to_string().into_bytes(),
        retry_after_secs: None,
    })
}

fn engine_over(transport: Arc<ScriptedTransport>) -> Orchestrator {
    engine_with_parallelism(transport, 1)
}

fn engine_with_parallelism(transport: Arc<ScriptedTransport>, parallelism: usize) -> Orchestrator {
    let retry = RetryPolicy {
        max_attempts: 3,
        initial_delay_ms: 1,
        multiplier: 1.0,
        max_delay_ms: 10,
        jitter: false,
    };
    let client = Arc::new(ApiClient::with_transport(
        transport,
        retry,
        BreakerConfig::default(),
    ));
    let mut config = ClientConfig::for_token("test-token");
    config.max_goal_parallelism = parallelism;
    config.poll_interval_ms = 1;
    config.execution_deadline_ms = 1_000;
    Orchestrator::new(client, &config)
}

/// The one-goal scripted remote used by the cascade tests: goal 101,
/// snapshot 9001, auto-created journey 202 with checkpoint 301 whose first
/// step is navigation step 401.
fn cascade_remote() -> Arc<ScriptedTransport> {
    let checkpoint_counter = Arc::new(AtomicI64::new(302));
    ScriptedTransport::new(move |req| match (req.method, req.path.as_str()) {
        (Method::Post, "goals") => ok(json!({ "item": { "id": 101 } })),
        (Method::Get, "goals/101/snapshot") => ok(json!({ "id": "9001" })),
        (Method::Get, "goals/101/snapshots/9001/journeys") => {
            ok(json!({ "items": [{ "id": 202, "name": "Untitled Journey" }] }))
        }
        (Method::Put, "journeys/202") => ok(json!({ "success": true })),
        (Method::Get, "journeys/202/checkpoints") => ok(json!({
            "items": [{ "id": 301, "name": "Untitled Checkpoint", "position": 1 }]
        })),
        (Method::Get, "checkpoints/301/steps") => ok(json!({
            "items": [{ "id": 401, "action": "NAVIGATE", "position": 1, "value": "https://start.example" }]
        })),
        (Method::Put, "steps/401") => ok(json!({ "success": true })),
        (Method::Post, "checkpoints") => {
            let id = checkpoint_counter.fetch_add(1, Ordering::SeqCst);
            ok(json!({ "data": { "id": id } }))
        }
        (Method::Post, "journeys/202/checkpoints/attach") => ok(json!({ "success": true })),
        (Method::Post, "steps") => ok(json!({ "stepId": 999 })),
        (method, path) => panic!("unexpected request: {:?} {}", method, path),
    })
}

#[tokio::test]
async fn test_cascade_adopts_and_renames_auto_created_journey() {
    let transport = cascade_remote();
    let engine = engine_over(transport.clone());
    let cancel = CancellationToken::new();

    let spec = GoalSpec { name: "G".into(), url: None };
    let outcome = engine
        .create_goal_cascade(&ResourceId::Num(10), &spec, Some("first journey"), &cancel)
        .await
        .unwrap();

    assert_eq!(outcome.goal, ResourceId::Num(101));
    assert_eq!(outcome.snapshot, ResourceId::Num(9001));
    assert_eq!(outcome.journey, ResourceId::Num(202));
    assert_eq!(outcome.checkpoint, ResourceId::Num(301));
    assert_eq!(outcome.navigation_step, Some(ResourceId::Num(401)));
    assert_eq!(outcome.existing_steps, 1);

    let renames = transport.bodies_for(Method::Put, "journeys/202");
    assert_eq!(renames, vec![json!({ "name": "first journey" })]);

    // No navigation URL supplied: the auto-created step is left unmodified.
    assert!(!transport
        .calls()
        .iter()
        .any(|(m, p)| *m == Method::Put && p == "steps/401"));
}

#[tokio::test]
async fn test_cascade_updates_navigation_step_in_place() {
    let transport = cascade_remote();
    let engine = engine_over(transport.clone());
    let cancel = CancellationToken::new();

    let spec = GoalSpec {
        name: "G".into(),
        url: Some("https://other.example".into()),
    };
    let outcome = engine
        .create_goal_cascade(&ResourceId::Num(10), &spec, None, &cancel)
        .await
        .unwrap();

    assert_eq!(outcome.navigation_target.as_deref(), Some("https://other.example"));
    let updates = transport.bodies_for(Method::Put, "steps/401");
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0]["parsedStep"]["value"], json!("https://other.example"));
    // Never a second navigation step: no step creation happened at all.
    assert!(!transport.calls().iter().any(|(m, p)| *m == Method::Post && p == "steps"));
}

#[tokio::test]
async fn test_orphaned_checkpoint_fault_carries_created_id() {
    let transport = ScriptedTransport::new(|req| match (req.method, req.path.as_str()) {
        (Method::Post, "checkpoints") => ok(json!({ "id": 500 })),
        (Method::Post, "journeys/7/checkpoints/attach") => http_error(409, "slot taken"),
        (method, path) => panic!("unexpected request: {:?} {}", method, path),
    });
    let engine = engine_over(transport.clone());
    let cancel = CancellationToken::new();

    let err = engine
        .create_checkpoint_and_attach(
            &ResourceId::Num(1),
            &ResourceId::Num(2),
            &ResourceId::Num(7),
            "C",
            2,
            &cancel,
        )
        .await
        .unwrap_err();

    assert_eq!(err.step, "attach checkpoint");
    match &err.source {
        ClientError::Orphaned { id, action, .. } => {
            assert_eq!(*id, ResourceId::Num(500));
            assert_eq!(action, "attach checkpoint");
        }
        other => panic!("expected Orphaned fault, got {:?}", other),
    }
    // The created log still lists the orphan for corrective action.
    assert_eq!(err.created.len(), 1);
    assert_eq!(err.created.entries()[0].id, ResourceId::Num(500));
}

#[tokio::test]
async fn test_plain_creation_failure_is_not_orphaned() {
    let transport = ScriptedTransport::new(|req| match (req.method, req.path.as_str()) {
        (Method::Post, "checkpoints") => http_error(422, "name too long"),
        (method, path) => panic!("unexpected request: {:?} {}", method, path),
    });
    let engine = engine_over(transport);
    let cancel = CancellationToken::new();

    let err = engine
        .create_checkpoint_and_attach(
            &ResourceId::Num(1),
            &ResourceId::Num(2),
            &ResourceId::Num(7),
            "C",
            1,
            &cancel,
        )
        .await
        .unwrap_err();

    assert_eq!(err.step, "create checkpoint");
    assert!(err.created.is_empty());
    assert!(!matches!(err.source, ClientError::Orphaned { .. }));
}

#[tokio::test]
async fn test_zero_position_rejected_before_any_call() {
    let transport = ScriptedTransport::new(|req| {
        panic!("no remote call expected, got {:?} {}", req.method, req.path)
    });
    let engine = engine_over(transport);
    let cancel = CancellationToken::new();

    let err = engine
        .create_checkpoint_and_attach(
            &ResourceId::Num(1),
            &ResourceId::Num(2),
            &ResourceId::Num(7),
            "C",
            0,
            &cancel,
        )
        .await
        .unwrap_err();
    assert!(matches!(err.source, ClientError::Validation(_)));
}

#[tokio::test]
async fn test_batch_end_to_end_reuses_existing_first_checkpoint() {
    let transport = cascade_remote();
    let engine = engine_over(transport.clone());
    let cancel = CancellationToken::new();

    let plan = ProjectPlan {
        project: ResourceId::Num(10),
        goals: vec![GoalPlan {
            name: "G".into(),
            url: None,
            journeys: vec![JourneyPlan {
                name: "first journey".into(),
                checkpoints: vec![
                    CheckpointPlan { name: "C1".into(), steps: vec![] },
                    CheckpointPlan { name: "C2".into(), steps: vec![] },
                ],
            }],
        }],
    };

    let report = engine.batch_create(&plan, &cancel).await.unwrap();
    assert!(report.is_complete());

    let goal = &report.goals[0];
    assert_eq!(goal.outcome.id(), Some(&ResourceId::Num(101)));
    let journey = &goal.journeys[0];
    assert!(matches!(journey.outcome, NodeOutcome::Reused { .. }));

    // C1 is the existing auto-created checkpoint; C2 is created and
    // attached at position 2.
    assert!(matches!(
        &journey.checkpoints[0].outcome,
        NodeOutcome::Reused { id } if *id == ResourceId::Num(301)
    ));
    assert!(matches!(
        &journey.checkpoints[1].outcome,
        NodeOutcome::Created { id } if *id == ResourceId::Num(302)
    ));

    let attaches = transport.bodies_for(Method::Post, "journeys/202/checkpoints/attach");
    assert_eq!(attaches, vec![json!({ "checkpointId": 302, "position": 2 })]);

    let renames = transport.bodies_for(Method::Put, "journeys/202");
    assert_eq!(renames, vec![json!({ "name": "first journey" })]);

    // No navigation URL supplied anywhere: the auto step is untouched.
    assert!(!transport.calls().iter().any(|(m, p)| *m == Method::Put && p == "steps/401"));
}

/// Scripted remote for two goals: G1 → 101 and G2 → 102, each with one
/// auto-created journey/checkpoint/navigation-step; `fail_checkpoint`
/// rejects step creation on that checkpoint id.
fn two_goal_remote(fail_step_on_checkpoint: i64) -> Arc<ScriptedTransport> {
    let goal_seq = Arc::new(AtomicI64::new(101));
    let checkpoint_seq = Arc::new(AtomicI64::new(501));
    let step_seq = Arc::new(AtomicI64::new(601));
    ScriptedTransport::new(move |req| {
        let path = req.path.as_str();
        match (req.method, path) {
            (Method::Post, "goals") => {
                ok(json!({ "id": goal_seq.fetch_add(1, Ordering::SeqCst) }))
            }
            (Method::Get, "goals/101/snapshot") => ok(json!({ "id": 9001 })),
            (Method::Get, "goals/102/snapshot") => ok(json!({ "id": 9002 })),
            (Method::Get, "goals/101/snapshots/9001/journeys") => {
                ok(json!({ "items": [{ "id": 201, "name": "auto" }] }))
            }
            (Method::Get, "goals/102/snapshots/9002/journeys") => {
                ok(json!({ "items": [{ "id": 211, "name": "auto" }] }))
            }
            (Method::Put, "journeys/201") | (Method::Put, "journeys/211") => {
                ok(json!({ "success": true }))
            }
            (Method::Get, "journeys/201/checkpoints") => {
                ok(json!({ "items": [{ "id": 301, "name": "auto", "position": 1 }] }))
            }
            (Method::Get, "journeys/211/checkpoints") => {
                ok(json!({ "items": [{ "id": 311, "name": "auto", "position": 1 }] }))
            }
            (Method::Get, "checkpoints/301/steps") | (Method::Get, "checkpoints/311/steps") => {
                ok(json!({ "items": [{ "id": 401, "action": "NAVIGATE", "position": 1 }] }))
            }
            (Method::Post, "checkpoints") => {
                ok(json!({ "id": checkpoint_seq.fetch_add(1, Ordering::SeqCst) }))
            }
            (Method::Post, "journeys/201/checkpoints/attach")
            | (Method::Post, "journeys/211/checkpoints/attach") => ok(json!({ "success": true })),
            (Method::Post, "steps") => {
                let checkpoint = req.body.as_ref().unwrap()["checkpointId"].as_i64().unwrap();
                if checkpoint == fail_step_on_checkpoint {
                    http_error(400, "unsupported action for this checkpoint")
                } else {
                    ok(json!({ "stepId": step_seq.fetch_add(1, Ordering::SeqCst) }))
                }
            }
            (method, p) => panic!("unexpected request: {:?} {}", method, p),
        }
    })
}

fn click() -> StepCommand {
    StepCommand::Click {
        selector: Selector::Css("#go".into()),
    }
}

fn two_goal_plan() -> ProjectPlan {
    let journey = |name: &str| JourneyPlan {
        name: name.into(),
        checkpoints: vec![
            CheckpointPlan { name: "C1".into(), steps: vec![click()] },
            CheckpointPlan { name: "C2".into(), steps: vec![click(), click()] },
        ],
    };
    ProjectPlan {
        project: ResourceId::Num(10),
        goals: vec![
            GoalPlan { name: "G1".into(), url: None, journeys: vec![journey("J1")] },
            GoalPlan { name: "G2".into(), url: None, journeys: vec![journey("J2")] },
        ],
    }
}

#[tokio::test]
async fn test_batch_partial_failure_isolates_subtree() {
    // Goal 2's C2 is the second fresh checkpoint created overall → id 502.
    let transport = two_goal_remote(502);
    let engine = engine_over(transport);
    let cancel = CancellationToken::new();

    let report = engine.batch_create(&two_goal_plan(), &cancel).await.unwrap();
    assert!(!report.is_complete());

    // Goal 1's entire subtree is a complete success.
    let g1 = &report.goals[0];
    assert!(g1.outcome.is_success());
    for journey in &g1.journeys {
        assert!(journey.outcome.is_success());
        for checkpoint in &journey.checkpoints {
            assert!(checkpoint.outcome.is_success());
            for step in &checkpoint.steps {
                assert!(step.outcome.is_success(), "goal 1 step failed: {:?}", step);
            }
        }
    }

    // Goal 2: successful checkpoints plus exactly the failing step.
    let g2 = &report.goals[1];
    assert!(g2.outcome.is_success());
    let j2 = &g2.journeys[0];
    let c1 = &j2.checkpoints[0];
    assert!(c1.outcome.is_success());
    assert!(c1.steps.iter().all(|s| s.outcome.is_success()));

    let c2 = &j2.checkpoints[1];
    // The checkpoint itself was created and attached.
    assert!(matches!(&c2.outcome, NodeOutcome::Created { id } if *id == ResourceId::Num(502)));
    assert!(matches!(c2.steps[0].outcome, NodeOutcome::Failed { .. }));
    // The rest of the failed checkpoint's steps are skipped, not attempted.
    assert!(matches!(c2.steps[1].outcome, NodeOutcome::Skipped));
}

#[tokio::test]
async fn test_batch_parallel_goals_merge_in_plan_order() {
    let transport = two_goal_remote(-1);
    let engine = engine_with_parallelism(transport, 2);
    let cancel = CancellationToken::new();

    let report = engine.batch_create(&two_goal_plan(), &cancel).await.unwrap();
    assert!(report.is_complete());
    assert_eq!(report.goals[0].name, "G1");
    assert_eq!(report.goals[1].name, "G2");
    // Both goals exist with distinct ids regardless of completion order.
    let ids: Vec<_> = report.goals.iter().filter_map(|g| g.outcome.id()).collect();
    assert!(ids.contains(&&ResourceId::Num(101)));
    assert!(ids.contains(&&ResourceId::Num(102)));
}

#[tokio::test]
async fn test_batch_canceled_before_start() {
    let transport = ScriptedTransport::new(|req| {
        panic!("no remote call expected, got {:?} {}", req.method, req.path)
    });
    let engine = engine_over(transport);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = engine.batch_create(&two_goal_plan(), &cancel).await.unwrap_err();
    assert!(matches!(err, ClientError::Canceled));
}

#[tokio::test]
async fn test_read_retries_through_transient_failures() {
    let failures_left = Arc::new(AtomicU32::new(2));
    let transport = {
        let failures_left = failures_left.clone();
        ScriptedTransport::new(move |req| match (req.method, req.path.as_str()) {
            (Method::Get, "goals/101/snapshot") => {
                if failures_left.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                    n.checked_sub(1)
                }).is_ok()
                {
                    http_error(503, "warming up")
                } else {
                    ok(json!({ "id": 9001 }))
                }
            }
            (method, path) => panic!("unexpected request: {:?} {}", method, path),
        })
    };
    let engine = engine_over(transport.clone());
    let cancel = CancellationToken::new();

    let snapshot = engine
        .client()
        .goal_snapshot(&ResourceId::Num(101), &cancel)
        .await
        .unwrap();
    assert_eq!(snapshot, ResourceId::Num(9001));
    assert_eq!(transport.calls().len(), 3);
}

#[tokio::test]
async fn test_write_not_retried_after_server_error() {
    let transport = ScriptedTransport::new(|req| match (req.method, req.path.as_str()) {
        (Method::Post, "goals") => http_error(503, "flaky"),
        (method, path) => panic!("unexpected request: {:?} {}", method, path),
    });
    let engine = engine_over(transport.clone());
    let cancel = CancellationToken::new();

    let err = engine
        .client()
        .create_goal(&ResourceId::Num(10), &GoalSpec { name: "G".into(), url: None }, &cancel)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("create goal"));
    // One attempt only: the request reached the remote, so re-sending
    // could duplicate the goal.
    assert_eq!(transport.calls().len(), 1);
}

#[tokio::test]
async fn test_dialog_step_reports_placeholder() {
    let checkpoint_counter = Arc::new(AtomicI64::new(302));
    let transport = {
        let checkpoint_counter = checkpoint_counter.clone();
        ScriptedTransport::new(move |req| match (req.method, req.path.as_str()) {
            (Method::Post, "goals") => ok(json!({ "item": { "id": 101 } })),
            (Method::Get, "goals/101/snapshot") => ok(json!({ "id": "9001" })),
            (Method::Get, "goals/101/snapshots/9001/journeys") => {
                ok(json!({ "items": [{ "id": 202, "name": "Untitled Journey" }] }))
            }
            (Method::Put, "journeys/202") => ok(json!({ "success": true })),
            (Method::Get, "journeys/202/checkpoints") => {
                ok(json!({ "items": [{ "id": 301, "name": "auto", "position": 1 }] }))
            }
            (Method::Get, "checkpoints/301/steps") => {
                ok(json!({ "items": [{ "id": 401, "action": "NAVIGATE", "position": 1 }] }))
            }
            (Method::Post, "checkpoints") => {
                ok(json!({ "id": checkpoint_counter.fetch_add(1, Ordering::SeqCst) }))
            }
            (Method::Post, "journeys/202/checkpoints/attach") => ok(json!({ "success": true })),
            // Dialog commands always echo the sentinel.
            (Method::Post, "steps") => ok(json!({ "id": 1, "success": true })),
            (method, path) => panic!("unexpected request: {:?} {}", method, path),
        })
    };
    let engine = engine_over(transport);
    let cancel = CancellationToken::new();

    let plan = ProjectPlan {
        project: ResourceId::Num(10),
        goals: vec![GoalPlan {
            name: "G".into(),
            url: None,
            journeys: vec![JourneyPlan {
                name: "J".into(),
                checkpoints: vec![CheckpointPlan {
                    name: "C".into(),
                    steps: vec![StepCommand::DismissAlert],
                }],
            }],
        }],
    };
    let report = engine.batch_create(&plan, &cancel).await.unwrap();

    // A sentinel echo is a distinguishable success, never a failure and
    // never a stored reference.
    assert!(report.is_complete());
    let step = &report.goals[0].journeys[0].checkpoints[0].steps[0];
    assert!(matches!(step.outcome, NodeOutcome::Placeholder { sentinel: 1 }));
    assert!(step.outcome.id().is_none());
    assert!(!report
        .created
        .entries()
        .iter()
        .any(|r| r.kind == waypoint::model::ResourceKind::Step));
}

#[tokio::test]
async fn test_goal_failure_lists_prior_created_resources() {
    // Goal creation succeeds, snapshot fetch 404s: the report must still
    // carry the goal id that now exists remotely.
    let transport = ScriptedTransport::new(|req| match (req.method, req.path.as_str()) {
        (Method::Post, "goals") => ok(json!({ "id": 101 })),
        (Method::Get, "goals/101/snapshot") => http_error(404, "no snapshot yet"),
        (method, path) => panic!("unexpected request: {:?} {}", method, path),
    });
    let engine = engine_over(transport);
    let cancel = CancellationToken::new();

    let err = engine
        .create_goal_cascade(
            &ResourceId::Num(10),
            &GoalSpec { name: "G".into(), url: None },
            None,
            &cancel,
        )
        .await
        .unwrap_err();

    assert_eq!(err.step, "fetch goal snapshot");
    assert_eq!(err.created.len(), 1);
    assert_eq!(err.created.entries()[0].id, ResourceId::Num(101));
}
