//! # Waypoint — resilient orchestration for journey-based test authoring
//!
//! `waypoint` is a client-side orchestration engine in front of a remote
//! browser-test-authoring API. Callers create hierarchical resources
//! (project → goal → journey → checkpoint → step) through a few high-level
//! operations while the engine performs the multi-call sequences, enforces
//! structural invariants, and absorbs a remote API whose JSON responses are
//! inconsistent in shape and type:
//!
//! - **Response normalization**: canonical identifiers, statuses, and
//!   timestamps out of bare objects, wrapper envelopes, numeric strings,
//!   map-shaped lists, and three timestamp formats.
//! - **Error taxonomy + resilience**: classified errors with a retryability
//!   predicate, bounded exponential backoff with jitter, and per-endpoint
//!   circuit breaking. Writes are never re-sent once the request may have
//!   left the transport.
//! - **Workflow engine**: goal cascades that adopt auto-created resources,
//!   checkpoint-create-and-attach with distinct orphan faults, and batch
//!   tree creation with continue-and-aggregate partial-failure reporting.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use waypoint::{ApiClient, ClientConfig, GoalSpec, Orchestrator, ResourceId};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::for_token(std::env::var("API_TOKEN")?);
//!     let client = Arc::new(ApiClient::new(&config)?);
//!     let engine = Orchestrator::new(client, &config);
//!
//!     let cancel = CancellationToken::new();
//!     let spec = GoalSpec {
//!         name: "Checkout".into(),
//!         url: Some("https://shop.example/cart".into()),
//!     };
//!     let project = ResourceId::Num(42);
//!     let outcome = engine
//!         .create_goal_cascade(&project, &spec, Some("happy path"), &cancel)
//!         .await?;
//!     println!("goal {} ready, journey {}", outcome.goal, outcome.journey);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod model;
pub mod normalize;
pub mod orchestrator;
pub mod resilience;

pub use api::{Selector, StepCommand};
pub use client::{ApiClient, Transport};
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult, ErrorKind};
pub use model::{Execution, ExecutionStatus, GoalSpec, ResourceId};
pub use normalize::Extraction;
pub use orchestrator::{
    BatchReport, CascadeOutcome, CheckpointPlan, GoalPlan, JourneyPlan, Orchestrator, PlanError,
    ProjectPlan,
};
pub use resilience::{BreakerConfig, RetryPolicy};
