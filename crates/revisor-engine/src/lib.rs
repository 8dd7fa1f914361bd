//! Draft-evaluate-revise orchestration.
//!
//! A run takes a validated [`InputPacket`](revisor_types::InputPacket), asks a
//! [`DraftProducer`] for a draft, has a [`DraftEvaluator`] score it, and loops
//! on revision instructions until the gate passes, a safety concern escalates,
//! the iteration budget runs out, or a collaborator faults. Every iteration is
//! appended to a [`RunStore`] and the run ends with one [`FinalizedResult`](revisor_types::FinalizedResult).

pub mod cancel;
pub mod collaborator;
pub mod collaborators;
pub mod config;
pub mod context;
pub mod driver;
pub mod engine;
pub mod events;
pub mod gate;
pub mod retry;
pub mod state;
pub mod store;

pub use cancel::CancelToken;
pub use collaborator::{DraftEvaluator, DraftProducer, SharedEvaluator, SharedProducer};
pub use collaborators::{ModelEvaluator, ModelProducer, RubricEvaluator, TemplateProducer};
pub use config::{Backend, RunConfig};
pub use context::{Brief, RunContext};
pub use driver::RunDriver;
pub use engine::Orchestrator;
pub use events::{EventEmitter, RunEvent};
pub use gate::{judge, revision_guidance, EscalationPolicy, NeverEscalate, SafetyEscalation, Verdict};
pub use retry::{call_with_retry, BackoffPolicy, CallError, CallPolicy, CallSite, Fault};
pub use state::{RunMachine, RunState};
pub use store::{FileStore, MemoryStore, RunDocument, RunStore};
