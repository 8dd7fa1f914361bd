//! Producer and evaluator ports.
//!
//! The orchestrator only ever talks to these traits. Implementations may be
//! deterministic, model-backed, or test doubles; all are called with a
//! per-call timeout and retried once on failure.

use std::sync::Arc;

use async_trait::async_trait;

use revisor_types::{Draft, Result, Review};

use crate::context::Brief;

// ---------------------------------------------------------------------------
// DraftProducer
// ---------------------------------------------------------------------------

#[async_trait]
pub trait DraftProducer: Send + Sync {
    /// Identifier used in logs and fault reports.
    fn name(&self) -> &str;

    /// Produce the first draft for a brief.
    async fn generate(&self, brief: &Brief) -> Result<Draft>;

    /// Produce a new draft from the prior one and the revision instructions.
    async fn revise(&self, prior: &Draft, instructions: &[String], brief: &Brief) -> Result<Draft>;
}

// ---------------------------------------------------------------------------
// DraftEvaluator
// ---------------------------------------------------------------------------

#[async_trait]
pub trait DraftEvaluator: Send + Sync {
    fn name(&self) -> &str;

    /// Score a draft against the brief's guidelines and safety rules.
    async fn evaluate(&self, draft: &Draft, brief: &Brief) -> Result<Review>;
}

pub type SharedProducer = Arc<dyn DraftProducer>;
pub type SharedEvaluator = Arc<dyn DraftEvaluator>;
