//! Run driver: picks collaborators for the configured backend and runs packets.

use std::sync::Arc;

use revisor_llm::LlmClient;
use revisor_types::{FinalizedResult, InputPacket, Result, RevisorError, RunId};

use crate::cancel::CancelToken;
use crate::collaborator::{SharedEvaluator, SharedProducer};
use crate::collaborators::{ModelEvaluator, ModelProducer, RubricEvaluator, TemplateProducer};
use crate::config::{Backend, RunConfig};
use crate::engine::Orchestrator;
use crate::events::EventEmitter;
use crate::gate::{EscalationPolicy, SafetyEscalation};
use crate::store::RunStore;

pub struct RunDriver {
    config: RunConfig,
    store: Arc<dyn RunStore>,
    llm: Option<Arc<LlmClient>>,
    escalation: Arc<dyn EscalationPolicy>,
    events: EventEmitter,
}

impl RunDriver {
    pub fn new(config: RunConfig, store: Arc<dyn RunStore>) -> Self {
        Self {
            config,
            store,
            llm: None,
            escalation: Arc::new(SafetyEscalation::default()),
            events: EventEmitter::default(),
        }
    }

    pub fn with_llm_client(mut self, client: Arc<LlmClient>) -> Self {
        self.llm = Some(client);
        self
    }

    pub fn with_escalation_policy(mut self, policy: Arc<dyn EscalationPolicy>) -> Self {
        self.escalation = policy;
        self
    }

    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    /// The backend a run will actually use.
    pub fn resolved_backend(&self) -> Result<Backend> {
        match (self.config.backend, &self.llm) {
            (Backend::Deterministic, _) => Ok(Backend::Deterministic),
            (Backend::Model, Some(_)) | (Backend::Auto, Some(_)) => Ok(Backend::Model),
            (Backend::Auto, None) => Ok(Backend::Deterministic),
            (Backend::Model, None) => Err(RevisorError::Config(
                "the model backend needs an LLM client (set OPENAI_API_KEY)".into(),
            )),
        }
    }

    pub fn collaborators(&self) -> Result<(SharedProducer, SharedEvaluator)> {
        let pair: (SharedProducer, SharedEvaluator) = match (self.resolved_backend()?, &self.llm) {
            (Backend::Model, Some(client)) => (
                Arc::new(ModelProducer::new(client.clone(), self.config.model.clone())),
                Arc::new(ModelEvaluator::new(client.clone(), self.config.model.clone())),
            ),
            _ => (Arc::new(TemplateProducer::new()), Arc::new(RubricEvaluator::new())),
        };
        tracing::debug!(producer = pair.0.name(), evaluator = pair.1.name(), "Collaborators selected");
        Ok(pair)
    }

    pub fn orchestrator(&self) -> Result<Orchestrator> {
        let (producer, evaluator) = self.collaborators()?;
        Ok(
            Orchestrator::new(producer, evaluator, self.store.clone(), self.config.clone())
                .with_escalation_policy(self.escalation.clone())
                .with_events(self.events.clone()),
        )
    }

    pub async fn run(&self, packet: InputPacket) -> Result<FinalizedResult> {
        self.orchestrator()?.run(packet).await
    }

    pub async fn run_cancellable(&self, packet: InputPacket, cancel: &CancelToken) -> Result<FinalizedResult> {
        self.orchestrator()?.run_cancellable(packet, cancel).await
    }

    pub async fn resume(&self, run_id: RunId, packet: InputPacket) -> Result<FinalizedResult> {
        self.orchestrator()?
            .resume(run_id, packet, &CancelToken::new())
            .await
    }
}
