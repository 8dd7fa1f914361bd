//! End-to-end tests for the orchestrator loop.
//!
//! Each test wires scripted collaborators into an [`Orchestrator`] backed by a
//! store, runs a packet to a terminal state, and checks the finalized result
//! against the persisted history.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use revisor_engine::{
    BackoffPolicy, Brief, CancelToken, DraftEvaluator, DraftProducer, FileStore, MemoryStore,
    ModelProducer, NeverEscalate, Orchestrator, RubricEvaluator, RunConfig, RunEvent, RunStore,
    TemplateProducer,
};
use revisor_llm::{FinishReason, LlmClient, ProviderAdapter, Request, Response, Usage};
use revisor_types::{
    ActionItem, Criterion, Draft, FinalizedResult, InputPacket, Result, ReviewOrigin, RevisorError,
    Review, RunStatus, TimeHorizon, Tone,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn config(max_iterations: u32) -> RunConfig {
    RunConfig {
        max_iterations,
        timeout_per_call: Duration::from_millis(200),
        backoff: BackoffPolicy::None,
        ..Default::default()
    }
}

fn packet() -> InputPacket {
    InputPacket::new("consistency with exercise", "work out three times a week")
}

fn valid_draft(label: &str) -> Draft {
    Draft {
        topic: "consistency with exercise".into(),
        summary: label.into(),
        strengths: vec!["motivated".into()],
        growth_areas: vec!["planning".into()],
        action_plan: (0..3)
            .map(|i| ActionItem {
                action: format!("Step {i}"),
                rationale: "Builds the habit".into(),
                time_horizon: TimeHorizon::ThisWeek,
                success_metric: "3 sessions".into(),
            })
            .collect(),
        reflection_questions: vec!["What got in the way?".into()],
        tone_check: Tone::Supportive,
    }
}

fn review(score: u32, pass: bool) -> Review {
    Review {
        overall_score: score,
        pass,
        criterion_scores: Criterion::ALL
            .into_iter()
            .map(|c| (c, score))
            .collect::<BTreeMap<_, _>>(),
        major_issues: vec![],
        minor_issues: vec![],
        revision_instructions: if pass { vec![] } else { vec!["Be more specific".into()] },
        confidence: 0.8,
        origin: ReviewOrigin::Evaluator,
    }
}

/// Producer returning `draft N` for the Nth call, counting calls.
#[derive(Default)]
struct CountingProducer {
    generates: AtomicUsize,
    revises: AtomicUsize,
    seen_instructions: Mutex<Vec<Vec<String>>>,
}

impl CountingProducer {
    fn calls(&self) -> usize {
        self.generates.load(Ordering::SeqCst) + self.revises.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DraftProducer for CountingProducer {
    fn name(&self) -> &str {
        "counting"
    }

    async fn generate(&self, _brief: &Brief) -> Result<Draft> {
        let n = self.calls();
        self.generates.fetch_add(1, Ordering::SeqCst);
        Ok(valid_draft(&format!("draft {n}")))
    }

    async fn revise(&self, _prior: &Draft, instructions: &[String], _brief: &Brief) -> Result<Draft> {
        let n = self.calls();
        self.revises.fetch_add(1, Ordering::SeqCst);
        self.seen_instructions.lock().unwrap().push(instructions.to_vec());
        Ok(valid_draft(&format!("draft {n}")))
    }
}

/// Evaluator replaying scripted reviews; the last one repeats forever.
struct ScriptedEvaluator {
    script: Mutex<VecDeque<Result<Review>>>,
    last: Review,
    calls: AtomicUsize,
}

impl ScriptedEvaluator {
    fn new(script: Vec<Result<Review>>, last: Review) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last,
            calls: AtomicUsize::new(0),
        }
    }

    fn always(review: Review) -> Self {
        Self::new(vec![], review)
    }
}

#[async_trait]
impl DraftEvaluator for ScriptedEvaluator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn evaluate(&self, _draft: &Draft, _brief: &Brief) -> Result<Review> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(self.last.clone()))
    }
}

/// Producer whose first `stalls` generate calls hang past any timeout.
struct StallingProducer {
    stalls: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl DraftProducer for StallingProducer {
    fn name(&self) -> &str {
        "stalling"
    }

    async fn generate(&self, _brief: &Brief) -> Result<Draft> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.stalls {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Ok(valid_draft("on time"))
    }

    async fn revise(&self, prior: &Draft, _instructions: &[String], _brief: &Brief) -> Result<Draft> {
        Ok(prior.clone())
    }
}

fn orchestrator(
    producer: Arc<dyn DraftProducer>,
    evaluator: Arc<dyn DraftEvaluator>,
    store: Arc<dyn RunStore>,
    config: RunConfig,
) -> Orchestrator {
    Orchestrator::new(producer, evaluator, store, config)
}

/// Finalized result must agree with what the store holds.
async fn assert_persisted(store: &dyn RunStore, result: &FinalizedResult) {
    let stored = store.read_final(&result.run_id).await.unwrap();
    assert_eq!(&stored, result);
    let history = store.read_history(&result.run_id).await.unwrap();
    assert_eq!(history, result.history);
    assert!(history.is_contiguous());
}

// ---------------------------------------------------------------------------
// Terminal outcomes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn first_draft_passes() {
    let store = Arc::new(MemoryStore::new());
    let producer = Arc::new(CountingProducer::default());
    let orch = orchestrator(
        producer.clone(),
        Arc::new(ScriptedEvaluator::always(review(85, true))),
        store.clone(),
        config(4),
    );

    let result = orch.run(packet()).await.unwrap();

    assert_eq!(result.status, RunStatus::Passed);
    assert_eq!(result.history.len(), 1);
    assert_eq!(result.basis_iteration, Some(0));
    assert!(!result.best_effort);
    assert_eq!(producer.generates.load(Ordering::SeqCst), 1);
    assert_eq!(producer.revises.load(Ordering::SeqCst), 0);
    assert_persisted(store.as_ref(), &result).await;
}

#[tokio::test]
async fn passes_after_two_revisions() {
    let store = Arc::new(MemoryStore::new());
    let producer = Arc::new(CountingProducer::default());
    let evaluator = ScriptedEvaluator::new(
        vec![Ok(review(60, false)), Ok(review(60, false))],
        review(82, true),
    );
    let orch = orchestrator(producer.clone(), Arc::new(evaluator), store.clone(), config(4));

    let result = orch.run(packet()).await.unwrap();

    assert_eq!(result.status, RunStatus::Passed);
    assert_eq!(result.history.len(), 3);
    assert_eq!(result.basis_iteration, Some(2));
    assert_eq!(result.draft.as_ref().unwrap().summary, "draft 2");
    // A passed result is always the last record, and that record meets the gate.
    let last = result.history.last().unwrap();
    assert_eq!(result.draft.as_ref(), Some(&last.draft));
    assert!(last.review.meets_gate(80));
    assert_eq!(
        *producer.seen_instructions.lock().unwrap(),
        vec![vec!["Be more specific".to_string()]; 2]
    );
    assert_persisted(store.as_ref(), &result).await;
}

#[tokio::test]
async fn budget_exhausted_returns_best_attempt() {
    let store = Arc::new(MemoryStore::new());
    let evaluator = ScriptedEvaluator::new(
        vec![
            Ok(review(50, false)),
            Ok(review(64, false)),
            Ok(review(64, false)),
        ],
        review(55, false),
    );
    let orch = orchestrator(
        Arc::new(CountingProducer::default()),
        Arc::new(evaluator),
        store.clone(),
        config(4),
    );

    let result = orch.run(packet()).await.unwrap();

    assert_eq!(result.status, RunStatus::Exhausted);
    assert_eq!(result.history.len(), 4);
    // 64 appears at indices 1 and 2; the tie goes to the earlier one.
    assert_eq!(result.basis_iteration, Some(1));
    assert_eq!(result.draft.as_ref().unwrap().summary, "draft 1");
    assert!(result.best_effort);
    assert!(result.reason.as_deref().unwrap().contains("budget of 4"));
    assert_persisted(store.as_ref(), &result).await;
}

#[tokio::test]
async fn constant_failing_score_exhausts_on_first_record() {
    let orch = orchestrator(
        Arc::new(CountingProducer::default()),
        Arc::new(ScriptedEvaluator::always(review(50, false))),
        Arc::new(MemoryStore::new()),
        config(4),
    );
    let result = orch.run(packet()).await.unwrap();
    assert_eq!(result.status, RunStatus::Exhausted);
    assert_eq!(result.history.len(), 4);
    assert_eq!(result.basis_iteration, Some(0));
}

#[tokio::test]
async fn single_iteration_budget_never_revises() {
    let producer = Arc::new(CountingProducer::default());
    let orch = orchestrator(
        producer.clone(),
        Arc::new(ScriptedEvaluator::always(review(40, false))),
        Arc::new(MemoryStore::new()),
        config(1),
    );

    let result = orch.run(packet()).await.unwrap();

    assert_eq!(result.status, RunStatus::Exhausted);
    assert_eq!(result.history.len(), 1);
    assert_eq!(producer.revises.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn clarification_needed_escalates_without_drafting() {
    let store = Arc::new(MemoryStore::new());
    let producer = Arc::new(CountingProducer::default());
    let mut p = packet();
    p.clarification_needed = true;
    let orch = orchestrator(
        producer.clone(),
        Arc::new(ScriptedEvaluator::always(review(90, true))),
        store.clone(),
        config(4),
    );

    let result = orch.run(p).await.unwrap();

    assert_eq!(result.status, RunStatus::Escalated);
    assert!(result.history.is_empty());
    assert!(result.draft.is_none());
    assert!(result.reason.as_deref().unwrap().contains("Clarification required"));
    assert_eq!(producer.calls(), 0);
    assert_persisted(store.as_ref(), &result).await;
}

#[tokio::test]
async fn invalid_packet_is_rejected_before_any_state() {
    let store = Arc::new(MemoryStore::new());
    let mut p = packet();
    p.topic = "   ".into();
    let orch = orchestrator(
        Arc::new(CountingProducer::default()),
        Arc::new(ScriptedEvaluator::always(review(90, true))),
        store.clone(),
        config(4),
    );

    let err = orch.run(p).await.unwrap_err();

    assert!(matches!(err, RevisorError::Validation(_)));
    assert!(store.list_runs().await.unwrap().is_empty());
}

#[tokio::test]
async fn packet_threshold_overrides_config() {
    let mut p = packet();
    p.quality_targets.pass_threshold = Some(90);
    let orch = orchestrator(
        Arc::new(CountingProducer::default()),
        Arc::new(ScriptedEvaluator::always(review(85, true))),
        Arc::new(MemoryStore::new()),
        config(2),
    );

    let result = orch.run(p).await.unwrap();
    assert_eq!(result.status, RunStatus::Exhausted);
}

// ---------------------------------------------------------------------------
// Gate and escalation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn claimed_pass_with_major_issue_does_not_pass() {
    let mut flawed = review(92, true);
    flawed.major_issues = vec!["Advice contradicts itself".into()];
    let evaluator = ScriptedEvaluator::new(vec![Ok(flawed)], review(88, true));
    let producer = Arc::new(CountingProducer::default());
    let orch = orchestrator(
        producer.clone(),
        Arc::new(evaluator),
        Arc::new(MemoryStore::new()),
        config(3),
    );

    let result = orch.run(packet()).await.unwrap();

    assert_eq!(result.status, RunStatus::Passed);
    assert_eq!(result.history.len(), 2);
    assert_eq!(
        producer.seen_instructions.lock().unwrap()[0],
        vec!["Resolve major issue: Advice contradicts itself".to_string()]
    );
}

#[tokio::test]
async fn crisis_flag_escalates_with_rubric_evaluator() {
    let store = Arc::new(MemoryStore::new());
    let mut p = packet();
    p.risk_flags.insert("crisis_language".into());
    let orch = orchestrator(
        Arc::new(TemplateProducer::new()),
        Arc::new(RubricEvaluator::new()),
        store.clone(),
        config(4),
    );

    let result = orch.run(p).await.unwrap();

    assert_eq!(result.status, RunStatus::Escalated);
    assert_eq!(result.history.len(), 1);
    assert_eq!(result.basis_iteration, Some(0));
    assert!(result.reason.as_deref().unwrap().contains("escalation"));
    assert_persisted(store.as_ref(), &result).await;
}

#[tokio::test]
async fn never_escalate_policy_lets_the_budget_decide() {
    let mut p = packet();
    p.risk_flags.insert("crisis_language".into());
    let orch = orchestrator(
        Arc::new(TemplateProducer::new()),
        Arc::new(RubricEvaluator::new()),
        Arc::new(MemoryStore::new()),
        config(2),
    )
    .with_escalation_policy(Arc::new(NeverEscalate));

    let result = orch.run(p).await.unwrap();
    assert_eq!(result.status, RunStatus::Exhausted);
    assert_eq!(result.history.len(), 2);
}

#[tokio::test]
async fn deterministic_pair_passes_default_packet() {
    let orch = orchestrator(
        Arc::new(TemplateProducer::new()),
        Arc::new(RubricEvaluator::new()),
        Arc::new(MemoryStore::new()),
        config(4),
    );
    let result = orch.run(packet()).await.unwrap();
    assert_eq!(result.status, RunStatus::Passed);
    assert_eq!(result.review.as_ref().unwrap().overall_score, 89);
}

// ---------------------------------------------------------------------------
// Contract failures
// ---------------------------------------------------------------------------

/// Producer whose first draft is missing action items.
struct ShortPlanProducer;

#[async_trait]
impl DraftProducer for ShortPlanProducer {
    fn name(&self) -> &str {
        "short-plan"
    }

    async fn generate(&self, _brief: &Brief) -> Result<Draft> {
        let mut draft = valid_draft("too short");
        draft.action_plan.truncate(1);
        Ok(draft)
    }

    async fn revise(&self, _prior: &Draft, _instructions: &[String], _brief: &Brief) -> Result<Draft> {
        Ok(valid_draft("fixed"))
    }
}

#[tokio::test]
async fn invalid_draft_is_recorded_and_revised_without_evaluation() {
    let evaluator = Arc::new(ScriptedEvaluator::always(review(90, true)));
    let orch = orchestrator(
        Arc::new(ShortPlanProducer),
        evaluator.clone(),
        Arc::new(MemoryStore::new()),
        config(3),
    );

    let result = orch.run(packet()).await.unwrap();

    assert_eq!(result.status, RunStatus::Passed);
    assert_eq!(result.history.len(), 2);
    let first = &result.history.records()[0];
    assert_eq!(first.review.origin, ReviewOrigin::ContractCheck);
    assert_eq!(first.review.overall_score, 0);
    assert!(first.review.major_issues[0].contains("action_plan"));
    assert_eq!(evaluator.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn invalid_review_faults_without_retry() {
    let mut broken = review(85, true);
    broken.criterion_scores.remove(&Criterion::Safety);
    let evaluator = Arc::new(ScriptedEvaluator::always(broken));
    let store = Arc::new(MemoryStore::new());
    let orch = orchestrator(
        Arc::new(CountingProducer::default()),
        evaluator.clone(),
        store.clone(),
        config(3),
    );

    let result = orch.run(packet()).await.unwrap();

    assert_eq!(result.status, RunStatus::Faulted);
    assert!(result.history.is_empty());
    let fault = result.fault.as_ref().unwrap();
    assert_eq!(fault.attempts, 1);
    assert_eq!(fault.iteration_index, 0);
    assert!(fault.message.contains("safety"));
    assert_eq!(evaluator.calls.load(Ordering::SeqCst), 1);
    assert_persisted(store.as_ref(), &result).await;
}

// ---------------------------------------------------------------------------
// Model-backed producer
// ---------------------------------------------------------------------------

/// Chat provider replaying canned replies and keeping every prompt it saw.
struct ReplayProvider {
    replies: Mutex<VecDeque<String>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl ProviderAdapter for ReplayProvider {
    async fn complete(&self, request: &Request) -> Result<Response> {
        let prompt = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
        self.prompts.lock().unwrap().push(prompt);
        let text = self.replies.lock().unwrap().pop_front().unwrap();
        Ok(Response {
            id: "replay".into(),
            text,
            usage: Usage::default(),
            model: request.model.clone(),
            finish_reason: FinishReason::EndTurn,
        })
    }

    fn name(&self) -> &str {
        "replay"
    }

    fn default_model(&self) -> &str {
        "replay-model"
    }
}

fn model_producer(replies: Vec<String>) -> (Arc<ModelProducer>, Arc<Mutex<Vec<String>>>) {
    let prompts = Arc::new(Mutex::new(Vec::new()));
    let mut client = LlmClient::new();
    client.register_provider(ReplayProvider {
        replies: Mutex::new(replies.into()),
        prompts: prompts.clone(),
    });
    (Arc::new(ModelProducer::new(Arc::new(client), "")), prompts)
}

fn draft_reply(label: &str) -> String {
    serde_json::to_string(&valid_draft(label)).unwrap()
}

fn off_contract_reply(label: &str) -> String {
    draft_reply(label).replace("\"this week\"", "\"next week\"")
}

#[tokio::test]
async fn off_contract_model_draft_is_recorded_and_regenerated() {
    let (producer, prompts) = model_producer(vec![off_contract_reply("bad"), draft_reply("good")]);
    let evaluator = Arc::new(ScriptedEvaluator::always(review(85, true)));
    let store = Arc::new(MemoryStore::new());
    let orch = orchestrator(producer, evaluator.clone(), store.clone(), RunConfig::default());
    let mut events = orch.events().subscribe();

    let result = orch.run(packet()).await.unwrap();

    assert_eq!(result.status, RunStatus::Passed);
    assert_eq!(result.history.len(), 2);
    assert_eq!(result.basis_iteration, Some(1));
    let first = &result.history.records()[0];
    assert_eq!(first.review.origin, ReviewOrigin::ContractCheck);
    assert!(first.review.major_issues[0].contains("next week"));
    assert!(first.draft.is_blank());

    // One provider call per iteration; nothing retried, nothing faulted.
    let prompts = prompts.lock().unwrap();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].starts_with("Write a personal development feedback draft"));
    assert_eq!(evaluator.calls.load(Ordering::SeqCst), 1);
    while let Ok(event) = events.try_recv() {
        assert!(!matches!(event, RunEvent::CallRetrying { .. }), "unexpected retry: {event:?}");
    }
    assert_persisted(store.as_ref(), &result).await;
}

#[tokio::test]
async fn off_contract_revision_is_revised_from_last_usable_draft() {
    let (producer, prompts) = model_producer(vec![
        draft_reply("first attempt"),
        off_contract_reply("broken revision"),
        draft_reply("second revision"),
    ]);
    let evaluator = Arc::new(ScriptedEvaluator::new(vec![Ok(review(60, false))], review(90, true)));
    let orch = orchestrator(producer, evaluator.clone(), Arc::new(MemoryStore::new()), config(4));

    let result = orch.run(packet()).await.unwrap();

    assert_eq!(result.status, RunStatus::Passed);
    assert_eq!(result.history.len(), 3);
    assert_eq!(result.history.records()[1].review.origin, ReviewOrigin::ContractCheck);
    assert_eq!(result.draft.as_ref().unwrap().summary, "second revision");
    assert_eq!(evaluator.calls.load(Ordering::SeqCst), 2);

    let prompts = prompts.lock().unwrap();
    assert_eq!(prompts.len(), 3);
    assert!(prompts[2].starts_with("Revise the draft"));
    assert!(prompts[2].contains("first attempt"));
}

#[tokio::test]
async fn off_contract_drafts_exhaust_the_budget() {
    let (producer, _) = model_producer(vec![off_contract_reply("a"), off_contract_reply("b")]);
    let evaluator = Arc::new(ScriptedEvaluator::always(review(90, true)));
    let orch = orchestrator(producer, evaluator.clone(), Arc::new(MemoryStore::new()), config(2));

    let result = orch.run(packet()).await.unwrap();

    assert_eq!(result.status, RunStatus::Exhausted);
    assert_eq!(result.history.len(), 2);
    assert!(result.fault.is_none());
    assert_eq!(evaluator.calls.load(Ordering::SeqCst), 0);
}


// ---------------------------------------------------------------------------
// Faults and retries
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn one_timeout_is_retried_transparently() {
    let producer = Arc::new(StallingProducer {
        stalls: 1,
        calls: AtomicUsize::new(0),
    });
    let orch = orchestrator(
        producer.clone(),
        Arc::new(ScriptedEvaluator::always(review(85, true))),
        Arc::new(MemoryStore::new()),
        config(4),
    );
    let mut events = orch.events().subscribe();

    let result = orch.run(packet()).await.unwrap();

    assert_eq!(result.status, RunStatus::Passed);
    assert_eq!(result.history.len(), 1);
    assert_eq!(producer.calls.load(Ordering::SeqCst), 2);

    let mut retried = 0;
    while let Ok(event) = events.try_recv() {
        if let RunEvent::CallRetrying { attempt, .. } = event {
            assert_eq!(attempt, 1);
            retried += 1;
        }
    }
    assert_eq!(retried, 1);
}

#[tokio::test(start_paused = true)]
async fn second_consecutive_timeout_faults() {
    let store = Arc::new(MemoryStore::new());
    let producer = Arc::new(StallingProducer {
        stalls: 2,
        calls: AtomicUsize::new(0),
    });
    let orch = orchestrator(
        producer.clone(),
        Arc::new(ScriptedEvaluator::always(review(85, true))),
        store.clone(),
        config(4),
    );

    let result = orch.run(packet()).await.unwrap();

    assert_eq!(result.status, RunStatus::Faulted);
    assert!(result.history.is_empty());
    assert!(result.draft.is_none());
    let fault = result.fault.as_ref().unwrap();
    assert_eq!(fault.collaborator, revisor_types::Collaborator::Producer);
    assert!(fault.message.contains("timed out"));
    assert_eq!(producer.calls.load(Ordering::SeqCst), 2);
    assert_persisted(store.as_ref(), &result).await;
}

#[tokio::test]
async fn fault_mid_run_keeps_partial_history() {
    let evaluator = ScriptedEvaluator::new(
        vec![
            Ok(review(70, false)),
            Err(RevisorError::Other("upstream 502".into())),
            Err(RevisorError::Other("upstream 502".into())),
        ],
        review(90, true),
    );
    let orch = orchestrator(
        Arc::new(CountingProducer::default()),
        Arc::new(evaluator),
        Arc::new(MemoryStore::new()),
        config(4),
    );

    let result = orch.run(packet()).await.unwrap();

    assert_eq!(result.status, RunStatus::Faulted);
    assert_eq!(result.history.len(), 1);
    assert_eq!(result.basis_iteration, Some(0));
    assert!(result.best_effort);
    assert_eq!(result.fault.as_ref().unwrap().iteration_index, 1);
}

// ---------------------------------------------------------------------------
// Cancellation, resume, persistence
// ---------------------------------------------------------------------------

/// Evaluator that trips a cancel token on its first call.
struct CancellingEvaluator {
    token: CancelToken,
}

#[async_trait]
impl DraftEvaluator for CancellingEvaluator {
    fn name(&self) -> &str {
        "cancelling"
    }

    async fn evaluate(&self, _draft: &Draft, _brief: &Brief) -> Result<Review> {
        self.token.cancel();
        Ok(review(60, false))
    }
}

#[tokio::test]
async fn cancellation_is_observed_between_iterations() {
    let token = CancelToken::new();
    let store = Arc::new(MemoryStore::new());
    let producer = Arc::new(CountingProducer::default());
    let orch = orchestrator(
        producer.clone(),
        Arc::new(CancellingEvaluator {
            token: token.clone(),
        }),
        store.clone(),
        config(4),
    );

    let result = orch.run_cancellable(packet(), &token).await.unwrap();

    assert_eq!(result.status, RunStatus::Cancelled);
    assert_eq!(result.history.len(), 1);
    assert_eq!(result.basis_iteration, Some(0));
    assert_eq!(producer.revises.load(Ordering::SeqCst), 0);
    assert_persisted(store.as_ref(), &result).await;
}

#[tokio::test]
async fn cancellation_before_first_draft_calls_nobody() {
    let token = CancelToken::new();
    token.cancel();
    let store = Arc::new(MemoryStore::new());
    let producer = Arc::new(CountingProducer::default());
    let evaluator = Arc::new(ScriptedEvaluator::always(review(90, true)));
    let orch = orchestrator(producer.clone(), evaluator.clone(), store.clone(), config(4));

    let result = orch.run_cancellable(packet(), &token).await.unwrap();

    assert_eq!(result.status, RunStatus::Cancelled);
    assert!(result.history.is_empty());
    assert!(result.draft.is_none());
    assert!(result.reason.as_deref().unwrap().contains("before the first draft"));
    assert_eq!(producer.calls(), 0);
    assert_eq!(evaluator.calls.load(Ordering::SeqCst), 0);
    assert_persisted(store.as_ref(), &result).await;
}

#[tokio::test]
async fn resume_continues_from_persisted_history() {
    let store = Arc::new(MemoryStore::new());
    let run_id = revisor_types::RunId::from("interrupted");
    for (i, score) in [(0u32, 55u32), (1, 60)] {
        let record = revisor_types::IterationRecord::new(i, valid_draft(&format!("old {i}")), review(score, false));
        store.append_iteration(&run_id, &record).await.unwrap();
    }
    let producer = Arc::new(CountingProducer::default());
    let orch = orchestrator(
        producer.clone(),
        Arc::new(ScriptedEvaluator::always(review(88, true))),
        store.clone(),
        config(4),
    );

    let result = orch.resume(run_id.clone(), packet(), &CancelToken::new()).await.unwrap();

    assert_eq!(result.run_id, run_id);
    assert_eq!(result.status, RunStatus::Passed);
    assert_eq!(result.history.len(), 3);
    assert_eq!(result.basis_iteration, Some(2));
    assert_eq!(producer.generates.load(Ordering::SeqCst), 0);
    assert_eq!(producer.revises.load(Ordering::SeqCst), 1);
    assert_persisted(store.as_ref(), &result).await;

    let again = orch.resume(run_id, packet(), &CancelToken::new()).await.unwrap_err();
    assert!(matches!(again, RevisorError::DuplicateFinalization { .. }));
}

#[tokio::test]
async fn resume_at_budget_finalizes_without_new_calls() {
    let store = Arc::new(MemoryStore::new());
    let run_id = revisor_types::RunId::from("full");
    for i in 0..2u32 {
        let record = revisor_types::IterationRecord::new(i, valid_draft("old"), review(50 + i, false));
        store.append_iteration(&run_id, &record).await.unwrap();
    }
    let producer = Arc::new(CountingProducer::default());
    let orch = orchestrator(
        producer.clone(),
        Arc::new(ScriptedEvaluator::always(review(99, true))),
        store.clone(),
        config(2),
    );

    let result = orch.resume(run_id, packet(), &CancelToken::new()).await.unwrap();

    assert_eq!(result.status, RunStatus::Exhausted);
    assert_eq!(result.basis_iteration, Some(1));
    assert_eq!(producer.calls(), 0);
}

#[tokio::test]
async fn events_follow_the_state_machine() {
    let orch = orchestrator(
        Arc::new(CountingProducer::default()),
        Arc::new(ScriptedEvaluator::new(vec![Ok(review(60, false))], review(85, true))),
        Arc::new(MemoryStore::new()),
        config(4),
    );
    let mut rx = orch.events().subscribe();

    orch.run(packet()).await.unwrap();

    let mut transitions = Vec::new();
    let mut recorded = Vec::new();
    let mut finalized = None;
    while let Ok(event) = rx.try_recv() {
        match event {
            RunEvent::StateChanged { to, .. } => transitions.push(to.as_str()),
            RunEvent::IterationRecorded { iteration_index, .. } => recorded.push(iteration_index),
            RunEvent::RunFinalized { status, .. } => finalized = Some(status),
            _ => {}
        }
    }
    assert_eq!(
        transitions,
        vec!["generating", "evaluating", "revising", "generating", "evaluating", "passed"]
    );
    assert_eq!(recorded, vec![0, 1]);
    assert_eq!(finalized, Some(RunStatus::Passed));
}

#[tokio::test]
async fn file_store_holds_the_whole_run() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::new(dir.path()));
    let orch = orchestrator(
        Arc::new(CountingProducer::default()),
        Arc::new(ScriptedEvaluator::new(vec![Ok(review(70, false))], review(81, true))),
        store.clone(),
        config(4),
    );

    let result = orch.run(packet()).await.unwrap();

    assert_eq!(result.status, RunStatus::Passed);
    assert_persisted(store.as_ref(), &result).await;
    let path = dir.path().join(format!("{}.json", result.run_id));
    let doc: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(doc["iterations"].as_array().unwrap().len(), 2);
    assert_eq!(doc["final"]["status"], "passed");
    assert_eq!(store.list_runs().await.unwrap(), vec![result.run_id.clone()]);
}

#[tokio::test]
async fn concurrent_runs_share_a_store() {
    let store = Arc::new(MemoryStore::new());
    let orch = Arc::new(orchestrator(
        Arc::new(TemplateProducer::new()),
        Arc::new(RubricEvaluator::new()),
        store.clone(),
        config(3),
    ));

    let mut handles = Vec::new();
    for n in 0..6 {
        let orch = orch.clone();
        handles.push(tokio::spawn(async move {
            orch.run(InputPacket::new(format!("topic {n}"), "improve")).await
        }));
    }
    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.status, RunStatus::Passed);
    }
    assert_eq!(store.list_runs().await.unwrap().len(), 6);
}
