//! Orchestrator: the draft-evaluate-revise loop.
//!
//! Lifecycle: validate the packet, generate, evaluate, then either finalize
//! (passed, escalated, exhausted, faulted, cancelled) or revise and loop.
//! Every evaluated iteration is persisted before the next decision; the
//! finalized result is written exactly once on entering a terminal state.

use std::sync::Arc;
use std::time::Instant;

use revisor_types::{
    Collaborator, Draft, FaultReport, FinalizedResult, InputPacket, IterationRecord, Result,
    RevisorError, Review, RunHistory, RunId,
};

use crate::cancel::CancelToken;
use crate::collaborator::{SharedEvaluator, SharedProducer};
use crate::config::RunConfig;
use crate::context::{Brief, RunContext};
use crate::events::{EventEmitter, RunEvent};
use crate::gate::{judge, EscalationPolicy, SafetyEscalation, Verdict};
use crate::retry::{call_with_retry, CallError, CallPolicy, CallSite, Fault};
use crate::state::{RunMachine, RunState};
use crate::store::RunStore;

// ---------------------------------------------------------------------------
// Internal types
// ---------------------------------------------------------------------------

/// What the producer is asked to do next.
enum Step {
    Generate,
    Revise {
        prior: Draft,
        instructions: Vec<String>,
    },
}

enum Flow {
    Continue(Step),
    Stop(Ending),
}

/// Which record a finalized result is based on.
enum Basis {
    None,
    Record(u32),
    Best,
}

struct Ending {
    state: RunState,
    basis: Basis,
    reason: Option<String>,
    fault: Option<FaultReport>,
}

impl Ending {
    fn new(state: RunState, basis: Basis) -> Self {
        Self {
            state,
            basis,
            reason: None,
            fault: None,
        }
    }

    fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    fn faulted(fault: &Fault, iteration: u32) -> Self {
        Self {
            state: RunState::Faulted,
            basis: Basis::Best,
            reason: Some(fault.error.to_string()),
            fault: Some(fault.report(iteration)),
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    producer: SharedProducer,
    evaluator: SharedEvaluator,
    store: Arc<dyn RunStore>,
    escalation: Arc<dyn EscalationPolicy>,
    config: RunConfig,
    call_policy: CallPolicy,
    events: EventEmitter,
}

impl Orchestrator {
    pub fn new(
        producer: SharedProducer,
        evaluator: SharedEvaluator,
        store: Arc<dyn RunStore>,
        config: RunConfig,
    ) -> Self {
        let call_policy = config.call_policy();
        Self {
            producer,
            evaluator,
            store,
            escalation: Arc::new(SafetyEscalation::default()),
            config,
            call_policy,
            events: EventEmitter::default(),
        }
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

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RunStore> {
        &self.store
    }

    /// Run a packet to a terminal state under a fresh run id.
    ///
    /// An invalid packet fails with `Validation` before any run state exists.
    /// Collaborator faults, escalation and exhaustion all return `Ok` with the
    /// matching status.
    pub async fn run(&self, packet: InputPacket) -> Result<FinalizedResult> {
        self.run_cancellable(packet, &CancelToken::new()).await
    }

    pub async fn run_cancellable(
        &self,
        packet: InputPacket,
        cancel: &CancelToken,
    ) -> Result<FinalizedResult> {
        self.config.validate()?;
        packet.validate()?;
        let ctx = self.context(RunId::generate(), packet);
        let machine = RunMachine::new(RunHistory::new(ctx.run_id.clone()));
        self.drive(ctx, machine, cancel).await
    }

    /// Continue an unfinalized run from its persisted history.
    ///
    /// The last stored iteration is judged again, so a run interrupted between
    /// persisting an iteration and finalizing lands in the same terminal state.
    pub async fn resume(
        &self,
        run_id: RunId,
        packet: InputPacket,
        cancel: &CancelToken,
    ) -> Result<FinalizedResult> {
        self.config.validate()?;
        packet.validate()?;
        match self.store.read_final(&run_id).await {
            Ok(_) => {
                return Err(RevisorError::DuplicateFinalization {
                    run_id: run_id.to_string(),
                })
            }
            Err(RevisorError::NotFinalized { .. }) => {}
            Err(e) => return Err(e),
        }
        let history = self.store.read_history(&run_id).await?;
        tracing::info!(run_id = %run_id, iterations = history.len(), "Resuming run");
        let ctx = self.context(run_id, packet);
        self.drive(ctx, RunMachine::resumed(history), cancel).await
    }

    fn context(&self, run_id: RunId, packet: InputPacket) -> RunContext {
        let threshold = self.config.effective_threshold(&packet.quality_targets);
        RunContext {
            run_id,
            brief: Brief::new(Arc::new(packet), threshold),
            max_iterations: self.config.max_iterations,
        }
    }

    // -----------------------------------------------------------------------
    // Loop
    // -----------------------------------------------------------------------

    async fn drive(
        &self,
        ctx: RunContext,
        mut machine: RunMachine,
        cancel: &CancelToken,
    ) -> Result<FinalizedResult> {
        let started = Instant::now();
        tracing::info!(
            run_id = %ctx.run_id,
            topic = %ctx.brief.topic(),
            max_iterations = ctx.max_iterations,
            pass_threshold = ctx.brief.pass_threshold,
            "Run started"
        );
        self.events.emit(RunEvent::RunStarted {
            run_id: ctx.run_id.to_string(),
            topic: ctx.brief.topic().to_string(),
            max_iterations: ctx.max_iterations,
        });

        let mut step = if machine.state() == RunState::Init {
            if ctx.brief.packet.clarification_needed {
                let reason = RevisorError::ClarificationRequired {
                    topic: ctx.brief.topic().to_string(),
                };
                let ending = Ending::new(RunState::Escalated, Basis::None).with_reason(reason.to_string());
                return self.finalize(&ctx, machine, ending, started).await;
            }
            if cancel.is_cancelled() {
                let ending = Ending::new(RunState::Cancelled, Basis::None)
                    .with_reason("Cancelled before the first draft");
                return self.finalize(&ctx, machine, ending, started).await;
            }
            Step::Generate
        } else {
            match self.conclude(&ctx, &mut machine, cancel)? {
                Flow::Continue(step) => step,
                Flow::Stop(ending) => return self.finalize(&ctx, machine, ending, started).await,
            }
        };

        loop {
            let index = machine.history().next_index();

            self.transition(&ctx, &mut machine, RunState::Generating)?;
            let (draft, rejection) = match self.produce(&ctx, &step, index).await {
                Ok(draft) => (draft, None),
                Err(CallError::Rejected(violation)) => (Draft::rejected(ctx.brief.topic()), Some(violation)),
                Err(CallError::Fault(fault)) => {
                    let ending = Ending::faulted(&fault, index);
                    return self.finalize(&ctx, machine, ending, started).await;
                }
            };

            self.transition(&ctx, &mut machine, RunState::Evaluating)?;
            let checked = match rejection {
                Some(violation) => Err(violation),
                None => draft.validate(ctx.brief.quality_targets()),
            };
            let review = match checked {
                Err(violation) => {
                    tracing::warn!(
                        run_id = %ctx.run_id,
                        iteration = index,
                        error = %violation,
                        "Draft failed contract validation; skipping evaluation"
                    );
                    Review::contract_failure(&violation)
                }
                Ok(()) => match self.assess(&ctx, &draft, index).await {
                    Ok(review) => review,
                    Err(fault) => {
                        let ending = Ending::faulted(&fault, index);
                        return self.finalize(&ctx, machine, ending, started).await;
                    }
                },
            };

            let record = IterationRecord::new(index, draft, review);
            self.store.append_iteration(&ctx.run_id, &record).await?;
            tracing::info!(
                run_id = %ctx.run_id,
                iteration = index,
                score = record.review.overall_score,
                pass = record.review.pass,
                major_issues = record.review.major_issues.len(),
                "Iteration recorded"
            );
            self.events.emit(RunEvent::IterationRecorded {
                run_id: ctx.run_id.to_string(),
                iteration_index: index,
                overall_score: record.review.overall_score,
                passed: record.review.meets_gate(ctx.brief.pass_threshold),
            });
            machine.record(record)?;

            step = match self.conclude(&ctx, &mut machine, cancel)? {
                Flow::Continue(next) => next,
                Flow::Stop(ending) => return self.finalize(&ctx, machine, ending, started).await,
            };
        }
    }

    /// Decide what follows the latest record.
    fn conclude(&self, ctx: &RunContext, machine: &mut RunMachine, cancel: &CancelToken) -> Result<Flow> {
        let record = machine.history().last().ok_or_else(|| {
            RevisorError::Other(format!("Run '{}' has no iteration to judge", ctx.run_id))
        })?;
        let index = record.iteration_index;

        let flow = match judge(ctx, self.escalation.as_ref(), record) {
            Verdict::Passed => Flow::Stop(Ending::new(RunState::Passed, Basis::Record(index))),
            Verdict::Escalate(reason) => {
                tracing::warn!(run_id = %ctx.run_id, iteration = index, reason = %reason, "Run escalated");
                Flow::Stop(Ending::new(RunState::Escalated, Basis::Record(index)).with_reason(reason))
            }
            Verdict::Exhausted => Flow::Stop(Ending::new(RunState::Exhausted, Basis::Best).with_reason(format!(
                "Iteration budget of {} exhausted without passing the gate",
                ctx.max_iterations
            ))),
            Verdict::Revise(_) if cancel.is_cancelled() => Flow::Stop(
                Ending::new(RunState::Cancelled, Basis::Best)
                    .with_reason(format!("Cancelled after iteration {index}")),
            ),
            Verdict::Revise(instructions) => {
                // Revise the latest draft with content; with none yet, start over.
                let prior = machine
                    .history()
                    .records()
                    .iter()
                    .rev()
                    .map(|r| &r.draft)
                    .find(|d| !d.is_blank())
                    .cloned();
                self.transition(ctx, machine, RunState::Revising)?;
                match prior {
                    Some(prior) => Flow::Continue(Step::Revise { prior, instructions }),
                    None => Flow::Continue(Step::Generate),
                }
            }
        };
        Ok(flow)
    }

    async fn finalize(
        &self,
        ctx: &RunContext,
        mut machine: RunMachine,
        ending: Ending,
        started: Instant,
    ) -> Result<FinalizedResult> {
        self.transition(ctx, &mut machine, ending.state)?;
        let status = ending.state.terminal_status().ok_or_else(|| {
            RevisorError::Other(format!("{} is not a terminal state", ending.state))
        })?;

        let mut result = FinalizedResult::new(status, machine.into_history());
        result = match ending.basis {
            Basis::None => result,
            Basis::Record(index) => result.with_basis(index, false),
            Basis::Best => match result.history.best().map(|r| r.iteration_index) {
                Some(index) => result.with_basis(index, true),
                None => result,
            },
        };
        if let Some(reason) = ending.reason {
            result = result.with_reason(reason);
        }
        if let Some(fault) = ending.fault {
            result = result.with_fault(fault);
        }

        self.store.finalize(&ctx.run_id, &result).await?;

        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            run_id = %ctx.run_id,
            status = %result.status,
            iterations = result.history.len(),
            basis = ?result.basis_iteration,
            duration_ms,
            "Run finalized"
        );
        self.events.emit(RunEvent::RunFinalized {
            run_id: ctx.run_id.to_string(),
            status: result.status,
            iterations: result.history.len(),
            duration_ms,
        });
        Ok(result)
    }

    fn transition(&self, ctx: &RunContext, machine: &mut RunMachine, to: RunState) -> Result<()> {
        let iteration = machine.history().next_index();
        let from = machine.transition(to)?;
        tracing::debug!(run_id = %ctx.run_id, %from, %to, iteration, "State transition");
        self.events.emit(RunEvent::StateChanged {
            run_id: ctx.run_id.to_string(),
            from,
            to,
            iteration,
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Collaborator calls
    // -----------------------------------------------------------------------

    /// Ask the producer for a draft. Output that breaks the draft contract comes
    /// back as `CallError::Rejected` and is recorded like any invalid draft.
    async fn produce(&self, ctx: &RunContext, step: &Step, index: u32) -> std::result::Result<Draft, CallError> {
        let producer = self.producer.as_ref();
        let brief = &ctx.brief;
        let site = CallSite {
            collaborator: Collaborator::Producer,
            name: producer.name(),
            run_id: &ctx.run_id,
            iteration: index,
        };
        call_with_retry(&site, &self.call_policy, &self.events, move || async move {
            match step {
                Step::Generate => producer.generate(brief).await,
                Step::Revise { prior, instructions } => producer.revise(prior, instructions, brief).await,
            }
        })
        .await
    }

    /// Evaluate a draft. A review that breaks its own contract is an evaluator
    /// fault straight away.
    async fn assess(&self, ctx: &RunContext, draft: &Draft, index: u32) -> std::result::Result<Review, Fault> {
        let evaluator = self.evaluator.as_ref();
        let brief = &ctx.brief;
        let site = CallSite {
            collaborator: Collaborator::Evaluator,
            name: evaluator.name(),
            run_id: &ctx.run_id,
            iteration: index,
        };
        call_with_retry(&site, &self.call_policy, &self.events, move || async move {
            let review = evaluator.evaluate(draft, brief).await?;
            review.validate()?;
            Ok(review)
        })
        .await
        .map_err(|e| e.into_fault(&site))
    }
}
