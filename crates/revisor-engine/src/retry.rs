//! Timeout-bounded collaborator calls with retry and configurable backoff.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use revisor_types::{duration_serde, Collaborator, FaultReport, RevisorError, RunId, ValidationError};

use crate::events::{EventEmitter, RunEvent};

/// Backoff policy controlling the delay between retry attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffPolicy {
    /// Fixed delay between retries.
    Fixed {
        #[serde(with = "duration_serde")]
        delay: Duration,
    },
    /// Exponential backoff: base * 2^attempt, capped at max.
    Exponential {
        #[serde(with = "duration_serde")]
        base: Duration,
        #[serde(with = "duration_serde")]
        max: Duration,
    },
    /// No delay between retries.
    None,
}

impl BackoffPolicy {
    /// Compute the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            BackoffPolicy::Fixed { delay } => *delay,
            BackoffPolicy::Exponential { base, max } => {
                let millis = (base.as_millis() as u64).saturating_mul(2u64.saturating_pow(attempt));
                Duration::from_millis(millis).min(*max)
            }
            BackoffPolicy::None => Duration::ZERO,
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Exponential {
            base: Duration::from_millis(500),
            max: Duration::from_secs(30),
        }
    }
}

/// Limits applied to every producer and evaluator call.
#[derive(Debug, Clone)]
pub struct CallPolicy {
    pub timeout: Duration,
    /// Extra attempts after the first failure.
    pub retries: u32,
    pub backoff: BackoffPolicy,
}

/// Identifies one collaborator call for logging and events.
#[derive(Debug, Clone, Copy)]
pub struct CallSite<'a> {
    pub collaborator: Collaborator,
    pub name: &'a str,
    pub run_id: &'a RunId,
    pub iteration: u32,
}

/// A collaborator that kept failing after all attempts.
#[derive(Debug)]
pub struct Fault {
    pub collaborator: Collaborator,
    pub attempts: u32,
    /// `ProducerFault` or `EvaluatorFault` wrapping the last failure.
    pub error: RevisorError,
}

impl Fault {
    pub fn report(&self, iteration_index: u32) -> FaultReport {
        FaultReport {
            collaborator: self.collaborator,
            iteration_index,
            attempts: self.attempts,
            message: self.error.to_string(),
        }
    }
}

/// Why a bounded collaborator call gave up.
#[derive(Debug)]
pub enum CallError {
    /// The collaborator answered, but the answer broke its contract. Never retried.
    Rejected(ValidationError),
    Fault(Fault),
}

impl CallError {
    /// Collapse into a fault. A rejected answer counts as one failed attempt.
    pub fn into_fault(self, site: &CallSite<'_>) -> Fault {
        match self {
            CallError::Fault(fault) => fault,
            CallError::Rejected(violation) => Fault {
                collaborator: site.collaborator,
                attempts: 1,
                error: wrap(site, violation.to_string()),
            },
        }
    }
}

fn wrap(site: &CallSite<'_>, message: String) -> RevisorError {
    match site.collaborator {
        Collaborator::Producer => RevisorError::ProducerFault {
            producer: site.name.to_string(),
            message,
        },
        Collaborator::Evaluator => RevisorError::EvaluatorFault {
            evaluator: site.name.to_string(),
            message,
        },
    }
}

/// Call a collaborator with a per-attempt timeout, retrying failed attempts.
///
/// The closure `f` is called up to `policy.retries + 1` times with the same
/// inputs. Every error, including a timeout, counts as a failed attempt, except
/// a `Validation` error, which ends the call at once as [`CallError::Rejected`].
/// Between attempts the function sleeps for the duration dictated by
/// `policy.backoff`.
pub async fn call_with_retry<T, F, Fut>(
    site: &CallSite<'_>,
    policy: &CallPolicy,
    events: &EventEmitter,
    f: F,
) -> Result<T, CallError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = revisor_types::Result<T>>,
{
    let attempts = policy.retries + 1;
    let mut last_err = None;
    for attempt in 0..attempts {
        let err = match tokio::time::timeout(policy.timeout, f()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(RevisorError::Validation(violation))) => {
                tracing::warn!(
                    run_id = %site.run_id,
                    collaborator = %site.collaborator,
                    name = site.name,
                    iteration = site.iteration,
                    attempt,
                    error = %violation,
                    "Collaborator output broke its contract"
                );
                return Err(CallError::Rejected(violation));
            }
            Ok(Err(e)) => e,
            Err(_) => RevisorError::CallTimeout {
                collaborator: site.name.to_string(),
                timeout_ms: policy.timeout.as_millis() as u64,
            },
        };
        if attempt + 1 < attempts {
            let delay = policy.backoff.delay_for_attempt(attempt);
            tracing::warn!(
                run_id = %site.run_id,
                collaborator = %site.collaborator,
                name = site.name,
                iteration = site.iteration,
                attempt,
                retryable = err.is_retryable(),
                delay_ms = %delay.as_millis(),
                error = %err,
                "Collaborator call failed, retrying"
            );
            events.emit(RunEvent::CallRetrying {
                run_id: site.run_id.to_string(),
                collaborator: site.collaborator,
                iteration: site.iteration,
                attempt: attempt + 1,
                error: err.to_string(),
            });
            tokio::time::sleep(delay).await;
        }
        last_err = Some(err);
    }

    let message = last_err
        .map(|e| e.to_string())
        .unwrap_or_else(|| "no attempts were made".to_string());
    Err(CallError::Fault(Fault {
        collaborator: site.collaborator,
        attempts,
        error: wrap(site, message),
    }))
}
