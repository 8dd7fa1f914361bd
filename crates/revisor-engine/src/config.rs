//! Run configuration: iteration budget, gate threshold, call limits, backend.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use revisor_types::{duration_serde, QualityTargets, Result, RevisorError};

use crate::retry::{BackoffPolicy, CallPolicy};

/// Which producer/evaluator pair a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Model-backed collaborators when an LLM client is available, else deterministic.
    #[default]
    Auto,
    Model,
    Deterministic,
}

impl FromStr for Backend {
    type Err = RevisorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Backend::Auto),
            "model" => Ok(Backend::Model),
            "deterministic" => Ok(Backend::Deterministic),
            other => Err(RevisorError::Config(format!(
                "unknown backend '{other}' (expected auto, model or deterministic)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Upper bound on draft iterations, counting the first.
    pub max_iterations: u32,
    /// Gate threshold used when the input packet does not carry one.
    pub pass_threshold: u32,
    #[serde(with = "duration_serde")]
    pub timeout_per_call: Duration,
    /// Retries after a failed collaborator call before the run faults.
    pub fault_retries: u32,
    pub backoff: BackoffPolicy,
    pub backend: Backend,
    /// Model override for model-backed collaborators; empty uses the provider default.
    pub model: String,
    pub runs_dir: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_iterations: 4,
            pass_threshold: 80,
            timeout_per_call: Duration::from_secs(60),
            fault_retries: 1,
            backoff: BackoffPolicy::default(),
            backend: Backend::Auto,
            model: String::new(),
            runs_dir: PathBuf::from("runs"),
        }
    }
}

impl RunConfig {
    /// Load from a JSON file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: RunConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(RevisorError::Config(
                "max_iterations must be at least 1".into(),
            ));
        }
        if self.pass_threshold > 100 {
            return Err(RevisorError::Config(format!(
                "pass_threshold must be within 0..=100, got {}",
                self.pass_threshold
            )));
        }
        if self.timeout_per_call.is_zero() {
            return Err(RevisorError::Config(
                "timeout_per_call must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// The packet's own threshold wins over the configured default.
    pub fn effective_threshold(&self, targets: &QualityTargets) -> u32 {
        targets.pass_threshold.unwrap_or(self.pass_threshold)
    }

    pub fn call_policy(&self) -> CallPolicy {
        CallPolicy {
            timeout: self.timeout_per_call,
            retries: self.fault_retries,
            backoff: self.backoff.clone(),
        }
    }
}
