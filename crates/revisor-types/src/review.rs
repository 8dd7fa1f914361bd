//! Structured evaluations of a single draft.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::validation::{require_percentage, require_unit_interval, Contract, ValidationError};

/// The fixed rubric criteria every review scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Relevance,
    Personalization,
    Actionability,
    Safety,
    GuidelineAdherence,
}

impl Criterion {
    pub const ALL: [Criterion; 5] = [
        Criterion::Relevance,
        Criterion::Personalization,
        Criterion::Actionability,
        Criterion::Safety,
        Criterion::GuidelineAdherence,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Criterion::Relevance => "relevance",
            Criterion::Personalization => "personalization",
            Criterion::Actionability => "actionability",
            Criterion::Safety => "safety",
            Criterion::GuidelineAdherence => "guideline_adherence",
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who produced a review.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewOrigin {
    #[default]
    Evaluator,
    /// Synthesized by the engine for a draft that failed contract validation.
    ContractCheck,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub overall_score: u32,
    pub pass: bool,
    pub criterion_scores: BTreeMap<Criterion, u32>,
    #[serde(default)]
    pub major_issues: Vec<String>,
    #[serde(default)]
    pub minor_issues: Vec<String>,
    #[serde(default)]
    pub revision_instructions: Vec<String>,
    pub confidence: f64,
    #[serde(default)]
    pub origin: ReviewOrigin,
}

impl Review {
    /// Check score ranges and that every rubric criterion was scored.
    ///
    /// The `pass` flag is not checked here; see [`Review::meets_gate`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        const C: Contract = Contract::Review;
        require_percentage(C, "overall_score", self.overall_score)?;
        for criterion in Criterion::ALL {
            let field = format!("criterion_scores.{criterion}");
            match self.criterion_scores.get(&criterion) {
                Some(score) => require_percentage(C, &field, *score)?,
                None => return Err(ValidationError::new(C, field, "missing score")),
            }
        }
        require_unit_interval(C, "confidence", self.confidence)?;
        Ok(())
    }

    /// The pass gate, re-derived from the review's own content.
    ///
    /// True only when the evaluator claims a pass, no major issue is listed and
    /// the overall score reaches `threshold`.
    pub fn meets_gate(&self, threshold: u32) -> bool {
        self.pass && self.major_issues.is_empty() && self.overall_score >= threshold
    }

    /// Review recorded in place of an evaluation when the draft itself broke its contract.
    pub fn contract_failure(error: &ValidationError) -> Self {
        Self {
            overall_score: 0,
            pass: false,
            criterion_scores: Criterion::ALL.into_iter().map(|c| (c, 0)).collect(),
            major_issues: vec![error.to_string()],
            minor_issues: Vec::new(),
            revision_instructions: vec![format!("Fix `{}` so that it {}", error.field, error.rule)],
            confidence: 1.0,
            origin: ReviewOrigin::ContractCheck,
        }
    }

    pub fn score(&self, criterion: Criterion) -> Option<u32> {
        self.criterion_scores.get(&criterion).copied()
    }
}
