//! Termination checks applied after every evaluated iteration.
//!
//! Order matters: escalation wins over the pass gate, the pass gate wins over
//! the iteration budget.

use std::collections::BTreeSet;

use revisor_types::{InputPacket, IterationRecord, Review, ReviewOrigin};

use crate::context::RunContext;

// ---------------------------------------------------------------------------
// EscalationPolicy
// ---------------------------------------------------------------------------

/// Decides whether a review must stop the loop for human attention.
pub trait EscalationPolicy: Send + Sync {
    /// Returns the escalation reason, or `None` to let the loop continue.
    fn check(&self, packet: &InputPacket, review: &Review) -> Option<String>;
}

/// Escalates on explicit escalation language, on major issues that cite a
/// safety rule, and on any major issue while an escalation risk flag is set.
#[derive(Debug, Clone)]
pub struct SafetyEscalation {
    pub escalation_flags: BTreeSet<String>,
    /// Lowercase fragment that marks a major issue as an escalation request.
    pub marker: String,
}

impl Default for SafetyEscalation {
    fn default() -> Self {
        Self {
            escalation_flags: BTreeSet::from(["crisis_language".to_string()]),
            marker: "escalat".to_string(),
        }
    }
}

impl EscalationPolicy for SafetyEscalation {
    fn check(&self, packet: &InputPacket, review: &Review) -> Option<String> {
        if review.origin == ReviewOrigin::ContractCheck {
            return None;
        }

        for issue in &review.major_issues {
            let lower = issue.to_lowercase();
            if lower.contains(&self.marker) {
                return Some(format!("Evaluator requested escalation: {issue}"));
            }
            for rule in &packet.guidelines.safety_rules {
                let rule_lower = rule.trim().to_lowercase();
                if !rule_lower.is_empty() && lower.contains(&rule_lower) {
                    return Some(format!("Safety rule '{rule}' violated: {issue}"));
                }
            }
        }

        if let Some(issue) = review.major_issues.first() {
            if let Some(flag) = packet
                .active_risk_flags()
                .find(|flag| self.escalation_flags.contains(*flag))
            {
                return Some(format!(
                    "Risk flag '{flag}' is set and a major issue remains: {issue}"
                ));
            }
        }
        None
    }
}

/// Never escalates. Useful for batch runs where every run should finish on the gate.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverEscalate;

impl EscalationPolicy for NeverEscalate {
    fn check(&self, _packet: &InputPacket, _review: &Review) -> Option<String> {
        None
    }
}

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Passed,
    Escalate(String),
    Revise(Vec<String>),
    Exhausted,
}

/// Judge the latest record of a run.
pub fn judge(ctx: &RunContext, policy: &dyn EscalationPolicy, record: &IterationRecord) -> Verdict {
    let review = &record.review;
    if let Some(reason) = policy.check(&ctx.brief.packet, review) {
        return Verdict::Escalate(reason);
    }

    let threshold = ctx.brief.pass_threshold;
    if review.meets_gate(threshold) {
        return Verdict::Passed;
    }
    if review.pass {
        tracing::warn!(
            run_id = %ctx.run_id,
            iteration = record.iteration_index,
            score = review.overall_score,
            threshold,
            major_issues = review.major_issues.len(),
            "Evaluator reported pass but the gate is not met; treating as not passed"
        );
    }

    if record.iteration_index + 1 < ctx.max_iterations {
        Verdict::Revise(revision_guidance(review, threshold))
    } else {
        Verdict::Exhausted
    }
}

/// Instructions handed to the producer for the next revision.
///
/// Uses the evaluator's instructions when present; otherwise derives them from
/// the listed issues, and as a last resort from the score gap.
pub fn revision_guidance(review: &Review, threshold: u32) -> Vec<String> {
    if !review.revision_instructions.is_empty() {
        return review.revision_instructions.clone();
    }

    let mut guidance: Vec<String> = review
        .major_issues
        .iter()
        .map(|issue| format!("Resolve major issue: {issue}"))
        .chain(
            review
                .minor_issues
                .iter()
                .map(|issue| format!("Address minor issue: {issue}")),
        )
        .collect();

    if guidance.is_empty() {
        let weakest = review
            .criterion_scores
            .values()
            .min()
            .copied()
            .map(|low| {
                review
                    .criterion_scores
                    .iter()
                    .filter(|(_, score)| **score == low)
                    .map(|(criterion, _)| criterion.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default();
        let mut line = format!(
            "Raise the overall score from {} to at least {}",
            review.overall_score, threshold
        );
        if !weakest.is_empty() {
            line.push_str(&format!(" by strengthening {weakest}"));
        }
        guidance.push(line);
    }
    guidance
}
