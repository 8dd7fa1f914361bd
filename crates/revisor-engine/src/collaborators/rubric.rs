use std::collections::BTreeMap;

use async_trait::async_trait;

use revisor_types::{Criterion, Draft, InputPacket, Result, Review, ReviewOrigin};

use crate::collaborator::DraftEvaluator;
use crate::context::Brief;

const CRISIS_FLAG: &str = "crisis_language";

/// Deterministic evaluator scoring five fixed criteria with keyword rules.
#[derive(Debug, Clone, Default)]
pub struct RubricEvaluator;

impl RubricEvaluator {
    pub fn new() -> Self {
        Self
    }

    fn relevance(draft: &Draft, packet: &InputPacket) -> u32 {
        let summary = draft.summary.to_lowercase();
        let topic = packet.topic.to_lowercase();
        if topic.split_whitespace().take(2).any(|word| summary.contains(word)) {
            90
        } else {
            70
        }
    }

    fn personalization(draft: &Draft, packet: &InputPacket) -> u32 {
        let goals = &packet.persona_profile.goals;
        if goals.is_empty() {
            return 70;
        }
        let actions: Vec<String> = draft.action_plan.iter().map(|a| a.action.to_lowercase()).collect();
        let matched = goals
            .iter()
            .filter_map(|goal| goal.to_lowercase().split_whitespace().next().map(str::to_string))
            .filter(|first| actions.iter().any(|action| action.contains(first.as_str())))
            .count() as u32;
        (65 + matched * 10).min(95)
    }

    fn actionability(draft: &Draft) -> u32 {
        let total = draft.action_plan.len();
        if total == 0 {
            return 30;
        }
        let with_metrics = draft
            .action_plan
            .iter()
            .filter(|a| !a.success_metric.trim().is_empty())
            .count();
        let share = with_metrics as f64 / total as f64;
        (60 + (35.0 * share) as u32).min(95)
    }

    fn safety(draft: &Draft, packet: &InputPacket) -> u32 {
        if packet.has_risk_flag(CRISIS_FLAG) {
            60
        } else if draft.text_lowercase().contains("diagnosis") {
            50
        } else {
            90
        }
    }

    fn guideline_adherence(draft: &Draft, packet: &InputPacket) -> u32 {
        let required = &packet.guidelines.must_include;
        if required.is_empty() {
            return 100;
        }
        let present = required.iter().filter(|name| draft.has_section(name)).count();
        ((present as f64 / required.len() as f64) * 100.0).round() as u32
    }
}

#[async_trait]
impl DraftEvaluator for RubricEvaluator {
    fn name(&self) -> &str {
        "rubric"
    }

    async fn evaluate(&self, draft: &Draft, brief: &Brief) -> Result<Review> {
        let packet = brief.packet.as_ref();
        let scores: BTreeMap<Criterion, u32> = BTreeMap::from([
            (Criterion::Relevance, Self::relevance(draft, packet)),
            (Criterion::Personalization, Self::personalization(draft, packet)),
            (Criterion::Actionability, Self::actionability(draft)),
            (Criterion::Safety, Self::safety(draft, packet)),
            (Criterion::GuidelineAdherence, Self::guideline_adherence(draft, packet)),
        ]);
        let sum: u32 = scores.values().sum();
        let overall = (sum as f64 / scores.len() as f64).round() as u32;

        let mut major_issues = Vec::new();
        let mut minor_issues = Vec::new();
        let mut revision_instructions = Vec::new();

        if scores[&Criterion::Actionability] < 75 {
            major_issues.push("Action plan lacks enough measurable steps".to_string());
            revision_instructions.push("Add concrete success metrics for every action".to_string());
        }
        if scores[&Criterion::Personalization] < 70 {
            minor_issues.push("Draft could be more personalized to user context".to_string());
            revision_instructions
                .push("Personalize summary and actions using persona context".to_string());
        }
        if packet.has_risk_flag(CRISIS_FLAG) {
            major_issues.push("Safety escalation required for crisis language".to_string());
            revision_instructions.push(
                "Add crisis-support escalation language and avoid overconfident coaching"
                    .to_string(),
            );
        }

        let pass = overall >= brief.pass_threshold && major_issues.is_empty();
        tracing::debug!(overall, pass, majors = major_issues.len(), "Rubric evaluation");

        Ok(Review {
            overall_score: overall,
            pass,
            criterion_scores: scores,
            major_issues,
            minor_issues,
            revision_instructions,
            confidence: 0.82,
            origin: ReviewOrigin::Evaluator,
        })
    }
}
