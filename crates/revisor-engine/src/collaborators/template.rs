use async_trait::async_trait;

use revisor_types::{ActionItem, Draft, Result, TimeHorizon};

use crate::collaborator::DraftProducer;
use crate::context::Brief;

const STRENGTHS: [&str; 2] = [
    "You are actively seeking structured feedback",
    "You are willing to translate feedback into action",
];

const GROWTH_AREAS: [&str; 2] = [
    "Improve consistency through smaller repeatable habits",
    "Track outcomes with clear weekly metrics",
];

const REFLECTION_QUESTIONS: [&str; 3] = [
    "What was one small win this week and why did it work?",
    "What obstacle repeated most often and how can you reduce its impact?",
    "Which next action feels realistic enough to start today?",
];

/// (action, rationale, horizon, metric) used to top up short action plans.
const SUPPORTING_ACTIONS: [(&str, &str, TimeHorizon, &str); 3] = [
    (
        "Review what worked at the end of each week",
        "Regular review turns experience into adjustments.",
        TimeHorizon::ThisMonth,
        "Write a three-line review every Sunday",
    ),
    (
        "Share your plan with one accountability partner",
        "Commitments shared with someone else are kept more often.",
        TimeHorizon::ThisWeek,
        "Send one progress update per week",
    ),
    (
        "Remove one recurring obstacle from your routine",
        "Fewer obstacles make the next step easier to start.",
        TimeHorizon::ThisMonth,
        "Name and address one obstacle each week",
    ),
];

const GOAL_RATIONALE: &str = "Time-blocking improves consistency and follow-through.";
const GOAL_METRIC: &str = "Complete at least 3 focused sessions this week";
const FALLBACK_METRIC: &str = "Track progress weekly using a 1-10 self-rating";
const REVISION_NOTE: &str = " (revised using reviewer feedback)";

/// Deterministic producer that builds drafts from fixed templates and the
/// persona's goals. Needs no network access.
#[derive(Debug, Clone, Default)]
pub struct TemplateProducer;

impl TemplateProducer {
    pub fn new() -> Self {
        Self
    }

    fn goal_actions(brief: &Brief) -> Vec<ActionItem> {
        let goals = &brief.persona().goals;
        let fallback = [format!("Make steady progress on {}", brief.topic())];
        let goals = if goals.is_empty() { &fallback[..] } else { &goals[..] };
        goals
            .iter()
            .take(3)
            .map(|goal| ActionItem {
                action: format!("Schedule a focused block for: {goal}"),
                rationale: GOAL_RATIONALE.to_string(),
                time_horizon: TimeHorizon::ThisWeek,
                success_metric: GOAL_METRIC.to_string(),
            })
            .collect()
    }

    /// Append supporting actions until the plan has at least `min` items.
    fn top_up(plan: &mut Vec<ActionItem>, min: usize) {
        let mut n = 0;
        while plan.len() < min {
            let (action, rationale, horizon, metric) = SUPPORTING_ACTIONS[n % SUPPORTING_ACTIONS.len()];
            let round = n / SUPPORTING_ACTIONS.len();
            let action = if round == 0 {
                action.to_string()
            } else {
                format!("{action} (cycle {})", round + 1)
            };
            plan.push(ActionItem {
                action,
                rationale: rationale.to_string(),
                time_horizon: horizon,
                success_metric: metric.to_string(),
            });
            n += 1;
        }
    }
}

#[async_trait]
impl DraftProducer for TemplateProducer {
    fn name(&self) -> &str {
        "template"
    }

    async fn generate(&self, brief: &Brief) -> Result<Draft> {
        let tone = brief.persona().preferences.tone;
        let mut action_plan = Self::goal_actions(brief);
        Self::top_up(&mut action_plan, brief.quality_targets().min_action_items as usize);

        Ok(Draft {
            topic: brief.topic().to_string(),
            summary: format!(
                "Here is a {} personal development plan for: {}",
                tone.as_str(),
                brief.topic()
            ),
            strengths: STRENGTHS.iter().map(|s| s.to_string()).collect(),
            growth_areas: GROWTH_AREAS.iter().map(|s| s.to_string()).collect(),
            action_plan,
            reflection_questions: REFLECTION_QUESTIONS.iter().map(|s| s.to_string()).collect(),
            tone_check: tone,
        })
    }

    async fn revise(&self, prior: &Draft, instructions: &[String], brief: &Brief) -> Result<Draft> {
        let mut revised = prior.clone();
        revised.summary.push_str(REVISION_NOTE);

        for instruction in instructions {
            let lowered = instruction.to_lowercase();
            if lowered.contains("metric") {
                for item in &mut revised.action_plan {
                    if item.success_metric.trim().is_empty() {
                        item.success_metric = FALLBACK_METRIC.to_string();
                    }
                }
            }
            if lowered.contains("personal") {
                let context = brief.persona().context.trim();
                if !context.is_empty() && !revised.summary.contains(context) {
                    revised.summary.push_str(&format!(" Context considered: {context}."));
                }
            }
            if lowered.contains("action") && (lowered.contains("at least") || lowered.contains("more")) {
                Self::top_up(
                    &mut revised.action_plan,
                    brief.quality_targets().min_action_items as usize,
                );
            }
        }
        Ok(revised)
    }
}
