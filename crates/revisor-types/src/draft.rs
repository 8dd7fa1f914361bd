//! Candidate feedback drafts produced by a draft producer.

use serde::{Deserialize, Serialize};

use crate::packet::{QualityTargets, Tone};
use crate::validation::{require_non_blank, Contract, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeHorizon {
    #[serde(rename = "this week")]
    ThisWeek,
    #[serde(rename = "this month")]
    ThisMonth,
    #[serde(rename = "quarter")]
    Quarter,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionItem {
    pub action: String,
    pub rationale: String,
    pub time_horizon: TimeHorizon,
    #[serde(default)]
    pub success_metric: String,
}

/// One candidate output for a topic.
///
/// Drafts are never edited in place: a revision is a new `Draft`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    pub topic: String,
    pub summary: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub growth_areas: Vec<String>,
    #[serde(default)]
    pub action_plan: Vec<ActionItem>,
    #[serde(default)]
    pub reflection_questions: Vec<String>,
    pub tone_check: Tone,
}

impl Draft {
    /// Stand-in for producer output that could not be read as a draft at all.
    pub fn rejected(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            summary: String::new(),
            strengths: Vec::new(),
            growth_areas: Vec::new(),
            action_plan: Vec::new(),
            reflection_questions: Vec::new(),
            tone_check: Tone::default(),
        }
    }

    /// No summary and no actions: nothing a revision could build on.
    pub fn is_blank(&self) -> bool {
        self.summary.trim().is_empty() && self.action_plan.is_empty()
    }

    /// Check the draft's structure and the packet's quality targets.
    pub fn validate(&self, targets: &QualityTargets) -> Result<(), ValidationError> {
        const C: Contract = Contract::Draft;
        require_non_blank(C, "topic", &self.topic)?;
        require_non_blank(C, "summary", &self.summary)?;

        let required = targets.min_action_items as usize;
        if self.action_plan.len() < required {
            return Err(ValidationError::new(
                C,
                "action_plan",
                format!(
                    "needs at least {required} items, got {}",
                    self.action_plan.len()
                ),
            ));
        }
        for (i, item) in self.action_plan.iter().enumerate() {
            require_non_blank(C, &format!("action_plan[{i}].action"), &item.action)?;
            if targets.requires_metrics && item.success_metric.trim().is_empty() {
                return Err(ValidationError::new(
                    C,
                    format!("action_plan[{i}].success_metric"),
                    "must not be empty when metrics are required",
                ));
            }
        }
        Ok(())
    }

    /// Whether the named section exists and has content. Unknown names are absent.
    pub fn has_section(&self, name: &str) -> bool {
        match name {
            "topic" => !self.topic.trim().is_empty(),
            "summary" => !self.summary.trim().is_empty(),
            "strengths" => !self.strengths.is_empty(),
            "growth_areas" => !self.growth_areas.is_empty(),
            "action_plan" => !self.action_plan.is_empty(),
            "reflection_questions" => !self.reflection_questions.is_empty(),
            "tone_check" => true,
            _ => false,
        }
    }

    /// All free text in the draft, lowercased, for keyword checks.
    pub fn text_lowercase(&self) -> String {
        let mut parts: Vec<&str> = vec![self.topic.as_str(), self.summary.as_str()];
        parts.extend(self.strengths.iter().map(String::as_str));
        parts.extend(self.growth_areas.iter().map(String::as_str));
        for item in &self.action_plan {
            parts.push(item.action.as_str());
            parts.push(item.rationale.as_str());
            parts.push(item.success_metric.as_str());
        }
        parts.extend(self.reflection_questions.iter().map(String::as_str));
        parts.join("\n").to_lowercase()
    }
}
