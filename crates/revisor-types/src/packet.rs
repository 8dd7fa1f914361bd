//! The normalized input packet handed to the orchestrator by intake.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::validation::{
    require_non_blank, require_percentage, require_unit_interval, Contract, ValidationError,
};

/// Risk flag marker meaning "no concerns were flagged".
pub const NO_RISK_FLAG: &str = "none";

/// Feedback tone requested by the user, and reported back by a draft.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    #[default]
    Supportive,
    Direct,
    Balanced,
}

impl Tone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Supportive => "supportive",
            Tone::Direct => "direct",
            Tone::Balanced => "balanced",
        }
    }
}

/// Output layout requested by the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    Bullet,
    Narrative,
    #[default]
    Hybrid,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub tone: Tone,
    #[serde(default)]
    pub format: Format,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaProfile {
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub preferences: Preferences,
}

/// Content rules every draft is judged against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guidelines {
    pub must_include: Vec<String>,
    #[serde(default)]
    pub style_rules: Vec<String>,
    #[serde(default)]
    pub safety_rules: Vec<String>,
}

impl Default for Guidelines {
    fn default() -> Self {
        Self {
            must_include: [
                "summary",
                "strengths",
                "growth_areas",
                "action_plan",
                "reflection_questions",
            ]
            .map(String::from)
            .to_vec(),
            style_rules: ["non-judgmental", "specific", "actionable"]
                .map(String::from)
                .to_vec(),
            safety_rules: ["no diagnosis", "no shaming language"]
                .map(String::from)
                .to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityTargets {
    #[serde(default = "default_min_action_items")]
    pub min_action_items: u32,
    #[serde(default = "default_requires_metrics")]
    pub requires_metrics: bool,
    /// Overrides the run configuration's threshold when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass_threshold: Option<u32>,
}

fn default_min_action_items() -> u32 {
    3
}

fn default_requires_metrics() -> bool {
    true
}

impl Default for QualityTargets {
    fn default() -> Self {
        Self {
            min_action_items: default_min_action_items(),
            requires_metrics: default_requires_metrics(),
            pass_threshold: None,
        }
    }
}

/// Normalized request produced by intake. Immutable for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputPacket {
    pub topic: String,
    pub user_intent: String,
    #[serde(default)]
    pub persona_profile: PersonaProfile,
    #[serde(default)]
    pub guidelines: Guidelines,
    #[serde(default)]
    pub quality_targets: QualityTargets,
    #[serde(default)]
    pub risk_flags: BTreeSet<String>,
    #[serde(default)]
    pub clarification_needed: bool,
    #[serde(default = "default_intake_confidence")]
    pub intake_confidence: f64,
}

fn default_intake_confidence() -> f64 {
    0.75
}

impl InputPacket {
    /// Create a packet with default guidelines and quality targets.
    pub fn new(topic: impl Into<String>, user_intent: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            user_intent: user_intent.into(),
            persona_profile: PersonaProfile::default(),
            guidelines: Guidelines::default(),
            quality_targets: QualityTargets::default(),
            risk_flags: BTreeSet::new(),
            clarification_needed: false,
            intake_confidence: default_intake_confidence(),
        }
    }

    /// Check the packet's structural invariants.
    pub fn validate(&self) -> Result<(), ValidationError> {
        const C: Contract = Contract::InputPacket;
        require_non_blank(C, "topic", &self.topic)?;
        require_non_blank(C, "user_intent", &self.user_intent)?;
        if self.guidelines.must_include.is_empty() {
            return Err(ValidationError::new(
                C,
                "guidelines.must_include",
                "must list at least one section",
            ));
        }
        if self.quality_targets.min_action_items == 0 {
            return Err(ValidationError::new(
                C,
                "quality_targets.min_action_items",
                "must be positive",
            ));
        }
        if let Some(threshold) = self.quality_targets.pass_threshold {
            require_percentage(C, "quality_targets.pass_threshold", threshold)?;
        }
        require_unit_interval(C, "intake_confidence", self.intake_confidence)?;
        Ok(())
    }

    /// Flagged concerns, ignoring the `"none"` marker.
    pub fn active_risk_flags(&self) -> impl Iterator<Item = &str> {
        self.risk_flags
            .iter()
            .map(String::as_str)
            .filter(|flag| *flag != NO_RISK_FLAG)
    }

    pub fn has_risk_flag(&self, flag: &str) -> bool {
        flag != NO_RISK_FLAG && self.risk_flags.contains(flag)
    }
}
