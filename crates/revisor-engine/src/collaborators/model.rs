//! Model-backed producer and evaluator speaking JSON through an [`LlmClient`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::json;

use revisor_llm::{extract_json_object, LlmClient, Request};
use revisor_types::{Contract, Draft, Result, Review, ReviewOrigin, ValidationError};

use crate::collaborator::{DraftEvaluator, DraftProducer};
use crate::context::Brief;

const SYSTEM_PROMPT: &str = "You are a precise JSON-producing assistant.";
const TEMPERATURE: f32 = 0.2;

const DRAFT_SHAPE: &str = r#"{"topic": str, "summary": str, "strengths": [str], "growth_areas": [str], "action_plan": [{"action": str, "rationale": str, "time_horizon": "this week" | "this month" | "quarter", "success_metric": str}], "reflection_questions": [str], "tone_check": "supportive" | "direct" | "balanced"}"#;

const REVIEW_SHAPE: &str = r#"{"overall_score": 0-100, "pass": bool, "criterion_scores": {"relevance": 0-100, "personalization": 0-100, "actionability": 0-100, "safety": 0-100, "guideline_adherence": 0-100}, "major_issues": [str], "minor_issues": [str], "revision_instructions": [str], "confidence": 0.0-1.0}"#;

/// Shared request plumbing for both model collaborators.
#[derive(Clone)]
struct ModelCaller {
    client: Arc<LlmClient>,
    model: String,
}

impl ModelCaller {
    /// Unreadable replies are `MalformedOutput`; a JSON object that does not fit
    /// `contract` is a `Validation` error.
    async fn call<T: DeserializeOwned>(&self, source_name: &str, contract: Contract, prompt: String) -> Result<T> {
        let request = Request::prompt(self.model.clone(), SYSTEM_PROMPT, prompt).with_temperature(TEMPERATURE);
        let response = self.client.complete(&request).await?;
        let value = extract_json_object(&response.text, source_name)?;
        let parsed = serde_json::from_value(value)
            .map_err(|e| ValidationError::new(contract, "document", format!("does not match the {contract} shape: {e}")))?;
        Ok(parsed)
    }
}

fn brief_json(brief: &Brief) -> Result<String> {
    Ok(serde_json::to_string_pretty(brief.packet.as_ref())?)
}

// ---------------------------------------------------------------------------
// ModelProducer
// ---------------------------------------------------------------------------

pub struct ModelProducer {
    caller: ModelCaller,
}

impl ModelProducer {
    /// An empty `model` uses the provider's default model.
    pub fn new(client: Arc<LlmClient>, model: impl Into<String>) -> Self {
        Self {
            caller: ModelCaller {
                client,
                model: model.into(),
            },
        }
    }
}

#[async_trait]
impl DraftProducer for ModelProducer {
    fn name(&self) -> &str {
        "model-producer"
    }

    async fn generate(&self, brief: &Brief) -> Result<Draft> {
        let prompt = format!(
            "Write a personal development feedback draft for the input packet below.\n\
             Follow the guidelines and safety rules, include at least {} action items{}, \
             and reply with one JSON object shaped like:\n{DRAFT_SHAPE}\n\nInput packet:\n{}",
            brief.quality_targets().min_action_items,
            if brief.quality_targets().requires_metrics {
                " each with a success metric"
            } else {
                ""
            },
            brief_json(brief)?,
        );
        self.caller.call(self.name(), Contract::Draft, prompt).await
    }

    async fn revise(&self, prior: &Draft, instructions: &[String], brief: &Brief) -> Result<Draft> {
        let numbered: Vec<String> = instructions
            .iter()
            .enumerate()
            .map(|(i, s)| format!("{}. {s}", i + 1))
            .collect();
        let prompt = format!(
            "Revise the draft below by applying every revision instruction. Keep what already \
             works. Reply with one JSON object shaped like:\n{DRAFT_SHAPE}\n\n\
             Revision instructions:\n{}\n\nPrevious draft:\n{}\n\nInput packet:\n{}",
            numbered.join("\n"),
            serde_json::to_string_pretty(prior)?,
            brief_json(brief)?,
        );
        self.caller.call(self.name(), Contract::Draft, prompt).await
    }
}

// ---------------------------------------------------------------------------
// ModelEvaluator
// ---------------------------------------------------------------------------

pub struct ModelEvaluator {
    caller: ModelCaller,
}

impl ModelEvaluator {
    pub fn new(client: Arc<LlmClient>, model: impl Into<String>) -> Self {
        Self {
            caller: ModelCaller {
                client,
                model: model.into(),
            },
        }
    }
}

#[async_trait]
impl DraftEvaluator for ModelEvaluator {
    fn name(&self) -> &str {
        "model-evaluator"
    }

    async fn evaluate(&self, draft: &Draft, brief: &Brief) -> Result<Review> {
        let rubric = json!({
            "pass_threshold": brief.pass_threshold,
            "must_include": brief.guidelines().must_include,
            "style_rules": brief.guidelines().style_rules,
            "safety_rules": brief.guidelines().safety_rules,
        });
        let prompt = format!(
            "Score the draft against the rubric. pass is true only when overall_score reaches \
             pass_threshold and there are no major issues. If the draft needs human or crisis \
             support, say so in a major issue that mentions escalation. Reply with one JSON \
             object shaped like:\n{REVIEW_SHAPE}\n\nRubric:\n{}\n\nDraft:\n{}",
            serde_json::to_string_pretty(&rubric)?,
            serde_json::to_string_pretty(draft)?,
        );
        let mut review: Review = self.caller.call(self.name(), Contract::Review, prompt).await?;
        review.origin = ReviewOrigin::Evaluator;
        Ok(review)
    }
}
