use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::generation::{parse_sections, GenerationRequest, GenerationTask, TextGenerator};
use crate::types::{ArticleSections, PipelineStage, ResearchSynthesis, Result};

/// Produces the three-part article body from topic + research synthesis.
/// Pure transform: one generation call, validated into shape, no side
/// effects on pipeline state.
pub struct DraftGenerator {
    generator: Arc<dyn TextGenerator>,
}

impl DraftGenerator {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    pub async fn generate(
        &self,
        topic: &str,
        research: &ResearchSynthesis,
    ) -> Result<ArticleSections> {
        let prompt = build_draft_prompt(topic, research);
        let request = GenerationRequest {
            task: GenerationTask::Draft,
            prompt,
            context: json!({
                "topic": topic,
                "unique_angle": research.unique_angle,
                "content_gaps": research.content_gaps,
            }),
        };

        let response = self.generator.generate(&request).await?;
        let sections = parse_sections(&response, PipelineStage::Draft)?;
        info!(
            "drafted article for '{}' ({} chars)",
            topic,
            sections.combined().len()
        );
        Ok(sections)
    }
}

fn build_draft_prompt(topic: &str, research: &ResearchSynthesis) -> String {
    let mut prompt = format!(
        "Write a three-part article (introduction, body, conclusion) about: {topic}\n"
    );
    if !research.unique_angle.is_empty() {
        prompt.push_str(&format!("Unique angle: {}\n", research.unique_angle));
    }
    for gap in &research.content_gaps {
        prompt.push_str(&format!("Address gap: {gap}\n"));
    }
    for result in research.search_results.iter().take(3) {
        prompt.push_str(&format!("Reference: {} - {}\n", result.title, result.snippet));
    }
    prompt
}
