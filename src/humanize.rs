use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::generation::{
    optional_f64, parse_sections, require_str, GenerationRequest, GenerationTask, TextGenerator,
};
use crate::types::{ArticleSections, PipelineStage, Result, SectionKind};

/// Target voice for humanization.
#[derive(Debug, Clone)]
pub struct VoiceProfile {
    pub persona: String,
    pub tone: String,
}

impl Default for VoiceProfile {
    fn default() -> Self {
        Self {
            persona: "experienced industry practitioner".to_string(),
            tone: "warm, direct, plain-spoken".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HumanizedDraft {
    pub sections: ArticleSections,
    /// Quality gate for review; never a hard publish blocker.
    pub score: f64,
}

/// Rewrites a draft into a target voice, producing a humanization score.
pub struct Humanizer {
    generator: Arc<dyn TextGenerator>,
    voice: VoiceProfile,
}

impl Humanizer {
    pub fn new(generator: Arc<dyn TextGenerator>, voice: VoiceProfile) -> Self {
        Self { generator, voice }
    }

    /// Rewrite the whole draft in one generation call.
    pub async fn humanize(&self, topic: &str, draft: &ArticleSections) -> Result<HumanizedDraft> {
        let request = GenerationRequest {
            task: GenerationTask::Humanize,
            prompt: format!(
                "Rewrite this article as {} with a {} tone.",
                self.voice.persona, self.voice.tone
            ),
            context: json!({
                "topic": topic,
                "introduction": draft.introduction,
                "body": draft.body,
                "conclusion": draft.conclusion,
            }),
        };

        let response = self.generator.generate(&request).await?;
        let sections = parse_sections(&response, PipelineStage::Humanize)?;
        let score = optional_f64(&response, "score")
            .map(|s| s.clamp(0.0, 100.0))
            .unwrap_or_else(|| fallback_score(draft, &sections));
        info!("humanized draft for '{}', score {:.1}", topic, score);
        Ok(HumanizedDraft { sections, score })
    }

    /// Improve a single section in place: one generation call for that
    /// section only. Returns the rewritten text and its section score.
    pub async fn humanize_section(
        &self,
        topic: &str,
        kind: SectionKind,
        text: &str,
    ) -> Result<(String, f64)> {
        let request = GenerationRequest {
            task: GenerationTask::HumanizeSection,
            prompt: text.to_string(),
            context: json!({
                "topic": topic,
                "section": kind.as_str(),
                "persona": self.voice.persona,
                "tone": self.voice.tone,
            }),
        };

        let response = self.generator.generate(&request).await?;
        let rewritten = require_str(&response, "text", PipelineStage::Humanize)?;
        let score = optional_f64(&response, "score")
            .map(|s| s.clamp(0.0, 100.0))
            .unwrap_or(50.0);
        Ok((rewritten, score))
    }
}

/// Heuristic score used when the service returns sections without one:
/// how much the text actually changed, scaled into a mid-band score.
fn fallback_score(draft: &ArticleSections, humanized: &ArticleSections) -> f64 {
    let before = draft.combined();
    let after = humanized.combined();
    if before == after {
        return 20.0;
    }
    let before_words: std::collections::HashSet<&str> = before.split_whitespace().collect();
    let after_words: std::collections::HashSet<&str> = after.split_whitespace().collect();
    if after_words.is_empty() {
        return 0.0;
    }
    let changed = after_words.difference(&before_words).count() as f64;
    let ratio = changed / after_words.len() as f64;
    (40.0 + ratio * 50.0).clamp(0.0, 100.0)
}
