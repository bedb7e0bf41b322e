use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::config::sanitize_slug;
use crate::generation::{
    optional_str_array, require_str, GenerationRequest, GenerationTask, TextGenerator,
};
use crate::types::{ArticleSections, PipelineStage, Result, SeoMeta};

/// Derives meta title/description, canonical slug, keywords, and
/// structured-data markup from the humanized draft. One generation call,
/// response validated into a flat key/value shape.
pub struct SeoOptimizer {
    generator: Arc<dyn TextGenerator>,
}

impl SeoOptimizer {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    pub async fn optimize(
        &self,
        topic: &str,
        sections: &ArticleSections,
        focus_keyword: Option<&str>,
    ) -> Result<SeoMeta> {
        let request = GenerationRequest {
            task: GenerationTask::Seo,
            prompt: format!("Derive SEO metadata for an article about: {topic}"),
            context: json!({
                "topic": topic,
                "focus_keyword": focus_keyword,
                "introduction": sections.introduction,
                "body": sections.body,
                "conclusion": sections.conclusion,
            }),
        };

        let response = self.generator.generate(&request).await?;

        let meta_title = require_str(&response, "meta_title", PipelineStage::Seo)?;
        let meta_description = require_str(&response, "meta_description", PipelineStage::Seo)?;
        let raw_slug = require_str(&response, "slug", PipelineStage::Seo)?;
        let slug = sanitize_slug(&raw_slug);
        if slug.is_empty() {
            return Err(crate::types::EngineError::malformed(
                PipelineStage::Seo,
                format!("slug candidate '{raw_slug}' sanitized to nothing"),
            ));
        }
        let focus = require_str(&response, "focus_keyword", PipelineStage::Seo)?;
        let secondary_keywords = optional_str_array(&response, "secondary_keywords");
        let schema_markup = response
            .get("schema")
            .cloned()
            .unwrap_or(serde_json::Value::Null);

        info!("seo metadata derived for '{}': slug '{}'", topic, slug);
        Ok(SeoMeta {
            meta_title,
            meta_description,
            slug,
            focus_keyword: focus,
            secondary_keywords,
            schema_markup,
        })
    }
}
