use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{sanitize_slug, slugify, EngineConfig};
use crate::sections::split_into_three;
use crate::store::{ArticleLocks, ContentStore};
use crate::types::{
    Article, ArticleSections, ContentType, EngineError, PipelineStage, PipelineStatus, Result,
    Silo,
};

/// Request to commit pipeline output into the content graph.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub pipeline_id: Uuid,
    /// Save as draft: allowed from any stage >= Draft, article stays
    /// unpublished.
    pub is_draft: bool,
    pub is_pillar: bool,
    pub hero_url: Option<String>,
    pub section_image_urls: Option<Vec<String>>,
    /// Explicit three-part content overriding pipeline artifacts.
    pub content_sections: Option<ArticleSections>,
    /// Unstructured content, split heuristically when no explicit or
    /// pipeline sections exist.
    pub raw_content: Option<String>,
}

impl PublishRequest {
    pub fn new(pipeline_id: Uuid) -> Self {
        Self {
            pipeline_id,
            is_draft: false,
            is_pillar: false,
            hero_url: None,
            section_image_urls: None,
            content_sections: None,
            raw_content: None,
        }
    }

    pub fn as_draft(mut self) -> Self {
        self.is_draft = true;
        self
    }

    pub fn as_pillar(mut self) -> Self {
        self.is_pillar = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct PublishOutcome {
    pub article_id: Uuid,
    pub slug: String,
    pub silo_slug: Option<String>,
    pub url: String,
    pub is_published: bool,
}

/// Resolve the public URL path for an article given its graph position.
/// The pillar is the silo's landing page: its path carries no
/// article-specific trailing segment.
pub fn resolve_url(content_type: ContentType, silo_slug: Option<&str>, article_slug: &str) -> String {
    match (content_type, silo_slug) {
        (ContentType::Pillar, Some(silo)) => format!("/{silo}"),
        (_, Some(silo)) => format!("/{silo}/{article_slug}"),
        (_, None) => format!("/{article_slug}"),
    }
}

/// URL for an already persisted article, using the configured silo slug
/// table with a key-derived fallback.
pub fn article_url(article: &Article, config: &EngineConfig) -> String {
    let silo_slug = article.silo_key.as_deref().map(|key| {
        config
            .silo_slug_for(key)
            .map(str::to_string)
            .unwrap_or_else(|| slugify(key))
    });
    resolve_url(article.content_type, silo_slug.as_deref(), &article.slug)
}

/// Commits orchestrator output into the content graph: resolves slug/URL,
/// upserts the article record, links pillar pointers, and re-targets the
/// same article on re-publish. Idempotent per pipeline.
pub struct Publisher {
    store: Arc<dyn ContentStore>,
    config: EngineConfig,
    locks: ArticleLocks,
}

impl Publisher {
    pub fn new(store: Arc<dyn ContentStore>, config: EngineConfig, locks: ArticleLocks) -> Self {
        Self { store, config, locks }
    }

    pub async fn publish(&self, request: PublishRequest) -> Result<PublishOutcome> {
        let pipeline = self.store.get_pipeline(request.pipeline_id).await?;

        if pipeline.cancelled {
            return Err(EngineError::validation(
                PipelineStage::Published,
                "pipeline is cancelled",
            ));
        }
        if pipeline.status == PipelineStatus::Failed {
            return Err(EngineError::validation(
                PipelineStage::Published,
                "pipeline is marked failed",
            ));
        }
        let minimum_stage = if request.is_draft {
            PipelineStage::Draft
        } else {
            PipelineStage::Review
        };
        if pipeline.stage < minimum_stage {
            return Err(EngineError::validation(
                PipelineStage::Published,
                format!(
                    "publish requires stage >= {} (currently at {})",
                    minimum_stage, pipeline.stage
                ),
            ));
        }

        let sections = self.resolve_sections(&request, &pipeline)?;
        let silo = match pipeline.selected_silo_key.as_deref() {
            Some(key) => Some(self.get_or_create_silo(key).await?),
            None => None,
        };
        let pillar_silo = match (request.is_pillar, &silo) {
            (true, Some(silo)) => Some(silo.clone()),
            (true, None) => {
                return Err(EngineError::validation(
                    PipelineStage::Published,
                    "a pillar article requires a silo",
                ))
            }
            (false, _) => None,
        };

        let title = pipeline
            .seo
            .as_ref()
            .map(|meta| meta.meta_title.clone())
            .unwrap_or_else(|| pipeline.topic.clone());

        let (slug, content_type) = if let Some(silo) = &pillar_silo {
            // The pillar takes the silo's canonical slug, never one derived
            // from its own title.
            (silo.slug.clone(), ContentType::Pillar)
        } else {
            let candidate = pipeline
                .seo
                .as_ref()
                .map(|meta| meta.slug.clone())
                .unwrap_or_else(|| slugify(&title));
            (sanitize_slug(&candidate), ContentType::Supporting)
        };
        if slug.is_empty() {
            return Err(EngineError::validation(
                PipelineStage::Published,
                "resolved slug is empty",
            ));
        }

        let silo_slug = silo.as_ref().map(|s| s.slug.clone());
        let url = resolve_url(content_type, silo_slug.as_deref(), &slug);

        let hero_url = request
            .hero_url
            .clone()
            .or_else(|| pipeline.media.as_ref().and_then(|m| m.hero_url.clone()));
        let mut section_media_urls = request
            .section_image_urls
            .clone()
            .or_else(|| pipeline.media.as_ref().map(|m| m.section_urls.clone()))
            .unwrap_or_default();
        section_media_urls.truncate(3);

        let is_published = !request.is_draft;
        let now = Utc::now();
        let article_id = if let Some(existing_id) = pipeline.article_id {
            // Idempotent per pipeline: re-publish re-targets the same row.
            let _lock = self.locks.lock(existing_id).await;
            let mut article = self.store.get_article(existing_id).await?;
            article.slug = slug.clone();
            article.title = title.clone();
            article.introduction = sections.introduction.clone();
            article.body = sections.body.clone();
            article.conclusion = sections.conclusion.clone();
            article.content_type = content_type;
            article.silo_key = pipeline.selected_silo_key.clone();
            article.is_published = is_published;
            if is_published && article.published_at.is_none() {
                article.published_at = Some(now);
            }
            article.hero_media_url = hero_url;
            article.section_media_urls = section_media_urls;
            self.store.update_article(&article).await?;
            existing_id
        } else {
            let collision = self.store.get_article_by_slug(&slug).await?;
            if let Some(collision) = &collision {
                if collision.generation_metadata != Some(pipeline.id) {
                    // Upsert-on-slug treats this as the same logical
                    // article; surfaced here so the collision is observable.
                    warn!(
                        "slug '{}' already belongs to article {} from a different pipeline ({:?}); overwriting",
                        slug, collision.id, collision.generation_metadata
                    );
                }
            }
            let article = Article {
                id: Uuid::new_v4(),
                slug: slug.clone(),
                title: title.clone(),
                introduction: sections.introduction.clone(),
                body: sections.body.clone(),
                conclusion: sections.conclusion.clone(),
                content_type,
                silo_key: pipeline.selected_silo_key.clone(),
                depth: Some(if request.is_pillar { 0 } else { 1 }),
                parent_id: silo.as_ref().and_then(|s| s.pillar_article_id),
                is_published,
                published_at: is_published.then_some(now),
                hero_media_url: hero_url,
                section_media_urls,
                generation_metadata: Some(pipeline.id),
                created_at: now,
                updated_at: now,
            };
            // The upsert keys on slug, so a collision rewrites the
            // existing row: that row's write lock is the one that matters.
            let lock_id = collision.as_ref().map(|c| c.id).unwrap_or(article.id);
            let _lock = self.locks.lock(lock_id).await;
            self.store.upsert_article(&article).await?
        };

        let mut pipeline = self.store.get_pipeline(request.pipeline_id).await?;
        if let Some(silo) = &pillar_silo {
            if let Some(previous) = silo.pillar_article_id {
                if previous != article_id {
                    // Last-write-wins, logged as an audit event rather than
                    // rejected.
                    warn!(
                        "silo '{}' pillar overwritten: {} -> {}",
                        silo.key, previous, article_id
                    );
                    pipeline.log_activity(
                        PipelineStage::Published,
                        format!("silo '{}' pillar overwritten ({} -> {})", silo.key, previous, article_id),
                    );
                }
            }
            self.store.set_silo_pillar(silo.id, article_id).await?;
        }

        pipeline.article_id = Some(article_id);
        pipeline.status = if request.is_draft {
            PipelineStatus::Draft
        } else {
            PipelineStatus::Published
        };
        if is_published {
            pipeline.stage = pipeline.stage.max(PipelineStage::Published);
        }
        pipeline.log_activity(
            PipelineStage::Published,
            format!(
                "{} as '{}' at {}",
                if is_published { "published" } else { "saved as draft" },
                slug,
                url
            ),
        );
        self.store.update_pipeline(&pipeline).await?;

        info!(
            "pipeline {} {} article {} at {}",
            request.pipeline_id,
            if is_published { "published" } else { "draft-saved" },
            article_id,
            url
        );

        Ok(PublishOutcome {
            article_id,
            slug,
            silo_slug,
            url,
            is_published,
        })
    }

    /// Section precedence: explicit request sections, then humanized, then
    /// draft, then a heuristic split of raw content.
    fn resolve_sections(
        &self,
        request: &PublishRequest,
        pipeline: &crate::types::Pipeline,
    ) -> Result<ArticleSections> {
        if let Some(sections) = &request.content_sections {
            return Ok(sections.clone());
        }
        if let Some(sections) = &pipeline.humanized {
            return Ok(sections.clone());
        }
        if let Some(sections) = &pipeline.draft {
            return Ok(sections.clone());
        }
        if let Some(raw) = &request.raw_content {
            let sections = split_into_three(raw);
            if !sections.is_empty() {
                return Ok(sections);
            }
        }
        Err(EngineError::validation(
            PipelineStage::Published,
            "no content sections available to publish",
        ))
    }

    async fn get_or_create_silo(&self, key: &str) -> Result<Silo> {
        if let Some(silo) = self.store.get_silo_by_key(key).await? {
            return Ok(silo);
        }
        let slug = self
            .config
            .silo_slug_for(key)
            .map(str::to_string)
            .unwrap_or_else(|| slugify(key));
        let silo = Silo {
            id: Uuid::new_v4(),
            key: key.to_string(),
            slug,
            name: humanize_key(key),
            pillar_article_id: None,
        };
        let id = self.store.upsert_silo(&silo).await?;
        info!("created silo '{}' with slug '{}'", key, silo.slug);
        Ok(Silo { id, ..silo })
    }
}

fn humanize_key(key: &str) -> String {
    key.split(|c: char| c == '-' || c == '_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pillar_url_has_no_trailing_segment() {
        let url = resolve_url(
            ContentType::Pillar,
            Some("bpo-salary-compensation"),
            "bpo-salary-compensation",
        );
        assert_eq!(url, "/bpo-salary-compensation");
    }

    #[test]
    fn supporting_url_nests_under_silo() {
        let url = resolve_url(
            ContentType::Supporting,
            Some("bpo-salary-compensation"),
            "13th-month-pay-guide",
        );
        assert_eq!(url, "/bpo-salary-compensation/13th-month-pay-guide");
    }

    #[test]
    fn siloless_url_is_flat() {
        let url = resolve_url(ContentType::Supporting, None, "standalone-article");
        assert_eq!(url, "/standalone-article");
    }

    #[test]
    fn humanize_key_title_cases() {
        assert_eq!(humanize_key("bpo-salary-compensation"), "Bpo Salary Compensation");
        assert_eq!(humanize_key("one_two"), "One Two");
    }
}
