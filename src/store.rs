use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::types::{
    Article, EngineError, LinkSuggestion, Pipeline, Result, Silo, SuggestionStatus,
};

/// Persistence seam for pipelines, articles, silos, and link suggestions.
///
/// Pipeline updates carry an optimistic version check: the caller passes the
/// pipeline at the version it loaded, and the store rejects the write with
/// `StageConflict` if another writer got there first.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn insert_pipeline(&self, pipeline: &Pipeline) -> Result<()>;
    async fn get_pipeline(&self, id: Uuid) -> Result<Pipeline>;
    /// Persists the pipeline and bumps its version; fails with
    /// `StageConflict` if the stored version differs from `pipeline.version`.
    async fn update_pipeline(&self, pipeline: &Pipeline) -> Result<Pipeline>;
    async fn list_pipelines(&self) -> Result<Vec<Pipeline>>;

    async fn get_article(&self, id: Uuid) -> Result<Article>;
    async fn get_article_by_slug(&self, slug: &str) -> Result<Option<Article>>;
    /// Upsert keyed on slug; returns the id of the row written.
    async fn upsert_article(&self, article: &Article) -> Result<Uuid>;
    /// Full update of an existing article row by id.
    async fn update_article(&self, article: &Article) -> Result<()>;
    async fn update_article_content(
        &self,
        id: Uuid,
        introduction: &str,
        body: &str,
        conclusion: &str,
    ) -> Result<()>;
    async fn list_published_articles(&self) -> Result<Vec<Article>>;

    async fn get_silo_by_key(&self, key: &str) -> Result<Option<Silo>>;
    async fn upsert_silo(&self, silo: &Silo) -> Result<Uuid>;
    async fn set_silo_pillar(&self, silo_id: Uuid, article_id: Uuid) -> Result<()>;
    async fn list_silos(&self) -> Result<Vec<Silo>>;

    async fn insert_suggestion(&self, suggestion: &LinkSuggestion) -> Result<()>;
    async fn get_suggestion(&self, id: Uuid) -> Result<LinkSuggestion>;
    async fn set_suggestion_status(&self, id: Uuid, status: SuggestionStatus) -> Result<()>;
    async fn pending_suggestion_exists(&self, source: Uuid, target: Uuid) -> Result<bool>;
    async fn list_suggestions(&self, status: Option<SuggestionStatus>) -> Result<Vec<LinkSuggestion>>;
}

/// Registry of per-article write locks. The publisher and the interlink
/// approval step are the only two writers of article bodies and must not
/// run concurrently on the same article.
#[derive(Clone, Default)]
pub struct ArticleLocks {
    inner: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl ArticleLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, article_id: Uuid) -> OwnedMutexGuard<()> {
        let entry = {
            let mut map = self.inner.lock().await;
            map.entry(article_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        entry.lock_owned().await
    }
}

/// In-memory store backing tests and the demo binary.
#[derive(Default)]
pub struct MemoryStore {
    pipelines: RwLock<HashMap<Uuid, Pipeline>>,
    articles: RwLock<HashMap<Uuid, Article>>,
    silos: RwLock<HashMap<Uuid, Silo>>,
    suggestions: RwLock<HashMap<Uuid, LinkSuggestion>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn insert_pipeline(&self, pipeline: &Pipeline) -> Result<()> {
        let mut pipelines = self.pipelines.write().await;
        pipelines.insert(pipeline.id, pipeline.clone());
        debug!("inserted pipeline {}", pipeline.id);
        Ok(())
    }

    async fn get_pipeline(&self, id: Uuid) -> Result<Pipeline> {
        let pipelines = self.pipelines.read().await;
        pipelines
            .get(&id)
            .cloned()
            .ok_or(EngineError::PipelineNotFound { id })
    }

    async fn update_pipeline(&self, pipeline: &Pipeline) -> Result<Pipeline> {
        let mut pipelines = self.pipelines.write().await;
        let current = pipelines
            .get(&pipeline.id)
            .ok_or(EngineError::PipelineNotFound { id: pipeline.id })?;
        if current.version != pipeline.version {
            return Err(EngineError::StageConflict {
                id: pipeline.id,
                reason: format!(
                    "version mismatch: stored {}, caller {}",
                    current.version, pipeline.version
                ),
            });
        }
        let mut updated = pipeline.clone();
        updated.version += 1;
        updated.updated_at = chrono::Utc::now();
        pipelines.insert(updated.id, updated.clone());
        Ok(updated)
    }

    async fn list_pipelines(&self) -> Result<Vec<Pipeline>> {
        let pipelines = self.pipelines.read().await;
        let mut all: Vec<Pipeline> = pipelines.values().cloned().collect();
        all.sort_by_key(|p| p.created_at);
        Ok(all)
    }

    async fn get_article(&self, id: Uuid) -> Result<Article> {
        let articles = self.articles.read().await;
        articles
            .get(&id)
            .cloned()
            .ok_or(EngineError::ArticleNotFound { id })
    }

    async fn get_article_by_slug(&self, slug: &str) -> Result<Option<Article>> {
        let articles = self.articles.read().await;
        Ok(articles.values().find(|a| a.slug == slug).cloned())
    }

    async fn upsert_article(&self, article: &Article) -> Result<Uuid> {
        let mut articles = self.articles.write().await;
        let existing = articles
            .values()
            .find(|a| a.slug == article.slug)
            .cloned();
        let mut stored = article.clone();
        if let Some(existing) = existing {
            // Same semantics as the Postgres ON CONFLICT clause: the row
            // identity, creation time, and first publication time survive.
            stored.id = existing.id;
            stored.created_at = existing.created_at;
            stored.published_at = existing.published_at.or(article.published_at);
        }
        stored.updated_at = chrono::Utc::now();
        let id = stored.id;
        articles.insert(id, stored);
        Ok(id)
    }

    async fn update_article(&self, article: &Article) -> Result<()> {
        let mut articles = self.articles.write().await;
        if !articles.contains_key(&article.id) {
            return Err(EngineError::ArticleNotFound { id: article.id });
        }
        let mut stored = article.clone();
        stored.updated_at = chrono::Utc::now();
        articles.insert(stored.id, stored);
        Ok(())
    }

    async fn update_article_content(
        &self,
        id: Uuid,
        introduction: &str,
        body: &str,
        conclusion: &str,
    ) -> Result<()> {
        let mut articles = self.articles.write().await;
        let article = articles
            .get_mut(&id)
            .ok_or(EngineError::ArticleNotFound { id })?;
        article.introduction = introduction.to_string();
        article.body = body.to_string();
        article.conclusion = conclusion.to_string();
        article.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn list_published_articles(&self) -> Result<Vec<Article>> {
        let articles = self.articles.read().await;
        let mut published: Vec<Article> = articles
            .values()
            .filter(|a| a.is_published)
            .cloned()
            .collect();
        published.sort_by_key(|a| a.created_at);
        Ok(published)
    }

    async fn get_silo_by_key(&self, key: &str) -> Result<Option<Silo>> {
        let silos = self.silos.read().await;
        Ok(silos.values().find(|s| s.key == key).cloned())
    }

    async fn upsert_silo(&self, silo: &Silo) -> Result<Uuid> {
        let mut silos = self.silos.write().await;
        let existing_id = silos.values().find(|s| s.key == silo.key).map(|s| s.id);
        let id = existing_id.unwrap_or(silo.id);
        let mut stored = silo.clone();
        stored.id = id;
        silos.insert(id, stored);
        Ok(id)
    }

    async fn set_silo_pillar(&self, silo_id: Uuid, article_id: Uuid) -> Result<()> {
        let mut silos = self.silos.write().await;
        let silo = silos
            .get_mut(&silo_id)
            .ok_or_else(|| EngineError::Persistence(format!("silo not found: {silo_id}")))?;
        silo.pillar_article_id = Some(article_id);
        Ok(())
    }

    async fn list_silos(&self) -> Result<Vec<Silo>> {
        let silos = self.silos.read().await;
        Ok(silos.values().cloned().collect())
    }

    async fn insert_suggestion(&self, suggestion: &LinkSuggestion) -> Result<()> {
        let mut suggestions = self.suggestions.write().await;
        suggestions.insert(suggestion.id, suggestion.clone());
        Ok(())
    }

    async fn get_suggestion(&self, id: Uuid) -> Result<LinkSuggestion> {
        let suggestions = self.suggestions.read().await;
        suggestions
            .get(&id)
            .cloned()
            .ok_or(EngineError::SuggestionNotFound { id })
    }

    async fn set_suggestion_status(&self, id: Uuid, status: SuggestionStatus) -> Result<()> {
        let mut suggestions = self.suggestions.write().await;
        let suggestion = suggestions
            .get_mut(&id)
            .ok_or(EngineError::SuggestionNotFound { id })?;
        suggestion.status = status;
        Ok(())
    }

    async fn pending_suggestion_exists(&self, source: Uuid, target: Uuid) -> Result<bool> {
        let suggestions = self.suggestions.read().await;
        Ok(suggestions.values().any(|s| {
            s.source_article_id == source
                && s.target_article_id == target
                && s.status == SuggestionStatus::Pending
        }))
    }

    async fn list_suggestions(&self, status: Option<SuggestionStatus>) -> Result<Vec<LinkSuggestion>> {
        let suggestions = self.suggestions.read().await;
        let mut matching: Vec<LinkSuggestion> = suggestions
            .values()
            .filter(|s| status.map_or(true, |wanted| s.status == wanted))
            .cloned()
            .collect();
        matching.sort_by_key(|s| s.created_at);
        Ok(matching)
    }
}
