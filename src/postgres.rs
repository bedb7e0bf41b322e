use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Pool, Postgres, Row};
use tracing::info;
use uuid::Uuid;

use crate::store::ContentStore;
use crate::types::{
    Article, ContentType, EngineError, LinkSuggestion, Pipeline, PipelineStage, PipelineStatus,
    Result, Silo, SuggestionStatus,
};

/// Postgres-backed store. Complex stage artifacts are stored as JSONB;
/// the schema lives under `migrations/`.
pub struct PgStore {
    db: Pool<Postgres>,
}

impl PgStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        let db = PgPool::connect(database_url).await?;
        Ok(Self { db })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.db)
            .await
            .map_err(|e| EngineError::Persistence(e.to_string()))?;
        info!("database migrations applied");
        Ok(())
    }
}

fn stage_from_str(raw: &str) -> Result<PipelineStage> {
    Ok(match raw {
        "idea" => PipelineStage::Idea,
        "research" => PipelineStage::Research,
        "draft" => PipelineStage::Draft,
        "humanize" => PipelineStage::Humanize,
        "seo" => PipelineStage::Seo,
        "media" => PipelineStage::Media,
        "review" => PipelineStage::Review,
        "published" => PipelineStage::Published,
        other => return Err(EngineError::Persistence(format!("unknown stage '{other}'"))),
    })
}

fn status_as_str(status: PipelineStatus) -> &'static str {
    match status {
        PipelineStatus::InProgress => "in_progress",
        PipelineStatus::Draft => "draft",
        PipelineStatus::Published => "published",
        PipelineStatus::Failed => "failed",
    }
}

fn status_from_str(raw: &str) -> Result<PipelineStatus> {
    Ok(match raw {
        "in_progress" => PipelineStatus::InProgress,
        "draft" => PipelineStatus::Draft,
        "published" => PipelineStatus::Published,
        "failed" => PipelineStatus::Failed,
        other => return Err(EngineError::Persistence(format!("unknown status '{other}'"))),
    })
}

fn content_type_as_str(content_type: ContentType) -> &'static str {
    match content_type {
        ContentType::Pillar => "pillar",
        ContentType::Supporting => "supporting",
        ContentType::Hub => "hub",
    }
}

fn content_type_from_str(raw: &str) -> Result<ContentType> {
    Ok(match raw {
        "pillar" => ContentType::Pillar,
        "supporting" => ContentType::Supporting,
        "hub" => ContentType::Hub,
        other => {
            return Err(EngineError::Persistence(format!(
                "unknown content type '{other}'"
            )))
        }
    })
}

fn suggestion_status_as_str(status: SuggestionStatus) -> &'static str {
    match status {
        SuggestionStatus::Pending => "pending",
        SuggestionStatus::Approved => "approved",
        SuggestionStatus::Rejected => "rejected",
    }
}

fn suggestion_status_from_str(raw: &str) -> Result<SuggestionStatus> {
    Ok(match raw {
        "pending" => SuggestionStatus::Pending,
        "approved" => SuggestionStatus::Approved,
        "rejected" => SuggestionStatus::Rejected,
        other => {
            return Err(EngineError::Persistence(format!(
                "unknown suggestion status '{other}'"
            )))
        }
    })
}

fn json_opt<T: serde::de::DeserializeOwned>(
    row: &PgRow,
    column: &str,
) -> Result<Option<T>> {
    let value: Option<serde_json::Value> = row.try_get(column)?;
    match value {
        Some(v) if !v.is_null() => Ok(Some(serde_json::from_value(v)?)),
        _ => Ok(None),
    }
}

fn row_to_pipeline(row: &PgRow) -> Result<Pipeline> {
    let stage_raw: String = row.try_get("stage")?;
    let status_raw: String = row.try_get("status")?;
    let version: i64 = row.try_get("version")?;
    let activity_log: serde_json::Value = row.try_get("activity_log")?;
    Ok(Pipeline {
        id: row.try_get("id")?,
        stage: stage_from_str(&stage_raw)?,
        status: status_from_str(&status_raw)?,
        version: version as u64,
        topic: row.try_get("topic")?,
        selected_silo_key: row.try_get("selected_silo_key")?,
        research: json_opt(row, "research")?,
        draft: json_opt(row, "draft")?,
        humanized: json_opt(row, "humanized")?,
        humanization_score: row.try_get("humanization_score")?,
        seo: json_opt(row, "seo")?,
        media: json_opt(row, "media")?,
        article_id: row.try_get("article_id")?,
        activity_log: serde_json::from_value(activity_log)?,
        cancelled: row.try_get("cancelled")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

fn row_to_article(row: &PgRow) -> Result<Article> {
    let content_type_raw: String = row.try_get("content_type")?;
    let section_media: serde_json::Value = row.try_get("section_media_urls")?;
    let depth: Option<i32> = row.try_get("depth")?;
    Ok(Article {
        id: row.try_get("id")?,
        slug: row.try_get("slug")?,
        title: row.try_get("title")?,
        introduction: row.try_get("introduction")?,
        body: row.try_get("body")?,
        conclusion: row.try_get("conclusion")?,
        content_type: content_type_from_str(&content_type_raw)?,
        silo_key: row.try_get("silo_key")?,
        depth: depth.map(|d| d as u32),
        parent_id: row.try_get("parent_id")?,
        is_published: row.try_get("is_published")?,
        published_at: row.try_get("published_at")?,
        hero_media_url: row.try_get("hero_media_url")?,
        section_media_urls: serde_json::from_value(section_media)?,
        generation_metadata: row.try_get("generation_metadata")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

fn row_to_silo(row: &PgRow) -> Result<Silo> {
    Ok(Silo {
        id: row.try_get("id")?,
        key: row.try_get("key")?,
        slug: row.try_get("slug")?,
        name: row.try_get("name")?,
        pillar_article_id: row.try_get("pillar_article_id")?,
    })
}

fn row_to_suggestion(row: &PgRow) -> Result<LinkSuggestion> {
    let status_raw: String = row.try_get("status")?;
    Ok(LinkSuggestion {
        id: row.try_get("id")?,
        source_article_id: row.try_get("source_article_id")?,
        target_article_id: row.try_get("target_article_id")?,
        original_text: row.try_get("original_text")?,
        anchor_text: row.try_get("anchor_text")?,
        similarity_score: row.try_get("similarity_score")?,
        status: suggestion_status_from_str(&status_raw)?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

#[async_trait]
impl ContentStore for PgStore {
    async fn insert_pipeline(&self, pipeline: &Pipeline) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pipelines (id, stage, status, version, topic, selected_silo_key,
                research, draft, humanized, humanization_score, seo, media, article_id,
                activity_log, cancelled, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(pipeline.id)
        .bind(pipeline.stage.as_str())
        .bind(status_as_str(pipeline.status))
        .bind(pipeline.version as i64)
        .bind(&pipeline.topic)
        .bind(&pipeline.selected_silo_key)
        .bind(serde_json::to_value(&pipeline.research)?)
        .bind(serde_json::to_value(&pipeline.draft)?)
        .bind(serde_json::to_value(&pipeline.humanized)?)
        .bind(pipeline.humanization_score)
        .bind(serde_json::to_value(&pipeline.seo)?)
        .bind(serde_json::to_value(&pipeline.media)?)
        .bind(pipeline.article_id)
        .bind(serde_json::to_value(&pipeline.activity_log)?)
        .bind(pipeline.cancelled)
        .bind(pipeline.created_at)
        .bind(pipeline.updated_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn get_pipeline(&self, id: Uuid) -> Result<Pipeline> {
        let row = sqlx::query("SELECT * FROM pipelines WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        match row {
            Some(row) => row_to_pipeline(&row),
            None => Err(EngineError::PipelineNotFound { id }),
        }
    }

    async fn update_pipeline(&self, pipeline: &Pipeline) -> Result<Pipeline> {
        let result = sqlx::query(
            r#"
            UPDATE pipelines
            SET stage = $1, status = $2, version = version + 1, topic = $3,
                selected_silo_key = $4, research = $5, draft = $6, humanized = $7,
                humanization_score = $8, seo = $9, media = $10, article_id = $11,
                activity_log = $12, cancelled = $13, updated_at = $14
            WHERE id = $15 AND version = $16
            "#,
        )
        .bind(pipeline.stage.as_str())
        .bind(status_as_str(pipeline.status))
        .bind(&pipeline.topic)
        .bind(&pipeline.selected_silo_key)
        .bind(serde_json::to_value(&pipeline.research)?)
        .bind(serde_json::to_value(&pipeline.draft)?)
        .bind(serde_json::to_value(&pipeline.humanized)?)
        .bind(pipeline.humanization_score)
        .bind(serde_json::to_value(&pipeline.seo)?)
        .bind(serde_json::to_value(&pipeline.media)?)
        .bind(pipeline.article_id)
        .bind(serde_json::to_value(&pipeline.activity_log)?)
        .bind(pipeline.cancelled)
        .bind(Utc::now())
        .bind(pipeline.id)
        .bind(pipeline.version as i64)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            // Disambiguate missing row from optimistic-check failure.
            let exists = sqlx::query("SELECT 1 FROM pipelines WHERE id = $1")
                .bind(pipeline.id)
                .fetch_optional(&self.db)
                .await?
                .is_some();
            if exists {
                return Err(EngineError::StageConflict {
                    id: pipeline.id,
                    reason: format!("version {} is stale", pipeline.version),
                });
            }
            return Err(EngineError::PipelineNotFound { id: pipeline.id });
        }
        self.get_pipeline(pipeline.id).await
    }

    async fn list_pipelines(&self) -> Result<Vec<Pipeline>> {
        let rows = sqlx::query("SELECT * FROM pipelines ORDER BY created_at")
            .fetch_all(&self.db)
            .await?;
        rows.iter().map(row_to_pipeline).collect()
    }

    async fn get_article(&self, id: Uuid) -> Result<Article> {
        let row = sqlx::query("SELECT * FROM articles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        match row {
            Some(row) => row_to_article(&row),
            None => Err(EngineError::ArticleNotFound { id }),
        }
    }

    async fn get_article_by_slug(&self, slug: &str) -> Result<Option<Article>> {
        let row = sqlx::query("SELECT * FROM articles WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.db)
            .await?;
        row.map(|r| row_to_article(&r)).transpose()
    }

    async fn upsert_article(&self, article: &Article) -> Result<Uuid> {
        let row = sqlx::query(
            r#"
            INSERT INTO articles (id, slug, title, introduction, body, conclusion,
                content_type, silo_key, depth, parent_id, is_published, published_at,
                hero_media_url, section_media_urls, generation_metadata, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (slug) DO UPDATE SET
                title = EXCLUDED.title,
                introduction = EXCLUDED.introduction,
                body = EXCLUDED.body,
                conclusion = EXCLUDED.conclusion,
                content_type = EXCLUDED.content_type,
                silo_key = EXCLUDED.silo_key,
                depth = EXCLUDED.depth,
                parent_id = EXCLUDED.parent_id,
                is_published = EXCLUDED.is_published,
                published_at = COALESCE(articles.published_at, EXCLUDED.published_at),
                hero_media_url = EXCLUDED.hero_media_url,
                section_media_urls = EXCLUDED.section_media_urls,
                generation_metadata = EXCLUDED.generation_metadata,
                updated_at = EXCLUDED.updated_at
            RETURNING id
            "#,
        )
        .bind(article.id)
        .bind(&article.slug)
        .bind(&article.title)
        .bind(&article.introduction)
        .bind(&article.body)
        .bind(&article.conclusion)
        .bind(content_type_as_str(article.content_type))
        .bind(&article.silo_key)
        .bind(article.depth.map(|d| d as i32))
        .bind(article.parent_id)
        .bind(article.is_published)
        .bind(article.published_at)
        .bind(&article.hero_media_url)
        .bind(serde_json::to_value(&article.section_media_urls)?)
        .bind(article.generation_metadata)
        .bind(article.created_at)
        .bind(article.updated_at)
        .fetch_one(&self.db)
        .await?;
        Ok(row.try_get("id")?)
    }

    async fn update_article(&self, article: &Article) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE articles
            SET slug = $1, title = $2, introduction = $3, body = $4, conclusion = $5,
                content_type = $6, silo_key = $7, depth = $8, parent_id = $9,
                is_published = $10, published_at = $11, hero_media_url = $12,
                section_media_urls = $13, updated_at = $14
            WHERE id = $15
            "#,
        )
        .bind(&article.slug)
        .bind(&article.title)
        .bind(&article.introduction)
        .bind(&article.body)
        .bind(&article.conclusion)
        .bind(content_type_as_str(article.content_type))
        .bind(&article.silo_key)
        .bind(article.depth.map(|d| d as i32))
        .bind(article.parent_id)
        .bind(article.is_published)
        .bind(article.published_at)
        .bind(&article.hero_media_url)
        .bind(serde_json::to_value(&article.section_media_urls)?)
        .bind(Utc::now())
        .bind(article.id)
        .execute(&self.db)
        .await?;
        if result.rows_affected() == 0 {
            return Err(EngineError::ArticleNotFound { id: article.id });
        }
        Ok(())
    }

    async fn update_article_content(
        &self,
        id: Uuid,
        introduction: &str,
        body: &str,
        conclusion: &str,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE articles
            SET introduction = $1, body = $2, conclusion = $3, updated_at = $4
            WHERE id = $5
            "#,
        )
        .bind(introduction)
        .bind(body)
        .bind(conclusion)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.db)
        .await?;
        if result.rows_affected() == 0 {
            return Err(EngineError::ArticleNotFound { id });
        }
        Ok(())
    }

    async fn list_published_articles(&self) -> Result<Vec<Article>> {
        let rows = sqlx::query("SELECT * FROM articles WHERE is_published = true ORDER BY created_at")
            .fetch_all(&self.db)
            .await?;
        rows.iter().map(row_to_article).collect()
    }

    async fn get_silo_by_key(&self, key: &str) -> Result<Option<Silo>> {
        let row = sqlx::query(r#"SELECT * FROM silos WHERE key = $1"#)
            .bind(key)
            .fetch_optional(&self.db)
            .await?;
        row.map(|r| row_to_silo(&r)).transpose()
    }

    async fn upsert_silo(&self, silo: &Silo) -> Result<Uuid> {
        let row = sqlx::query(
            r#"
            INSERT INTO silos (id, key, slug, name, pillar_article_id)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (key) DO UPDATE SET
                slug = EXCLUDED.slug,
                name = EXCLUDED.name
            RETURNING id
            "#,
        )
        .bind(silo.id)
        .bind(&silo.key)
        .bind(&silo.slug)
        .bind(&silo.name)
        .bind(silo.pillar_article_id)
        .fetch_one(&self.db)
        .await?;
        Ok(row.try_get("id")?)
    }

    async fn set_silo_pillar(&self, silo_id: Uuid, article_id: Uuid) -> Result<()> {
        let result = sqlx::query("UPDATE silos SET pillar_article_id = $1 WHERE id = $2")
            .bind(article_id)
            .bind(silo_id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(EngineError::Persistence(format!("silo not found: {silo_id}")));
        }
        Ok(())
    }

    async fn list_silos(&self) -> Result<Vec<Silo>> {
        let rows = sqlx::query("SELECT * FROM silos ORDER BY key")
            .fetch_all(&self.db)
            .await?;
        rows.iter().map(row_to_silo).collect()
    }

    async fn insert_suggestion(&self, suggestion: &LinkSuggestion) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO link_suggestions (id, source_article_id, target_article_id,
                original_text, anchor_text, similarity_score, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(suggestion.id)
        .bind(suggestion.source_article_id)
        .bind(suggestion.target_article_id)
        .bind(&suggestion.original_text)
        .bind(&suggestion.anchor_text)
        .bind(suggestion.similarity_score)
        .bind(suggestion_status_as_str(suggestion.status))
        .bind(suggestion.created_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn get_suggestion(&self, id: Uuid) -> Result<LinkSuggestion> {
        let row = sqlx::query("SELECT * FROM link_suggestions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        match row {
            Some(row) => row_to_suggestion(&row),
            None => Err(EngineError::SuggestionNotFound { id }),
        }
    }

    async fn set_suggestion_status(&self, id: Uuid, status: SuggestionStatus) -> Result<()> {
        let result = sqlx::query("UPDATE link_suggestions SET status = $1 WHERE id = $2")
            .bind(suggestion_status_as_str(status))
            .bind(id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(EngineError::SuggestionNotFound { id });
        }
        Ok(())
    }

    async fn pending_suggestion_exists(&self, source: Uuid, target: Uuid) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT 1 FROM link_suggestions
            WHERE source_article_id = $1 AND target_article_id = $2 AND status = 'pending'
            LIMIT 1
            "#,
        )
        .bind(source)
        .bind(target)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.is_some())
    }

    async fn list_suggestions(&self, status: Option<SuggestionStatus>) -> Result<Vec<LinkSuggestion>> {
        let rows = if let Some(status) = status {
            sqlx::query("SELECT * FROM link_suggestions WHERE status = $1 ORDER BY created_at")
                .bind(suggestion_status_as_str(status))
                .fetch_all(&self.db)
                .await?
        } else {
            sqlx::query("SELECT * FROM link_suggestions ORDER BY created_at")
                .fetch_all(&self.db)
                .await?
        };
        rows.iter().map(row_to_suggestion).collect()
    }
}
