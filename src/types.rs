use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Production stages of the editorial pipeline, in strict forward order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PipelineStage {
    Idea,
    Research,
    Draft,
    Humanize,
    Seo,
    Media,
    Review,
    Published,
}

impl PipelineStage {
    /// The stage that must be complete before this one may run.
    pub fn predecessor(&self) -> Option<PipelineStage> {
        match self {
            PipelineStage::Idea => None,
            PipelineStage::Research => Some(PipelineStage::Idea),
            PipelineStage::Draft => Some(PipelineStage::Research),
            PipelineStage::Humanize => Some(PipelineStage::Draft),
            PipelineStage::Seo => Some(PipelineStage::Humanize),
            PipelineStage::Media => Some(PipelineStage::Seo),
            PipelineStage::Review => Some(PipelineStage::Media),
            PipelineStage::Published => Some(PipelineStage::Review),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Idea => "idea",
            PipelineStage::Research => "research",
            PipelineStage::Draft => "draft",
            PipelineStage::Humanize => "humanize",
            PipelineStage::Seo => "seo",
            PipelineStage::Media => "media",
            PipelineStage::Review => "review",
            PipelineStage::Published => "published",
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineStatus {
    InProgress,
    Draft,
    Published,
    Failed,
}

/// One entry in a pipeline's append-only activity log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub stage: PipelineStage,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// The three named parts of an article body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleSections {
    pub introduction: String,
    pub body: String,
    pub conclusion: String,
}

impl ArticleSections {
    pub fn combined(&self) -> String {
        format!("{}\n\n{}\n\n{}", self.introduction, self.body, self.conclusion)
    }

    pub fn is_empty(&self) -> bool {
        self.introduction.is_empty() && self.body.is_empty() && self.conclusion.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectionKind {
    Introduction,
    Body,
    Conclusion,
}

impl SectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKind::Introduction => "introduction",
            SectionKind::Body => "body",
            SectionKind::Conclusion => "conclusion",
        }
    }
}

/// A single result from the external search branch of research.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// A semantic match from the internal knowledge base.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeMatch {
    pub title: String,
    pub excerpt: String,
    pub score: f64,
}

/// Merged output of the research stage. Always a valid object: when both
/// branches fail it is empty with `degraded` set, never an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchSynthesis {
    pub search_results: Vec<SearchResult>,
    pub knowledge_base_results: Vec<KnowledgeMatch>,
    pub unique_angle: String,
    pub content_gaps: Vec<String>,
    pub degraded: bool,
}

/// SEO metadata derived from the humanized draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeoMeta {
    pub meta_title: String,
    pub meta_description: String,
    pub slug: String,
    pub focus_keyword: String,
    pub secondary_keywords: Vec<String>,
    pub schema_markup: serde_json::Value,
}

/// Durable media references produced by the media stage. Empty refs with
/// `manual_upload_required` set is a successful, degraded completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaRefs {
    pub hero_url: Option<String>,
    pub section_urls: Vec<String>,
    pub manual_upload_required: bool,
}

/// One production run from idea to published article. Owned exclusively by
/// the orchestrator and mutated only through stage-advance operations.
/// Never deleted, only marked failed or published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: Uuid,
    pub stage: PipelineStage,
    pub status: PipelineStatus,
    /// Optimistic concurrency counter, bumped on every persisted update.
    pub version: u64,
    pub topic: String,
    pub selected_silo_key: Option<String>,
    pub research: Option<ResearchSynthesis>,
    pub draft: Option<ArticleSections>,
    pub humanized: Option<ArticleSections>,
    pub humanization_score: Option<f64>,
    pub seo: Option<SeoMeta>,
    pub media: Option<MediaRefs>,
    pub article_id: Option<Uuid>,
    pub activity_log: Vec<ActivityEntry>,
    pub cancelled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Pipeline {
    pub fn new(topic: String, selected_silo_key: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            stage: PipelineStage::Idea,
            status: PipelineStatus::InProgress,
            version: 0,
            topic,
            selected_silo_key,
            research: None,
            draft: None,
            humanized: None,
            humanization_score: None,
            seo: None,
            media: None,
            article_id: None,
            activity_log: Vec::new(),
            cancelled: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn log_activity(&mut self, stage: PipelineStage, message: impl Into<String>) {
        self.activity_log.push(ActivityEntry {
            stage,
            timestamp: Utc::now(),
            message: message.into(),
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentType {
    Pillar,
    Supporting,
    Hub,
}

/// A published or drafted content unit in the content graph.
/// Created and updated only by the publisher; its body is additionally
/// mutated by interlink approval (under the per-article write lock).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub introduction: String,
    pub body: String,
    pub conclusion: String,
    pub content_type: ContentType,
    pub silo_key: Option<String>,
    pub depth: Option<u32>,
    /// Back-reference only, never an ownership edge.
    pub parent_id: Option<Uuid>,
    pub is_published: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub hero_media_url: Option<String>,
    pub section_media_urls: Vec<String>,
    /// Originating pipeline id.
    pub generation_metadata: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Article {
    pub fn full_text(&self) -> String {
        format!("{}\n\n{}\n\n{}", self.introduction, self.body, self.conclusion)
    }
}

/// A topic cluster anchored by at most one pillar article.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Silo {
    pub id: Uuid,
    pub key: String,
    pub slug: String,
    pub name: String,
    pub pillar_article_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuggestionStatus {
    Pending,
    Approved,
    Rejected,
}

/// A proposed internal link between two articles, pending human approval.
/// `original_text` is guaranteed verbatim in the source body at suggestion
/// time; at most one pending suggestion per (source, target) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkSuggestion {
    pub id: Uuid,
    pub source_article_id: Uuid,
    pub target_article_id: Uuid,
    pub original_text: String,
    pub anchor_text: String,
    pub similarity_score: f64,
    pub status: SuggestionStatus,
    pub created_at: DateTime<Utc>,
}

/// Per-article connectivity snapshot. Derived on demand, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleLinkHealth {
    pub article_id: Uuid,
    pub slug: String,
    pub inbound_links: usize,
    pub outbound_links: usize,
    pub orphaned: bool,
    pub score: f64,
}

/// Site-wide connectivity snapshot. Derived on demand, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkHealthOverview {
    pub total_articles: usize,
    pub avg_link_health: f64,
    pub well_linked_articles: usize,
    pub articles_needing_attention: usize,
    pub needs_attention_percent: f64,
    pub orphaned_articles: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("external service '{service}' failed: {message}")]
    ExternalService { service: String, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed generation output at stage {stage}: {reason}")]
    MalformedOutput { stage: String, reason: String },

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("validation failed at stage {stage}: {reason}")]
    Validation { stage: String, reason: String },

    #[error("pipeline not found: {id}")]
    PipelineNotFound { id: Uuid },

    #[error("article not found: {id}")]
    ArticleNotFound { id: Uuid },

    #[error("suggestion not found: {id}")]
    SuggestionNotFound { id: Uuid },

    #[error("stage conflict on pipeline {id}: {reason}")]
    StageConflict { id: Uuid, reason: String },

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    General(String),
}

impl EngineError {
    pub fn validation(stage: PipelineStage, reason: impl Into<String>) -> Self {
        EngineError::Validation {
            stage: stage.to_string(),
            reason: reason.into(),
        }
    }

    pub fn malformed(stage: PipelineStage, reason: impl Into<String>) -> Self {
        EngineError::MalformedOutput {
            stage: stage.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
