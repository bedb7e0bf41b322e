use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::config::LinkHealthConfig;
use crate::store::ContentStore;
use crate::types::{Article, ArticleLinkHealth, LinkHealthOverview, LinkSuggestion, Result, SuggestionStatus};

/// Quantifies content-graph connectivity from approved internal links.
/// Every snapshot is recomputed from current graph state on demand; it is
/// never the system of record.
pub struct LinkHealthScorer {
    store: Arc<dyn ContentStore>,
    config: LinkHealthConfig,
}

impl LinkHealthScorer {
    pub fn new(store: Arc<dyn ContentStore>, config: LinkHealthConfig) -> Self {
        Self { store, config }
    }

    /// Per-article connectivity snapshot for every published article.
    pub async fn per_article(&self) -> Result<Vec<ArticleLinkHealth>> {
        let articles = self.store.list_published_articles().await?;
        let approved = self
            .store
            .list_suggestions(Some(SuggestionStatus::Approved))
            .await?;

        let mut inbound: HashMap<Uuid, usize> = HashMap::new();
        let mut outbound: HashMap<Uuid, usize> = HashMap::new();
        for suggestion in &approved {
            *inbound.entry(suggestion.target_article_id).or_default() += 1;
            *outbound.entry(suggestion.source_article_id).or_default() += 1;
        }

        Ok(articles
            .iter()
            .map(|article| {
                score_article(
                    article,
                    inbound.get(&article.id).copied().unwrap_or(0),
                    outbound.get(&article.id).copied().unwrap_or(0),
                    &self.config,
                )
            })
            .collect())
    }

    /// Site-wide aggregate: average score, well-linked vs needs-attention
    /// counts, and the percentage needing attention.
    pub async fn overview(&self) -> Result<LinkHealthOverview> {
        let snapshots = self.per_article().await?;
        let total_articles = snapshots.len();
        if total_articles == 0 {
            return Ok(LinkHealthOverview {
                total_articles: 0,
                avg_link_health: 0.0,
                well_linked_articles: 0,
                articles_needing_attention: 0,
                needs_attention_percent: 0.0,
                orphaned_articles: 0,
            });
        }

        let avg_link_health =
            snapshots.iter().map(|s| s.score).sum::<f64>() / total_articles as f64;
        let well_linked_articles = snapshots
            .iter()
            .filter(|s| s.score >= self.config.well_linked_threshold)
            .count();
        let articles_needing_attention = total_articles - well_linked_articles;
        let orphaned_articles = snapshots.iter().filter(|s| s.orphaned).count();

        let overview = LinkHealthOverview {
            total_articles,
            avg_link_health,
            well_linked_articles,
            articles_needing_attention,
            needs_attention_percent: articles_needing_attention as f64 * 100.0
                / total_articles as f64,
            orphaned_articles,
        };
        info!(
            "link health overview: {} articles, avg {:.1}, {} need attention ({:.0}%)",
            overview.total_articles,
            overview.avg_link_health,
            overview.articles_needing_attention,
            overview.needs_attention_percent
        );
        Ok(overview)
    }

    /// Approved links targeting / originating from one article, for
    /// drill-down views.
    pub async fn links_for_article(
        &self,
        article_id: Uuid,
    ) -> Result<(Vec<LinkSuggestion>, Vec<LinkSuggestion>)> {
        let approved = self
            .store
            .list_suggestions(Some(SuggestionStatus::Approved))
            .await?;
        let inbound = approved
            .iter()
            .filter(|s| s.target_article_id == article_id)
            .cloned()
            .collect();
        let outbound = approved
            .iter()
            .filter(|s| s.source_article_id == article_id)
            .cloned()
            .collect();
        Ok((inbound, outbound))
    }
}

/// Blend link counts with recency: inbound links dominate, outbound links
/// count for less, and recently published articles get a decaying grace
/// bonus so new content is not immediately flagged.
fn score_article(
    article: &Article,
    inbound: usize,
    outbound: usize,
    config: &LinkHealthConfig,
) -> ArticleLinkHealth {
    let link_component = (inbound as f64 * 15.0 + outbound as f64 * 5.0).min(70.0);

    let age_days = article
        .published_at
        .map(|published| (Utc::now() - published).num_days().max(0))
        .unwrap_or(0) as f64;
    let half_life = config.recency_half_life_days.max(1) as f64;
    let recency_component = 30.0 * 0.5_f64.powf(age_days / half_life);

    ArticleLinkHealth {
        article_id: article.id,
        slug: article.slug.clone(),
        inbound_links: inbound,
        outbound_links: outbound,
        orphaned: inbound == 0,
        score: (link_component + recency_component).clamp(0.0, 100.0),
    }
}
