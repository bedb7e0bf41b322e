use chrono::Utc;
use silopress::types::*;
use silopress::{
    ArticleLocks, ContentStore, EngineConfig, InterlinkEngine, LinkHealthScorer, MemoryStore,
    ScanScope,
};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();
}

fn published_article(title: &str, slug: &str, body: &str) -> Article {
    let now = Utc::now();
    Article {
        id: Uuid::new_v4(),
        slug: slug.to_string(),
        title: title.to_string(),
        introduction: format!("Introduction for {title}."),
        body: body.to_string(),
        conclusion: "Closing notes.".to_string(),
        content_type: ContentType::Supporting,
        silo_key: Some("bpo-salary-compensation".to_string()),
        depth: Some(1),
        parent_id: None,
        is_published: true,
        published_at: Some(now),
        hero_media_url: None,
        section_media_urls: Vec::new(),
        generation_metadata: None,
        created_at: now,
        updated_at: now,
    }
}

fn config() -> EngineConfig {
    EngineConfig::default().with_silo_slug("bpo-salary-compensation", "bpo-salary-compensation")
}

fn engine(store: Arc<MemoryStore>) -> InterlinkEngine {
    InterlinkEngine::new(store, config(), ArticleLocks::new())
}

async fn seed_pair(store: &MemoryStore) -> (Article, Article) {
    let source = published_article(
        "Salary Negotiation Tactics",
        "salary-negotiation-tactics",
        "Knowing your 13th Month entitlement changes how you negotiate base pay.",
    );
    let target = published_article(
        "13th Month Pay Computation",
        "13th-month-pay-computation",
        "The formula, proration rules, and payout timing.",
    );
    store.upsert_article(&source).await.unwrap();
    store.upsert_article(&target).await.unwrap();
    (source, target)
}

#[tokio::test]
async fn scan_emits_verbatim_pending_suggestions() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let (source, target) = seed_pair(&store).await;

    let report = engine(store.clone()).scan(ScanScope::All).await.unwrap();
    assert_eq!(report.articles_scanned, 2);
    assert!(report.suggestions_created >= 1);

    let suggestions = store
        .list_suggestions(Some(SuggestionStatus::Pending))
        .await
        .unwrap();
    let suggestion = suggestions
        .iter()
        .find(|s| s.source_article_id == source.id && s.target_article_id == target.id)
        .unwrap();

    // The stored phrase is lifted from the source, casing included.
    assert!(source.full_text().contains(&suggestion.original_text));
    assert_eq!(suggestion.original_text, suggestion.anchor_text);
    assert!(suggestion.similarity_score >= 0.3);
    info!("suggestion phrase: '{}'", suggestion.original_text);
}

#[tokio::test]
async fn rescan_does_not_duplicate_pending_pairs() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    seed_pair(&store).await;
    let engine = engine(store.clone());

    engine.scan(ScanScope::All).await.unwrap();
    let after_first = store.list_suggestions(None).await.unwrap().len();

    let report = engine.scan(ScanScope::All).await.unwrap();
    assert_eq!(report.suggestions_created, 0);
    assert_eq!(store.list_suggestions(None).await.unwrap().len(), after_first);
}

#[tokio::test]
async fn approval_links_the_first_occurrence_exactly_once() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let (source, target) = seed_pair(&store).await;
    let engine = engine(store.clone());

    engine.scan(ScanScope::All).await.unwrap();
    let suggestion = store
        .list_suggestions(Some(SuggestionStatus::Pending))
        .await
        .unwrap()
        .into_iter()
        .find(|s| s.source_article_id == source.id && s.target_article_id == target.id)
        .unwrap();

    let applied = engine.approve(suggestion.id).await.unwrap();
    assert!(applied);

    let linked = store.get_article(source.id).await.unwrap();
    let expected = format!(
        "[{}](/bpo-salary-compensation/{})",
        suggestion.anchor_text, target.slug
    );
    assert!(linked.full_text().contains(&expected));
    assert_eq!(linked.full_text().matches("](").count(), 1);
    assert_eq!(
        store.get_suggestion(suggestion.id).await.unwrap().status,
        SuggestionStatus::Approved
    );

    // Second approval finds no unlinked occurrence left.
    let applied_again = engine.approve(suggestion.id).await.unwrap();
    assert!(!applied_again);
    let unchanged = store.get_article(source.id).await.unwrap();
    assert_eq!(unchanged.full_text(), linked.full_text());
}

#[tokio::test]
async fn rejected_suggestions_cannot_be_approved() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    seed_pair(&store).await;
    let engine = engine(store.clone());

    engine.scan(ScanScope::All).await.unwrap();
    let suggestion = store
        .list_suggestions(Some(SuggestionStatus::Pending))
        .await
        .unwrap()
        .remove(0);

    engine.reject(suggestion.id).await.unwrap();
    let err = engine.approve(suggestion.id).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation { .. }));

    // A rejected suggestion also cannot be rejected twice.
    assert!(engine.reject(suggestion.id).await.is_err());
}

#[tokio::test]
async fn scan_scope_rejects_missing_article() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    seed_pair(&store).await;

    let err = engine(store)
        .scan(ScanScope::One(Uuid::new_v4()))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation { .. }));
}

#[tokio::test]
async fn scan_scope_rejects_unpublished_source() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    seed_pair(&store).await;

    let mut draft = published_article(
        "Unreleased Guide",
        "unreleased-guide",
        "Mentions 13th Month rules before going live.",
    );
    draft.is_published = false;
    draft.published_at = None;
    store.upsert_article(&draft).await.unwrap();

    let err = engine(store.clone())
        .scan(ScanScope::One(draft.id))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation { .. }));
    assert!(store
        .list_suggestions(None)
        .await
        .unwrap()
        .iter()
        .all(|s| s.source_article_id != draft.id));
}

#[tokio::test]
async fn high_threshold_suppresses_weak_candidates() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    seed_pair(&store).await;

    let mut config = config();
    config.interlink.similarity_threshold = 0.99;
    let engine = InterlinkEngine::new(store.clone(), config, ArticleLocks::new());

    let report = engine.scan(ScanScope::All).await.unwrap();
    assert_eq!(report.suggestions_created, 0);
}

#[tokio::test]
async fn approved_links_feed_the_health_scores() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let (source, target) = seed_pair(&store).await;
    let engine = engine(store.clone());

    engine.scan(ScanScope::All).await.unwrap();
    let suggestion = store
        .list_suggestions(Some(SuggestionStatus::Pending))
        .await
        .unwrap()
        .into_iter()
        .find(|s| s.source_article_id == source.id && s.target_article_id == target.id)
        .unwrap();
    engine.approve(suggestion.id).await.unwrap();

    let scorer = LinkHealthScorer::new(store.clone(), config().link_health);
    let snapshots = scorer.per_article().await.unwrap();

    let target_health = snapshots.iter().find(|s| s.article_id == target.id).unwrap();
    assert_eq!(target_health.inbound_links, 1);
    assert!(!target_health.orphaned);

    let source_health = snapshots.iter().find(|s| s.article_id == source.id).unwrap();
    assert_eq!(source_health.outbound_links, 1);
    assert!(source_health.orphaned);
    // An inbound link is worth more than an outbound one.
    assert!(target_health.score > source_health.score);

    let overview = scorer.overview().await.unwrap();
    assert_eq!(overview.total_articles, 2);
    assert_eq!(overview.orphaned_articles, 1);

    let (inbound, outbound) = scorer.links_for_article(target.id).await.unwrap();
    assert_eq!(inbound.len(), 1);
    assert!(outbound.is_empty());
}
