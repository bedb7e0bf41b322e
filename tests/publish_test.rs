use silopress::types::*;
use silopress::{ArticleLocks, ContentStore, EngineConfig, MemoryStore, PublishRequest, Publisher};
use std::sync::Arc;
use tracing::info;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();
}

fn sections(topic: &str) -> ArticleSections {
    ArticleSections {
        introduction: format!("Why {topic} matters."),
        body: format!("Everything about {topic}, in depth."),
        conclusion: format!("Where to go next with {topic}."),
    }
}

/// A pipeline that already went through every production stage.
fn review_pipeline(topic: &str, silo_key: Option<&str>, slug: &str) -> Pipeline {
    let mut pipeline = Pipeline::new(topic.to_string(), silo_key.map(str::to_string));
    pipeline.stage = PipelineStage::Review;
    pipeline.humanized = Some(sections(topic));
    pipeline.seo = Some(SeoMeta {
        meta_title: topic.to_string(),
        meta_description: format!("All about {topic}."),
        slug: slug.to_string(),
        focus_keyword: topic.to_lowercase(),
        secondary_keywords: Vec::new(),
        schema_markup: serde_json::Value::Null,
    });
    pipeline.media = Some(MediaRefs {
        hero_url: Some("https://cdn.example.com/media/hero".to_string()),
        section_urls: vec!["https://cdn.example.com/media/s1".to_string()],
        manual_upload_required: false,
    });
    pipeline
}

fn publisher(store: Arc<MemoryStore>) -> Publisher {
    let config = EngineConfig::default()
        .with_silo_slug("bpo-salary-compensation", "bpo-salary-compensation");
    Publisher::new(store, config, ArticleLocks::new())
}

#[tokio::test]
async fn pillar_lands_on_silo_root() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let pipeline = review_pipeline(
        "BPO Salary and Compensation",
        Some("bpo-salary-compensation"),
        "bpo-salary-and-compensation-guide",
    );
    store.insert_pipeline(&pipeline).await.unwrap();

    let outcome = publisher(store.clone())
        .publish(PublishRequest::new(pipeline.id).as_pillar())
        .await
        .unwrap();

    // The pillar takes the silo slug; its own SEO slug is ignored.
    assert_eq!(outcome.slug, "bpo-salary-compensation");
    assert_eq!(outcome.url, "/bpo-salary-compensation");
    assert!(outcome.is_published);

    let silo = store
        .get_silo_by_key("bpo-salary-compensation")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(silo.pillar_article_id, Some(outcome.article_id));

    let article = store.get_article(outcome.article_id).await.unwrap();
    assert_eq!(article.content_type, ContentType::Pillar);
    assert_eq!(article.depth, Some(0));
}

#[tokio::test]
async fn supporting_article_nests_under_silo() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let pipeline = review_pipeline(
        "13th Month Pay Computation",
        Some("bpo-salary-compensation"),
        "13th-month-pay-guide",
    );
    store.insert_pipeline(&pipeline).await.unwrap();

    let outcome = publisher(store.clone())
        .publish(PublishRequest::new(pipeline.id))
        .await
        .unwrap();

    assert_eq!(outcome.url, "/bpo-salary-compensation/13th-month-pay-guide");
    let article = store.get_article(outcome.article_id).await.unwrap();
    assert_eq!(article.content_type, ContentType::Supporting);
    assert!(article.is_published);
    assert!(article.published_at.is_some());
}

#[tokio::test]
async fn slug_with_path_separators_is_sanitized() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let pipeline = review_pipeline(
        "13th Month Pay Computation",
        Some("bpo-salary-compensation"),
        "guides/13th-month-pay-guide",
    );
    store.insert_pipeline(&pipeline).await.unwrap();

    let outcome = publisher(store.clone())
        .publish(PublishRequest::new(pipeline.id))
        .await
        .unwrap();

    assert_eq!(outcome.slug, "13th-month-pay-guide");
    assert_eq!(outcome.url, "/bpo-salary-compensation/13th-month-pay-guide");
}

#[tokio::test]
async fn siloless_article_publishes_flat() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let pipeline = review_pipeline("Standalone Topic", None, "standalone-topic");
    store.insert_pipeline(&pipeline).await.unwrap();

    let outcome = publisher(store.clone())
        .publish(PublishRequest::new(pipeline.id))
        .await
        .unwrap();

    assert_eq!(outcome.url, "/standalone-topic");
    assert!(outcome.silo_slug.is_none());
}

#[tokio::test]
async fn pillar_without_silo_is_rejected() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let pipeline = review_pipeline("Orphan Pillar", None, "orphan-pillar");
    store.insert_pipeline(&pipeline).await.unwrap();

    let err = publisher(store)
        .publish(PublishRequest::new(pipeline.id).as_pillar())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation { .. }));
}

#[tokio::test]
async fn republish_reuses_the_same_article() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let pipeline = review_pipeline(
        "Night Differential",
        Some("bpo-salary-compensation"),
        "night-differential",
    );
    store.insert_pipeline(&pipeline).await.unwrap();
    let publisher = publisher(store.clone());

    let first = publisher.publish(PublishRequest::new(pipeline.id)).await.unwrap();

    // Rework a section and publish again.
    let mut updated = store.get_pipeline(pipeline.id).await.unwrap();
    let mut humanized = updated.humanized.clone().unwrap();
    humanized.body = "A fully reworked body.".to_string();
    updated.humanized = Some(humanized);
    store.update_pipeline(&updated).await.unwrap();

    let second = publisher.publish(PublishRequest::new(pipeline.id)).await.unwrap();

    assert_eq!(first.article_id, second.article_id);
    assert_eq!(store.list_published_articles().await.unwrap().len(), 1);
    let article = store.get_article(second.article_id).await.unwrap();
    assert_eq!(article.body, "A fully reworked body.");
    info!("republish kept article {}", article.id);
}

#[tokio::test]
async fn second_pillar_overwrites_the_first() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let publisher = publisher(store.clone());

    let first = review_pipeline(
        "Old Pillar",
        Some("bpo-salary-compensation"),
        "ignored-slug-a",
    );
    store.insert_pipeline(&first).await.unwrap();
    let first_outcome = publisher
        .publish(PublishRequest::new(first.id).as_pillar())
        .await
        .unwrap();

    let second = review_pipeline(
        "New Pillar",
        Some("bpo-salary-compensation"),
        "ignored-slug-b",
    );
    store.insert_pipeline(&second).await.unwrap();
    let second_outcome = publisher
        .publish(PublishRequest::new(second.id).as_pillar())
        .await
        .unwrap();

    // Both pillars resolve to the silo slug, so the row is shared and the
    // newer publish wins its content.
    assert_eq!(first_outcome.slug, second_outcome.slug);
    let article = store.get_article(second_outcome.article_id).await.unwrap();
    assert_eq!(article.title, "New Pillar");

    let silo = store
        .get_silo_by_key("bpo-salary-compensation")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(silo.pillar_article_id, Some(second_outcome.article_id));
}

#[tokio::test]
async fn draft_save_is_allowed_early_but_publish_is_not() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let mut pipeline = Pipeline::new("Early Draft".to_string(), None);
    pipeline.stage = PipelineStage::Draft;
    pipeline.draft = Some(sections("Early Draft"));
    store.insert_pipeline(&pipeline).await.unwrap();
    let publisher = publisher(store.clone());

    let err = publisher
        .publish(PublishRequest::new(pipeline.id))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation { .. }));

    let outcome = publisher
        .publish(PublishRequest::new(pipeline.id).as_draft())
        .await
        .unwrap();
    assert!(!outcome.is_published);

    let article = store.get_article(outcome.article_id).await.unwrap();
    assert!(!article.is_published);
    assert!(article.published_at.is_none());

    let pipeline = store.get_pipeline(pipeline.id).await.unwrap();
    assert_eq!(pipeline.status, PipelineStatus::Draft);
    assert_eq!(pipeline.stage, PipelineStage::Draft);
}

#[tokio::test]
async fn publishing_stamps_the_pipeline() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let pipeline = review_pipeline("Final Pay Timeline", None, "final-pay-timeline");
    store.insert_pipeline(&pipeline).await.unwrap();

    let outcome = publisher(store.clone())
        .publish(PublishRequest::new(pipeline.id))
        .await
        .unwrap();

    let pipeline = store.get_pipeline(pipeline.id).await.unwrap();
    assert_eq!(pipeline.status, PipelineStatus::Published);
    assert_eq!(pipeline.stage, PipelineStage::Published);
    assert_eq!(pipeline.article_id, Some(outcome.article_id));
    assert!(pipeline
        .activity_log
        .iter()
        .any(|entry| entry.message.contains("published")));
}

#[tokio::test]
async fn colliding_publish_waits_for_the_existing_articles_lock() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let locks = ArticleLocks::new();
    let publisher = Arc::new(Publisher::new(
        store.clone(),
        EngineConfig::default(),
        locks.clone(),
    ));

    // An article from a different pipeline already owns the slug.
    let now = chrono::Utc::now();
    let existing = Article {
        id: uuid::Uuid::new_v4(),
        slug: "shared-slug".to_string(),
        title: "Seeded Article".to_string(),
        introduction: "Seeded intro.".to_string(),
        body: "Seeded body.".to_string(),
        conclusion: "Seeded conclusion.".to_string(),
        content_type: ContentType::Supporting,
        silo_key: None,
        depth: None,
        parent_id: None,
        is_published: true,
        published_at: Some(now),
        hero_media_url: None,
        section_media_urls: Vec::new(),
        generation_metadata: Some(uuid::Uuid::new_v4()),
        created_at: now,
        updated_at: now,
    };
    let existing_id = store.upsert_article(&existing).await.unwrap();

    let pipeline = review_pipeline("Shared Slug", None, "shared-slug");
    store.insert_pipeline(&pipeline).await.unwrap();

    // Hold the existing row's write lock, as interlink approval would.
    let guard = locks.lock(existing_id).await;
    let handle = tokio::spawn({
        let publisher = publisher.clone();
        let id = pipeline.id;
        async move { publisher.publish(PublishRequest::new(id)).await }
    });

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(!handle.is_finished());
    let untouched = store.get_article(existing_id).await.unwrap();
    assert_eq!(untouched.title, "Seeded Article");

    drop(guard);
    let outcome = handle.await.unwrap().unwrap();
    assert_eq!(outcome.article_id, existing_id);
    let rewritten = store.get_article(existing_id).await.unwrap();
    assert_eq!(rewritten.title, "Shared Slug");
}

#[tokio::test]
async fn raw_content_is_split_when_no_pipeline_sections_exist() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let mut pipeline = Pipeline::new("Imported Piece".to_string(), None);
    pipeline.stage = PipelineStage::Review;
    pipeline.seo = Some(SeoMeta {
        meta_title: "Imported Piece".to_string(),
        meta_description: "An imported article.".to_string(),
        slug: "imported-piece".to_string(),
        focus_keyword: "imported".to_string(),
        secondary_keywords: Vec::new(),
        schema_markup: serde_json::Value::Null,
    });
    pipeline.media = Some(MediaRefs::default());
    store.insert_pipeline(&pipeline).await.unwrap();

    let mut request = PublishRequest::new(pipeline.id);
    request.raw_content = Some(
        "Opening paragraph.\n\nMiddle paragraph one.\n\nMiddle paragraph two.\n\nClosing paragraph."
            .to_string(),
    );
    let outcome = publisher(store.clone()).publish(request).await.unwrap();

    let article = store.get_article(outcome.article_id).await.unwrap();
    assert!(!article.introduction.is_empty());
    assert!(!article.body.is_empty());
    assert!(!article.conclusion.is_empty());
}
