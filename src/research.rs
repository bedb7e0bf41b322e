use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::HttpConfig;
use crate::types::{EngineError, KnowledgeMatch, ResearchSynthesis, Result, SearchResult};

#[derive(Debug, Clone)]
pub struct ResearchRequest {
    pub topic: String,
    pub focus_keyword: Option<String>,
    pub include_external_search: bool,
    pub include_knowledge_base: bool,
    pub original_brief: Option<String>,
}

impl ResearchRequest {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            focus_keyword: None,
            include_external_search: true,
            include_knowledge_base: true,
            original_brief: None,
        }
    }
}

/// External search-engine branch of research.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn provider_name(&self) -> String;

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>>;
}

/// Internal knowledge-base semantic-lookup branch of research.
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    fn source_name(&self) -> String;

    async fn semantic_lookup(&self, query: &str, limit: usize) -> Result<Vec<KnowledgeMatch>>;
}

/// Merges the two research branches into one synthesis. Each branch is
/// independently fallible; a branch failure degrades the synthesis instead
/// of failing the stage. Both branches failing still returns a valid empty
/// synthesis so the orchestrator can proceed in degraded mode.
pub struct ResearchAdapter {
    search: Option<Arc<dyn SearchProvider>>,
    knowledge_base: Option<Arc<dyn KnowledgeBase>>,
    kb_limit: usize,
}

impl ResearchAdapter {
    pub fn new(
        search: Option<Arc<dyn SearchProvider>>,
        knowledge_base: Option<Arc<dyn KnowledgeBase>>,
    ) -> Self {
        Self {
            search,
            knowledge_base,
            kb_limit: 5,
        }
    }

    pub async fn run(&self, request: &ResearchRequest) -> ResearchSynthesis {
        let query = match &request.focus_keyword {
            Some(keyword) => format!("{} {}", request.topic, keyword),
            None => request.topic.clone(),
        };

        let search_branch = async {
            if !request.include_external_search {
                return Ok(Vec::new());
            }
            match &self.search {
                Some(provider) => provider.search(&query).await,
                None => Ok(Vec::new()),
            }
        };
        let kb_branch = async {
            if !request.include_knowledge_base {
                return Ok(Vec::new());
            }
            match &self.knowledge_base {
                Some(kb) => kb.semantic_lookup(&query, self.kb_limit).await,
                None => Ok(Vec::new()),
            }
        };

        let (search_result, kb_result) = tokio::join!(search_branch, kb_branch);

        let mut degraded = false;
        let search_results = match search_result {
            Ok(results) => results,
            Err(e) => {
                warn!("external search branch failed, degrading: {}", e);
                degraded = true;
                Vec::new()
            }
        };
        let knowledge_base_results = match kb_result {
            Ok(results) => results,
            Err(e) => {
                warn!("knowledge base branch failed, degrading: {}", e);
                degraded = true;
                Vec::new()
            }
        };

        let synthesis = synthesize(request, search_results, knowledge_base_results, degraded);
        info!(
            "research synthesis for '{}': {} search results, {} kb matches, degraded={}",
            request.topic,
            synthesis.search_results.len(),
            synthesis.knowledge_base_results.len(),
            synthesis.degraded
        );
        synthesis
    }
}

/// Derive the unique angle and content gaps from whatever the branches
/// returned. Best-effort: the synthesis stays useful even when sparse.
fn synthesize(
    request: &ResearchRequest,
    search_results: Vec<SearchResult>,
    knowledge_base_results: Vec<KnowledgeMatch>,
    degraded: bool,
) -> ResearchSynthesis {
    let unique_angle = if let Some(top) = knowledge_base_results.first() {
        format!(
            "Cover '{}' building on internal expertise around '{}'.",
            request.topic, top.title
        )
    } else if let Some(top) = search_results.first() {
        format!(
            "Cover '{}' with a sharper take than '{}'.",
            request.topic, top.title
        )
    } else {
        format!("Cover '{}' from first principles.", request.topic)
    };

    let mut content_gaps: Vec<String> = search_results
        .iter()
        .take(3)
        .map(|r| format!("Angle not yet covered internally: {}", r.title))
        .collect();
    if let Some(brief) = &request.original_brief {
        content_gaps.push(format!("Brief requirement: {}", brief));
    }

    ResearchSynthesis {
        search_results,
        knowledge_base_results,
        unique_angle,
        content_gaps,
        degraded,
    }
}

/// Search provider backed by an HTTP JSON endpoint.
pub struct HttpSearchProvider {
    client: Client,
    endpoint: String,
}

impl HttpSearchProvider {
    pub fn new(endpoint: String, config: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl SearchProvider for HttpSearchProvider {
    fn provider_name(&self) -> String {
        format!("http-search ({})", self.endpoint)
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        debug!("searching for '{}'", query);
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query)])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::ExternalService {
                service: "search".to_string(),
                message: format!("HTTP {}", status),
            });
        }
        let body = response.json::<Value>().await?;
        let results = body
            .get("results")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        Some(SearchResult {
                            title: item.get("title")?.as_str()?.to_string(),
                            url: item.get("url")?.as_str()?.to_string(),
                            snippet: item
                                .get("snippet")
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(results)
    }
}

/// Fixed-response search provider for tests and the demo binary.
pub struct StaticSearchProvider {
    results: Vec<SearchResult>,
    fail: bool,
}

impl StaticSearchProvider {
    pub fn new(results: Vec<SearchResult>) -> Self {
        Self { results, fail: false }
    }

    pub fn failing() -> Self {
        Self {
            results: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl SearchProvider for StaticSearchProvider {
    fn provider_name(&self) -> String {
        "static-search".to_string()
    }

    async fn search(&self, _query: &str) -> Result<Vec<SearchResult>> {
        if self.fail {
            return Err(EngineError::ExternalService {
                service: "search".to_string(),
                message: "scripted failure".to_string(),
            });
        }
        Ok(self.results.clone())
    }
}

/// Fixed-response knowledge base for tests and the demo binary.
pub struct StaticKnowledgeBase {
    matches: Vec<KnowledgeMatch>,
    fail: bool,
}

impl StaticKnowledgeBase {
    pub fn new(matches: Vec<KnowledgeMatch>) -> Self {
        Self { matches, fail: false }
    }

    pub fn failing() -> Self {
        Self {
            matches: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl KnowledgeBase for StaticKnowledgeBase {
    fn source_name(&self) -> String {
        "static-kb".to_string()
    }

    async fn semantic_lookup(&self, _query: &str, limit: usize) -> Result<Vec<KnowledgeMatch>> {
        if self.fail {
            return Err(EngineError::ExternalService {
                service: "knowledge-base".to_string(),
                message: "scripted failure".to_string(),
            });
        }
        Ok(self.matches.iter().take(limit).cloned().collect())
    }
}
