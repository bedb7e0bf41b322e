use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::exponential::ExponentialBackoff;
use reqwest::Client;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::HttpConfig;
use crate::types::{ArticleSections, EngineError, PipelineStage, Result};

/// The generation task a request is for. Each stage issues exactly one
/// task kind, so mocks and endpoints can dispatch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenerationTask {
    Draft,
    Humanize,
    HumanizeSection,
    Seo,
}

impl GenerationTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationTask::Draft => "draft",
            GenerationTask::Humanize => "humanize",
            GenerationTask::HumanizeSection => "humanize_section",
            GenerationTask::Seo => "seo",
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub task: GenerationTask,
    pub prompt: String,
    pub context: Value,
}

/// Seam over the external text-generation service. Responses are untrusted
/// JSON; each stage validates shape explicitly before accepting anything.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn generator_name(&self) -> String;

    async fn generate(&self, request: &GenerationRequest) -> Result<Value>;
}

/// HTTP-backed generator posting JSON to a single endpoint, retrying
/// transient failures with exponential backoff.
pub struct HttpTextGenerator {
    client: Client,
    endpoint: String,
    config: HttpConfig,
}

impl HttpTextGenerator {
    pub fn new(endpoint: String, config: HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            endpoint,
            config,
        })
    }

    async fn post_once(&self, request: &GenerationRequest) -> Result<Value> {
        let payload = json!({
            "task": request.task.as_str(),
            "prompt": request.prompt,
            "context": request.context,
        });
        let response = self.client.post(&self.endpoint).json(&payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::ExternalService {
                service: "text-generation".to_string(),
                message: format!("HTTP {}", status),
            });
        }
        let body = response.json::<Value>().await?;
        Ok(body)
    }
}

#[async_trait]
impl TextGenerator for HttpTextGenerator {
    fn generator_name(&self) -> String {
        format!("http ({})", self.endpoint)
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Value> {
        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: Duration::from_secs(self.config.retry_delay_seconds),
            initial_interval: Duration::from_secs(self.config.retry_delay_seconds),
            max_interval: Duration::from_secs(self.config.retry_delay_seconds * 16),
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_secs(self.config.retry_delay_seconds * 60)),
            ..Default::default()
        };

        let mut last_error = None;
        for attempt in 0..=self.config.max_retries {
            match self.post_once(request).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(
                        "generation attempt {} failed for task {}: {}",
                        attempt + 1,
                        request.task.as_str(),
                        e
                    );
                    last_error = Some(e);
                    if attempt < self.config.max_retries {
                        if let Some(delay) = backoff.next_backoff() {
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| EngineError::ExternalService {
            service: "text-generation".to_string(),
            message: "exhausted retries".to_string(),
        }))
    }
}

/// Mock generator for development and testing. Produces deterministic JSON
/// per task; tasks can be scripted to fail or return malformed payloads.
pub struct MockTextGenerator {
    name: String,
    response_delay_ms: u64,
    fail_tasks: HashSet<GenerationTask>,
    malformed_tasks: HashSet<GenerationTask>,
    calls: Arc<AtomicUsize>,
}

impl MockTextGenerator {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            response_delay_ms: 0,
            fail_tasks: HashSet::new(),
            malformed_tasks: HashSet::new(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.response_delay_ms = delay_ms;
        self
    }

    pub fn failing_on(mut self, task: GenerationTask) -> Self {
        self.fail_tasks.insert(task);
        self
    }

    pub fn malformed_on(mut self, task: GenerationTask) -> Self {
        self.malformed_tasks.insert(task);
        self
    }

    /// Total calls issued, across all tasks. Lets tests assert that
    /// precondition failures never reach the generation service.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn canned_response(&self, request: &GenerationRequest) -> Value {
        let topic = request
            .context
            .get("topic")
            .and_then(Value::as_str)
            .unwrap_or("the topic");
        match request.task {
            GenerationTask::Draft => json!({
                "introduction": format!("An introduction to {topic}, covering why it matters."),
                "body": format!("The main discussion of {topic} in depth, with practical guidance and worked examples."),
                "conclusion": format!("Closing thoughts on {topic} and where to go next."),
            }),
            GenerationTask::Humanize => json!({
                "introduction": format!("Let's talk about {topic} and why you should care."),
                "body": format!("Here's what {topic} really means day to day, with the details people actually ask about."),
                "conclusion": format!("That's the long and short of {topic}."),
                "score": 86.0,
            }),
            GenerationTask::HumanizeSection => json!({
                "text": format!("A friendlier take: {}", request.prompt),
                "score": 82.0,
            }),
            GenerationTask::Seo => json!({
                "meta_title": format!("{topic}: Complete Guide"),
                "meta_description": format!("Everything you need to know about {topic}."),
                "slug": crate::config::slugify(topic),
                "focus_keyword": topic.to_lowercase(),
                "secondary_keywords": [format!("{} guide", topic.to_lowercase()), format!("{} explained", topic.to_lowercase())],
                "schema": {"@type": "Article", "headline": topic},
            }),
        }
    }
}

#[async_trait]
impl TextGenerator for MockTextGenerator {
    fn generator_name(&self) -> String {
        format!("mock ({})", self.name)
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.response_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.response_delay_ms)).await;
        }
        if self.fail_tasks.contains(&request.task) {
            return Err(EngineError::ExternalService {
                service: "text-generation".to_string(),
                message: format!("scripted failure for task {}", request.task.as_str()),
            });
        }
        if self.malformed_tasks.contains(&request.task) {
            debug!("returning scripted malformed payload for {}", request.task.as_str());
            return Ok(json!({"unexpected": "shape"}));
        }
        Ok(self.canned_response(request))
    }
}

/// Pull a required non-empty string field out of a generation response.
pub fn require_str(value: &Value, key: &str, stage: PipelineStage) -> Result<String> {
    match value.get(key).and_then(Value::as_str) {
        Some(s) if !s.trim().is_empty() => Ok(s.to_string()),
        Some(_) => Err(EngineError::malformed(stage, format!("field '{key}' is empty"))),
        None => Err(EngineError::malformed(stage, format!("missing string field '{key}'"))),
    }
}

pub fn optional_f64(value: &Value, key: &str) -> Option<f64> {
    value.get(key).and_then(Value::as_f64)
}

pub fn optional_str_array(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Validate a response into the three named article sections.
pub fn parse_sections(value: &Value, stage: PipelineStage) -> Result<ArticleSections> {
    Ok(ArticleSections {
        introduction: require_str(value, "introduction", stage)?,
        body: require_str(value, "body", stage)?,
        conclusion: require_str(value, "conclusion", stage)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_sections_rejects_missing_fields() {
        let value = json!({"introduction": "a", "body": "b"});
        let err = parse_sections(&value, PipelineStage::Draft).unwrap_err();
        assert!(matches!(err, EngineError::MalformedOutput { .. }));
    }

    #[test]
    fn parse_sections_rejects_empty_fields() {
        let value = json!({"introduction": "a", "body": "  ", "conclusion": "c"});
        assert!(parse_sections(&value, PipelineStage::Draft).is_err());
    }
}
