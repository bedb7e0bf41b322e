use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::config::HttpConfig;
use crate::types::{EngineError, MediaRefs, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MediaConstraints {
    pub aspect_ratio: Option<String>,
    pub max_duration_seconds: Option<u32>,
    pub style: Option<String>,
}

/// Output of one provider attempt: either a remote URL (possibly already
/// durable) or inline bytes that still need uploading.
#[derive(Debug, Clone)]
pub enum GeneratedAsset {
    Remote { url: String, permanent: bool },
    Inline { bytes: Vec<u8>, content_type: String },
}

/// One media generation provider in an ordered fallback chain.
#[async_trait]
pub trait MediaProvider: Send + Sync {
    fn provider_name(&self) -> String;

    async fn generate(
        &self,
        prompt: &str,
        kind: MediaKind,
        constraints: &MediaConstraints,
    ) -> Result<GeneratedAsset>;
}

/// Durable object storage for generated binaries. A successful asset is
/// uploaded exactly once; only the permanent URL is retained.
#[async_trait]
pub trait MediaStorage: Send + Sync {
    async fn store_bytes(&self, name: &str, content_type: &str, bytes: Vec<u8>) -> Result<String>;

    async fn store_from_url(&self, name: &str, url: &str) -> Result<String>;
}

/// Generates hero video and section images through ordered provider
/// fallback chains. First usable asset wins; remaining providers are not
/// attempted. Exhausting every attempt is non-fatal: the stage completes
/// with empty refs and the manual-upload flag set.
pub struct MediaGenerator {
    providers: Vec<Arc<dyn MediaProvider>>,
    storage: Arc<dyn MediaStorage>,
    constraints: MediaConstraints,
}

impl MediaGenerator {
    pub fn new(providers: Vec<Arc<dyn MediaProvider>>, storage: Arc<dyn MediaStorage>) -> Self {
        Self {
            providers,
            storage,
            constraints: MediaConstraints::default(),
        }
    }

    pub fn with_constraints(mut self, constraints: MediaConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    /// Run the full media stage: one hero video plus up to three section
    /// images. Section requests fan out and are joined with per-branch
    /// isolation; one failure does not abort the others.
    pub async fn generate_media(&self, topic: &str, section_prompts: &[String]) -> MediaRefs {
        let hero_prompt = format!("Hero video for an article about {topic}");
        let hero_branch = self.generate_with_fallback(&hero_prompt, MediaKind::Video);

        let image_branches = section_prompts
            .iter()
            .take(3)
            .map(|prompt| self.generate_with_fallback(prompt, MediaKind::Image));

        let (hero_url, section_results) = tokio::join!(hero_branch, join_all(image_branches));

        // Assets map to section positions in request order; there is no
        // explicit position metadata on the wire.
        let section_urls: Vec<String> = section_results.into_iter().flatten().collect();

        let manual_upload_required = hero_url.is_none() || section_urls.len() < section_prompts.len().min(3);
        if manual_upload_required {
            warn!(
                "media generation degraded for '{}': hero={}, sections={}/{}",
                topic,
                hero_url.is_some(),
                section_urls.len(),
                section_prompts.len().min(3)
            );
        } else {
            info!(
                "media generation complete for '{}': hero + {} section images",
                topic,
                section_urls.len()
            );
        }

        MediaRefs {
            hero_url,
            section_urls,
            manual_upload_required,
        }
    }

    /// Chain of responsibility over the provider list: iterate until the
    /// first attempt yields a usable, durably stored asset. Every failure
    /// is logged and chained past; `None` means the chain is exhausted.
    pub async fn generate_with_fallback(&self, prompt: &str, kind: MediaKind) -> Option<String> {
        for provider in &self.providers {
            debug!(
                "attempting {} generation via {}",
                kind.as_str(),
                provider.provider_name()
            );
            match provider.generate(prompt, kind, &self.constraints).await {
                Ok(asset) => match self.persist_asset(asset, kind).await {
                    Ok(url) => {
                        info!(
                            "{} generated by {} -> {}",
                            kind.as_str(),
                            provider.provider_name(),
                            url
                        );
                        return Some(url);
                    }
                    Err(e) => {
                        warn!(
                            "storing {} asset from {} failed: {}",
                            kind.as_str(),
                            provider.provider_name(),
                            e
                        );
                    }
                },
                Err(e) => {
                    warn!(
                        "{} generation via {} failed: {}",
                        kind.as_str(),
                        provider.provider_name(),
                        e
                    );
                }
            }
        }
        None
    }

    async fn persist_asset(&self, asset: GeneratedAsset, kind: MediaKind) -> Result<String> {
        let name = format!("{}-{}", kind.as_str(), Uuid::new_v4());
        match asset {
            GeneratedAsset::Remote { url, permanent } => {
                if permanent {
                    Ok(url)
                } else {
                    self.storage.store_from_url(&name, &url).await
                }
            }
            GeneratedAsset::Inline { bytes, content_type } => {
                self.storage.store_bytes(&name, &content_type, bytes).await
            }
        }
    }
}

/// Storage backed by an HTTP object store (PUT to a base URL).
pub struct HttpMediaStorage {
    client: Client,
    base_url: Url,
}

impl HttpMediaStorage {
    pub fn new(base_url: &str, config: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            base_url: Url::parse(base_url)?,
        })
    }
}

#[async_trait]
impl MediaStorage for HttpMediaStorage {
    async fn store_bytes(&self, name: &str, content_type: &str, bytes: Vec<u8>) -> Result<String> {
        let target = self.base_url.join(name)?;
        let response = self
            .client
            .put(target.clone())
            .header("content-type", content_type)
            .body(bytes)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(EngineError::ExternalService {
                service: "media-storage".to_string(),
                message: format!("HTTP {}", response.status()),
            });
        }
        Ok(target.to_string())
    }

    async fn store_from_url(&self, name: &str, url: &str) -> Result<String> {
        let download = self.client.get(url).send().await?;
        if !download.status().is_success() {
            return Err(EngineError::ExternalService {
                service: "media-storage".to_string(),
                message: format!("fetching transient asset: HTTP {}", download.status()),
            });
        }
        let content_type = download
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = download.bytes().await?.to_vec();
        self.store_bytes(name, &content_type, bytes).await
    }
}

/// Scriptable provider for tests and the demo binary.
pub struct MockMediaProvider {
    name: String,
    fail: bool,
    permanent: bool,
}

impl MockMediaProvider {
    pub fn succeeding(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fail: false,
            permanent: true,
        }
    }

    pub fn failing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fail: true,
            permanent: true,
        }
    }

    /// Succeeds but returns a transient URL that must be re-uploaded.
    pub fn transient(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fail: false,
            permanent: false,
        }
    }
}

#[async_trait]
impl MediaProvider for MockMediaProvider {
    fn provider_name(&self) -> String {
        format!("mock ({})", self.name)
    }

    async fn generate(
        &self,
        _prompt: &str,
        kind: MediaKind,
        _constraints: &MediaConstraints,
    ) -> Result<GeneratedAsset> {
        if self.fail {
            return Err(EngineError::ExternalService {
                service: "media-generation".to_string(),
                message: format!("scripted failure from {}", self.name),
            });
        }
        Ok(GeneratedAsset::Remote {
            url: format!(
                "https://assets.example.com/{}/{}-{}",
                self.name,
                kind.as_str(),
                Uuid::new_v4()
            ),
            permanent: self.permanent,
        })
    }
}

/// In-memory storage stub returning stable fake durable URLs.
#[derive(Default)]
pub struct MemoryMediaStorage;

impl MemoryMediaStorage {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaStorage for MemoryMediaStorage {
    async fn store_bytes(&self, name: &str, _content_type: &str, _bytes: Vec<u8>) -> Result<String> {
        Ok(format!("https://cdn.example.com/media/{name}"))
    }

    async fn store_from_url(&self, name: &str, _url: &str) -> Result<String> {
        Ok(format!("https://cdn.example.com/media/{name}"))
    }
}
