use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::types::Result;

/// HTTP client settings shared by every external-service adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: "SiloPress/1.0".to_string(),
            timeout_seconds: 60,
            max_retries: 3,
            retry_delay_seconds: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterlinkConfig {
    /// Minimum similarity score for a suggestion to be emitted.
    pub similarity_threshold: f64,
    /// Cap on new suggestions per source article per scan.
    pub max_suggestions_per_source: usize,
}

impl Default for InterlinkConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.3,
            max_suggestions_per_source: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkHealthConfig {
    /// Articles scoring at or above this are "well linked".
    pub well_linked_threshold: f64,
    /// Recency bonus half-life: how fast the new-article grace period decays.
    pub recency_half_life_days: i64,
}

impl Default for LinkHealthConfig {
    fn default() -> Self {
        Self {
            well_linked_threshold: 50.0,
            recency_half_life_days: 90,
        }
    }
}

/// Engine-wide configuration, loaded once at startup. The silo key→slug
/// table replaces any hardcoded mapping; a missing key falls back to a
/// title-derived slug at the call site.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub silo_slugs: HashMap<String, String>,
    #[serde(default)]
    pub interlink: InterlinkConfig,
    #[serde(default)]
    pub link_health: LinkHealthConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

impl EngineConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Canonical slug for a silo key, if one is configured.
    pub fn silo_slug_for(&self, key: &str) -> Option<&str> {
        self.silo_slugs.get(key).map(|s| s.as_str())
    }

    pub fn with_silo_slug(mut self, key: impl Into<String>, slug: impl Into<String>) -> Self {
        self.silo_slugs.insert(key.into(), slug.into());
        self
    }
}

/// Derive a URL-safe slug from free text: lowercase, alphanumeric runs
/// joined by single hyphens.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut last_was_dash = true;
    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_was_dash = false;
        } else if !last_was_dash {
            slug.push('-');
            last_was_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Sanitize an externally supplied slug candidate: any accidental path
/// separators are stripped to the last segment, then slugified.
pub fn sanitize_slug(candidate: &str) -> String {
    let last_segment = candidate
        .rsplit('/')
        .find(|segment| !segment.trim().is_empty())
        .unwrap_or(candidate);
    slugify(last_segment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_basic() {
        assert_eq!(slugify("13th Month Pay Computation"), "13th-month-pay-computation");
        assert_eq!(slugify("  BPO Salary & Compensation!  "), "bpo-salary-compensation");
        assert_eq!(slugify("already-a-slug"), "already-a-slug");
    }

    #[test]
    fn sanitize_strips_path_segments() {
        assert_eq!(sanitize_slug("guides/13th-month-pay-guide"), "13th-month-pay-guide");
        assert_eq!(sanitize_slug("/leading/slash/"), "slash");
        assert_eq!(sanitize_slug("plain"), "plain");
    }

    #[test]
    fn silo_slug_lookup_with_fallback() {
        let config = EngineConfig::default()
            .with_silo_slug("bpo_salary", "bpo-salary-compensation");
        assert_eq!(config.silo_slug_for("bpo_salary"), Some("bpo-salary-compensation"));
        assert_eq!(config.silo_slug_for("missing"), None);
    }
}
