use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::publisher::article_url;
use crate::store::{ArticleLocks, ContentStore};
use crate::types::{
    Article, EngineError, LinkSuggestion, PipelineStage, Result, SuggestionStatus,
};

#[derive(Debug, Clone, Copy)]
pub enum ScanScope {
    All,
    One(Uuid),
}

#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub articles_scanned: usize,
    pub suggestions_created: usize,
}

/// Mines the published content graph for missing internal links and applies
/// approved suggestions as literal text substitutions.
pub struct InterlinkEngine {
    store: Arc<dyn ContentStore>,
    config: EngineConfig,
    locks: ArticleLocks,
}

impl InterlinkEngine {
    pub fn new(store: Arc<dyn ContentStore>, config: EngineConfig, locks: ArticleLocks) -> Self {
        Self { store, config, locks }
    }

    /// Scan source articles against all other published articles and emit
    /// pending suggestions. A suggestion is only emitted when its
    /// `original_text` occurs verbatim and unlinked in the source body, the
    /// similarity clears the configured threshold, and no pending
    /// suggestion already exists for the (source, target) pair.
    pub async fn scan(&self, scope: ScanScope) -> Result<ScanReport> {
        let published = self.store.list_published_articles().await?;
        let sources: Vec<Article> = match scope {
            ScanScope::All => published.clone(),
            ScanScope::One(id) => {
                let article = self.store.get_article(id).await.map_err(|_| {
                    EngineError::validation(
                        PipelineStage::Published,
                        format!("scan target article {id} does not exist"),
                    )
                })?;
                // Scanning only covers the published graph; a draft is not
                // a valid link source.
                if !article.is_published {
                    return Err(EngineError::validation(
                        PipelineStage::Published,
                        format!("scan target article {id} is not published"),
                    ));
                }
                vec![article]
            }
        };

        let mut report = ScanReport::default();
        for source in &sources {
            report.articles_scanned += 1;
            let source_text = source.full_text();
            let mut created_for_source = 0usize;

            for target in &published {
                if target.id == source.id {
                    continue;
                }
                if created_for_source >= self.config.interlink.max_suggestions_per_source {
                    break;
                }
                // Dedup rule: never two pending suggestions for one pair.
                if self
                    .store
                    .pending_suggestion_exists(source.id, target.id)
                    .await?
                {
                    continue;
                }

                let Some(candidate) = find_candidate(&source_text, &target.title) else {
                    continue;
                };
                if candidate.similarity < self.config.interlink.similarity_threshold {
                    debug!(
                        "candidate '{}' for {} -> {} below threshold ({:.2})",
                        candidate.phrase, source.slug, target.slug, candidate.similarity
                    );
                    continue;
                }

                let suggestion = LinkSuggestion {
                    id: Uuid::new_v4(),
                    source_article_id: source.id,
                    target_article_id: target.id,
                    original_text: candidate.phrase.clone(),
                    anchor_text: candidate.phrase,
                    similarity_score: candidate.similarity,
                    status: SuggestionStatus::Pending,
                    created_at: Utc::now(),
                };
                self.store.insert_suggestion(&suggestion).await?;
                created_for_source += 1;
                report.suggestions_created += 1;
            }
        }

        info!(
            "interlink scan complete: {} articles scanned, {} suggestions created",
            report.articles_scanned, report.suggestions_created
        );
        Ok(report)
    }

    /// Apply a suggestion: replace the first unlinked literal occurrence of
    /// `original_text` with a hyperlinked anchor. Idempotent: re-approving
    /// an already-applied suggestion is a no-op, detected by checking
    /// whether the text still exists unlinked in the current body.
    /// Returns whether a substitution was actually applied.
    pub async fn approve(&self, suggestion_id: Uuid) -> Result<bool> {
        let suggestion = self.store.get_suggestion(suggestion_id).await?;
        if suggestion.status == SuggestionStatus::Rejected {
            return Err(EngineError::validation(
                PipelineStage::Published,
                "suggestion was rejected and cannot be approved",
            ));
        }
        let target = self
            .store
            .get_article(suggestion.target_article_id)
            .await
            .map_err(|_| {
                EngineError::validation(
                    PipelineStage::Published,
                    "suggestion references a stale target article",
                )
            })?;
        let url = article_url(&target, &self.config);

        // Serialize with the publisher: article bodies have exactly two
        // writers, and they must not interleave on the same article.
        let _lock = self.locks.lock(suggestion.source_article_id).await;
        let source = self
            .store
            .get_article(suggestion.source_article_id)
            .await
            .map_err(|_| {
                EngineError::validation(
                    PipelineStage::Published,
                    "suggestion references a stale source article",
                )
            })?;

        let link = format!("[{}]({})", suggestion.anchor_text, url);
        let mut parts = [
            source.introduction.clone(),
            source.body.clone(),
            source.conclusion.clone(),
        ];
        let mut applied = false;
        for part in parts.iter_mut() {
            if let Some(idx) = find_unlinked(part, &suggestion.original_text) {
                part.replace_range(idx..idx + suggestion.original_text.len(), &link);
                applied = true;
                break;
            }
        }

        if applied {
            self.store
                .update_article_content(source.id, &parts[0], &parts[1], &parts[2])
                .await?;
            info!(
                "applied suggestion {}: linked '{}' -> {}",
                suggestion_id, suggestion.anchor_text, url
            );
        } else {
            info!(
                "suggestion {} already applied; approval is a no-op",
                suggestion_id
            );
        }
        self.store
            .set_suggestion_status(suggestion_id, SuggestionStatus::Approved)
            .await?;
        Ok(applied)
    }

    pub async fn reject(&self, suggestion_id: Uuid) -> Result<()> {
        let suggestion = self.store.get_suggestion(suggestion_id).await?;
        if suggestion.status != SuggestionStatus::Pending {
            return Err(EngineError::validation(
                PipelineStage::Published,
                "only pending suggestions can be rejected",
            ));
        }
        self.store
            .set_suggestion_status(suggestion_id, SuggestionStatus::Rejected)
            .await
    }
}

struct Candidate {
    phrase: String,
    similarity: f64,
}

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "your", "into", "what", "when", "how",
    "why", "are", "was", "were", "their", "about", "guide", "complete",
];

/// Find the strongest literal linking candidate in the source text for a
/// target article: the longest run of the target title's content words
/// that occurs verbatim (and unlinked) in the source body. Similarity is
/// the fraction of the title's content words the run covers.
fn find_candidate(source_text: &str, target_title: &str) -> Option<Candidate> {
    let title_words: Vec<String> = target_title
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| w.len() > 3 && !STOPWORDS.contains(&w.as_str()))
        .collect();
    if title_words.is_empty() {
        return None;
    }

    let max_len = title_words.len().min(4);
    for n in (1..=max_len).rev() {
        for window in title_words.windows(n) {
            let needle = window.join(" ");
            if let Some(idx) = find_word_boundary_ci(source_text, &needle) {
                let phrase = source_text[idx..idx + needle.len()].to_string();
                if find_unlinked(source_text, &phrase).is_none() {
                    continue;
                }
                let similarity = (n as f64 / title_words.len() as f64).min(1.0);
                return Some(Candidate { phrase, similarity });
            }
        }
    }
    None
}

/// ASCII case-insensitive substring search respecting word boundaries.
/// Byte-length preserving, so the returned index slices the original text.
fn find_word_boundary_ci(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    let hay = haystack.as_bytes();
    let ned = needle.as_bytes();
    for idx in 0..=hay.len() - ned.len() {
        if !hay[idx..idx + ned.len()].eq_ignore_ascii_case(ned) {
            continue;
        }
        let before_ok = idx == 0 || !hay[idx - 1].is_ascii_alphanumeric();
        let after = idx + ned.len();
        let after_ok = after == hay.len() || !hay[after].is_ascii_alphanumeric();
        if before_ok && after_ok {
            return Some(idx);
        }
    }
    None
}

/// First exact occurrence of `needle` that is not already part of a
/// markdown link (neither preceded by `[` nor followed by `](`).
fn find_unlinked(text: &str, needle: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(relative) = text[from..].find(needle) {
        let idx = from + relative;
        let preceded_by_bracket = idx > 0 && text.as_bytes()[idx - 1] == b'[';
        let followed_by_link = text[idx + needle.len()..].starts_with("](");
        if !preceded_by_bracket && !followed_by_link {
            return Some(idx);
        }
        from = idx + needle.len();
        if from >= text.len() {
            break;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_preserves_source_casing() {
        let source = "Everything you need on 13th Month Pay rules and payouts.";
        let candidate = find_candidate(source, "13th Month Pay Computation").unwrap();
        // "Pay" is below the content-word length cutoff; the longest
        // matchable run is "13th month".
        assert_eq!(candidate.phrase, "13th Month");
        assert!(source.contains(&candidate.phrase));
        assert!(candidate.similarity > 0.5);
    }

    #[test]
    fn no_candidate_without_overlap() {
        assert!(find_candidate("Totally unrelated words here.", "13th Month Pay Computation").is_none());
    }

    #[test]
    fn linked_occurrences_are_skipped() {
        let text = "See [13th month pay](/silo/guide) for details.";
        assert!(find_unlinked(text, "13th month pay").is_none());

        let text = "See [13th month pay](/silo/guide) and also 13th month pay basics.";
        let idx = find_unlinked(text, "13th month pay").unwrap();
        assert!(idx > 20);
    }

    #[test]
    fn word_boundaries_enforced() {
        assert!(find_word_boundary_ci("compensational analysis", "compensation").is_none());
        assert_eq!(find_word_boundary_ci("fair compensation now", "compensation"), Some(5));
    }
}
