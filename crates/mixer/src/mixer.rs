use crate::error::{MixerError, Result};
use crate::fusion::{fuse_context_with_share, RrfFusion, DEFAULT_KEYWORD_SHARE};
use context_protocol::{ContextSnippet, ContextSource, ContextSummary, RetrieverIdentifier, SnippetPacker};
use context_retriever::{ContextRetriever, RetrieverOptions};
use futures::future::join_all;
use serde::Deserialize;
use std::sync::Arc;
use tokio::time::Instant;

/// How results of several retrievers are combined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MixStrategy {
    /// Retriever order is priority order
    #[default]
    Priority,
    /// Non-embeddings results first within `keyword_share` of the budget, embeddings fill the rest
    KeywordShare,
    /// Reciprocal Rank Fusion across retrievers, grouped by document
    ReciprocalRank,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MixerConfig {
    pub strategy: MixStrategy,
    pub keyword_share: f64,
    pub rrf_k: f64,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            strategy: MixStrategy::Priority,
            keyword_share: DEFAULT_KEYWORD_SHARE,
            rrf_k: 60.0,
        }
    }
}

impl MixerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.keyword_share) {
            return Err(MixerError::InvalidConfig(format!(
                "keyword_share must be within 0..=1, got {}",
                self.keyword_share
            )));
        }
        if self.rrf_k <= 0.0 {
            return Err(MixerError::InvalidConfig(format!(
                "rrf_k must be positive, got {}",
                self.rrf_k
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MixedContext {
    pub snippets: Vec<ContextSnippet>,
    pub summary: ContextSummary,
}

struct RetrieverOutcome {
    identifier: RetrieverIdentifier,
    snippets: Vec<ContextSnippet>,
}

/// Runs every retriever that supports the document's language and packs their results into
/// the request's character budget.
pub struct ContextMixer {
    retrievers: Vec<Arc<dyn ContextRetriever>>,
    config: MixerConfig,
}

impl ContextMixer {
    /// `retrievers` are listed highest priority first.
    pub fn new(retrievers: Vec<Arc<dyn ContextRetriever>>, config: MixerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { retrievers, config })
    }

    pub fn config(&self) -> &MixerConfig {
        &self.config
    }

    pub fn identifiers(&self) -> Vec<RetrieverIdentifier> {
        self.retrievers.iter().map(|r| r.identifier()).collect()
    }

    pub async fn get_context(&self, options: &RetrieverOptions) -> Result<MixedContext> {
        if options.cancel.is_cancelled() {
            return Err(MixerError::Aborted);
        }
        let started = Instant::now();
        let language_id = &options.document.language_id;
        let supported: Vec<&Arc<dyn ContextRetriever>> = self
            .retrievers
            .iter()
            .filter(|retriever| retriever.is_supported_for_language_id(language_id))
            .collect();

        if supported.is_empty() {
            log::debug!("no context retriever supports {language_id}");
            return Ok(MixedContext {
                snippets: Vec::new(),
                summary: ContextSummary {
                    strategy: "none".to_string(),
                    duration_ms: 0,
                    ..ContextSummary::default()
                },
            });
        }

        let strategy = supported
            .iter()
            .map(|r| r.identifier().as_str())
            .collect::<Vec<_>>()
            .join("+");

        let outcomes = join_all(
            supported
                .iter()
                .map(|retriever| run_retriever(retriever.as_ref(), options)),
        )
        .await;
        if options.cancel.is_cancelled() {
            return Err(MixerError::Aborted);
        }
        let outcomes: Vec<RetrieverOutcome> = outcomes.into_iter().flatten().collect();

        let max_chars = options.hints.max_chars;
        let snippets = if max_chars == 0 {
            Vec::new()
        } else {
            self.mix(outcomes, max_chars)
        };

        let mut summary = ContextSummary {
            strategy,
            ..ContextSummary::default()
        };
        for snippet in &snippets {
            if let Some(identifier) = snippet.identifier() {
                summary.record(identifier.source());
            }
        }
        summary.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        log::debug!(
            "mixed {} snippets from {} ({}ms)",
            snippets.len(),
            summary.strategy,
            summary.duration_ms
        );
        Ok(MixedContext { snippets, summary })
    }

    fn mix(&self, outcomes: Vec<RetrieverOutcome>, max_chars: usize) -> Vec<ContextSnippet> {
        match self.config.strategy {
            MixStrategy::Priority => {
                let mut packer = SnippetPacker::new(max_chars);
                for snippet in outcomes.into_iter().flat_map(|o| o.snippets) {
                    packer.push(snippet);
                }
                packer.finish()
            }
            MixStrategy::KeywordShare => {
                let (embeddings, keyword): (Vec<_>, Vec<_>) = outcomes
                    .into_iter()
                    .partition(|o| o.identifier.source() == ContextSource::Embeddings);
                fuse_context_with_share(
                    keyword.into_iter().flat_map(|o| o.snippets).collect(),
                    embeddings.into_iter().flat_map(|o| o.snippets).collect(),
                    max_chars,
                    self.config.keyword_share,
                )
            }
            MixStrategy::ReciprocalRank => {
                let fused = RrfFusion::new(self.config.rrf_k)
                    .fuse(outcomes.into_iter().map(|o| o.snippets).collect());
                let mut packer = SnippetPacker::new(max_chars);
                for snippet in fused {
                    packer.push(snippet);
                }
                packer.finish()
            }
        }
    }
}

/// Failures are logged and contribute nothing.
async fn run_retriever(retriever: &dyn ContextRetriever, options: &RetrieverOptions) -> Option<RetrieverOutcome> {
    let identifier = retriever.identifier();
    let started = Instant::now();
    match retriever.retrieve(options).await {
        Ok(snippets) => {
            log::trace!(
                "{} returned {} snippets in {}ms",
                identifier.as_str(),
                snippets.len(),
                started.elapsed().as_millis()
            );
            let snippets = snippets
                .into_iter()
                .map(|snippet| match snippet.identifier() {
                    Some(_) => snippet,
                    None => snippet.with_identifier(identifier),
                })
                .collect();
            Some(RetrieverOutcome { identifier, snippets })
        }
        Err(err) if err.is_abort() => {
            log::debug!("{} aborted after {}ms", identifier.as_str(), started.elapsed().as_millis());
            None
        }
        Err(err) => {
            log::warn!(
                "{} failed after {}ms: {err}",
                identifier.as_str(),
                started.elapsed().as_millis()
            );
            None
        }
    }
}
