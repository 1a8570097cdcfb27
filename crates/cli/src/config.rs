use anyhow::{Context as AnyhowContext, Result};
use context_completions_cache::CompletionsCacheConfig;
use context_graph::SectionObserverConfig;
use context_mixer::MixerConfig;
use context_protocol::RetrieverIdentifier;
use context_retriever::{CachedRetrieverConfig, JaccardConfig, RecentEditsConfig};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable consulted when `--config` is not given
pub const CONFIG_ENV: &str = "CONTEXT_CONFIG";

/// Every tunable of the pipeline. Missing tables and keys take their defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Budget of `context` steps that do not set their own
    pub max_chars: usize,
    /// Retrievers handed to the mixer, highest priority first
    pub retrievers: Vec<RetrieverIdentifier>,
    pub completions_cache: CompletionsCacheConfig,
    pub cached_retriever: CachedRetrieverConfig,
    pub jaccard: JaccardConfig,
    pub recent_edits: RecentEditsConfig,
    pub section_observer: SectionObserverConfig,
    pub mixer: MixerConfig,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_chars: 10_000,
            retrievers: vec![
                RetrieverIdentifier::JaccardSimilarity,
                RetrieverIdentifier::RecentEdits,
                RetrieverIdentifier::GraphSection,
            ],
            completions_cache: CompletionsCacheConfig::default(),
            cached_retriever: CachedRetrieverConfig::default(),
            jaccard: JaccardConfig::default(),
            recent_edits: RecentEditsConfig::default(),
            section_observer: SectionObserverConfig::default(),
            mixer: MixerConfig::default(),
        }
    }
}

impl ContextConfig {
    /// Load from `path`, else from `$CONTEXT_CONFIG`, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from));
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = Self::parse(&raw).with_context(|| format!("Invalid config {}", path.display()))?;
        log::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.mixer.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use context_mixer::MixStrategy;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_config_is_all_defaults() {
        assert_eq!(ContextConfig::parse("").unwrap(), ContextConfig::default());
    }

    #[test]
    fn tables_override_only_what_they_name() {
        let config = ContextConfig::parse(
            r#"
            max_chars = 500
            retrievers = ["graph-section", "jaccard-similarity"]

            [completions_cache]
            max_documents = 2

            [section_observer]
            history_budget_ratio = 0.5

            [mixer]
            strategy = "reciprocal-rank"
            "#,
        )
        .unwrap();

        assert_eq!(config.max_chars, 500);
        assert_eq!(
            config.retrievers,
            vec![RetrieverIdentifier::GraphSection, RetrieverIdentifier::JaccardSimilarity]
        );
        assert_eq!(config.completions_cache.max_documents, 2);
        assert_eq!(config.completions_cache.max_entries_per_document, 50);
        assert_eq!(config.section_observer.history_budget_ratio, 0.5);
        assert_eq!(config.section_observer.max_tracked_documents, 10);
        assert_eq!(config.mixer.strategy, MixStrategy::ReciprocalRank);
        assert_eq!(config.jaccard, JaccardConfig::default());
    }

    #[test]
    fn invalid_mixer_settings_are_rejected() {
        let err = ContextConfig::parse("[mixer]\nkeyword_share = 2.0\n").unwrap_err();
        assert!(err.to_string().contains("keyword_share"));
    }
}
