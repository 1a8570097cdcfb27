use crate::observer::SectionObserver;
use async_trait::async_trait;
use context_protocol::{base_language_id, ContextSnippet, RetrieverIdentifier};
use context_retriever::{ContextRetriever, RetrieverOptions, Result, RetrieverError};
use std::sync::Arc;

/// Serves [`SectionObserver`] context to the mixer.
pub struct GraphSectionRetriever {
    observer: Arc<SectionObserver>,
}

impl GraphSectionRetriever {
    pub fn new(observer: Arc<SectionObserver>) -> Self {
        Self { observer }
    }
}

#[async_trait]
impl ContextRetriever for GraphSectionRetriever {
    fn identifier(&self) -> RetrieverIdentifier {
        RetrieverIdentifier::GraphSection
    }

    async fn retrieve(&self, options: &RetrieverOptions) -> Result<Vec<ContextSnippet>> {
        if options.cancel.is_cancelled() {
            return Err(RetrieverError::Aborted);
        }
        self.observer
            .get_context_at_position(
                &options.document,
                options.position,
                options.hints.max_chars,
                options.context_range,
            )
            .await
            .map_err(Into::into)
    }

    fn is_supported_for_language_id(&self, language_id: &str) -> bool {
        let languages = &self.observer.config().languages;
        languages.is_empty() || languages.iter().any(|l| base_language_id(l) == base_language_id(language_id))
    }
}
