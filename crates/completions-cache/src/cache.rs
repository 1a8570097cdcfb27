use crate::document::DocumentCompletionsCache;
use crate::types::{CachedCompletions, Completion, CompletionsCacheConfig};
use context_protocol::DocumentState;
use lru::LruCache;
use std::num::NonZeroUsize;

/// Completions cache across documents, keyed by `language_id:uri`.
#[derive(Debug)]
pub struct CompletionsCache {
    documents: LruCache<String, DocumentCompletionsCache>,
    entries_per_document: NonZeroUsize,
}

impl CompletionsCache {
    pub fn new(config: CompletionsCacheConfig) -> Self {
        Self {
            documents: LruCache::new(non_zero(config.max_documents)),
            entries_per_document: non_zero(config.max_entries_per_document),
        }
    }

    pub fn add(&mut self, log_id: &str, document_state: &DocumentState, completions: &[Completion]) {
        let per_document = self.entries_per_document;
        self.documents
            .get_or_insert_mut(document_key(document_state), || {
                DocumentCompletionsCache::new(per_document)
            })
            .add(log_id, document_state, completions);
    }

    pub fn get(&mut self, document_state: &DocumentState) -> Option<CachedCompletions> {
        self.documents
            .get_mut(&document_key(document_state))?
            .get(document_state)
    }

    /// Number of tracked documents
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn clear(&mut self) {
        self.documents.clear();
    }
}

impl Default for CompletionsCache {
    fn default() -> Self {
        Self::new(CompletionsCacheConfig::default())
    }
}

fn document_key(document_state: &DocumentState) -> String {
    format!("{}:{}", document_state.language_id, document_state.uri)
}

fn non_zero(value: usize) -> NonZeroUsize {
    NonZeroUsize::new(value).unwrap_or(NonZeroUsize::MIN)
}
