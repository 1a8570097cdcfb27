use serde::{Deserialize, Serialize};

/// An inline completion. The cache only ever rewrites `content`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

impl Completion {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            stop_reason: None,
        }
    }

    #[must_use]
    pub fn with_content(&self, content: String) -> Self {
        Self {
            content,
            stop_reason: self.stop_reason.clone(),
        }
    }
}

/// Result of a cache lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedCompletions {
    pub log_id: String,
    pub completions: Vec<Completion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionsCacheConfig {
    /// Documents tracked by the top-level cache
    pub max_documents: usize,
    /// Entries kept per document
    pub max_entries_per_document: usize,
}

impl Default for CompletionsCacheConfig {
    fn default() -> Self {
        Self {
            max_documents: 5,
            max_entries_per_document: 50,
        }
    }
}
