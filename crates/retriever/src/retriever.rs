use crate::error::Result;
use async_trait::async_trait;
use context_protocol::{ContextSnippet, DocumentState, Position, Range, RetrieverIdentifier, TextDocument};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

/// Budget hints passed down to every retriever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrieverHints {
    pub max_chars: usize,
    pub max_ms: u64,
    /// Warm-up request issued ahead of a completion; the result is only cached, never shown.
    pub is_preload: bool,
}

impl Default for RetrieverHints {
    fn default() -> Self {
        Self {
            max_chars: 10_000,
            max_ms: 150,
            is_preload: false,
        }
    }
}

/// Prefix/suffix window used to build [`DocumentState`] snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ContextSizeHints {
    pub prefix_chars: usize,
    pub suffix_chars: usize,
}

impl Default for ContextSizeHints {
    fn default() -> Self {
        Self {
            prefix_chars: 2_000,
            suffix_chars: 400,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetrieverOptions {
    pub document: TextDocument,
    pub position: Position,
    pub doc_state: DocumentState,
    pub hints: RetrieverHints,
    /// Range already part of the prompt; retrievers must not repeat it
    pub context_range: Option<Range>,
    pub cancel: CancellationToken,
}

impl RetrieverOptions {
    pub fn new(document: TextDocument, position: Position, sizes: ContextSizeHints) -> Self {
        let doc_state =
            DocumentState::from_document(&document, position, sizes.prefix_chars, sizes.suffix_chars);
        Self {
            document,
            position,
            doc_state,
            hints: RetrieverHints::default(),
            context_range: None,
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_hints(mut self, hints: RetrieverHints) -> Self {
        self.hints = hints;
        self
    }

    #[must_use]
    pub fn with_context_range(mut self, range: Option<Range>) -> Self {
        self.context_range = range;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// A source of completion context.
#[async_trait]
pub trait ContextRetriever: Send + Sync {
    fn identifier(&self) -> RetrieverIdentifier;

    async fn retrieve(&self, options: &RetrieverOptions) -> Result<Vec<ContextSnippet>>;

    fn is_supported_for_language_id(&self, language_id: &str) -> bool;
}
