//! # Context Protocol
//!
//! Shared data model for completion context retrieval: document snapshots, editor positions,
//! graph hover context, and the snippets handed to the prompt builder.
//!
//! Everything here is plain data (`serde` + `schemars`) so the same types travel between the
//! caches, the retrievers, the external graph engine and the replay CLI.

mod budget;
mod document;
mod engine;
mod language;
mod snippet;

pub use budget::{pack_snippets, CharBudget, SnippetPacker};
pub use document::{ContentChange, DocumentState, Location, Position, Range, TextDocument, Uri};
pub use engine::{ContextAtPositionRequest, ContextAtPositionResponse};
pub use language::{base_language_id, should_be_used_as_context};
pub use snippet::{
    ContextSnippet, ContextSource, ContextSummary, FileSnippet, HoverContext, HoverContextKind,
    RetrieverIdentifier, SymbolRelationship, SymbolSnippet,
};
