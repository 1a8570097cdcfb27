//! # Context Mixer
//!
//! Combines the output of several [`context_retriever::ContextRetriever`]s into one list of
//! snippets under a hard character budget.
//!
//! ```text
//! RetrieverOptions ──> supported retrievers (join_all) ──> per-retriever ranked lists
//!                                                             │
//!                      ┌──────────────────────────────────────┤
//!                      ├─ priority: retriever order
//!                      ├─ keyword-share: non-embeddings within 80%, embeddings fill the rest
//!                      └─ reciprocal-rank: documents ranked by Σ 1/(k + rank)
//!                                                             │
//!                      first-fit-discard packing (dedup by file, or file + symbol)
//!                                                             │
//!                                             snippets + ContextSummary
//! ```
//!
//! A budget of zero still runs every retriever, so preload requests warm their caches, but
//! always yields an empty list.

mod error;
mod fusion;
mod mixer;

pub use error::{MixerError, Result};
pub use fusion::{fuse_context, fuse_context_with_share, RrfFusion, DEFAULT_KEYWORD_SHARE};
pub use mixer::{ContextMixer, MixStrategy, MixedContext, MixerConfig};
