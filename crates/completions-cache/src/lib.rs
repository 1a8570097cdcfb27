//! # Context Completions Cache
//!
//! Serves previously computed inline completions while the user keeps typing or deleting at the
//! cursor, without ever returning text that disagrees with the document.
//!
//! ## Matching
//!
//! ```text
//! cached:  prefix=P     suffix=S  completion=C
//!
//! query P        S  -> C                   (exact)
//! query P+T      S  -> C[len(T)..]         (typed T, C starts with T)
//! query P-D      S  -> D+C                 (deleted D, D has no newline)
//! query *        S' -> miss                (suffix never synthesized)
//! ```
//!
//! Two LRU layers bound memory: documents (default 5) and entries per document (default 50).

mod cache;
mod document;
mod types;

pub use cache::CompletionsCache;
pub use document::DocumentCompletionsCache;
pub use types::{CachedCompletions, Completion, CompletionsCacheConfig};
