//! # Context Graph
//!
//! Section-level graph context with stale-while-revalidate semantics.
//!
//! ## Architecture
//!
//! ```text
//! visible editors ──> SymbolProvider ──> sections per document (LRU of 10)
//!                                           │
//! cursor move ──> section under cursor ──> GraphContextProvider ──> hover contexts
//!                    │                      (one fetch at a time, older ones aborted)
//!                    └─> last visited sections (10, most recent first)
//!
//! edits ──> newline inside a section ──> section stale
//!      └──> 3+ lines drift / 10 min old ──> sections recomputed and diffed by location key
//!
//! get_context_at_position
//!     ├─ text of recently visited sections (≤ 40% of the budget when graph context exists)
//!     └─ graph context of the current section (deduplicated, up to the full budget)
//! ```

mod error;
mod observer;
mod provider;
mod retriever;
mod section;
mod snippets;

pub use error::{GraphError, Result};
pub use observer::{SectionObserver, SectionObserverConfig};
pub use provider::{GraphContextProvider, SymbolProvider, TopLevelSectionProvider};
pub use retriever::GraphSectionRetriever;
pub use section::{DocumentSection, SectionState};
pub use snippets::{hover_context_to_snippet, hover_contexts_to_snippets};
