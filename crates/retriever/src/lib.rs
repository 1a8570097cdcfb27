//! # Context Retriever
//!
//! Context sources for inline completions and the caching layer they share.
//!
//! ## Architecture
//!
//! ```text
//! EditorHost (documents, visible editors, tabs)
//!     │
//!     ├──> CachedRetriever<S: RetrievalStrategy>
//!     │      ├─ cache key → snippets (LRU)
//!     │      ├─ dependency token → keys (LRU, eviction invalidates)
//!     │      ├─ single-flight: a new key cancels the previous operation
//!     │      └─ JaccardSimilarityStrategy (similar windows in visible editors)
//!     │
//!     ├──> RecentEditsRetriever (unified diffs of the last minute of edits)
//!     │
//!     └──> GraphEngineRetriever (external engine over mpsc/oneshot)
//! ```
//!
//! Every retriever implements [`ContextRetriever`]; components that follow the editor also
//! implement [`EditorEventHandler`].

mod cached;
mod debounce;
mod error;
mod graph_engine;
mod host;
mod jaccard;
mod recent_edits;
mod retriever;

pub use cached::{
    CachedRetriever, CachedRetrieverConfig, RetrievalContext, RetrievalStrategy, TAB_GROUPS,
    VISIBLE_TEXT_EDITORS,
};
pub use debounce::Debouncer;
pub use error::{Result, RetrieverError};
pub use graph_engine::{ChannelGraphEngine, EngineRequest, GraphEngine, GraphEngineRetriever};
pub use host::{
    EditorEvent, EditorEventHandler, EditorHost, FileRename, MemoryEditorHost, SelectionChangeEvent, Tab,
    TabGroup, TextDocumentChangeEvent, TextEditor,
};
pub use jaccard::{JaccardConfig, JaccardSimilarityStrategy};
pub use recent_edits::{RecentEditsConfig, RecentEditsRetriever};
pub use retriever::{ContextRetriever, ContextSizeHints, RetrieverHints, RetrieverOptions};
