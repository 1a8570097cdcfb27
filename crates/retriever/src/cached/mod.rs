//! Dependency-aware caching around a [`RetrievalStrategy`].
//!
//! ```text
//! retrieve(options)
//!   │  key = strategy.to_cache_key(options)
//!   ├─ hit ─────────────────────────────> cached snippets
//!   └─ miss
//!        ├─ cancel in-flight operations for other keys
//!        ├─ strategy.do_retrieval(ctx)    ctx.open_text_document(uri) ─┐
//!        │                                ctx.visible_text_editors() ──┤ pending dependencies
//!        │                                ctx.add_dependency(token) ───┘
//!        └─ commit snippets + dependencies together, unless cancelled or invalidated meanwhile
//! ```
//!
//! All bookkeeping lives behind one mutex that is never held across an `.await`.

mod index;

use crate::debounce::Debouncer;
use crate::error::{Result, RetrieverError};
use crate::host::{
    EditorEvent, EditorEventHandler, EditorHost, SelectionChangeEvent, TabGroup, TextDocumentChangeEvent,
    TextEditor,
};
use crate::retriever::{ContextRetriever, ContextSizeHints, RetrieverHints, RetrieverOptions};
use async_trait::async_trait;
use context_protocol::{ContextSnippet, RetrieverIdentifier, TextDocument, Uri};
use index::DependencyIndex;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Dependency token for the set of visible editors.
pub const VISIBLE_TEXT_EDITORS: &str = "visible-text-editors";
/// Dependency token for the tab layout.
pub const TAB_GROUPS: &str = "tab-groups";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CachedRetrieverConfig {
    pub cache_capacity: usize,
    pub dependency_capacity: usize,
    /// Preload context (with a zero budget) whenever the cursor settles
    pub precompute_on_cursor_move: bool,
    pub precompute_debounce_ms: u64,
    pub context_size: ContextSizeHints,
}

impl Default for CachedRetrieverConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 500,
            dependency_capacity: 500,
            precompute_on_cursor_move: false,
            precompute_debounce_ms: 100,
            context_size: ContextSizeHints::default(),
        }
    }
}

/// The part of a cached retriever that actually computes context.
#[async_trait]
pub trait RetrievalStrategy: Send + Sync + 'static {
    fn identifier(&self) -> RetrieverIdentifier;

    /// Two requests with the same key are answered by the same cached result.
    fn to_cache_key(&self, options: &RetrieverOptions) -> String;

    fn is_supported_for_language_id(&self, language_id: &str) -> bool;

    /// Compute context. Everything read through `ctx` is recorded as a dependency of the result.
    async fn do_retrieval(
        &self,
        ctx: &RetrievalContext,
        options: &RetrieverOptions,
    ) -> Result<Vec<ContextSnippet>>;
}

#[derive(Debug)]
struct Operation {
    key: String,
    cancel: CancellationToken,
    dependencies: HashSet<String>,
    invalidated: bool,
}

#[derive(Debug)]
struct CacheState {
    index: DependencyIndex,
    operations: HashMap<u64, Operation>,
    current: Option<u64>,
    next_operation: u64,
    watch_visible_editors: bool,
    watch_tab_groups: bool,
}

impl CacheState {
    fn start_operation(&mut self, key: &str, parent: &CancellationToken) -> (u64, CancellationToken) {
        for operation in self.operations.values() {
            if operation.key != key && !operation.cancel.is_cancelled() {
                log::debug!("cancelling in-flight retrieval for {}", operation.key);
                operation.cancel.cancel();
            }
        }
        let id = self.next_operation;
        self.next_operation += 1;
        let cancel = parent.child_token();
        self.operations.insert(
            id,
            Operation {
                key: key.to_string(),
                cancel: cancel.clone(),
                dependencies: HashSet::new(),
                invalidated: false,
            },
        );
        self.current = Some(id);
        (id, cancel)
    }

    fn finish_operation(&mut self, id: u64) -> Option<Operation> {
        if self.current == Some(id) {
            self.current = None;
        }
        self.operations.remove(&id)
    }

    fn record_dependency(&mut self, id: u64, dependency: &str) -> bool {
        match self.operations.get_mut(&id) {
            Some(operation) => {
                operation.dependencies.insert(dependency.to_string());
                true
            }
            None => false,
        }
    }

    fn invalidate(&mut self, dependency: &str) -> usize {
        for operation in self.operations.values_mut() {
            if operation.dependencies.contains(dependency) {
                operation.invalidated = true;
            }
        }
        self.index.invalidate(dependency)
    }
}

struct Shared {
    host: Arc<dyn EditorHost>,
    state: Mutex<CacheState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Handle given to [`RetrievalStrategy::do_retrieval`] for one operation.
pub struct RetrievalContext {
    shared: Arc<Shared>,
    operation: u64,
    cancel: CancellationToken,
}

impl RetrievalContext {
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(RetrieverError::Aborted);
        }
        Ok(())
    }

    pub fn add_dependency(&self, dependency: &str) {
        if !self.shared.lock().record_dependency(self.operation, dependency) {
            log::error!("dependency {dependency} added after its retrieval finished");
        }
    }

    /// Open `uri` and depend on it. Non-`file` documents are not used as context.
    pub async fn open_text_document(&self, uri: &Uri) -> Result<Option<TextDocument>> {
        if !uri.is_file() {
            return Ok(None);
        }
        self.add_dependency(uri.as_str());
        self.shared.host.open_text_document(uri).await.map(Some)
    }

    pub fn visible_text_editors(&self) -> Vec<TextEditor> {
        {
            let mut state = self.shared.lock();
            state.watch_visible_editors = true;
            state.record_dependency(self.operation, VISIBLE_TEXT_EDITORS);
        }
        self.shared.host.visible_text_editors()
    }

    pub fn tab_groups(&self) -> Vec<TabGroup> {
        {
            let mut state = self.shared.lock();
            state.watch_tab_groups = true;
            state.record_dependency(self.operation, TAB_GROUPS);
        }
        self.shared.host.tab_groups()
    }

    pub fn as_relative_path(&self, uri: &Uri) -> String {
        self.shared.host.as_relative_path(uri)
    }
}

struct Inner<S> {
    strategy: S,
    shared: Arc<Shared>,
    context_size: ContextSizeHints,
    precompute: Option<Debouncer>,
}

impl<S: RetrievalStrategy> Inner<S> {
    async fn retrieve(&self, options: &RetrieverOptions) -> Result<Vec<ContextSnippet>> {
        let key = self.strategy.to_cache_key(options);
        let (operation, cancel) = {
            let mut state = self.shared.lock();
            if let Some(snippets) = state.index.get(&key) {
                log::debug!("{}: cache hit for {key}", self.strategy.identifier().as_str());
                return Ok(snippets);
            }
            state.start_operation(&key, &options.cancel)
        };

        let ctx = RetrievalContext {
            shared: Arc::clone(&self.shared),
            operation,
            cancel: cancel.clone(),
        };
        let started = Instant::now();
        let outcome = tokio::select! {
            () = cancel.cancelled() => Err(RetrieverError::Aborted),
            result = self.strategy.do_retrieval(&ctx, options) => result,
        };
        self.complete(operation, key, outcome, started)
    }

    fn complete(
        &self,
        operation: u64,
        key: String,
        outcome: Result<Vec<ContextSnippet>>,
        started: Instant,
    ) -> Result<Vec<ContextSnippet>> {
        let identifier = self.strategy.identifier().as_str();
        let elapsed = started.elapsed().as_millis();
        let mut state = self.shared.lock();
        let finished = state.finish_operation(operation);
        match outcome {
            Ok(snippets) => {
                match finished {
                    Some(op) if !op.cancel.is_cancelled() && !op.invalidated => {
                        state.index.insert(key, snippets.clone(), op.dependencies);
                    }
                    _ => log::debug!("{identifier}: result for {key} is outdated, not caching"),
                }
                Ok(snippets)
            }
            Err(err) if err.is_abort() => {
                log::debug!("{identifier}: retrieval for {key} aborted after {elapsed}ms");
                Err(err)
            }
            Err(err) => {
                log::warn!("{identifier}: retrieval failed after {elapsed}ms: {err}");
                Err(err)
            }
        }
    }
}

/// A [`ContextRetriever`] that caches strategy results until one of their dependencies changes.
pub struct CachedRetriever<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for CachedRetriever<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: RetrievalStrategy> CachedRetriever<S> {
    pub fn new(strategy: S, host: Arc<dyn EditorHost>, config: &CachedRetrieverConfig) -> Self {
        let precompute = config
            .precompute_on_cursor_move
            .then(|| Debouncer::new(Duration::from_millis(config.precompute_debounce_ms)));
        let state = CacheState {
            index: DependencyIndex::new(config.cache_capacity, config.dependency_capacity),
            operations: HashMap::new(),
            current: None,
            next_operation: 0,
            watch_visible_editors: false,
            watch_tab_groups: false,
        };
        Self {
            inner: Arc::new(Inner {
                strategy,
                shared: Arc::new(Shared {
                    host,
                    state: Mutex::new(state),
                }),
                context_size: config.context_size,
                precompute,
            }),
        }
    }

    pub fn strategy(&self) -> &S {
        &self.inner.strategy
    }

    /// Record `dependency` for the retrieval currently in flight. Outside a retrieval this is a
    /// usage error: it is logged and ignored.
    pub fn add_dependency(&self, dependency: &str) {
        let mut state = self.inner.shared.lock();
        match state.current {
            Some(operation) => {
                state.record_dependency(operation, dependency);
            }
            None => log::error!(
                "{}: add_dependency({dependency}) called outside of a retrieval",
                self.inner.strategy.identifier().as_str()
            ),
        }
    }

    /// Purge every cached result that depended on `dependency`.
    pub fn invalidate_dependency(&self, dependency: &str) -> usize {
        let purged = self.inner.shared.lock().invalidate(dependency);
        if purged > 0 {
            log::debug!(
                "{}: {dependency} changed, dropped {purged} cached results",
                self.inner.strategy.identifier().as_str()
            );
        }
        purged
    }

    pub fn on_did_change_text_document(&self, event: &TextDocumentChangeEvent) {
        if event.content_changes.is_empty() || !event.document.uri.is_file() {
            return;
        }
        self.invalidate_dependency(event.document.uri.as_str());
    }

    pub fn on_did_change_visible_text_editors(&self) {
        if self.inner.shared.lock().watch_visible_editors {
            self.invalidate_dependency(VISIBLE_TEXT_EDITORS);
        }
    }

    pub fn on_did_change_tab_groups(&self) {
        if self.inner.shared.lock().watch_tab_groups {
            self.invalidate_dependency(TAB_GROUPS);
        }
    }

    /// Schedule a debounced preload at the new cursor position, when enabled.
    pub fn on_did_change_text_editor_selection(&self, event: &SelectionChangeEvent) {
        let Some(debouncer) = &self.inner.precompute else {
            return;
        };
        let document = &event.document;
        if !document.uri.is_file() || !self.inner.strategy.is_supported_for_language_id(&document.language_id) {
            return;
        }
        let options = RetrieverOptions::new(document.clone(), event.position, self.inner.context_size)
            .with_hints(RetrieverHints {
                max_chars: 0,
                max_ms: 150,
                is_preload: true,
            });
        let inner = Arc::clone(&self.inner);
        debouncer.call(async move {
            if let Err(err) = inner.retrieve(&options).await {
                if !err.is_abort() {
                    log::debug!("preload failed: {err}");
                }
            }
        });
    }

    pub fn dispose(&self) {
        if let Some(debouncer) = &self.inner.precompute {
            debouncer.cancel();
        }
        let mut state = self.inner.shared.lock();
        for operation in state.operations.values() {
            operation.cancel.cancel();
        }
        state.operations.clear();
        state.current = None;
        state.index.clear();
        state.watch_visible_editors = false;
        state.watch_tab_groups = false;
    }

    pub fn cached_len(&self) -> usize {
        self.inner.shared.lock().index.len()
    }

    pub fn is_cached(&self, key: &str) -> bool {
        self.inner.shared.lock().index.contains_key(key)
    }

    /// Cached keys currently depending on `dependency`, sorted
    pub fn dependent_keys(&self, dependency: &str) -> Vec<String> {
        self.inner.shared.lock().index.keys_for(dependency)
    }
}

#[async_trait]
impl<S: RetrievalStrategy> ContextRetriever for CachedRetriever<S> {
    fn identifier(&self) -> RetrieverIdentifier {
        self.inner.strategy.identifier()
    }

    async fn retrieve(&self, options: &RetrieverOptions) -> Result<Vec<ContextSnippet>> {
        self.inner.retrieve(options).await
    }

    fn is_supported_for_language_id(&self, language_id: &str) -> bool {
        self.inner.strategy.is_supported_for_language_id(language_id)
    }
}

#[async_trait]
impl<S: RetrievalStrategy> EditorEventHandler for CachedRetriever<S> {
    async fn handle_event(&self, event: &EditorEvent) {
        match event {
            EditorEvent::DidChangeTextDocument(change) => self.on_did_change_text_document(change),
            EditorEvent::DidChangeTextEditorSelection(selection) => {
                self.on_did_change_text_editor_selection(selection);
            }
            EditorEvent::DidChangeVisibleTextEditors(_) => self.on_did_change_visible_text_editors(),
            EditorEvent::DidChangeTabGroups => self.on_did_change_tab_groups(),
            EditorEvent::DidRenameFiles(renames) => {
                for rename in renames {
                    self.invalidate_dependency(rename.old_uri.as_str());
                }
            }
            EditorEvent::DidDeleteFiles(uris) => {
                for uri in uris {
                    self.invalidate_dependency(uri.as_str());
                }
            }
            EditorEvent::DidOpenTextDocument(_) => {}
        }
    }
}
