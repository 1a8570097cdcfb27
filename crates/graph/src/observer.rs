//! Tracks the sections of visible documents and hydrates the one under the cursor with graph
//! context, serving previous context while a refresh is pending.

use crate::error::{GraphError, Result};
use crate::provider::{GraphContextProvider, SymbolProvider};
use crate::section::{ActiveDocument, DocumentSection, Section};
use crate::snippets::hover_contexts_to_snippets;
use async_trait::async_trait;
use context_protocol::{
    should_be_used_as_context, CharBudget, ContextSnippet, FileSnippet, HoverContext, Location, Position,
    Range, RetrieverIdentifier, TextDocument, Uri,
};
use context_retriever::{
    EditorEvent, EditorEventHandler, EditorHost, TextDocumentChangeEvent, TextEditor,
};
use futures::future::join_all;
use lru::LruCache;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SectionObserverConfig {
    pub max_tracked_documents: usize,
    pub max_last_visited_sections: usize,
    /// A hydrated section is refreshed when visited after this long
    pub refresh_after_ms: u64,
    /// Sections older than this are recomputed on the next edit
    pub reload_after_ms: u64,
    /// Line-count drift that triggers recomputing a document's sections
    pub reload_line_delta: u32,
    /// Share of the budget available to section history when graph context exists
    pub history_budget_ratio: f64,
    /// Languages served by the section retriever; empty means all
    pub languages: Vec<String>,
}

impl Default for SectionObserverConfig {
    fn default() -> Self {
        Self {
            max_tracked_documents: 10,
            max_last_visited_sections: 10,
            refresh_after_ms: 60_000,
            reload_after_ms: 600_000,
            reload_line_delta: 3,
            history_budget_ratio: 0.4,
            languages: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct InFlight {
    id: u64,
    key: String,
    cancel: CancellationToken,
}

struct ObserverState {
    documents: LruCache<Uri, ActiveDocument>,
    last_visited: VecDeque<Location>,
    in_flight: Option<InFlight>,
    next_request: u64,
}

impl ObserverState {
    fn find(&self, location: &Location) -> Option<(&ActiveDocument, &Section)> {
        let document = self.documents.peek(&location.uri)?;
        let section = document.section_by_key(&location.key())?;
        Some((document, section))
    }

    fn push_visited(&mut self, location: Location, limit: usize) {
        let key = location.key();
        self.last_visited.retain(|visited| visited.key() != key);
        self.last_visited.push_front(location);
        self.last_visited.truncate(limit);
    }

    /// Aborts the outstanding fetch when it belongs to another section.
    fn start_request(&mut self, key: &str) -> (u64, CancellationToken) {
        if let Some(previous) = self.in_flight.take() {
            if previous.key != key {
                log::debug!("aborting graph context request for {}", previous.key);
                previous.cancel.cancel();
            }
        }
        let id = self.next_request;
        self.next_request += 1;
        let cancel = CancellationToken::new();
        self.in_flight = Some(InFlight {
            id,
            key: key.to_string(),
            cancel: cancel.clone(),
        });
        (id, cancel)
    }

    fn finish_request(&mut self, id: u64) {
        if self.in_flight.as_ref().is_some_and(|request| request.id == id) {
            self.in_flight = None;
        }
    }

    fn is_in_flight(&self, key: &str) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|request| request.key == key && !request.cancel.is_cancelled())
    }
}

enum ChangeOutcome {
    Untracked,
    Reload,
    Handled,
}

pub struct SectionObserver {
    host: Arc<dyn EditorHost>,
    symbols: Arc<dyn SymbolProvider>,
    graph: Arc<dyn GraphContextProvider>,
    config: SectionObserverConfig,
    state: Mutex<ObserverState>,
}

impl SectionObserver {
    pub fn new(
        host: Arc<dyn EditorHost>,
        symbols: Arc<dyn SymbolProvider>,
        graph: Arc<dyn GraphContextProvider>,
        config: SectionObserverConfig,
    ) -> Self {
        let capacity = NonZeroUsize::new(config.max_tracked_documents).unwrap_or(NonZeroUsize::MIN);
        Self {
            host,
            symbols,
            graph,
            state: Mutex::new(ObserverState {
                documents: LruCache::new(capacity),
                last_visited: VecDeque::new(),
                in_flight: None,
                next_request: 0,
            }),
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ObserverState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn config(&self) -> &SectionObserverConfig {
        &self.config
    }

    /// Load every visible document. Call once after construction.
    pub async fn start(&self) {
        let editors = self.host.visible_text_editors();
        self.on_did_change_visible_text_editors(&editors).await;
    }

    pub fn is_tracked(&self, uri: &Uri) -> bool {
        self.lock().documents.contains(uri)
    }

    /// Compute sections for `document` and merge them into what is tracked already.
    pub async fn load_document(&self, document: &TextDocument) -> Result<()> {
        let sections = self.symbols.get_document_sections(document).await?;
        let now = Instant::now();
        let mut state = self.lock();
        match state.documents.get_mut(&document.uri) {
            Some(active) => {
                active.merge_sections(sections);
                active.language_id = document.language_id.clone();
                active.last_revalidate_at = now;
                active.last_lines = document.line_count();
                log::debug!("reloaded sections of {}", document.uri);
            }
            None => {
                let active = ActiveDocument {
                    uri: document.uri.clone(),
                    language_id: document.language_id.clone(),
                    sections: sections.into_iter().map(Section::from).collect(),
                    last_revalidate_at: now,
                    last_lines: document.line_count(),
                };
                if let Some((evicted, _)) = state.documents.push(document.uri.clone(), active) {
                    log::debug!("no longer tracking {evicted}");
                }
            }
        }
        Ok(())
    }

    /// Start tracking newly visible `file` documents. Documents that went out of view are only
    /// dropped by the LRU.
    pub async fn on_did_change_visible_text_editors(&self, editors: &[TextEditor]) {
        let to_load: Vec<&TextDocument> = {
            let state = self.lock();
            editors
                .iter()
                .map(|editor| &editor.document)
                .filter(|document| document.uri.is_file() && !state.documents.contains(&document.uri))
                .collect()
        };
        let results = join_all(to_load.iter().map(|document| self.load_document(document))).await;
        for (document, result) in to_load.iter().zip(results) {
            if let Err(err) = result {
                log::warn!("failed to load sections of {}: {err}", document.uri);
            }
        }
    }

    pub async fn on_did_change_text_document(&self, event: &TextDocumentChangeEvent) {
        let outcome = self.classify_change(event);
        if matches!(outcome, ChangeOutcome::Reload) {
            if let Err(err) = self.load_document(&event.document).await {
                log::warn!("failed to reload sections of {}: {err}", event.document.uri);
            }
        }
    }

    fn classify_change(&self, event: &TextDocumentChangeEvent) -> ChangeOutcome {
        let now = Instant::now();
        let reload_after = Duration::from_millis(self.config.reload_after_ms);
        let mut state = self.lock();
        let Some(document) = state.documents.get_mut(&event.document.uri) else {
            return ChangeOutcome::Untracked;
        };

        let drift = document.last_lines.abs_diff(event.document.line_count());
        if drift >= self.config.reload_line_delta
            || now.duration_since(document.last_revalidate_at) > reload_after
        {
            return ChangeOutcome::Reload;
        }

        for change in event.content_changes.iter().filter(|c| c.text.contains('\n')) {
            if let Some(section) = document.section_at_mut(change.range.start) {
                section.state.mark_stale();
            }
        }
        ChangeOutcome::Handled
    }

    /// Hydrate the section under `position`, unless it holds fresh context already.
    ///
    /// Entering another section aborts the outstanding fetch; that fetch resolves to
    /// [`GraphError::Aborted`] and leaves its section untouched.
    pub async fn hydrate_context_at_cursor(&self, document: &TextDocument, position: Position) -> Result<()> {
        let refresh_after = Duration::from_millis(self.config.refresh_after_ms);
        let (location, name, request, cancel) = {
            let mut state = self.lock();
            let now = Instant::now();
            let Some((location, name)) = state
                .documents
                .get_mut(&document.uri)
                .and_then(|active| active.section_at(position))
                .map(|section| (section.location.clone(), section.name().to_string()))
            else {
                return Ok(());
            };
            let limit = self.config.max_last_visited_sections;
            state.push_visited(location.clone(), limit);

            let key = location.key();
            let in_flight = state.is_in_flight(&key);
            let Some(section) = state
                .documents
                .get_mut(&document.uri)
                .and_then(|active| active.section_by_key_mut(&key))
            else {
                return Ok(());
            };
            if !section.state.needs_refresh(now, refresh_after, in_flight) {
                return Ok(());
            }
            section.state.begin_loading(now);
            let (request, cancel) = state.start_request(&key);
            (location, name, request, cancel)
        };

        let started = Instant::now();
        let result = tokio::select! {
            () = cancel.cancelled() => Err(GraphError::Aborted),
            result = self.graph.get_graph_context_from_range(document, location.range, &cancel) => result,
        };
        let result = if cancel.is_cancelled() { Err(GraphError::Aborted) } else { result };

        let mut state = self.lock();
        state.finish_request(request);
        match result {
            Ok(context) => {
                log_hydrated(self.host.as_ref(), &context, document, &name, started);
                let section = state
                    .documents
                    .get_mut(&location.uri)
                    .and_then(|active| active.section_by_key_mut(&location.key()));
                if let Some(section) = section {
                    section.state.finish_loading(context);
                }
                Ok(())
            }
            Err(err) if err.is_abort() => {
                log::debug!("graph context for {} aborted", location.key());
                Err(err)
            }
            Err(err) => {
                log::error!("graph context for {} failed: {err}", location.key());
                if let Some(section) = state
                    .documents
                    .get_mut(&location.uri)
                    .and_then(|active| active.section_by_key_mut(&location.key()))
                {
                    section.state.fail();
                }
                Err(err)
            }
        }
    }

    /// Assemble context for a completion at `position`: text of recently visited sections first,
    /// then the graph context of the current section, all within `max_chars`. Nothing inside
    /// `context_range` of the same document is returned.
    pub async fn get_context_at_position(
        &self,
        document: &TextDocument,
        position: Position,
        max_chars: usize,
        context_range: Option<Range>,
    ) -> Result<Vec<ContextSnippet>> {
        let overlaps = |uri: &Uri, range: Option<Range>| match (context_range, range) {
            (Some(context_range), Some(range)) if *uri == document.uri => {
                context_range.contains_lines(range.start.line, range.end.line)
            }
            _ => false,
        };

        let (graph_context, history): (Option<Vec<HoverContext>>, Vec<Location>) = {
            let state = self.lock();
            let current = state
                .documents
                .peek(&document.uri)
                .and_then(|active| active.section_at(position));
            let current_key = current.map(|section| section.location.key());
            let graph_context = current.and_then(|section| section.state.graph_context().map(<[_]>::to_vec));

            let history = state
                .last_visited
                .iter()
                .filter_map(|location| state.find(location))
                .filter(|(active, _)| should_be_used_as_context(&document.language_id, &active.language_id))
                .map(|(_, section)| &section.location)
                .filter(|location| current_key.as_deref() != Some(location.key().as_str()))
                .filter(|location| !overlaps(&location.uri, Some(location.range)))
                .cloned()
                .collect();
            (graph_context, history)
        };

        let loaded = join_all(history.iter().map(|location| self.section_text(location))).await;

        let mut budget = CharBudget::new(max_chars);
        let history_limit = if graph_context.is_some() {
            (max_chars as f64 * self.config.history_budget_ratio).floor() as usize
        } else {
            max_chars
        };
        let mut context = Vec::new();
        for snippet in loaded.into_iter().flatten() {
            if budget.try_take_within(snippet.char_len(), history_limit) {
                context.push(snippet);
            }
        }

        if let Some(graph_context) = graph_context {
            let relevant = graph_context
                .iter()
                .filter(|hover| !overlaps(&hover.uri, hover.range));
            for snippet in hover_contexts_to_snippets(self.host.as_ref(), relevant) {
                if budget.try_take(snippet.char_len()) {
                    context.push(snippet);
                }
            }
        }
        Ok(context)
    }

    async fn section_text(&self, location: &Location) -> Option<ContextSnippet> {
        match self.host.open_text_document(&location.uri).await {
            Ok(document) => Some(ContextSnippet::File(FileSnippet {
                file_name: self.host.as_relative_path(&location.uri),
                uri: Some(location.uri.clone()),
                content: document.get_text(location.range).to_string(),
                identifier: Some(RetrieverIdentifier::GraphSection),
            })),
            Err(err) => {
                // Usually a file deleted since it was visited.
                log::debug!("skipping section history for {}: {err}", location.uri);
                None
            }
        }
    }

    /// Sections as currently tracked, for inspection
    pub fn sections(&self, uri: &Uri) -> Vec<DocumentSection> {
        self.lock()
            .documents
            .peek(uri)
            .map(|active| {
                active
                    .sections
                    .iter()
                    .map(|section| DocumentSection {
                        fuzzy_name: section.fuzzy_name.clone(),
                        location: section.location.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn forget_document(&self, uri: &Uri) {
        let mut state = self.lock();
        state.documents.pop(uri);
        state.last_visited.retain(|location| location.uri != *uri);
    }

    pub fn dispose(&self) {
        let mut state = self.lock();
        if let Some(request) = state.in_flight.take() {
            request.cancel.cancel();
        }
        state.documents.clear();
        state.last_visited.clear();
    }

    /// Tree view of tracked documents (most recently used first) and the visit history.
    /// Sections containing one of `selections` in `selected` are starred.
    pub fn debug_print(&self, selected: Option<&Uri>, selections: &[Position]) -> String {
        let state = self.lock();
        let mut lines = Vec::new();
        for (uri, document) in state.documents.iter() {
            lines.push(self.host.as_relative_path(uri));
            for (index, section) in document.sections.iter().enumerate() {
                let is_last = index + 1 == document.sections.len();
                let is_selected = selected == Some(uri)
                    && selections.iter().any(|p| section.location.range.contains(*p));
                let mut line = format!(
                    "  {}{} {}",
                    if is_last { '└' } else { '├' },
                    if is_selected { '*' } else { '─' },
                    section.name()
                );
                if section.state.is_hydrated() {
                    let amount = section
                        .state
                        .graph_context()
                        .map_or_else(|| "loading".to_string(), |c| format!("{} snippets", c.len()));
                    let dirty = if section.state.is_stale() { ", dirty" } else { "" };
                    line.push_str(&format!(" ({amount}{dirty})"));
                }
                lines.push(line);
            }
        }

        let visited: Vec<&Section> = state
            .last_visited
            .iter()
            .filter_map(|location| state.find(location).map(|(_, section)| section))
            .collect();
        if !visited.is_empty() {
            lines.push(String::new());
            lines.push("Last visited sections:".to_string());
            for (index, section) in visited.iter().enumerate() {
                let branch = if index + 1 == visited.len() { '└' } else { '├' };
                lines.push(format!(
                    "  {branch} {} {}",
                    self.host.as_relative_path(&section.location.uri),
                    section.name()
                ));
            }
        }
        lines.join("\n")
    }
}

fn log_hydrated(
    host: &dyn EditorHost,
    context: &[HoverContext],
    document: &TextDocument,
    section: &str,
    started: Instant,
) {
    if !log::log_enabled!(log::Level::Debug) {
        return;
    }
    let mut symbols: BTreeMap<String, BTreeSet<&str>> = BTreeMap::new();
    for hover in context {
        symbols
            .entry(host.as_relative_path(&hover.uri))
            .or_default()
            .insert(hover.symbol_name.as_str());
    }
    log::debug!(
        "preloaded {} graph matches for {}#{section} (took {}ms): {symbols:?}",
        context.len(),
        host.as_relative_path(&document.uri),
        started.elapsed().as_millis()
    );
}

#[async_trait]
impl EditorEventHandler for SectionObserver {
    async fn handle_event(&self, event: &EditorEvent) {
        match event {
            EditorEvent::DidChangeVisibleTextEditors(editors) => {
                self.on_did_change_visible_text_editors(editors).await;
            }
            EditorEvent::DidChangeTextDocument(change) => self.on_did_change_text_document(change).await,
            EditorEvent::DidChangeTextEditorSelection(selection) => {
                match self
                    .hydrate_context_at_cursor(&selection.document, selection.position)
                    .await
                {
                    Ok(()) => {}
                    Err(err) if err.is_abort() => {}
                    Err(err) => log::debug!("hydration after cursor move failed: {err}"),
                }
            }
            EditorEvent::DidRenameFiles(renames) => {
                for rename in renames {
                    self.forget_document(&rename.old_uri);
                }
            }
            EditorEvent::DidDeleteFiles(uris) => {
                for uri in uris {
                    self.forget_document(uri);
                }
            }
            EditorEvent::DidOpenTextDocument(_) | EditorEvent::DidChangeTabGroups => {}
        }
    }
}
