use crate::error::Result;
use crate::host::{EditorEvent, EditorEventHandler, EditorHost, TextDocumentChangeEvent};
use crate::retriever::{ContextRetriever, RetrieverOptions};
use async_trait::async_trait;
use context_protocol::{
    should_be_used_as_context, ContextSnippet, FileSnippet, RetrieverIdentifier, TextDocument, Uri,
};
use serde::Deserialize;
use similar::TextDiff;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RecentEditsConfig {
    /// Edits older than this are folded into the baseline and no longer shown
    pub max_age_ms: u64,
    pub context_lines: usize,
}

impl Default for RecentEditsConfig {
    fn default() -> Self {
        Self {
            max_age_ms: 60_000,
            context_lines: 3,
        }
    }
}

#[derive(Debug)]
struct TrackedChange {
    at: Instant,
    content_after: String,
}

#[derive(Debug)]
struct TrackedDocument {
    language_id: String,
    baseline: String,
    changes: VecDeque<TrackedChange>,
    edited: bool,
}

impl TrackedDocument {
    fn fold_older_than(&mut self, now: Instant, max_age: Duration) {
        while let Some(change) = self.changes.front() {
            if now.duration_since(change.at) <= max_age {
                break;
            }
            if let Some(change) = self.changes.pop_front() {
                self.baseline = change.content_after;
            }
        }
    }
}

/// Surfaces the user's own recent edits as unified diffs, newest first.
pub struct RecentEditsRetriever {
    host: Arc<dyn EditorHost>,
    max_age: Duration,
    context_lines: usize,
    documents: Mutex<HashMap<Uri, TrackedDocument>>,
}

impl RecentEditsRetriever {
    pub fn new(host: Arc<dyn EditorHost>, config: &RecentEditsConfig) -> Self {
        Self {
            host,
            max_age: Duration::from_millis(config.max_age_ms),
            context_lines: config.context_lines,
            documents: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uri, TrackedDocument>> {
        self.documents.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn track(&self, document: &TextDocument) {
        if !document.uri.is_file() {
            return;
        }
        self.lock()
            .entry(document.uri.clone())
            .or_insert_with(|| TrackedDocument {
                language_id: document.language_id.clone(),
                baseline: document.text.clone(),
                changes: VecDeque::new(),
                edited: false,
            });
    }

    pub fn is_tracked(&self, uri: &Uri) -> bool {
        self.lock().contains_key(uri)
    }

    fn record_change(&self, event: &TextDocumentChangeEvent) {
        if event.content_changes.is_empty() {
            return;
        }
        let now = Instant::now();
        let max_age = self.max_age;
        if let Some(tracked) = self.lock().get_mut(&event.document.uri) {
            tracked.edited = true;
            tracked.changes.push_back(TrackedChange {
                at: now,
                content_after: event.document.text.clone(),
            });
            tracked.fold_older_than(now, max_age);
        }
    }

    fn rename(&self, old_uri: &Uri, new_uri: &Uri) {
        let mut documents = self.lock();
        if let Some(tracked) = documents.remove(old_uri) {
            documents.insert(new_uri.clone(), tracked);
        }
    }

    fn forget(&self, uri: &Uri) {
        self.lock().remove(uri);
    }

    /// Uris shown in a visible editor or held by a tab.
    fn open_uris(&self) -> HashSet<Uri> {
        let visible = self.host.visible_text_editors().into_iter().map(|editor| editor.document.uri);
        let tabs = self
            .host
            .tab_groups()
            .into_iter()
            .flat_map(|group| group.tabs)
            .filter_map(|tab| tab.uri);
        visible.chain(tabs).collect()
    }

    fn unified_diff(&self, path: &str, old: &str, new: &str) -> Option<String> {
        if old == new {
            return None;
        }
        let diff = TextDiff::from_lines(old, new)
            .unified_diff()
            .context_radius(self.context_lines)
            .header(path, path)
            .to_string();
        (!diff.trim().is_empty()).then_some(diff)
    }
}

#[async_trait]
impl ContextRetriever for RecentEditsRetriever {
    fn identifier(&self) -> RetrieverIdentifier {
        RetrieverIdentifier::RecentEdits
    }

    async fn retrieve(&self, options: &RetrieverOptions) -> Result<Vec<ContextSnippet>> {
        let now = Instant::now();
        let open = self.open_uris();
        let mut pending: Vec<(Instant, Uri, String, String)> = Vec::new();
        {
            let mut documents = self.lock();
            documents.retain(|uri, tracked| {
                tracked.fold_older_than(now, self.max_age);
                // Edited documents whose edits all expired are dropped once no editor holds them.
                !(tracked.edited && tracked.changes.is_empty() && !open.contains(uri))
            });
            for (uri, tracked) in documents.iter() {
                let Some(latest) = tracked.changes.back() else {
                    continue;
                };
                if !should_be_used_as_context(&options.document.language_id, &tracked.language_id) {
                    continue;
                }
                pending.push((
                    latest.at,
                    uri.clone(),
                    tracked.baseline.clone(),
                    latest.content_after.clone(),
                ));
            }
        }

        pending.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        Ok(pending
            .into_iter()
            .filter_map(|(_, uri, before, after)| {
                let file_name = self.host.as_relative_path(&uri);
                let content = self.unified_diff(&file_name, &before, &after)?;
                Some(ContextSnippet::File(FileSnippet {
                    file_name,
                    uri: Some(uri),
                    content,
                    identifier: Some(RetrieverIdentifier::RecentEdits),
                }))
            })
            .collect())
    }

    fn is_supported_for_language_id(&self, _language_id: &str) -> bool {
        true
    }
}

#[async_trait]
impl EditorEventHandler for RecentEditsRetriever {
    async fn handle_event(&self, event: &EditorEvent) {
        match event {
            EditorEvent::DidOpenTextDocument(document) => self.track(document),
            EditorEvent::DidChangeVisibleTextEditors(editors) => {
                for editor in editors {
                    self.track(&editor.document);
                }
            }
            EditorEvent::DidChangeTextDocument(change) => self.record_change(change),
            EditorEvent::DidRenameFiles(renames) => {
                for rename in renames {
                    self.rename(&rename.old_uri, &rename.new_uri);
                }
            }
            EditorEvent::DidDeleteFiles(uris) => {
                for uri in uris {
                    self.forget(uri);
                }
            }
            EditorEvent::DidChangeTextEditorSelection(_) | EditorEvent::DidChangeTabGroups => {}
        }
    }
}
