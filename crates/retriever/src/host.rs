//! Editor host abstraction: the handful of host queries the retrievers need, the event payloads
//! the host delivers, and an in-memory host for tests and replays.

use crate::error::{Result, RetrieverError};
use async_trait::async_trait;
use context_protocol::{ContentChange, Position, Range, TextDocument, Uri};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEditor {
    pub document: TextDocument,
    pub selection: Range,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tab {
    pub label: String,
    #[serde(default)]
    pub uri: Option<Uri>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabGroup {
    #[serde(default)]
    pub is_active: bool,
    pub tabs: Vec<Tab>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextDocumentChangeEvent {
    /// Document after the changes were applied
    pub document: TextDocument,
    pub content_changes: Vec<ContentChange>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionChangeEvent {
    pub document: TextDocument,
    /// Active cursor position
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRename {
    pub old_uri: Uri,
    pub new_uri: Uri,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorEvent {
    DidOpenTextDocument(TextDocument),
    DidChangeTextDocument(TextDocumentChangeEvent),
    DidChangeTextEditorSelection(SelectionChangeEvent),
    DidChangeVisibleTextEditors(Vec<TextEditor>),
    DidChangeTabGroups,
    DidRenameFiles(Vec<FileRename>),
    DidDeleteFiles(Vec<Uri>),
}

/// Queries answered by the editor. Implementations must be cheap to call from retrieval paths.
#[async_trait]
pub trait EditorHost: Send + Sync {
    async fn open_text_document(&self, uri: &Uri) -> Result<TextDocument>;

    fn visible_text_editors(&self) -> Vec<TextEditor>;

    fn tab_groups(&self) -> Vec<TabGroup>;

    /// Path shown to the model for `uri`, relative to the workspace when possible
    fn as_relative_path(&self, uri: &Uri) -> String;
}

/// Components that react to editor events.
#[async_trait]
pub trait EditorEventHandler: Send + Sync {
    async fn handle_event(&self, event: &EditorEvent);
}

#[derive(Debug, Default)]
struct MemoryState {
    documents: HashMap<Uri, TextDocument>,
    visible: Vec<(Uri, Range)>,
    tab_groups: Vec<TabGroup>,
}

/// Editor host backed by in-memory documents.
#[derive(Debug, Default)]
pub struct MemoryEditorHost {
    workspace_root: Option<String>,
    state: Mutex<MemoryState>,
}

impl MemoryEditorHost {
    pub fn new(workspace_root: Option<String>) -> Self {
        Self {
            workspace_root: workspace_root.map(|root| root.trim_end_matches('/').to_string()),
            state: Mutex::new(MemoryState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn open(&self, document: TextDocument) -> EditorEvent {
        self.lock()
            .documents
            .insert(document.uri.clone(), document.clone());
        EditorEvent::DidOpenTextDocument(document)
    }

    pub fn document(&self, uri: &Uri) -> Option<TextDocument> {
        self.lock().documents.get(uri).cloned()
    }

    /// Apply `changes` in order and return the resulting change event.
    pub fn change(&self, uri: &Uri, changes: Vec<ContentChange>) -> Result<EditorEvent> {
        let mut state = self.lock();
        let document = state
            .documents
            .get_mut(uri)
            .ok_or_else(|| RetrieverError::DocumentUnavailable(uri.clone()))?;
        for change in &changes {
            document.apply_change(change);
        }
        Ok(EditorEvent::DidChangeTextDocument(TextDocumentChangeEvent {
            document: document.clone(),
            content_changes: changes,
        }))
    }

    pub fn select(&self, uri: &Uri, position: Position) -> Result<EditorEvent> {
        let mut state = self.lock();
        let document = state
            .documents
            .get(uri)
            .cloned()
            .ok_or_else(|| RetrieverError::DocumentUnavailable(uri.clone()))?;
        if let Some(entry) = state.visible.iter_mut().find(|(u, _)| u == uri) {
            entry.1 = Range {
                start: position,
                end: position,
            };
        }
        Ok(EditorEvent::DidChangeTextEditorSelection(SelectionChangeEvent {
            document,
            position,
        }))
    }

    /// Replace the visible editors. Unknown URIs are skipped.
    pub fn set_visible(&self, uris: &[Uri]) -> EditorEvent {
        {
            let mut state = self.lock();
            let visible = uris
                .iter()
                .filter(|uri| state.documents.contains_key(*uri))
                .map(|uri| {
                    let previous = state.visible.iter().find(|(u, _)| u == uri).map(|(_, r)| *r);
                    (uri.clone(), previous.unwrap_or_default())
                })
                .collect();
            state.visible = visible;
        }
        EditorEvent::DidChangeVisibleTextEditors(self.visible_text_editors())
    }

    pub fn set_tab_groups(&self, groups: Vec<TabGroup>) -> EditorEvent {
        self.lock().tab_groups = groups;
        EditorEvent::DidChangeTabGroups
    }

    pub fn rename(&self, old_uri: &Uri, new_uri: &Uri) -> EditorEvent {
        let mut state = self.lock();
        if let Some(mut document) = state.documents.remove(old_uri) {
            document.uri = new_uri.clone();
            state.documents.insert(new_uri.clone(), document);
        }
        for (uri, _) in state.visible.iter_mut().filter(|(u, _)| u == old_uri) {
            *uri = new_uri.clone();
        }
        EditorEvent::DidRenameFiles(vec![FileRename {
            old_uri: old_uri.clone(),
            new_uri: new_uri.clone(),
        }])
    }

    pub fn delete(&self, uri: &Uri) -> EditorEvent {
        let mut state = self.lock();
        state.documents.remove(uri);
        state.visible.retain(|(u, _)| u != uri);
        EditorEvent::DidDeleteFiles(vec![uri.clone()])
    }
}

#[async_trait]
impl EditorHost for MemoryEditorHost {
    async fn open_text_document(&self, uri: &Uri) -> Result<TextDocument> {
        self.document(uri)
            .ok_or_else(|| RetrieverError::DocumentUnavailable(uri.clone()))
    }

    fn visible_text_editors(&self) -> Vec<TextEditor> {
        let state = self.lock();
        state
            .visible
            .iter()
            .filter_map(|(uri, selection)| {
                state.documents.get(uri).map(|document| TextEditor {
                    document: document.clone(),
                    selection: *selection,
                })
            })
            .collect()
    }

    fn tab_groups(&self) -> Vec<TabGroup> {
        self.lock().tab_groups.clone()
    }

    fn as_relative_path(&self, uri: &Uri) -> String {
        let Some(path) = uri.fs_path() else {
            return uri.to_string();
        };
        match &self.workspace_root {
            Some(root) => path
                .strip_prefix(root.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
                .unwrap_or(path)
                .to_string(),
            None => path.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn change_applies_edits_and_reports_new_text() {
        let host = MemoryEditorHost::new(Some("/repo/".to_string()));
        let uri = Uri::file("/repo/src/a.ts");
        host.open(TextDocument::new(uri.clone(), "typescript", "let a = 1;\n"));

        let event = host
            .change(
                &uri,
                vec![ContentChange {
                    range: Range::new(0, 8, 0, 9),
                    text: "2".to_string(),
                }],
            )
            .unwrap();
        let EditorEvent::DidChangeTextDocument(change) = event else {
            panic!("expected a change event");
        };
        assert_eq!(change.document.text, "let a = 2;\n");
        assert_eq!(host.open_text_document(&uri).await.unwrap().version, 2);
        assert_eq!(host.as_relative_path(&uri), "src/a.ts");
    }

    #[tokio::test]
    async fn unknown_documents_are_unavailable() {
        let host = MemoryEditorHost::default();
        let uri = Uri::file("/nope.ts");
        assert_eq!(
            host.open_text_document(&uri).await,
            Err(RetrieverError::DocumentUnavailable(uri.clone()))
        );
        host.set_visible(&[uri]);
        assert!(host.visible_text_editors().is_empty());
    }

    #[test]
    fn rename_moves_visible_editor() {
        let host = MemoryEditorHost::default();
        let old = Uri::file("/a.ts");
        let new = Uri::file("/b.ts");
        host.open(TextDocument::new(old.clone(), "typescript", "x"));
        host.set_visible(&[old.clone()]);
        host.rename(&old, &new);

        let visible = host.visible_text_editors();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].document.uri, new);
    }
}
