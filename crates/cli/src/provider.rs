use crate::session::SessionSymbol;
use async_trait::async_trait;
use context_graph::{GraphContextProvider, GraphError, Result};
use context_protocol::{HoverContext, Range, TextDocument, Uri};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z_$][\w$]*").expect("identifier regex"));

/// Resolves identifiers used in a range against the symbols recorded in the session, standing
/// in for a language server's definition and hover lookups.
pub struct SessionGraphProvider {
    symbols: Vec<HoverContext>,
}

impl SessionGraphProvider {
    pub fn new(root: &str, symbols: &[SessionSymbol]) -> Self {
        let symbols = symbols
            .iter()
            .map(|symbol| HoverContext {
                uri: workspace_uri(root, &symbol.path),
                range: symbol.range,
                symbol_name: symbol.symbol.clone(),
                source_symbol_name: None,
                kind: symbol.kind,
                content: symbol.content.lines().map(str::to_string).collect(),
            })
            .collect();
        Self { symbols }
    }
}

#[async_trait]
impl GraphContextProvider for SessionGraphProvider {
    async fn get_graph_context_from_range(
        &self,
        document: &TextDocument,
        range: Range,
        cancel: &CancellationToken,
    ) -> Result<Vec<HoverContext>> {
        if cancel.is_cancelled() {
            return Err(GraphError::Aborted);
        }
        let used: HashSet<&str> = IDENTIFIER
            .find_iter(document.get_text(range))
            .map(|m| m.as_str())
            .collect();

        Ok(self
            .symbols
            .iter()
            .filter(|symbol| used.contains(symbol.symbol_name.as_str()))
            // Skip definitions that live inside the range itself.
            .filter(|symbol| match symbol.range {
                Some(own) if symbol.uri == document.uri => !range.contains_lines(own.start.line, own.end.line),
                _ => true,
            })
            .cloned()
            .collect())
    }
}

/// `file://` URI of a session path. Absolute paths are taken as is.
pub fn workspace_uri(root: &str, path: &str) -> Uri {
    if path.starts_with('/') {
        Uri::file(path)
    } else {
        Uri::file(&format!("{}/{path}", root.trim_end_matches('/')))
    }
}
