use crate::cached::{RetrievalContext, RetrievalStrategy};
use crate::error::Result;
use crate::retriever::RetrieverOptions;
use async_trait::async_trait;
use context_protocol::{
    should_be_used_as_context, ContextSnippet, FileSnippet, RetrieverIdentifier, TextDocument,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").expect("identifier regex"));

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct JaccardConfig {
    /// Lines around the cursor compared against other files
    pub target_lines: usize,
    pub window_lines: usize,
    pub window_step: usize,
    pub max_matches: usize,
}

impl Default for JaccardConfig {
    fn default() -> Self {
        Self {
            target_lines: 20,
            window_lines: 50,
            window_step: 10,
            max_matches: 5,
        }
    }
}

/// Finds the window of each visible editor most similar to the code around the cursor.
#[derive(Debug, Default)]
pub struct JaccardSimilarityStrategy {
    config: JaccardConfig,
}

#[derive(Debug, Clone, PartialEq)]
struct WindowMatch {
    score: f64,
    content: String,
}

impl JaccardSimilarityStrategy {
    pub fn new(config: JaccardConfig) -> Self {
        Self { config }
    }

    fn target_window(&self, document: &TextDocument, line: u32) -> String {
        let lines: Vec<&str> = document.text.lines().collect();
        let end = (line as usize + 1).min(lines.len());
        let start = end.saturating_sub(self.config.target_lines);
        lines[start..end].join("\n")
    }

    fn best_window(&self, text: &str, target: &HashSet<String>) -> Option<WindowMatch> {
        let lines: Vec<&str> = text.lines().collect();
        let size = self.config.window_lines.max(1);
        let step = self.config.window_step.max(1);
        let mut best: Option<WindowMatch> = None;
        let mut start = 0;
        loop {
            let end = (start + size).min(lines.len());
            let content = lines[start..end].join("\n");
            let score = jaccard(target, &tokenize(&content));
            if score > 0.0 && best.as_ref().map_or(true, |b| score > b.score) {
                best = Some(WindowMatch { score, content });
            }
            if end >= lines.len() {
                break;
            }
            start += step;
        }
        best
    }
}

#[async_trait]
impl RetrievalStrategy for JaccardSimilarityStrategy {
    fn identifier(&self) -> RetrieverIdentifier {
        RetrieverIdentifier::JaccardSimilarity
    }

    fn to_cache_key(&self, options: &RetrieverOptions) -> String {
        let mut hasher = DefaultHasher::new();
        self.target_window(&options.document, options.position.line)
            .hash(&mut hasher);
        format!(
            "{}:{}:{:x}",
            options.document.uri,
            options.position.line,
            hasher.finish()
        )
    }

    fn is_supported_for_language_id(&self, _language_id: &str) -> bool {
        true
    }

    async fn do_retrieval(
        &self,
        ctx: &RetrievalContext,
        options: &RetrieverOptions,
    ) -> Result<Vec<ContextSnippet>> {
        let target = tokenize(&self.target_window(&options.document, options.position.line));
        if target.is_empty() {
            return Ok(Vec::new());
        }

        let mut matches = Vec::new();
        for editor in ctx.visible_text_editors() {
            let uri = &editor.document.uri;
            if *uri == options.document.uri
                || !should_be_used_as_context(&options.document.language_id, &editor.document.language_id)
            {
                continue;
            }
            ctx.check_cancelled()?;
            let Some(document) = ctx.open_text_document(uri).await? else {
                continue;
            };
            if let Some(found) = self.best_window(&document.text, &target) {
                matches.push((found, ctx.as_relative_path(uri), document.uri));
            }
        }

        matches.sort_by(|a, b| b.0.score.total_cmp(&a.0.score));
        Ok(matches
            .into_iter()
            .take(self.config.max_matches)
            .map(|(found, file_name, uri)| {
                ContextSnippet::File(FileSnippet {
                    file_name,
                    uri: Some(uri),
                    content: found.content,
                    identifier: Some(RetrieverIdentifier::JaccardSimilarity),
                })
            })
            .collect())
    }
}

fn tokenize(text: &str) -> HashSet<String> {
    IDENTIFIER
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}
