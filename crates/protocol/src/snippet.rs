use crate::document::{Range, Uri};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Which retriever produced a snippet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum RetrieverIdentifier {
    JaccardSimilarity,
    RecentEdits,
    GraphSection,
    GraphEngine,
    Embeddings,
}

impl RetrieverIdentifier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::JaccardSimilarity => "jaccard-similarity",
            Self::RecentEdits => "recent-edits",
            Self::GraphSection => "graph-section",
            Self::GraphEngine => "graph-engine",
            Self::Embeddings => "embeddings",
        }
    }

    /// Bucket used by [`ContextSummary`]
    pub fn source(self) -> ContextSource {
        match self {
            Self::JaccardSimilarity | Self::RecentEdits => ContextSource::Local,
            Self::GraphSection | Self::GraphEngine => ContextSource::Graph,
            Self::Embeddings => ContextSource::Embeddings,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ContextSource {
    Local,
    Embeddings,
    Graph,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum HoverContextKind {
    Definition,
    Reference,
    Hover,
    Implementation,
}

impl HoverContextKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Definition => "definition",
            Self::Reference => "reference",
            Self::Hover => "hover",
            Self::Implementation => "implementation",
        }
    }
}

/// Graph-derived context for one symbol, as returned by the symbol/graph provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct HoverContext {
    pub uri: Uri,
    #[serde(default)]
    pub range: Option<Range>,
    pub symbol_name: String,
    #[serde(default)]
    pub source_symbol_name: Option<String>,
    #[serde(rename = "type")]
    pub kind: HoverContextKind,
    pub content: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FileSnippet {
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<Uri>,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<RetrieverIdentifier>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SymbolRelationship {
    pub symbol: String,
    pub relationship: HoverContextKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SymbolSnippet {
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<Uri>,
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_symbol_and_relationship: Option<SymbolRelationship>,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<RetrieverIdentifier>,
}

/// A piece of context handed to the prompt builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ContextSnippet {
    Symbol(SymbolSnippet),
    File(FileSnippet),
}

impl ContextSnippet {
    pub fn file(file_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self::File(FileSnippet {
            file_name: file_name.into(),
            uri: None,
            content: content.into(),
            identifier: None,
        })
    }

    pub fn file_name(&self) -> &str {
        match self {
            Self::Symbol(s) => &s.file_name,
            Self::File(f) => &f.file_name,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Self::Symbol(s) => &s.content,
            Self::File(f) => &f.content,
        }
    }

    pub fn symbol(&self) -> Option<&str> {
        match self {
            Self::Symbol(s) => Some(&s.symbol),
            Self::File(_) => None,
        }
    }

    pub fn identifier(&self) -> Option<RetrieverIdentifier> {
        match self {
            Self::Symbol(s) => s.identifier,
            Self::File(f) => f.identifier,
        }
    }

    #[must_use]
    pub fn with_identifier(mut self, identifier: RetrieverIdentifier) -> Self {
        match &mut self {
            Self::Symbol(s) => s.identifier = Some(identifier),
            Self::File(f) => f.identifier = Some(identifier),
        }
        self
    }

    /// Budget cost of this snippet
    pub fn char_len(&self) -> usize {
        self.content().chars().count()
    }

    /// Deduplication identity: the file for whole-file snippets, file and symbol otherwise
    pub fn identity(&self) -> String {
        match self {
            Self::Symbol(s) => format!("{}\n{}", s.file_name, s.symbol),
            Self::File(f) => f.file_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ContextSummary {
    pub strategy: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embeddings: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph: Option<usize>,
    pub duration_ms: u64,
}

impl ContextSummary {
    pub fn record(&mut self, source: ContextSource) {
        let slot = match source {
            ContextSource::Local => &mut self.local,
            ContextSource::Embeddings => &mut self.embeddings,
            ContextSource::Graph => &mut self.graph,
        };
        *slot = Some(slot.unwrap_or(0) + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn untagged_snippets_round_trip_by_shape() {
        let raw = r#"[
            {"file_name": "a.ts", "content": "const a = 1"},
            {"file_name": "b.ts", "symbol": "foo", "content": "function foo() {}"}
        ]"#;
        let snippets: Vec<ContextSnippet> = serde_json::from_str(raw).unwrap();
        assert!(matches!(snippets[0], ContextSnippet::File(_)));
        assert_eq!(snippets[1].symbol(), Some("foo"));
        assert_eq!(snippets[1].identity(), "b.ts\nfoo");
    }

    #[test]
    fn summary_counts_per_source() {
        let mut summary = ContextSummary {
            strategy: "mixed".to_string(),
            ..ContextSummary::default()
        };
        summary.record(RetrieverIdentifier::JaccardSimilarity.source());
        summary.record(RetrieverIdentifier::RecentEdits.source());
        summary.record(RetrieverIdentifier::GraphSection.source());
        assert_eq!(summary.local, Some(2));
        assert_eq!(summary.graph, Some(1));
        assert_eq!(summary.embeddings, None);
    }
}
