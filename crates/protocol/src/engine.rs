use crate::document::{Position, Range, Uri};
use crate::snippet::{FileSnippet, SymbolSnippet};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Request sent to an out-of-process graph/index engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ContextAtPositionRequest {
    pub uri: Uri,
    pub content: String,
    pub position: Position,
    pub max_chars: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_range: Option<Range>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ContextAtPositionResponse {
    #[serde(default)]
    pub symbols: Vec<SymbolSnippet>,
    #[serde(default)]
    pub files: Vec<FileSnippet>,
}
