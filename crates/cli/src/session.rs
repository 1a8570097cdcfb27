//! Recorded editor sessions.
//!
//! ```json
//! {
//!   "root": "/workspace",
//!   "documents": [{ "path": "src/a.ts", "language_id": "typescript", "text": "..." }],
//!   "visible": ["src/a.ts"],
//!   "symbols": [{ "path": "src/lib.ts", "symbol": "total", "content": "function total() {}" }],
//!   "steps": [
//!     { "type": "select", "path": "src/a.ts", "line": 3 },
//!     { "type": "context", "path": "src/a.ts", "line": 3, "character": 4 }
//!   ]
//! }
//! ```

use anyhow::{Context as AnyhowContext, Result};
use context_protocol::{HoverContextKind, Range};
use serde::Deserialize;
use std::fs;
use std::io::{self, Read};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Session {
    #[serde(default = "default_root")]
    pub root: String,
    #[serde(default)]
    pub documents: Vec<SessionDocument>,
    #[serde(default)]
    pub visible: Vec<String>,
    /// Definitions the graph provider can resolve
    #[serde(default)]
    pub symbols: Vec<SessionSymbol>,
    pub steps: Vec<Step>,
}

fn default_root() -> String {
    "/workspace".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SessionDocument {
    pub path: String,
    #[serde(default = "default_language")]
    pub language_id: String,
    pub text: String,
}

fn default_language() -> String {
    "typescript".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SessionSymbol {
    pub path: String,
    pub symbol: String,
    #[serde(default = "default_kind")]
    pub kind: HoverContextKind,
    #[serde(default)]
    pub range: Option<Range>,
    pub content: String,
}

fn default_kind() -> HoverContextKind {
    HoverContextKind::Definition
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    Open {
        path: String,
        #[serde(default = "default_language")]
        language_id: String,
        text: String,
    },
    Change {
        path: String,
        range: Range,
        text: String,
    },
    Select {
        path: String,
        line: u32,
        #[serde(default)]
        character: u32,
    },
    Visible {
        paths: Vec<String>,
    },
    Rename {
        from: String,
        to: String,
    },
    Delete {
        path: String,
    },
    Context {
        path: String,
        line: u32,
        #[serde(default)]
        character: u32,
        #[serde(default)]
        max_chars: Option<usize>,
    },
    CacheAdd {
        path: String,
        line: u32,
        #[serde(default)]
        character: u32,
        log_id: String,
        completions: Vec<String>,
    },
    CacheGet {
        path: String,
        line: u32,
        #[serde(default)]
        character: u32,
    },
    /// Print the section observer's view of the session
    Sections,
    SleepMs {
        ms: u64,
    },
}

impl Session {
    /// Read a session from `path`, or from stdin when `path` is `-`.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = if path == Path::new("-") {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read session from stdin")?;
            buf
        } else {
            fs::read_to_string(path).with_context(|| format!("Failed to read session {}", path.display()))?
        };
        Self::parse(&raw).with_context(|| format!("Invalid session {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn steps_are_tagged_by_type() {
        let session = Session::parse(
            r#"{
                "documents": [{ "path": "a.py", "language_id": "python", "text": "x = 1" }],
                "steps": [
                    { "type": "select", "path": "a.py", "line": 0 },
                    { "type": "cache_add", "path": "a.py", "line": 0, "character": 4,
                      "log_id": "l1", "completions": ["1"] },
                    { "type": "sleep_ms", "ms": 5 },
                    { "type": "sections" }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(session.root, "/workspace");
        assert_eq!(session.documents[0].language_id, "python");
        assert_eq!(
            session.steps[0],
            Step::Select {
                path: "a.py".to_string(),
                line: 0,
                character: 0
            }
        );
        assert!(matches!(session.steps[1], Step::CacheAdd { character: 4, .. }));
        assert_eq!(session.steps[2], Step::SleepMs { ms: 5 });
        assert_eq!(session.steps[3], Step::Sections);
    }

    #[test]
    fn unknown_step_is_an_error() {
        let err = Session::parse(r#"{ "steps": [{ "type": "teleport" }] }"#).unwrap_err();
        assert!(err.to_string().contains("teleport"));
    }
}
