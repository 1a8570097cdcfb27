use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Document identifier as handed out by the editor host (`file:///abs/path`, `untitled:Untitled-1`)
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct Uri(String);

impl Uri {
    pub fn parse(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Build a `file://` URI from an absolute path
    pub fn file(path: &str) -> Self {
        if path.starts_with('/') {
            Self(format!("file://{path}"))
        } else {
            Self(format!("file:///{path}"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn scheme(&self) -> &str {
        self.0.split_once(':').map_or("", |(scheme, _)| scheme)
    }

    pub fn is_file(&self) -> bool {
        self.scheme() == "file"
    }

    /// Filesystem path for `file` URIs
    pub fn fs_path(&self) -> Option<&str> {
        self.0.strip_prefix("file://")
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Zero-based line/character position. `character` counts chars within the line.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    JsonSchema,
)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub const fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub const fn new(start_line: u32, start_character: u32, end_line: u32, end_character: u32) -> Self {
        Self {
            start: Position::new(start_line, start_character),
            end: Position::new(end_line, end_character),
        }
    }

    /// Inclusive on both ends, like the editor's own range check
    pub fn contains(&self, position: Position) -> bool {
        self.start <= position && position <= self.end
    }

    /// True when `[start_line, end_line]` lies entirely inside this range's lines
    pub fn contains_lines(&self, start_line: u32, end_line: u32) -> bool {
        self.start.line <= start_line && self.end.line >= end_line
    }

    pub fn line_span(&self) -> u32 {
        self.end.line.saturating_sub(self.start.line)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Location {
    pub uri: Uri,
    pub range: Range,
}

impl Location {
    pub fn new(uri: Uri, range: Range) -> Self {
        Self { uri, range }
    }

    /// Identity of a location across edits. Only the start is part of the key, so a symbol whose
    /// body grows or shrinks keeps its identity.
    pub fn key(&self) -> String {
        format!(
            "{}?L{}:{}",
            self.uri, self.range.start.line, self.range.start.character
        )
    }
}

/// A single content change, expressed against the document before the change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ContentChange {
    pub range: Range,
    pub text: String,
}

/// Snapshot of an open text document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TextDocument {
    pub uri: Uri,
    pub language_id: String,
    #[serde(default)]
    pub version: i32,
    pub text: String,
}

impl TextDocument {
    pub fn new(uri: Uri, language_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            uri,
            language_id: language_id.into(),
            version: 1,
            text: text.into(),
        }
    }

    pub fn line_count(&self) -> u32 {
        let lines = self.text.bytes().filter(|b| *b == b'\n').count() + 1;
        u32::try_from(lines).unwrap_or(u32::MAX)
    }

    /// Line text without its terminator
    pub fn line_at(&self, line: u32) -> Option<&str> {
        self.text
            .split('\n')
            .nth(line as usize)
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
    }

    /// Byte offset of `position`, clamped to the document and the line length.
    pub fn offset_at(&self, position: Position) -> usize {
        let mut line_start = 0usize;
        for _ in 0..position.line {
            match self.text[line_start..].find('\n') {
                Some(idx) => line_start += idx + 1,
                None => return self.text.len(),
            }
        }
        let line_end = self.text[line_start..]
            .find('\n')
            .map_or(self.text.len(), |idx| line_start + idx);
        let line = &self.text[line_start..line_end];
        let within = line
            .char_indices()
            .nth(position.character as usize)
            .map_or(line.len(), |(idx, _)| idx);
        line_start + within
    }

    pub fn position_at(&self, offset: usize) -> Position {
        let offset = offset.min(self.text.len());
        let before = self.text.get(..offset).unwrap_or(&self.text);
        let line = before.bytes().filter(|b| *b == b'\n').count();
        let line_start = before.rfind('\n').map_or(0, |idx| idx + 1);
        let character = before[line_start..].chars().count();
        Position::new(
            u32::try_from(line).unwrap_or(u32::MAX),
            u32::try_from(character).unwrap_or(u32::MAX),
        )
    }

    pub fn get_text(&self, range: Range) -> &str {
        let start = self.offset_at(range.start);
        let end = self.offset_at(range.end).max(start);
        &self.text[start..end]
    }

    /// Apply a change made against the current text and bump the version.
    pub fn apply_change(&mut self, change: &ContentChange) {
        let start = self.offset_at(change.range.start);
        let end = self.offset_at(change.range.end).max(start);
        self.text.replace_range(start..end, &change.text);
        self.version += 1;
    }
}

/// Textual context at which a completion was requested. `position` is a byte offset into the
/// document; `prefix` ends and `suffix` starts there.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct DocumentState {
    pub uri: Uri,
    pub language_id: String,
    pub prefix: String,
    pub suffix: String,
    pub position: usize,
}

impl DocumentState {
    /// Snapshot `document` at `position`, keeping at most `max_prefix_chars` before and
    /// `max_suffix_chars` after the cursor.
    pub fn from_document(
        document: &TextDocument,
        position: Position,
        max_prefix_chars: usize,
        max_suffix_chars: usize,
    ) -> Self {
        let offset = document.offset_at(position);
        let (before, after) = document.text.split_at(offset);
        Self {
            uri: document.uri.clone(),
            language_id: document.language_id.clone(),
            prefix: tail_chars(before, max_prefix_chars).to_string(),
            suffix: head_chars(after, max_suffix_chars).to_string(),
            position: offset,
        }
    }
}

fn tail_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().rev().nth(max_chars.saturating_sub(1)) {
        Some((idx, _)) if max_chars > 0 => &text[idx..],
        _ if max_chars == 0 => "",
        _ => text,
    }
}

fn head_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
