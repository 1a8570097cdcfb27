use crate::error::Result;
use crate::section::DocumentSection;
use async_trait::async_trait;
use context_protocol::{HoverContext, Location, Range, TextDocument};
use once_cell::sync::Lazy;
use regex::Regex;
use tokio_util::sync::CancellationToken;

/// Splits a document into sections.
#[async_trait]
pub trait SymbolProvider: Send + Sync {
    async fn get_document_sections(&self, document: &TextDocument) -> Result<Vec<DocumentSection>>;
}

/// Resolves the symbols used inside a range to their definitions and hovers.
#[async_trait]
pub trait GraphContextProvider: Send + Sync {
    async fn get_graph_context_from_range(
        &self,
        document: &TextDocument,
        range: Range,
        cancel: &CancellationToken,
    ) -> Result<Vec<HoverContext>>;
}

static DECLARATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:export\s+)?(?:default\s+)?(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?(?:function\*?|class|interface|type|enum|const|let|fn|struct|trait|impl|def|func)\s+([A-Za-z_$][\w$]*)",
    )
    .expect("declaration regex")
});

/// Section provider for documents without a language server: every top-level declaration
/// (a declaration keyword at column zero) starts a section that runs until the next one.
#[derive(Debug, Default, Clone, Copy)]
pub struct TopLevelSectionProvider;

impl TopLevelSectionProvider {
    pub fn sections(document: &TextDocument) -> Vec<DocumentSection> {
        let lines: Vec<&str> = document.text.split('\n').collect();
        let starts: Vec<(usize, String)> = lines
            .iter()
            .enumerate()
            .filter_map(|(index, line)| {
                DECLARATION
                    .captures(line)
                    .and_then(|caps| caps.get(1))
                    .map(|name| (index, name.as_str().to_string()))
            })
            .collect();

        starts
            .iter()
            .enumerate()
            .map(|(i, (start, name))| {
                let end = starts
                    .get(i + 1)
                    .map_or(lines.len() - 1, |(next, _)| next.saturating_sub(1));
                let end = last_non_blank(&lines, *start, end);
                let end_character = lines[end].trim_end_matches('\r').chars().count();
                DocumentSection {
                    fuzzy_name: Some(name.clone()),
                    location: Location::new(
                        document.uri.clone(),
                        Range::new(to_u32(*start), 0, to_u32(end), to_u32(end_character)),
                    ),
                }
            })
            .collect()
    }
}

#[async_trait]
impl SymbolProvider for TopLevelSectionProvider {
    async fn get_document_sections(&self, document: &TextDocument) -> Result<Vec<DocumentSection>> {
        Ok(Self::sections(document))
    }
}

fn last_non_blank(lines: &[&str], start: usize, mut end: usize) -> usize {
    while end > start && lines[end].trim().is_empty() {
        end -= 1;
    }
    end
}

fn to_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use context_protocol::Uri;
    use pretty_assertions::assert_eq;

    #[test]
    fn top_level_declarations_delimit_sections() {
        let document = TextDocument::new(
            Uri::file("/repo/a.ts"),
            "typescript",
            "import x from 'x'\n\nexport function foo() {\n  return 1\n}\n\nclass Bar {\n  baz() {}\n}\n",
        );
        let sections = TopLevelSectionProvider::sections(&document);
        let summary: Vec<_> = sections
            .iter()
            .map(|s| (s.fuzzy_name.clone().unwrap(), s.location.range))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("foo".to_string(), Range::new(2, 0, 4, 1)),
                ("Bar".to_string(), Range::new(6, 0, 8, 1)),
            ]
        );
    }

    #[test]
    fn indented_members_do_not_start_sections() {
        let document = TextDocument::new(
            Uri::file("/repo/a.rs"),
            "rust",
            "impl Foo {\n    pub fn bar() {}\n}\npub(crate) fn baz() {}",
        );
        let names: Vec<_> = TopLevelSectionProvider::sections(&document)
            .into_iter()
            .filter_map(|s| s.fuzzy_name)
            .collect();
        assert_eq!(names, vec!["Foo", "baz"]);
    }
}
