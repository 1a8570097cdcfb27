use context_protocol::{
    ContextSnippet, HoverContext, HoverContextKind, RetrieverIdentifier, SymbolRelationship, SymbolSnippet,
};
use context_retriever::EditorHost;
use std::collections::HashSet;

pub fn hover_context_to_snippet(host: &dyn EditorHost, context: &HoverContext) -> SymbolSnippet {
    let source_symbol_and_relationship = context
        .source_symbol_name
        .as_ref()
        .filter(|name| !name.is_empty() && context.kind != HoverContextKind::Definition)
        .map(|name| SymbolRelationship {
            symbol: name.clone(),
            relationship: context.kind,
        });

    SymbolSnippet {
        file_name: host.as_relative_path(&context.uri),
        uri: Some(context.uri.clone()),
        symbol: context.symbol_name.clone(),
        source_symbol_and_relationship,
        content: context.content.join("\n").trim().to_string(),
        identifier: Some(RetrieverIdentifier::GraphSection),
    }
}

/// Convert hover contexts, dropping repeats of the same symbol, file and content.
pub fn hover_contexts_to_snippets<'a>(
    host: &dyn EditorHost,
    contexts: impl IntoIterator<Item = &'a HoverContext>,
) -> Vec<ContextSnippet> {
    let mut seen = HashSet::new();
    contexts
        .into_iter()
        .map(|context| hover_context_to_snippet(host, context))
        .filter(|snippet| {
            seen.insert(format!("{}\n{}\n{}", snippet.symbol, snippet.file_name, snippet.content))
        })
        .map(ContextSnippet::Symbol)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use context_protocol::Uri;
    use context_retriever::MemoryEditorHost;
    use pretty_assertions::assert_eq;

    fn hover(symbol: &str, source: Option<&str>, kind: HoverContextKind, content: &[&str]) -> HoverContext {
        HoverContext {
            uri: Uri::file("/repo/src/lib.ts"),
            range: None,
            symbol_name: symbol.to_string(),
            source_symbol_name: source.map(str::to_string),
            kind,
            content: content.iter().map(|l| l.to_string()).collect(),
        }
    }

    #[test]
    fn relationship_only_for_non_definitions_with_a_source() {
        let host = MemoryEditorHost::new(Some("/repo".to_string()));
        let definition = hover_context_to_snippet(
            &host,
            &hover("foo", Some("bar"), HoverContextKind::Definition, &["  function foo() {}  ", ""]),
        );
        assert_eq!(definition.source_symbol_and_relationship, None);
        assert_eq!(definition.content, "function foo() {}");
        assert_eq!(definition.file_name, "src/lib.ts");

        let reference = hover_context_to_snippet(
            &host,
            &hover("foo", Some("bar"), HoverContextKind::Reference, &["foo()"]),
        );
        assert_eq!(
            reference.source_symbol_and_relationship,
            Some(SymbolRelationship {
                symbol: "bar".to_string(),
                relationship: HoverContextKind::Reference,
            })
        );

        let hover_only = hover_context_to_snippet(&host, &hover("foo", None, HoverContextKind::Hover, &["x"]));
        assert_eq!(hover_only.source_symbol_and_relationship, None);
    }

    #[test]
    fn duplicates_are_dropped() {
        let host = MemoryEditorHost::default();
        let contexts = vec![
            hover("foo", None, HoverContextKind::Definition, &["function foo() {}"]),
            hover("foo", Some("x"), HoverContextKind::Definition, &["function foo() {}", " "]),
            hover("bar", None, HoverContextKind::Definition, &["function bar() {}"]),
        ];
        let snippets = hover_contexts_to_snippets(&host, &contexts);
        let symbols: Vec<_> = snippets.iter().filter_map(ContextSnippet::symbol).collect();
        assert_eq!(symbols, vec!["foo", "bar"]);
    }
}
