use async_trait::async_trait;
use context_mixer::{ContextMixer, MixStrategy, MixerConfig, MixerError};
use context_protocol::{
    ContextSnippet, Position, RetrieverIdentifier, SymbolSnippet, TextDocument, Uri,
};
use context_retriever::{
    ContextRetriever, ContextSizeHints, RetrieverError, RetrieverHints, RetrieverOptions,
};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct Fixed {
    identifier: RetrieverIdentifier,
    languages: Vec<&'static str>,
    result: std::result::Result<Vec<ContextSnippet>, RetrieverError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl Fixed {
    fn new(identifier: RetrieverIdentifier, snippets: Vec<ContextSnippet>) -> Self {
        Self {
            identifier,
            languages: Vec::new(),
            result: Ok(snippets),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    fn failing(identifier: RetrieverIdentifier, err: RetrieverError) -> Self {
        Self {
            result: Err(err),
            ..Self::new(identifier, Vec::new())
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContextRetriever for Fixed {
    fn identifier(&self) -> RetrieverIdentifier {
        self.identifier
    }

    async fn retrieve(&self, _options: &RetrieverOptions) -> context_retriever::Result<Vec<ContextSnippet>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.result.clone()
    }

    fn is_supported_for_language_id(&self, language_id: &str) -> bool {
        self.languages.is_empty() || self.languages.contains(&language_id)
    }
}

fn symbol(file_name: &str, name: &str, content: &str) -> ContextSnippet {
    ContextSnippet::Symbol(SymbolSnippet {
        file_name: file_name.to_string(),
        uri: None,
        symbol: name.to_string(),
        source_symbol_and_relationship: None,
        content: content.to_string(),
        identifier: None,
    })
}

fn options(max_chars: usize) -> RetrieverOptions {
    let document = TextDocument::new(Uri::file("/repo/src/main.ts"), "typescript", "const a = 1;\n");
    RetrieverOptions::new(document, Position::new(1, 0), ContextSizeHints::default()).with_hints(
        RetrieverHints {
            max_chars,
            ..RetrieverHints::default()
        },
    )
}

fn mixer(retrievers: Vec<Arc<Fixed>>, strategy: MixStrategy) -> ContextMixer {
    let retrievers = retrievers
        .into_iter()
        .map(|r| r as Arc<dyn ContextRetriever>)
        .collect();
    ContextMixer::new(
        retrievers,
        MixerConfig {
            strategy,
            ..MixerConfig::default()
        },
    )
    .unwrap()
}

fn contents(snippets: &[ContextSnippet]) -> Vec<&str> {
    snippets.iter().map(ContextSnippet::content).collect()
}

#[tokio::test]
async fn earlier_retrievers_win_and_files_are_used_once() {
    let jaccard = Arc::new(Fixed::new(
        RetrieverIdentifier::JaccardSimilarity,
        vec![ContextSnippet::file("a.ts", "aaaa"), ContextSnippet::file("b.ts", "bb")],
    ));
    let graph = Arc::new(Fixed::new(
        RetrieverIdentifier::GraphSection,
        vec![ContextSnippet::file("a.ts", "again"), symbol("c.ts", "foo", "foo()")],
    ));
    let mixer = mixer(vec![jaccard, graph], MixStrategy::Priority);

    let mixed = mixer.get_context(&options(100)).await.unwrap();
    assert_eq!(contents(&mixed.snippets), vec!["aaaa", "bb", "foo()"]);
    assert_eq!(mixed.summary.strategy, "jaccard-similarity+graph-section");
    assert_eq!(mixed.summary.local, Some(2));
    assert_eq!(mixed.summary.graph, Some(1));
    assert_eq!(mixed.summary.embeddings, None);
    assert_eq!(
        mixed.snippets[2].identifier(),
        Some(RetrieverIdentifier::GraphSection)
    );
}

#[tokio::test]
async fn symbols_from_one_file_coexist() {
    let graph = Arc::new(Fixed::new(
        RetrieverIdentifier::GraphSection,
        vec![
            symbol("lib.ts", "foo", "foo()"),
            symbol("lib.ts", "bar", "bar()"),
            symbol("lib.ts", "foo", "foo() again"),
        ],
    ));
    let mixed = mixer(vec![graph], MixStrategy::Priority)
        .get_context(&options(100))
        .await
        .unwrap();
    assert_eq!(contents(&mixed.snippets), vec!["foo()", "bar()"]);
}

#[tokio::test]
async fn candidates_over_budget_are_skipped() {
    let jaccard = Arc::new(Fixed::new(
        RetrieverIdentifier::JaccardSimilarity,
        vec![
            ContextSnippet::file("a.ts", "123456"),
            ContextSnippet::file("b.ts", "12345"),
            ContextSnippet::file("c.ts", "1234"),
        ],
    ));
    let mixed = mixer(vec![jaccard], MixStrategy::Priority)
        .get_context(&options(10))
        .await
        .unwrap();
    assert_eq!(contents(&mixed.snippets), vec!["123456", "1234"]);
}

#[tokio::test]
async fn zero_budget_still_runs_retrievers() {
    let jaccard = Arc::new(Fixed::new(
        RetrieverIdentifier::JaccardSimilarity,
        vec![ContextSnippet::file("a.ts", "a")],
    ));
    let mixed = mixer(vec![jaccard.clone()], MixStrategy::Priority)
        .get_context(&options(0))
        .await
        .unwrap();
    assert!(mixed.snippets.is_empty());
    assert_eq!(mixed.summary.local, None);
    assert_eq!(jaccard.calls(), 1);
}

#[tokio::test]
async fn failing_retrievers_contribute_nothing() {
    let broken = Arc::new(Fixed::failing(
        RetrieverIdentifier::GraphEngine,
        RetrieverError::Engine("index not ready".to_string()),
    ));
    let aborted = Arc::new(Fixed::failing(RetrieverIdentifier::RecentEdits, RetrieverError::Aborted));
    let jaccard = Arc::new(Fixed::new(
        RetrieverIdentifier::JaccardSimilarity,
        vec![ContextSnippet::file("a.ts", "a")],
    ));
    let mixed = mixer(vec![broken, aborted, jaccard], MixStrategy::Priority)
        .get_context(&options(100))
        .await
        .unwrap();
    assert_eq!(contents(&mixed.snippets), vec!["a"]);
}

#[tokio::test]
async fn unsupported_languages_are_not_queried() {
    let python_only = Arc::new(Fixed {
        languages: vec!["python"],
        ..Fixed::new(RetrieverIdentifier::GraphEngine, vec![ContextSnippet::file("x.py", "x")])
    });
    let mixed = mixer(vec![python_only.clone()], MixStrategy::Priority)
        .get_context(&options(100))
        .await
        .unwrap();
    assert_eq!(python_only.calls(), 0);
    assert!(mixed.snippets.is_empty());
    assert_eq!(mixed.summary.strategy, "none");
}

#[tokio::test]
async fn cancelled_requests_abort() {
    let jaccard = Arc::new(Fixed::new(RetrieverIdentifier::JaccardSimilarity, Vec::new()));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = mixer(vec![jaccard.clone()], MixStrategy::Priority)
        .get_context(&options(100).with_cancel(cancel))
        .await;
    assert_eq!(result, Err(MixerError::Aborted));
    assert_eq!(jaccard.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn retrievers_run_concurrently() {
    let slow = |identifier: RetrieverIdentifier| {
        Arc::new(Fixed {
            delay: Some(Duration::from_millis(100)),
            ..Fixed::new(identifier, vec![ContextSnippet::file(identifier.as_str(), "x")])
        })
    };
    let mixer = mixer(
        vec![
            slow(RetrieverIdentifier::JaccardSimilarity),
            slow(RetrieverIdentifier::GraphSection),
        ],
        MixStrategy::Priority,
    );

    let started = tokio::time::Instant::now();
    let mixed = mixer.get_context(&options(100)).await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(200));
    assert_eq!(mixed.snippets.len(), 2);
}

#[tokio::test]
async fn keyword_share_reserves_the_tail_for_embeddings() {
    let keyword = Arc::new(Fixed::new(
        RetrieverIdentifier::JaccardSimilarity,
        (0..10).map(|i| ContextSnippet::file(format!("k{i}"), i.to_string())).collect(),
    ));
    let embeddings = Arc::new(Fixed::new(
        RetrieverIdentifier::Embeddings,
        ["A", "B", "C"].iter().map(|c| ContextSnippet::file(*c, *c)).collect(),
    ));
    // Embeddings listed first still only get what keyword results leave.
    let mixed = mixer(vec![embeddings, keyword], MixStrategy::KeywordShare)
        .get_context(&options(10))
        .await
        .unwrap();
    assert_eq!(
        contents(&mixed.snippets),
        vec!["0", "1", "2", "3", "4", "5", "6", "7", "A", "B"]
    );
    assert_eq!(mixed.summary.local, Some(8));
    assert_eq!(mixed.summary.embeddings, Some(2));
}

#[tokio::test]
async fn reciprocal_rank_groups_snippets_by_document() {
    let jaccard = Arc::new(Fixed::new(
        RetrieverIdentifier::JaccardSimilarity,
        vec![ContextSnippet::file("a.ts", "a"), ContextSnippet::file("b.ts", "b")],
    ));
    let graph = Arc::new(Fixed::new(
        RetrieverIdentifier::GraphSection,
        vec![symbol("b.ts", "foo", "foo()"), symbol("c.ts", "bar", "bar()")],
    ));
    let mixed = mixer(vec![jaccard, graph], MixStrategy::ReciprocalRank)
        .get_context(&options(100))
        .await
        .unwrap();
    assert_eq!(contents(&mixed.snippets), vec!["b", "foo()", "a", "bar()"]);
}

#[test]
fn invalid_configuration_is_rejected() {
    let err = ContextMixer::new(
        Vec::new(),
        MixerConfig {
            keyword_share: 1.5,
            ..MixerConfig::default()
        },
    )
    .err();
    assert!(matches!(err, Some(MixerError::InvalidConfig(_))));
}
