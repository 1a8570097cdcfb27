use context_protocol::{ContextSnippet, SnippetPacker};
use std::collections::HashMap;

/// Share of the budget reserved for keyword results in [`fuse_context`]
pub const DEFAULT_KEYWORD_SHARE: f64 = 0.8;

/// Pack keyword results into `floor(max_chars * 0.8)`, then let embeddings results fill the rest
/// of `max_chars`. See [`fuse_context_with_share`].
pub fn fuse_context(
    keyword: Vec<ContextSnippet>,
    embeddings: Vec<ContextSnippet>,
    max_chars: usize,
) -> Vec<ContextSnippet> {
    fuse_context_with_share(keyword, embeddings, max_chars, DEFAULT_KEYWORD_SHARE)
}

/// Both lists share one identity set, so a file taken by a keyword result is not repeated by an
/// embeddings result.
pub fn fuse_context_with_share(
    keyword: Vec<ContextSnippet>,
    embeddings: Vec<ContextSnippet>,
    max_chars: usize,
    keyword_share: f64,
) -> Vec<ContextSnippet> {
    if max_chars == 0 {
        return Vec::new();
    }
    let keyword_limit = (max_chars as f64 * keyword_share).floor() as usize;

    let mut packer = SnippetPacker::new(max_chars);
    for snippet in keyword {
        packer.push_within(snippet, keyword_limit);
    }
    for snippet in embeddings {
        packer.push(snippet);
    }
    packer.finish()
}

/// Reciprocal Rank Fusion over ranked snippet lists
///
/// Documents are ranked by `Σ 1 / (k + best_rank)` over the lists they appear in, where
/// `best_rank` is the zero-based rank of the document's first snippet in that list. The result
/// then walks documents in fused order and interleaves their snippets: every list's first
/// snippet for the document, then every list's second, and so on.
#[derive(Debug, Clone, Copy)]
pub struct RrfFusion {
    k: f64,
}

impl RrfFusion {
    pub fn new(k: f64) -> Self {
        Self { k }
    }

    pub fn fuse(&self, sources: Vec<Vec<ContextSnippet>>) -> Vec<ContextSnippet> {
        // document -> (first seen, per-source snippets)
        let mut documents: HashMap<String, (usize, Vec<Vec<ContextSnippet>>)> = HashMap::new();
        let mut scores: HashMap<String, f64> = HashMap::new();
        let source_count = sources.len();
        let mut seen = 0usize;

        for (source, snippets) in sources.into_iter().enumerate() {
            for (rank, snippet) in snippets.into_iter().enumerate() {
                let document = document_id(&snippet);
                let entry = documents.entry(document.clone()).or_insert_with(|| {
                    seen += 1;
                    (seen, vec![Vec::new(); source_count])
                });
                let per_source = &mut entry.1[source];
                if per_source.is_empty() {
                    *scores.entry(document).or_insert(0.0) += 1.0 / (self.k + rank as f64);
                }
                per_source.push(snippet);
            }
        }

        let mut ranked: Vec<(String, f64)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| documents[&a.0].0.cmp(&documents[&b.0].0))
        });

        let mut fused = Vec::new();
        for (document, score) in ranked {
            let Some((_, per_source)) = documents.remove(&document) else {
                continue;
            };
            log::trace!("fused document {document} (score {score:.4})");
            let depth = per_source.iter().map(Vec::len).max().unwrap_or(0);
            let mut iters: Vec<_> = per_source.into_iter().map(Vec::into_iter).collect();
            for _ in 0..depth {
                fused.extend(iters.iter_mut().filter_map(Iterator::next));
            }
        }
        fused
    }
}

impl Default for RrfFusion {
    fn default() -> Self {
        Self::new(60.0)
    }
}

fn document_id(snippet: &ContextSnippet) -> String {
    let uri = match snippet {
        ContextSnippet::Symbol(s) => s.uri.as_ref(),
        ContextSnippet::File(f) => f.uri.as_ref(),
    };
    uri.map_or_else(|| snippet.file_name().to_string(), ToString::to_string)
}
