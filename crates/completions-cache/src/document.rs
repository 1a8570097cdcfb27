use crate::types::{CachedCompletions, Completion};
use context_protocol::DocumentState;
use lru::LruCache;
use std::cmp::Ordering;
use std::num::NonZeroUsize;

#[derive(Debug, Clone)]
struct CacheEntry {
    log_id: String,
    document_state: DocumentState,
    completion: Completion,
}

/// Completions cached for a single document.
///
/// Every completion is its own LRU entry, keyed by insertion sequence, so adding the same text
/// twice yields two entries.
#[derive(Debug)]
pub struct DocumentCompletionsCache {
    entries: LruCache<u64, CacheEntry>,
    next_seq: u64,
}

impl DocumentCompletionsCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
            next_seq: 0,
        }
    }

    /// Insert one entry per completion, all sharing `document_state`.
    pub fn add(&mut self, log_id: &str, document_state: &DocumentState, completions: &[Completion]) {
        // Reverse so the first completion ends up most recently used and `get` returns them in
        // their original order.
        for completion in completions.iter().rev() {
            let seq = self.next_seq;
            self.next_seq += 1;
            self.entries.push(
                seq,
                CacheEntry {
                    log_id: log_id.to_string(),
                    document_state: document_state.clone(),
                    completion: completion.clone(),
                },
            );
        }
    }

    /// Look up completions usable at `document_state`, synthesizing them from nearby entries.
    ///
    /// Entries are scanned most-recently-used first. The returned `log_id` belongs to the first
    /// (most recent) matching entry; every matching entry is touched.
    pub fn get(&mut self, document_state: &DocumentState) -> Option<CachedCompletions> {
        let matches: Vec<(u64, &str, Completion)> = self
            .entries
            .iter()
            .filter_map(|(seq, entry)| {
                synthesize(entry, document_state).map(|c| (*seq, entry.log_id.as_str(), c))
            })
            .collect();

        let log_id = matches.first()?.1.to_string();
        let seqs: Vec<u64> = matches.iter().map(|(seq, ..)| *seq).collect();
        let completions: Vec<Completion> = matches.into_iter().map(|(.., c)| c).collect();

        for seq in seqs.iter().rev() {
            self.entries.promote(seq);
        }

        log::debug!(
            "completions cache hit for {} ({} completions, log_id={log_id})",
            document_state.uri,
            completions.len()
        );
        Some(CachedCompletions {
            log_id,
            completions,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Derive the completion `entry` would offer at `query`, or `None` when the two states are not
/// related by a simple insertion or deletion at the cursor.
fn synthesize(entry: &CacheEntry, query: &DocumentState) -> Option<Completion> {
    let cached = &entry.document_state;
    if cached.suffix != query.suffix {
        return None;
    }

    match query.position.cmp(&cached.position) {
        Ordering::Equal => (cached.prefix == query.prefix).then(|| entry.completion.clone()),
        Ordering::Greater => {
            // Text was typed since the entry was cached.
            let offset = query.position - cached.position;
            if !query.prefix.starts_with(&cached.prefix) {
                return None;
            }
            let added = query.prefix.get(query.prefix.len().checked_sub(offset)?..)?;
            let remaining = entry.completion.content.strip_prefix(added)?;
            Some(entry.completion.with_content(remaining.to_string()))
        }
        Ordering::Less => {
            // Text was deleted. Never reuse across a removed line break.
            let offset = cached.position - query.position;
            if !cached.prefix.starts_with(&query.prefix) {
                return None;
            }
            let deleted = cached.prefix.get(cached.prefix.len().checked_sub(offset)?..)?;
            if deleted.contains('\n') {
                return None;
            }
            Some(
                entry
                    .completion
                    .with_content(format!("{deleted}{}", entry.completion.content)),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use context_protocol::Uri;
    use pretty_assertions::assert_eq;

    fn state(prefix: &str, suffix: &str) -> DocumentState {
        DocumentState {
            uri: Uri::file("/repo/main.ts"),
            language_id: "typescript".to_string(),
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
            position: prefix.len(),
        }
    }

    fn entry(prefix: &str, suffix: &str, content: &str) -> CacheEntry {
        CacheEntry {
            log_id: "log".to_string(),
            document_state: state(prefix, suffix),
            completion: Completion::new(content),
        }
    }

    #[test]
    fn exact_state_returns_completion_unchanged() {
        let e = entry("const x = ", ";", "foo()");
        assert_eq!(
            synthesize(&e, &state("const x = ", ";")).map(|c| c.content),
            Some("foo()".to_string())
        );
    }

    #[test]
    fn same_position_with_different_prefix_misses() {
        let e = entry("const x = ", ";", "foo()");
        assert_eq!(synthesize(&e, &state("const y = ", ";")), None);
    }

    #[test]
    fn typed_text_must_agree_with_completion() {
        let e = entry("const x = ", ";", "foo()");
        assert_eq!(
            synthesize(&e, &state("const x = fo", ";")).map(|c| c.content),
            Some("o()".to_string())
        );
        assert_eq!(synthesize(&e, &state("const x = ba", ";")), None);
    }

    #[test]
    fn typed_whitespace_is_compared_literally() {
        let e = entry("if (a) {", "}", "\n  run()\n");
        assert_eq!(synthesize(&e, &state("if (a) { ", "}")), None);
        assert_eq!(
            synthesize(&e, &state("if (a) {\n", "}")).map(|c| c.content),
            Some("  run()\n".to_string())
        );
    }

    #[test]
    fn deleted_text_is_prepended() {
        let e = entry("let value = comp", "", "uted()");
        assert_eq!(
            synthesize(&e, &state("let value = co", "")).map(|c| c.content),
            Some("mputed()".to_string())
        );
    }

    #[test]
    fn deletion_across_line_break_misses() {
        let e = entry("fn a() {\n    ", "", "todo!()");
        assert_eq!(synthesize(&e, &state("fn a() {", "")), None);
    }

    #[test]
    fn offsets_off_char_boundary_miss_instead_of_panicking() {
        let e = entry("let s = \"", "\"", "é!");
        let mut query = state("let s = \"é", "\"");
        query.position -= 1;
        assert_eq!(synthesize(&e, &query), None);
    }

    #[test]
    fn matches_are_returned_most_recent_first() {
        let mut cache = DocumentCompletionsCache::new(NonZeroUsize::new(10).unwrap());
        cache.add("first", &state("a = ", ""), &[Completion::new("1")]);
        cache.add("second", &state("a = ", ""), &[Completion::new("2")]);

        let hit = cache.get(&state("a = ", "")).unwrap();
        assert_eq!(hit.log_id, "second");
        let contents: Vec<_> = hit.completions.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["2", "1"]);

        // Order is stable across repeated lookups.
        let again = cache.get(&state("a = ", "")).unwrap();
        assert_eq!(again.log_id, "second");
    }
}
