use crate::snippet::ContextSnippet;
use std::collections::HashSet;

/// Character accounting shared by every packing loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CharBudget {
    max_chars: usize,
    used_chars: usize,
}

impl CharBudget {
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars,
            used_chars: 0,
        }
    }

    pub fn used(&self) -> usize {
        self.used_chars
    }

    pub fn remaining(&self) -> usize {
        self.max_chars.saturating_sub(self.used_chars)
    }

    /// Reserve `chars` if the running total stays within `limit` (itself capped at the budget).
    pub fn try_take_within(&mut self, chars: usize, limit: usize) -> bool {
        let limit = limit.min(self.max_chars);
        if self.used_chars + chars > limit {
            return false;
        }
        self.used_chars += chars;
        true
    }

    pub fn try_take(&mut self, chars: usize) -> bool {
        self.try_take_within(chars, self.max_chars)
    }
}

/// First-fit-discard packing: walk `candidates` in priority order, drop any whose identity was
/// already taken or that no longer fits, keep the rest. Oversized snippets are skipped, never
/// truncated, so smaller ones further down still get a chance.
#[derive(Debug, Default)]
pub struct SnippetPacker {
    budget: CharBudget,
    seen: HashSet<String>,
    packed: Vec<ContextSnippet>,
}

impl SnippetPacker {
    pub fn new(max_chars: usize) -> Self {
        Self {
            budget: CharBudget::new(max_chars),
            seen: HashSet::new(),
            packed: Vec::new(),
        }
    }

    pub fn push(&mut self, snippet: ContextSnippet) -> bool {
        self.push_within(snippet, usize::MAX)
    }

    /// Like [`Self::push`], but only while the running total stays within `limit`.
    pub fn push_within(&mut self, snippet: ContextSnippet, limit: usize) -> bool {
        // Symbol snippets key on file and symbol, so distinct definitions from one file coexist.
        let identity = snippet.identity();
        if self.seen.contains(&identity) {
            return false;
        }
        if !self.budget.try_take_within(snippet.char_len(), limit) {
            return false;
        }
        self.seen.insert(identity);
        self.packed.push(snippet);
        true
    }

    pub fn used_chars(&self) -> usize {
        self.budget.used()
    }

    pub fn finish(self) -> Vec<ContextSnippet> {
        self.packed
    }
}

pub fn pack_snippets(
    candidates: impl IntoIterator<Item = ContextSnippet>,
    max_chars: usize,
) -> Vec<ContextSnippet> {
    if max_chars == 0 {
        return Vec::new();
    }
    let mut packer = SnippetPacker::new(max_chars);
    for snippet in candidates {
        packer.push(snippet);
    }
    packer.finish()
}
