use context_protocol::ContextSnippet;
use lru::LruCache;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;

/// Cached results plus the dependency tokens each result was computed from.
///
/// Both directions are kept: `dependencies` (token → keys, LRU bounded) drives invalidation and
/// `key_dependencies` (key → tokens) lets a cache-side eviction unlink a key everywhere. Every
/// key reachable from `dependencies` is present in `cache`.
#[derive(Debug)]
pub(crate) struct DependencyIndex {
    cache: LruCache<String, Vec<ContextSnippet>>,
    dependencies: LruCache<String, HashSet<String>>,
    key_dependencies: HashMap<String, HashSet<String>>,
}

impl DependencyIndex {
    pub fn new(cache_capacity: usize, dependency_capacity: usize) -> Self {
        Self {
            cache: LruCache::new(non_zero(cache_capacity)),
            dependencies: LruCache::new(non_zero(dependency_capacity)),
            key_dependencies: HashMap::new(),
        }
    }

    pub fn get(&mut self, key: &str) -> Option<Vec<ContextSnippet>> {
        self.cache.get(key).cloned()
    }

    pub fn insert(&mut self, key: String, snippets: Vec<ContextSnippet>, dependencies: HashSet<String>) {
        self.remove_key(&key);
        if let Some((evicted, _)) = self.cache.push(key.clone(), snippets) {
            log::debug!("cache full, evicting {evicted}");
            self.remove_key(&evicted);
        }
        for dependency in dependencies {
            if !self.cache.contains(&key) {
                break;
            }
            self.link(dependency, &key);
        }
    }

    /// Drop every key that depended on `dependency`. Returns how many keys were purged.
    pub fn invalidate(&mut self, dependency: &str) -> usize {
        let Some(keys) = self.dependencies.pop(dependency) else {
            return 0;
        };
        for key in &keys {
            self.remove_key(key);
        }
        keys.len()
    }

    pub fn clear(&mut self) {
        self.cache.clear();
        self.dependencies.clear();
        self.key_dependencies.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.cache.contains(key)
    }

    pub fn keys_for(&self, dependency: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .dependencies
            .peek(dependency)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    fn link(&mut self, dependency: String, key: &str) {
        self.key_dependencies
            .entry(key.to_string())
            .or_default()
            .insert(dependency.clone());

        if let Some(keys) = self.dependencies.get_mut(&dependency) {
            keys.insert(key.to_string());
            return;
        }
        let keys = HashSet::from([key.to_string()]);
        if let Some((evicted, orphaned)) = self.dependencies.push(dependency, keys) {
            // Without its reverse entry an evicted token could never invalidate its keys again.
            log::debug!("dependency index full, invalidating {} keys of {evicted}", orphaned.len());
            for key in &orphaned {
                self.remove_key(key);
            }
        }
    }

    fn remove_key(&mut self, key: &str) {
        self.cache.pop(key);
        let Some(dependencies) = self.key_dependencies.remove(key) else {
            return;
        };
        for dependency in dependencies {
            let now_empty = match self.dependencies.peek_mut(&dependency) {
                Some(keys) => {
                    keys.remove(key);
                    keys.is_empty()
                }
                None => false,
            };
            if now_empty {
                self.dependencies.pop(&dependency);
            }
        }
    }
}

fn non_zero(value: usize) -> NonZeroUsize {
    NonZeroUsize::new(value).unwrap_or(NonZeroUsize::MIN)
}
