//! Per-chunk grapheme segmentation cache.
//!
//! Segmenting a chunk into grapheme clusters is the expensive part of cursor
//! movement and width measurement. The cache computes it once per
//! `(MemId, start, end, method)` and hands out shared slices afterwards.
//!
//! The cache is an explicit capability: the buffer that owns the chunks owns
//! (or shares) the cache, and entries are evicted when their chunk is
//! deleted. Several buffers in one thread may share one cache through `Rc`.

use crate::error::{Error, Result};
use crate::text::mem::MemId;
use crate::unicode::{GraphemeInfo, WidthMethod, grapheme_info};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

/// Identity of the bytes a cached segmentation belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GraphemeKey {
    pub mem: MemId,
    pub start: usize,
    pub end: usize,
    pub method: WidthMethod,
}

/// Hit/miss counters, for tests and tuning.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GraphemeCacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Lazily filled map from chunk identity to its grapheme clusters.
#[derive(Debug, Default)]
pub struct GraphemeCache {
    entries: RefCell<HashMap<GraphemeKey, Rc<[GraphemeInfo]>>>,
    hits: Cell<u64>,
    misses: Cell<u64>,
}

impl GraphemeCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clusters of `text`, which must be the bytes identified by `key`.
    ///
    /// Offsets in the result are relative to `key.start`. A hit is O(1); a
    /// miss segments the text once.
    pub fn get_or_compute(&self, key: GraphemeKey, text: &str) -> Result<Rc<[GraphemeInfo]>> {
        if let Some(hit) = self.entries.borrow().get(&key) {
            self.hits.set(self.hits.get() + 1);
            return Ok(Rc::clone(hit));
        }
        self.misses.set(self.misses.get() + 1);

        let computed: Rc<[GraphemeInfo]> = Rc::from(grapheme_info(text, key.method));
        let mut entries = self.entries.borrow_mut();
        entries
            .try_reserve(1)
            .map_err(|e| Error::alloc(e, std::mem::size_of_val(&*computed)))?;
        entries.insert(key, Rc::clone(&computed));
        tracing::trace!(
            start = key.start,
            end = key.end,
            clusters = computed.len(),
            "cached grapheme segmentation"
        );
        Ok(computed)
    }

    /// Whether `key` is cached.
    #[must_use]
    pub fn contains(&self, key: &GraphemeKey) -> bool {
        self.entries.borrow().contains_key(key)
    }

    /// Release the entries of a deleted chunk (all width methods).
    pub fn evict(&self, mem: MemId, start: usize, end: usize) {
        self.entries
            .borrow_mut()
            .retain(|key, _| !(key.mem == mem && key.start == start && key.end == end));
    }

    /// Release every entry.
    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> GraphemeCacheStats {
        GraphemeCacheStats {
            entries: self.len(),
            hits: self.hits.get(),
            misses: self.misses.get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::mem::MemRegistry;

    #[test]
    fn test_hit_after_miss() {
        let mut reg = MemRegistry::new();
        let mem = reg.register("e\u{301}x").unwrap();
        let cache = GraphemeCache::new();
        let key = GraphemeKey {
            mem,
            start: 0,
            end: 4,
            method: WidthMethod::WcWidth,
        };

        let first = cache.get_or_compute(key, reg.slice(mem, 0, 4).unwrap()).unwrap();
        let second = cache.get_or_compute(key, reg.slice(mem, 0, 4).unwrap()).unwrap();
        assert_eq!(first.len(), 2);
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(
            cache.stats(),
            GraphemeCacheStats {
                entries: 1,
                hits: 1,
                misses: 1
            }
        );
    }

    #[test]
    fn test_evict_releases_entry() {
        let mut reg = MemRegistry::new();
        let mem = reg.register("漢字").unwrap();
        let cache = GraphemeCache::new();
        let key = GraphemeKey {
            mem,
            start: 0,
            end: 6,
            method: WidthMethod::WcWidth,
        };
        let clusters = cache.get_or_compute(key, "漢字").unwrap();
        assert_eq!(clusters[1].byte_offset, 3);
        assert_eq!(clusters[1].width, 2);

        cache.evict(mem, 0, 6);
        assert!(!cache.contains(&key));
        assert!(cache.is_empty());
    }
}
