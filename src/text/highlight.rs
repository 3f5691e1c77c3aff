//! Highlight ranges layered over buffer text.
//!
//! Highlights live beside the segment rope so restyling never touches rope
//! structure. Each [`Highlight`] covers a half-open char range and points at a
//! style in a [`StyleRegistry`] by id; `priority` decides which style wins
//! where ranges overlap and `layer` groups ranges for bulk removal.
//!
//! Outside a transaction every change is applied immediately (O(log n)).
//! Between [`HighlightSet::begin`] and [`HighlightSet::commit`] changes are
//! queued in O(1) and merged in one pass at commit; queued changes are not
//! visible to queries until then.

use crate::error::{Error, Result};
use crate::style::Style;
use std::collections::{BTreeMap, HashMap};

/// One highlighted char range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Highlight {
    pub start: usize,
    pub end: usize,
    pub style_id: u32,
    pub priority: u8,
    pub layer: u16,
}

impl Highlight {
    #[must_use]
    pub fn new(start: usize, end: usize, style_id: u32) -> Self {
        Self {
            start,
            end,
            style_id,
            priority: 0,
            layer: 0,
        }
    }

    #[must_use]
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_layer(mut self, layer: u16) -> Self {
        self.layer = layer;
        self
    }

    /// Check if this highlight covers a char position.
    #[must_use]
    pub fn contains(&self, pos: usize) -> bool {
        self.start <= pos && pos < self.end
    }

    /// Check if this highlight overlaps `[start, end)`.
    #[must_use]
    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        self.start < end && start < self.end
    }
}

/// Named style with a stable id.
#[derive(Clone, Debug)]
pub struct NamedStyle {
    pub id: u32,
    pub name: Option<String>,
    pub style: Style,
}

/// Registry mapping style ids to styles.
#[derive(Clone, Debug, Default)]
pub struct StyleRegistry {
    styles: HashMap<u32, NamedStyle>,
    by_name: HashMap<String, u32>,
    next_id: u32,
}

impl StyleRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named style with an auto-generated id.
    ///
    /// Registering an existing name replaces its style and keeps its id.
    pub fn register(&mut self, name: impl Into<String>, style: Style) -> u32 {
        let name = name.into();
        if let Some(&id) = self.by_name.get(&name) {
            if let Some(entry) = self.styles.get_mut(&id) {
                entry.style = style;
            }
            return id;
        }
        let id = self.next_id();
        self.by_name.insert(name.clone(), id);
        self.styles.insert(
            id,
            NamedStyle {
                id,
                name: Some(name),
                style,
            },
        );
        id
    }

    /// Register an unnamed style.
    pub fn register_anonymous(&mut self, style: Style) -> u32 {
        let id = self.next_id();
        self.styles.insert(
            id,
            NamedStyle {
                id,
                name: None,
                style,
            },
        );
        id
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    #[must_use]
    pub fn get(&self, id: u32) -> Option<&NamedStyle> {
        self.styles.get(&id)
    }

    #[must_use]
    pub fn id_for_name(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    #[must_use]
    pub fn style(&self, id: u32) -> Option<Style> {
        self.styles.get(&id).map(|s| s.style)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.styles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }

    /// Drop all styles. Ids are not reused.
    pub fn clear(&mut self) {
        self.styles.clear();
        self.by_name.clear();
    }
}

#[derive(Clone, Copy, Debug)]
enum PendingOp {
    Add(Highlight),
    RemoveLayer(u16),
    Clear,
}

/// Ordered set of highlights with range queries and batching.
#[derive(Clone, Debug, Default)]
pub struct HighlightSet {
    ranges: BTreeMap<(usize, u64), Highlight>,
    next_seq: u64,
    /// Upper bound on `end - start` over stored ranges; bounds range scans.
    max_len: usize,
    pending: Option<Vec<PendingOp>>,
}

impl HighlightSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.pending.is_some()
    }

    /// Number of changes queued in the open transaction.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.as_ref().map_or(0, Vec::len)
    }

    fn insert_now(&mut self, highlight: Highlight) {
        self.max_len = self.max_len.max(highlight.end - highlight.start);
        self.ranges.insert((highlight.start, self.next_seq), highlight);
        self.next_seq += 1;
    }

    fn apply(&mut self, op: PendingOp) {
        match op {
            PendingOp::Add(highlight) => self.insert_now(highlight),
            PendingOp::RemoveLayer(layer) => self.ranges.retain(|_, h| h.layer != layer),
            PendingOp::Clear => {
                self.ranges.clear();
                self.max_len = 0;
            }
        }
    }

    fn submit(&mut self, op: PendingOp) {
        match &mut self.pending {
            Some(queue) => queue.push(op),
            None => self.apply(op),
        }
    }

    /// Add a highlight; empty ranges are ignored.
    pub fn add(&mut self, highlight: Highlight) {
        if highlight.start < highlight.end {
            self.submit(PendingOp::Add(highlight));
        }
    }

    pub fn remove_layer(&mut self, layer: u16) {
        self.submit(PendingOp::RemoveLayer(layer));
    }

    pub fn clear(&mut self) {
        self.submit(PendingOp::Clear);
    }

    /// Drop every highlight now, along with any changes queued by an open
    /// transaction. The transaction itself stays open.
    pub fn reset(&mut self) {
        self.ranges.clear();
        self.max_len = 0;
        if let Some(queue) = &mut self.pending {
            queue.clear();
        }
    }

    /// Open a transaction. Transactions do not nest.
    pub fn begin(&mut self) -> Result<()> {
        if self.pending.is_some() {
            return Err(Error::NestedTransaction);
        }
        self.pending = Some(Vec::new());
        Ok(())
    }

    /// Apply queued changes in order; returns how many were applied.
    pub fn commit(&mut self) -> Result<usize> {
        let queue = self.pending.take().ok_or(Error::NoActiveTransaction)?;
        let applied = queue.len();
        for op in queue {
            self.apply(op);
        }
        tracing::debug!(applied, total = self.ranges.len(), "committed highlight transaction");
        Ok(applied)
    }

    /// Highlights overlapping the char range `[start, end)`, by start.
    pub fn in_range(&self, start: usize, end: usize) -> impl Iterator<Item = &Highlight> {
        let lower = start.saturating_sub(self.max_len);
        self.ranges
            .range((lower, 0)..(end, 0))
            .map(|(_, h)| h)
            .filter(move |h| h.overlaps(start, end))
    }

    /// Highlights covering one char position.
    pub fn at(&self, pos: usize) -> impl Iterator<Item = &Highlight> {
        self.in_range(pos, pos + 1)
    }

    /// All highlights, ordered by start then insertion.
    pub fn iter(&self) -> impl Iterator<Item = &Highlight> {
        self.ranges.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Rgba;

    #[test]
    fn test_registry_basic() {
        let mut registry = StyleRegistry::new();
        let id = registry.register("keyword", Style::fg(Rgba::BLUE).with_bold());
        let again = registry.register("keyword", Style::fg(Rgba::RED));
        assert_eq!(id, again);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.style(id).unwrap().fg, Some(Rgba::RED));
        assert_eq!(registry.id_for_name("keyword"), Some(id));

        let anon = registry.register_anonymous(Style::bold());
        assert_ne!(anon, id);
        assert!(registry.get(anon).unwrap().name.is_none());
    }

    #[test]
    fn test_range_queries() {
        let mut set = HighlightSet::new();
        set.add(Highlight::new(0, 100, 1));
        set.add(Highlight::new(10, 20, 2));
        set.add(Highlight::new(30, 40, 3));
        set.add(Highlight::new(5, 5, 4));
        assert_eq!(set.len(), 3);

        let ids: Vec<u32> = set.in_range(15, 35).map(|h| h.style_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        let ids: Vec<u32> = set.at(25).map(|h| h.style_id).collect();
        assert_eq!(ids, vec![1]);
        assert_eq!(set.in_range(100, 200).count(), 0);
    }

    #[test]
    fn test_transaction_defers_changes() {
        let mut set = HighlightSet::new();
        set.add(Highlight::new(0, 5, 1).with_layer(1));
        set.begin().unwrap();
        assert_eq!(set.begin(), Err(Error::NestedTransaction));

        set.add(Highlight::new(5, 9, 2).with_layer(2));
        set.remove_layer(1);
        assert_eq!(set.len(), 1);
        assert_eq!(set.pending_len(), 2);

        assert_eq!(set.commit(), Ok(2));
        let layers: Vec<u16> = set.iter().map(|h| h.layer).collect();
        assert_eq!(layers, vec![2]);
        assert_eq!(set.commit(), Err(Error::NoActiveTransaction));
    }

    #[test]
    fn test_reset_inside_transaction() {
        let mut set = HighlightSet::new();
        set.add(Highlight::new(0, 5, 1));
        set.begin().unwrap();
        set.add(Highlight::new(2, 4, 2));
        set.reset();
        assert!(set.is_empty());
        assert_eq!(set.at(1).count(), 0);
        assert!(set.in_transaction());
        assert_eq!(set.pending_len(), 0);

        set.add(Highlight::new(0, 1, 3));
        assert_eq!(set.commit(), Ok(1));
        let ids: Vec<u32> = set.iter().map(|h| h.style_id).collect();
        assert_eq!(ids, vec![3]);
    }
}
