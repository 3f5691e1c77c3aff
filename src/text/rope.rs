//! Generic balanced rope with cached metrics, fingers and a marker index.
//!
//! [`Rope<T>`] is a B+ tree: items live in leaves, every node caches the
//! [`Metrics`] (item count plus a user [`Summary`]) of its subtree, and all
//! leaves sit at the same depth. Positional operations descend by count in
//! O(log n); [`Rope::find_by`] descends along any additive summary dimension.
//!
//! Two auxiliary structures make repeated access cheaper:
//!
//! - A [`Finger`] caches the child-index path to one position so clustered
//!   edits skip the per-level search.
//! - The marker index, built by [`Rope::rebuild_marker_index`], maps
//!   `(marker kind, ordinal)` to the item position and the summary of
//!   everything before it.
//!
//! Both are stamped with the rope's generation, which every mutation bumps.
//! Using either after a mutation they did not perform returns
//! [`Error::StaleFinger`] or [`Error::StaleMarkerIndex`] rather than a
//! wrong answer.
//!
//! # Example
//!
//! ```
//! use opentui_text::text::{Rope, RopeItem};
//!
//! #[derive(Clone, Debug, PartialEq)]
//! struct Word(&'static str);
//!
//! impl RopeItem for Word {
//!     type Summary = u64;
//!     type Marker = ();
//!     fn measure(&self) -> u64 {
//!         self.0.len() as u64
//!     }
//!     fn empty() -> Self {
//!         Word("")
//!     }
//! }
//!
//! let mut rope = Rope::from_slice(&[Word("hello"), Word("rope")]).unwrap();
//! rope.insert(1, Word("big")).unwrap();
//! assert_eq!(rope.count(), 3);
//! assert_eq!(rope.summary(), 12);
//! assert_eq!(rope.get(1).unwrap(), &Word("big"));
//! ```

use crate::error::{Error, Result};
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::mem;
use std::ops::ControlFlow;

const MAX_LEAF: usize = 32;
const MIN_LEAF: usize = MAX_LEAF / 4;
const MAX_CHILDREN: usize = 16;
const MIN_CHILDREN: usize = MAX_CHILDREN / 4;

#[cfg(test)]
thread_local! {
    static DESCENT_STEPS: std::cell::Cell<u64> = const { std::cell::Cell::new(0) };
}

/// Count one node visited or child examined on the way down.
#[inline]
fn descent_step() {
    #[cfg(test)]
    DESCENT_STEPS.with(|steps| steps.set(steps.get() + 1));
}

/// Additive aggregate cached on every rope node.
pub trait Summary: Copy + Default + PartialEq + fmt::Debug {
    /// Accumulate `other` into `self`.
    fn add(&mut self, other: &Self);
}

impl Summary for () {
    fn add(&mut self, _other: &Self) {}
}

impl Summary for u64 {
    fn add(&mut self, other: &Self) {
        *self += *other;
    }
}

/// Element type stored in a [`Rope`].
pub trait RopeItem: Clone + fmt::Debug {
    type Summary: Summary;
    /// Kinds of marker items tracked by the marker index.
    type Marker: Copy + Eq + Hash + fmt::Debug;

    /// Summary contributed by this item.
    fn measure(&self) -> Self::Summary;

    /// Marker kind of this item, if it is one.
    fn marker(&self) -> Option<Self::Marker> {
        None
    }

    /// Sentinel returned by lookups that miss.
    fn empty() -> Self;
}

/// Item count plus summary of a subtree.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Metrics<S> {
    pub count: usize,
    pub summary: S,
}

impl<S: Summary> Metrics<S> {
    fn of<T: RopeItem<Summary = S>>(item: &T) -> Self {
        Self {
            count: 1,
            summary: item.measure(),
        }
    }

    fn add(&mut self, other: &Self) {
        self.count += other.count;
        self.summary.add(&other.summary);
    }
}

/// Shape statistics, used to compare build strategies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RopeStats {
    pub count: usize,
    /// Number of internal levels above the leaves.
    pub height: usize,
    pub leaves: usize,
    pub internal_nodes: usize,
}

/// A marker's position and the summary of all items before it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MarkerEntry<S> {
    pub pos: usize,
    pub prefix: S,
}

/// Cached path to a rope position.
///
/// Valid for the rope generation it was seeked at. Edits made through the
/// finger keep it valid; any other mutation makes it stale.
#[derive(Clone, Debug)]
pub struct Finger {
    pos: usize,
    path: SmallVec<[u16; 8]>,
    leaf_offset: usize,
    generation: u64,
}

impl Finger {
    /// Position the finger points at.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Rope generation the finger was last synchronized with.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Clone, Copy, Debug)]
enum Edge {
    Left,
    Right,
}

impl Edge {
    fn index(self, len: usize) -> usize {
        match self {
            Self::Left => 0,
            Self::Right => len.saturating_sub(1),
        }
    }
}

#[derive(Clone, Debug)]
enum NodeKind<T: RopeItem> {
    Leaf(Vec<T>),
    Internal(Vec<Node<T>>),
}

#[derive(Clone, Debug)]
struct Node<T: RopeItem> {
    metrics: Metrics<T::Summary>,
    /// 0 for leaves.
    height: usize,
    kind: NodeKind<T>,
}

impl<T: RopeItem> Node<T> {
    fn empty_leaf() -> Self {
        Self {
            metrics: Metrics::default(),
            height: 0,
            kind: NodeKind::Leaf(Vec::new()),
        }
    }

    fn leaf(items: Vec<T>) -> Self {
        let mut node = Self {
            metrics: Metrics::default(),
            height: 0,
            kind: NodeKind::Leaf(items),
        };
        node.recompute();
        node
    }

    fn internal(children: Vec<Node<T>>) -> Self {
        let height = children.first().map_or(1, |c| c.height + 1);
        let mut node = Self {
            metrics: Metrics::default(),
            height,
            kind: NodeKind::Internal(children),
        };
        node.recompute();
        node
    }

    fn count(&self) -> usize {
        self.metrics.count
    }

    fn is_underfull(&self) -> bool {
        match &self.kind {
            NodeKind::Leaf(items) => items.len() < MIN_LEAF,
            NodeKind::Internal(children) => children.len() < MIN_CHILDREN,
        }
    }

    fn is_overfull(&self) -> bool {
        match &self.kind {
            NodeKind::Leaf(items) => items.len() > MAX_LEAF,
            NodeKind::Internal(children) => children.len() > MAX_CHILDREN,
        }
    }

    fn recompute(&mut self) {
        let mut metrics = Metrics::default();
        match &self.kind {
            NodeKind::Leaf(items) => {
                for item in items {
                    metrics.add(&Metrics::of(item));
                }
            }
            NodeKind::Internal(children) => {
                for child in children {
                    metrics.add(&child.metrics);
                }
            }
        }
        self.metrics = metrics;
    }

    /// Move the upper half of this node's entries into a new sibling.
    fn split_half(&mut self) -> Node<T> {
        let kind = match &mut self.kind {
            NodeKind::Leaf(items) => NodeKind::Leaf(items.split_off(items.len() / 2)),
            NodeKind::Internal(children) => {
                NodeKind::Internal(children.split_off(children.len() / 2))
            }
        };
        let mut sibling = Node {
            metrics: Metrics::default(),
            height: self.height,
            kind,
        };
        sibling.recompute();
        self.recompute();
        sibling
    }

    /// Append the entries of a same-height sibling.
    fn absorb(&mut self, other: Node<T>) {
        debug_assert_eq!(self.height, other.height);
        self.metrics.add(&other.metrics);
        match (&mut self.kind, other.kind) {
            (NodeKind::Leaf(a), NodeKind::Leaf(b)) => a.extend(b),
            (NodeKind::Internal(a), NodeKind::Internal(b)) => a.extend(b),
            (_, kind) => {
                // Heights match, so kinds match; keep the entries regardless.
                let mut stray = Node {
                    metrics: Metrics::default(),
                    height: other.height,
                    kind,
                };
                stray.recompute();
                if let NodeKind::Internal(a) = &mut self.kind {
                    a.push(stray);
                }
            }
        }
    }

    fn get(&self, mut pos: usize) -> Option<&T> {
        let mut node = self;
        loop {
            match &node.kind {
                NodeKind::Leaf(items) => return items.get(pos),
                NodeKind::Internal(children) => {
                    let (idx, offset) = locate(children, pos, false)?;
                    node = &children[idx];
                    pos = offset;
                }
            }
        }
    }

    /// Insert below this node; returns a new right sibling on overflow.
    fn insert(&mut self, pos: usize, item: T) -> Option<Node<T>> {
        descent_step();
        let added = Metrics::of(&item);
        match &mut self.kind {
            NodeKind::Leaf(items) => items.insert(pos.min(items.len()), item),
            NodeKind::Internal(children) => {
                let (idx, offset) = locate(children, pos, true).unwrap_or_else(|| {
                    let last = children.len() - 1;
                    (last, children[last].count())
                });
                if let Some(split) = children[idx].insert(offset, item) {
                    children.insert(idx + 1, split);
                }
            }
        }
        self.metrics.add(&added);
        self.is_overfull().then(|| self.split_half())
    }

    fn replace(&mut self, pos: usize, item: T) -> Option<T> {
        let old = match &mut self.kind {
            NodeKind::Leaf(items) => Some(mem::replace(items.get_mut(pos)?, item)),
            NodeKind::Internal(children) => {
                let (idx, offset) = locate(children, pos, false)?;
                children[idx].replace(offset, item)
            }
        };
        self.recompute();
        old
    }

    /// Insert into the leaf at the end of `path` when it has room.
    ///
    /// Gives the item back, with nothing changed, when the path is wrong or
    /// the leaf is full.
    fn insert_along_path(
        &mut self,
        path: &[u16],
        offset: usize,
        item: T,
    ) -> std::result::Result<(), T> {
        descent_step();
        let added = Metrics::of(&item);
        match (&mut self.kind, path.split_first()) {
            (NodeKind::Leaf(items), None) if items.len() < MAX_LEAF && offset <= items.len() => {
                items.insert(offset, item);
            }
            (NodeKind::Internal(children), Some((&idx, rest))) => {
                match children.get_mut(usize::from(idx)) {
                    Some(child) => child.insert_along_path(rest, offset, item)?,
                    None => return Err(item),
                }
            }
            _ => return Err(item),
        }
        self.metrics.add(&added);
        Ok(())
    }

    fn remove_along_path(&mut self, path: &[u16], offset: usize) -> Option<T> {
        let removed = match (&mut self.kind, path.split_first()) {
            (NodeKind::Leaf(items), None) if offset < items.len() => Some(items.remove(offset)),
            (NodeKind::Internal(children), Some((&idx, rest))) => children
                .get_mut(usize::from(idx))?
                .remove_along_path(rest, offset),
            _ => None,
        };
        if removed.is_some() {
            self.recompute();
        }
        removed
    }

    /// Split so `self` keeps `[0, pos)`; requires `0 < pos < count`.
    ///
    /// Both halves keep this node's height and may be underfull on the
    /// cut edge.
    fn split_off(&mut self, pos: usize) -> Node<T> {
        let kind = match &mut self.kind {
            NodeKind::Leaf(items) => NodeKind::Leaf(items.split_off(pos.min(items.len()))),
            NodeKind::Internal(children) => {
                let (idx, offset) = locate(children, pos, false).unwrap_or((children.len(), 0));
                let tail = if offset == 0 {
                    children.split_off(idx.min(children.len()))
                } else {
                    let child_tail = children[idx].split_off(offset);
                    let mut tail = children.split_off(idx + 1);
                    tail.insert(0, child_tail);
                    tail
                };
                NodeKind::Internal(tail)
            }
        };
        let mut right = Node {
            metrics: Metrics::default(),
            height: self.height,
            kind,
        };
        right.recompute();
        self.recompute();
        right
    }

    /// Merge underfull nodes along one edge of a freshly cut tree.
    fn repair_edge(&mut self, edge: Edge) {
        let NodeKind::Internal(children) = &mut self.kind else {
            return;
        };
        let idx = edge.index(children.len());
        rebalance_child(children, idx);
        let idx = edge.index(children.len());
        if let Some(child) = children.get_mut(idx) {
            child.repair_edge(edge);
        }
        let idx = edge.index(children.len());
        rebalance_child(children, idx);
        self.recompute();
    }

    /// Attach a shorter tree as the rightmost subtree.
    fn append_subtree(&mut self, sub: Node<T>) -> Option<Node<T>> {
        let height = self.height;
        if let NodeKind::Internal(children) = &mut self.kind {
            if height == sub.height + 1 {
                children.push(sub);
                let last = children.len() - 1;
                rebalance_child(children, last);
            } else if let Some(last) = children.last_mut() {
                if let Some(extra) = last.append_subtree(sub) {
                    children.push(extra);
                }
            }
        }
        self.recompute();
        self.is_overfull().then(|| self.split_half())
    }

    /// Attach a shorter tree as the leftmost subtree.
    fn prepend_subtree(&mut self, sub: Node<T>) -> Option<Node<T>> {
        let height = self.height;
        if let NodeKind::Internal(children) = &mut self.kind {
            if height == sub.height + 1 {
                children.insert(0, sub);
                rebalance_child(children, 0);
            } else if let Some(first) = children.first_mut() {
                if let Some(extra) = first.prepend_subtree(sub) {
                    children.insert(1, extra);
                }
            }
        }
        self.recompute();
        self.is_overfull().then(|| self.split_half())
    }

    fn stats(&self, stats: &mut RopeStats) {
        match &self.kind {
            NodeKind::Leaf(_) => stats.leaves += 1,
            NodeKind::Internal(children) => {
                stats.internal_nodes += 1;
                for child in children {
                    child.stats(stats);
                }
            }
        }
    }

    fn check(&self, is_root: bool) -> std::result::Result<(), String> {
        let mut expected = Metrics::default();
        match &self.kind {
            NodeKind::Leaf(items) => {
                if self.height != 0 {
                    return Err(format!("leaf at height {}", self.height));
                }
                if items.len() > MAX_LEAF {
                    return Err(format!("leaf with {} items", items.len()));
                }
                for item in items {
                    expected.add(&Metrics::of(item));
                }
            }
            NodeKind::Internal(children) => {
                if children.is_empty() || (is_root && children.len() < 2) {
                    return Err(format!("internal node with {} children", children.len()));
                }
                if children.len() > MAX_CHILDREN {
                    return Err(format!("internal node with {} children", children.len()));
                }
                for child in children {
                    if child.height + 1 != self.height {
                        return Err("leaves at uneven depth".to_string());
                    }
                    if child.count() == 0 {
                        return Err("empty child node".to_string());
                    }
                    child.check(false)?;
                    expected.add(&child.metrics);
                }
            }
        }
        if expected == self.metrics {
            Ok(())
        } else {
            Err(format!(
                "cached metrics {:?} differ from children {:?}",
                self.metrics, expected
            ))
        }
    }
}

/// Child index and offset within it for `pos`.
///
/// With `inclusive_end`, `pos == count` resolves to the end of the last
/// child (an insertion point).
fn locate<T: RopeItem>(
    children: &[Node<T>],
    mut pos: usize,
    inclusive_end: bool,
) -> Option<(usize, usize)> {
    let last = children.len().checked_sub(1)?;
    for (idx, child) in children.iter().enumerate() {
        descent_step();
        let n = child.count();
        if pos < n || (inclusive_end && idx == last && pos == n) {
            return Some((idx, pos));
        }
        pos -= n;
    }
    None
}

/// Merge `children[idx]` with a neighbour when it is underfull.
fn rebalance_child<T: RopeItem>(children: &mut Vec<Node<T>>, idx: usize) {
    if children.len() < 2 || idx >= children.len() || !children[idx].is_underfull() {
        return;
    }
    let left = if idx + 1 < children.len() { idx } else { idx - 1 };
    let right = children.remove(left + 1);
    children[left].absorb(right);
    if children[left].is_overfull() {
        let extra = children[left].split_half();
        children.insert(left + 1, extra);
    }
}

fn collapse<T: RopeItem>(mut node: Node<T>) -> Node<T> {
    while let NodeKind::Internal(children) = &mut node.kind {
        if children.len() != 1 {
            break;
        }
        let Some(only) = children.pop() else {
            break;
        };
        node = only;
    }
    node
}

fn split_node<T: RopeItem>(mut root: Node<T>, pos: usize) -> (Node<T>, Node<T>) {
    if pos == 0 {
        return (Node::empty_leaf(), root);
    }
    if pos >= root.count() {
        return (root, Node::empty_leaf());
    }
    let mut right = root.split_off(pos);
    root.repair_edge(Edge::Right);
    right.repair_edge(Edge::Left);
    (collapse(root), collapse(right))
}

fn join<T: RopeItem>(left: Node<T>, right: Node<T>) -> Node<T> {
    if right.count() == 0 {
        return left;
    }
    if left.count() == 0 {
        return right;
    }
    match left.height.cmp(&right.height) {
        Ordering::Equal => {
            let mut children = vec![left, right];
            rebalance_child(&mut children, 1);
            rebalance_child(&mut children, 0);
            collapse(Node::internal(children))
        }
        Ordering::Greater => {
            let mut left = left;
            match left.append_subtree(right) {
                Some(extra) => Node::internal(vec![left, extra]),
                None => left,
            }
        }
        Ordering::Less => {
            let mut right = right;
            match right.prepend_subtree(left) {
                Some(extra) => Node::internal(vec![right, extra]),
                None => right,
            }
        }
    }
}

/// Empty vector with room for `len` items.
fn try_vec<X>(len: usize) -> Result<Vec<X>> {
    let mut out = Vec::new();
    out.try_reserve_exact(len)
        .map_err(|e| Error::alloc(e, len.saturating_mul(mem::size_of::<X>())))?;
    Ok(out)
}

/// Split `items` into `ceil(len / max)` groups of near-equal size.
fn chunk_evenly<X>(items: Vec<X>, max: usize) -> Result<Vec<Vec<X>>> {
    let groups = items.len().div_ceil(max).max(1);
    let base = items.len() / groups;
    let extra = items.len() % groups;
    let mut out = try_vec(groups)?;
    let mut iter = items.into_iter();
    for g in 0..groups {
        let size = base + usize::from(g < extra);
        let mut group = try_vec(size)?;
        group.extend(iter.by_ref().take(size));
        out.push(group);
    }
    Ok(out)
}

fn build_level<X, T: RopeItem>(
    groups: Vec<Vec<X>>,
    make: fn(Vec<X>) -> Node<T>,
) -> Result<Vec<Node<T>>> {
    let mut level = try_vec(groups.len())?;
    level.extend(groups.into_iter().map(make));
    Ok(level)
}

/// Bottom-up balanced build: full leaves, full internal nodes.
///
/// Every allocation is reserved fallibly, so a failed build drops `items`
/// and leaves nothing half-constructed.
fn build<T: RopeItem>(items: Vec<T>) -> Result<Node<T>> {
    if items.is_empty() {
        return Ok(Node::empty_leaf());
    }
    let mut level = build_level(chunk_evenly(items, MAX_LEAF)?, Node::leaf)?;
    while level.len() > 1 {
        level = build_level(chunk_evenly(level, MAX_CHILDREN)?, Node::internal)?;
    }
    Ok(level.pop().unwrap_or_else(Node::empty_leaf))
}

/// Copy `items` into a fallibly reserved vector.
fn try_to_vec<T: Clone>(items: &[T]) -> Result<Vec<T>> {
    let mut out = try_vec(items.len())?;
    out.extend_from_slice(items);
    Ok(out)
}

fn walk_node<T, F>(node: &Node<T>, mut start: usize, mut base: usize, visitor: &mut F) -> ControlFlow<()>
where
    T: RopeItem,
    F: FnMut(&T, usize) -> ControlFlow<()>,
{
    match &node.kind {
        NodeKind::Leaf(items) => {
            for (i, item) in items.iter().enumerate().skip(start) {
                visitor(item, base + i)?;
            }
        }
        NodeKind::Internal(children) => {
            for child in children {
                let n = child.count();
                if start >= n {
                    start -= n;
                    base += n;
                    continue;
                }
                walk_node(child, start, base, visitor)?;
                start = 0;
                base += n;
            }
        }
    }
    ControlFlow::Continue(())
}

#[derive(Clone, Debug)]
struct MarkerIndex<T: RopeItem> {
    generation: u64,
    entries: HashMap<T::Marker, Vec<MarkerEntry<T::Summary>>>,
}

/// Balanced sequence of `T` with cached subtree metrics.
#[derive(Clone, Debug)]
pub struct Rope<T: RopeItem> {
    root: Node<T>,
    generation: u64,
    markers: Option<MarkerIndex<T>>,
}

impl<T: RopeItem> Default for Rope<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: RopeItem> Rope<T> {
    /// Create an empty rope.
    #[must_use]
    pub fn new() -> Self {
        Self::from_root(Node::empty_leaf())
    }

    fn from_root(root: Node<T>) -> Self {
        Self {
            root,
            generation: 0,
            markers: None,
        }
    }

    /// Build a balanced rope from a slice in O(n).
    ///
    /// Leaves and internal nodes are filled evenly, which gives a shallower
    /// and denser tree than appending the same items one at a time. Fails
    /// with [`Error::AllocationFailed`] instead of aborting.
    pub fn from_slice(items: &[T]) -> Result<Self> {
        Self::from_vec(try_to_vec(items)?)
    }

    /// Build a balanced rope, taking ownership of the items.
    pub fn from_vec(items: Vec<T>) -> Result<Self> {
        Ok(Self::from_root(build(items)?))
    }

    /// Number of items.
    #[must_use]
    pub fn count(&self) -> usize {
        self.root.count()
    }

    /// Check if the rope holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Summary of the whole rope.
    #[must_use]
    pub fn summary(&self) -> T::Summary {
        self.root.metrics.summary
    }

    /// Mutation counter; bumped by every change to content or shape.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Shape statistics for balance comparisons.
    #[must_use]
    pub fn stats(&self) -> RopeStats {
        let mut stats = RopeStats {
            count: self.count(),
            height: self.root.height,
            ..RopeStats::default()
        };
        self.root.stats(&mut stats);
        stats
    }

    /// Verify cached metrics, uniform leaf depth and node fill bounds.
    #[doc(hidden)]
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        self.root.check(true)
    }

    fn touch(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    fn check_index(&self, pos: usize) -> Result<()> {
        if pos < self.count() {
            Ok(())
        } else {
            Err(Error::OutOfRange {
                index: pos,
                len: self.count(),
            })
        }
    }

    fn check_insert_pos(&self, pos: usize) -> Result<()> {
        if pos <= self.count() {
            Ok(())
        } else {
            Err(Error::OutOfRange {
                index: pos,
                len: self.count(),
            })
        }
    }

    fn check_range(&self, start: usize, end: usize) -> Result<()> {
        if start <= end && end <= self.count() {
            Ok(())
        } else {
            Err(Error::InvalidRange {
                start,
                end,
                len: self.count(),
            })
        }
    }

    /// Item at `pos`.
    pub fn get(&self, pos: usize) -> Result<&T> {
        self.check_index(pos)?;
        self.root.get(pos).ok_or(Error::OutOfRange {
            index: pos,
            len: self.count(),
        })
    }

    /// Item at `pos`, or the empty sentinel when out of range.
    #[must_use]
    pub fn get_or_empty(&self, pos: usize) -> T {
        self.root.get(pos).cloned().unwrap_or_else(T::empty)
    }

    /// Insert `item` so it ends up at `pos`. `pos == count()` appends.
    pub fn insert(&mut self, pos: usize, item: T) -> Result<()> {
        self.check_insert_pos(pos)?;
        if let Some(split) = self.root.insert(pos, item) {
            let left = mem::replace(&mut self.root, Node::empty_leaf());
            self.root = Node::internal(vec![left, split]);
        }
        self.touch();
        Ok(())
    }

    /// Insert a run of items starting at `pos`.
    pub fn insert_slice(&mut self, pos: usize, items: &[T]) -> Result<()> {
        self.check_insert_pos(pos)?;
        match items {
            [] => return Ok(()),
            [item] => return self.insert(pos, item.clone()),
            _ => {}
        }
        let middle = build(try_to_vec(items)?)?;
        let root = mem::replace(&mut self.root, Node::empty_leaf());
        let (left, right) = split_node(root, pos);
        self.root = join(join(left, middle), right);
        self.touch();
        Ok(())
    }

    /// Append one item.
    pub fn append(&mut self, item: T) {
        let pos = self.count();
        if let Some(split) = self.root.insert(pos, item) {
            let left = mem::replace(&mut self.root, Node::empty_leaf());
            self.root = Node::internal(vec![left, split]);
        }
        self.touch();
    }

    /// Prepend one item.
    pub fn prepend(&mut self, item: T) {
        if let Some(split) = self.root.insert(0, item) {
            let left = mem::replace(&mut self.root, Node::empty_leaf());
            self.root = Node::internal(vec![left, split]);
        }
        self.touch();
    }

    /// Replace the item at `pos`, returning the old one.
    pub fn replace(&mut self, pos: usize, item: T) -> Result<T> {
        self.check_index(pos)?;
        let old = self.root.replace(pos, item).ok_or(Error::OutOfRange {
            index: pos,
            len: self.count(),
        })?;
        self.touch();
        Ok(old)
    }

    /// Remove and return the item at `pos`.
    pub fn delete(&mut self, pos: usize) -> Result<T> {
        self.check_index(pos)?;
        let removed = self.drain_range(pos, pos + 1)?;
        removed
            .iter()
            .next()
            .cloned()
            .ok_or(Error::OutOfRange {
                index: pos,
                len: self.count(),
            })
    }

    /// Remove `[start, end)`. `start == end` is a no-op.
    pub fn delete_range(&mut self, start: usize, end: usize) -> Result<()> {
        self.drain_range(start, end).map(drop)
    }

    /// Remove `[start, end)` and return the removed items as a rope.
    pub fn drain_range(&mut self, start: usize, end: usize) -> Result<Rope<T>> {
        self.check_range(start, end)?;
        if start == end {
            return Ok(Self::new());
        }
        let root = mem::replace(&mut self.root, Node::empty_leaf());
        let (left, rest) = split_node(root, start);
        let (middle, right) = split_node(rest, end - start);
        self.root = join(left, right);
        self.touch();
        Ok(Self::from_root(middle))
    }

    /// Split in place: `self` keeps `[0, pos)`, the returned rope owns the rest.
    pub fn split(&mut self, pos: usize) -> Result<Rope<T>> {
        self.check_insert_pos(pos)?;
        let root = mem::replace(&mut self.root, Node::empty_leaf());
        let (left, right) = split_node(root, pos);
        self.root = left;
        self.touch();
        Ok(Self::from_root(right))
    }

    /// Append all of `other`'s items, leaving `other` empty.
    pub fn concat(&mut self, other: &mut Rope<T>) {
        let right = mem::replace(&mut other.root, Node::empty_leaf());
        other.touch();
        let left = mem::replace(&mut self.root, Node::empty_leaf());
        self.root = join(left, right);
        self.touch();
    }

    /// Remove every item.
    pub fn clear(&mut self) {
        self.root = Node::empty_leaf();
        self.touch();
    }

    /// Visit every item in order with its position.
    ///
    /// Returns `false` if the visitor stopped early.
    pub fn walk<F>(&self, visitor: F) -> bool
    where
        F: FnMut(&T, usize) -> ControlFlow<()>,
    {
        self.walk_from(0, visitor)
    }

    /// Visit items from `start` onwards, skipping whole subtrees before it.
    pub fn walk_from<F>(&self, start: usize, mut visitor: F) -> bool
    where
        F: FnMut(&T, usize) -> ControlFlow<()>,
    {
        walk_node(&self.root, start, 0, &mut visitor).is_continue()
    }

    /// In-order iterator over all items.
    #[must_use]
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            stack: vec![std::slice::from_ref(&self.root).iter()],
            leaf: [].iter(),
        }
    }

    /// Copy all items into a vector.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }

    /// Summary of items `[0, pos)`.
    pub fn prefix_summary(&self, pos: usize) -> Result<T::Summary> {
        self.check_insert_pos(pos)?;
        let mut acc = T::Summary::default();
        let mut node = &self.root;
        let mut pos = pos;
        loop {
            match &node.kind {
                NodeKind::Leaf(items) => {
                    for item in &items[..pos.min(items.len())] {
                        acc.add(&item.measure());
                    }
                    return Ok(acc);
                }
                NodeKind::Internal(children) => {
                    let mut next = None;
                    for child in children {
                        if pos < child.count() {
                            next = Some(child);
                            break;
                        }
                        acc.add(&child.metrics.summary);
                        pos -= child.count();
                    }
                    match next {
                        Some(child) => node = child,
                        None => return Ok(acc),
                    }
                }
            }
        }
    }

    /// First item whose extent along `dimension` covers `target`.
    ///
    /// `dimension` projects a summary onto an additive axis (bytes, lines,
    /// ...). Returns the item's position and the summary of everything
    /// before it, or `None` when `target` is at or past the total.
    pub fn find_by<F>(&self, target: u64, dimension: F) -> Option<(usize, T::Summary)>
    where
        F: Fn(&T::Summary) -> u64,
    {
        let mut acc = T::Summary::default();
        let mut acc_dim = 0u64;
        let mut pos = 0usize;
        let mut node = &self.root;
        loop {
            match &node.kind {
                NodeKind::Leaf(items) => {
                    for item in items {
                        let summary = item.measure();
                        let d = dimension(&summary);
                        if target < acc_dim + d {
                            return Some((pos, acc));
                        }
                        acc_dim += d;
                        acc.add(&summary);
                        pos += 1;
                    }
                    return None;
                }
                NodeKind::Internal(children) => {
                    let mut next = None;
                    for child in children {
                        let d = dimension(&child.metrics.summary);
                        if target < acc_dim + d {
                            next = Some(child);
                            break;
                        }
                        acc_dim += d;
                        acc.add(&child.metrics.summary);
                        pos += child.count();
                    }
                    node = next?;
                }
            }
        }
    }

    fn path_to(&self, pos: usize) -> (SmallVec<[u16; 8]>, usize) {
        let mut path = SmallVec::new();
        let mut node = &self.root;
        let mut offset = pos;
        while let NodeKind::Internal(children) = &node.kind {
            let Some((idx, off)) = locate(children, offset, true) else {
                break;
            };
            path.push(idx as u16);
            node = &children[idx];
            offset = off;
        }
        (path, offset)
    }

    fn leaf_len_along(&self, path: &[u16]) -> Option<usize> {
        let mut node = &self.root;
        for &idx in path {
            let NodeKind::Internal(children) = &node.kind else {
                return None;
            };
            node = children.get(usize::from(idx))?;
        }
        match &node.kind {
            NodeKind::Leaf(items) => Some(items.len()),
            NodeKind::Internal(_) => None,
        }
    }

    fn check_finger(&self, finger: &Finger) -> Result<()> {
        if finger.generation == self.generation {
            Ok(())
        } else {
            Err(Error::StaleFinger {
                finger: finger.generation,
                current: self.generation,
            })
        }
    }

    /// Create a finger at `pos` (`pos == count()` is allowed).
    pub fn make_finger(&self, pos: usize) -> Result<Finger> {
        self.check_insert_pos(pos)?;
        let (path, leaf_offset) = self.path_to(pos);
        Ok(Finger {
            pos,
            path,
            leaf_offset,
            generation: self.generation,
        })
    }

    /// Re-seek a finger to `pos` at the current generation.
    pub fn seek(&self, finger: &mut Finger, pos: usize) -> Result<()> {
        *finger = self.make_finger(pos)?;
        Ok(())
    }

    /// Insert at the finger's position and advance the finger past the item.
    ///
    /// When the target leaf has room this walks only the cached path, one
    /// node per level with no child search; otherwise it falls back to a
    /// regular insert and re-seeks.
    pub fn insert_at_finger(&mut self, finger: &mut Finger, item: T) -> Result<()> {
        self.check_finger(finger)?;
        if let Err(item) = self.root.insert_along_path(&finger.path, finger.leaf_offset, item) {
            let pos = finger.pos;
            self.insert(pos, item)?;
            *finger = self.make_finger(pos + 1)?;
            return Ok(());
        }
        self.touch();
        finger.pos += 1;
        finger.leaf_offset += 1;
        finger.generation = self.generation;
        Ok(())
    }

    /// Delete the item at the finger's position; the finger stays put.
    pub fn delete_at_finger(&mut self, finger: &mut Finger) -> Result<T> {
        self.check_finger(finger)?;
        self.check_index(finger.pos)?;
        let fast = self
            .leaf_len_along(&finger.path)
            .is_some_and(|len| len > MIN_LEAF && finger.leaf_offset < len);
        let pos = finger.pos;
        let removed = if fast {
            self.root
                .remove_along_path(&finger.path, finger.leaf_offset)
                .ok_or(Error::OutOfRange {
                    index: pos,
                    len: self.count(),
                })?
        } else {
            let removed = self.delete(pos)?;
            *finger = self.make_finger(pos)?;
            return Ok(removed);
        };
        self.touch();
        finger.generation = self.generation;
        Ok(removed)
    }

    /// Rescan the rope and index every marker item. O(n).
    ///
    /// The index is valid until the next mutation.
    pub fn rebuild_marker_index(&mut self) {
        let mut entries: HashMap<T::Marker, Vec<MarkerEntry<T::Summary>>> = HashMap::new();
        let mut prefix = T::Summary::default();
        for (pos, item) in self.iter().enumerate() {
            if let Some(kind) = item.marker() {
                entries
                    .entry(kind)
                    .or_default()
                    .push(MarkerEntry { pos, prefix });
            }
            prefix.add(&item.measure());
        }
        tracing::debug!(
            generation = self.generation,
            kinds = entries.len(),
            items = self.count(),
            "rebuilt rope marker index"
        );
        self.markers = Some(MarkerIndex {
            generation: self.generation,
            entries,
        });
    }

    /// Whether the marker index matches the current generation.
    #[must_use]
    pub fn has_fresh_marker_index(&self) -> bool {
        self.markers
            .as_ref()
            .is_some_and(|index| index.generation == self.generation)
    }

    fn marker_index(&self) -> Result<&MarkerIndex<T>> {
        match &self.markers {
            Some(index) if index.generation == self.generation => Ok(index),
            other => Err(Error::StaleMarkerIndex {
                built_at: other.as_ref().map(|index| index.generation),
                current: self.generation,
            }),
        }
    }

    /// Number of markers of `kind`. O(1).
    pub fn marker_count(&self, kind: T::Marker) -> Result<usize> {
        Ok(self.marker_index()?.entries.get(&kind).map_or(0, Vec::len))
    }

    /// The `ordinal`-th marker of `kind`. O(1).
    pub fn get_marker(&self, kind: T::Marker, ordinal: usize) -> Result<MarkerEntry<T::Summary>> {
        let entries = self.markers(kind)?;
        entries.get(ordinal).copied().ok_or(Error::OutOfRange {
            index: ordinal,
            len: entries.len(),
        })
    }

    /// All markers of `kind`, in rope order.
    pub fn markers(&self, kind: T::Marker) -> Result<&[MarkerEntry<T::Summary>]> {
        Ok(self
            .marker_index()?
            .entries
            .get(&kind)
            .map_or(&[], Vec::as_slice))
    }
}

/// In-order iterator over a rope's items.
pub struct Iter<'a, T: RopeItem> {
    stack: Vec<std::slice::Iter<'a, Node<T>>>,
    leaf: std::slice::Iter<'a, T>,
}

impl<'a, T: RopeItem> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        loop {
            if let Some(item) = self.leaf.next() {
                return Some(item);
            }
            let top = self.stack.last_mut()?;
            match top.next() {
                Some(node) => match &node.kind {
                    NodeKind::Leaf(items) => self.leaf = items.iter(),
                    NodeKind::Internal(children) => self.stack.push(children.iter()),
                },
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}

impl<'a, T: RopeItem> IntoIterator for &'a Rope<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: RopeItem> TryFrom<Vec<T>> for Rope<T> {
    type Error = Error;

    fn try_from(items: Vec<T>) -> Result<Self> {
        Self::from_vec(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    struct Letter(char);

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    enum Mark {
        Vowel,
    }

    impl RopeItem for Letter {
        type Summary = u64;
        type Marker = Mark;

        fn measure(&self) -> u64 {
            if self.0 == 'w' { 2 } else { 1 }
        }

        fn marker(&self) -> Option<Mark> {
            "aeiou".contains(self.0).then_some(Mark::Vowel)
        }

        fn empty() -> Self {
            Letter('\0')
        }
    }

    fn alphabet() -> Vec<Letter> {
        ('a'..='z').map(Letter).collect()
    }

    fn text(rope: &Rope<Letter>) -> String {
        rope.iter().map(|l| l.0).collect()
    }

    fn numbered(n: usize) -> Vec<Letter> {
        (0..n)
            .map(|i| Letter(char::from(b'a' + (i % 26) as u8)))
            .collect()
    }

    #[test]
    fn test_split_concat_alphabet() {
        let mut rope = Rope::from_slice(&alphabet()).unwrap();
        let mut tail = rope.split(13).unwrap();
        assert_eq!(text(&rope), "abcdefghijklm");
        assert_eq!(text(&tail), "nopqrstuvwxyz");

        rope.concat(&mut tail);
        assert!(tail.is_empty());

        let mut walked = String::new();
        assert!(rope.walk(|item, _| {
            walked.push(item.0);
            ControlFlow::Continue(())
        }));
        assert_eq!(walked, "abcdefghijklmnopqrstuvwxyz");
        rope.check_invariants().unwrap();
    }

    #[test]
    fn test_get_and_bounds() {
        let rope = Rope::from_slice(&alphabet()).unwrap();
        assert_eq!(rope.count(), 26);
        assert_eq!(rope.get(0).unwrap(), &Letter('a'));
        assert_eq!(rope.get(25).unwrap(), &Letter('z'));
        assert_eq!(
            rope.get(26),
            Err(Error::OutOfRange { index: 26, len: 26 })
        );
        assert_eq!(rope.get_or_empty(99), Letter('\0'));
        // 'w' weighs 2.
        assert_eq!(rope.summary(), 27);
    }

    #[test]
    fn test_insert_positions() {
        let mut rope = Rope::new();
        rope.insert(0, Letter('b')).unwrap();
        rope.insert(1, Letter('c')).unwrap();
        rope.insert(0, Letter('a')).unwrap();
        assert_eq!(text(&rope), "abc");
        assert!(rope.insert(5, Letter('x')).is_err());
        assert_eq!(text(&rope), "abc");
    }

    #[test]
    fn test_delete_range_edges() {
        let mut rope = Rope::from_slice(&alphabet()).unwrap();
        let generation = rope.generation();
        rope.delete_range(3, 3).unwrap();
        assert_eq!(rope.generation(), generation);
        assert_eq!(
            rope.delete_range(5, 3),
            Err(Error::InvalidRange {
                start: 5,
                end: 3,
                len: 26
            })
        );
        assert!(rope.delete_range(0, 27).is_err());
        assert_eq!(rope.count(), 26);

        rope.delete_range(1, 25).unwrap();
        assert_eq!(text(&rope), "az");
        assert_eq!(rope.delete(1).unwrap(), Letter('z'));
        assert_eq!(text(&rope), "a");
    }

    #[test]
    fn test_large_mixed_operations_match_vec() {
        let mut rope = Rope::new();
        let mut model: Vec<Letter> = Vec::new();
        let mut seed = 0x2545_f491_u64;
        let mut next = move |bound: usize| {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            (seed % bound as u64) as usize
        };

        for step in 0..3000 {
            let letter = Letter(char::from(b'a' + (step % 26) as u8));
            match next(5) {
                0 | 1 => {
                    let pos = next(model.len() + 1);
                    rope.insert(pos, letter).unwrap();
                    model.insert(pos, letter);
                }
                2 if !model.is_empty() => {
                    let start = next(model.len());
                    let end = start + next(model.len() - start + 1).min(40);
                    rope.delete_range(start, end).unwrap();
                    model.drain(start..end);
                }
                3 => {
                    let pos = next(model.len() + 1);
                    let items = numbered(next(70));
                    rope.insert_slice(pos, &items).unwrap();
                    model.splice(pos..pos, items);
                }
                _ => {
                    let pos = next(model.len() + 1);
                    let mut tail = rope.split(pos).unwrap();
                    rope.concat(&mut tail);
                }
            }
            assert_eq!(rope.count(), model.len());
        }
        assert_eq!(rope.to_vec(), model);
        rope.check_invariants().unwrap();
    }

    #[test]
    fn test_from_slice_is_denser_than_appends() {
        let items = numbered(5000);
        let built = Rope::from_slice(&items).unwrap();
        let mut appended = Rope::new();
        for item in &items {
            appended.append(*item);
        }
        assert_eq!(built.to_vec(), appended.to_vec());

        let built_stats = built.stats();
        let appended_stats = appended.stats();
        assert!(built_stats.height <= appended_stats.height);
        assert!(built_stats.leaves < appended_stats.leaves);
        built.check_invariants().unwrap();
        appended.check_invariants().unwrap();
    }

    #[test]
    fn test_walk_early_stop_and_from() {
        let rope = Rope::from_slice(&numbered(500)).unwrap();
        let mut seen = Vec::new();
        let completed = rope.walk(|_, pos| {
            seen.push(pos);
            if pos == 9 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        assert!(!completed);
        assert_eq!(seen, (0..10).collect::<Vec<_>>());

        let mut positions = Vec::new();
        rope.walk_from(490, |_, pos| {
            positions.push(pos);
            ControlFlow::Continue(())
        });
        assert_eq!(positions, (490..500).collect::<Vec<_>>());
    }

    #[test]
    fn test_prefix_summary_and_find_by() {
        let rope = Rope::from_slice(&alphabet()).unwrap();
        // a..v weigh 1 each, w weighs 2.
        assert_eq!(rope.prefix_summary(22).unwrap(), 22);
        assert_eq!(rope.prefix_summary(23).unwrap(), 24);
        assert_eq!(rope.prefix_summary(26).unwrap(), 27);

        assert_eq!(rope.find_by(0, |s| *s), Some((0, 0)));
        assert_eq!(rope.find_by(23, |s| *s), Some((22, 22)));
        assert_eq!(rope.find_by(24, |s| *s), Some((23, 24)));
        assert_eq!(rope.find_by(27, |s| *s), None);
    }

    #[test]
    fn test_marker_index_lifecycle() {
        let mut rope = Rope::from_slice(&alphabet()).unwrap();
        assert!(matches!(
            rope.marker_count(Mark::Vowel),
            Err(Error::StaleMarkerIndex { built_at: None, .. })
        ));

        rope.rebuild_marker_index();
        assert_eq!(rope.marker_count(Mark::Vowel).unwrap(), 5);
        let e = rope.get_marker(Mark::Vowel, 1).unwrap();
        assert_eq!(e, MarkerEntry { pos: 4, prefix: 4 });
        assert!(rope.get_marker(Mark::Vowel, 5).is_err());

        rope.insert(0, Letter('o')).unwrap();
        assert!(!rope.has_fresh_marker_index());
        assert!(matches!(
            rope.get_marker(Mark::Vowel, 0),
            Err(Error::StaleMarkerIndex {
                built_at: Some(_),
                ..
            })
        ));

        rope.rebuild_marker_index();
        assert_eq!(rope.marker_count(Mark::Vowel).unwrap(), 6);
    }

    #[test]
    fn test_finger_inserts() {
        let mut rope = Rope::from_slice(&numbered(2000)).unwrap();
        let mut model = rope.to_vec();
        let mut finger = rope.make_finger(1000).unwrap();
        for i in 0..200 {
            let letter = Letter(char::from(b'A' + (i % 26) as u8));
            rope.insert_at_finger(&mut finger, letter).unwrap();
            model.insert(1000 + i, letter);
            assert_eq!(finger.position(), 1001 + i);
        }
        assert_eq!(rope.to_vec(), model);
        rope.check_invariants().unwrap();

        let removed = rope.delete_at_finger(&mut finger).unwrap();
        assert_eq!(removed, model.remove(1200));
        assert_eq!(rope.to_vec(), model);
        rope.check_invariants().unwrap();
    }

    #[test]
    fn test_finger_fills_empty_rope_and_end() {
        let mut rope = Rope::new();
        let mut finger = rope.make_finger(0).unwrap();
        for letter in numbered(100) {
            rope.insert_at_finger(&mut finger, letter).unwrap();
        }
        assert_eq!(rope.to_vec(), numbered(100));
        assert_eq!(finger.position(), 100);
        assert_eq!(finger.generation(), rope.generation());
        rope.check_invariants().unwrap();

        rope.insert_at_finger(&mut finger, Letter('w')).unwrap();
        assert_eq!(rope.get(100).unwrap(), &Letter('w'));
        assert_eq!(rope.summary(), 102);
        rope.check_invariants().unwrap();
    }

    fn descent_steps() -> u64 {
        DESCENT_STEPS.with(std::cell::Cell::get)
    }

    #[test]
    fn test_clustered_finger_inserts_take_fewer_steps() {
        let mut positional = Rope::from_slice(&numbered(100_000)).unwrap();
        let mut fingered = positional.clone();

        let before = descent_steps();
        for i in 0..512 {
            positional.insert(50_000 + i, Letter('x')).unwrap();
        }
        let positional_steps = descent_steps() - before;

        let before = descent_steps();
        let mut finger = fingered.make_finger(50_000).unwrap();
        for _ in 0..512 {
            fingered.insert_at_finger(&mut finger, Letter('x')).unwrap();
        }
        let finger_steps = descent_steps() - before;

        assert_eq!(fingered.to_vec(), positional.to_vec());
        assert!(
            finger_steps * 2 < positional_steps,
            "finger took {finger_steps} steps, positional {positional_steps}"
        );
        fingered.check_invariants().unwrap();
    }

    #[test]
    fn test_failed_reserve_is_reported() {
        assert!(matches!(
            try_vec::<Letter>(usize::MAX),
            Err(Error::AllocationFailed { .. })
        ));

        let mut rope = Rope::from_slice(&alphabet()).unwrap();
        let generation = rope.generation();
        assert!(rope.insert_slice(99, &numbered(40)).is_err());
        assert_eq!(rope.generation(), generation);
        assert_eq!(text(&rope), "abcdefghijklmnopqrstuvwxyz");

        let rope = Rope::try_from(numbered(40)).unwrap();
        assert_eq!(rope.count(), 40);
        rope.check_invariants().unwrap();
    }

    #[test]
    fn test_stale_finger_rejected() {
        let mut rope = Rope::from_slice(&alphabet()).unwrap();
        let mut finger = rope.make_finger(3).unwrap();
        rope.insert(0, Letter('x')).unwrap();
        assert!(matches!(
            rope.insert_at_finger(&mut finger, Letter('y')),
            Err(Error::StaleFinger { .. })
        ));
        assert_eq!(rope.count(), 27);

        rope.seek(&mut finger, 3).unwrap();
        rope.insert_at_finger(&mut finger, Letter('y')).unwrap();
        assert_eq!(rope.get(3).unwrap(), &Letter('y'));
    }

    #[test]
    fn test_concat_uneven_heights() {
        let mut big = Rope::from_slice(&numbered(10_000)).unwrap();
        let mut small = Rope::from_slice(&alphabet()).unwrap();
        let mut expected = big.to_vec();
        expected.extend(alphabet());

        big.concat(&mut small);
        assert_eq!(big.to_vec(), expected);
        big.check_invariants().unwrap();

        let mut tiny = Rope::from_slice(&alphabet()[..3]).unwrap();
        let mut huge = Rope::from_slice(&numbered(10_000)).unwrap();
        let mut expected = tiny.to_vec();
        expected.extend(huge.to_vec());
        tiny.concat(&mut huge);
        assert_eq!(tiny.to_vec(), expected);
        tiny.check_invariants().unwrap();
    }
}
