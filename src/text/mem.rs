//! Registry of immutable text buffers.
//!
//! Segments never own bytes. They reference `(MemId, start, end)` ranges in
//! a [`MemRegistry`] owned by the text buffer. A registered buffer is never
//! mutated, so ranges into it stay valid until the buffer is released.
//!
//! Small edits go to a growable scratch buffer instead of registering one
//! buffer per keystroke. The scratch buffer only ever grows at the end, so
//! ranges into it are as stable as ranges into frozen buffers.
//!
//! Released slots are reused. Each slot carries a generation that is bumped
//! on release, so an id for a released buffer never aliases its successor.
//!
//! # Invariants
//!
//! - A [`MemId`] is only valid for the registry that issued it and only
//!   until its buffer is released; other ids (including ids from before
//!   [`MemRegistry::clear`]) are rejected with [`Error::InvalidMemId`].
//! - Bytes inside a returned range never change while the id is valid.

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_REGISTRY: AtomicU32 = AtomicU32::new(1);

fn next_registry_id() -> u32 {
    NEXT_REGISTRY.fetch_add(1, Ordering::Relaxed)
}

/// Handle to a buffer in a [`MemRegistry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemId {
    registry: u32,
    index: u32,
    generation: u32,
}

impl MemId {
    /// Id no registry issues (registry identities start at 1).
    pub(crate) const DANGLING: Self = Self {
        registry: 0,
        index: 0,
        generation: 0,
    };

    /// Slot index within the issuing registry.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }
}

#[derive(Debug, Default)]
struct Slot {
    text: String,
    generation: u32,
    live: bool,
}

/// Owning store of the bytes every segment points into.
#[derive(Debug)]
pub struct MemRegistry {
    id: u32,
    slots: Vec<Slot>,
    free: Vec<u32>,
    scratch: Option<MemId>,
}

impl Default for MemRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MemRegistry {
    /// Create an empty registry with a fresh identity.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: next_registry_id(),
            slots: Vec::new(),
            free: Vec::new(),
            scratch: None,
        }
    }

    /// Number of live buffers, including the scratch buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of slots ever allocated; released slots are reused.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Total bytes held across all live buffers.
    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.slots.iter().map(|slot| slot.text.len()).sum()
    }

    fn slot(&self, id: MemId) -> Result<&Slot> {
        if id.registry != self.id {
            return Err(Error::InvalidMemId(id));
        }
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.live && slot.generation == id.generation)
            .ok_or(Error::InvalidMemId(id))
    }

    fn push(&mut self, text: String) -> Result<MemId> {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.text = text;
            slot.live = true;
            return Ok(MemId {
                registry: self.id,
                index,
                generation: slot.generation,
            });
        }
        self.slots
            .try_reserve(1)
            .map_err(|e| Error::alloc(e, std::mem::size_of::<Slot>()))?;
        // Reserve the free-list entry now so a later release cannot fail.
        let needed = (self.slots.len() + 1).saturating_sub(self.free.len());
        self.free
            .try_reserve(needed)
            .map_err(|e| Error::alloc(e, std::mem::size_of::<u32>()))?;
        let id = MemId {
            registry: self.id,
            index: self.slots.len() as u32,
            generation: 0,
        };
        self.slots.push(Slot {
            text,
            generation: 0,
            live: true,
        });
        Ok(id)
    }

    /// Copy `text` into a new immutable buffer.
    pub fn register(&mut self, text: &str) -> Result<MemId> {
        let mut owned = String::new();
        owned
            .try_reserve_exact(text.len())
            .map_err(|e| Error::alloc(e, text.len()))?;
        owned.push_str(text);
        self.push(owned)
    }

    /// Take ownership of `text` as a new immutable buffer.
    pub fn register_owned(&mut self, text: String) -> Result<MemId> {
        self.push(text)
    }

    /// Append `text` to the scratch buffer and return the range it landed in.
    pub fn append_scratch(&mut self, text: &str) -> Result<(MemId, usize, usize)> {
        let id = match self.scratch {
            Some(id) => id,
            None => {
                let id = self.push(String::new())?;
                self.scratch = Some(id);
                id
            }
        };
        self.slot(id)?;
        let scratch = &mut self.slots[id.index as usize].text;
        scratch
            .try_reserve(text.len())
            .map_err(|e| Error::alloc(e, text.len()))?;
        let start = scratch.len();
        scratch.push_str(text);
        Ok((id, start, scratch.len()))
    }

    /// Whether `id` is the scratch buffer.
    #[must_use]
    pub fn is_scratch(&self, id: MemId) -> bool {
        self.scratch == Some(id)
    }

    /// Free a buffer. Its id, and every range into it, becomes invalid.
    pub fn release(&mut self, id: MemId) -> Result<()> {
        self.slot(id)?;
        let slot = &mut self.slots[id.index as usize];
        slot.text = String::new();
        slot.live = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        if self.scratch == Some(id) {
            self.scratch = None;
        }
        Ok(())
    }

    /// Free the scratch buffer, if any. The next edit starts a new one.
    pub fn release_scratch(&mut self) {
        if let Some(id) = self.scratch {
            let _ = self.release(id);
        }
    }

    /// Whole contents of a buffer.
    pub fn get(&self, id: MemId) -> Result<&str> {
        self.slot(id).map(|slot| slot.text.as_str())
    }

    /// `[start, end)` of a buffer.
    pub fn slice(&self, id: MemId, start: usize, end: usize) -> Result<&str> {
        let text = self.get(id)?;
        if start > end || end > text.len() {
            return Err(Error::InvalidRange {
                start,
                end,
                len: text.len(),
            });
        }
        if !text.is_char_boundary(start) {
            return Err(Error::NotCharBoundary(start));
        }
        if !text.is_char_boundary(end) {
            return Err(Error::NotCharBoundary(end));
        }
        Ok(&text[start..end])
    }

    /// Drop every buffer. Previously issued ids become invalid.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.scratch = None;
        self.id = next_registry_id();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_slice() {
        let mut reg = MemRegistry::new();
        let id = reg.register("hello world").unwrap();
        assert_eq!(reg.get(id).unwrap(), "hello world");
        assert_eq!(reg.slice(id, 6, 11).unwrap(), "world");
        assert_eq!(reg.len(), 1);
        assert!(matches!(
            reg.slice(id, 6, 12),
            Err(Error::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_slice_rejects_split_char() {
        let mut reg = MemRegistry::new();
        let id = reg.register("é").unwrap();
        assert_eq!(reg.slice(id, 0, 1), Err(Error::NotCharBoundary(1)));
    }

    #[test]
    fn test_foreign_ids_rejected() {
        let mut a = MemRegistry::new();
        let mut b = MemRegistry::new();
        let id_a = a.register("a").unwrap();
        b.register("b").unwrap();
        assert_eq!(b.get(id_a), Err(Error::InvalidMemId(id_a)));

        a.clear();
        assert!(a.get(id_a).is_err());
    }

    #[test]
    fn test_release_reuses_slot_with_new_generation() {
        let mut reg = MemRegistry::new();
        let first = reg.register("first").unwrap();
        let keep = reg.register("keep").unwrap();
        reg.release(first).unwrap();
        assert_eq!(reg.get(first), Err(Error::InvalidMemId(first)));
        assert_eq!(reg.release(first), Err(Error::InvalidMemId(first)));
        assert_eq!(reg.len(), 1);

        let second = reg.register("second").unwrap();
        assert_eq!(second.index(), first.index());
        assert_ne!(second, first);
        assert!(reg.get(first).is_err());
        assert_eq!(reg.get(second).unwrap(), "second");
        assert_eq!(reg.get(keep).unwrap(), "keep");
        assert_eq!(reg.capacity(), 2);
    }

    #[test]
    fn test_release_scratch_starts_fresh() {
        let mut reg = MemRegistry::new();
        let (old, _, _) = reg.append_scratch("typed").unwrap();
        reg.release_scratch();
        assert!(!reg.is_scratch(old));
        assert!(reg.get(old).is_err());

        let (new, start, end) = reg.append_scratch("x").unwrap();
        assert_ne!(new, old);
        assert_eq!((start, end), (0, 1));
        assert_eq!(reg.total_bytes(), 1);
    }

    #[test]
    fn test_scratch_ranges_stay_valid() {
        let mut reg = MemRegistry::new();
        let (id, s1, e1) = reg.append_scratch("ab").unwrap();
        let (id2, s2, e2) = reg.append_scratch("cd").unwrap();
        assert_eq!(id, id2);
        assert!(reg.is_scratch(id));
        assert_eq!((s1, e1, s2, e2), (0, 2, 2, 4));
        assert_eq!(reg.slice(id, s1, e1).unwrap(), "ab");
        assert_eq!(reg.slice(id, s2, e2).unwrap(), "cd");
    }
}
