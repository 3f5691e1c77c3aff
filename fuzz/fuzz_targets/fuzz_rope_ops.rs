//! Fuzz target for rope structure under arbitrary edit sequences.
//!
//! Mirrors each operation on a `Vec` and checks the tree invariants after
//! every step.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use opentui_text::text::{Rope, RopeItem};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Item(u16);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct Marked;

impl RopeItem for Item {
    type Summary = u64;
    type Marker = Marked;

    fn measure(&self) -> u64 {
        u64::from(self.0)
    }

    fn marker(&self) -> Option<Marked> {
        (self.0 % 3 == 0).then_some(Marked)
    }

    fn empty() -> Self {
        Self(0)
    }
}

#[derive(Arbitrary, Debug)]
enum Op {
    Insert(u16, u16),
    InsertRun(u16, Vec<u16>),
    Delete(u16),
    DeleteRange(u16, u16),
    Split(u16),
    FingerRun(u16, u8),
    RebuildMarkers,
}

fuzz_target!(|ops: Vec<Op>| {
    let mut rope: Rope<Item> = Rope::new();
    let mut model: Vec<u16> = Vec::new();

    for op in ops.into_iter().take(256) {
        let len = model.len();
        match op {
            Op::Insert(p, v) => {
                let pos = usize::from(p) % (len + 1);
                rope.insert(pos, Item(v)).unwrap();
                model.insert(pos, v);
            }
            Op::InsertRun(p, values) => {
                let pos = usize::from(p) % (len + 1);
                let items: Vec<Item> = values.iter().copied().map(Item).collect();
                rope.insert_slice(pos, &items).unwrap();
                model.splice(pos..pos, values);
            }
            Op::Delete(p) => {
                if len == 0 {
                    assert!(rope.delete(0).is_err());
                } else {
                    let pos = usize::from(p) % len;
                    assert_eq!(rope.delete(pos).unwrap(), Item(model.remove(pos)));
                }
            }
            Op::DeleteRange(a, b) => {
                let a = usize::from(a) % (len + 1);
                let b = usize::from(b) % (len + 1);
                let (start, end) = (a.min(b), a.max(b));
                rope.delete_range(start, end).unwrap();
                model.drain(start..end);
            }
            Op::Split(p) => {
                let pos = usize::from(p) % (len + 1);
                let mut right = rope.split(pos).unwrap();
                rope.concat(&mut right);
            }
            Op::FingerRun(p, n) => {
                let pos = usize::from(p) % (len + 1);
                let mut finger = rope.make_finger(pos).unwrap();
                for i in 0..usize::from(n % 32) {
                    rope.insert_at_finger(&mut finger, Item(7)).unwrap();
                    model.insert(pos + i, 7);
                }
            }
            Op::RebuildMarkers => {
                rope.rebuild_marker_index();
                let expected = model.iter().filter(|v| *v % 3 == 0).count();
                assert_eq!(rope.marker_count(Marked).unwrap(), expected);
            }
        }
        assert_eq!(rope.count(), model.len());
        if let Err(msg) = rope.check_invariants() {
            panic!("invariant violated: {msg}");
        }
    }

    let items: Vec<u16> = rope.iter().map(|item| item.0).collect();
    assert_eq!(items, model);
});
