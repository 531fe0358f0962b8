//! The segment: the mutable result of shaping one text run.
//!
//! Slots live in an arena and are threaded onto a doubly-linked list so
//! rule actions can splice and retire them without disturbing handles to
//! their neighbours. Retired slots go to a free pool and are recycled in
//! O(1) by later insertions.

use pathfinder_geometry::rect::RectF;
use pathfinder_geometry::vector::Vector2F;

use crate::machine::MachineStatus;
use crate::slot::{AttrCode, Slot, SlotRef};
use crate::GlyphId;

/// Hard ceiling on slots per segment, bounding worst-case rule expansion.
pub const MAX_SEG_SLOTS: usize = 65535;

/// Per-input-character record.
#[derive(Debug, Clone, Copy)]
pub struct CharInfo {
    /// The input code point.
    pub ch: u32,
    /// Break weight assigned before any pass runs.
    pub break_weight: i16,
    /// First slot position (in visual order) whose cluster covers this char.
    pub before: usize,
    /// Last slot position whose cluster covers this char.
    pub after: usize,
}

#[derive(Debug, Clone)]
struct SlotEntry {
    generation: u32,
    alive: bool,
    prev: Option<SlotRef>,
    next: Option<SlotRef>,
    slot: Slot,
}

#[derive(Debug, Clone)]
pub struct Segment {
    entries: Vec<SlotEntry>,
    free: Vec<u32>,
    first: Option<SlotRef>,
    last: Option<SlotRef>,
    len: usize,
    char_info: Vec<CharInfo>,
    advance: Vector2F,
    bbox: RectF,
    rtl: bool,
    num_user_attrs: u8,
    num_j_levels: u8,
    /// First non-`Finished` machine status observed while running passes.
    failure: Option<MachineStatus>,
}

impl Segment {
    pub(crate) fn new(rtl: bool, num_user_attrs: u8, num_j_levels: u8) -> Segment {
        Segment {
            entries: Vec::new(),
            free: Vec::new(),
            first: None,
            last: None,
            len: 0,
            char_info: Vec::new(),
            advance: Vector2F::zero(),
            bbox: RectF::new(Vector2F::zero(), Vector2F::zero()),
            rtl,
            num_user_attrs,
            num_j_levels,
            failure: None,
        }
    }

    pub fn n_slots(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn n_char_info(&self) -> usize {
        self.char_info.len()
    }

    pub fn char_info(&self, index: usize) -> Option<&CharInfo> {
        self.char_info.get(index)
    }

    pub(crate) fn push_char(&mut self, ch: u32, break_weight: i16) {
        self.char_info.push(CharInfo {
            ch,
            break_weight,
            before: 0,
            after: 0,
        });
    }

    pub fn first_slot(&self) -> Option<SlotRef> {
        self.first
    }

    pub fn last_slot(&self) -> Option<SlotRef> {
        self.last
    }

    pub fn next(&self, slot: SlotRef) -> Option<SlotRef> {
        self.entry(slot).and_then(|e| e.next)
    }

    pub fn prev(&self, slot: SlotRef) -> Option<SlotRef> {
        self.entry(slot).and_then(|e| e.prev)
    }

    /// Iterate slots in segment order.
    pub fn slots(&self) -> SlotIter<'_> {
        SlotIter {
            segment: self,
            cursor: self.first,
        }
    }

    pub fn slot(&self, slot: SlotRef) -> Option<&Slot> {
        self.entry(slot).map(|e| &e.slot)
    }

    pub(crate) fn slot_mut(&mut self, slot: SlotRef) -> Option<&mut Slot> {
        self.entry_mut(slot).map(|e| &mut e.slot)
    }

    /// Total advance of the shaped run.
    pub fn advance(&self) -> Vector2F {
        self.advance
    }

    /// Union of positioned glyph bounding boxes.
    pub fn bbox(&self) -> RectF {
        self.bbox
    }

    pub fn rtl(&self) -> bool {
        self.rtl
    }

    pub(crate) fn num_user_attrs(&self) -> u8 {
        self.num_user_attrs
    }

    pub(crate) fn num_j_levels(&self) -> u8 {
        self.num_j_levels
    }

    /// The machine failure recorded by the pass driver, if any.
    pub fn failure(&self) -> Option<MachineStatus> {
        self.failure
    }

    pub(crate) fn record_failure(&mut self, status: MachineStatus) {
        if self.failure.is_none() {
            self.failure = Some(status);
        }
    }

    /// Read a slot attribute through the public attribute-code set.
    pub fn slot_attr(&self, slot: SlotRef, code: AttrCode, subindex: u8) -> i32 {
        self.slot(slot).map_or(0, |s| s.attr(code, subindex))
    }

    fn entry(&self, slot: SlotRef) -> Option<&SlotEntry> {
        let entry = self.entries.get(slot.index as usize)?;
        (entry.alive && entry.generation == slot.generation).then_some(entry)
    }

    fn entry_mut(&mut self, slot: SlotRef) -> Option<&mut SlotEntry> {
        let entry = self.entries.get_mut(slot.index as usize)?;
        (entry.alive && entry.generation == slot.generation).then(|| entry)
    }

    fn allocate(&mut self, slot: Slot) -> Option<SlotRef> {
        if self.len >= MAX_SEG_SLOTS {
            return None;
        }
        self.len += 1;
        match self.free.pop() {
            Some(index) => {
                let entry = &mut self.entries[index as usize];
                entry.alive = true;
                entry.prev = None;
                entry.next = None;
                entry.slot = slot;
                Some(SlotRef {
                    index,
                    generation: entry.generation,
                })
            }
            None => {
                let index = self.entries.len() as u32;
                self.entries.push(SlotEntry {
                    generation: 0,
                    alive: true,
                    prev: None,
                    next: None,
                    slot,
                });
                Some(SlotRef {
                    index,
                    generation: 0,
                })
            }
        }
    }

    pub(crate) fn new_slot(&mut self, glyph: GlyphId, original: usize) -> Slot {
        Slot::new(glyph, original, self.num_user_attrs)
    }

    /// Append a slot at the end of the list. Used when seeding a segment.
    pub(crate) fn push_back(&mut self, slot: Slot) -> Option<SlotRef> {
        let slot_ref = self.allocate(slot)?;
        match self.last {
            Some(last) => {
                self.entries[last.index as usize].next = Some(slot_ref);
                self.entries[slot_ref.index as usize].prev = Some(last);
                self.last = Some(slot_ref);
            }
            None => {
                self.first = Some(slot_ref);
                self.last = Some(slot_ref);
            }
        }
        Some(slot_ref)
    }

    /// Splice a slot into the list ahead of `at`.
    pub(crate) fn insert_before(&mut self, at: SlotRef, slot: Slot) -> Option<SlotRef> {
        self.entry(at)?;
        let slot_ref = self.allocate(slot)?;
        let prev = self.entries[at.index as usize].prev;
        self.entries[slot_ref.index as usize].prev = prev;
        self.entries[slot_ref.index as usize].next = Some(at);
        self.entries[at.index as usize].prev = Some(slot_ref);
        match prev {
            Some(prev) => self.entries[prev.index as usize].next = Some(slot_ref),
            None => self.first = Some(slot_ref),
        }
        Some(slot_ref)
    }

    /// Unlink `slot` and retire it to the free pool.
    ///
    /// Attachment edges into the retired slot are severed. With
    /// `merge_cluster` the slot's span is folded into a surviving neighbour
    /// so every input index keeps a claiming slot; slots the machine itself
    /// created never claimed one and skip the merge.
    pub(crate) fn remove(&mut self, slot: SlotRef, merge_cluster: bool) -> bool {
        let (prev, next, before, after) = match self.entry(slot) {
            Some(entry) => (entry.prev, entry.next, entry.slot.before, entry.slot.after),
            None => return false,
        };

        for entry in self.entries.iter_mut() {
            if entry.alive && entry.slot.attach_to == Some(slot) {
                entry.slot.attach_to = None;
            }
        }

        match prev {
            Some(prev) => self.entries[prev.index as usize].next = next,
            None => self.first = next,
        }
        match next {
            Some(next) => self.entries[next.index as usize].prev = prev,
            None => self.last = prev,
        }

        if merge_cluster {
            if let Some(neighbour) = prev.or(next) {
                let neighbour = &mut self.entries[neighbour.index as usize].slot;
                neighbour.before = neighbour.before.min(before);
                neighbour.after = neighbour.after.max(after);
            }
        }

        let entry = &mut self.entries[slot.index as usize];
        entry.alive = false;
        entry.generation = entry.generation.wrapping_add(1);
        entry.prev = None;
        entry.next = None;
        self.free.push(slot.index);
        self.len -= 1;
        true
    }

    pub(crate) fn set_advance(&mut self, advance: Vector2F) {
        self.advance = advance;
    }

    pub(crate) fn set_bbox(&mut self, bbox: RectF) {
        self.bbox = bbox;
    }

    /// Re-derive each input index's claiming slot positions by replaying
    /// cluster spans in segment order. Called after passes have run.
    pub(crate) fn finalize_char_info(&mut self) {
        let num_chars = self.char_info.len();
        let mut spans: Vec<(usize, usize)> = vec![(usize::MAX, 0); num_chars];
        let mut position = 0;
        let mut cursor = self.first;
        while let Some(slot_ref) = cursor {
            let entry = &self.entries[slot_ref.index as usize];
            let lo = entry.slot.before.min(num_chars.saturating_sub(1));
            let hi = entry.slot.after.min(num_chars.saturating_sub(1));
            for span in spans.iter_mut().take(hi + 1).skip(lo) {
                span.0 = span.0.min(position);
                span.1 = span.1.max(position);
            }
            position += 1;
            cursor = entry.next;
        }
        for (info, (before, after)) in self.char_info.iter_mut().zip(spans) {
            if before != usize::MAX {
                info.before = before;
                info.after = after;
            }
        }
    }
}

pub struct SlotIter<'a> {
    segment: &'a Segment,
    cursor: Option<SlotRef>,
}

impl<'a> Iterator for SlotIter<'a> {
    type Item = (SlotRef, &'a Slot);

    fn next(&mut self) -> Option<Self::Item> {
        let slot_ref = self.cursor?;
        let slot = self.segment.slot(slot_ref)?;
        self.cursor = self.segment.next(slot_ref);
        Some((slot_ref, slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(n: usize) -> (Segment, Vec<SlotRef>) {
        let mut seg = Segment::new(false, 2, 0);
        let mut refs = Vec::new();
        for i in 0..n {
            seg.push_char('a' as u32 + i as u32, 0);
            let slot = seg.new_slot(i as u16 + 1, i);
            refs.push(seg.push_back(slot).unwrap());
        }
        (seg, refs)
    }

    #[test]
    fn traversal_visits_every_slot_once() {
        let (seg, refs) = seeded(4);
        let visited: Vec<_> = seg.slots().map(|(r, _)| r).collect();
        assert_eq!(visited, refs);
        assert_eq!(seg.n_slots(), 4);
        assert_eq!(seg.last_slot(), Some(refs[3]));
        assert_eq!(seg.prev(refs[0]), None);
        assert_eq!(seg.next(refs[3]), None);
    }

    #[test]
    fn insert_before_splices_and_counts() {
        let (mut seg, refs) = seeded(2);
        let slot = seg.new_slot(99, 1);
        let inserted = seg.insert_before(refs[1], slot).unwrap();
        let glyphs: Vec<_> = seg.slots().map(|(_, s)| s.glyph_id()).collect();
        assert_eq!(glyphs, vec![1, 99, 2]);
        assert_eq!(seg.n_slots(), 3);
        assert_eq!(seg.prev(inserted), Some(refs[0]));
    }

    #[test]
    fn remove_retires_and_invalidates_handles() {
        let (mut seg, refs) = seeded(3);
        assert!(seg.remove(refs[1], true));
        assert_eq!(seg.n_slots(), 2);
        assert!(seg.slot(refs[1]).is_none());
        assert!(!seg.remove(refs[1], true));

        // the freed entry is recycled under a new generation
        let slot = seg.new_slot(50, 0);
        let recycled = seg.insert_before(refs[2], slot).unwrap();
        assert_eq!(recycled.index, refs[1].index);
        assert_ne!(recycled.generation, refs[1].generation);
        assert!(seg.slot(refs[1]).is_none());
    }

    #[test]
    fn remove_merges_cluster_into_neighbour() {
        let (mut seg, refs) = seeded(3);
        seg.remove(refs[1], true);
        let prev = seg.slot(refs[0]).unwrap();
        assert_eq!((prev.before(), prev.after()), (0, 1));
    }

    #[test]
    fn remove_severs_attachments() {
        let (mut seg, refs) = seeded(2);
        seg.slot_mut(refs[1]).unwrap().attach_to = Some(refs[0]);
        seg.remove(refs[0], true);
        assert_eq!(seg.slot(refs[1]).unwrap().attached_to(), None);
    }

    #[test]
    fn char_info_spans_cover_every_char() {
        let (mut seg, refs) = seeded(3);
        // collapse chars 1..=2 into the middle slot, then delete the last
        {
            let slot = seg.slot_mut(refs[1]).unwrap();
            slot.after = 2;
        }
        seg.remove(refs[2], true);
        seg.finalize_char_info();
        assert_eq!(
            (seg.char_info(0).unwrap().before, seg.char_info(0).unwrap().after),
            (0, 0)
        );
        assert_eq!(
            (seg.char_info(2).unwrap().before, seg.char_info(2).unwrap().after),
            (1, 1)
        );
    }
}
