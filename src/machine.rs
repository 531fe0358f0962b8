//! The stack machine that executes rule programs against a segment.
//!
//! A machine runs one validated [`Code`] program at a time. Its registers
//! are the instruction and data cursors, a bounded operand stack, the
//! current slot cursor `is`, the read-only rule-start index `isb`, and a
//! 64-entry bitmap of map entries the action itself created, used to keep
//! cluster accounting straight when a freshly inserted slot is deleted
//! again. Slot references are positions in a [`SlotMap`]: the window of
//! slots the matcher handed to the rule.

use std::fmt;

use crate::code::{Code, Opcode};
use crate::features::FeatureVal;
use crate::glyphs::{GlyphMetric, GlyphStore};
use crate::segment::Segment;
use crate::slot::{AttrCode, Slot, SlotRef};
use crate::tables::silf::ClassMap;
use crate::tables::GlyphSource;
use crate::GlyphId;

/// Operand stack limit.
pub const STACK_MAX: usize = 1 << 10;

/// Limit on slots visible to one rule match.
pub const MAX_SLOTS: usize = 64;

/// Engine version reported to programs.
const ENGINE_VERSION: i32 = 0x0003_0000;

/// Outcome of running a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineStatus {
    Finished,
    StackUnderflow,
    StackNotEmpty,
    StackOverflow,
    SlotOffsetOutBounds,
}

impl fmt::Display for MachineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachineStatus::Finished => write!(f, "finished"),
            MachineStatus::StackUnderflow => write!(f, "stack underflow"),
            MachineStatus::StackNotEmpty => write!(f, "stack not empty"),
            MachineStatus::StackOverflow => write!(f, "stack overflow"),
            MachineStatus::SlotOffsetOutBounds => write!(f, "slot offset out of bounds"),
        }
    }
}

/// The window of slots a rule match may address.
///
/// Holds up to [`MAX_SLOTS`] references: the precontext slots, then the
/// matched slots, extended in place as the action inserts. Deleted slots
/// leave a hole rather than shifting later positions.
#[derive(Debug, Default)]
pub struct SlotMap {
    entries: Vec<Option<SlotRef>>,
    precontext: usize,
}

impl SlotMap {
    pub fn new() -> SlotMap {
        SlotMap::default()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.precontext = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push(&mut self, slot: SlotRef) -> bool {
        if self.entries.len() >= MAX_SLOTS {
            return false;
        }
        self.entries.push(Some(slot));
        true
    }

    pub fn get(&self, index: usize) -> Option<SlotRef> {
        self.entries.get(index).copied().flatten()
    }

    fn set(&mut self, index: usize, slot: Option<SlotRef>) {
        self.entries[index] = slot;
    }

    fn insert(&mut self, index: usize, slot: SlotRef) -> bool {
        if self.entries.len() >= MAX_SLOTS {
            return false;
        }
        self.entries.insert(index, Some(slot));
        true
    }

    /// Drop matcher look-ahead beyond a fired rule's context.
    pub fn truncate(&mut self, len: usize) {
        self.entries.truncate(len);
    }

    pub fn set_precontext(&mut self, precontext: usize) {
        self.precontext = precontext;
    }

    /// Number of precontext slots at the front of the map.
    pub fn precontext(&self) -> usize {
        self.precontext
    }

    /// The last live slot in the map, if any.
    pub fn last_live(&self) -> Option<SlotRef> {
        self.entries.iter().rev().copied().flatten().next()
    }
}

/// Face-level data the machine reads while executing.
pub(crate) struct RunContext<'a, G> {
    pub glyphs: &'a GlyphStore<G>,
    pub classes: &'a ClassMap,
    pub features: &'a FeatureVal,
}

enum Flow {
    Continue,
    Skip(u8),
    Return(i32),
}

pub struct Machine {
    stack: Vec<i32>,
    status: MachineStatus,
}

impl Default for Machine {
    fn default() -> Self {
        Machine::new()
    }
}

impl Machine {
    pub fn new() -> Machine {
        Machine {
            stack: Vec::with_capacity(64),
            status: MachineStatus::Finished,
        }
    }

    pub fn status(&self) -> MachineStatus {
        self.status
    }

    fn push(&mut self, value: i32) -> Result<(), MachineStatus> {
        if self.stack.len() >= STACK_MAX {
            return Err(MachineStatus::StackOverflow);
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> Result<i32, MachineStatus> {
        self.stack.pop().ok_or(MachineStatus::StackUnderflow)
    }

    /// Run `code` with the slot cursor starting at `*is` and the rule start
    /// at `isb` (both positions in `map`). Returns the program's value;
    /// anything other than a clean exit is reported through
    /// [`Machine::status`].
    pub(crate) fn run<G: GlyphSource>(
        &mut self,
        code: &Code,
        seg: &mut Segment,
        ctx: &RunContext<'_, G>,
        map: &mut SlotMap,
        isb: usize,
        is: &mut usize,
    ) -> i32 {
        self.stack.clear();
        self.status = MachineStatus::Finished;
        let mut copies: u64 = 0;
        let mut ret = 0;

        let trace_opcodes = crate::trace::enabled(crate::trace::TraceMask::OPCODE);

        let mut ip = 0;
        while ip < code.instrs().len() {
            let instr = code.instrs()[ip];
            ip += 1;
            let args = code.args(&instr);
            if trace_opcodes {
                crate::trace::opcode(&format!("{:?}", instr.op));
            }
            match self.step(instr.op, args, seg, ctx, map, isb, is, &mut copies) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Skip(count)) => ip += usize::from(count),
                Ok(Flow::Return(value)) => {
                    ret = value;
                    if !self.stack.is_empty() {
                        self.status = MachineStatus::StackNotEmpty;
                    }
                    return ret;
                }
                Err(status) => {
                    self.status = status;
                    return 0;
                }
            }
        }
        // Reachable only through a skip landing on the end of the program.
        ret
    }

    #[allow(clippy::too_many_arguments)]
    fn step<G: GlyphSource>(
        &mut self,
        op: Opcode,
        args: &[u8],
        seg: &mut Segment,
        ctx: &RunContext<'_, G>,
        map: &mut SlotMap,
        isb: usize,
        is: &mut usize,
        copies: &mut u64,
    ) -> Result<Flow, MachineStatus> {
        use Opcode::*;

        match op {
            Nop => {}
            PushByte => self.push(i32::from(args[0] as i8))?,
            PushByteU => self.push(i32::from(args[0]))?,
            PushShort => self.push(i32::from(i16::from_be_bytes([args[0], args[1]])))?,
            PushShortU => self.push(i32::from(u16::from_be_bytes([args[0], args[1]])))?,
            PushLong => self.push(i32::from_be_bytes([args[0], args[1], args[2], args[3]]))?,

            Add => self.binary(|a, b| a.wrapping_add(b))?,
            Sub => self.binary(|a, b| a.wrapping_sub(b))?,
            Mul => self.binary(|a, b| a.wrapping_mul(b))?,
            Div => self.binary(|a, b| a.checked_div(b).unwrap_or(0))?,
            Min => self.binary(i32::min)?,
            Max => self.binary(i32::max)?,
            And => self.binary(|a, b| i32::from(a != 0 && b != 0))?,
            Or => self.binary(|a, b| i32::from(a != 0 || b != 0))?,
            Equal => self.binary(|a, b| i32::from(a == b))?,
            NotEq => self.binary(|a, b| i32::from(a != b))?,
            Less => self.binary(|a, b| i32::from(a < b))?,
            Gtr => self.binary(|a, b| i32::from(a > b))?,
            LessEq => self.binary(|a, b| i32::from(a <= b))?,
            GtrEq => self.binary(|a, b| i32::from(a >= b))?,
            Neg => {
                let a = self.pop()?;
                self.push(a.wrapping_neg())?;
            }
            Trunc8 => {
                let a = self.pop()?;
                self.push(a & 0xFF)?;
            }
            Trunc16 => {
                let a = self.pop()?;
                self.push(a & 0xFFFF)?;
            }
            Not => {
                let a = self.pop()?;
                self.push(i32::from(a == 0))?;
            }
            Cond => {
                let cond = self.pop()?;
                let otherwise = self.pop()?;
                let then = self.pop()?;
                self.push(if cond != 0 { then } else { otherwise })?;
            }

            Next | CopyNext => {
                // The slot stream is rewritten in place, so passing a slot
                // through to the output is a cursor step for both forms.
                if *is >= map.len() {
                    return Err(MachineStatus::SlotOffsetOutBounds);
                }
                *is += 1;
            }
            Insert => {
                let original = map
                    .get(*is)
                    .or_else(|| map.last_live())
                    .and_then(|sr| seg.slot(sr))
                    .map(|s| (s.original(), s.before(), s.after()));
                let mut slot = seg.new_slot(0, 0);
                if let Some((original, before, after)) = original {
                    slot.original = original;
                    slot.before = before;
                    slot.after = after;
                }
                let inserted = match map.get(*is) {
                    Some(at) => seg.insert_before(at, slot),
                    // At the end of the window: splice ahead of the window's
                    // segment successor, or append when the window ends the
                    // segment.
                    None => match map.last_live().and_then(|sr| seg.next(sr)) {
                        Some(after_window) => seg.insert_before(after_window, slot),
                        None => seg.push_back(slot),
                    },
                };
                let inserted = inserted.ok_or(MachineStatus::SlotOffsetOutBounds)?;
                if *is > map.len() {
                    return Err(MachineStatus::SlotOffsetOutBounds);
                }
                if !map.insert(*is, inserted) {
                    return Err(MachineStatus::SlotOffsetOutBounds);
                }
                mark_inserted(copies, *is);
            }
            Delete => {
                if let Some(slot) = map.get(*is) {
                    let vm_created = is_inserted(*copies, *is);
                    seg.remove(slot, !vm_created);
                    map.set(*is, None);
                    clear_inserted(copies, *is);
                }
            }
            Assoc => {
                let count = usize::from(args[0]);
                let mut before = usize::MAX;
                let mut after = 0;
                let mut original = None;
                for &offset in &args[1..1 + count] {
                    let index = self.slot_index(map, *is, offset as i8)?;
                    if let Some(slot) = map.get(index).and_then(|sr| seg.slot(sr)) {
                        before = before.min(slot.before());
                        after = after.max(slot.after());
                        original.get_or_insert(slot.original());
                    }
                }
                if let Some(slot) = map.get(*is).and_then(|sr| seg.slot_mut(sr)) {
                    if before != usize::MAX {
                        slot.before = before;
                        slot.after = after;
                    }
                    if let Some(original) = original {
                        slot.original = original;
                    }
                }
            }
            CntxtItem => {
                let item = isb as i64 + i64::from(args[0] as i8);
                if item != *is as i64 {
                    return Ok(Flow::Skip(args[1]));
                }
            }

            AttrSet | AttrAdd | AttrSub => {
                let value = self.pop()?;
                if let Some(code) = AttrCode::from_code(args[0]) {
                    self.modify_attr(seg, map, *is, code, 0, value, op)?;
                }
            }
            AttrSetSlot => {
                let target = self.pop()?;
                if AttrCode::from_code(args[0]) == Some(AttrCode::AttachTo) {
                    attach_slot(seg, map, *is, target);
                }
            }
            IAttrSet | IAttrAdd | IAttrSub => {
                let value = self.pop()?;
                if let Some(code) = AttrCode::from_code(args[0]) {
                    let op = match op {
                        IAttrSet => AttrSet,
                        IAttrAdd => AttrAdd,
                        _ => AttrSub,
                    };
                    self.modify_attr(seg, map, *is, code, args[1], value, op)?;
                }
            }
            IAttrSetSlot => {
                let target = self.pop()?;
                if AttrCode::from_code(args[0]) == Some(AttrCode::AttachTo) {
                    attach_slot(seg, map, *is, target);
                }
            }

            PushSlotAttr => {
                let value = match AttrCode::from_code(args[0]) {
                    Some(code) => {
                        let index = self.slot_index(map, *is, args[1] as i8)?;
                        map.get(index)
                            .and_then(|sr| seg.slot(sr))
                            .map_or(0, |s| s.attr(code, 0))
                    }
                    None => 0,
                };
                self.push(value)?;
            }
            PushISlotAttr => {
                let value = match AttrCode::from_code(args[0]) {
                    Some(code) => {
                        let index = self.slot_index(map, *is, args[1] as i8)?;
                        map.get(index)
                            .and_then(|sr| seg.slot(sr))
                            .map_or(0, |s| s.attr(code, args[2]))
                    }
                    None => 0,
                };
                self.push(value)?;
            }
            PushGlyphAttrObs | PushGlyphAttr => {
                let (attr, offset) = if op == PushGlyphAttrObs {
                    (u16::from(args[0]), args[1] as i8)
                } else {
                    (u16::from_be_bytes([args[0], args[1]]), args[2] as i8)
                };
                let index = self.slot_index(map, *is, offset)?;
                let value = map
                    .get(index)
                    .and_then(|sr| seg.slot(sr))
                    .map_or(0, |s| i32::from(ctx.glyphs.attr(s.glyph_id(), attr)));
                self.push(value)?;
            }
            PushGlyphMetric => {
                let index = self.slot_index(map, *is, args[1] as i8)?;
                let value = match (
                    GlyphMetric::from_code(args[0]),
                    map.get(index).and_then(|sr| seg.slot(sr)),
                ) {
                    (Some(metric), Some(slot)) => {
                        ctx.glyphs.glyph(slot.glyph_id()).metric(metric)
                    }
                    _ => 0,
                };
                self.push(value)?;
            }
            PushFeat => {
                let value = ctx.features.get(usize::from(args[0]));
                let _ = self.slot_index(map, *is, args[1] as i8)?;
                self.push(i32::from(value))?;
            }
            PushAttToGattrObs | PushAttToGlyphAttr => {
                let (attr, offset) = if op == PushAttToGattrObs {
                    (u16::from(args[0]), args[1] as i8)
                } else {
                    (u16::from_be_bytes([args[0], args[1]]), args[2] as i8)
                };
                let index = self.slot_index(map, *is, offset)?;
                let value = attached_glyph(seg, map, index)
                    .map_or(0, |glyph| i32::from(ctx.glyphs.attr(glyph, attr)));
                self.push(value)?;
            }
            PushAttToGlyphMetric => {
                let index = self.slot_index(map, *is, args[1] as i8)?;
                let value = match (
                    GlyphMetric::from_code(args[0]),
                    attached_glyph(seg, map, index),
                ) {
                    (Some(metric), Some(glyph)) => ctx.glyphs.glyph(glyph).metric(metric),
                    _ => 0,
                };
                self.push(value)?;
            }
            PushProcState => self.push(1)?,
            PushVersion => self.push(ENGINE_VERSION)?,

            PutGlyph8bitObs | PutGlyph => {
                let class = if op == PutGlyph8bitObs {
                    u16::from(args[0])
                } else {
                    u16::from_be_bytes([args[0], args[1]])
                };
                if let Some(glyph) = ctx.classes.glyph(class, 0) {
                    if let Some(slot) = map.get(*is).and_then(|sr| seg.slot_mut(sr)) {
                        slot.glyph = glyph;
                    }
                }
            }
            PutSubs8bitObs | PutSubs => {
                let (offset, class_in, class_out) = if op == PutSubs8bitObs {
                    (args[0] as i8, u16::from(args[1]), u16::from(args[2]))
                } else {
                    (
                        args[0] as i8,
                        u16::from_be_bytes([args[1], args[2]]),
                        u16::from_be_bytes([args[3], args[4]]),
                    )
                };
                let index = self.slot_index(map, *is, offset)?;
                let source = map.get(index).and_then(|sr| seg.slot(sr)).map(Slot::glyph_id);
                if let Some(glyph) = source
                    .and_then(|g| ctx.classes.index(class_in, g))
                    .and_then(|i| ctx.classes.glyph(class_out, i))
                {
                    if let Some(slot) = map.get(*is).and_then(|sr| seg.slot_mut(sr)) {
                        slot.glyph = glyph;
                    }
                }
            }
            PutCopy => {
                let index = self.slot_index(map, *is, args[0] as i8)?;
                let source = map.get(index).and_then(|sr| seg.slot(sr)).cloned();
                if let (Some(source), Some(current)) = (source, map.get(*is)) {
                    if let Some(slot) = seg.slot_mut(current) {
                        let attach_to = match source.attached_to() {
                            Some(parent) if parent == current => None,
                            other => other,
                        };
                        *slot = Slot {
                            attach_to,
                            ..source
                        };
                    }
                }
            }

            PopRet => {
                let value = self.stack.pop().unwrap_or(0);
                return Ok(Flow::Return(value));
            }

            // Rejected at load time.
            NextN | PushIGlyphAttr | PutSubs2 | PutSubs3 => {}
        }
        Ok(Flow::Continue)
    }

    fn binary(&mut self, f: impl FnOnce(i32, i32) -> i32) -> Result<(), MachineStatus> {
        let b = self.pop()?;
        let a = self.pop()?;
        self.push(f(a, b))
    }

    /// Resolve `is + offset` to a map position, or stop the program.
    fn slot_index(
        &self,
        map: &SlotMap,
        is: usize,
        offset: i8,
    ) -> Result<usize, MachineStatus> {
        let index = is as i64 + i64::from(offset);
        if index < 0 || index >= map.len() as i64 {
            return Err(MachineStatus::SlotOffsetOutBounds);
        }
        Ok(index as usize)
    }

    fn modify_attr(
        &mut self,
        seg: &mut Segment,
        map: &SlotMap,
        is: usize,
        code: AttrCode,
        subindex: u8,
        value: i32,
        op: Opcode,
    ) -> Result<(), MachineStatus> {
        let num_j_levels = seg.num_j_levels();
        if let Some(slot) = map.get(is).and_then(|sr| seg.slot_mut(sr)) {
            let value = match op {
                Opcode::AttrAdd => slot.attr(code, subindex).wrapping_add(value),
                Opcode::AttrSub => slot.attr(code, subindex).wrapping_sub(value),
                _ => value,
            };
            slot.set_attr(code, subindex, value, num_j_levels);
        }
        Ok(())
    }
}

fn mark_inserted(copies: &mut u64, index: usize) {
    if index < MAX_SLOTS {
        *copies |= 1 << index;
    }
}

fn clear_inserted(copies: &mut u64, index: usize) {
    if index < MAX_SLOTS {
        *copies &= !(1 << index);
    }
}

fn is_inserted(copies: u64, index: usize) -> bool {
    index < MAX_SLOTS && copies & (1 << index) != 0
}

/// The glyph of the slot's attachment parent, if it has one.
fn attached_glyph(seg: &Segment, map: &SlotMap, index: usize) -> Option<GlyphId> {
    let slot = map.get(index).and_then(|sr| seg.slot(sr))?;
    let parent = slot.attached_to()?;
    seg.slot(parent).map(Slot::glyph_id)
}

/// Attach the current slot to the slot at map position `target`.
///
/// Out-of-range targets, self-attachment, and edges that would close a
/// cycle are dropped; the attachment relation must remain a forest.
fn attach_slot(seg: &mut Segment, map: &SlotMap, is: usize, target: i32) {
    let current = match map.get(is) {
        Some(slot) => slot,
        None => return,
    };
    let target = match usize::try_from(target).ok().and_then(|t| map.get(t)) {
        Some(slot) if slot != current => slot,
        _ => return,
    };

    let mut ancestor = Some(target);
    while let Some(slot) = ancestor {
        if slot == current {
            return;
        }
        ancestor = seg.slot(slot).and_then(Slot::attached_to);
    }

    if let Some(slot) = seg.slot_mut(current) {
        slot.attach_to = Some(target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::Opcode::*;
    use crate::tables::silf::ClassMap;

    struct NoGlyphs;

    impl GlyphSource for NoGlyphs {
        fn num_glyphs(&self) -> u16 {
            0
        }

        fn advance(&self, _glyph: GlyphId) -> pathfinder_geometry::vector::Vector2F {
            pathfinder_geometry::vector::Vector2F::zero()
        }

        fn bbox(&self, _glyph: GlyphId) -> pathfinder_geometry::rect::RectF {
            pathfinder_geometry::rect::RectF::new(
                pathfinder_geometry::vector::Vector2F::zero(),
                pathfinder_geometry::vector::Vector2F::zero(),
            )
        }

        fn glyph_for_char(&self, _ch: u32) -> Option<GlyphId> {
            None
        }
    }

    fn run_program(bytes: &[u8]) -> (i32, MachineStatus) {
        let code = Code::new(true, bytes).expect("program should load");
        let glyphs = GlyphStore::new(NoGlyphs, None, false).unwrap();
        let classes = ClassMap::default();
        let features = FeatureVal::default();
        let ctx = RunContext {
            glyphs: &glyphs,
            classes: &classes,
            features: &features,
        };
        let mut seg = Segment::new(false, 0, 0);
        let mut map = SlotMap::new();
        let mut machine = Machine::new();
        let mut is = 0;
        let ret = machine.run(&code, &mut seg, &ctx, &mut map, 0, &mut is);
        (ret, machine.status())
    }

    #[test]
    fn arithmetic_smoke_test() {
        let prog = [
            PushByte as u8,
            43,
            PushByte as u8,
            42,
            PushByte as u8,
            11,
            PushByte as u8,
            13,
            Add as u8,
            PushByte as u8,
            4,
            Sub as u8,
            Cond as u8,
            PopRet as u8,
        ];
        assert_eq!(run_program(&prog), (43, MachineStatus::Finished));
    }

    #[test]
    fn pop_ret_on_empty_stack_returns_zero() {
        assert_eq!(run_program(&[PopRet as u8]), (0, MachineStatus::Finished));
    }

    #[test]
    fn leftover_operands_report_stack_not_empty() {
        let prog = [
            PushByte as u8,
            1,
            PushByte as u8,
            2,
            PopRet as u8,
        ];
        assert_eq!(run_program(&prog), (2, MachineStatus::StackNotEmpty));
    }

    #[test]
    fn division_by_zero_yields_zero() {
        let prog = [
            PushByte as u8,
            10,
            PushByte as u8,
            0,
            Div as u8,
            PopRet as u8,
        ];
        assert_eq!(run_program(&prog), (0, MachineStatus::Finished));
    }

    #[test]
    fn cursor_past_map_end_stops_the_program() {
        let code = Code::new(false, &[Next as u8, PopRet as u8]).unwrap();
        let glyphs = GlyphStore::new(NoGlyphs, None, false).unwrap();
        let classes = ClassMap::default();
        let features = FeatureVal::default();
        let ctx = RunContext {
            glyphs: &glyphs,
            classes: &classes,
            features: &features,
        };
        let mut seg = Segment::new(false, 0, 0);
        let mut map = SlotMap::new();
        let mut machine = Machine::new();
        let mut is = 0;
        machine.run(&code, &mut seg, &ctx, &mut map, 0, &mut is);
        assert_eq!(machine.status(), MachineStatus::SlotOffsetOutBounds);
    }
}
