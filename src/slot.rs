//! The slot: one positionable glyph instance in a segment.

use pathfinder_geometry::vector::Vector2F;
use tinyvec::TinyVec;

use crate::GlyphId;

/// Stable handle to a slot in a segment.
///
/// A handle is an index into the segment's slot arena plus a generation
/// counter; retiring a slot bumps the generation so stale handles held
/// across INSERT/DELETE edits resolve to nothing instead of to a recycled
/// slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotRef {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

/// Slot attributes addressable from rule programs and the read API.
///
/// The discriminants are the attribute selector values used in byte code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrCode {
    AdvanceX = 0,
    AdvanceY = 1,
    AttachTo = 2,
    AttachX = 3,
    AttachY = 4,
    AttachXOffset = 5,
    AttachYOffset = 6,
    AttachWithX = 7,
    AttachWithY = 8,
    AttachWithXOffset = 9,
    AttachWithYOffset = 10,
    AttachLevel = 11,
    BreakWeight = 12,
    ComponentRef = 13,
    Directionality = 14,
    InsertBefore = 15,
    PosX = 16,
    PosY = 17,
    ShiftX = 18,
    ShiftY = 19,
    UserDefnV1 = 20,
    MeasureStartOfLine = 21,
    MeasureEndOfLine = 22,
    JustStretch = 23,
    JustShrink = 24,
    JustStep = 25,
    JustWeight = 26,
    JustWidth = 27,
    /// User-defined attribute, selected by subindex.
    UserDefn = 53,
}

impl AttrCode {
    pub fn from_code(code: u8) -> Option<AttrCode> {
        use AttrCode::*;
        Some(match code {
            0 => AdvanceX,
            1 => AdvanceY,
            2 => AttachTo,
            3 => AttachX,
            4 => AttachY,
            5 => AttachXOffset,
            6 => AttachYOffset,
            7 => AttachWithX,
            8 => AttachWithY,
            9 => AttachWithXOffset,
            10 => AttachWithYOffset,
            11 => AttachLevel,
            12 => BreakWeight,
            13 => ComponentRef,
            14 => Directionality,
            15 => InsertBefore,
            16 => PosX,
            17 => PosY,
            18 => ShiftX,
            19 => ShiftY,
            20 => UserDefnV1,
            21 => MeasureStartOfLine,
            22 => MeasureEndOfLine,
            23 => JustStretch,
            24 => JustShrink,
            25 => JustStep,
            26 => JustWeight,
            27 => JustWidth,
            53 => UserDefn,
            _ => return None,
        })
    }
}

/// Cells per justification level: stretch, shrink, step, weight, width.
pub(crate) const JUST_CELLS: usize = 5;

#[derive(Debug, Clone)]
pub struct Slot {
    pub(crate) glyph: GlyphId,
    /// Index into the original input this slot descends from.
    pub(crate) original: usize,
    /// Inclusive cluster span in input indices.
    pub(crate) before: usize,
    pub(crate) after: usize,
    pub(crate) origin: Vector2F,
    pub(crate) shift: Vector2F,
    pub(crate) advance: Vector2F,
    pub(crate) attach_to: Option<SlotRef>,
    /// Parent anchor point and its extra offset.
    pub(crate) attach: Vector2F,
    pub(crate) attach_offset: Vector2F,
    /// This slot's own anchor point and its extra offset.
    pub(crate) with: Vector2F,
    pub(crate) with_offset: Vector2F,
    pub(crate) attach_level: i16,
    pub(crate) break_weight: i16,
    pub(crate) directionality: i16,
    pub(crate) component_ref: i16,
    pub(crate) insert_before: bool,
    pub(crate) user_attrs: TinyVec<[i16; 8]>,
    /// `JUST_CELLS` values per justification level; empty until written.
    pub(crate) justs: Vec<i16>,
}

impl Slot {
    pub(crate) fn new(glyph: GlyphId, original: usize, num_user_attrs: u8) -> Slot {
        let mut user_attrs = TinyVec::new();
        user_attrs.resize(usize::from(num_user_attrs), 0);
        Slot {
            glyph,
            original,
            before: original,
            after: original,
            origin: Vector2F::zero(),
            shift: Vector2F::zero(),
            advance: Vector2F::zero(),
            attach_to: None,
            attach: Vector2F::zero(),
            attach_offset: Vector2F::zero(),
            with: Vector2F::zero(),
            with_offset: Vector2F::zero(),
            attach_level: 0,
            break_weight: 0,
            directionality: 0,
            component_ref: 0,
            insert_before: true,
            user_attrs,
            justs: Vec::new(),
        }
    }

    pub fn glyph_id(&self) -> GlyphId {
        self.glyph
    }

    pub fn original(&self) -> usize {
        self.original
    }

    pub fn before(&self) -> usize {
        self.before
    }

    pub fn after(&self) -> usize {
        self.after
    }

    pub fn origin(&self) -> Vector2F {
        self.origin
    }

    pub fn attached_to(&self) -> Option<SlotRef> {
        self.attach_to
    }

    pub fn can_insert_before(&self) -> bool {
        self.insert_before
    }

    pub fn user_attr(&self, index: usize) -> i16 {
        self.user_attrs.get(index).copied().unwrap_or(0)
    }

    fn just_cell(&self, level: usize, cell: usize) -> i16 {
        self.justs
            .get(level * JUST_CELLS + cell)
            .copied()
            .unwrap_or(0)
    }

    fn set_just_cell(&mut self, level: usize, cell: usize, value: i16, num_levels: u8) {
        if level >= usize::from(num_levels) {
            return;
        }
        if self.justs.is_empty() {
            self.justs = vec![0; usize::from(num_levels) * JUST_CELLS];
        }
        self.justs[level * JUST_CELLS + cell] = value;
    }

    /// Read an attribute. `subindex` selects the user attribute or
    /// justification level where relevant.
    ///
    /// `AttachTo` reads as whether the slot is attached; the read API
    /// exposes the parent handle itself via [`Slot::attached_to`].
    pub fn attr(&self, code: AttrCode, subindex: u8) -> i32 {
        use AttrCode::*;
        let sub = usize::from(subindex);
        match code {
            AdvanceX => self.advance.x() as i32,
            AdvanceY => self.advance.y() as i32,
            AttachTo => i32::from(self.attach_to.is_some()),
            AttachX => self.attach.x() as i32,
            AttachY => self.attach.y() as i32,
            AttachXOffset => self.attach_offset.x() as i32,
            AttachYOffset => self.attach_offset.y() as i32,
            AttachWithX => self.with.x() as i32,
            AttachWithY => self.with.y() as i32,
            AttachWithXOffset => self.with_offset.x() as i32,
            AttachWithYOffset => self.with_offset.y() as i32,
            AttachLevel => i32::from(self.attach_level),
            BreakWeight => i32::from(self.break_weight),
            ComponentRef => i32::from(self.component_ref),
            Directionality => i32::from(self.directionality),
            InsertBefore => i32::from(self.insert_before),
            PosX => self.origin.x() as i32,
            PosY => self.origin.y() as i32,
            ShiftX => self.shift.x() as i32,
            ShiftY => self.shift.y() as i32,
            UserDefnV1 => i32::from(self.user_attr(0)),
            MeasureStartOfLine | MeasureEndOfLine => 0,
            JustStretch => i32::from(self.just_cell(sub, 0)),
            JustShrink => i32::from(self.just_cell(sub, 1)),
            JustStep => i32::from(self.just_cell(sub, 2)),
            JustWeight => i32::from(self.just_cell(sub, 3)),
            JustWidth => i32::from(self.just_cell(sub, 4)),
            UserDefn => i32::from(self.user_attr(sub)),
        }
    }

    /// Write an attribute.
    ///
    /// `AttachTo` carries a slot reference rather than a number and is set
    /// through the machine; position is derived state and ignores writes,
    /// as do the measurement pseudo-attributes.
    pub(crate) fn set_attr(&mut self, code: AttrCode, subindex: u8, value: i32, num_j_levels: u8) {
        use AttrCode::*;
        let sub = usize::from(subindex);
        let short = value as i16;
        match code {
            AdvanceX => self.advance = Vector2F::new(value as f32, self.advance.y()),
            AdvanceY => self.advance = Vector2F::new(self.advance.x(), value as f32),
            AttachTo | PosX | PosY | MeasureStartOfLine | MeasureEndOfLine => {}
            AttachX => self.attach = Vector2F::new(value as f32, self.attach.y()),
            AttachY => self.attach = Vector2F::new(self.attach.x(), value as f32),
            AttachXOffset => {
                self.attach_offset = Vector2F::new(value as f32, self.attach_offset.y())
            }
            AttachYOffset => {
                self.attach_offset = Vector2F::new(self.attach_offset.x(), value as f32)
            }
            AttachWithX => self.with = Vector2F::new(value as f32, self.with.y()),
            AttachWithY => self.with = Vector2F::new(self.with.x(), value as f32),
            AttachWithXOffset => {
                self.with_offset = Vector2F::new(value as f32, self.with_offset.y())
            }
            AttachWithYOffset => {
                self.with_offset = Vector2F::new(self.with_offset.x(), value as f32)
            }
            AttachLevel => self.attach_level = short,
            BreakWeight => self.break_weight = short,
            ComponentRef => self.component_ref = short,
            Directionality => self.directionality = short,
            InsertBefore => self.insert_before = value != 0,
            ShiftX => self.shift = Vector2F::new(value as f32, self.shift.y()),
            ShiftY => self.shift = Vector2F::new(self.shift.x(), value as f32),
            UserDefnV1 => {
                if !self.user_attrs.is_empty() {
                    self.user_attrs[0] = short;
                }
            }
            JustStretch => self.set_just_cell(sub, 0, short, num_j_levels),
            JustShrink => self.set_just_cell(sub, 1, short, num_j_levels),
            JustStep => self.set_just_cell(sub, 2, short, num_j_levels),
            JustWeight => self.set_just_cell(sub, 3, short, num_j_levels),
            JustWidth => self.set_just_cell(sub, 4, short, num_j_levels),
            UserDefn => {
                if sub < self.user_attrs.len() {
                    self.user_attrs[sub] = short;
                }
            }
        }
    }
}
