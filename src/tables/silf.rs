//! Binary reading of the `Silf` table.
//!
//! A `Silf` table carries one or more subtables, each a complete rule system
//! for a script: an ordered pass list, the replacement-class map rule actions
//! substitute through, a pseudo-glyph map consulted before `cmap`, and the
//! per-slot configuration (user-attribute count, justification levels,
//! directionality, break-weight attribute ids).

use crate::binary::read::{ReadBinaryDep, ReadCtxt, ReadScope};
use crate::error::ParseError;
use crate::passes::Pass;
use crate::tables::version_parts;
use crate::GlyphId;

bitflags::bitflags! {
    /// Subtable behaviour flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SilfFlags: u8 {
        /// The script is written right to left.
        const RTL = 0x01;
        /// A dedicated line-break glyph participates in matching.
        const HAS_LINE_BREAK = 0x02;
    }
}

/// What a pass is allowed to touch, by its position in the pass list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    LineBreak,
    Substitution,
    Positioning,
    Justification,
}

/// One justification level's attribute-id assignments.
#[derive(Debug, Clone, Copy)]
pub struct JustLevel {
    pub attr_stretch: u8,
    pub attr_shrink: u8,
    pub attr_step: u8,
    pub attr_weight: u8,
    pub runto: u8,
}

#[derive(Debug, Default)]
pub struct SilfTable {
    pub subtables: Vec<SilfSubtable>,
}

impl<'a> ReadBinaryDep<'a> for SilfTable {
    type Args = ();
    type HostType = SilfTable;

    fn read_dep(ctxt: &mut ReadCtxt<'a>, (): ()) -> Result<SilfTable, ParseError> {
        let table = ctxt.scope();
        let version = ctxt.read_u32be()?;
        let major = version_parts(version).0;
        // 5.x compresses subtables; this engine reads the uncompressed forms.
        ctxt.check_version((2..=4).contains(&major))?;
        if major >= 3 {
            let _compiler_version = ctxt.read_u32be()?;
        }
        let num_sub = ctxt.read_u16be()?;
        let _reserved = ctxt.read_u16be()?;
        let offsets = ctxt.read_u32s(usize::from(num_sub))?;

        let mut subtables = Vec::with_capacity(usize::from(num_sub));
        for offset in offsets {
            let sub = table
                .offset(usize::try_from(offset)?)
                .read::<SilfSubtable>()?;
            subtables.push(sub);
        }

        Ok(SilfTable { subtables })
    }
}

#[derive(Debug)]
pub struct SilfSubtable {
    pub flags: SilfFlags,
    pub max_precontext: u8,
    pub max_postcontext: u8,
    pub attr_pseudo: u8,
    pub attr_break_weight: u8,
    pub attr_directionality: u8,
    pub num_j_levels: u8,
    pub j_levels: Vec<JustLevel>,
    pub num_lig_comp: u16,
    pub num_user_attrs: u8,
    pub max_comp_per_lig: u8,
    pub crit_features: Vec<u16>,
    pub script_tags: Vec<u32>,
    /// Glyph standing in for line-break opportunities during matching.
    pub lb_gid: GlyphId,
    i_subst: u8,
    i_pos: u8,
    i_just: u8,
    pseudo_map: Vec<(u32, GlyphId)>,
    pub classes: ClassMap,
    pub passes: Vec<Pass>,
}

impl SilfSubtable {
    /// Pseudo-glyph lookup, consulted before the font's `cmap`.
    pub fn pseudo_glyph(&self, ch: u32) -> Option<GlyphId> {
        self.pseudo_map
            .binary_search_by_key(&ch, |&(unicode, _)| unicode)
            .ok()
            .map(|i| self.pseudo_map[i].1)
    }

    pub fn pass_kind(&self, index: usize) -> PassKind {
        if index < usize::from(self.i_subst) {
            PassKind::LineBreak
        } else if index < usize::from(self.i_pos) {
            PassKind::Substitution
        } else if index < usize::from(self.i_just) {
            PassKind::Positioning
        } else {
            PassKind::Justification
        }
    }

    pub fn rtl(&self) -> bool {
        self.flags.contains(SilfFlags::RTL)
    }

    /// The passes run when shaping a segment. Justification passes only
    /// run when a segment is justified, which applies per-slot attributes
    /// this engine exposes but does not itself drive.
    pub fn shaping_passes(&self) -> &[Pass] {
        &self.passes[..usize::from(self.i_just).min(self.passes.len())]
    }
}

impl<'a> ReadBinaryDep<'a> for SilfSubtable {
    type Args = ();
    type HostType = SilfSubtable;

    fn read_dep(ctxt: &mut ReadCtxt<'a>, (): ()) -> Result<SilfSubtable, ParseError> {
        let subtable = ctxt.scope();

        let _max_glyph = ctxt.read_u16be()?;
        let _extra_ascent = ctxt.read_i16be()?;
        let _extra_descent = ctxt.read_i16be()?;
        let num_passes = ctxt.read_u8()?;
        let i_subst = ctxt.read_u8()?;
        let i_pos = ctxt.read_u8()?;
        let i_just = ctxt.read_u8()?;
        let _i_bidi = ctxt.read_u8()?;
        let flags = SilfFlags::from_bits_truncate(ctxt.read_u8()?);
        let max_precontext = ctxt.read_u8()?;
        let max_postcontext = ctxt.read_u8()?;
        let attr_pseudo = ctxt.read_u8()?;
        let attr_break_weight = ctxt.read_u8()?;
        let attr_directionality = ctxt.read_u8()?;
        let _attr_mirroring = ctxt.read_u8()?;
        let _attr_skip_passes = ctxt.read_u8()?;

        let num_j_levels = ctxt.read_u8()?;
        let mut j_levels = Vec::with_capacity(usize::from(num_j_levels));
        for _ in 0..num_j_levels {
            j_levels.push(JustLevel {
                attr_stretch: ctxt.read_u8()?,
                attr_shrink: ctxt.read_u8()?,
                attr_step: ctxt.read_u8()?,
                attr_weight: ctxt.read_u8()?,
                runto: ctxt.read_u8()?,
            });
            let _reserved = ctxt.read_slice(3)?;
        }

        let num_lig_comp = ctxt.read_u16be()?;
        let num_user_attrs = ctxt.read_u8()?;
        let max_comp_per_lig = ctxt.read_u8()?;
        let _direction = ctxt.read_u8()?;
        let _reserved = ctxt.read_slice(3)?;

        let num_crit = ctxt.read_u8()?;
        let crit_features = ctxt.read_u16s(usize::from(num_crit))?;
        let _reserved = ctxt.read_u8()?;

        let num_script_tags = ctxt.read_u8()?;
        let script_tags = ctxt.read_u32s(usize::from(num_script_tags))?;
        let lb_gid = ctxt.read_u16be()?;

        let pass_offsets = ctxt.read_offset_array(usize::from(num_passes) + 1, true)?;

        let num_pseudo = ctxt.read_u16be()?;
        let _search_pseudo = ctxt.read_u16be()?;
        let _pseudo_selector = ctxt.read_u16be()?;
        let _pseudo_shift = ctxt.read_u16be()?;
        let mut pseudo_map = Vec::with_capacity(usize::from(num_pseudo));
        for _ in 0..num_pseudo {
            let unicode = ctxt.read_u32be()?;
            let gid = ctxt.read_u16be()?;
            pseudo_map.push((unicode, gid));
        }
        pseudo_map.sort_by_key(|&(unicode, _)| unicode);

        let classes = ctxt.read::<ClassMap>()?;

        let mut passes = Vec::with_capacity(usize::from(num_passes));
        for window in pass_offsets.windows(2) {
            let start = usize::try_from(window[0])?;
            let length = usize::try_from(window[1] - window[0])?;
            let pass = subtable
                .offset_length(start, length)?
                .read::<Pass>()?;
            passes.push(pass);
        }

        if usize::from(i_subst) > passes.len()
            || usize::from(i_pos) > passes.len()
            || usize::from(i_just) > passes.len()
            || i_subst > i_pos
            || i_pos > i_just
        {
            return Err(ParseError::BadValue);
        }

        Ok(SilfSubtable {
            flags,
            max_precontext,
            max_postcontext,
            attr_pseudo,
            attr_break_weight,
            attr_directionality,
            num_j_levels,
            j_levels,
            num_lig_comp,
            num_user_attrs,
            max_comp_per_lig,
            crit_features,
            script_tags,
            lb_gid,
            i_subst,
            i_pos,
            i_just,
            pseudo_map,
            classes,
            passes,
        })
    }
}

/// The replacement-class map.
///
/// Classes below `num_linear` are plain glyph lists indexed by position;
/// the rest are glyph → index lookups searched by glyph id. Rule actions use
/// both directions: find a glyph's index in an input class, then take the
/// glyph at that index in an output class.
#[derive(Debug, Default)]
pub struct ClassMap {
    linear: Vec<Vec<GlyphId>>,
    /// Sorted `(glyph, index)` pairs per lookup class.
    lookup: Vec<Vec<(GlyphId, u16)>>,
}

impl ClassMap {
    pub fn num_classes(&self) -> u16 {
        (self.linear.len() + self.lookup.len()) as u16
    }

    /// The glyph at `index` in `class`.
    pub fn glyph(&self, class: u16, index: u16) -> Option<GlyphId> {
        if let Some(glyphs) = self.linear.get(usize::from(class)) {
            return glyphs.get(usize::from(index)).copied();
        }
        let entries = self.lookup.get(usize::from(class) - self.linear.len())?;
        entries
            .iter()
            .find(|&&(_, i)| i == index)
            .map(|&(glyph, _)| glyph)
    }

    /// The index of `glyph` in `class`, or `None` when absent.
    pub fn index(&self, class: u16, glyph: GlyphId) -> Option<u16> {
        if let Some(glyphs) = self.linear.get(usize::from(class)) {
            return glyphs
                .iter()
                .position(|&g| g == glyph)
                .map(|pos| pos as u16);
        }
        let entries = self.lookup.get(usize::from(class) - self.linear.len())?;
        entries
            .binary_search_by_key(&glyph, |&(g, _)| g)
            .ok()
            .map(|pos| entries[pos].1)
    }
}

impl<'a> ReadBinaryDep<'a> for ClassMap {
    type Args = ();
    type HostType = ClassMap;

    fn read_dep(ctxt: &mut ReadCtxt<'a>, (): ()) -> Result<ClassMap, ParseError> {
        let map = ctxt.scope();
        let num_classes = ctxt.read_u16be()?;
        let num_linear = ctxt.read_u16be()?;
        if num_linear > num_classes {
            return Err(ParseError::BadValue);
        }
        let offsets = ctxt.read_offset_array(usize::from(num_classes) + 1, true)?;

        let class_scope = |i: usize| -> Result<ReadScope<'a>, ParseError> {
            let start = usize::try_from(offsets[i])?;
            let length = usize::try_from(offsets[i + 1] - offsets[i])?;
            map.offset_length(start, length)
        };

        let mut linear = Vec::with_capacity(usize::from(num_linear));
        for i in 0..usize::from(num_linear) {
            let scope = class_scope(i)?;
            let count = scope.data().len() / 2;
            linear.push(scope.ctxt().read_u16s(count)?);
        }

        let mut lookup = Vec::with_capacity(usize::from(num_classes - num_linear));
        for i in usize::from(num_linear)..usize::from(num_classes) {
            let mut entry_ctxt = class_scope(i)?.ctxt();
            let num_ids = entry_ctxt.read_u16be()?;
            let _search_range = entry_ctxt.read_u16be()?;
            let _entry_selector = entry_ctxt.read_u16be()?;
            let _range_shift = entry_ctxt.read_u16be()?;
            let mut entries = Vec::with_capacity(usize::from(num_ids));
            for _ in 0..num_ids {
                let glyph = entry_ctxt.read_u16be()?;
                let index = entry_ctxt.read_u16be()?;
                entries.push((glyph, index));
            }
            entries.sort_by_key(|&(glyph, _)| glyph);
            lookup.push(entries);
        }

        Ok(ClassMap { linear, lookup })
    }
}
