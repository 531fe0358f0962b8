//! Face construction and the shaping entry point.
//!
//! A face is built once from a font's tables and is immutable afterwards:
//! it may be shared across threads freely. Each [`Face::shape`] call owns
//! its segment exclusively.

use std::collections::VecDeque;
use std::sync::Mutex;

use rustc_hash::FxHashMap;

use crate::binary::read::ReadScope;
use crate::error::{ParseError, ShapingError};
use crate::features::{FeatureRegistry, FeatureVal};
use crate::font::{SizedFont, Text, TextDirection};
use crate::glyphs::GlyphStore;
use crate::machine::{Machine, RunContext};
use crate::position;
use crate::segment::{Segment, MAX_SEG_SLOTS};
use crate::tables::feat::{FeatTable, FeatureDefn, SillTable};
use crate::tables::glat::GlocTable;
use crate::tables::silf::{SilfSubtable, SilfTable};
use crate::tables::{FontTableProvider, GlyphSource};
use crate::{tag, trace, GlyphId};

/// Options controlling face construction.
#[derive(Debug, Clone, Copy)]
pub struct FaceOptions {
    /// Materialise every glyph's metrics up front instead of on first use.
    pub preload_glyphs: bool,
    /// Tolerate a font without Graphite tables: shaping degrades to the
    /// plain character-to-glyph mapping with advance positioning.
    pub dumb_rendering: bool,
    /// Shaped segments to retain per face; 0 disables the cache.
    pub segment_cache_capacity: usize,
}

impl Default for FaceOptions {
    fn default() -> FaceOptions {
        FaceOptions {
            preload_glyphs: false,
            dumb_rendering: false,
            segment_cache_capacity: 0,
        }
    }
}

type SegKey = (Vec<u32>, u32, bool, u32, FeatureVal);

/// Bounded cache of shaped segments, evicted oldest-first. The face shares
/// it across threads, so access goes through a mutex.
#[derive(Debug)]
struct SegmentCache {
    capacity: usize,
    map: FxHashMap<SegKey, Segment>,
    order: VecDeque<SegKey>,
}

impl SegmentCache {
    fn new(capacity: usize) -> SegmentCache {
        SegmentCache {
            capacity,
            map: FxHashMap::default(),
            order: VecDeque::new(),
        }
    }

    fn get(&self, key: &SegKey) -> Option<Segment> {
        self.map.get(key).cloned()
    }

    fn insert(&mut self, key: SegKey, segment: Segment) {
        if self.map.contains_key(&key) {
            return;
        }
        while self.map.len() >= self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.map.remove(&oldest);
                }
                None => break,
            }
        }
        self.order.push_back(key.clone());
        self.map.insert(key, segment);
    }
}

/// Compiled, immutable representation of a font's Graphite tables.
#[derive(Debug)]
pub struct Face<G: GlyphSource> {
    glyphs: GlyphStore<G>,
    silf: SilfTable,
    features: FeatureRegistry,
    cache: Option<Mutex<SegmentCache>>,
}

impl<G: GlyphSource> Face<G> {
    /// Build a face from `provider`'s Graphite tables and the outline data
    /// supplied by `source`.
    ///
    /// Errors identify the missing or malformed table; a face is never
    /// constructed from data that failed validation.
    pub fn new(
        provider: &impl FontTableProvider,
        source: G,
        options: FaceOptions,
    ) -> Result<Face<G>, ParseError> {
        let num_glyphs = source.num_glyphs();

        let silf = match provider.table_data(tag::SILF)? {
            Some(data) => ReadScope::new(data.as_ref()).read::<SilfTable>()?,
            None if options.dumb_rendering => SilfTable::default(),
            None => return Err(ParseError::MissingTable(tag::SILF)),
        };

        let glyphs = if silf.subtables.is_empty() {
            GlyphStore::new(source, None, options.preload_glyphs)?
        } else {
            let gloc_data = provider.read_table_data(tag::GLOC)?;
            let gloc = ReadScope::new(gloc_data.as_ref()).read_dep::<GlocTable>(num_glyphs)?;
            let glat_data = provider.read_table_data(tag::GLAT)?;
            let glat_scope = ReadScope::new(glat_data.as_ref());
            GlyphStore::new(source, Some((&gloc, glat_scope)), options.preload_glyphs)?
        };

        let feat = match provider.table_data(tag::FEAT)? {
            Some(data) => ReadScope::new(data.as_ref()).read::<FeatTable>()?,
            None => FeatTable::default(),
        };
        let sill = match provider.table_data(tag::SILL)? {
            Some(data) => ReadScope::new(data.as_ref()).read::<SillTable>()?,
            None => SillTable::default(),
        };
        let features = FeatureRegistry::new(feat, sill);

        let num_passes = silf.subtables.first().map_or(0, |s| s.passes.len());
        trace::face_loaded(num_glyphs, features.len(), num_passes);

        let cache = (options.segment_cache_capacity > 0)
            .then(|| Mutex::new(SegmentCache::new(options.segment_cache_capacity)));

        Ok(Face {
            glyphs,
            silf,
            features,
            cache,
        })
    }

    pub fn num_glyphs(&self) -> u16 {
        self.glyphs.num_glyphs()
    }

    /// Per-glyph Graphite attribute; unknown ids read as 0.
    pub fn glyph_attr(&self, glyph: GlyphId, attr: u16) -> i16 {
        self.glyphs.attr(glyph, attr)
    }

    pub fn n_features(&self) -> usize {
        self.features.len()
    }

    pub fn feature(&self, index: usize) -> Option<&FeatureDefn> {
        self.features.get(index)
    }

    pub fn feature_by_id(&self, id: u32) -> Option<&FeatureDefn> {
        self.features.find_id(id).and_then(|i| self.features.get(i))
    }

    pub fn features(&self) -> &FeatureRegistry {
        &self.features
    }

    /// The default feature values, with `Sill` overrides for `lang`.
    pub fn default_features(&self, lang: Option<u32>) -> FeatureVal {
        self.features.defaults(lang)
    }

    pub fn num_silf_subtables(&self) -> usize {
        self.silf.subtables.len()
    }

    /// The subtable used for `script`: the first one declaring it, falling
    /// back to the first subtable.
    fn select_silf(&self, script: u32) -> Option<&SilfSubtable> {
        self.silf
            .subtables
            .iter()
            .find(|sub| sub.script_tags.contains(&script))
            .or_else(|| self.silf.subtables.first())
    }

    /// Shape a run of text into a segment.
    pub fn shape(
        &self,
        font: &SizedFont,
        text: Text<'_>,
        script: u32,
        features: &FeatureVal,
        direction: TextDirection,
    ) -> Result<Segment, ShapingError> {
        let codepoints = text.to_codepoints();
        let rtl = direction == TextDirection::RightToLeft;

        let key = self.cache.as_ref().map(|_| {
            (
                codepoints.clone(),
                script,
                rtl,
                font.scale().to_bits(),
                features.clone(),
            )
        });
        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            let cache = cache.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(segment) = cache.get(key) {
                return Ok(segment);
            }
        }

        let segment = self.shape_uncached(font, &codepoints, script, features, rtl)?;

        if let (Some(cache), Some(key)) = (&self.cache, key) {
            let mut cache = cache.lock().unwrap_or_else(|e| e.into_inner());
            cache.insert(key, segment.clone());
        }
        Ok(segment)
    }

    fn shape_uncached(
        &self,
        font: &SizedFont,
        codepoints: &[u32],
        script: u32,
        features: &FeatureVal,
        rtl: bool,
    ) -> Result<Segment, ShapingError> {
        if codepoints.len() > MAX_SEG_SLOTS {
            return Err(ParseError::LimitExceeded.into());
        }

        let silf = self.select_silf(script);
        let (num_user_attrs, num_j_levels) = match silf {
            Some(sub) => (sub.num_user_attrs, sub.num_j_levels),
            None => (0, 0),
        };
        let mut seg = Segment::new(rtl, num_user_attrs, num_j_levels);

        for (i, &ch) in codepoints.iter().enumerate() {
            let glyph = silf
                .and_then(|sub| sub.pseudo_glyph(ch))
                .or_else(|| self.glyphs.glyph_for_char(ch))
                .unwrap_or(0);
            let mut slot = seg.new_slot(glyph, i);
            slot.advance = self.glyphs.glyph(glyph).advance;
            let mut break_weight = 0;
            if let Some(sub) = silf {
                if sub.attr_break_weight != 0 {
                    break_weight = self.glyphs.attr(glyph, u16::from(sub.attr_break_weight));
                    slot.break_weight = break_weight;
                }
                if sub.attr_directionality != 0 {
                    slot.directionality =
                        self.glyphs.attr(glyph, u16::from(sub.attr_directionality));
                }
            }
            seg.push_char(ch, break_weight);
            seg.push_back(slot)
                .ok_or(ShapingError::from(ParseError::LimitExceeded))?;
        }

        if let Some(sub) = silf {
            let mut machine = Machine::new();
            let ctx = RunContext {
                glyphs: &self.glyphs,
                classes: &sub.classes,
                features,
            };
            for (index, pass) in sub.shaping_passes().iter().enumerate() {
                trace::pass_start(index, seg.n_slots());
                pass.run(&mut seg, &mut machine, &ctx);
            }
        }

        position::position(&mut seg, &self.glyphs, font);
        seg.finalize_char_info();
        trace::segment_done(seg.n_slots(), seg.advance().x());
        Ok(seg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pathfinder_geometry::rect::RectF;
    use pathfinder_geometry::vector::Vector2F;
    use std::borrow::Cow;

    /// A provider with no tables at all.
    struct Tableless;

    impl FontTableProvider for Tableless {
        fn table_data<'a>(&'a self, _tag: u32) -> Result<Option<Cow<'a, [u8]>>, ParseError> {
            Ok(None)
        }

        fn has_table(&self, _tag: u32) -> bool {
            false
        }
    }

    /// ASCII identity font: glyph id = code point - 0x20 + 1, advance 500.
    #[derive(Debug)]
    struct Ascii;

    impl GlyphSource for Ascii {
        fn num_glyphs(&self) -> u16 {
            100
        }

        fn advance(&self, glyph: GlyphId) -> Vector2F {
            if glyph == 0 {
                Vector2F::new(600.0, 0.0)
            } else {
                Vector2F::new(500.0, 0.0)
            }
        }

        fn bbox(&self, _glyph: GlyphId) -> RectF {
            RectF::new(Vector2F::new(50.0, 0.0), Vector2F::new(400.0, 700.0))
        }

        fn glyph_for_char(&self, ch: u32) -> Option<GlyphId> {
            (0x20..0x7F).contains(&ch).then(|| (ch - 0x20 + 1) as u16)
        }
    }

    fn dumb_face() -> Face<Ascii> {
        let options = FaceOptions {
            dumb_rendering: true,
            ..FaceOptions::default()
        };
        Face::new(&Tableless, Ascii, options).unwrap()
    }

    #[test]
    fn missing_silf_is_fatal_without_dumb_rendering() {
        let err = Face::new(&Tableless, Ascii, FaceOptions::default()).unwrap_err();
        assert_eq!(err, ParseError::MissingTable(tag::SILF));
    }

    #[test]
    fn empty_text_shapes_to_an_empty_segment() {
        let face = dumb_face();
        let seg = face
            .shape(
                &SizedFont::unscaled(),
                Text::Utf8(""),
                0,
                &FeatureVal::default(),
                TextDirection::LeftToRight,
            )
            .unwrap();
        assert_eq!(seg.n_slots(), 0);
        assert_eq!(seg.advance().x(), 0.0);
    }

    #[test]
    fn ascii_identity_shaping() {
        let face = dumb_face();
        let seg = face
            .shape(
                &SizedFont::unscaled(),
                Text::Utf8("AB"),
                0,
                &FeatureVal::default(),
                TextDirection::LeftToRight,
            )
            .unwrap();
        assert_eq!(seg.n_slots(), 2);
        assert_eq!(seg.n_char_info(), 2);
        let slots: Vec<_> = seg.slots().map(|(_, s)| s).collect();
        assert_eq!(slots[0].glyph_id(), ('A' as u16) - 0x20 + 1);
        assert_eq!(slots[1].glyph_id(), ('B' as u16) - 0x20 + 1);
        assert_eq!(slots[0].origin().x(), 0.0);
        assert_eq!(slots[1].origin().x(), 500.0);
        assert_eq!(seg.advance().x(), 1000.0);
    }

    #[test]
    fn unmapped_code_point_uses_notdef() {
        let face = dumb_face();
        let seg = face
            .shape(
                &SizedFont::unscaled(),
                Text::Utf8("\u{0531}"),
                0,
                &FeatureVal::default(),
                TextDirection::LeftToRight,
            )
            .unwrap();
        assert_eq!(seg.n_slots(), 1);
        let (_, slot) = seg.slots().next().unwrap();
        assert_eq!(slot.glyph_id(), 0);
        assert_eq!(seg.advance().x(), 600.0);
    }

    #[test]
    fn shaping_is_deterministic() {
        let face = dumb_face();
        let shape = || {
            face.shape(
                &SizedFont::new(12.0, 1000).unwrap(),
                Text::Utf8("Hello"),
                0,
                &FeatureVal::default(),
                TextDirection::LeftToRight,
            )
            .unwrap()
        };
        let a = shape();
        let b = shape();
        assert_eq!(a.n_slots(), b.n_slots());
        assert_eq!(a.advance().x(), b.advance().x());
        for ((_, sa), (_, sb)) in a.slots().zip(b.slots()) {
            assert_eq!(sa.glyph_id(), sb.glyph_id());
            assert_eq!(sa.origin().x(), sb.origin().x());
        }
    }

    #[test]
    fn rtl_reverses_pen_direction_only() {
        let face = dumb_face();
        let seg = face
            .shape(
                &SizedFont::unscaled(),
                Text::Utf8("AB"),
                0,
                &FeatureVal::default(),
                TextDirection::RightToLeft,
            )
            .unwrap();
        let slots: Vec<_> = seg.slots().map(|(_, s)| s).collect();
        // traversal order unchanged, origins laid right to left
        assert_eq!(slots[0].glyph_id(), ('A' as u16) - 0x20 + 1);
        assert_eq!(slots[0].origin().x(), 500.0);
        assert_eq!(slots[1].origin().x(), 0.0);
        assert_eq!(seg.advance().x(), 1000.0);
    }

    #[test]
    fn segment_cache_returns_equal_output() {
        let options = FaceOptions {
            dumb_rendering: true,
            segment_cache_capacity: 4,
            ..FaceOptions::default()
        };
        let face = Face::new(&Tableless, Ascii, options).unwrap();
        let shape = || {
            face.shape(
                &SizedFont::unscaled(),
                Text::Utf8("cache me"),
                0,
                &FeatureVal::default(),
                TextDirection::LeftToRight,
            )
            .unwrap()
        };
        let first = shape();
        let second = shape();
        assert_eq!(first.n_slots(), second.n_slots());
        assert_eq!(first.advance().x(), second.advance().x());
    }
}
