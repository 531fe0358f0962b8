//! Per-glyph data: metrics from the outline tables and the sparse
//! Graphite attribute store built from `Gloc`/`Glat`.

use std::sync::OnceLock;

use itertools::Itertools;
use pathfinder_geometry::rect::RectF;
use pathfinder_geometry::vector::Vector2F;

use crate::binary::read::ReadScope;
use crate::error::ParseError;
use crate::tables::glat::{GlatTable, GlocTable};
use crate::tables::GlyphSource;
use crate::GlyphId;

/// Glyph metrics rule programs can query.
///
/// The discriminants are the metric selector values used in byte code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlyphMetric {
    LeftSideBearing = 0,
    RightSideBearing = 1,
    BoundingBoxTop = 2,
    BoundingBoxBottom = 3,
    BoundingBoxLeft = 4,
    BoundingBoxRight = 5,
    BoundingBoxHeight = 6,
    BoundingBoxWidth = 7,
    AdvanceWidth = 8,
    AdvanceHeight = 9,
}

impl GlyphMetric {
    pub fn from_code(code: u8) -> Option<GlyphMetric> {
        match code {
            0 => Some(GlyphMetric::LeftSideBearing),
            1 => Some(GlyphMetric::RightSideBearing),
            2 => Some(GlyphMetric::BoundingBoxTop),
            3 => Some(GlyphMetric::BoundingBoxBottom),
            4 => Some(GlyphMetric::BoundingBoxLeft),
            5 => Some(GlyphMetric::BoundingBoxRight),
            6 => Some(GlyphMetric::BoundingBoxHeight),
            7 => Some(GlyphMetric::BoundingBoxWidth),
            8 => Some(GlyphMetric::AdvanceWidth),
            9 => Some(GlyphMetric::AdvanceHeight),
            _ => None,
        }
    }
}

/// A glyph's outline-derived measurements, in font units.
#[derive(Debug, Clone, Copy)]
pub struct GlyphFace {
    pub advance: Vector2F,
    pub bbox: RectF,
}

impl GlyphFace {
    pub fn metric(&self, metric: GlyphMetric) -> i32 {
        let value = match metric {
            GlyphMetric::LeftSideBearing => self.bbox.min_x(),
            GlyphMetric::RightSideBearing => self.advance.x() - self.bbox.max_x(),
            GlyphMetric::BoundingBoxTop => self.bbox.max_y(),
            GlyphMetric::BoundingBoxBottom => self.bbox.min_y(),
            GlyphMetric::BoundingBoxLeft => self.bbox.min_x(),
            GlyphMetric::BoundingBoxRight => self.bbox.max_x(),
            GlyphMetric::BoundingBoxHeight => self.bbox.height(),
            GlyphMetric::BoundingBoxWidth => self.bbox.width(),
            GlyphMetric::AdvanceWidth => self.advance.x(),
            GlyphMetric::AdvanceHeight => self.advance.y(),
        };
        value as i32
    }
}

/// Sparse per-glyph attribute map.
///
/// Fonts declare hundreds of attribute ids of which a typical glyph carries a
/// handful, so each glyph holds a sorted key array with a parallel value
/// array rather than a dense table.
#[derive(Debug, Clone, Default)]
pub struct GlyphAttrs {
    keys: Box<[u16]>,
    values: Box<[i16]>,
}

impl GlyphAttrs {
    /// Build from decoded `(id, value)` pairs. Later duplicates win.
    pub fn from_pairs(pairs: Vec<(u16, i16)>) -> GlyphAttrs {
        let mut pairs: Vec<_> = pairs
            .into_iter()
            .rev()
            .unique_by(|&(id, _)| id)
            .collect();
        pairs.sort_unstable_by_key(|&(id, _)| id);
        let keys = pairs.iter().map(|&(id, _)| id).collect();
        let values = pairs.iter().map(|&(_, value)| value).collect();
        GlyphAttrs { keys, values }
    }

    /// The value of `attr`, or 0 when the glyph does not carry it.
    pub fn get(&self, attr: u16) -> i16 {
        match self.keys.binary_search(&attr) {
            Ok(i) => self.values[i],
            Err(_) => 0,
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// All per-glyph data a face owns: attributes decoded eagerly (so a
/// malformed font fails at face construction), metrics filled from the
/// outline source lazily or at construction when preloading.
#[derive(Debug)]
pub struct GlyphStore<G> {
    source: G,
    metrics: Vec<OnceLock<GlyphFace>>,
    attrs: Vec<GlyphAttrs>,
    num_attrs: u16,
}

impl<G: GlyphSource> GlyphStore<G> {
    pub fn new(
        source: G,
        gloc: Option<(&GlocTable, ReadScope<'_>)>,
        preload: bool,
    ) -> Result<GlyphStore<G>, ParseError> {
        let num_glyphs = usize::from(source.num_glyphs());
        let mut num_attrs = 0;

        let attrs = match gloc {
            Some((gloc, glat_scope)) => {
                let glat = GlatTable::read(glat_scope)?;
                num_attrs = gloc.num_attrs;
                let mut attrs = Vec::with_capacity(num_glyphs);
                for glyph in 0..num_glyphs {
                    let pairs = match gloc.glyph_range(glyph as u16) {
                        Some((start, end)) => glat.attributes(start, end, gloc.num_attrs)?,
                        None => Vec::new(),
                    };
                    attrs.push(GlyphAttrs::from_pairs(pairs));
                }
                attrs
            }
            None => vec![GlyphAttrs::default(); num_glyphs],
        };

        let metrics = (0..num_glyphs).map(|_| OnceLock::new()).collect();
        let store = GlyphStore {
            source,
            metrics,
            attrs,
            num_attrs,
        };
        if preload {
            for glyph in 0..num_glyphs {
                store.glyph(glyph as u16);
            }
        }
        Ok(store)
    }

    pub fn num_glyphs(&self) -> u16 {
        self.metrics.len() as u16
    }

    pub fn num_attrs(&self) -> u16 {
        self.num_attrs
    }

    /// Metrics for `glyph`; out-of-range ids read as the empty glyph.
    pub fn glyph(&self, glyph: GlyphId) -> GlyphFace {
        match self.metrics.get(usize::from(glyph)) {
            Some(cell) => *cell.get_or_init(|| GlyphFace {
                advance: self.source.advance(glyph),
                bbox: self.source.bbox(glyph),
            }),
            None => GlyphFace {
                advance: Vector2F::zero(),
                bbox: RectF::new(Vector2F::zero(), Vector2F::zero()),
            },
        }
    }

    pub fn attr(&self, glyph: GlyphId, attr: u16) -> i16 {
        self.attrs
            .get(usize::from(glyph))
            .map_or(0, |attrs| attrs.get(attr))
    }

    pub fn glyph_for_char(&self, ch: u32) -> Option<GlyphId> {
        self.source.glyph_for_char(ch)
    }
}
