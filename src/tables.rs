//! Graphite table parsing and the interfaces the engine consumes.
//!
//! The engine reads the Graphite private tables (`Silf`, `Gloc`, `Glat`,
//! `Feat`, `Sill`) itself. The standard outline tables (`cmap`, `head`,
//! `hmtx`, `loca`, `glyf`) are the concern of an external collaborator,
//! reached through [`GlyphSource`].

pub mod feat;
pub mod glat;
pub mod silf;

use std::borrow::Cow;

use pathfinder_geometry::rect::RectF;
use pathfinder_geometry::vector::Vector2F;

use crate::error::ParseError;
use crate::GlyphId;

pub trait FontTableProvider {
    /// Return data for the specified table if present
    fn table_data<'a>(&'a self, tag: u32) -> Result<Option<Cow<'a, [u8]>>, ParseError>;

    fn has_table(&self, tag: u32) -> bool;

    fn read_table_data<'a>(&'a self, tag: u32) -> Result<Cow<'a, [u8]>, ParseError> {
        self.table_data(tag)?.ok_or(ParseError::MissingTable(tag))
    }
}

/// Standard-table data the engine consumes but does not parse.
///
/// Implementations wrap whatever outline-table machinery the embedding
/// application already has. All values are in font design units.
pub trait GlyphSource {
    fn num_glyphs(&self) -> u16;

    /// The glyph's advance vector. `(0, 0)` for glyphs without metrics.
    fn advance(&self, glyph: GlyphId) -> Vector2F;

    /// The glyph's bounding box. An empty rect for glyphs without an outline.
    fn bbox(&self, glyph: GlyphId) -> RectF;

    /// `cmap` lookup. `None` for unmapped code points.
    fn glyph_for_char(&self, ch: u32) -> Option<GlyphId>;
}

impl<T: FontTableProvider> FontTableProvider for Box<T> {
    fn table_data<'a>(&'a self, tag: u32) -> Result<Option<Cow<'a, [u8]>>, ParseError> {
        self.as_ref().table_data(tag)
    }

    fn has_table(&self, tag: u32) -> bool {
        self.as_ref().has_table(tag)
    }
}

/// Split a 16.16 fixed version field into its major and minor halves.
pub(crate) fn version_parts(version: u32) -> (u16, u16) {
    ((version >> 16) as u16, version as u16)
}
