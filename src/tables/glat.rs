//! Binary reading of the `Gloc` and `Glat` tables.
//!
//! `Gloc` holds one offset per glyph into `Glat`; the span between
//! consecutive offsets is that glyph's attribute list. `Glat` attribute
//! lists are runs of consecutively numbered attributes: version 1.x runs
//! carry one-byte id/count headers, 2.x runs two-byte headers.

use crate::binary::read::{ReadBinaryDep, ReadCtxt, ReadScope};
use crate::error::ParseError;
use crate::tables::version_parts;

/// `Gloc` flag: offsets are 32-bit.
const FLAG_LONG_OFFSETS: u16 = 1;

#[derive(Debug)]
pub struct GlocTable {
    /// `num_glyphs + 1` byte offsets into `Glat`, monotonically increasing.
    offsets: Vec<u32>,
    pub num_attrs: u16,
}

impl GlocTable {
    /// The `Glat` byte range holding attributes for `glyph`.
    pub fn glyph_range(&self, glyph: u16) -> Option<(u32, u32)> {
        let start = *self.offsets.get(usize::from(glyph))?;
        let end = *self.offsets.get(usize::from(glyph) + 1)?;
        Some((start, end))
    }

    pub fn num_glyphs(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }
}

impl<'a> ReadBinaryDep<'a> for GlocTable {
    type Args = u16;
    type HostType = GlocTable;

    fn read_dep(ctxt: &mut ReadCtxt<'a>, num_glyphs: u16) -> Result<GlocTable, ParseError> {
        let version = ctxt.read_u32be()?;
        ctxt.check_version(version_parts(version).0 == 1)?;
        let flags = ctxt.read_u16be()?;
        let num_attrs = ctxt.read_u16be()?;

        let count = usize::from(num_glyphs) + 1;
        let offsets = ctxt.read_offset_array(count, flags & FLAG_LONG_OFFSETS != 0)?;
        // An attribute-id array may trail the offsets; it only aids font
        // debuggers and nothing is read after it.

        Ok(GlocTable { offsets, num_attrs })
    }
}

pub struct GlatTable<'a> {
    scope: ReadScope<'a>,
    /// Runs use two-byte headers from version 2.0.
    wide_headers: bool,
}

impl<'a> GlatTable<'a> {
    pub fn read(scope: ReadScope<'a>) -> Result<GlatTable<'a>, ParseError> {
        let version = scope.ctxt().read_u32be()?;
        let major = version_parts(version).0;
        // 3.x adds octabox collision metrics, which this engine does not use.
        if major == 0 || major > 2 {
            return Err(ParseError::BadVersion);
        }
        Ok(GlatTable {
            scope,
            wide_headers: major >= 2,
        })
    }

    /// Decode the attribute runs in `[start, end)` into `(id, value)` pairs.
    ///
    /// Ids at or beyond `num_attrs` are font-compiler debris and truncate
    /// the remainder of the list.
    pub fn attributes(
        &self,
        start: u32,
        end: u32,
        num_attrs: u16,
    ) -> Result<Vec<(u16, i16)>, ParseError> {
        let start = usize::try_from(start)?;
        let end = usize::try_from(end)?;
        let length = end.checked_sub(start).ok_or(ParseError::BadOffset)?;
        let run_scope = self.scope.offset_length(start, length)?;
        let mut ctxt = run_scope.ctxt();

        let mut attrs = Vec::new();
        'runs: while ctxt.bytes_available() {
            let (first_id, count) = if self.wide_headers {
                (ctxt.read_u16be()?, ctxt.read_u16be()?)
            } else {
                (u16::from(ctxt.read_u8()?), u16::from(ctxt.read_u8()?))
            };
            for n in 0..count {
                let id = first_id.checked_add(n).ok_or(ParseError::BadValue)?;
                let value = ctxt.read_i16be()?;
                if id >= num_attrs {
                    break 'runs;
                }
                attrs.push((id, value));
            }
        }
        Ok(attrs)
    }
}
