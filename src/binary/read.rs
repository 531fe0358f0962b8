#![allow(missing_docs)]

//! Bounds-checked reading of Graphite table data.
//!
//! Graphite tables are forests of offset-linked blocks: a `Silf` subtable
//! points at its passes, a pass at its code blocks, `Gloc` at spans of
//! `Glat`. A [`ReadScope`] is a window onto one such block and a
//! [`ReadCtxt`] a cursor over it; following an offset means deriving a
//! smaller scope, and a scope can never be widened. Reads are safe by
//! construction — a malformed font produces a parse error, never an
//! out-of-bounds access — because the bounds checks here are contracts the
//! rest of the engine relies on, not debug assertions.
//!
//! Tables that decode into an owned structure implement [`ReadBinaryDep`];
//! the `Args` hook carries context read from elsewhere, such as the glyph
//! count `Gloc` needs.

use std::fmt;

use crate::error::ParseError;

/// Marker returned when a read runs off the end of its scope.
#[derive(Debug, Copy, Clone)]
pub struct ReadEof {}

/// A bounded window onto table data.
///
/// `base` records the window's position within the enclosing table, which
/// keeps error reporting and derived offsets meaningful after narrowing.
#[derive(Clone, Debug, PartialEq)]
pub struct ReadScope<'a> {
    base: usize,
    data: &'a [u8],
}

/// A cursor over a scope.
#[derive(Clone)]
pub struct ReadCtxt<'a> {
    scope: ReadScope<'a>,
    offset: usize,
}

pub trait ReadBinaryDep<'a> {
    type Args: Clone;
    type HostType: Sized;

    fn read_dep(ctxt: &mut ReadCtxt<'a>, args: Self::Args) -> Result<Self::HostType, ParseError>;
}

impl<'a> ReadScope<'a> {
    pub fn new(data: &'a [u8]) -> ReadScope<'a> {
        ReadScope { base: 0, data }
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Narrow to the window starting at `offset`. Offsets past the end
    /// yield an empty scope; the first read from it reports the error.
    pub fn offset(&self, offset: usize) -> ReadScope<'a> {
        ReadScope {
            base: self.base + offset,
            data: self.data.get(offset..).unwrap_or_default(),
        }
    }

    /// Narrow to exactly `[offset, offset + length)`.
    ///
    /// An offset outside the scope is `BadOffset`; an in-range offset whose
    /// block runs off the end is `BadEof`. Both abort face construction.
    pub fn offset_length(&self, offset: usize, length: usize) -> Result<ReadScope<'a>, ParseError> {
        if length == 0 {
            return Ok(ReadScope {
                base: self.base + offset,
                data: &[],
            });
        }
        if offset >= self.data.len() {
            return Err(ParseError::BadOffset);
        }
        let end = offset.checked_add(length).ok_or(ParseError::BadOffset)?;
        match self.data.get(offset..end) {
            Some(data) => Ok(ReadScope {
                base: self.base + offset,
                data,
            }),
            None => Err(ParseError::BadEof),
        }
    }

    pub fn ctxt(&self) -> ReadCtxt<'a> {
        ReadCtxt {
            scope: self.clone(),
            offset: 0,
        }
    }

    pub fn read<T: ReadBinaryDep<'a, Args = ()>>(&self) -> Result<T::HostType, ParseError> {
        self.ctxt().read::<T>()
    }

    pub fn read_dep<T: ReadBinaryDep<'a>>(&self, args: T::Args) -> Result<T::HostType, ParseError> {
        self.ctxt().read_dep::<T>(args)
    }
}

impl<'a> ReadCtxt<'a> {
    /// The remainder of the data as a fresh scope.
    pub fn scope(&self) -> ReadScope<'a> {
        self.scope.offset(self.offset)
    }

    /// Check a condition, returning `ParseError::BadVersion` if `false`.
    ///
    /// Intended for use in checking versions read from data.
    pub fn check_version(&self, cond: bool) -> Result<(), ParseError> {
        match cond {
            true => Ok(()),
            false => Err(ParseError::BadVersion),
        }
    }

    pub fn bytes_available(&self) -> bool {
        self.offset < self.scope.data.len()
    }

    /// Consume the next `length` bytes.
    fn take(&mut self, length: usize) -> Result<&'a [u8], ReadEof> {
        let end = self.offset.checked_add(length).ok_or(ReadEof {})?;
        let bytes = self.scope.data.get(self.offset..end).ok_or(ReadEof {})?;
        self.offset = end;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8, ReadEof> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16be(&mut self) -> Result<u16, ReadEof> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_i16be(&mut self) -> Result<i16, ReadEof> {
        Ok(self.read_u16be()? as i16)
    }

    pub fn read_u32be(&mut self) -> Result<u32, ReadEof> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read `count` big-endian 16-bit values.
    pub fn read_u16s(&mut self, count: usize) -> Result<Vec<u16>, ReadEof> {
        let length = count.checked_mul(2).ok_or(ReadEof {})?;
        Ok(self
            .take(length)?
            .chunks_exact(2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
            .collect())
    }

    /// Read `count` big-endian 32-bit values.
    pub fn read_u32s(&mut self, count: usize) -> Result<Vec<u32>, ReadEof> {
        let length = count.checked_mul(4).ok_or(ReadEof {})?;
        Ok(self
            .take(length)?
            .chunks_exact(4)
            .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }

    /// Read an offset array in the 16- or 32-bit form the table's flag
    /// word selected.
    ///
    /// `Gloc`, the class map, and the per-pass code-block tables all store
    /// the spans between consecutive offsets, so the array must be
    /// non-decreasing; anything else is `BadOffset`.
    pub fn read_offset_array(&mut self, count: usize, long: bool) -> Result<Vec<u32>, ParseError> {
        let offsets = if long {
            self.read_u32s(count)?
        } else {
            self.read_u16s(count)?.into_iter().map(u32::from).collect()
        };
        if offsets.windows(2).any(|pair| pair[0] > pair[1]) {
            return Err(ParseError::BadOffset);
        }
        Ok(offsets)
    }

    pub fn read_slice(&mut self, length: usize) -> Result<&'a [u8], ReadEof> {
        self.take(length)
    }

    pub fn read<T: ReadBinaryDep<'a, Args = ()>>(&mut self) -> Result<T::HostType, ParseError> {
        T::read_dep(self, ())
    }

    pub fn read_dep<T: ReadBinaryDep<'a>>(
        &mut self,
        args: T::Args,
    ) -> Result<T::HostType, ParseError> {
        T::read_dep(self, args)
    }
}

impl fmt::Debug for ReadCtxt<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadCtxt")
            .field("base", &self.scope.base)
            .field("offset", &self.offset)
            .field("len", &self.scope.data.len())
            .finish()
    }
}
