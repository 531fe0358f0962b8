//! The sized font and the text input forms a segment accepts.

use std::char;

use crate::error::ParseError;

/// The horizontal text layout direction.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum TextDirection {
    LeftToRight,
    RightToLeft,
}

/// A face instantiated at a size.
///
/// All rule arithmetic happens in font design units; the sized font supplies
/// the single scale factor applied when slots are positioned.
#[derive(Debug, Clone, Copy)]
pub struct SizedFont {
    ppem: f32,
    units_per_em: u16,
}

impl SizedFont {
    pub fn new(ppem: f32, units_per_em: u16) -> Result<SizedFont, ParseError> {
        if !(ppem > 0.0) || units_per_em == 0 {
            return Err(ParseError::BadValue);
        }
        Ok(SizedFont {
            ppem,
            units_per_em,
        })
    }

    /// A font whose coordinates stay in design units.
    pub fn unscaled() -> SizedFont {
        SizedFont {
            ppem: 1.0,
            units_per_em: 1,
        }
    }

    pub fn ppem(&self) -> f32 {
        self.ppem
    }

    pub fn scale(&self) -> f32 {
        self.ppem / f32::from(self.units_per_em)
    }
}

/// A run of text in one of the supported encoding forms.
///
/// Ill-formed code units are replaced with U+FFFD rather than reported;
/// shaping never fails on input text.
#[derive(Debug, Clone, Copy)]
pub enum Text<'a> {
    Utf8(&'a str),
    Utf16(&'a [u16]),
    Utf32(&'a [u32]),
}

impl Text<'_> {
    pub(crate) fn to_codepoints(self) -> Vec<u32> {
        match self {
            Text::Utf8(s) => s.chars().map(u32::from).collect(),
            Text::Utf16(units) => char::decode_utf16(units.iter().copied())
                .map(|r| u32::from(r.unwrap_or(char::REPLACEMENT_CHARACTER)))
                .collect(),
            Text::Utf32(units) => units
                .iter()
                .map(|&u| match char::from_u32(u) {
                    Some(ch) => u32::from(ch),
                    None => u32::from(char::REPLACEMENT_CHARACTER),
                })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Text::Utf8(s) => s.is_empty(),
            Text::Utf16(units) => units.is_empty(),
            Text::Utf32(units) => units.is_empty(),
        }
    }
}

impl<'a> From<&'a str> for Text<'a> {
    fn from(s: &'a str) -> Text<'a> {
        Text::Utf8(s)
    }
}
