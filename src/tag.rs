//! Utilities and constants for table and feature tags.
//!
//! See also the [`tag!`](../macro.tag.html) macro for creating tags from a
//! byte string.

use crate::error::ParseError;
use std::{fmt, str};

/// Generate a 4-byte tag from a byte string
///
/// Example:
///
/// ```
/// use graft::tag;
/// assert_eq!(tag!(b"Silf"), 0x53696C66);
/// ```
#[macro_export]
macro_rules! tag {
    ($w:expr) => {
        $crate::tag::tag_from_bytes(*$w)
    };
}

/// Wrapper type for a tag that implements `Display`
///
/// ASCII tags render as a string, anything else as hex.
#[derive(PartialEq, Eq, Clone, Copy)]
pub struct DisplayTag(pub u32);

#[doc(hidden)]
pub const fn tag_from_bytes(bytes: [u8; 4]) -> u32 {
    u32::from_be_bytes(bytes)
}

/// Parse a tag from a string of up to four printable ASCII characters,
/// padding with spaces on the right.
pub fn from_string(s: &str) -> Result<u32, ParseError> {
    let bytes = s.as_bytes();
    if bytes.len() > 4 || bytes.iter().any(|b| !b.is_ascii() || b.is_ascii_control()) {
        return Err(ParseError::BadValue);
    }
    let mut tag = [b' '; 4];
    tag[..bytes.len()].copy_from_slice(bytes);
    Ok(u32::from_be_bytes(tag))
}

/// Parse a feature identifier from a string.
///
/// Graphite fonts identify features either by a 4-character tag or by a bare
/// number; both spellings are accepted everywhere a feature is looked up.
pub fn parse_feature_id(s: &str) -> Result<u32, ParseError> {
    match s.parse::<u32>() {
        Ok(n) => Ok(n),
        Err(_) => from_string(s),
    }
}

impl fmt::Display for DisplayTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0.to_be_bytes();
        let printable = bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ');
        match str::from_utf8(&bytes) {
            Ok(s) if printable => s.fmt(f),
            _ => write!(f, "0x{:08x}", self.0),
        }
    }
}

impl fmt::Debug for DisplayTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.to_string().fmt(f)
    }
}

/// `Silf`
pub const SILF: u32 = tag!(b"Silf");
/// `Glat`
pub const GLAT: u32 = tag!(b"Glat");
/// `Gloc`
pub const GLOC: u32 = tag!(b"Gloc");
/// `Feat`
pub const FEAT: u32 = tag!(b"Feat");
/// `Sill`
pub const SILL: u32 = tag!(b"Sill");
/// `cmap`
pub const CMAP: u32 = tag!(b"cmap");
/// `head`
pub const HEAD: u32 = tag!(b"head");
/// `hmtx`
pub const HMTX: u32 = tag!(b"hmtx");
/// `glyf`
pub const GLYF: u32 = tag!(b"glyf");
