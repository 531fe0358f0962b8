#![warn(rust_2018_idioms)]

//! # Graphite font shaping engine
//!
//! Graft shapes text with [Graphite](https://graphite.sil.org/) smart fonts.
//! Graphite moves script-specific shaping logic out of the engine and into
//! the font: the font carries rule programs compiled to byte code, a
//! finite-state machine that finds where they apply, and per-glyph
//! attributes they read. The engine's job is to execute all of that
//! faithfully against a run of text.
//!
//! ## Shaping
//!
//! Build a [`Face`] once from a font's Graphite tables (`Silf`, `Gloc`,
//! `Glat`, `Feat`, `Sill`); the standard outline tables stay with the
//! caller, reached through the [`tables::GlyphSource`] and
//! [`tables::FontTableProvider`] interfaces. Then shape runs of text:
//!
//! ```ignore
//! let face = Face::new(&provider, outlines, FaceOptions::default())?;
//! let features = face.default_features(None);
//! let seg = face.shape(
//!     &SizedFont::new(12.0, 1000)?,
//!     Text::Utf8("text"),
//!     tag!(b"latn"),
//!     &features,
//!     TextDirection::LeftToRight,
//! )?;
//! for (slot_ref, slot) in seg.slots() {
//!     // slot.glyph_id(), slot.origin(), cluster span via slot.before()/after()
//! }
//! ```
//!
//! A [`Segment`] is an ordered sequence of positioned slots: each carries
//! its glyph, cluster span, attachment parent, and the attribute cells rule
//! programs manipulate. Faces are immutable and freely shareable across
//! threads; segments belong to the shaping call that made them.
//!
//! ## What this crate does not do
//!
//! Rasterisation, font-file I/O, Unicode normalisation, and bidirectional
//! reordering are the concern of the embedding application. Shaping honours
//! the font's right-to-left flag but expects text in logical order, one
//! directional run at a time.

pub mod binary;
pub mod code;
pub mod error;
pub mod face;
pub mod features;
pub mod font;
pub mod glyphs;
pub mod machine;
pub mod passes;
mod position;
pub mod segment;
pub mod slot;
pub mod tables;
pub mod tag;
pub mod trace;

pub use face::{Face, FaceOptions};
pub use features::FeatureVal;
pub use font::{SizedFont, Text, TextDirection};
pub use segment::Segment;
pub use slot::{AttrCode, SlotRef};

/// A glyph index within a font.
pub type GlyphId = u16;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
