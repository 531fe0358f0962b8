//! Builders for synthetic Graphite fonts.
//!
//! Tests assemble table bytes directly rather than shipping font files:
//! each builder mirrors the binary layout the engine parses.

use std::borrow::Cow;
use std::collections::HashMap;

use graft::error::ParseError;
use graft::tables::{FontTableProvider, GlyphSource};
use graft::{tag, GlyphId};
use pathfinder_geometry::rect::RectF;
use pathfinder_geometry::vector::Vector2F;

/// Install the `env_logger` backend so the engine's `log` output (for
/// example the disabled-pass warnings) reaches test output under
/// `RUST_LOG`.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn push_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn push_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

/// One pass's binary image.
#[derive(Default)]
pub struct PassBuilder {
    pub max_rule_loop: u8,
    pub max_backup: u8,
    pub num_rows: u16,
    pub num_transitional: u16,
    pub num_success: u16,
    pub num_columns: u16,
    /// `(first_glyph, last_glyph, column)`
    pub ranges: Vec<(u16, u16, u16)>,
    /// Candidate rule ids per success state.
    pub rule_map: Vec<Vec<u16>>,
    pub start_states: Vec<u16>,
    /// `(sort_key, precontext, constraint, action)` per rule.
    pub rules: Vec<(u16, u8, Vec<u8>, Vec<u8>)>,
    pub pass_constraint: Vec<u8>,
    /// `num_transitional` rows of `num_columns` next states.
    pub transitions: Vec<Vec<u16>>,
}

impl PassBuilder {
    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(0); // flags
        out.push(self.max_rule_loop);
        out.push(self.max_backup);
        push_u16(&mut out, self.rules.len() as u16);
        push_u16(&mut out, self.num_rows);
        push_u16(&mut out, self.num_transitional);
        push_u16(&mut out, self.num_success);
        push_u16(&mut out, self.num_columns);

        push_u16(&mut out, self.ranges.len() as u16);
        for &(first, last, column) in &self.ranges {
            push_u16(&mut out, first);
            push_u16(&mut out, last);
            push_u16(&mut out, column);
        }

        let mut offset = 0u16;
        push_u16(&mut out, offset);
        for rules in &self.rule_map {
            offset += rules.len() as u16;
            push_u16(&mut out, offset);
        }
        for rules in &self.rule_map {
            for &rule in rules {
                push_u16(&mut out, rule);
            }
        }

        out.push(0); // min precontext
        out.push((self.start_states.len() - 1) as u8); // max precontext
        for &state in &self.start_states {
            push_u16(&mut out, state);
        }

        for &(sort_key, _, _, _) in &self.rules {
            push_u16(&mut out, sort_key);
        }
        for &(_, precontext, _, _) in &self.rules {
            out.push(precontext);
        }

        push_u16(&mut out, self.pass_constraint.len() as u16);

        let mut offset = 0u16;
        push_u16(&mut out, offset);
        for (_, _, constraint, _) in &self.rules {
            offset += constraint.len() as u16;
            push_u16(&mut out, offset);
        }
        let mut offset = 0u16;
        push_u16(&mut out, offset);
        for (_, _, _, action) in &self.rules {
            offset += action.len() as u16;
            push_u16(&mut out, offset);
        }

        assert_eq!(self.transitions.len(), usize::from(self.num_transitional));
        for row in &self.transitions {
            assert_eq!(row.len(), usize::from(self.num_columns));
            for &state in row {
                push_u16(&mut out, state);
            }
        }

        out.extend_from_slice(&self.pass_constraint);
        for (_, _, constraint, _) in &self.rules {
            out.extend_from_slice(constraint);
        }
        for (_, _, _, action) in &self.rules {
            out.extend_from_slice(action);
        }
        out
    }
}

/// A whole `Silf` table with a single subtable.
#[derive(Default)]
pub struct SilfBuilder {
    pub rtl: bool,
    pub num_user_attrs: u8,
    pub attr_break_weight: u8,
    pub script_tags: Vec<u32>,
    pub pseudo_map: Vec<(u32, GlyphId)>,
    pub linear_classes: Vec<Vec<GlyphId>>,
    pub lookup_classes: Vec<Vec<(GlyphId, u16)>>,
    pub passes: Vec<Vec<u8>>,
    /// Index of the first positioning pass.
    pub i_pos: u8,
    /// Index of the first justification pass.
    pub i_just: u8,
}

impl SilfBuilder {
    fn class_map(&self) -> Vec<u8> {
        let num_classes = (self.linear_classes.len() + self.lookup_classes.len()) as u16;
        let mut out = Vec::new();
        push_u16(&mut out, num_classes);
        push_u16(&mut out, self.linear_classes.len() as u16);
        let mut offset = 4 + 4 * (u32::from(num_classes) + 1);
        let mut body = Vec::new();
        for class in &self.linear_classes {
            push_u32(&mut out, offset);
            for &glyph in class {
                push_u16(&mut body, glyph);
            }
            offset += 2 * class.len() as u32;
        }
        for class in &self.lookup_classes {
            push_u32(&mut out, offset);
            push_u16(&mut body, class.len() as u16);
            push_u16(&mut body, 0);
            push_u16(&mut body, 0);
            push_u16(&mut body, 0);
            for &(glyph, index) in class {
                push_u16(&mut body, glyph);
                push_u16(&mut body, index);
            }
            offset += 8 + 4 * class.len() as u32;
        }
        push_u32(&mut out, offset);
        out.extend_from_slice(&body);
        out
    }

    fn subtable(&self) -> Vec<u8> {
        let mut out = Vec::new();
        push_u16(&mut out, 0xFFFF); // max glyph
        push_u16(&mut out, 0); // extra ascent
        push_u16(&mut out, 0); // extra descent
        out.push(self.passes.len() as u8);
        out.push(0); // first substitution pass
        out.push(self.i_pos);
        out.push(self.i_just);
        out.push(0xFF); // bidi pass: none
        out.push(if self.rtl { 1 } else { 0 }); // flags
        out.push(0); // max precontext
        out.push(0); // max postcontext
        out.push(0); // attr: pseudo
        out.push(self.attr_break_weight);
        out.push(0); // attr: directionality
        out.push(0); // attr: mirroring
        out.push(0); // attr: skip passes
        out.push(0); // justification levels
        push_u16(&mut out, 0); // ligature components
        out.push(self.num_user_attrs);
        out.push(0); // max components per ligature
        out.push(0); // direction
        out.extend_from_slice(&[0, 0, 0]);
        out.push(0); // critical features
        out.push(0); // reserved
        out.push(self.script_tags.len() as u8);
        for &script in &self.script_tags {
            push_u32(&mut out, script);
        }
        push_u16(&mut out, 0); // line break glyph

        let class_map = self.class_map();
        let fixed_end = out.len()
            + 4 * (self.passes.len() + 1)
            + 8
            + 6 * self.pseudo_map.len()
            + class_map.len();

        let mut pass_offset = fixed_end as u32;
        for pass in &self.passes {
            push_u32(&mut out, pass_offset);
            pass_offset += pass.len() as u32;
        }
        push_u32(&mut out, pass_offset);

        push_u16(&mut out, self.pseudo_map.len() as u16);
        push_u16(&mut out, 0);
        push_u16(&mut out, 0);
        push_u16(&mut out, 0);
        for &(unicode, glyph) in &self.pseudo_map {
            push_u32(&mut out, unicode);
            push_u16(&mut out, glyph);
        }

        out.extend_from_slice(&class_map);
        for pass in &self.passes {
            out.extend_from_slice(pass);
        }
        out
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        push_u32(&mut out, 0x0003_0000); // version 3.0
        push_u32(&mut out, 0); // compiler version
        push_u16(&mut out, 1); // one subtable
        push_u16(&mut out, 0);
        push_u32(&mut out, 16); // subtable offset
        out.extend_from_slice(&self.subtable());
        out
    }
}

/// Minimal `Gloc` for `num_glyphs` glyphs plus the matching empty `Glat`,
/// with optional per-glyph attribute lists.
pub fn glyph_attr_tables(num_glyphs: u16, attrs: &[(GlyphId, Vec<(u8, i16)>)]) -> (Vec<u8>, Vec<u8>) {
    let mut glat = vec![0, 1, 0, 0]; // version 1.0
    let mut offsets = vec![glat.len() as u16; usize::from(num_glyphs) + 1];
    let by_glyph: HashMap<GlyphId, &Vec<(u8, i16)>> =
        attrs.iter().map(|(g, list)| (*g, list)).collect();
    for glyph in 0..num_glyphs {
        offsets[usize::from(glyph)] = glat.len() as u16;
        if let Some(list) = by_glyph.get(&glyph) {
            for &(id, value) in list.iter() {
                glat.push(id);
                glat.push(1);
                glat.extend_from_slice(&value.to_be_bytes());
            }
        }
    }
    offsets[usize::from(num_glyphs)] = glat.len() as u16;

    let mut gloc = Vec::new();
    push_u32(&mut gloc, 0x0001_0000);
    push_u16(&mut gloc, 0); // short offsets
    push_u16(&mut gloc, 64); // declared attribute count
    for offset in offsets {
        push_u16(&mut gloc, offset);
    }
    (gloc, glat)
}

/// A `Feat` table (version 2) from `(id, settings, label)` triples; the
/// first setting is the default.
pub fn feat_table(features: &[(u32, Vec<(i16, u16)>, u16)]) -> Vec<u8> {
    let mut out = vec![0, 2, 0, 0];
    push_u16(&mut out, features.len() as u16);
    out.extend_from_slice(&[0, 0, 0, 0, 0, 0]);
    let mut settings_offset = 12 + 16 * features.len() as u32;
    let mut settings = Vec::new();
    for (id, values, label) in features {
        push_u32(&mut out, *id);
        push_u16(&mut out, values.len() as u16);
        push_u16(&mut out, 0);
        push_u32(&mut out, settings_offset);
        push_u16(&mut out, 0); // flags
        push_u16(&mut out, *label);
        for &(value, label) in values {
            settings.extend_from_slice(&value.to_be_bytes());
            push_u16(&mut settings, label);
            settings_offset += 4;
        }
    }
    out.extend_from_slice(&settings);
    out
}

/// Table provider backed by a map.
pub struct TestProvider {
    tables: HashMap<u32, Vec<u8>>,
}

impl TestProvider {
    pub fn new(silf: Vec<u8>, num_glyphs: u16) -> TestProvider {
        let (gloc, glat) = glyph_attr_tables(num_glyphs, &[]);
        TestProvider::with_tables(silf, gloc, glat)
    }

    pub fn with_tables(silf: Vec<u8>, gloc: Vec<u8>, glat: Vec<u8>) -> TestProvider {
        let mut tables = HashMap::new();
        tables.insert(tag::SILF, silf);
        tables.insert(tag::GLOC, gloc);
        tables.insert(tag::GLAT, glat);
        TestProvider { tables }
    }

    pub fn insert(&mut self, tag: u32, data: Vec<u8>) {
        self.tables.insert(tag, data);
    }
}

impl FontTableProvider for TestProvider {
    fn table_data<'a>(&'a self, tag: u32) -> Result<Option<Cow<'a, [u8]>>, ParseError> {
        Ok(self.tables.get(&tag).map(|data| Cow::from(data.as_slice())))
    }

    fn has_table(&self, tag: u32) -> bool {
        self.tables.contains_key(&tag)
    }
}

/// Outline-side data: per-glyph advances and a char → glyph map.
#[derive(Debug)]
pub struct TestGlyphs {
    pub num_glyphs: u16,
    pub advances: Vec<f32>,
    pub cmap: HashMap<u32, GlyphId>,
}

impl TestGlyphs {
    pub fn new(advances: &[f32], cmap: &[(char, GlyphId)]) -> TestGlyphs {
        TestGlyphs {
            num_glyphs: advances.len() as u16,
            advances: advances.to_vec(),
            cmap: cmap.iter().map(|&(ch, gid)| (ch as u32, gid)).collect(),
        }
    }
}

impl GlyphSource for TestGlyphs {
    fn num_glyphs(&self) -> u16 {
        self.num_glyphs
    }

    fn advance(&self, glyph: GlyphId) -> Vector2F {
        let advance = self.advances.get(usize::from(glyph)).copied().unwrap_or(0.0);
        Vector2F::new(advance, 0.0)
    }

    fn bbox(&self, glyph: GlyphId) -> RectF {
        let advance = self.advances.get(usize::from(glyph)).copied().unwrap_or(0.0);
        RectF::new(Vector2F::new(0.0, 0.0), Vector2F::new(advance, 700.0))
    }

    fn glyph_for_char(&self, ch: u32) -> Option<GlyphId> {
        self.cmap.get(&ch).copied()
    }
}
