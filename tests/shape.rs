//! End-to-end shaping against synthetic Graphite fonts.

mod common;

use common::{feat_table, PassBuilder, SilfBuilder, TestGlyphs, TestProvider};
use graft::code::Opcode;
use graft::error::ParseError;
use graft::slot::AttrCode;
use graft::{tag, Face, FaceOptions, Segment, SizedFont, Text, TextDirection};

fn op(opcode: Opcode) -> u8 {
    opcode as u8
}

/// A two-state matcher accepting the glyph pair `(first, second)`.
fn pair_pass(first: u16, second: u16, action: Vec<u8>, constraint: Vec<u8>) -> PassBuilder {
    PassBuilder {
        max_rule_loop: 8,
        max_backup: 8,
        num_rows: 4,
        num_transitional: 3,
        num_success: 1,
        num_columns: 2,
        ranges: vec![(first, first, 0), (second, second, 1)],
        rule_map: vec![vec![0]],
        start_states: vec![1],
        rules: vec![(2, 0, constraint, action)],
        pass_constraint: Vec::new(),
        transitions: vec![vec![0, 0], vec![2, 0], vec![0, 3]],
    }
}

fn shape(face: &Face<TestGlyphs>, text: &str) -> Segment {
    common::init_logging();
    face.shape(
        &SizedFont::unscaled(),
        Text::Utf8(text),
        tag!(b"latn"),
        &face.default_features(None),
        TextDirection::LeftToRight,
    )
    .expect("shaping failed")
}

/// 'f' + 'i' collapse into the ligature glyph via PUT_GLYPH + DELETE.
fn ligature_face() -> Face<TestGlyphs> {
    let action = vec![
        op(Opcode::PutGlyph),
        0,
        0, // output class 0 = [ligature]
        op(Opcode::Assoc),
        2,
        0,
        1,
        op(Opcode::Next),
        op(Opcode::Delete),
        op(Opcode::PopRet),
    ];
    let silf = SilfBuilder {
        linear_classes: vec![vec![3]],
        passes: vec![pair_pass(1, 2, action, Vec::new()).build()],
        i_pos: 1,
        i_just: 1,
        ..SilfBuilder::default()
    };
    let provider = TestProvider::new(silf.build(), 4);
    let glyphs = TestGlyphs::new(&[600.0, 400.0, 300.0, 650.0], &[('f', 1), ('i', 2)]);
    Face::new(&provider, glyphs, FaceOptions::default()).unwrap()
}

#[test]
fn ligature_collapses_two_chars_into_one_slot() {
    let face = ligature_face();
    let seg = shape(&face, "fi");
    assert_eq!(seg.n_slots(), 1);
    assert_eq!(seg.n_char_info(), 2);

    let (_, slot) = seg.slots().next().unwrap();
    assert_eq!(slot.glyph_id(), 3);
    assert_eq!((slot.before(), slot.after()), (0, 1));

    // both characters point back at the single slot
    for i in 0..2 {
        let info = seg.char_info(i).unwrap();
        assert_eq!((info.before, info.after), (0, 0));
    }
    assert_eq!(seg.advance().x(), 650.0);
    assert_eq!(seg.failure(), None);
}

#[test]
fn ligature_fires_per_pair() {
    let face = ligature_face();
    let seg = shape(&face, "fifi");
    let glyphs: Vec<_> = seg.slots().map(|(_, s)| s.glyph_id()).collect();
    assert_eq!(glyphs, vec![3, 3]);
    assert_eq!(seg.advance().x(), 1300.0);
}

#[test]
fn reversed_pair_is_left_alone() {
    let face = ligature_face();
    let seg = shape(&face, "if");
    let glyphs: Vec<_> = seg.slots().map(|(_, s)| s.glyph_id()).collect();
    assert_eq!(glyphs, vec![2, 1]);
    assert_eq!(seg.advance().x(), 700.0);
}

/// A kerning rule gated on the `kern` feature.
fn kern_face() -> Face<TestGlyphs> {
    let constraint = vec![op(Opcode::PushFeat), 0, 0, op(Opcode::PopRet)];
    let action = vec![
        op(Opcode::PushByte),
        (-50i8) as u8,
        op(Opcode::AttrAdd),
        AttrCode::AdvanceX as u8,
        op(Opcode::PopRet),
    ];
    let silf = SilfBuilder {
        passes: vec![pair_pass(1, 2, action, constraint).build()],
        i_pos: 0,
        i_just: 1,
        ..SilfBuilder::default()
    };
    let mut provider = TestProvider::new(silf.build(), 3);
    provider.insert(
        tag::FEAT,
        feat_table(&[(tag!(b"kern"), vec![(1, 260), (0, 261)], 259)]),
    );
    let glyphs = TestGlyphs::new(&[600.0, 500.0, 500.0], &[('A', 1), ('V', 2)]);
    Face::new(&provider, glyphs, FaceOptions::default()).unwrap()
}

#[test]
fn feature_toggles_kerning() {
    let face = kern_face();
    assert_eq!(face.n_features(), 1);
    assert_eq!(face.feature(0).unwrap().label_id, 259);

    // kern defaults on: the pair closes up
    let kerned = shape(&face, "AV");
    let origins: Vec<_> = kerned.slots().map(|(_, s)| s.origin().x()).collect();
    assert_eq!(origins, vec![0.0, 450.0]);
    assert_eq!(kerned.advance().x(), 950.0);

    // kern off: same glyphs, wider positions
    let mut features = face.default_features(None);
    features
        .set_by_id(face.features(), tag!(b"kern"), 0)
        .unwrap();
    let plain = face
        .shape(
            &SizedFont::unscaled(),
            Text::Utf8("AV"),
            tag!(b"latn"),
            &features,
            TextDirection::LeftToRight,
        )
        .unwrap();
    let kerned_glyphs: Vec<_> = kerned.slots().map(|(_, s)| s.glyph_id()).collect();
    let plain_glyphs: Vec<_> = plain.slots().map(|(_, s)| s.glyph_id()).collect();
    assert_eq!(kerned_glyphs, plain_glyphs);
    let origins: Vec<_> = plain.slots().map(|(_, s)| s.origin().x()).collect();
    assert_eq!(origins, vec![0.0, 500.0]);
    assert_eq!(plain.advance().x(), 1000.0);
}

/// A mark attaches to its base with explicit anchor points.
fn attachment_face() -> Face<TestGlyphs> {
    let action = vec![
        op(Opcode::Next),
        op(Opcode::PushByte),
        0, // window position of the base
        op(Opcode::AttrSetSlot),
        AttrCode::AttachTo as u8,
        op(Opcode::PushShort),
        0x01,
        0x2C, // 300
        op(Opcode::AttrSet),
        AttrCode::AttachX as u8,
        op(Opcode::PushShort),
        0x02,
        0x58, // 600
        op(Opcode::AttrSet),
        AttrCode::AttachY as u8,
        op(Opcode::PushByte),
        10,
        op(Opcode::AttrSet),
        AttrCode::AttachWithX as u8,
        op(Opcode::PushByte),
        20,
        op(Opcode::AttrSet),
        AttrCode::AttachWithY as u8,
        op(Opcode::PopRet),
    ];
    let silf = SilfBuilder {
        passes: vec![pair_pass(4, 5, action, Vec::new()).build()],
        i_pos: 0,
        i_just: 1,
        ..SilfBuilder::default()
    };
    let provider = TestProvider::new(silf.build(), 6);
    let glyphs = TestGlyphs::new(
        &[600.0, 0.0, 0.0, 0.0, 500.0, 0.0],
        &[('b', 4), ('m', 5)],
    );
    Face::new(&provider, glyphs, FaceOptions::default()).unwrap()
}

#[test]
fn marks_position_relative_to_their_base() {
    let face = attachment_face();
    let seg = shape(&face, "bm");
    assert_eq!(seg.n_slots(), 2);

    let slots: Vec<_> = seg.slots().collect();
    let (base_ref, base) = (slots[0].0, slots[0].1);
    let (mark_ref, mark) = (slots[1].0, slots[1].1);

    assert_eq!(mark.attached_to(), Some(base_ref));
    assert_eq!(base.attached_to(), None);
    assert_eq!(seg.slot_attr(mark_ref, AttrCode::AttachTo, 0), 1);

    // mark origin = base origin + parent anchor - own anchor
    assert_eq!(base.origin().x(), 0.0);
    assert_eq!(mark.origin().x(), 290.0);
    assert_eq!(mark.origin().y(), 580.0);

    // attached slots do not advance the pen
    assert_eq!(seg.advance().x(), 500.0);
}

#[test]
fn rule_loop_bound_forces_progress() {
    // A rule that rewrites a glyph to itself and asks to re-match the same
    // position forever; the loop bound must end the pass.
    let action = vec![
        op(Opcode::PutGlyph),
        0,
        0,
        op(Opcode::Next),
        op(Opcode::PushByte),
        (-1i8) as u8,
        op(Opcode::PopRet),
    ];
    let pass = PassBuilder {
        max_rule_loop: 3,
        max_backup: 8,
        num_rows: 3,
        num_transitional: 2,
        num_success: 1,
        num_columns: 1,
        ranges: vec![(1, 1, 0)],
        rule_map: vec![vec![0]],
        start_states: vec![1],
        rules: vec![(1, 0, Vec::new(), action)],
        pass_constraint: Vec::new(),
        transitions: vec![vec![0], vec![2]],
    };
    let silf = SilfBuilder {
        linear_classes: vec![vec![1]],
        passes: vec![pass.build()],
        i_pos: 1,
        i_just: 1,
        ..SilfBuilder::default()
    };
    let provider = TestProvider::new(silf.build(), 2);
    let glyphs = TestGlyphs::new(&[600.0, 500.0], &[('x', 1)]);
    let face = Face::new(&provider, glyphs, FaceOptions::default()).unwrap();

    let seg = shape(&face, "xx");
    let glyphs: Vec<_> = seg.slots().map(|(_, s)| s.glyph_id()).collect();
    assert_eq!(glyphs, vec![1, 1]);
    assert_eq!(seg.failure(), None);
}

#[test]
fn pseudo_glyphs_win_over_cmap() {
    let silf = SilfBuilder {
        pseudo_map: vec![(0x25CC, 3)],
        i_pos: 0,
        i_just: 0,
        ..SilfBuilder::default()
    };
    let provider = TestProvider::new(silf.build(), 4);
    let glyphs = TestGlyphs::new(&[600.0, 500.0, 500.0, 100.0], &[('a', 1)]);
    let face = Face::new(&provider, glyphs, FaceOptions::default()).unwrap();

    let seg = shape(&face, "a\u{25CC}");
    let glyphs: Vec<_> = seg.slots().map(|(_, s)| s.glyph_id()).collect();
    assert_eq!(glyphs, vec![1, 3]);
}

#[test]
fn empty_text_with_real_silf() {
    let face = ligature_face();
    let seg = shape(&face, "");
    assert_eq!(seg.n_slots(), 0);
    assert_eq!(seg.n_char_info(), 0);
    assert_eq!(seg.advance().x(), 0.0);
}

#[test]
fn slot_list_is_well_formed_after_rules() {
    let face = ligature_face();
    let seg = shape(&face, "ifif");
    // traversal from first via next reaches exactly n_slots slots
    let mut count = 0;
    let mut cursor = seg.first_slot();
    let mut last = None;
    while let Some(slot) = cursor {
        count += 1;
        last = Some(slot);
        cursor = seg.next(slot);
        assert!(count <= seg.n_slots());
    }
    assert_eq!(count, seg.n_slots());
    assert_eq!(last, seg.last_slot());

    // every char is claimed by some slot
    for i in 0..seg.n_char_info() {
        let claimed = seg
            .slots()
            .any(|(_, s)| s.before() <= i && i <= s.after());
        assert!(claimed, "char {} unclaimed", i);
    }
}

#[test]
fn broken_rule_program_disables_the_pass_only() {
    common::init_logging();
    // constraint underflows the stack; load rejects it and the pass is
    // disabled, but the face still shapes
    let constraint = vec![op(Opcode::Add), op(Opcode::PopRet)];
    let silf = SilfBuilder {
        linear_classes: vec![vec![3]],
        passes: vec![pair_pass(1, 2, vec![op(Opcode::PopRet)], constraint).build()],
        i_pos: 1,
        i_just: 1,
        ..SilfBuilder::default()
    };
    let provider = TestProvider::new(silf.build(), 4);
    let glyphs = TestGlyphs::new(&[600.0, 400.0, 300.0, 650.0], &[('f', 1), ('i', 2)]);
    let face = Face::new(&provider, glyphs, FaceOptions::default()).unwrap();

    let seg = shape(&face, "fi");
    let glyphs: Vec<_> = seg.slots().map(|(_, s)| s.glyph_id()).collect();
    assert_eq!(glyphs, vec![1, 2]);
}

#[test]
fn truncated_silf_fails_face_construction() {
    let silf = SilfBuilder {
        passes: vec![],
        ..SilfBuilder::default()
    };
    let mut bytes = silf.build();
    bytes.truncate(24);
    let provider = TestProvider::new(bytes, 2);
    let glyphs = TestGlyphs::new(&[600.0, 500.0], &[]);
    let err = Face::new(&provider, glyphs, FaceOptions::default()).unwrap_err();
    assert!(matches!(err, ParseError::BadEof | ParseError::BadOffset));
}

#[test]
fn scaling_applies_at_positioning() {
    let face = ligature_face();
    let seg = face
        .shape(
            &SizedFont::new(100.0, 1000).unwrap(),
            Text::Utf8("if"),
            tag!(b"latn"),
            &face.default_features(None),
            TextDirection::LeftToRight,
        )
        .unwrap();
    let origins: Vec<_> = seg.slots().map(|(_, s)| s.origin().x()).collect();
    assert_eq!(origins, vec![0.0, 30.0]); // 300 units at 100ppem/1000upem
    assert_eq!(seg.advance().x(), 70.0);
}
