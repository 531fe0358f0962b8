//! Final positioning: resolve attachment chains into absolute coordinates
//! and accumulate the segment's advance and bounding box.

use pathfinder_geometry::rect::RectF;
use pathfinder_geometry::vector::Vector2F;
use rustc_hash::FxHashMap;

use crate::font::SizedFont;
use crate::glyphs::GlyphStore;
use crate::segment::Segment;
use crate::slot::SlotRef;
use crate::tables::GlyphSource;

/// Place every slot.
///
/// Roots take the running pen position plus their shift; attached slots sit
/// at `parent origin + parent anchor − own anchor + offsets`. The pen moves
/// by each root's effective advance, reversed for right-to-left segments;
/// the slot traversal order itself is unchanged.
pub(crate) fn position<G: GlyphSource>(
    seg: &mut Segment,
    glyphs: &GlyphStore<G>,
    font: &SizedFont,
) {
    struct Place {
        parent: Option<SlotRef>,
        /// Anchor alignment relative to the parent, font units.
        anchor: Vector2F,
        shift: Vector2F,
        advance: f32,
        glyph: crate::GlyphId,
    }

    let scale = font.scale();
    let rtl = seg.rtl();

    let mut order = Vec::with_capacity(seg.n_slots());
    let mut places: FxHashMap<SlotRef, Place> = FxHashMap::default();
    for (slot_ref, slot) in seg.slots() {
        order.push(slot_ref);
        places.insert(
            slot_ref,
            Place {
                parent: slot.attached_to(),
                anchor: slot.attach + slot.attach_offset - slot.with - slot.with_offset,
                shift: slot.shift,
                advance: slot.advance.x(),
                glyph: slot.glyph_id(),
            },
        );
    }

    // Roots first: they own the pen.
    let mut origins: FxHashMap<SlotRef, Vector2F> = FxHashMap::default();
    let mut pen = 0.0f32;
    for &slot_ref in &order {
        let place = &places[&slot_ref];
        if place.parent.is_some() {
            continue;
        }
        let advance = place.advance * scale;
        if rtl {
            pen -= advance;
        }
        let origin = Vector2F::new(pen, 0.0) + place.shift * scale;
        origins.insert(slot_ref, origin);
        if !rtl {
            pen += advance;
        }
    }

    // Attached slots resolve through their parent chain. The chain is
    // acyclic (the machine refuses cycle-closing edges), so walking up
    // until a placed ancestor terminates.
    for &slot_ref in &order {
        resolve(slot_ref, &places, &mut origins, scale);
    }

    let mut bbox: Option<RectF> = None;
    for &slot_ref in &order {
        let origin = origins.get(&slot_ref).copied().unwrap_or(Vector2F::zero());
        let origin = sanitize(origin);
        if let Some(slot) = seg.slot_mut(slot_ref) {
            slot.origin = origin;
        }
        let glyph_box = glyphs.glyph(places[&slot_ref].glyph).bbox;
        if glyph_box.width() > 0.0 || glyph_box.height() > 0.0 {
            let placed = RectF::new(glyph_box.origin() * scale + origin, glyph_box.size() * scale);
            bbox = Some(match bbox {
                Some(total) => total.union_rect(placed),
                None => placed,
            });
        }
    }

    // Right-to-left runs grow leftwards from 0; shift them back into
    // positive space so the leftmost root starts at the origin.
    let total = if rtl {
        let width = -pen;
        for &slot_ref in &order {
            if let Some(slot) = seg.slot_mut(slot_ref) {
                slot.origin = slot.origin + Vector2F::new(width, 0.0);
            }
        }
        bbox = bbox.map(|b| RectF::new(b.origin() + Vector2F::new(width, 0.0), b.size()));
        width
    } else {
        pen
    };

    seg.set_advance(Vector2F::new(sanitize_scalar(total.max(0.0)), 0.0));
    seg.set_bbox(bbox.unwrap_or_else(|| RectF::new(Vector2F::zero(), Vector2F::zero())));

    fn resolve(
        slot_ref: SlotRef,
        places: &FxHashMap<SlotRef, Place>,
        origins: &mut FxHashMap<SlotRef, Vector2F>,
        scale: f32,
    ) -> Vector2F {
        if let Some(&origin) = origins.get(&slot_ref) {
            return origin;
        }
        let place = &places[&slot_ref];
        let origin = match place.parent {
            Some(parent) if places.contains_key(&parent) => {
                let parent_origin = resolve(parent, places, origins, scale);
                parent_origin + (place.anchor + place.shift) * scale
            }
            // Orphaned edge (parent retired): treat as a zero-placed root.
            _ => place.shift * scale,
        };
        origins.insert(slot_ref, origin);
        origin
    }
}

fn sanitize(v: Vector2F) -> Vector2F {
    Vector2F::new(sanitize_scalar(v.x()), sanitize_scalar(v.y()))
}

/// Coordinates leaving the engine are finite.
fn sanitize_scalar(v: f32) -> f32 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}
