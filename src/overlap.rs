use crate::label::{badge_size, BadgeStyle};
use crate::scene::BoundingBox;

/// Intersections at or below this area are edge contact, not crowding.
const OVERLAP_TOLERANCE: f64 = 1.0;

/// Highlight box plus the badge zone that annotation will add above its
/// top-left corner, in render space.
fn badge_envelope(
    bbox: &BoundingBox,
    reference: &BoundingBox,
    scale: f64,
    style: &BadgeStyle,
) -> BoundingBox {
    let local = bbox.translated(-reference.x, -reference.y).scaled(scale);
    let (badge_w, badge_h) = badge_size("88", style);
    BoundingBox::new(
        local.x,
        local.y - badge_h,
        local.width.max(badge_w),
        local.height + badge_h,
    )
}

/// Would annotating these boxes in one image produce colliding envelopes?
///
/// Used upstream to decide whether a crowded group should be split into
/// single-element renders instead of one combined annotated image. The
/// badge zone is sized for a two-digit numeral, the worst case a batch
/// can produce.
pub fn detect_overlap(
    boxes: &[BoundingBox],
    reference: &BoundingBox,
    scale: f64,
    font_size: f64,
) -> bool {
    if boxes.len() < 2 {
        return false;
    }
    let style = BadgeStyle {
        font_size,
        ..BadgeStyle::default()
    };
    let envelopes: Vec<BoundingBox> = boxes
        .iter()
        .map(|bbox| badge_envelope(bbox, reference, scale, &style))
        .collect();
    for i in 0..envelopes.len() {
        for j in (i + 1)..envelopes.len() {
            if envelopes[i].intersection_area(&envelopes[j]) > OVERLAP_TOLERANCE {
                return true;
            }
        }
    }
    false
}

/// Smallest box containing all of `boxes`; a convenient reference frame
/// when the caller has no explicit crop region.
pub fn union_box(boxes: &[BoundingBox]) -> Option<BoundingBox> {
    let first = boxes.first()?;
    let mut min_x = first.x;
    let mut min_y = first.y;
    let mut max_x = first.x + first.width;
    let mut max_y = first.y + first.height;
    for bbox in &boxes[1..] {
        min_x = min_x.min(bbox.x);
        min_y = min_y.min(bbox.y);
        max_x = max_x.max(bbox.x + bbox.width);
        max_y = max_y.max(bbox.y + bbox.height);
    }
    Some(BoundingBox::new(min_x, min_y, max_x - min_x, max_y - min_y))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fewer_than_two_boxes_never_overlap() {
        let reference = BoundingBox::new(0.0, 0.0, 100.0, 100.0);
        assert!(!detect_overlap(&[], &reference, 1.0, 12.0));
        let one = vec![BoundingBox::new(10.0, 10.0, 20.0, 20.0)];
        assert!(!detect_overlap(&one, &reference, 1.0, 12.0));
    }

    #[test]
    fn far_apart_boxes_do_not_collide() {
        let reference = BoundingBox::new(0.0, 0.0, 1000.0, 1000.0);
        let boxes = vec![
            BoundingBox::new(0.0, 100.0, 50.0, 50.0),
            BoundingBox::new(500.0, 800.0, 50.0, 50.0),
        ];
        assert!(!detect_overlap(&boxes, &reference, 1.0, 12.0));
    }

    #[test]
    fn adjacent_boxes_collide_through_their_badge_zones() {
        // The boxes themselves are disjoint; the badge strip above the
        // second one reaches into the first one's envelope.
        let reference = BoundingBox::new(0.0, 0.0, 200.0, 200.0);
        let boxes = vec![
            BoundingBox::new(10.0, 10.0, 60.0, 30.0),
            BoundingBox::new(15.0, 45.0, 60.0, 30.0),
        ];
        assert!(detect_overlap(&boxes, &reference, 1.0, 12.0));
    }

    #[test]
    fn scale_pushes_envelopes_apart() {
        let reference = BoundingBox::new(0.0, 0.0, 200.0, 200.0);
        let boxes = vec![
            BoundingBox::new(10.0, 40.0, 30.0, 20.0),
            BoundingBox::new(45.0, 40.0, 30.0, 20.0),
        ];
        // At 1x the badge strips collide; blown up 8x they clear each other.
        assert!(detect_overlap(&boxes, &reference, 1.0, 12.0));
        assert!(!detect_overlap(&boxes, &reference, 8.0, 12.0));
    }

    #[test]
    fn union_box_spans_all_inputs() {
        let boxes = vec![
            BoundingBox::new(10.0, 20.0, 30.0, 30.0),
            BoundingBox::new(-5.0, 40.0, 10.0, 10.0),
        ];
        let u = union_box(&boxes).unwrap();
        assert_eq!((u.x, u.y), (-5.0, 20.0));
        assert_eq!((u.width, u.height), (45.0, 30.0));
        assert!(union_box(&[]).is_none());
    }
}
