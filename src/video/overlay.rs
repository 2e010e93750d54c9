use image::Rgb;
use nalgebra::Point2;

use super::Frame;
use crate::data::Region;

pub const COLOR_UI: Rgb<u8> = Rgb([200, 200, 0]);

/// Circle outline of the given radius, `thickness` pixels wide.
pub fn draw_ring(
    frame: &mut Frame,
    center: Point2<i32>,
    radius: i32,
    thickness: i32,
    color: Rgb<u8>,
) {
    let half = thickness as f32 / 2.0;
    let (inner, outer) = (radius as f32 - half, radius as f32 + half);
    let reach = radius + thickness;
    for dy in -reach..=reach {
        for dx in -reach..=reach {
            let d = ((dx * dx + dy * dy) as f32).sqrt();
            if d >= inner && d <= outer {
                let (x, y) = (center.x.saturating_add(dx), center.y.saturating_add(dy));
                frame.put_pixel(x, y, color);
            }
        }
    }
}

/// Inclusive span `from..=to` cut down to `0..len`.
fn visible(from: i32, to: i32, len: u32) -> std::ops::RangeInclusive<i32> {
    let last = i32::try_from(len).unwrap_or(i32::MAX).saturating_sub(1);
    from.max(0)..=to.min(last)
}

/// Rectangle outline growing inward from the region's edges.
pub fn draw_rect(frame: &mut Frame, region: &Region, color: Rgb<u8>, thickness: i32) {
    let (x0, y0) = (region.x, region.y);
    let (x1, y1) = (
        region.x.saturating_add(region.width),
        region.y.saturating_add(region.height),
    );
    let (width, height) = (frame.width(), frame.height());
    for t in 0..thickness {
        for x in visible(x0, x1, width) {
            frame.put_pixel(x, y0.saturating_add(t), color);
            frame.put_pixel(x, y1.saturating_sub(t), color);
        }
        for y in visible(y0, y1, height) {
            frame.put_pixel(x0.saturating_add(t), y, color);
            frame.put_pixel(x1.saturating_sub(t), y, color);
        }
    }
}

pub fn draw_crosshair(frame: &mut Frame, center: Point2<i32>, arm: i32, color: Rgb<u8>) {
    for d in -arm..=arm {
        frame.put_pixel(center.x.saturating_add(d), center.y, color);
        frame.put_pixel(center.x, center.y.saturating_add(d), color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_leaves_center_untouched() {
        let mut frame = Frame::blank(40, 40);
        draw_ring(&mut frame, Point2::new(20, 20), 10, 2, COLOR_UI);
        assert_eq!(frame.pixel(20, 20), Some(Rgb([0, 0, 0])));
        assert_eq!(frame.pixel(30, 20), Some(COLOR_UI));
        assert_eq!(frame.pixel(20, 10), Some(COLOR_UI));
        assert_eq!(frame.pixel(20, 33), Some(Rgb([0, 0, 0])));
    }

    #[test]
    fn test_ring_clips_at_frame_edge() {
        let mut frame = Frame::blank(8, 8);
        draw_ring(&mut frame, Point2::new(0, 0), 5, 2, COLOR_UI);
        assert_eq!(frame.pixel(5, 0), Some(COLOR_UI));
    }

    #[test]
    fn test_rect_outline() {
        let mut frame = Frame::blank(20, 20);
        draw_rect(&mut frame, &Region::new(2, 3, 10, 8), COLOR_UI, 1);
        assert_eq!(frame.pixel(2, 3), Some(COLOR_UI));
        assert_eq!(frame.pixel(12, 11), Some(COLOR_UI));
        assert_eq!(frame.pixel(7, 7), Some(Rgb([0, 0, 0])));
    }

    #[test]
    fn test_huge_region_is_clipped_without_overflow() {
        let mut frame = Frame::blank(20, 20);
        let region = Region::new(5, 5, i32::MAX, i32::MAX);
        draw_rect(&mut frame, &region, COLOR_UI, 2);
        assert_eq!(frame.pixel(5, 5), Some(COLOR_UI));
        assert_eq!(frame.pixel(19, 6), Some(COLOR_UI));
        assert_eq!(frame.pixel(10, 10), Some(Rgb([0, 0, 0])));

        draw_crosshair(&mut frame, Point2::new(i32::MAX, i32::MIN), 3, COLOR_UI);
        draw_rect(&mut frame, &Region::new(i32::MIN, i32::MIN, 4, 4), COLOR_UI, 1);
        assert_eq!(frame.pixel(0, 0), Some(Rgb([0, 0, 0])));
    }

    #[test]
    fn test_crosshair_arms() {
        let mut frame = Frame::blank(20, 20);
        draw_crosshair(&mut frame, Point2::new(10, 10), 3, COLOR_UI);
        assert_eq!(frame.pixel(13, 10), Some(COLOR_UI));
        assert_eq!(frame.pixel(10, 7), Some(COLOR_UI));
        assert_eq!(frame.pixel(14, 10), Some(Rgb([0, 0, 0])));
        assert_eq!(frame.pixel(11, 11), Some(Rgb([0, 0, 0])));
    }
}
