use crate::canvas::buffer::{DirtyRegion, RasterBuffer};
use crate::canvas::geometry::{point_segment_distance_sq, Rect};
use crate::canvas::model::{Color, DocumentPoint, Pen, Stroke};
use crate::canvas::pagination::PageLayout;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

/// Widths below this are stamped along the Bresenham path, wider ones are
/// rasterized as capsules.
const WIDE_STROKE_THRESHOLD: u32 = 10;
const MIN_PRESSURE_FACTOR: f32 = 0.35;
pub const TEMPLATE_SPACING: i32 = 75;

pub const PAPER_COLOR: Color = Color::WHITE;
pub const GAP_COLOR: Color = Color::LIGHT_GRAY;
pub const BORDER_COLOR: Color = Color::GRAY;
const TEMPLATE_COLOR: Color = Color::rgba(190, 190, 190, 255);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Template {
    #[default]
    Blank,
    Lined,
    Dotted,
    Squared,
}

/// Rendered width of a stroke sample. Pressure pens scale between 35% and
/// 100% of `size`; the result never exceeds `size`, which keeps every pixel
/// inside the stroke bounds.
pub fn stroke_width_at(pen: Pen, size: f32, pressure: f32, max_pressure: f32) -> f32 {
    if !pen.follows_pressure() || max_pressure <= 0.0 || !pressure.is_finite() {
        return size;
    }
    let factor = (pressure / max_pressure).clamp(MIN_PRESSURE_FACTOR, 1.0);
    size * factor
}

/// View-space region of the document rectangle `rect` at `scroll`.
pub fn view_region(rect: Rect, scroll: i32) -> DirtyRegion {
    DirtyRegion::from_rect(rect.offset(0, -scroll))
}

fn to_view(point: &DocumentPoint, scroll: i32) -> (i32, i32) {
    (point.x.round() as i32, (point.y - scroll as f32).round() as i32)
}

/// Paints `stroke` into `buffer`, touching only pixels inside `clip`.
pub fn paint_stroke(
    buffer: &mut RasterBuffer,
    stroke: &Stroke,
    scroll: i32,
    clip: DirtyRegion,
    max_pressure: f32,
) {
    let Some(clip) = clip.clamp(buffer.width(), buffer.height()) else {
        return;
    };
    let width_of = |point: &DocumentPoint| {
        let w = stroke_width_at(stroke.pen, stroke.size, point.pressure, max_pressure);
        w.round().max(1.0) as u32
    };

    match stroke.points.as_slice() {
        [] => {}
        [only] => draw_brush(buffer, to_view(only, scroll), stroke.color, width_of(only), clip),
        points => {
            for pair in points.windows(2) {
                let width = width_of(&pair[0]).max(width_of(&pair[1]));
                draw_segment(
                    buffer,
                    to_view(&pair[0], scroll),
                    to_view(&pair[1], scroll),
                    stroke.color,
                    width,
                    clip,
                );
            }
        }
    }
}

fn draw_segment(
    buffer: &mut RasterBuffer,
    start: (i32, i32),
    end: (i32, i32),
    color: Color,
    stroke_width: u32,
    clip: DirtyRegion,
) {
    if stroke_width < WIDE_STROKE_THRESHOLD {
        draw_segment_stamped(buffer, start, end, color, stroke_width, clip);
    } else {
        draw_segment_capsule(buffer, start, end, color, stroke_width, clip);
    }
}

fn draw_segment_stamped(
    buffer: &mut RasterBuffer,
    start: (i32, i32),
    end: (i32, i32),
    color: Color,
    stroke_width: u32,
    clip: DirtyRegion,
) {
    let (mut x0, mut y0) = start;
    let (x1, y1) = end;
    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        draw_brush(buffer, (x0, y0), color, stroke_width, clip);
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

fn draw_segment_capsule(
    buffer: &mut RasterBuffer,
    start: (i32, i32),
    end: (i32, i32),
    color: Color,
    stroke_width: u32,
    clip: DirtyRegion,
) {
    let radius = (stroke_width.saturating_sub(1) / 2) as f32;
    let pad = radius.ceil() as i32 + 1;
    let x0 = start.0.min(end.0) - pad;
    let y0 = start.1.min(end.1) - pad;
    let bounds = DirtyRegion::new(
        x0,
        y0,
        start.0.max(end.0) + pad - x0 + 1,
        start.1.max(end.1) + pad - y0 + 1,
    );
    let Some(area) = bounds.intersect(clip) else {
        return;
    };

    let radius_sq = radius * radius;
    let a = (start.0 as f32, start.1 as f32);
    let b = (end.0 as f32, end.1 as f32);
    for y in area.y..area.bottom() {
        for x in area.x..area.right() {
            let d = point_segment_distance_sq((x as f32, y as f32), a, b);
            if d <= radius_sq {
                buffer.put(x, y, color, clip);
            }
        }
    }
}

#[derive(Clone)]
struct BrushMask {
    rows: Vec<BrushMaskRow>,
}

#[derive(Clone, Copy)]
struct BrushMaskRow {
    dy: i32,
    half_width: i32,
}

fn brush_mask_cache() -> &'static Mutex<HashMap<u32, BrushMask>> {
    static CACHE: OnceLock<Mutex<HashMap<u32, BrushMask>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

fn brush_mask(stroke_width: u32) -> BrushMask {
    let cache = brush_mask_cache();
    if let Ok(guard) = cache.lock() {
        if let Some(mask) = guard.get(&stroke_width) {
            return mask.clone();
        }
    }

    let radius = (stroke_width.saturating_sub(1) / 2) as i32;
    let mut rows = Vec::with_capacity((radius * 2 + 1) as usize);
    for dy in -radius..=radius {
        let mut half_width = radius;
        while half_width >= 0 && half_width * half_width + dy * dy > radius * radius {
            half_width -= 1;
        }
        if half_width >= 0 {
            rows.push(BrushMaskRow { dy, half_width });
        }
    }
    let mask = BrushMask { rows };
    if let Ok(mut guard) = cache.lock() {
        guard.insert(stroke_width, mask.clone());
    }
    mask
}

fn draw_brush(
    buffer: &mut RasterBuffer,
    center: (i32, i32),
    color: Color,
    stroke_width: u32,
    clip: DirtyRegion,
) {
    let mask = brush_mask(stroke_width);
    for row in &mask.rows {
        let y = center.1 + row.dy;
        if y < clip.y || y >= clip.bottom() {
            continue;
        }
        let x0 = (center.0 - row.half_width).max(clip.x);
        let x1 = (center.0 + row.half_width).min(clip.right() - 1);
        for x in x0..=x1 {
            buffer.put(x, y, color, clip);
        }
    }
}

/// Background for the view rows in `clip`: plain paper with the template
/// when unpaginated, otherwise gap fill with every visible page painted on
/// top and outlined.
pub fn paint_background(
    buffer: &mut RasterBuffer,
    layout: &PageLayout,
    template: Template,
    scroll: i32,
    clip: DirtyRegion,
) {
    let Some(clip) = clip.clamp(buffer.width(), buffer.height()) else {
        return;
    };
    if !layout.is_paginated() {
        buffer.fill_region(clip, PAPER_COLOR);
        paint_template(buffer, template, scroll, clip);
        return;
    }

    buffer.fill_region(clip, GAP_COLOR);
    let (first, last) = layout.visible_page_range(scroll + clip.y, scroll + clip.bottom());
    let width = buffer.width() as i32;
    for page in first..=last {
        let top = layout.page_top_for(page) - scroll;
        let page_region = DirtyRegion::new(0, top, width, layout.page_height);
        let Some(visible) = page_region.intersect(clip) else {
            continue;
        };
        buffer.fill_region(visible, PAPER_COLOR);
        paint_template(buffer, template, scroll - layout.page_top_for(page), visible);
        outline(buffer, page_region, BORDER_COLOR, visible);
    }
}

/// Template marks in `area`; `origin` is the template-space y of view row 0.
fn paint_template(buffer: &mut RasterBuffer, template: Template, origin: i32, area: DirtyRegion) {
    let on_grid = |v: i32| v > 0 && v.rem_euclid(TEMPLATE_SPACING) == 0;
    match template {
        Template::Blank => {}
        Template::Lined | Template::Squared => {
            for y in area.y..area.bottom() {
                if on_grid(y + origin) {
                    buffer.fill_region(DirtyRegion::new(area.x, y, area.width, 1), TEMPLATE_COLOR);
                }
            }
            if template == Template::Squared {
                for x in area.x..area.right() {
                    if on_grid(x) {
                        buffer.fill_region(
                            DirtyRegion::new(x, area.y, 1, area.height),
                            TEMPLATE_COLOR,
                        );
                    }
                }
            }
        }
        Template::Dotted => {
            let first_row = (area.y - 1 + origin).div_euclid(TEMPLATE_SPACING);
            let last_row = (area.bottom() + 1 + origin).div_euclid(TEMPLATE_SPACING);
            let last_col = (area.right() + 1).div_euclid(TEMPLATE_SPACING);
            for row in first_row.max(1)..=last_row {
                for col in 1..=last_col {
                    let centre = (col * TEMPLATE_SPACING, row * TEMPLATE_SPACING - origin);
                    draw_brush(buffer, centre, TEMPLATE_COLOR, 3, area);
                }
            }
        }
    }
}

fn outline(buffer: &mut RasterBuffer, rect: DirtyRegion, color: Color, clip: DirtyRegion) {
    let edges = [
        DirtyRegion::new(rect.x, rect.y, rect.width, 1),
        DirtyRegion::new(rect.x, rect.bottom() - 1, rect.width, 1),
        DirtyRegion::new(rect.x, rect.y, 1, rect.height),
        DirtyRegion::new(rect.right() - 1, rect.y, 1, rect.height),
    ];
    for edge in edges {
        if let Some(edge) = edge.intersect(clip) {
            buffer.fill_region(edge, color);
        }
    }
}

/// Blits `source` scaled (nearest neighbour) into the view rectangle `dest`.
pub fn paint_image(
    buffer: &mut RasterBuffer,
    source: &image::RgbaImage,
    dest: DirtyRegion,
    clip: DirtyRegion,
) {
    if dest.is_empty() || source.width() == 0 || source.height() == 0 {
        return;
    }
    let Some(area) = dest
        .intersect(clip)
        .and_then(|area| area.clamp(buffer.width(), buffer.height()))
    else {
        return;
    };
    let (src_w, src_h) = source.dimensions();
    for y in area.y..area.bottom() {
        let sy = (((y - dest.y) as u64 * src_h as u64) / dest.height as u64) as u32;
        for x in area.x..area.right() {
            let sx = (((x - dest.x) as u64 * src_w as u64) / dest.width as u64) as u32;
            let [r, g, b, a] = source.get_pixel(sx.min(src_w - 1), sy.min(src_h - 1)).0;
            if a == 0 {
                continue;
            }
            buffer.put(x, y, Color::rgba(r, g, b, a), area);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::model::PageId;

    fn raster(width: u32, height: u32) -> RasterBuffer {
        RasterBuffer::try_new(width, height, Color::WHITE).expect("raster")
    }

    fn stroke(pen: Pen, size: f32, points: &[(f32, f32)]) -> Stroke {
        let points = points
            .iter()
            .map(|&(x, y)| DocumentPoint {
                x,
                y,
                pressure: 4096.0,
                size,
                ..DocumentPoint::default()
            })
            .collect();
        Stroke::new(PageId::from("page"), pen, Color::BLACK, size, points).expect("stroke")
    }

    fn inked(buffer: &RasterBuffer) -> Vec<(u32, u32)> {
        let mut out = Vec::new();
        for y in 0..buffer.height() {
            for x in 0..buffer.width() {
                if buffer.pixel(x, y) == Color::BLACK {
                    out.push((x, y));
                }
            }
        }
        out
    }

    #[test]
    fn pressure_width_is_bounded_by_size() {
        assert_eq!(stroke_width_at(Pen::Ballpen, 6.0, 10.0, 4096.0), 6.0);
        assert_eq!(stroke_width_at(Pen::Brush, 10.0, 4096.0, 4096.0), 10.0);
        assert_eq!(stroke_width_at(Pen::Brush, 10.0, 9000.0, 4096.0), 10.0);
        assert!((stroke_width_at(Pen::Fountain, 10.0, 0.0, 4096.0) - 3.5).abs() < 1e-6);
    }

    #[test]
    fn stroke_pixels_stay_inside_bounds() {
        for (pen, size) in [(Pen::Ballpen, 3.0), (Pen::Marker, 21.0)] {
            let stroke = stroke(pen, size, &[(30.0, 40.0), (70.0, 55.0), (45.0, 90.0)]);
            let mut buffer = raster(120, 140);
            let clip = buffer.full_region();
            paint_stroke(&mut buffer, &stroke, 0, clip, 4096.0);
            let pixels = inked(&buffer);
            assert!(!pixels.is_empty());
            for (x, y) in pixels {
                assert!(stroke.bounds.contains(x as f32, y as f32), "{pen:?} ({x},{y})");
            }
        }
    }

    #[test]
    fn scroll_moves_stroke_up_in_view() {
        let stroke = stroke(Pen::Ballpen, 1.0, &[(5.0, 105.0)]);
        let mut buffer = raster(10, 10);
        let clip = buffer.full_region();
        paint_stroke(&mut buffer, &stroke, 100, clip, 4096.0);
        assert_eq!(inked(&buffer), vec![(5, 5)]);
    }

    #[test]
    fn stroke_respects_clip() {
        let stroke = stroke(Pen::Ballpen, 5.0, &[(0.0, 10.0), (60.0, 10.0)]);
        let mut buffer = raster(60, 20);
        paint_stroke(&mut buffer, &stroke, 0, DirtyRegion::new(0, 0, 30, 20), 4096.0);
        assert!(inked(&buffer).iter().all(|&(x, _)| x < 30));
    }

    #[test]
    fn paginated_background_fills_gaps_and_outlines_pages() {
        let layout = PageLayout::paginated(50, 10);
        let mut buffer = raster(20, 120);
        let clip = buffer.full_region();
        paint_background(&mut buffer, &layout, Template::Blank, 0, clip);
        assert_eq!(buffer.pixel(5, 0), BORDER_COLOR);
        assert_eq!(buffer.pixel(5, 25), PAPER_COLOR);
        assert_eq!(buffer.pixel(5, 49), BORDER_COLOR);
        assert_eq!(buffer.pixel(5, 55), GAP_COLOR);
        assert_eq!(buffer.pixel(5, 60), BORDER_COLOR);
        assert_eq!(buffer.pixel(5, 115), GAP_COLOR);
    }

    #[test]
    fn lined_template_follows_scroll() {
        let mut buffer = raster(10, 100);
        let clip = buffer.full_region();
        paint_background(&mut buffer, &PageLayout::disabled(), Template::Lined, 50, clip);
        assert_eq!(buffer.pixel(3, 25), TEMPLATE_COLOR);
        assert_eq!(buffer.pixel(3, 24), PAPER_COLOR);
        assert_eq!(buffer.pixel(3, 100 - 1), PAPER_COLOR);
    }

    #[test]
    fn image_is_scaled_nearest_neighbour() {
        let mut source = image::RgbaImage::new(2, 1);
        source.put_pixel(0, 0, image::Rgba([255, 0, 0, 255]));
        source.put_pixel(1, 0, image::Rgba([0, 0, 255, 255]));
        let mut buffer = raster(8, 4);
        let clip = buffer.full_region();
        paint_image(&mut buffer, &source, DirtyRegion::new(0, 0, 8, 4), clip);
        assert_eq!(buffer.pixel(3, 2), Color::RED);
        assert_eq!(buffer.pixel(4, 2), Color::BLUE);
    }
}
