use crate::canvas::model::{DocumentPoint, RawSample};

pub const DEFAULT_MIN_ZOOM: f32 = 0.5;
pub const DEFAULT_MAX_ZOOM: f32 = 2.0;

/// Visible window onto the document.
///
/// `zoom` is a magnification factor around the view centre (1.0 = 100%).
/// `scroll` is the document y shown at the top edge of the view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub scroll: i32,
    pub zoom: f32,
    pub pan_x: f32,
    pub pan_y: f32,
    pub view_width: i32,
    pub view_height: i32,
    pub min_zoom: f32,
    pub max_zoom: f32,
}

impl Viewport {
    pub fn new(view_width: i32, view_height: i32) -> Self {
        Self {
            scroll: 0,
            zoom: 1.0,
            pan_x: 0.0,
            pan_y: 0.0,
            view_width,
            view_height,
            min_zoom: DEFAULT_MIN_ZOOM,
            max_zoom: DEFAULT_MAX_ZOOM,
        }
    }

    pub fn with_zoom_limits(mut self, min_zoom: f32, max_zoom: f32) -> Self {
        self.min_zoom = min_zoom.min(max_zoom);
        self.max_zoom = max_zoom.max(min_zoom);
        self.normalize_zoom();
        self
    }

    pub fn pivot(&self) -> (f32, f32) {
        (self.view_width as f32 / 2.0, self.view_height as f32 / 2.0)
    }

    pub fn set_zoom(&mut self, zoom: f32) {
        self.zoom = zoom;
        self.normalize_zoom();
    }

    pub fn reset_zoom(&mut self) {
        self.zoom = 1.0;
        self.pan_x = 0.0;
        self.pan_y = 0.0;
    }

    /// Clamps zoom into its limits and drops the pan offsets at 100%.
    pub fn normalize_zoom(&mut self) {
        if !self.zoom.is_finite() {
            self.zoom = 1.0;
        }
        self.zoom = self.zoom.clamp(self.min_zoom, self.max_zoom);
        if self.zoom == 1.0 {
            self.pan_x = 0.0;
            self.pan_y = 0.0;
        }
    }

    pub fn is_zoomed(&self) -> bool {
        self.zoom != 1.0
    }
}

/// Maps a device sample into document space.
///
/// The zoom is undone around `pivot` and the scroll offset is added to y. At
/// exactly 100% zoom the division is skipped so the hot path stays exact.
pub fn to_document_space(raw: &RawSample, viewport: &Viewport, pivot: (f32, f32)) -> DocumentPoint {
    let (x, y) = if viewport.zoom == 1.0 {
        (raw.x, raw.y)
    } else {
        (
            (raw.x - pivot.0) / viewport.zoom + pivot.0,
            (raw.y - pivot.1) / viewport.zoom + pivot.1,
        )
    };
    DocumentPoint {
        x,
        y: y + viewport.scroll as f32,
        pressure: raw.pressure,
        size: 0.0,
        tilt_x: raw.tilt_x,
        tilt_y: raw.tilt_y,
        timestamp_ms: raw.timestamp_ms,
    }
}

/// Inverse of [`to_document_space`] for the x/y coordinates.
pub fn to_screen_space(point: &DocumentPoint, viewport: &Viewport, pivot: (f32, f32)) -> (f32, f32) {
    let y = point.y - viewport.scroll as f32;
    if viewport.zoom == 1.0 {
        return (point.x, y);
    }
    (
        (point.x - pivot.0) * viewport.zoom + pivot.0,
        (y - pivot.1) * viewport.zoom + pivot.1,
    )
}

pub fn batch_to_document_space(
    raw: &[RawSample],
    viewport: &Viewport,
    pivot: (f32, f32),
) -> Vec<DocumentPoint> {
    raw.iter()
        .map(|sample| to_document_space(sample, viewport, pivot))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(x: f32, y: f32) -> RawSample {
        RawSample {
            x,
            y,
            pressure: 812.0,
            tilt_x: 3,
            tilt_y: -4,
            timestamp_ms: 99,
        }
    }

    #[test]
    fn unzoomed_transform_is_identity_plus_scroll() {
        let mut viewport = Viewport::new(1000, 1000);
        viewport.scroll = 240;
        let point = to_document_space(&sample(12.5, 40.25), &viewport, viewport.pivot());
        assert_eq!(point.x, 12.5);
        assert_eq!(point.y, 280.25);
        assert_eq!(point.pressure, 812.0);
        assert_eq!((point.tilt_x, point.tilt_y, point.timestamp_ms), (3, -4, 99));
    }

    #[test]
    fn zoomed_transform_roundtrips_through_screen_space() {
        for zoom in [0.5_f32, 0.75, 1.25, 2.0] {
            let mut viewport = Viewport::new(800, 1200);
            viewport.scroll = 57;
            viewport.set_zoom(zoom);
            let pivot = viewport.pivot();
            for (x, y) in [(0.0, 0.0), (400.0, 600.0), (799.0, 13.0), (123.4, 1111.1)] {
                let doc = to_document_space(&sample(x, y), &viewport, pivot);
                let (sx, sy) = to_screen_space(&doc, &viewport, pivot);
                assert!((sx - x).abs() < 1e-3, "x {x} zoom {zoom} got {sx}");
                assert!((sy - y).abs() < 1e-3, "y {y} zoom {zoom} got {sy}");
            }
        }
    }

    #[test]
    fn pivot_is_fixed_point_of_zoom() {
        let mut viewport = Viewport::new(600, 400);
        viewport.set_zoom(2.0);
        let point = to_document_space(&sample(300.0, 200.0), &viewport, viewport.pivot());
        assert_eq!((point.x, point.y), (300.0, 200.0));
    }

    #[test]
    fn zoom_is_clamped_and_pan_reset_at_unity() {
        let mut viewport = Viewport::new(100, 100);
        viewport.set_zoom(9.0);
        assert_eq!(viewport.zoom, DEFAULT_MAX_ZOOM);
        viewport.set_zoom(0.01);
        assert_eq!(viewport.zoom, DEFAULT_MIN_ZOOM);

        viewport.pan_x = 12.0;
        viewport.pan_y = -7.0;
        viewport.set_zoom(1.0);
        assert_eq!((viewport.pan_x, viewport.pan_y), (0.0, 0.0));
    }

    #[test]
    fn non_finite_zoom_falls_back_to_unity() {
        let mut viewport = Viewport::new(100, 100);
        viewport.set_zoom(f32::NAN);
        assert_eq!(viewport.zoom, 1.0);
    }
}
