use crate::canvas::geometry::{BoundingBox, Rect};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgba(255, 255, 255, 255);
    pub const BLACK: Color = Color::rgba(0, 0, 0, 255);
    pub const GRAY: Color = Color::rgba(136, 136, 136, 255);
    pub const LIGHT_GRAY: Color = Color::rgba(204, 204, 204, 255);
    pub const RED: Color = Color::rgba(255, 0, 0, 255);
    pub const GREEN: Color = Color::rgba(0, 255, 0, 255);
    pub const BLUE: Color = Color::rgba(0, 0, 255, 255);

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(StrokeId);
string_id!(ImageId);
string_id!(PageId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pen {
    Ballpen,
    RedBallpen,
    BlueBallpen,
    GreenBallpen,
    Pencil,
    Brush,
    Marker,
    Fountain,
}

impl Pen {
    pub const ALL: [Pen; 8] = [
        Pen::Ballpen,
        Pen::RedBallpen,
        Pen::BlueBallpen,
        Pen::GreenBallpen,
        Pen::Pencil,
        Pen::Brush,
        Pen::Marker,
        Pen::Fountain,
    ];

    /// Pens whose rendered width follows stylus pressure.
    pub fn follows_pressure(self) -> bool {
        matches!(self, Pen::Brush | Pen::Fountain | Pen::Pencil)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Eraser {
    /// Removes whole strokes touched by a wide eraser path.
    Pen,
    /// Thin precision variant of the same hit test.
    Select,
}

impl Eraser {
    pub fn radius(self) -> f32 {
        match self {
            Eraser::Pen => 15.0,
            Eraser::Select => 1.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolMode {
    Draw,
    Erase,
    Select,
    Line,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PenSetting {
    pub stroke_size: f32,
    pub color: Color,
}

/// One stylus sample in device pixels, as delivered by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RawSample {
    pub x: f32,
    pub y: f32,
    pub pressure: f32,
    #[serde(default)]
    pub tilt_x: i32,
    #[serde(default)]
    pub tilt_y: i32,
    #[serde(default)]
    pub timestamp_ms: u64,
}

impl RawSample {
    pub fn at(x: f32, y: f32, timestamp_ms: u64) -> Self {
        Self {
            x,
            y,
            pressure: 1.0,
            tilt_x: 0,
            tilt_y: 0,
            timestamp_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DocumentPoint {
    pub x: f32,
    pub y: f32,
    pub pressure: f32,
    pub size: f32,
    pub tilt_x: i32,
    pub tilt_y: i32,
    pub timestamp_ms: u64,
}

impl DocumentPoint {
    pub fn xy(&self) -> (f32, f32) {
        (self.x, self.y)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub id: StrokeId,
    pub page_id: PageId,
    pub pen: Pen,
    pub color: Color,
    pub size: f32,
    pub points: Vec<DocumentPoint>,
    pub bounds: BoundingBox,
}

impl Stroke {
    /// Builds a stroke with a fresh id; `None` when there are no points.
    pub fn new(
        page_id: PageId,
        pen: Pen,
        color: Color,
        size: f32,
        points: Vec<DocumentPoint>,
    ) -> Option<Self> {
        let bounds = BoundingBox::around(points.iter().map(DocumentPoint::xy), size.max(1.0))?;
        Some(Self {
            id: StrokeId::generate(),
            page_id,
            pen,
            color,
            size,
            points,
            bounds,
        })
    }

    pub fn recompute_bounds(&mut self) {
        if let Some(bounds) =
            BoundingBox::around(self.points.iter().map(DocumentPoint::xy), self.size.max(1.0))
        {
            self.bounds = bounds;
        }
    }

    pub fn translate(&mut self, dx: f32, dy: f32) {
        for point in &mut self.points {
            point.x += dx;
            point.y += dy;
        }
        self.recompute_bounds();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub id: ImageId,
    pub page_id: PageId,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    /// Opaque reference resolved by the asset loader.
    pub source: String,
}

impl Image {
    pub fn bounds(&self) -> Rect {
        Rect::new(self.x, self.y, self.x + self.width, self.y + self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(x: f32, y: f32) -> DocumentPoint {
        DocumentPoint {
            x,
            y,
            pressure: 1.0,
            size: 4.0,
            ..DocumentPoint::default()
        }
    }

    #[test]
    fn stroke_bounds_cover_points_plus_width() {
        let stroke = Stroke::new(
            PageId::from("p"),
            Pen::Ballpen,
            Color::BLACK,
            4.0,
            vec![point(10.0, 10.0), point(20.0, 20.0), point(30.0, 10.0)],
        )
        .expect("stroke");
        assert_eq!(stroke.bounds, BoundingBox::new(6.0, 6.0, 34.0, 24.0));
    }

    #[test]
    fn translate_keeps_bounds_consistent() {
        let mut stroke = Stroke::new(
            PageId::from("p"),
            Pen::Ballpen,
            Color::BLACK,
            2.0,
            vec![point(0.0, 100.0), point(10.0, 110.0)],
        )
        .expect("stroke");
        stroke.translate(0.0, -30.0);
        assert_eq!(stroke.bounds, BoundingBox::new(-2.0, 68.0, 12.0, 82.0));
    }

    #[test]
    fn empty_point_list_builds_no_stroke() {
        assert!(Stroke::new(PageId::from("p"), Pen::Pencil, Color::BLACK, 3.0, Vec::new()).is_none());
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(StrokeId::generate(), StrokeId::generate());
    }
}
