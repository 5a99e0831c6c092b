use crate::canvas::geometry::Rect;
use crate::canvas::model::Color;
use anyhow::{anyhow, Result};

/// Pixel rectangle inside a raster, `x`/`y` top-left, sizes in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtyRegion {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl DirtyRegion {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_rect(rect: Rect) -> Self {
        Self::new(rect.left, rect.top, rect.width(), rect.height())
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn union(self, other: DirtyRegion) -> DirtyRegion {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        DirtyRegion::new(
            x,
            y,
            self.right().max(other.right()) - x,
            self.bottom().max(other.bottom()) - y,
        )
    }

    pub fn intersect(self, other: DirtyRegion) -> Option<DirtyRegion> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(DirtyRegion::new(x0, y0, x1 - x0, y1 - y0))
    }

    /// Clips to a `width` x `height` surface; `None` when nothing remains.
    pub fn clamp(self, width: u32, height: u32) -> Option<DirtyRegion> {
        self.intersect(DirtyRegion::new(0, 0, width as i32, height as i32))
    }
}

/// RGBA8 bitmap backing the visible window of the document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RasterBuffer {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl RasterBuffer {
    /// Allocates a `width` x `height` raster filled with `fill`.
    ///
    /// Allocation failure is the one fatal setup error of the canvas, so it
    /// is reported instead of aborting.
    pub fn try_new(width: u32, height: u32, fill: Color) -> Result<Self> {
        let len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| anyhow!("raster size {width}x{height} overflows"))?;
        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(len)
            .map_err(|err| anyhow!("allocate {width}x{height} raster: {err}"))?;
        pixels.resize(len, 0);
        let mut buffer = Self {
            width,
            height,
            pixels,
        };
        buffer.fill(fill);
        Ok(buffer)
    }

    pub fn from_pixels(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        if pixels.len() != (width as usize) * (height as usize) * 4 {
            return Err(anyhow!(
                "pixel data of {} bytes does not match {width}x{height}",
                pixels.len()
            ));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn full_region(&self) -> DirtyRegion {
        DirtyRegion::new(0, 0, self.width as i32, self.height as i32)
    }

    pub fn pixel(&self, x: u32, y: u32) -> Color {
        let idx = ((y * self.width + x) * 4) as usize;
        Color::rgba(
            self.pixels[idx],
            self.pixels[idx + 1],
            self.pixels[idx + 2],
            self.pixels[idx + 3],
        )
    }

    pub fn fill(&mut self, color: Color) {
        let rgba = color.to_array();
        for px in self.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
    }

    pub fn fill_region(&mut self, region: DirtyRegion, color: Color) {
        let Some(region) = region.clamp(self.width, self.height) else {
            return;
        };
        let rgba = color.to_array();
        for y in region.y..region.bottom() {
            let row = (y as usize * self.width as usize) * 4;
            let start = row + region.x as usize * 4;
            let end = row + region.right() as usize * 4;
            for px in self.pixels[start..end].chunks_exact_mut(4) {
                px.copy_from_slice(&rgba);
            }
        }
    }

    /// Writes `color` at (`x`, `y`), alpha-blending when it is translucent.
    /// Coordinates outside the raster or `clip` are ignored.
    pub fn put(&mut self, x: i32, y: i32, color: Color, clip: DirtyRegion) {
        if x < clip.x || y < clip.y || x >= clip.right() || y >= clip.bottom() {
            return;
        }
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return;
        }
        let idx = ((y as u32 * self.width + x as u32) * 4) as usize;
        let out = if color.a == 255 {
            color
        } else {
            let dst = Color::rgba(
                self.pixels[idx],
                self.pixels[idx + 1],
                self.pixels[idx + 2],
                self.pixels[idx + 3],
            );
            blend_pixel(dst, color)
        };
        self.pixels[idx..idx + 4].copy_from_slice(&out.to_array());
    }

    /// Moves the content up by `delta` rows (down when negative). Rows that
    /// scroll in are filled with `fill`.
    pub fn shift_vertical(&mut self, delta: i32, fill: Color) {
        if delta == 0 {
            return;
        }
        let row_bytes = self.width as usize * 4;
        let rows = self.height as usize;
        let shift = delta.unsigned_abs() as usize;
        if shift >= rows {
            self.fill(fill);
            return;
        }
        if delta > 0 {
            self.pixels.copy_within(shift * row_bytes.., 0);
            let exposed = DirtyRegion::new(
                0,
                (rows - shift) as i32,
                self.width as i32,
                shift as i32,
            );
            self.fill_region(exposed, fill);
        } else {
            self.pixels
                .copy_within(..(rows - shift) * row_bytes, shift * row_bytes);
            self.fill_region(
                DirtyRegion::new(0, 0, self.width as i32, shift as i32),
                fill,
            );
        }
    }

    /// Copy of the bytes inside `region`, row by row.
    pub fn region_bytes(&self, region: DirtyRegion) -> Vec<u8> {
        let Some(region) = region.clamp(self.width, self.height) else {
            return Vec::new();
        };
        let mut out = Vec::with_capacity((region.width * region.height * 4) as usize);
        for y in region.y..region.bottom() {
            let row = (y as usize * self.width as usize) * 4;
            out.extend_from_slice(
                &self.pixels[row + region.x as usize * 4..row + region.right() as usize * 4],
            );
        }
        out
    }

    pub fn to_image(&self) -> image::RgbaImage {
        image::RgbaImage::from_raw(self.width, self.height, self.pixels.clone())
            .unwrap_or_else(|| image::RgbaImage::new(self.width, self.height))
    }

    /// Replaces the content with `image` when the dimensions match.
    pub fn copy_from_image(&mut self, image: &image::RgbaImage) -> bool {
        if image.width() != self.width || image.height() != self.height {
            return false;
        }
        self.pixels.copy_from_slice(image.as_raw());
        true
    }
}

pub fn blend_pixel(bottom: Color, top: Color) -> Color {
    let sa = top.a as f32 / 255.0;
    let da = bottom.a as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= f32::EPSILON {
        return Color::rgba(0, 0, 0, 0);
    }
    let blend = |s: u8, d: u8| -> u8 {
        (((s as f32 * sa) + (d as f32 * da * (1.0 - sa))) / out_a)
            .round()
            .clamp(0.0, 255.0) as u8
    };
    Color::rgba(
        blend(top.r, bottom.r),
        blend(top.g, bottom.g),
        blend(top.b, bottom.b),
        (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
    )
}
