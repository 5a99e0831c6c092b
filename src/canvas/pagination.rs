//! Page bands for paginated documents.
//!
//! A paginated document is a vertical stack of bands, each `page_height`
//! pixels of page followed by `page_gap` pixels of gap. Ink may never land in
//! a gap. With pagination off every query degenerates to a single unbounded
//! page.

use crate::canvas::geometry::Rect;
use serde::{Deserialize, Serialize};

pub const PAGE_GAP: i32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaperFormat {
    A4,
    Letter,
}

impl PaperFormat {
    /// Physical (height, width) in the format's native unit.
    fn proportions(self) -> (f32, f32) {
        match self {
            PaperFormat::A4 => (297.0, 210.0),
            PaperFormat::Letter => (11.0, 8.5),
        }
    }

    pub fn page_height_for_width(self, width: i32) -> i32 {
        let (height, paper_width) = self.proportions();
        (width as f32 * height / paper_width) as i32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLayout {
    pub page_height: i32,
    pub page_gap: i32,
    pub enabled: bool,
}

impl Default for PageLayout {
    fn default() -> Self {
        Self::disabled()
    }
}

impl PageLayout {
    pub const fn disabled() -> Self {
        Self {
            page_height: 0,
            page_gap: 0,
            enabled: false,
        }
    }

    pub const fn paginated(page_height: i32, page_gap: i32) -> Self {
        Self {
            page_height,
            page_gap,
            enabled: true,
        }
    }

    pub fn for_view(view_width: i32, format: PaperFormat, page_gap: i32, enabled: bool) -> Self {
        if enabled {
            Self::paginated(format.page_height_for_width(view_width), page_gap)
        } else {
            Self::disabled()
        }
    }

    pub fn is_paginated(&self) -> bool {
        self.enabled && self.page_height > 0
    }

    fn band(&self) -> i32 {
        self.page_height + self.page_gap
    }

    pub fn page_number_for(&self, y: i32) -> i32 {
        if !self.is_paginated() || y < 0 {
            return 0;
        }
        y / self.band()
    }

    pub fn page_number_for_f32(&self, y: f32) -> i32 {
        if !self.is_paginated() || y < 0.0 {
            return 0;
        }
        (y / self.band() as f32).floor() as i32
    }

    pub fn page_top_for(&self, page: i32) -> i32 {
        if !self.is_paginated() {
            return 0;
        }
        page * self.band()
    }

    pub fn page_bottom_for(&self, page: i32) -> i32 {
        self.page_top_for(page) + self.page_height
    }

    pub fn is_in_gap(&self, y: f32) -> bool {
        if !self.is_paginated() {
            return false;
        }
        let page = self.page_number_for_f32(y);
        let offset = y - (page * self.band()) as f32;
        offset > self.page_height as f32
    }

    pub fn visible_page_range(&self, top: i32, bottom: i32) -> (i32, i32) {
        (self.page_number_for(top), self.page_number_for(bottom))
    }

    /// Total gap height above the page containing `y`.
    pub fn gaps_above(&self, y: f32) -> i32 {
        self.page_number_for_f32(y) * self.page_gap
    }

    /// Document height for content ending at `content_bottom`.
    pub fn document_height(&self, content_bottom: i32, view_height: i32) -> i32 {
        if !self.is_paginated() {
            return content_bottom.max(view_height);
        }
        let pages = (content_bottom as f32 / self.page_height as f32).ceil() as i32;
        (pages * self.band()).max(view_height)
    }

    /// Moves a block of `height` starting at `y` onto the next page when it
    /// would run into a gap.
    pub fn place_block(&self, y: i32, height: i32) -> i32 {
        if !self.is_paginated() {
            return y;
        }
        let page = self.page_number_for(y);
        let relative = y - self.page_top_for(page);
        if relative + height > self.page_height {
            self.page_top_for(page + 1) + (self.page_height - height) / 2
        } else {
            y
        }
    }

    /// View-space rectangles where the stylus may ink: one per visible page,
    /// minus the `exclusion` band at the top of the view, shrunk to the scaled
    /// area when zoomed out.
    pub fn drawable_rects(
        &self,
        scroll: i32,
        view_width: i32,
        view_height: i32,
        exclusion: i32,
        zoom: f32,
    ) -> Vec<Rect> {
        let fallback = Rect::new(0, exclusion, view_width, view_height);
        let mut rects = Vec::new();

        if self.is_paginated() {
            let first = self.page_number_for(scroll);
            let last = self.page_number_for(scroll + view_height) + 1;
            for page in first..=last {
                let top = self.page_top_for(page) - scroll;
                let bottom = self.page_bottom_for(page) - scroll;
                if bottom <= 0 || top >= view_height {
                    continue;
                }
                let rect = Rect::new(0, top.max(exclusion), view_width, bottom.min(view_height));
                if !rect.is_empty() {
                    rects.push(rect);
                }
            }
            if rects.is_empty() {
                tracing::warn!("no drawable page areas in view, falling back to full view");
                rects.push(fallback);
            }
        } else {
            rects.push(fallback);
        }

        if zoom < 1.0 {
            let centre_x = view_width / 2;
            let centre_y = (view_height - exclusion) / 2 + exclusion;
            let visible_w = (view_width as f32 * zoom) as i32;
            let visible_h = ((view_height - exclusion) as f32 * zoom) as i32;
            let zoomed = Rect::new(
                centre_x - visible_w / 2,
                (centre_y - visible_h / 2).max(exclusion),
                centre_x + visible_w / 2,
                centre_y + visible_h / 2,
            );
            let shrunk: Vec<Rect> = rects.iter().filter_map(|r| r.intersect(&zoomed)).collect();
            if !shrunk.is_empty() {
                rects = shrunk;
            }
        }
        rects
    }
}
