use crate::canvas::model::{Color, Eraser, Pen, PenSetting, ToolMode};
use crate::canvas::pagination::{PaperFormat, PAGE_GAP};
use crate::canvas::render::Template;
use crate::canvas::transform::{DEFAULT_MAX_ZOOM, DEFAULT_MIN_ZOOM};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

const MAX_WORKER_THREADS: usize = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasSettings {
    #[serde(default = "default_mode")]
    pub mode: ToolMode,
    #[serde(default = "default_pen")]
    pub pen: Pen,
    #[serde(default = "default_eraser")]
    pub eraser: Eraser,
    #[serde(default = "default_pen_settings")]
    pub pen_settings: BTreeMap<Pen, PenSetting>,
    #[serde(default = "default_min_zoom")]
    pub min_zoom: f32,
    #[serde(default = "default_max_zoom")]
    pub max_zoom: f32,
    #[serde(default = "default_history_debounce_ms")]
    pub history_debounce_ms: u64,
    #[serde(default = "default_persist_debounce_ms")]
    pub persist_debounce_ms: u64,
    #[serde(default = "default_refresh_timeout_ms")]
    pub refresh_timeout_ms: u64,
    #[serde(default)]
    pub pagination: bool,
    #[serde(default = "default_paper_format")]
    pub paper_format: PaperFormat,
    #[serde(default = "default_page_gap")]
    pub page_gap: i32,
    #[serde(default = "default_content_padding")]
    pub content_padding: i32,
    #[serde(default)]
    pub template: Template,
    /// Height of the toolbar band at the top of the view where the stylus
    /// may not ink.
    #[serde(default)]
    pub toolbar_height: i32,
    #[serde(default = "default_thumbnail_width")]
    pub thumbnail_width: u32,
    #[serde(default = "default_thumbnail_quality")]
    pub thumbnail_quality: u8,
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    #[serde(default = "default_max_pressure")]
    pub max_pressure: f32,
    #[serde(default)]
    pub debug: bool,
}

fn default_mode() -> ToolMode {
    ToolMode::Draw
}

fn default_pen() -> Pen {
    Pen::Ballpen
}

fn default_eraser() -> Eraser {
    Eraser::Pen
}

fn default_pen_setting(pen: Pen) -> PenSetting {
    let (stroke_size, color) = match pen {
        Pen::RedBallpen => (5.0, Color::RED),
        Pen::BlueBallpen => (5.0, Color::BLUE),
        Pen::GreenBallpen => (5.0, Color::GREEN),
        Pen::Marker => (40.0, Color::LIGHT_GRAY),
        _ => (5.0, Color::BLACK),
    };
    PenSetting { stroke_size, color }
}

fn default_pen_settings() -> BTreeMap<Pen, PenSetting> {
    Pen::ALL
        .iter()
        .map(|&pen| (pen, default_pen_setting(pen)))
        .collect()
}

fn default_min_zoom() -> f32 {
    DEFAULT_MIN_ZOOM
}

fn default_max_zoom() -> f32 {
    DEFAULT_MAX_ZOOM
}

fn default_history_debounce_ms() -> u64 {
    500
}

fn default_persist_debounce_ms() -> u64 {
    1000
}

fn default_refresh_timeout_ms() -> u64 {
    3000
}

fn default_paper_format() -> PaperFormat {
    PaperFormat::A4
}

fn default_page_gap() -> i32 {
    PAGE_GAP
}

fn default_content_padding() -> i32 {
    50
}

fn default_thumbnail_width() -> u32 {
    500
}

fn default_thumbnail_quality() -> u8 {
    80
}

fn default_worker_threads() -> usize {
    2
}

fn default_max_pressure() -> f32 {
    4096.0
}

impl Default for CanvasSettings {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            pen: default_pen(),
            eraser: default_eraser(),
            pen_settings: default_pen_settings(),
            min_zoom: default_min_zoom(),
            max_zoom: default_max_zoom(),
            history_debounce_ms: default_history_debounce_ms(),
            persist_debounce_ms: default_persist_debounce_ms(),
            refresh_timeout_ms: default_refresh_timeout_ms(),
            pagination: false,
            paper_format: default_paper_format(),
            page_gap: default_page_gap(),
            content_padding: default_content_padding(),
            template: Template::default(),
            toolbar_height: 0,
            thumbnail_width: default_thumbnail_width(),
            thumbnail_quality: default_thumbnail_quality(),
            worker_threads: default_worker_threads(),
            max_pressure: default_max_pressure(),
            debug: false,
        }
    }
}

impl CanvasSettings {
    pub fn pen_setting(&self, pen: Pen) -> PenSetting {
        self.pen_settings
            .get(&pen)
            .copied()
            .unwrap_or_else(|| default_pen_setting(pen))
    }

    pub fn history_debounce(&self) -> Duration {
        Duration::from_millis(self.history_debounce_ms)
    }

    pub fn persist_debounce(&self) -> Duration {
        Duration::from_millis(self.persist_debounce_ms)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_millis(self.refresh_timeout_ms)
    }

    /// Pulls out-of-range values back to usable ones. Returns whether
    /// anything changed.
    pub fn sanitize(&mut self) -> bool {
        let before = self.clone();

        if !self.min_zoom.is_finite() || self.min_zoom <= 0.0 || self.min_zoom > 1.0 {
            self.min_zoom = default_min_zoom();
        }
        if !self.max_zoom.is_finite() || self.max_zoom < 1.0 {
            self.max_zoom = default_max_zoom();
        }
        if self.history_debounce_ms == 0 {
            self.history_debounce_ms = default_history_debounce_ms();
        }
        if self.persist_debounce_ms == 0 {
            self.persist_debounce_ms = default_persist_debounce_ms();
        }
        if self.refresh_timeout_ms == 0 {
            self.refresh_timeout_ms = default_refresh_timeout_ms();
        }
        self.page_gap = self.page_gap.max(0);
        self.content_padding = self.content_padding.max(0);
        self.toolbar_height = self.toolbar_height.max(0);
        if self.thumbnail_width == 0 {
            self.thumbnail_width = default_thumbnail_width();
        }
        self.thumbnail_quality = self.thumbnail_quality.clamp(1, 100);
        self.worker_threads = self.worker_threads.clamp(1, MAX_WORKER_THREADS);
        if !self.max_pressure.is_finite() || self.max_pressure <= 0.0 {
            self.max_pressure = default_max_pressure();
        }
        for pen in Pen::ALL {
            let entry = self
                .pen_settings
                .entry(pen)
                .or_insert_with(|| default_pen_setting(pen));
            if !entry.stroke_size.is_finite() || entry.stroke_size <= 0.0 {
                entry.stroke_size = default_pen_setting(pen).stroke_size;
            }
        }

        *self != before
    }
}
