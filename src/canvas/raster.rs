//! The viewport raster and the page model it is drawn from.
//!
//! [`RasterStore`] keeps the strokes and images of one page, a bitmap of the
//! window currently on screen, and the layout state (scroll, pagination,
//! template) needed to redraw any part of that window. All mutation goes
//! through `&mut self`; the engine wraps the store in the drawing lock.

use crate::canvas::buffer::RasterBuffer;
use crate::canvas::debounce::Debouncer;
use crate::canvas::geometry::Rect;
use crate::canvas::model::{Image, ImageId, PageId, Stroke, StrokeId};
use crate::canvas::notify::Notifier;
use crate::canvas::pagination::{PageLayout, PaperFormat};
use crate::canvas::persist::{decode_snapshot, spawn_snapshot_writer, RasterCache, SnapshotKind};
use crate::canvas::render::{paint_background, paint_image, paint_stroke, view_region, Template, PAPER_COLOR};
use crate::canvas::settings::CanvasSettings;
use crate::canvas::store::{AssetLoader, DocumentStore};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
pub struct RasterConfig {
    pub view_width: i32,
    pub view_height: i32,
    pub pagination: bool,
    pub paper_format: PaperFormat,
    pub page_gap: i32,
    pub content_padding: i32,
    pub template: Template,
    pub max_pressure: f32,
    pub persist_debounce: Duration,
    pub thumbnail_width: u32,
    pub thumbnail_quality: u8,
}

impl RasterConfig {
    pub fn from_settings(settings: &CanvasSettings, view_width: i32, view_height: i32) -> Self {
        Self {
            view_width,
            view_height,
            pagination: settings.pagination,
            paper_format: settings.paper_format,
            page_gap: settings.page_gap,
            content_padding: settings.content_padding,
            template: settings.template,
            max_pressure: settings.max_pressure,
            persist_debounce: settings.persist_debounce(),
            thumbnail_width: settings.thumbnail_width,
            thumbnail_quality: settings.thumbnail_quality,
        }
    }
}

/// Collaborators the raster reads from and writes through.
#[derive(Clone)]
pub struct RasterServices {
    pub store: Arc<dyn DocumentStore>,
    pub assets: Arc<dyn AssetLoader>,
    pub cache: Option<Arc<dyn RasterCache>>,
    pub notifier: Notifier,
}

/// Union of the bounds of `strokes` and `images`; empty when both are.
pub fn content_rect(strokes: &[Stroke], images: &[Image]) -> Rect {
    let strokes = strokes.iter().map(|stroke| stroke.bounds.to_rect());
    let images = images.iter().map(Image::bounds);
    strokes
        .chain(images)
        .fold(Rect::default(), |acc, rect| acc.union(&rect))
}

pub struct RasterStore {
    page: PageId,
    raster: RasterBuffer,
    strokes: Vec<Stroke>,
    stroke_index: HashMap<StrokeId, usize>,
    images: Vec<Image>,
    scroll: i32,
    view_width: i32,
    view_height: i32,
    height: i32,
    pagination: bool,
    paper_format: PaperFormat,
    page_gap: i32,
    layout: PageLayout,
    template: Template,
    content_padding: i32,
    max_pressure: f32,
    persist: Debouncer,
    thumbnail_width: u32,
    thumbnail_quality: u8,
    services: RasterServices,
}

impl std::fmt::Debug for RasterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterStore")
            .field("page", &self.page)
            .field("strokes", &self.strokes.len())
            .field("images", &self.images.len())
            .field("scroll", &self.scroll)
            .field("height", &self.height)
            .field("layout", &self.layout)
            .finish()
    }
}

impl RasterStore {
    /// Allocates the viewport raster. Allocation failure is the only error.
    pub fn new(page: PageId, config: RasterConfig, services: RasterServices) -> Result<Self> {
        let view_width = config.view_width.max(1);
        let view_height = config.view_height.max(1);
        let raster = RasterBuffer::try_new(view_width as u32, view_height as u32, PAPER_COLOR)
            .with_context(|| format!("allocate canvas raster for page {page}"))?;
        let mut store = Self {
            page,
            raster,
            strokes: Vec::new(),
            stroke_index: HashMap::new(),
            images: Vec::new(),
            scroll: 0,
            view_width,
            view_height,
            height: view_height,
            pagination: config.pagination,
            paper_format: config.paper_format,
            page_gap: config.page_gap,
            layout: PageLayout::disabled(),
            template: config.template,
            content_padding: config.content_padding,
            max_pressure: config.max_pressure,
            persist: Debouncer::new(config.persist_debounce),
            thumbnail_width: config.thumbnail_width,
            thumbnail_quality: config.thumbnail_quality,
            services,
        };
        store.recompute_layout();
        Ok(store)
    }

    /// Populates the model from the document store and fills the raster,
    /// from the cached snapshot when it fits.
    pub fn load(&mut self) {
        match self.services.store.load_page(&self.page) {
            Ok(content) => {
                self.strokes = content.strokes;
                self.images = content.images;
                self.scroll = content.scroll.max(0);
            }
            Err(err) => {
                tracing::error!(page = %self.page, error = %format!("{err:#}"), "failed to load page");
                self.services.notifier.notify("Could not load page content");
            }
        }
        self.reindex();
        self.compute_height();
        if self.warm_start() {
            tracing::info!(page = %self.page, "raster restored from snapshot");
        } else {
            self.redraw_visible();
            self.request_persist(Instant::now());
        }
        tracing::info!(
            page = %self.page,
            strokes = self.strokes.len(),
            images = self.images.len(),
            scroll = self.scroll,
            "page loaded"
        );
    }

    fn warm_start(&mut self) -> bool {
        let Some(cache) = &self.services.cache else {
            return false;
        };
        let bytes = match cache.load_full(&self.page) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return false,
            Err(err) => {
                tracing::warn!(page = %self.page, error = %format!("{err:#}"), "snapshot unreadable");
                return false;
            }
        };
        match decode_snapshot(&bytes) {
            Ok(image) => {
                let fits = self.raster.copy_from_image(&image);
                if !fits {
                    tracing::debug!(
                        page = %self.page,
                        snapshot = ?image.dimensions(),
                        raster = ?self.raster.size(),
                        "snapshot size mismatch, redrawing"
                    );
                }
                fits
            }
            Err(err) => {
                tracing::warn!(page = %self.page, error = %format!("{err:#}"), "snapshot undecodable");
                false
            }
        }
    }

    pub fn page(&self) -> &PageId {
        &self.page
    }

    pub fn raster(&self) -> &RasterBuffer {
        &self.raster
    }

    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    pub fn stroke(&self, id: &StrokeId) -> Option<&Stroke> {
        self.stroke_index.get(id).map(|&index| &self.strokes[index])
    }

    pub fn images(&self) -> &[Image] {
        &self.images
    }

    pub fn scroll(&self) -> i32 {
        self.scroll
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn layout(&self) -> PageLayout {
        self.layout
    }

    pub fn view_size(&self) -> (i32, i32) {
        (self.view_width, self.view_height)
    }

    pub fn template(&self) -> Template {
        self.template
    }

    /// Document rectangle currently backed by the raster.
    pub fn visible_rect(&self) -> Rect {
        Rect::new(0, self.scroll, self.view_width, self.scroll + self.view_height)
    }

    fn reindex(&mut self) {
        self.stroke_index = self
            .strokes
            .iter()
            .enumerate()
            .map(|(index, stroke)| (stroke.id.clone(), index))
            .collect();
    }

    fn recompute_layout(&mut self) {
        self.layout = PageLayout::for_view(
            self.view_width,
            self.paper_format,
            self.page_gap,
            self.pagination,
        );
    }

    fn report(&self, what: &str, err: anyhow::Error) {
        tracing::error!(page = %self.page, error = %format!("{err:#}"), "{what}");
        self.services.notifier.notify(what);
    }

    pub fn add_strokes(&mut self, strokes: Vec<Stroke>) {
        if strokes.is_empty() {
            return;
        }
        if let Err(err) = self.services.store.create_strokes(&strokes) {
            self.report("Could not save strokes", err);
        }
        for stroke in strokes {
            self.stroke_index.insert(stroke.id.clone(), self.strokes.len());
            self.strokes.push(stroke);
        }
        self.compute_height();
    }

    /// Removes the strokes with `ids` and returns them in model order.
    pub fn remove_strokes(&mut self, ids: &[StrokeId]) -> Vec<Stroke> {
        let (removed, kept): (Vec<Stroke>, Vec<Stroke>) = std::mem::take(&mut self.strokes)
            .into_iter()
            .partition(|stroke| ids.contains(&stroke.id));
        self.strokes = kept;
        self.reindex();
        if !removed.is_empty() {
            let removed_ids: Vec<StrokeId> = removed.iter().map(|s| s.id.clone()).collect();
            if let Err(err) = self.services.store.delete_strokes(&self.page, &removed_ids) {
                self.report("Could not delete strokes", err);
            }
            self.compute_height();
        }
        removed
    }

    pub fn add_images(&mut self, images: Vec<Image>) {
        if images.is_empty() {
            return;
        }
        if let Err(err) = self.services.store.create_images(&images) {
            self.report("Could not save images", err);
        }
        self.images.extend(images);
        self.compute_height();
    }

    pub fn remove_images(&mut self, ids: &[ImageId]) -> Vec<Image> {
        let (removed, kept): (Vec<Image>, Vec<Image>) = std::mem::take(&mut self.images)
            .into_iter()
            .partition(|image| ids.contains(&image.id));
        self.images = kept;
        if !removed.is_empty() {
            let removed_ids: Vec<ImageId> = removed.iter().map(|i| i.id.clone()).collect();
            if let Err(err) = self.services.store.delete_images(&self.page, &removed_ids) {
                self.report("Could not delete images", err);
            }
            self.compute_height();
        }
        removed
    }

    /// Document height for the current content.
    pub fn compute_height(&mut self) -> i32 {
        let content = content_rect(&self.strokes, &self.images);
        if content.is_empty() {
            self.height = self.view_height;
            return self.height;
        }
        let bottom = content.bottom + self.content_padding;
        self.height = if self.layout.is_paginated() {
            self.layout.document_height(bottom, self.view_height)
        } else {
            bottom.max(self.view_height)
        };
        self.height
    }

    pub fn compute_width(&self) -> i32 {
        let content = content_rect(&self.strokes, &self.images);
        let right = if content.is_empty() { 0 } else { content.right };
        (right + self.content_padding).max(self.view_width)
    }

    /// Repaints the document rectangle `area` into `target`, or into the
    /// viewport raster when no target is given. Pixels outside `area` are
    /// left alone.
    pub fn draw_area(
        &mut self,
        area: Rect,
        ignored_strokes: &[StrokeId],
        ignored_images: &[ImageId],
        target: Option<&mut RasterBuffer>,
    ) {
        match target {
            Some(canvas) => self.paint_area(canvas, area, ignored_strokes, ignored_images),
            None => {
                let mut canvas = std::mem::take(&mut self.raster);
                self.paint_area(&mut canvas, area, ignored_strokes, ignored_images);
                self.raster = canvas;
            }
        }
    }

    pub fn redraw_visible(&mut self) {
        self.draw_area(self.visible_rect(), &[], &[], None);
    }

    fn paint_area(
        &self,
        canvas: &mut RasterBuffer,
        area: Rect,
        ignored_strokes: &[StrokeId],
        ignored_images: &[ImageId],
    ) {
        let started = Instant::now();
        let Some(clip) = view_region(area, self.scroll).clamp(canvas.width(), canvas.height()) else {
            return;
        };
        let doc_area = Rect::new(
            clip.x,
            clip.y + self.scroll,
            clip.right(),
            clip.bottom() + self.scroll,
        );

        paint_background(canvas, &self.layout, self.template, self.scroll, clip);

        for image in &self.images {
            if ignored_images.contains(&image.id) || !image.bounds().intersects(&doc_area) {
                continue;
            }
            match self.services.assets.load(&image.source) {
                Ok(bitmap) => paint_image(canvas, &bitmap, view_region(image.bounds(), self.scroll), clip),
                Err(err) => {
                    tracing::warn!(image = %image.id, error = %format!("{err:#}"), "skipping image");
                    self.services
                        .notifier
                        .notify(format!("Could not load image {}", image.source));
                }
            }
        }

        let mut painted = 0usize;
        for stroke in &self.strokes {
            if ignored_strokes.contains(&stroke.id) || !stroke.bounds.intersects_rect(&doc_area) {
                continue;
            }
            paint_stroke(canvas, stroke, self.scroll, clip, self.max_pressure);
            painted += 1;
        }
        tracing::debug!(
            ?doc_area,
            strokes = painted,
            elapsed_us = started.elapsed().as_micros() as u64,
            "draw area"
        );
    }

    /// Scrolls by `delta` document pixels, never above the top. Returns the
    /// delta actually applied.
    pub fn update_scroll(&mut self, delta: i32) -> i32 {
        let next = (self.scroll + delta).max(0);
        let applied = next - self.scroll;
        if applied == 0 {
            return 0;
        }
        self.scroll = next;

        if self.layout.is_paginated() || applied.abs() >= self.view_height {
            self.redraw_visible();
        } else {
            self.raster.shift_vertical(applied, PAPER_COLOR);
            let bottom = next + self.view_height;
            let strip = if applied > 0 {
                Rect::new(0, bottom - applied, self.view_width, bottom)
            } else {
                Rect::new(0, next, self.view_width, next - applied)
            };
            self.draw_area(strip, &[], &[], None);
        }
        self.height = self.height.max(next + self.view_height);

        if let Err(err) = self.services.store.update_scroll_offset(&self.page, next) {
            self.report("Could not save scroll position", err);
        }
        applied
    }

    /// Resizes the viewport raster. Returns whether anything changed.
    pub fn update_dimensions(&mut self, view_width: i32, view_height: i32) -> Result<bool> {
        let view_width = view_width.max(1);
        let view_height = view_height.max(1);
        if (view_width, view_height) == (self.view_width, self.view_height) {
            return Ok(false);
        }
        self.raster = RasterBuffer::try_new(view_width as u32, view_height as u32, PAPER_COLOR)
            .with_context(|| format!("resize canvas raster to {view_width}x{view_height}"))?;
        self.view_width = view_width;
        self.view_height = view_height;
        self.recompute_layout();
        self.compute_height();
        self.redraw_visible();
        tracing::info!(view_width, view_height, "canvas resized");
        Ok(true)
    }

    /// Turns pagination on or off. Turning it off pulls content up by the
    /// gaps that were above it.
    pub fn update_pagination(&mut self, enabled: bool) -> bool {
        if enabled == self.pagination {
            return false;
        }
        if !enabled && self.layout.is_paginated() {
            self.collapse_gaps();
        }
        self.pagination = enabled;
        self.recompute_layout();
        self.compute_height();
        self.redraw_visible();
        tracing::info!(enabled, page_height = self.layout.page_height, "pagination changed");
        true
    }

    fn collapse_gaps(&mut self) {
        let layout = self.layout;
        let mut moved_strokes = Vec::new();
        for stroke in &mut self.strokes {
            let Some(first) = stroke.points.first() else {
                continue;
            };
            let shift = layout.gaps_above(first.y);
            if shift > 0 {
                stroke.translate(0.0, -(shift as f32));
                moved_strokes.push(stroke.clone());
            }
        }
        let mut moved_images = Vec::new();
        for image in &mut self.images {
            let shift = layout.gaps_above(image.y as f32);
            if shift > 0 {
                image.y -= shift;
                moved_images.push(image.clone());
            }
        }
        if !moved_strokes.is_empty() {
            if let Err(err) = self.services.store.update_strokes(&moved_strokes) {
                self.report("Could not save moved strokes", err);
            }
        }
        if !moved_images.is_empty() {
            if let Err(err) = self.services.store.update_images(&moved_images) {
                self.report("Could not save moved images", err);
            }
        }
        tracing::debug!(
            strokes = moved_strokes.len(),
            images = moved_images.len(),
            "collapsed page gaps"
        );
    }

    pub fn update_paper_format(&mut self, format: PaperFormat) -> bool {
        if format == self.paper_format {
            return false;
        }
        self.paper_format = format;
        self.recompute_layout();
        self.compute_height();
        self.redraw_visible();
        true
    }

    pub fn update_template(&mut self, template: Template) -> bool {
        if template == self.template {
            return false;
        }
        self.template = template;
        self.redraw_visible();
        true
    }

    pub fn set_persist_debounce(&mut self, window: Duration) {
        self.persist.set_window(window);
    }

    /// Schedules a snapshot once the raster has been quiet for the debounce
    /// window.
    pub fn request_persist(&mut self, now: Instant) {
        self.persist.poke(now);
    }

    pub fn persist_pending(&self) -> bool {
        self.persist.is_pending()
    }

    /// Writes the snapshot when the debounce window has passed.
    pub fn poll_persist(&mut self, now: Instant) -> Option<JoinHandle<()>> {
        if self.persist.due(now) {
            self.persist()
        } else {
            None
        }
    }

    /// Full-resolution PNG snapshot on a background writer.
    pub fn persist(&mut self) -> Option<JoinHandle<()>> {
        self.persist.cancel();
        self.spawn_snapshot(SnapshotKind::Full)
    }

    pub fn persist_thumbnail(&self) -> Option<JoinHandle<()>> {
        self.spawn_snapshot(SnapshotKind::Thumbnail {
            width: self.thumbnail_width,
            quality: self.thumbnail_quality,
        })
    }

    fn spawn_snapshot(&self, kind: SnapshotKind) -> Option<JoinHandle<()>> {
        let cache = self.services.cache.as_ref()?;
        spawn_snapshot_writer(
            Arc::clone(cache),
            self.page.clone(),
            self.raster.clone(),
            kind,
            self.services.notifier.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::model::{Color, DocumentPoint, Pen};
    use crate::canvas::persist::FileRasterCache;
    use crate::canvas::store::{FileAssetLoader, MemoryDocumentStore, PageContent};

    fn config(width: i32, height: i32) -> RasterConfig {
        RasterConfig::from_settings(&CanvasSettings::default(), width, height)
    }

    fn services(store: Arc<MemoryDocumentStore>) -> RasterServices {
        RasterServices {
            store,
            assets: Arc::new(FileAssetLoader::new()),
            cache: None,
            notifier: Notifier::new(),
        }
    }

    fn stroke(points: &[(f32, f32)]) -> Stroke {
        let points = points
            .iter()
            .map(|&(x, y)| DocumentPoint {
                x,
                y,
                pressure: 1.0,
                size: 4.0,
                ..DocumentPoint::default()
            })
            .collect();
        Stroke::new(PageId::from("page"), Pen::Ballpen, Color::BLACK, 4.0, points).expect("stroke")
    }

    fn raster_store(width: i32, height: i32) -> (RasterStore, Arc<MemoryDocumentStore>) {
        let store = Arc::new(MemoryDocumentStore::new());
        let raster = RasterStore::new(PageId::from("page"), config(width, height), services(store.clone()))
            .expect("raster store");
        (raster, store)
    }

    #[test]
    fn height_tracks_content_with_padding() {
        let (mut raster, _) = raster_store(200, 300);
        assert_eq!(raster.compute_height(), 300);
        raster.add_strokes(vec![stroke(&[(10.0, 10.0), (20.0, 600.0)])]);
        assert_eq!(raster.height(), 605 + 50);
        assert_eq!(raster.compute_width(), 200);
    }

    #[test]
    fn padding_near_a_page_bottom_adds_a_page() {
        let config = RasterConfig {
            pagination: true,
            ..config(210, 300)
        };
        let mut raster = RasterStore::new(
            PageId::from("page"),
            config,
            services(Arc::new(MemoryDocumentStore::new())),
        )
        .expect("raster store");
        let band = raster.layout().page_height + raster.layout().page_gap;
        assert_eq!(raster.layout().page_height, 297);

        raster.add_strokes(vec![stroke(&[(10.0, 100.0), (20.0, 200.0)])]);
        assert_eq!(raster.height(), band);

        raster.add_strokes(vec![stroke(&[(10.0, 250.0), (20.0, 266.0)])]);
        assert_eq!(raster.height(), 2 * band);
    }

    #[test]
    fn scroll_is_clamped_at_top_and_persisted() {
        let (mut raster, store) = raster_store(100, 100);
        assert_eq!(raster.update_scroll(-40), 0);
        assert_eq!(raster.scroll(), 0);
        assert_eq!(raster.update_scroll(70), 70);
        assert_eq!(raster.update_scroll(-100), -70);
        assert_eq!(raster.scroll(), 0);
        assert_eq!(store.page(&PageId::from("page")).scroll, 0);
        raster.update_scroll(25);
        assert_eq!(store.page(&PageId::from("page")).scroll, 25);
    }

    #[test]
    fn blit_scroll_matches_full_redraw() {
        let (mut raster, _) = raster_store(120, 200);
        raster.add_strokes(vec![
            stroke(&[(10.0, 20.0), (100.0, 180.0)]),
            stroke(&[(5.0, 230.0), (110.0, 260.0)]),
        ]);
        raster.update_template(Template::Lined);
        raster.redraw_visible();

        raster.update_scroll(60);
        raster.update_scroll(-25);
        let blitted = raster.raster().clone();
        raster.redraw_visible();
        assert_eq!(&blitted, raster.raster());
    }

    #[test]
    fn redrawing_an_area_twice_is_idempotent() {
        let (mut raster, _) = raster_store(100, 100);
        raster.add_strokes(vec![stroke(&[(0.0, 0.0), (99.0, 99.0)])]);
        let area = Rect::new(10, 10, 60, 60);
        raster.draw_area(area, &[], &[], None);
        let first = raster.raster().clone();
        raster.draw_area(area, &[], &[], None);
        assert_eq!(&first, raster.raster());
    }

    #[test]
    fn ignored_strokes_are_left_out() {
        let (mut raster, _) = raster_store(60, 60);
        let s = stroke(&[(10.0, 30.0), (50.0, 30.0)]);
        raster.add_strokes(vec![s.clone()]);
        raster.draw_area(raster.visible_rect(), &[s.id.clone()], &[], None);
        assert_eq!(raster.raster().pixel(30, 30), PAPER_COLOR);
        raster.draw_area(raster.visible_rect(), &[], &[], None);
        assert_eq!(raster.raster().pixel(30, 30), Color::BLACK);
    }

    #[test]
    fn draw_into_target_leaves_raster_untouched() {
        let (mut raster, _) = raster_store(40, 40);
        raster.add_strokes(vec![stroke(&[(5.0, 20.0), (35.0, 20.0)])]);
        let before = raster.raster().clone();
        let mut target = RasterBuffer::try_new(40, 40, Color::RED).expect("target");
        raster.draw_area(Rect::new(0, 0, 40, 40), &[], &[], Some(&mut target));
        assert_eq!(&before, raster.raster());
        assert_eq!(target.pixel(20, 20), Color::BLACK);
    }

    #[test]
    fn removed_strokes_are_returned_and_deleted_from_store() {
        let (mut raster, store) = raster_store(100, 100);
        let keep = stroke(&[(1.0, 1.0)]);
        let drop = stroke(&[(50.0, 50.0)]);
        raster.add_strokes(vec![keep.clone(), drop.clone()]);
        let removed = raster.remove_strokes(&[drop.id.clone()]);
        assert_eq!(removed, vec![drop.clone()]);
        assert!(raster.stroke(&drop.id).is_none());
        assert_eq!(raster.stroke(&keep.id), Some(&keep));
        assert_eq!(store.page(&PageId::from("page")).strokes, vec![keep]);
    }

    #[test]
    fn turning_pagination_off_collapses_gaps() {
        let store = Arc::new(MemoryDocumentStore::new());
        let mut cfg = config(210, 400);
        cfg.pagination = true;
        let mut raster = RasterStore::new(PageId::from("page"), cfg, services(store.clone())).expect("raster");
        assert_eq!(raster.layout().page_height, 297);
        let on_third_page = stroke(&[(10.0, 700.0)]);
        raster.add_strokes(vec![on_third_page.clone()]);

        assert!(raster.update_pagination(false));
        let moved = raster.stroke(&on_third_page.id).expect("stroke");
        assert_eq!(moved.points[0].y, 700.0 - 60.0);
        assert_eq!(store.page(&PageId::from("page")).strokes[0].points[0].y, 640.0);
        assert!(!raster.layout().is_paginated());
    }

    #[test]
    fn load_uses_snapshot_only_when_dimensions_match() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cache = Arc::new(FileRasterCache::new(dir.path()));
        let page = PageId::from("page");
        let snapshot = RasterBuffer::try_new(30, 30, Color::BLUE).expect("snapshot");
        cache
            .store_full(&page, &crate::canvas::persist::encode_png(&snapshot).expect("png"))
            .expect("store");

        let store = Arc::new(MemoryDocumentStore::with_page(page.clone(), PageContent::default()));
        let mut matching = RasterStore::new(
            page.clone(),
            config(30, 30),
            RasterServices {
                cache: Some(cache.clone()),
                ..services(store.clone())
            },
        )
        .expect("raster");
        matching.load();
        assert_eq!(matching.raster().pixel(3, 3), Color::BLUE);

        let mut mismatched = RasterStore::new(
            page,
            config(40, 30),
            RasterServices {
                cache: Some(cache),
                ..services(store)
            },
        )
        .expect("raster");
        mismatched.load();
        assert_eq!(mismatched.raster().pixel(3, 3), PAPER_COLOR);
        assert!(mismatched.persist_pending());
        assert!(!matching.persist_pending());
    }

    #[test]
    fn missing_image_is_skipped_with_notification() {
        let store = Arc::new(MemoryDocumentStore::new());
        let services = services(store);
        let notes = services.notifier.subscribe();
        let mut raster = RasterStore::new(PageId::from("page"), config(50, 50), services).expect("raster");
        raster.add_images(vec![Image {
            id: ImageId::from("img"),
            page_id: PageId::from("page"),
            x: 0,
            y: 0,
            width: 20,
            height: 20,
            source: "/nonexistent/picture.png".into(),
        }]);
        raster.add_strokes(vec![stroke(&[(25.0, 25.0), (45.0, 25.0)])]);
        raster.redraw_visible();
        assert_eq!(raster.raster().pixel(35, 25), Color::BLACK);
        let note = notes.try_recv().expect("notification");
        assert!(note.text.contains("picture.png"));
    }
}
