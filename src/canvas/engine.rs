//! The canvas engine: stylus input in, raster and history out.
//!
//! Locks are always taken in the order tracker, state, raster, history.
//! Nothing holds the raster while waiting for the history or the surface.

use crate::canvas::buffer::RasterBuffer;
use crate::canvas::erase::{polygon_contains, strokes_hit_by_path, strokes_in_lasso};
use crate::canvas::events::{CanvasEvent, EventBus};
use crate::canvas::geometry::Rect;
use crate::canvas::history::{
    FlushHandle, HistoryAction, HistoryBatcher, HistoryEntry, MemoryUndoStore, UndoStore,
};
use crate::canvas::input::{ContactId, Gesture, GestureKind, GestureOutcome, GestureTracker, InputSink};
use crate::canvas::lock::DrawingLock;
use crate::canvas::model::{
    Color, DocumentPoint, Eraser, Image, ImageId, PageId, Pen, PenSetting, RawSample, Stroke,
    StrokeId, ToolMode,
};
use crate::canvas::notify::Notifier;
use crate::canvas::pagination::{PageLayout, PaperFormat};
use crate::canvas::persist::RasterCache;
use crate::canvas::pool::WorkerPool;
use crate::canvas::raster::{content_rect, RasterConfig, RasterServices, RasterStore};
use crate::canvas::render::Template;
use crate::canvas::selection::{Selection, SelectionSink};
use crate::canvas::settings::CanvasSettings;
use crate::canvas::store::{AssetLoader, DocumentStore, FileAssetLoader, MemoryDocumentStore};
use crate::canvas::surface::{StrokeStyle, StylusSurface, SurfaceBinding, SurfaceToken};
use crate::canvas::transform::{batch_to_document_space, Viewport};
use anyhow::{anyhow, Result};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const SCHEDULER_TICK: Duration = Duration::from_millis(50);
const SCHEDULER_JOIN_TIMEOUT: Duration = Duration::from_secs(2);
const ERASER_STYLE_WIDTH: f32 = 30.0;
const SELECT_STYLE_WIDTH: f32 = 3.0;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Returns the tracker to idle once a commit ends, unwinding included.
struct SettleOnDrop<'a>(&'a mut GestureTracker);

impl Drop for SettleOnDrop<'_> {
    fn drop(&mut self) {
        self.0.settle();
    }
}

/// Collaborators of one open page.
pub struct CanvasServices {
    pub store: Arc<dyn DocumentStore>,
    pub undo: Box<dyn UndoStore>,
    pub assets: Arc<dyn AssetLoader>,
    pub cache: Option<Arc<dyn RasterCache>>,
    pub selection: Option<Arc<dyn SelectionSink>>,
    pub notifier: Notifier,
}

impl Default for CanvasServices {
    fn default() -> Self {
        Self {
            store: Arc::new(MemoryDocumentStore::new()),
            undo: Box::new(MemoryUndoStore::default()),
            assets: Arc::new(FileAssetLoader::new()),
            cache: None,
            selection: None,
            notifier: Notifier::new(),
        }
    }
}

#[derive(Debug)]
struct EngineState {
    settings: CanvasSettings,
    viewport: Viewport,
    drawing_enabled: bool,
}

struct EngineInner {
    page: PageId,
    raster: DrawingLock<RasterStore>,
    tracker: Mutex<GestureTracker>,
    state: Mutex<EngineState>,
    history: Mutex<HistoryBatcher>,
    surface: SurfaceBinding,
    events: EventBus,
    notifier: Notifier,
    pool: WorkerPool,
    store: Arc<dyn DocumentStore>,
    assets: Arc<dyn AssetLoader>,
    selection: Option<Arc<dyn SelectionSink>>,
}

/// One open page. Cloning shares the engine.
#[derive(Clone)]
pub struct CanvasEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for CanvasEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanvasEngine")
            .field("page", &self.inner.page)
            .field("surface", &self.inner.surface)
            .finish()
    }
}

/// Tool-dependent style of the hardware ink layer.
pub fn stroke_style_for(settings: &CanvasSettings) -> StrokeStyle {
    match settings.mode {
        ToolMode::Erase => StrokeStyle {
            pen: Pen::Marker,
            width: ERASER_STYLE_WIDTH,
            color: Color::GRAY,
        },
        ToolMode::Select => StrokeStyle {
            pen: Pen::Ballpen,
            width: SELECT_STYLE_WIDTH,
            color: Color::GRAY,
        },
        ToolMode::Draw | ToolMode::Line => {
            let setting = settings.pen_setting(settings.pen);
            StrokeStyle {
                pen: settings.pen,
                width: setting.stroke_size,
                color: setting.color,
            }
        }
    }
}

fn gesture_kind_for(settings: &CanvasSettings) -> GestureKind {
    match settings.mode {
        ToolMode::Draw => GestureKind::Draw,
        ToolMode::Line => GestureKind::Line,
        ToolMode::Erase => GestureKind::Erase(settings.eraser),
        ToolMode::Select => GestureKind::Select,
    }
}

impl CanvasEngine {
    /// Opens `page` in a `view_width` x `view_height` view and loads its
    /// content. Fails only when the raster cannot be allocated or the worker
    /// threads cannot be started.
    pub fn new(
        page: PageId,
        (view_width, view_height): (i32, i32),
        mut settings: CanvasSettings,
        services: CanvasServices,
    ) -> Result<Self> {
        if settings.sanitize() {
            tracing::warn!("canvas settings contained out-of-range values, using defaults for those");
        }
        let CanvasServices {
            store,
            undo,
            assets,
            cache,
            selection,
            notifier,
        } = services;

        let mut raster = RasterStore::new(
            page.clone(),
            RasterConfig::from_settings(&settings, view_width, view_height),
            RasterServices {
                store: Arc::clone(&store),
                assets: Arc::clone(&assets),
                cache,
                notifier: notifier.clone(),
            },
        )?;
        raster.load();

        let mut viewport = Viewport::new(view_width, view_height)
            .with_zoom_limits(settings.min_zoom, settings.max_zoom);
        viewport.scroll = raster.scroll();

        let pool = WorkerPool::new("inkcanvas-hit", settings.worker_threads)?;
        let history = HistoryBatcher::new(undo, settings.history_debounce());

        tracing::info!(page = %page, view_width, view_height, "canvas engine opened");
        Ok(Self {
            inner: Arc::new(EngineInner {
                page,
                raster: DrawingLock::new(raster),
                tracker: Mutex::new(GestureTracker::new()),
                state: Mutex::new(EngineState {
                    settings,
                    viewport,
                    drawing_enabled: true,
                }),
                history: Mutex::new(history),
                surface: SurfaceBinding::new(),
                events: EventBus::new(),
                notifier,
                pool,
                store,
                assets,
                selection,
            }),
        })
    }

    pub fn page(&self) -> &PageId {
        &self.inner.page
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn notifier(&self) -> &Notifier {
        &self.inner.notifier
    }

    pub fn settings(&self) -> CanvasSettings {
        lock(&self.inner.state).settings.clone()
    }

    pub fn viewport(&self) -> Viewport {
        let state = lock(&self.inner.state);
        let mut viewport = state.viewport;
        viewport.scroll = self.inner.raster.read(RasterStore::scroll);
        viewport
    }

    pub fn is_drawing_enabled(&self) -> bool {
        lock(&self.inner.state).drawing_enabled
    }

    pub fn layout(&self) -> PageLayout {
        self.inner.raster.read(RasterStore::layout)
    }

    pub fn scroll(&self) -> i32 {
        self.inner.raster.read(RasterStore::scroll)
    }

    pub fn height(&self) -> i32 {
        self.inner.raster.read(RasterStore::height)
    }

    pub fn strokes(&self) -> Vec<Stroke> {
        self.inner.raster.read(|raster| raster.strokes().to_vec())
    }

    pub fn images(&self) -> Vec<Image> {
        self.inner.raster.read(|raster| raster.images().to_vec())
    }

    pub fn raster_snapshot(&self) -> RasterBuffer {
        self.inner.raster.read(|raster| raster.raster().clone())
    }

    /// Runs `op` under the drawing lock, counted as a pending draw.
    pub fn with_exclusive_raster<R>(&self, op: impl FnOnce(&mut RasterStore) -> R) -> R {
        self.inner.raster.with_exclusive_raster(op)
    }

    pub fn pending_history(&self) -> usize {
        lock(&self.inner.history).pending_len()
    }

    fn report(&self, what: &str, err: anyhow::Error) {
        tracing::error!(page = %self.inner.page, error = %format!("{err:#}"), "{what}");
        self.inner.notifier.notify(what);
    }

    fn record(&self, action: HistoryAction) {
        let id = lock(&self.inner.history).enqueue(action, Instant::now());
        tracing::trace!(operation = id, "history enqueue");
    }

    // Surface

    /// Binds `surface` and opens raw drawing on it. Calls with an older token
    /// are ignored from now on.
    pub fn bind_surface(&self, surface: Arc<dyn StylusSurface>) -> SurfaceToken {
        let token = self.inner.surface.bind(Arc::clone(&surface));
        self.reopen_surface(surface.as_ref());
        token
    }

    pub fn unbind_surface(&self, token: SurfaceToken) {
        if let Some(surface) = self.inner.surface.resolve(token) {
            surface.set_raw_drawing_enabled(false);
            surface.close_raw_drawing();
        }
        self.inner.surface.unbind(token);
    }

    /// Recomputes the drawable areas and reopens raw drawing with them.
    /// Returns false for a stale token.
    pub fn update_active_surface(&self, token: SurfaceToken) -> bool {
        let Some(surface) = self.inner.surface.resolve(token) else {
            return false;
        };
        self.reopen_surface(surface.as_ref());
        true
    }

    fn restart_surface(&self) {
        if let Some(surface) = self.inner.surface.current() {
            self.reopen_surface(surface.as_ref());
        }
    }

    /// Limit rects for the stylus plus the toolbar band to exclude.
    pub fn drawable_areas(&self) -> (Vec<Rect>, Vec<Rect>) {
        let (toolbar, zoom) = {
            let state = lock(&self.inner.state);
            (state.settings.toolbar_height, state.viewport.zoom)
        };
        let (layout, scroll, (width, height)) = self
            .inner
            .raster
            .read(|raster| (raster.layout(), raster.scroll(), raster.view_size()));
        let limits = layout.drawable_rects(scroll, width, height, toolbar, zoom);
        let exclude = if toolbar > 0 {
            vec![Rect::new(0, 0, width, toolbar)]
        } else {
            Vec::new()
        };
        (limits, exclude)
    }

    fn reopen_surface(&self, surface: &dyn StylusSurface) {
        let (limits, exclude) = self.drawable_areas();
        let (enabled, style) = {
            let state = lock(&self.inner.state);
            (state.drawing_enabled, stroke_style_for(&state.settings))
        };
        surface.set_raw_drawing_enabled(false);
        surface.close_raw_drawing();
        surface.open_raw_drawing(&limits, &exclude);
        surface.set_stroke_style(style);
        if enabled {
            surface.set_raw_drawing_enabled(true);
        }
        tracing::debug!(limits = limits.len(), enabled, "raw drawing reopened");
    }

    fn push_style(&self) {
        let style = stroke_style_for(&lock(&self.inner.state).settings);
        if let Some(surface) = self.inner.surface.current() {
            surface.set_stroke_style(style);
        }
    }

    /// Hands the raster to the surface. Skipped while a draw holds the lock.
    pub fn present(&self) -> bool {
        let Some(surface) = self.inner.surface.current() else {
            return false;
        };
        let zoom = lock(&self.inner.state).viewport.zoom;
        let presented = self
            .inner
            .raster
            .try_with_exclusive_raster(|raster| surface.present(raster.raster(), zoom));
        if presented.is_none() {
            tracing::warn!("raster busy, skipping present");
        }
        presented.is_some()
    }

    /// Toggles raw drawing off and on so the panel repaints. With
    /// `force_wait`, or while a draw is pending, waits for the drawing lock
    /// first. Returns false when that wait timed out.
    pub fn refresh(&self, force_wait: bool) -> bool {
        let (timeout, enabled) = {
            let state = lock(&self.inner.state);
            (state.settings.refresh_timeout(), state.drawing_enabled)
        };
        let mut settled = true;
        if force_wait || self.inner.raster.is_busy() {
            settled = self.inner.raster.wait_until_free(timeout);
            if !settled {
                tracing::warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    pending = self.inner.raster.pending_draws(),
                    "drawing lock still held after timeout, possible deadlock; refreshing anyway"
                );
            }
        }
        let Some(surface) = self.inner.surface.current() else {
            return settled;
        };
        self.present();
        if enabled {
            surface.set_raw_drawing_enabled(false);
            surface.set_raw_drawing_enabled(true);
        }
        settled
    }

    /// Suspends or resumes raw drawing. Suspending waits for pending draws
    /// and presents the raster first.
    pub fn set_drawing(&self, enabled: bool) {
        let timeout = {
            let mut state = lock(&self.inner.state);
            if state.drawing_enabled == enabled {
                return;
            }
            state.drawing_enabled = enabled;
            state.settings.refresh_timeout()
        };
        let surface = self.inner.surface.current();
        if enabled {
            if let Some(surface) = &surface {
                surface.set_raw_drawing_enabled(true);
            }
        } else {
            if !self.inner.raster.wait_until_free(timeout) {
                tracing::warn!(timeout_ms = timeout.as_millis() as u64, "pending draw did not finish before suspend");
            }
            self.present();
            if let Some(surface) = &surface {
                surface.set_raw_drawing_enabled(false);
            }
        }
        tracing::info!(enabled, "raw drawing state changed");
        self.inner.events.publish(CanvasEvent::DrawingStateChanged(enabled));
    }

    // Setters

    pub fn set_mode(&self, mode: ToolMode) {
        lock(&self.inner.state).settings.mode = mode;
        self.push_style();
    }

    pub fn set_pen(&self, pen: Pen) {
        lock(&self.inner.state).settings.pen = pen;
        self.push_style();
    }

    pub fn set_eraser(&self, eraser: Eraser) {
        lock(&self.inner.state).settings.eraser = eraser;
        self.push_style();
    }

    pub fn set_pen_setting(&self, pen: Pen, setting: PenSetting) {
        lock(&self.inner.state).settings.pen_settings.insert(pen, setting);
        self.push_style();
    }

    pub fn set_zoom(&self, zoom: f32) {
        let applied = {
            let mut state = lock(&self.inner.state);
            state.viewport.set_zoom(zoom);
            state.viewport.zoom
        };
        tracing::debug!(requested = zoom, applied, "zoom changed");
        self.restart_surface();
        self.present();
    }

    pub fn set_toolbar_height(&self, height: i32) {
        lock(&self.inner.state).settings.toolbar_height = height.max(0);
        self.restart_surface();
    }

    pub fn set_history_debounce(&self, window: Duration) {
        lock(&self.inner.state).settings.history_debounce_ms = window.as_millis() as u64;
        lock(&self.inner.history).set_debounce(window);
    }

    // Layout

    /// Repaints the document rectangle `area` of the raster.
    pub fn draw_area(&self, area: Rect) {
        self.with_exclusive_raster(|raster| raster.draw_area(area, &[], &[], None));
    }

    /// Paints `area` into `target` without touching the raster.
    pub fn draw_area_into(
        &self,
        area: Rect,
        ignored_strokes: &[StrokeId],
        ignored_images: &[ImageId],
        target: &mut RasterBuffer,
    ) {
        self.with_exclusive_raster(|raster| {
            raster.draw_area(area, ignored_strokes, ignored_images, Some(target))
        });
    }

    pub fn redraw_all(&self) {
        self.with_exclusive_raster(RasterStore::redraw_visible);
    }

    pub fn update_dimensions(&self, view_width: i32, view_height: i32) -> Result<()> {
        let changed = self.with_exclusive_raster(|raster| raster.update_dimensions(view_width, view_height))?;
        if !changed {
            return Ok(());
        }
        {
            let mut state = lock(&self.inner.state);
            state.viewport.view_width = view_width;
            state.viewport.view_height = view_height;
        }
        self.restart_surface();
        self.present();
        Ok(())
    }

    pub fn update_pagination(&self, enabled: bool) {
        lock(&self.inner.state).settings.pagination = enabled;
        let changed = self.with_exclusive_raster(|raster| {
            let changed = raster.update_pagination(enabled);
            if changed {
                raster.request_persist(Instant::now());
            }
            changed
        });
        if changed {
            self.after_global_redraw(true);
        }
    }

    pub fn update_paper_format(&self, format: PaperFormat) {
        lock(&self.inner.state).settings.paper_format = format;
        if self.with_exclusive_raster(|raster| raster.update_paper_format(format)) {
            self.after_global_redraw(true);
        }
    }

    pub fn update_template(&self, template: Template) {
        lock(&self.inner.state).settings.template = template;
        if self.with_exclusive_raster(|raster| raster.update_template(template)) {
            self.after_global_redraw(false);
        }
    }

    fn after_global_redraw(&self, layout_changed: bool) {
        if layout_changed {
            self.restart_surface();
        }
        self.present();
        self.inner.events.publish(CanvasEvent::RefreshRequested);
    }

    /// Scrolls by `delta` and returns the applied delta.
    pub fn update_scroll(&self, delta: i32) -> i32 {
        let (applied, scroll, paginated) = self.with_exclusive_raster(|raster| {
            let applied = raster.update_scroll(delta);
            if applied != 0 {
                raster.request_persist(Instant::now());
            }
            (applied, raster.scroll(), raster.layout().is_paginated())
        });
        if applied == 0 {
            return 0;
        }
        lock(&self.inner.state).viewport.scroll = scroll;
        if paginated {
            self.restart_surface();
        }
        self.present();
        applied
    }

    // Document actions

    pub fn undo(&self) -> bool {
        let entry = lock(&self.inner.history).undo();
        self.apply_history(entry, true)
    }

    pub fn redo(&self) -> bool {
        let entry = lock(&self.inner.history).redo();
        self.apply_history(entry, false)
    }

    fn apply_history(&self, entry: Result<Option<HistoryEntry>>, undo: bool) -> bool {
        let entry = match entry {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                tracing::debug!(undo, "nothing to apply");
                return false;
            }
            Err(err) => {
                self.report("Could not save history", err);
                return false;
            }
        };
        let actions = if undo {
            entry.undo_actions()
        } else {
            entry.redo_actions()
        };
        self.with_exclusive_raster(|raster| {
            let mut dirty = Rect::default();
            for action in actions {
                match action {
                    HistoryAction::AddStrokes(strokes) => {
                        dirty = dirty.union(&content_rect(&strokes, &[]));
                        raster.add_strokes(strokes);
                    }
                    HistoryAction::RemoveStrokes(strokes) => {
                        let ids: Vec<StrokeId> = strokes.iter().map(|s| s.id.clone()).collect();
                        let removed = raster.remove_strokes(&ids);
                        dirty = dirty.union(&content_rect(&removed, &[]));
                    }
                    HistoryAction::AddImages(images) => {
                        dirty = dirty.union(&content_rect(&[], &images));
                        raster.add_images(images);
                    }
                    HistoryAction::RemoveImages(images) => {
                        let ids: Vec<ImageId> = images.iter().map(|i| i.id.clone()).collect();
                        let removed = raster.remove_images(&ids);
                        dirty = dirty.union(&content_rect(&[], &removed));
                    }
                }
            }
            if !dirty.is_empty() {
                raster.draw_area(dirty, &[], &[], None);
                raster.request_persist(Instant::now());
            }
        });
        tracing::info!(undo, operations = ?entry.operation_ids(), "history applied");
        self.present();
        self.inner.events.publish(CanvasEvent::RefreshRequested);
        true
    }

    /// Places the image from `source` centred in the view, on the next page
    /// when it would overlap a page gap, and hands it to the selection sink.
    pub fn insert_image(&self, source: &str) -> Option<ImageId> {
        let bitmap = match self.inner.assets.load(source) {
            Ok(bitmap) => bitmap,
            Err(err) => {
                tracing::error!(source, error = %format!("{err:#}"), "image insert failed");
                self.inner.notifier.notify("There was an error during image processing.");
                return None;
            }
        };
        let (layout, scroll, (view_width, view_height)) = self
            .inner
            .raster
            .read(|raster| (raster.layout(), raster.scroll(), raster.view_size()));

        let (source_width, source_height) = (bitmap.width() as i32, bitmap.height() as i32);
        if source_width == 0 || source_height == 0 {
            self.inner.notifier.notify("There was an error during image processing.");
            return None;
        }
        let width = source_width.min(view_width);
        let height = ((source_height as i64 * width as i64) / source_width as i64).max(1) as i32;
        let x = (view_width - width) / 2;
        let mut y = (scroll + (view_height - height) / 2).max(0);
        if layout.is_paginated() {
            y = layout.place_block(y, height);
        }

        let image = Image {
            id: ImageId::generate(),
            page_id: self.inner.page.clone(),
            x,
            y,
            width,
            height,
            source: source.to_owned(),
        };
        self.with_exclusive_raster(|raster| {
            raster.add_images(vec![image.clone()]);
            raster.draw_area(image.bounds(), &[], &[], None);
            raster.request_persist(Instant::now());
        });
        self.record(HistoryAction::AddImages(vec![image.clone()]));
        self.present();
        tracing::info!(image = %image.id, x, y, width, height, "image inserted");

        let id = image.id.clone();
        if let Some(sink) = &self.inner.selection {
            sink.on_selection(Selection {
                strokes: Vec::new(),
                images: vec![image],
            });
        }
        Some(id)
    }

    /// Selects what the document store holds inside the document rectangle
    /// `area`.
    pub fn select_rectangle(&self, area: Rect) -> Selection {
        let page = &self.inner.page;
        let strokes = self
            .inner
            .store
            .strokes_in_rect(page, area)
            .unwrap_or_else(|err| {
                self.report("Could not query strokes", err);
                Vec::new()
            });
        let images = self
            .inner
            .store
            .images_in_rect(page, area)
            .unwrap_or_else(|err| {
                self.report("Could not query images", err);
                Vec::new()
            });
        let selection = Selection { strokes, images };
        if selection.is_empty() {
            self.inner.notifier.notify("There isn't anything.");
        } else if let Some(sink) = &self.inner.selection {
            sink.on_selection(selection.clone());
        }
        selection
    }

    // Gestures

    fn gesture_context(&self) -> (GestureKind, Viewport, f32) {
        let state = lock(&self.inner.state);
        let size = state.settings.pen_setting(state.settings.pen).stroke_size;
        let mut viewport = state.viewport;
        viewport.scroll = self.inner.raster.read(RasterStore::scroll);
        (gesture_kind_for(&state.settings), viewport, size)
    }

    fn to_document(samples: &[RawSample], viewport: &Viewport, size: f32) -> Vec<DocumentPoint> {
        let mut points = batch_to_document_space(samples, viewport, viewport.pivot());
        for point in &mut points {
            point.size = size;
        }
        points
    }

    fn begin(&self, contact: ContactId, sample: RawSample, erase_channel: bool) {
        let mut tracker = lock(&self.inner.tracker);
        let (kind, viewport, size) = self.gesture_context();
        let (kind, gate) = if erase_channel {
            let eraser = lock(&self.inner.state).settings.eraser;
            (GestureKind::Erase(eraser), false)
        } else {
            (kind, true)
        };
        if !tracker.begin(contact, kind, gate, sample.timestamp_ms) {
            return;
        }
        let layout = self.layout();
        let points = Self::to_document(&[sample], &viewport, size);
        tracker.push(contact, &points, &layout);
    }

    fn samples(&self, contact: ContactId, samples: &[RawSample], erase_channel: bool) {
        let Some(first) = samples.first() else {
            return;
        };
        let mut tracker = lock(&self.inner.tracker);
        let standalone = tracker.is_idle();
        if standalone {
            drop(tracker);
            self.begin(contact, *first, erase_channel);
            tracker = lock(&self.inner.tracker);
        }
        let (_, viewport, size) = self.gesture_context();
        let layout = self.layout();
        let batch = if standalone { &samples[1..] } else { samples };
        if !batch.is_empty() {
            let points = Self::to_document(batch, &viewport, size);
            tracker.push(contact, &points, &layout);
        }
        if standalone {
            self.finish(&mut tracker, contact, &layout);
        }
    }

    fn end(&self, contact: ContactId, sample: Option<RawSample>) {
        let mut tracker = lock(&self.inner.tracker);
        let layout = self.layout();
        if let Some(sample) = sample {
            let (_, viewport, size) = self.gesture_context();
            let points = Self::to_document(&[sample], &viewport, size);
            tracker.push(contact, &points, &layout);
        }
        self.finish(&mut tracker, contact, &layout);
    }

    fn finish(&self, tracker: &mut GestureTracker, contact: ContactId, layout: &PageLayout) {
        match tracker.finish(contact, layout) {
            GestureOutcome::Completed(gesture) => {
                let _settle = SettleOnDrop(tracker);
                self.commit_gesture(gesture);
            }
            GestureOutcome::Rejected(reason) => {
                tracing::debug!(?contact, ?reason, "gesture rejected");
            }
            GestureOutcome::Ignored | GestureOutcome::Accepted => {}
        }
    }

    fn commit_gesture(&self, gesture: Gesture) {
        let started = Instant::now();
        let points = gesture.points.len();
        match gesture.kind {
            GestureKind::Draw => self.commit_stroke(gesture.points, false),
            GestureKind::Line => {
                let (Some(first), Some(last)) = (gesture.points.first(), gesture.points.last()) else {
                    return;
                };
                self.commit_stroke(vec![*first, *last], true);
            }
            GestureKind::Erase(eraser) => self.commit_erase(&gesture.points, eraser),
            GestureKind::Select => self.commit_lasso(&gesture.points),
        }
        tracing::debug!(
            kind = ?gesture.kind,
            points,
            elapsed_us = started.elapsed().as_micros() as u64,
            "gesture committed"
        );
    }

    fn commit_stroke(&self, points: Vec<DocumentPoint>, refresh: bool) {
        let (pen, setting) = {
            let state = lock(&self.inner.state);
            (state.settings.pen, state.settings.pen_setting(state.settings.pen))
        };
        let Some(stroke) = Stroke::new(
            self.inner.page.clone(),
            pen,
            setting.color,
            setting.stroke_size,
            points,
        ) else {
            return;
        };
        let dirty = stroke.bounds.to_rect();
        self.with_exclusive_raster(|raster| {
            raster.add_strokes(vec![stroke.clone()]);
            raster.draw_area(dirty, &[], &[], None);
            raster.request_persist(Instant::now());
        });
        self.record(HistoryAction::AddStrokes(vec![stroke]));
        if refresh {
            self.present();
            self.inner.events.publish(CanvasEvent::RefreshRequested);
        }
    }

    fn commit_erase(&self, points: &[DocumentPoint], eraser: Eraser) {
        let path: Vec<(f32, f32)> = points.iter().map(DocumentPoint::xy).collect();
        let strokes = self.strokes();
        let radius = eraser.radius();
        let hits = self
            .inner
            .pool
            .scatter(&strokes, |chunk| strokes_hit_by_path(chunk, &path, radius));
        if hits.is_empty() {
            return;
        }
        let removed = self.with_exclusive_raster(|raster| {
            let removed = raster.remove_strokes(&hits);
            if !removed.is_empty() {
                raster.draw_area(content_rect(&removed, &[]), &[], &[], None);
                raster.request_persist(Instant::now());
            }
            removed
        });
        if removed.is_empty() {
            return;
        }
        tracing::debug!(?eraser, removed = removed.len(), "strokes erased");
        self.record(HistoryAction::RemoveStrokes(removed));
        self.present();
        self.inner.events.publish(CanvasEvent::RefreshRequested);
    }

    fn commit_lasso(&self, points: &[DocumentPoint]) {
        let lasso: Vec<(f32, f32)> = points.iter().map(DocumentPoint::xy).collect();
        let (strokes, images) = self
            .inner
            .raster
            .read(|raster| (raster.strokes().to_vec(), raster.images().to_vec()));

        let ids = self
            .inner
            .pool
            .scatter(&strokes, |chunk| strokes_in_lasso(chunk, &lasso));
        let selected_strokes = strokes
            .into_iter()
            .filter(|stroke| ids.contains(&stroke.id))
            .collect();
        let selected_images = images
            .into_iter()
            .filter(|image| {
                let bounds = image.bounds();
                [
                    (bounds.left, bounds.top),
                    (bounds.right, bounds.top),
                    (bounds.left, bounds.bottom),
                    (bounds.right, bounds.bottom),
                ]
                .iter()
                .all(|&(x, y)| polygon_contains(&lasso, (x as f32, y as f32)))
            })
            .collect();
        let selection = Selection {
            strokes: selected_strokes,
            images: selected_images,
        };
        match &self.inner.selection {
            Some(sink) => sink.on_lasso(points, selection),
            None => tracing::debug!("lasso finished without a selection sink"),
        }
    }

    // Scheduling

    /// Applies one bus event. Returns false for [`CanvasEvent::Shutdown`].
    pub fn handle_event(&self, event: CanvasEvent) -> bool {
        match event {
            CanvasEvent::ForceRedraw(Some(area)) => {
                self.draw_area(area);
                self.present();
            }
            CanvasEvent::ForceRedraw(None) => {
                self.redraw_all();
                self.present();
            }
            CanvasEvent::RefreshRequested => {
                self.refresh(false);
            }
            CanvasEvent::DrawingStateChanged(enabled) => {
                if enabled != self.is_drawing_enabled() {
                    self.set_drawing(enabled);
                }
            }
            CanvasEvent::RestartAfterConfigChange => self.restart_surface(),
            CanvasEvent::CommitHistoryNow => {
                self.flush_history();
            }
            CanvasEvent::SelectRectangle(area) => {
                self.select_rectangle(area);
            }
            CanvasEvent::Shutdown => return false,
        }
        true
    }

    /// Commits history and writes snapshots whose debounce has run out.
    pub fn tick(&self, now: Instant) {
        let committed = lock(&self.inner.history).poll(now);
        match committed {
            Ok(Some(entry)) => {
                tracing::debug!(operations = ?entry.operation_ids(), "history committed");
            }
            Ok(None) => {}
            Err(err) => self.report("Could not save history", err),
        }
        let writer = self.with_exclusive_raster(|raster| raster.poll_persist(now));
        if writer.is_some() {
            tracing::debug!(page = %self.inner.page, "raster snapshot scheduled");
        }
    }

    /// Asks for an immediate history commit. The handle completes once the
    /// scheduler (or [`Self::flush_history`]) committed.
    pub fn request_history_flush(&self) -> FlushHandle {
        let handle = lock(&self.inner.history).request_flush();
        self.inner.events.publish(CanvasEvent::CommitHistoryNow);
        handle
    }

    pub fn flush_history(&self) -> Option<HistoryEntry> {
        let committed = lock(&self.inner.history).commit();
        match committed {
            Ok(entry) => entry,
            Err(err) => {
                self.report("Could not save history", err);
                None
            }
        }
    }

    /// Starts the scheduler thread that applies bus events and runs
    /// [`Self::tick`].
    pub fn spawn_scheduler(&self) -> Result<SchedulerHandle> {
        let events = self.inner.events.subscribe();
        let engine = self.clone();
        let handle = thread::Builder::new()
            .name("inkcanvas-scheduler".to_string())
            .spawn(move || {
                tracing::info!(page = %engine.inner.page, "canvas scheduler started");
                loop {
                    match events.recv_timeout(SCHEDULER_TICK) {
                        Ok(event) => {
                            if !engine.handle_event(event) {
                                break;
                            }
                        }
                        Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                    engine.tick(Instant::now());
                }
                tracing::info!(page = %engine.inner.page, "canvas scheduler stopped");
            })
            .map_err(|err| anyhow!("failed to spawn canvas scheduler thread: {err}"))?;
        Ok(SchedulerHandle {
            events: self.inner.events.clone(),
            handle: Some(handle),
        })
    }

    /// Commits pending history and writes the final snapshots. Blocks until
    /// the snapshot writers finish.
    pub fn close(&self) {
        self.flush_history();
        let writers = self.with_exclusive_raster(|raster| {
            [raster.persist(), raster.persist_thumbnail()]
        });
        for writer in writers.into_iter().flatten() {
            if writer.join().is_err() {
                tracing::error!(page = %self.inner.page, "snapshot writer panicked");
            }
        }
        if let Some(token) = self.inner.surface.token() {
            self.unbind_surface(token);
        }
        tracing::info!(page = %self.inner.page, "canvas engine closed");
    }
}

impl InputSink for CanvasEngine {
    fn on_gesture_begin(&self, contact: ContactId, sample: RawSample) {
        self.begin(contact, sample, false);
    }

    fn on_samples(&self, contact: ContactId, samples: &[RawSample]) {
        self.samples(contact, samples, false);
    }

    fn on_gesture_end(&self, contact: ContactId, sample: Option<RawSample>) {
        self.end(contact, sample);
    }

    fn on_erase_begin(&self, contact: ContactId, sample: RawSample) {
        self.begin(contact, sample, true);
    }

    fn on_erase_samples(&self, contact: ContactId, samples: &[RawSample]) {
        self.samples(contact, samples, true);
    }

    fn on_erase_end(&self, contact: ContactId, sample: Option<RawSample>) {
        self.end(contact, sample);
    }
}

/// Owns the scheduler thread; dropping it stops and joins the thread.
pub struct SchedulerHandle {
    events: EventBus,
    handle: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.events.publish(CanvasEvent::Shutdown);

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        thread::spawn(move || {
            let _ = done_tx.send(handle.join());
        });
        match done_rx.recv_timeout(SCHEDULER_JOIN_TIMEOUT) {
            Ok(Ok(())) => {}
            Ok(Err(_)) => tracing::error!("canvas scheduler panicked"),
            Err(RecvTimeoutError::Timeout) => tracing::error!("canvas scheduler join timed out"),
            Err(RecvTimeoutError::Disconnected) => {
                tracing::error!("canvas scheduler join channel disconnected")
            }
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
