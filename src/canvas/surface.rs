//! Binding to the hardware stylus surface.
//!
//! The surface is bound once and addressed through the [`SurfaceToken`] the
//! binding returns. Calls carrying a token from an earlier binding are dropped.

use crate::canvas::buffer::RasterBuffer;
use crate::canvas::geometry::Rect;
use crate::canvas::model::{Color, Pen};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrokeStyle {
    pub pen: Pen,
    pub width: f32,
    pub color: Color,
}

/// Hardware raw-drawing layer of an e-ink panel.
pub trait StylusSurface: Send + Sync {
    fn set_raw_drawing_enabled(&self, enabled: bool);
    fn open_raw_drawing(&self, limits: &[Rect], exclude: &[Rect]);
    fn close_raw_drawing(&self);
    fn set_stroke_style(&self, style: StrokeStyle);
    /// Shows `frame` scaled by `zoom` around the view centre.
    fn present(&self, frame: &RasterBuffer, zoom: f32);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceToken(u64);

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

#[derive(Clone)]
struct Bound {
    token: SurfaceToken,
    surface: Arc<dyn StylusSurface>,
}

/// Holds the currently bound surface.
#[derive(Clone, Default)]
pub struct SurfaceBinding {
    current: Arc<Mutex<Option<Bound>>>,
}

impl std::fmt::Debug for SurfaceBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceBinding")
            .field("token", &self.token())
            .finish()
    }
}

impl SurfaceBinding {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `surface`, invalidating any earlier token.
    pub fn bind(&self, surface: Arc<dyn StylusSurface>) -> SurfaceToken {
        let token = SurfaceToken(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed));
        *self.lock() = Some(Bound { token, surface });
        tracing::info!(token = token.0, "stylus surface bound");
        token
    }

    pub fn unbind(&self, token: SurfaceToken) {
        let mut current = self.lock();
        if current.as_ref().is_some_and(|bound| bound.token == token) {
            *current = None;
        }
    }

    pub fn token(&self) -> Option<SurfaceToken> {
        self.lock().as_ref().map(|bound| bound.token)
    }

    /// The bound surface if `token` is still current.
    pub fn resolve(&self, token: SurfaceToken) -> Option<Arc<dyn StylusSurface>> {
        let current = self.lock();
        match current.as_ref() {
            Some(bound) if bound.token == token => Some(Arc::clone(&bound.surface)),
            _ => {
                tracing::debug!(token = token.0, "ignoring stale surface token");
                None
            }
        }
    }

    /// The bound surface regardless of token, for engine-internal calls.
    pub fn current(&self) -> Option<Arc<dyn StylusSurface>> {
        self.lock().as_ref().map(|bound| Arc::clone(&bound.surface))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Bound>> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Surface call as seen by [`HeadlessSurface`].
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceCall {
    SetRawDrawing(bool),
    Open { limits: Vec<Rect>, exclude: Vec<Rect> },
    Close,
    Style(StrokeStyle),
    Present { zoom: f32, size: (u32, u32) },
}

/// Surface without a panel: records every call and keeps the last frame.
#[derive(Debug, Default)]
pub struct HeadlessSurface {
    calls: Mutex<Vec<SurfaceCall>>,
    last_frame: Mutex<Option<RasterBuffer>>,
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn take_calls(&self) -> Vec<SurfaceCall> {
        std::mem::take(
            &mut *self
                .calls
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
    }

    pub fn last_frame(&self) -> Option<RasterBuffer> {
        self.last_frame
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn record(&self, call: SurfaceCall) {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(call);
    }
}

impl StylusSurface for HeadlessSurface {
    fn set_raw_drawing_enabled(&self, enabled: bool) {
        self.record(SurfaceCall::SetRawDrawing(enabled));
    }

    fn open_raw_drawing(&self, limits: &[Rect], exclude: &[Rect]) {
        self.record(SurfaceCall::Open {
            limits: limits.to_vec(),
            exclude: exclude.to_vec(),
        });
    }

    fn close_raw_drawing(&self) {
        self.record(SurfaceCall::Close);
    }

    fn set_stroke_style(&self, style: StrokeStyle) {
        self.record(SurfaceCall::Style(style));
    }

    fn present(&self, frame: &RasterBuffer, zoom: f32) {
        self.record(SurfaceCall::Present {
            zoom,
            size: frame.size(),
        });
        *self
            .last_frame
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(frame.clone());
    }
}
