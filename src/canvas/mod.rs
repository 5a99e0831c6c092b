//! Incremental raster ink canvas for e-ink stylus surfaces.

pub mod buffer;
pub mod debounce;
pub mod engine;
pub mod erase;
pub mod events;
pub mod geometry;
pub mod history;
pub mod input;
pub mod lock;
pub mod model;
pub mod notify;
pub mod pagination;
pub mod persist;
pub mod pool;
pub mod raster;
pub mod render;
pub mod selection;
pub mod settings;
pub mod settings_store;
pub mod store;
pub mod surface;
pub mod transform;

pub use buffer::{DirtyRegion, RasterBuffer};
pub use engine::{CanvasEngine, CanvasServices, SchedulerHandle};
pub use events::{CanvasEvent, EventBus};
pub use geometry::{BoundingBox, Rect};
pub use history::{HistoryAction, HistoryBatcher, HistoryEntry, MemoryUndoStore, UndoStore};
pub use input::{ContactId, InputSink};
pub use model::{Color, DocumentPoint, Eraser, Image, ImageId, PageId, Pen, PenSetting, RawSample, Stroke, StrokeId, ToolMode};
pub use notify::{Notification, Notifier};
pub use pagination::{PageLayout, PaperFormat};
pub use persist::{FileRasterCache, RasterCache};
pub use raster::RasterStore;
pub use render::Template;
pub use selection::{Selection, SelectionSink};
pub use settings::CanvasSettings;
pub use store::{AssetLoader, DocumentStore, FileAssetLoader, MemoryDocumentStore, PageContent};
pub use surface::{HeadlessSurface, StylusSurface, SurfaceToken};
pub use transform::Viewport;
