//! Collaborators the canvas persists through and loads assets from.

use crate::canvas::geometry::Rect;
use crate::canvas::model::{Image, ImageId, PageId, Stroke, StrokeId};
use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Everything stored for one page.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PageContent {
    pub strokes: Vec<Stroke>,
    pub images: Vec<Image>,
    pub scroll: i32,
}

/// Document persistence. Implementations must be callable from any thread.
pub trait DocumentStore: Send + Sync {
    fn load_page(&self, page: &PageId) -> Result<PageContent>;
    fn create_strokes(&self, strokes: &[Stroke]) -> Result<()>;
    fn update_strokes(&self, strokes: &[Stroke]) -> Result<()>;
    fn delete_strokes(&self, page: &PageId, ids: &[StrokeId]) -> Result<()>;
    fn create_images(&self, images: &[Image]) -> Result<()>;
    fn update_images(&self, images: &[Image]) -> Result<()>;
    fn delete_images(&self, page: &PageId, ids: &[ImageId]) -> Result<()>;
    fn strokes_in_rect(&self, page: &PageId, rect: Rect) -> Result<Vec<Stroke>>;
    fn images_in_rect(&self, page: &PageId, rect: Rect) -> Result<Vec<Image>>;
    fn update_scroll_offset(&self, page: &PageId, scroll: i32) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    pages: Mutex<HashMap<PageId, PageContent>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(page: PageId, content: PageContent) -> Self {
        let store = Self::default();
        store.lock().insert(page, content);
        store
    }

    pub fn page(&self, page: &PageId) -> PageContent {
        self.lock().get(page).cloned().unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PageId, PageContent>> {
        self.pages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn load_page(&self, page: &PageId) -> Result<PageContent> {
        Ok(self.page(page))
    }

    fn create_strokes(&self, strokes: &[Stroke]) -> Result<()> {
        let mut pages = self.lock();
        for stroke in strokes {
            pages
                .entry(stroke.page_id.clone())
                .or_default()
                .strokes
                .push(stroke.clone());
        }
        Ok(())
    }

    fn update_strokes(&self, strokes: &[Stroke]) -> Result<()> {
        let mut pages = self.lock();
        for stroke in strokes {
            let content = pages.entry(stroke.page_id.clone()).or_default();
            match content.strokes.iter_mut().find(|s| s.id == stroke.id) {
                Some(existing) => *existing = stroke.clone(),
                None => return Err(anyhow!("stroke {} not found", stroke.id)),
            }
        }
        Ok(())
    }

    fn delete_strokes(&self, page: &PageId, ids: &[StrokeId]) -> Result<()> {
        if let Some(content) = self.lock().get_mut(page) {
            content.strokes.retain(|stroke| !ids.contains(&stroke.id));
        }
        Ok(())
    }

    fn create_images(&self, images: &[Image]) -> Result<()> {
        let mut pages = self.lock();
        for image in images {
            pages
                .entry(image.page_id.clone())
                .or_default()
                .images
                .push(image.clone());
        }
        Ok(())
    }

    fn update_images(&self, images: &[Image]) -> Result<()> {
        let mut pages = self.lock();
        for image in images {
            let content = pages.entry(image.page_id.clone()).or_default();
            match content.images.iter_mut().find(|i| i.id == image.id) {
                Some(existing) => *existing = image.clone(),
                None => return Err(anyhow!("image {} not found", image.id)),
            }
        }
        Ok(())
    }

    fn delete_images(&self, page: &PageId, ids: &[ImageId]) -> Result<()> {
        if let Some(content) = self.lock().get_mut(page) {
            content.images.retain(|image| !ids.contains(&image.id));
        }
        Ok(())
    }

    fn strokes_in_rect(&self, page: &PageId, rect: Rect) -> Result<Vec<Stroke>> {
        Ok(self
            .lock()
            .get(page)
            .map(|content| {
                content
                    .strokes
                    .iter()
                    .filter(|stroke| stroke.bounds.intersects_rect(&rect))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn images_in_rect(&self, page: &PageId, rect: Rect) -> Result<Vec<Image>> {
        Ok(self
            .lock()
            .get(page)
            .map(|content| {
                content
                    .images
                    .iter()
                    .filter(|image| image.bounds().intersects(&rect))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn update_scroll_offset(&self, page: &PageId, scroll: i32) -> Result<()> {
        self.lock().entry(page.clone()).or_default().scroll = scroll;
        Ok(())
    }
}

/// Decodes image sources into RGBA bitmaps.
pub trait AssetLoader: Send + Sync {
    fn load(&self, source: &str) -> Result<Arc<image::RgbaImage>>;
}

/// Loads image files from disk, relative to `root` when one is set, keeping
/// decoded bitmaps for reuse.
#[derive(Debug, Default)]
pub struct FileAssetLoader {
    root: Option<PathBuf>,
    decoded: Mutex<HashMap<String, Arc<image::RgbaImage>>>,
}

impl FileAssetLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            decoded: Mutex::new(HashMap::new()),
        }
    }

    fn resolve(&self, source: &str) -> PathBuf {
        let source = source.strip_prefix("file://").unwrap_or(source);
        match &self.root {
            Some(root) => root.join(source),
            None => PathBuf::from(source),
        }
    }
}

impl AssetLoader for FileAssetLoader {
    fn load(&self, source: &str) -> Result<Arc<image::RgbaImage>> {
        if let Some(hit) = self
            .decoded
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(source)
        {
            return Ok(Arc::clone(hit));
        }
        let path = self.resolve(source);
        let decoded = image::open(&path)
            .with_context(|| format!("decode image {}", path.display()))?
            .to_rgba8();
        let decoded = Arc::new(decoded);
        self.decoded
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(source.to_owned(), Arc::clone(&decoded));
        Ok(decoded)
    }
}
