//! Raster snapshots for fast reopen and page previews.

use crate::canvas::buffer::RasterBuffer;
use crate::canvas::model::PageId;
use crate::canvas::notify::Notifier;
use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::ImageFormat;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Blob storage for page snapshots, keyed by page.
pub trait RasterCache: Send + Sync {
    fn store_full(&self, page: &PageId, png: &[u8]) -> Result<()>;
    fn store_thumbnail(&self, page: &PageId, jpeg: &[u8]) -> Result<()>;
    fn load_full(&self, page: &PageId) -> Result<Option<Vec<u8>>>;
}

/// Snapshots under `<root>/pages/previews/{full,thumbs}/`.
#[derive(Debug, Clone)]
pub struct FileRasterCache {
    root: PathBuf,
}

impl FileRasterCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn full_path(&self, page: &PageId) -> PathBuf {
        self.root
            .join("pages")
            .join("previews")
            .join("full")
            .join(format!("{page}.png"))
    }

    pub fn thumbnail_path(&self, page: &PageId) -> PathBuf {
        self.root
            .join("pages")
            .join("previews")
            .join("thumbs")
            .join(format!("{page}.jpg"))
    }
}

fn write_blob(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create snapshot folder {}", parent.display()))?;
    }
    std::fs::write(path, bytes).with_context(|| format!("write snapshot {}", path.display()))
}

impl RasterCache for FileRasterCache {
    fn store_full(&self, page: &PageId, png: &[u8]) -> Result<()> {
        write_blob(&self.full_path(page), png)
    }

    fn store_thumbnail(&self, page: &PageId, jpeg: &[u8]) -> Result<()> {
        write_blob(&self.thumbnail_path(page), jpeg)
    }

    fn load_full(&self, page: &PageId) -> Result<Option<Vec<u8>>> {
        let path = self.full_path(page);
        if !path.exists() {
            return Ok(None);
        }
        std::fs::read(&path)
            .map(Some)
            .with_context(|| format!("read snapshot {}", path.display()))
    }
}

pub fn encode_png(raster: &RasterBuffer) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    raster
        .to_image()
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .context("encode raster snapshot as png")?;
    Ok(bytes)
}

/// Downscales to `width` keeping the aspect ratio and encodes as JPEG.
pub fn encode_thumbnail(raster: &RasterBuffer, width: u32, quality: u8) -> Result<Vec<u8>> {
    if raster.width() == 0 || raster.height() == 0 {
        return Err(anyhow!("cannot thumbnail an empty raster"));
    }
    let height = ((raster.height() as u64 * width as u64) / raster.width() as u64).max(1) as u32;
    let scaled = image::imageops::resize(&raster.to_image(), width, height, FilterType::Triangle);
    let rgb = image::DynamicImage::ImageRgba8(scaled).to_rgb8();

    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut Cursor::new(&mut bytes), quality)
        .encode_image(&rgb)
        .context("encode raster thumbnail as jpeg")?;
    Ok(bytes)
}

pub fn decode_snapshot(bytes: &[u8]) -> Result<image::RgbaImage> {
    Ok(image::load_from_memory(bytes)
        .context("decode cached raster snapshot")?
        .to_rgba8())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    Full,
    Thumbnail { width: u32, quality: u8 },
}

/// Encodes and stores `snapshot` on a background thread. Failures are logged
/// and reported through `notifier`; the caller never waits.
pub fn spawn_snapshot_writer(
    cache: Arc<dyn RasterCache>,
    page: PageId,
    snapshot: RasterBuffer,
    kind: SnapshotKind,
    notifier: Notifier,
) -> Option<JoinHandle<()>> {
    let spawned = thread::Builder::new()
        .name("inkcanvas-persist".to_string())
        .spawn(move || {
            let result = match kind {
                SnapshotKind::Full => {
                    encode_png(&snapshot).and_then(|png| cache.store_full(&page, &png))
                }
                SnapshotKind::Thumbnail { width, quality } => {
                    encode_thumbnail(&snapshot, width, quality)
                        .and_then(|jpeg| cache.store_thumbnail(&page, &jpeg))
                }
            };
            match result {
                Ok(()) => tracing::debug!(page = %page, ?kind, "raster snapshot stored"),
                Err(err) => {
                    tracing::error!(page = %page, ?kind, error = %format!("{err:#}"), "raster snapshot failed");
                    notifier.notify("Could not save page preview");
                }
            }
        });
    match spawned {
        Ok(handle) => Some(handle),
        Err(err) => {
            tracing::error!(error = %err, "failed to spawn snapshot writer thread");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::model::Color;

    fn raster() -> RasterBuffer {
        RasterBuffer::try_new(1000, 400, Color::rgba(10, 200, 30, 255)).expect("raster")
    }

    #[test]
    fn png_snapshot_decodes_to_same_pixels() {
        let raster = raster();
        let decoded = decode_snapshot(&encode_png(&raster).expect("png")).expect("decode");
        assert_eq!(decoded.dimensions(), raster.size());
        assert_eq!(decoded.as_raw().as_slice(), raster.pixels());
    }

    #[test]
    fn thumbnail_keeps_aspect_ratio() {
        let jpeg = encode_thumbnail(&raster(), 500, 80).expect("jpeg");
        let decoded = decode_snapshot(&jpeg).expect("decode");
        assert_eq!(decoded.dimensions(), (500, 200));
    }

    #[test]
    fn file_cache_roundtrip_and_missing_page() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cache = FileRasterCache::new(dir.path());
        let page = PageId::from("page-1");
        assert_eq!(cache.load_full(&page).expect("load"), None);

        cache.store_full(&page, b"png-bytes").expect("store");
        assert_eq!(cache.load_full(&page).expect("load"), Some(b"png-bytes".to_vec()));
        assert!(cache.full_path(&page).ends_with("pages/previews/full/page-1.png"));
    }

    #[test]
    fn writer_thread_stores_both_snapshot_kinds() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cache = Arc::new(FileRasterCache::new(dir.path()));
        let page = PageId::from("p");
        for kind in [
            SnapshotKind::Full,
            SnapshotKind::Thumbnail {
                width: 100,
                quality: 80,
            },
        ] {
            spawn_snapshot_writer(cache.clone(), page.clone(), raster(), kind, Notifier::new())
                .expect("spawn")
                .join()
                .expect("join");
        }
        assert!(cache.full_path(&page).exists());
        assert!(cache.thumbnail_path(&page).exists());
    }
}
