use anyhow::Result;
use inkcanvas::canvas::surface::SurfaceCall;
use inkcanvas::canvas::{
    CanvasEngine, CanvasServices, CanvasSettings, ContactId, FileAssetLoader, FileRasterCache,
    HeadlessSurface, InputSink, MemoryDocumentStore, Notifier, PageId, RasterCache, RawSample,
};
use serial_test::serial;
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn stroke(engine: &CanvasEngine, from: (f32, f32), to: (f32, f32)) {
    let contact = ContactId(7);
    engine.on_gesture_begin(contact, RawSample::at(from.0, from.1, 0));
    engine.on_gesture_end(contact, Some(RawSample::at(to.0, to.1, 16)));
}

#[test]
fn close_writes_snapshots_and_reopen_warm_starts() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let cache = Arc::new(FileRasterCache::new(dir.path()));
    let store = Arc::new(MemoryDocumentStore::new());
    let page = PageId::from("notes");

    let services = || CanvasServices {
        store: store.clone(),
        cache: Some(cache.clone() as Arc<dyn RasterCache>),
        ..CanvasServices::default()
    };

    let first = CanvasEngine::new(page.clone(), (320, 240), CanvasSettings::default(), services())?;
    stroke(&first, (20.0, 20.0), (300.0, 200.0));
    first.close();
    let drawn = first.raster_snapshot();

    assert!(cache.full_path(&page).exists());
    assert!(cache.thumbnail_path(&page).exists());
    let thumb = image::open(cache.thumbnail_path(&page))?;
    assert_eq!(thumb.width(), 500);
    assert_eq!(thumb.height(), 375);

    let reopened = CanvasEngine::new(page, (320, 240), CanvasSettings::default(), services())?;
    assert_eq!(reopened.strokes().len(), 1);
    assert_eq!(reopened.raster_snapshot(), drawn);
    Ok(())
}

#[test]
#[serial]
fn debounced_persist_writes_once_quiet() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let cache = Arc::new(FileRasterCache::new(dir.path()));
    let engine = CanvasEngine::new(
        PageId::from("p"),
        (100, 100),
        CanvasSettings::default(),
        CanvasServices {
            cache: Some(cache.clone() as Arc<dyn RasterCache>),
            ..CanvasServices::default()
        },
    )?;
    stroke(&engine, (10.0, 10.0), (90.0, 90.0));

    engine.tick(Instant::now());
    assert!(!cache.full_path(&PageId::from("p")).exists());

    engine.tick(Instant::now() + Duration::from_millis(1100));
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cache.full_path(&PageId::from("p")).exists() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(cache.full_path(&PageId::from("p")).exists());
    Ok(())
}

#[test]
#[serial]
fn refresh_gives_up_waiting_after_timeout() -> Result<()> {
    let settings = CanvasSettings {
        refresh_timeout_ms: 100,
        ..CanvasSettings::default()
    };
    let engine = CanvasEngine::new(PageId::from("p"), (100, 100), settings, CanvasServices::default())?;
    let surface = Arc::new(HeadlessSurface::new());
    engine.bind_surface(surface.clone());
    surface.take_calls();

    let (entered_tx, entered_rx) = channel();
    let holder = {
        let engine = engine.clone();
        std::thread::spawn(move || {
            engine.with_exclusive_raster(|_| {
                let _ = entered_tx.send(());
                std::thread::sleep(Duration::from_millis(600));
            });
        })
    };
    entered_rx.recv()?;

    let started = Instant::now();
    assert!(!engine.refresh(true));
    let waited = started.elapsed();
    assert!(waited >= Duration::from_millis(100));
    assert!(waited < Duration::from_millis(550));

    let calls = surface.take_calls();
    assert_eq!(
        &calls[calls.len() - 2..],
        &[SurfaceCall::SetRawDrawing(false), SurfaceCall::SetRawDrawing(true)]
    );
    holder.join().expect("holder thread");

    assert!(engine.refresh(true));
    Ok(())
}

#[test]
fn inserted_image_is_centred_and_recorded() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let picture = image::RgbaImage::from_pixel(100, 50, image::Rgba([0, 0, 0, 255]));
    picture.save(dir.path().join("dot.png"))?;

    let engine = CanvasEngine::new(
        PageId::from("p"),
        (400, 300),
        CanvasSettings::default(),
        CanvasServices {
            assets: Arc::new(FileAssetLoader::with_root(dir.path())),
            ..CanvasServices::default()
        },
    )?;
    let id = engine.insert_image("dot.png").expect("image inserted");
    let images = engine.images();
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].id, id);
    assert_eq!((images[0].x, images[0].y), (150, 125));
    assert_eq!(engine.pending_history(), 1);
    assert_eq!(
        engine.raster_snapshot().pixel(200, 150),
        inkcanvas::canvas::Color::BLACK
    );
    Ok(())
}

#[test]
fn failed_image_insert_notifies_and_changes_nothing() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let log = dir.path().join("notifications.log");
    let notifier = Notifier::with_log_file(&log);
    let notes = notifier.subscribe();
    let engine = CanvasEngine::new(
        PageId::from("p"),
        (200, 200),
        CanvasSettings::default(),
        CanvasServices {
            notifier,
            ..CanvasServices::default()
        },
    )?;

    assert!(engine.insert_image("/definitely/missing.png").is_none());
    assert!(engine.images().is_empty());
    assert_eq!(engine.pending_history(), 0);
    assert_eq!(
        notes.try_recv()?.text,
        "There was an error during image processing."
    );
    let logged = std::fs::read_to_string(&log)?;
    assert!(logged.contains("There was an error during image processing."));
    Ok(())
}
