use criterion::{criterion_group, criterion_main, Criterion};
use inkcanvas::canvas::raster::{RasterConfig, RasterServices};
use inkcanvas::canvas::{
    CanvasSettings, Color, DocumentPoint, FileAssetLoader, MemoryDocumentStore, Notifier, PageId,
    Pen, RasterStore, Rect, Stroke, Template,
};
use std::sync::Arc;

fn raster_with_strokes(count: usize) -> RasterStore {
    let settings = CanvasSettings {
        template: Template::Lined,
        ..CanvasSettings::default()
    };
    let mut raster = RasterStore::new(
        PageId::from("bench"),
        RasterConfig::from_settings(&settings, 1404, 1872),
        RasterServices {
            store: Arc::new(MemoryDocumentStore::new()),
            assets: Arc::new(FileAssetLoader::new()),
            cache: None,
            notifier: Notifier::new(),
        },
    )
    .expect("raster");

    let strokes = (0..count)
        .filter_map(|i| {
            let top = (i * 37 % 1800) as f32;
            let points = (0..40)
                .map(|step| DocumentPoint {
                    x: 20.0 + step as f32 * 30.0,
                    y: top + (step % 5) as f32 * 6.0,
                    pressure: 2048.0,
                    size: 5.0,
                    ..DocumentPoint::default()
                })
                .collect();
            let pen = if i % 3 == 0 { Pen::Fountain } else { Pen::Ballpen };
            Stroke::new(PageId::from("bench"), pen, Color::BLACK, 5.0, points)
        })
        .collect();
    raster.add_strokes(strokes);
    raster
}

fn bench_redraw(c: &mut Criterion) {
    let mut raster = raster_with_strokes(500);
    c.bench_function("redraw_region_300", |b| {
        b.iter(|| raster.draw_area(Rect::new(200, 400, 500, 700), &[], &[], None))
    });
    c.bench_function("redraw_full_view", |b| b.iter(|| raster.redraw_visible()));
    c.bench_function("scroll_blit_100", |b| {
        b.iter(|| {
            raster.update_scroll(100);
            raster.update_scroll(-100);
        })
    });
}

criterion_group!(benches, bench_redraw);
criterion_main!(benches);
