//! Feeds a JSON gesture script through a headless canvas and writes the
//! resulting raster as PNG.
//!
//! ```text
//! inkcanvas-replay <script.json> <out.png> [--settings <file>] [--cache <dir>] [--debug]
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use inkcanvas::canvas::persist::encode_png;
use inkcanvas::canvas::{
    settings_store, CanvasEngine, CanvasServices, CanvasSettings, ContactId, Eraser,
    FileAssetLoader, FileRasterCache, HeadlessSurface, InputSink, PageId, PaperFormat, Pen,
    RawSample, Template, ToolMode,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct Script {
    #[serde(default = "default_page")]
    page: String,
    #[serde(default = "default_width")]
    width: i32,
    #[serde(default = "default_height")]
    height: i32,
    #[serde(default)]
    steps: Vec<Step>,
}

fn default_page() -> String {
    "replay".to_string()
}

fn default_width() -> i32 {
    1000
}

fn default_height() -> i32 {
    1000
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct ScriptSample {
    x: f32,
    y: f32,
    #[serde(default = "default_pressure")]
    pressure: f32,
    #[serde(default)]
    t: u64,
}

fn default_pressure() -> f32 {
    4096.0
}

impl From<ScriptSample> for RawSample {
    fn from(sample: ScriptSample) -> Self {
        RawSample {
            pressure: sample.pressure,
            ..RawSample::at(sample.x, sample.y, sample.t)
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Step {
    Mode { mode: ToolMode },
    Pen { pen: Pen },
    Eraser { eraser: Eraser },
    Zoom { zoom: f32 },
    Gesture { points: Vec<ScriptSample> },
    Erase { points: Vec<ScriptSample> },
    Scroll { delta: i32 },
    Pagination { enabled: bool },
    PaperFormat { format: PaperFormat },
    Template { template: Template },
    Image { source: String },
    Undo,
    Redo,
    Flush,
}

/// Replays a JSON gesture script through a headless canvas.
#[derive(Parser, Debug)]
#[command(name = "inkcanvas-replay", version, about)]
struct Args {
    /// Gesture script to replay.
    script: PathBuf,

    /// Where to write the resulting raster as PNG.
    output: PathBuf,

    /// Canvas settings file; defaults are used when omitted.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Directory for full and thumbnail snapshots.
    #[arg(long)]
    cache: Option<PathBuf>,

    /// Enable debug logging (honours RUST_LOG).
    #[arg(long)]
    debug: bool,
}

fn feed(engine: &CanvasEngine, contact: ContactId, points: &[ScriptSample], erase: bool) {
    let Some((first, rest)) = points.split_first() else {
        return;
    };
    let rest: Vec<RawSample> = rest.iter().copied().map(RawSample::from).collect();
    if erase {
        engine.on_erase_begin(contact, (*first).into());
        engine.on_erase_samples(contact, &rest);
        engine.on_erase_end(contact, None);
    } else {
        engine.on_gesture_begin(contact, (*first).into());
        engine.on_samples(contact, &rest);
        engine.on_gesture_end(contact, None);
    }
}

fn run_step(engine: &CanvasEngine, index: usize, step: Step) {
    let contact = ContactId(index as u32);
    match step {
        Step::Mode { mode } => engine.set_mode(mode),
        Step::Pen { pen } => engine.set_pen(pen),
        Step::Eraser { eraser } => engine.set_eraser(eraser),
        Step::Zoom { zoom } => engine.set_zoom(zoom),
        Step::Gesture { points } => feed(engine, contact, &points, false),
        Step::Erase { points } => feed(engine, contact, &points, true),
        Step::Scroll { delta } => {
            engine.update_scroll(delta);
        }
        Step::Pagination { enabled } => engine.update_pagination(enabled),
        Step::PaperFormat { format } => engine.update_paper_format(format),
        Step::Template { template } => engine.update_template(template),
        Step::Image { source } => {
            engine.insert_image(&source);
        }
        Step::Undo => {
            engine.undo();
        }
        Step::Redo => {
            engine.redo();
        }
        Step::Flush => {
            engine.flush_history();
        }
    }
}

fn load_settings(path: Option<&Path>) -> Result<CanvasSettings> {
    match path {
        Some(path) => settings_store::load_from_path(path),
        None => Ok(CanvasSettings::default()),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let settings = load_settings(args.settings.as_deref())?;
    inkcanvas::logging::init(args.debug || settings.debug);

    let raw = std::fs::read_to_string(&args.script)
        .with_context(|| format!("read replay script {}", args.script.display()))?;
    let script: Script = serde_json::from_str(&raw)
        .with_context(|| format!("parse replay script {}", args.script.display()))?;
    if script.width <= 0 || script.height <= 0 {
        bail!("script view size must be positive, got {}x{}", script.width, script.height);
    }

    let assets_root = args
        .script
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let services = CanvasServices {
        assets: Arc::new(FileAssetLoader::with_root(assets_root)),
        cache: args
            .cache
            .as_ref()
            .map(|dir| Arc::new(FileRasterCache::new(dir)) as Arc<dyn inkcanvas::canvas::RasterCache>),
        ..CanvasServices::default()
    };
    let engine = CanvasEngine::new(
        PageId::from(script.page.as_str()),
        (script.width, script.height),
        settings,
        services,
    )?;
    let surface = Arc::new(HeadlessSurface::new());
    engine.bind_surface(surface.clone());

    let steps = script.steps.len();
    for (index, step) in script.steps.into_iter().enumerate() {
        run_step(&engine, index + 1, step);
    }
    engine.close();

    let png = encode_png(&engine.raster_snapshot())?;
    std::fs::write(&args.output, png)
        .with_context(|| format!("write replay output {}", args.output.display()))?;
    tracing::info!(
        steps,
        strokes = engine.strokes().len(),
        surface_calls = surface.calls().len(),
        output = %args.output.display(),
        "replay finished"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_and_positionals_parse() {
        let args = Args::try_parse_from([
            "inkcanvas-replay",
            "script.json",
            "out.png",
            "--cache",
            "snapshots",
            "--debug",
        ])
        .expect("args");
        assert_eq!(args.script, PathBuf::from("script.json"));
        assert_eq!(args.output, PathBuf::from("out.png"));
        assert_eq!(args.cache, Some(PathBuf::from("snapshots")));
        assert!(args.settings.is_none());
        assert!(args.debug);
    }

    #[test]
    fn settings_flag_without_value_is_a_usage_error() {
        let parsed = Args::try_parse_from(["inkcanvas-replay", "script.json", "out.png", "--settings"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn missing_output_is_a_usage_error() {
        assert!(Args::try_parse_from(["inkcanvas-replay", "script.json"]).is_err());
    }
}
