use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use facebatch::{
    init_logging, BlazefaceModel, FaceExtractor, FailurePolicy, ModelVariant, Settings,
    SharedDetector, WorkdirPolicy,
};

/// Detect faces in an image or a zip archive of images and print their boxes as JSON.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to an image file or a zip archive of images.
    #[arg(short, long)]
    input: PathBuf,

    /// Path to the BlazeFace ONNX model (overrides the settings file).
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Optional settings JSON.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Model variant: short-range or full-range.
    #[arg(long)]
    variant: Option<ModelVariant>,

    /// Minimum detection confidence in [0, 1].
    #[arg(long)]
    min_confidence: Option<f32>,

    /// Report undecodable archive entries per image instead of failing.
    #[arg(long)]
    isolate_failures: bool,

    /// Unpack archives into this fixed directory instead of a temporary one.
    /// Its previous contents are deleted.
    #[arg(long)]
    workdir: Option<PathBuf>,

    /// Process archive entries in parallel.
    #[arg(long)]
    parallel: bool,

    /// Write the result to a JSON file instead of stdout.
    #[arg(long)]
    json: Option<PathBuf>,
}

fn main() -> Result<()> {
    init_logging(log::LevelFilter::Info);
    let args = Args::parse();

    let mut settings = match args.config.as_ref() {
        Some(path) => Settings::load_from_path(path)?,
        None => Settings::default(),
    };
    apply_overrides(&mut settings, &args);
    settings.validate()?;

    let detector: SharedDetector = Arc::new(
        BlazefaceModel::new(&settings.model)
            .with_context(|| format!("failed to load {}", settings.model.path.display()))?,
    );
    let extractor = FaceExtractor::new(detector, settings.extraction.clone());

    let report = extractor.run(&args.input)?;
    let result = serde_json::to_value(&report).context("failed to serialize faces")?;

    match args.json.as_ref() {
        Some(json_path) => {
            if let Some(dir) = json_path.parent().filter(|d| !d.as_os_str().is_empty()) {
                fs::create_dir_all(dir)
                    .with_context(|| format!("failed to create directory {}", dir.display()))?;
            }
            let file = File::create(json_path)
                .with_context(|| format!("failed to create {}", json_path.display()))?;
            serde_json::to_writer_pretty(file, &result)
                .with_context(|| format!("failed to write {}", json_path.display()))?;
            info!("Wrote faces to {}", json_path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&result)?),
    }

    Ok(())
}

fn apply_overrides(settings: &mut Settings, args: &Args) {
    if let Some(model) = args.model.as_ref() {
        settings.model.path = model.clone();
    }
    if let Some(variant) = args.variant {
        settings.model.variant = variant;
    }
    if let Some(confidence) = args.min_confidence {
        settings.model.min_confidence = confidence;
    }
    if args.isolate_failures {
        settings.extraction.failure_policy = FailurePolicy::Isolate;
    }
    if let Some(dir) = args.workdir.as_ref() {
        settings.extraction.workdir = WorkdirPolicy::Fixed { path: dir.clone() };
    }
    if args.parallel {
        settings.extraction.parallel = true;
    }
}
