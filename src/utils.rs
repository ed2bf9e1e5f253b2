use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use image::io::Reader as ImageReader;
use image::{ImageResult, RgbImage};
use log::LevelFilter;

use crate::face_detection::FaceDetectionModel;

/// A detector loaded once and shared by every extraction in the process.
pub type SharedDetector = Arc<dyn FaceDetectionModel>;

/// Initialize `env_logger`, honoring `RUST_LOG` and falling back to `default_filter`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging(default_filter: LevelFilter) {
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter.as_str()),
    );
    // a logger installed earlier (e.g. by a test harness) wins
    let _ = builder.try_init();
}

/// Decode an image, picking the format from its leading bytes rather than the file name.
///
/// Whatever the source layout (grayscale, alpha, 16-bit), the result is RGB8.
pub fn load_rgb(path: &Path) -> ImageResult<RgbImage> {
    let file = File::open(path)?;
    let image = ImageReader::new(BufReader::new(file))
        .with_guessed_format()?
        .decode()?;
    Ok(image.to_rgb8())
}
