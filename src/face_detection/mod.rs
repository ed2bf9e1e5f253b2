pub mod model_blazeface;

use std::path::PathBuf;
use std::sync::Mutex;

use thiserror::Error;

use crate::face::Detection;

/// Errors raised by a detection backend.
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("pixel buffer holds {actual} bytes, expected {expected} for a {width}x{height} RGB image")]
    BufferSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("image has zero width or height")]
    EmptyImage,

    #[error("failed to load model from {path}: {source}")]
    ModelLoad {
        path: PathBuf,
        #[source]
        source: ort::OrtError,
    },

    #[error("failed to read anchors from {path}: {source}")]
    Anchors {
        path: PathBuf,
        #[source]
        source: ndarray_npy::ReadNpyError,
    },

    #[error("inference failed: {0}")]
    Runtime(#[from] ort::OrtError),

    #[error("unexpected model output: {0}")]
    Output(String),

    #[error("detector session lock poisoned")]
    Poisoned,
}

/// A face detector that can be plugged into the extractor.
///
/// `pixels` is an interleaved, row-major RGB8 buffer of exactly
/// `width * height * 3` bytes. Implementations return an empty vector when no
/// face clears their confidence threshold.
pub trait FaceDetectionModel: Send + Sync {
    fn detect(&self, pixels: &[u8], width: u32, height: u32)
        -> Result<Vec<Detection>, DetectionError>;
}

/// Checks that a pixel buffer matches the dimensions it claims.
pub fn check_rgb_buffer(pixels: &[u8], width: u32, height: u32) -> Result<(), DetectionError> {
    if width == 0 || height == 0 {
        return Err(DetectionError::EmptyImage);
    }
    let expected = width as usize * height as usize * 3;
    if pixels.len() != expected {
        return Err(DetectionError::BufferSize {
            width,
            height,
            expected,
            actual: pixels.len(),
        });
    }
    Ok(())
}

/// Detector returning canned detections, for tests and dry runs.
///
/// Detections can be keyed by image size so that different images in one
/// archive get different answers; images of any other size get the default
/// list. Every call is recorded.
#[derive(Debug, Default)]
pub struct FixedDetections {
    default: Vec<Detection>,
    by_size: Vec<((u32, u32), Vec<Detection>)>,
    calls: Mutex<Vec<(u32, u32)>>,
}

impl FixedDetections {
    pub fn new(default: Vec<Detection>) -> Self {
        Self {
            default,
            ..Self::default()
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn for_size(mut self, width: u32, height: u32, detections: Vec<Detection>) -> Self {
        self.by_size.push(((width, height), detections));
        self
    }

    /// Image sizes seen so far, in call order.
    pub fn calls(&self) -> Vec<(u32, u32)> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

impl FaceDetectionModel for FixedDetections {
    fn detect(
        &self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<Detection>, DetectionError> {
        check_rgb_buffer(pixels, width, height)?;
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((width, height));
        }
        let detections = self
            .by_size
            .iter()
            .find(|(size, _)| *size == (width, height))
            .map(|(_, detections)| detections)
            .unwrap_or(&self.default);
        Ok(detections.clone())
    }
}
