//! Shared helpers for extractor integration tests.
#![allow(dead_code)]

use std::fs::File;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{ImageBuffer, ImageFormat, Rgb};
use zip::write::FileOptions;

use facebatch::{Detection, ExtractionSettings, FaceExtractor, FixedDetections};

/// Candidate locations of the BlazeFace model used by the model-backed tests.
pub fn find_model_path() -> Option<PathBuf> {
    [
        "models/face_detection_back_256x256_float32.onnx",
        "../models/face_detection_back_256x256_float32.onnx",
    ]
    .into_iter()
    .map(PathBuf::from)
    .find(|p| p.exists())
}

/// Encodes a gradient test image of the given size.
pub fn image_bytes(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = ImageBuffer::from_fn(width, height, |x, y| {
        let r = ((x + y) % 255) as u8;
        Rgb([r, 128, 255u8.saturating_sub(r)])
    });
    let mut bytes = Cursor::new(Vec::new());
    img.write_to(&mut bytes, format).expect("encode test image");
    bytes.into_inner()
}

pub fn write_image(path: &Path, width: u32, height: u32) {
    std::fs::write(path, image_bytes(width, height, ImageFormat::Png)).expect("write test image");
}

pub fn write_zip(path: &Path, files: &[(&str, Vec<u8>)]) {
    let mut writer = zip::ZipWriter::new(File::create(path).expect("create zip"));
    for (name, bytes) in files {
        writer
            .start_file(*name, FileOptions::default())
            .expect("start zip entry");
        writer.write_all(bytes).expect("write zip entry");
    }
    writer.finish().expect("finish zip");
}

pub fn extractor(detector: FixedDetections) -> FaceExtractor {
    FaceExtractor::with_defaults(Arc::new(detector))
}

pub fn extractor_with(detector: FixedDetections, settings: ExtractionSettings) -> FaceExtractor {
    FaceExtractor::new(Arc::new(detector), settings)
}

pub fn reference_detection() -> Detection {
    Detection::new(0.1, 0.2, 0.3, 0.4).with_score(0.9)
}
