mod common;

use std::error::Error;
use std::sync::Arc;

use tempfile::tempdir;

use common::{find_model_path, write_image};
use facebatch::{BlazefaceModel, FaceDetectionModel, FaceExtractor, ModelSettings};

fn load_model(min_confidence: f32) -> Option<BlazefaceModel> {
    let Some(path) = find_model_path() else {
        eprintln!("Skipping test: BlazeFace model not found");
        return None;
    };
    let settings = ModelSettings {
        path,
        min_confidence,
        ..ModelSettings::default()
    };
    Some(BlazefaceModel::new(&settings).expect("model should load"))
}

#[test]
fn missing_model_file_is_reported() {
    let settings = ModelSettings {
        path: "models/does-not-exist.onnx".into(),
        ..ModelSettings::default()
    };
    assert!(BlazefaceModel::new(&settings).is_err());
}

#[test]
fn synthetic_pattern_has_no_faces() -> Result<(), Box<dyn Error>> {
    let Some(model) = load_model(0.75) else {
        return Ok(());
    };

    let dir = tempdir()?;
    let path = dir.path().join("pattern.png");
    write_image(&path, 320, 240);

    let result = FaceExtractor::with_defaults(Arc::new(model)).extract(&path)?;
    assert_eq!(result.face_count(), 0);
    Ok(())
}

#[test]
fn rejects_mismatched_pixel_buffer() {
    let Some(model) = load_model(0.5) else {
        return;
    };
    assert!(model.detect(&[0u8; 10], 4, 4).is_err());
}
