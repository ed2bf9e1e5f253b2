//! Face bounding boxes for single images and zip archives of images.
//!
//! A [`FaceDetectionModel`] is loaded once and shared; [`FaceExtractor`]
//! decides from the input's bytes whether it is an archive, runs the detector
//! on every image, and converts the relative boxes it reports into pixel
//! coordinates.

pub mod config;
pub mod error;
pub mod extract;
pub mod face;
pub mod face_detection;
pub mod utils;

pub use config::{
    ExtractionSettings, FailurePolicy, InputRange, ModelSettings, ModelVariant, Settings,
    WorkdirPolicy,
};
pub use error::{ErrorKind, ExtractError};
pub use extract::{
    Extraction, FaceExtractor, ImageOutcome, IsolatedExtraction, Report, SINGLE_IMAGE_KEY,
};
pub use face::{Detection, FaceBox};
pub use face_detection::model_blazeface::BlazefaceModel;
pub use face_detection::{DetectionError, FaceDetectionModel, FixedDetections};
pub use utils::{init_logging, load_rgb, SharedDetector};
