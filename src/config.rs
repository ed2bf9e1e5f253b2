//! Settings for the detector and the batch extractor.
//!
//! Everything can be loaded from a JSON file; every field has a default so a
//! partial file (or no file at all) is valid.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Which BlazeFace network to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModelVariant {
    /// Front-camera model for faces within roughly two meters (128x128 input).
    ShortRange,
    /// Back-camera model for faces further away (256x256 input).
    #[default]
    FullRange,
}

impl ModelVariant {
    /// Side length of the square model input, in pixels.
    pub fn input_size(self) -> u32 {
        match self {
            ModelVariant::ShortRange => 128,
            ModelVariant::FullRange => 256,
        }
    }

    /// Feature map strides of the four anchor layers.
    pub fn strides(self) -> [u32; 4] {
        match self {
            ModelVariant::ShortRange => [8, 16, 16, 16],
            ModelVariant::FullRange => [16, 32, 32, 32],
        }
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModelVariant::ShortRange => "short-range",
            ModelVariant::FullRange => "full-range",
        })
    }
}

impl FromStr for ModelVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "short-range" | "short" | "0" => Ok(ModelVariant::ShortRange),
            "full-range" | "full" | "1" => Ok(ModelVariant::FullRange),
            other => Err(format!(
                "invalid model variant '{other}'; expected 'short-range' or 'full-range'"
            )),
        }
    }
}

/// Range the model expects normalized pixel values in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InputRange {
    #[default]
    ZeroToOne,
    MinusOneToOne,
}

impl InputRange {
    pub fn normalize(self, sample: u8) -> f32 {
        match self {
            InputRange::ZeroToOne => sample as f32 / 255.0,
            InputRange::MinusOneToOne => sample as f32 / 127.5 - 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Path to the ONNX export of the BlazeFace network.
    pub path: PathBuf,
    pub variant: ModelVariant,
    /// Detections scoring below this are dropped.
    pub min_confidence: f32,
    /// IoU above which overlapping detections are merged.
    pub suppression_threshold: f32,
    pub intra_threads: i16,
    pub input_range: InputRange,
    /// Optional `.npy` file of `[N, 4]` anchors; generated when absent.
    pub anchors: Option<PathBuf>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("models/face_detection_back_256x256_float32.onnx"),
            variant: ModelVariant::FullRange,
            min_confidence: 0.1,
            suppression_threshold: 0.3,
            intra_threads: 1,
            input_range: InputRange::ZeroToOne,
            anchors: None,
        }
    }
}

/// Where archive contents are unpacked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum WorkdirPolicy {
    /// A fresh temporary directory per call, removed when the call returns.
    #[default]
    Scoped,
    /// One shared directory, overwritten on every call. Calls are serialized.
    Fixed { path: PathBuf },
}

impl WorkdirPolicy {
    pub fn fixed_default() -> Self {
        WorkdirPolicy::Fixed {
            path: PathBuf::from("images"),
        }
    }
}

/// What happens when one archive entry cannot be processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// The whole call fails.
    #[default]
    Abort,
    /// The entry is reported as failed and the rest still run.
    Isolate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ExtractionSettings {
    pub workdir: WorkdirPolicy,
    pub failure_policy: FailurePolicy,
    /// Process archive entries on the rayon pool.
    pub parallel: bool,
    /// Where scoped working directories are created. Defaults to the system
    /// temp directory.
    pub temp_root: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub model: ModelSettings,
    pub extraction: ExtractionSettings,
}

impl Settings {
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings from {}", path.display()))?;
        let settings: Settings = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse settings in {}", path.display()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let model = &self.model;
        anyhow::ensure!(
            (0.0..=1.0).contains(&model.min_confidence),
            "min_confidence must be within [0, 1], got {}",
            model.min_confidence
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&model.suppression_threshold),
            "suppression_threshold must be within [0, 1], got {}",
            model.suppression_threshold
        );
        anyhow::ensure!(
            model.intra_threads > 0,
            "intra_threads must be positive, got {}",
            model.intra_threads
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.model.variant, ModelVariant::FullRange);
        assert_eq!(settings.model.min_confidence, 0.1);
        assert_eq!(settings.extraction.workdir, WorkdirPolicy::Scoped);
    }

    #[test]
    fn parses_fixed_workdir_and_isolation() {
        let settings: Settings = serde_json::from_str(
            r#"{
                "model": { "variant": "short_range", "min_confidence": 0.5 },
                "extraction": {
                    "workdir": { "mode": "fixed", "path": "images" },
                    "failure_policy": "isolate",
                    "temp_root": "/var/tmp"
                }
            }"#,
        )
        .unwrap();
        assert_eq!(settings.model.variant, ModelVariant::ShortRange);
        assert_eq!(settings.extraction.workdir, WorkdirPolicy::fixed_default());
        assert_eq!(settings.extraction.failure_policy, FailurePolicy::Isolate);
        assert!(!settings.extraction.parallel);
        assert_eq!(
            settings.extraction.temp_root,
            Some(PathBuf::from("/var/tmp"))
        );
    }

    #[test]
    fn rejects_out_of_range_confidence() {
        let mut settings = Settings::default();
        settings.model.min_confidence = 1.5;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::load_from_path(&dir.path().join("absent.json")).unwrap_err();
        assert!(err.to_string().contains("failed to read settings"));
    }

    #[test]
    fn variant_from_str_accepts_selector_numbers() {
        assert_eq!("0".parse::<ModelVariant>().unwrap(), ModelVariant::ShortRange);
        assert_eq!("full_range".parse::<ModelVariant>().unwrap(), ModelVariant::FullRange);
        assert!("medium".parse::<ModelVariant>().is_err());
    }

    #[test]
    fn variants_describe_their_geometry() {
        assert_eq!(ModelVariant::ShortRange.input_size(), 128);
        assert_eq!(ModelVariant::FullRange.strides(), [16, 32, 32, 32]);
    }

    #[test]
    fn input_range_maps_extremes() {
        assert_eq!(InputRange::ZeroToOne.normalize(255), 1.0);
        assert_eq!(InputRange::MinusOneToOne.normalize(0), -1.0);
        assert_eq!(InputRange::MinusOneToOne.normalize(255), 1.0);
    }
}
