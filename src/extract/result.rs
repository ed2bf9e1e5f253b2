use std::collections::BTreeMap;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::face::FaceBox;

/// Key holding the faces of a single (non-archive) input.
pub const SINGLE_IMAGE_KEY: &str = "faces";

/// Faces found by [`FaceExtractor::extract`](super::FaceExtractor::extract).
///
/// The two variants serialize to different shapes and callers are expected
/// to branch on them: a single image becomes `{"faces": [...]}` while an
/// archive becomes `{"<entry name>": [...], ...}` with one key per image,
/// including images without faces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Single(Vec<FaceBox>),
    Archive(BTreeMap<String, Vec<FaceBox>>),
}

impl Extraction {
    pub fn is_archive(&self) -> bool {
        matches!(self, Extraction::Archive(_))
    }

    /// Faces stored under `key`, using [`SINGLE_IMAGE_KEY`] for single images.
    pub fn get(&self, key: &str) -> Option<&[FaceBox]> {
        match self {
            Extraction::Single(faces) if key == SINGLE_IMAGE_KEY => Some(faces),
            Extraction::Single(_) => None,
            Extraction::Archive(images) => images.get(key).map(Vec::as_slice),
        }
    }

    pub fn face_count(&self) -> usize {
        match self {
            Extraction::Single(faces) => faces.len(),
            Extraction::Archive(images) => images.values().map(Vec::len).sum(),
        }
    }

    /// Flattens into the serialized key layout.
    pub fn into_map(self) -> BTreeMap<String, Vec<FaceBox>> {
        match self {
            Extraction::Single(faces) => BTreeMap::from([(SINGLE_IMAGE_KEY.to_string(), faces)]),
            Extraction::Archive(images) => images,
        }
    }
}

impl Serialize for Extraction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Extraction::Single(faces) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(SINGLE_IMAGE_KEY, faces)?;
                map.end()
            }
            Extraction::Archive(images) => images.serialize(serializer),
        }
    }
}

/// Result for one archive entry when failures are isolated.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "status")]
pub enum ImageOutcome {
    #[serde(rename = "ok")]
    Faces { faces: Vec<FaceBox> },
    #[serde(rename = "error")]
    Failed { reason: String },
}

impl ImageOutcome {
    pub fn faces(&self) -> Option<&[FaceBox]> {
        match self {
            ImageOutcome::Faces { faces } => Some(faces),
            ImageOutcome::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ImageOutcome::Failed { .. })
    }
}

/// Faces found by [`FaceExtractor::extract_isolated`](super::FaceExtractor::extract_isolated).
///
/// Single images serialize exactly like [`Extraction::Single`]; archive
/// entries carry a per-image status instead of a bare face list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IsolatedExtraction {
    Single(Vec<FaceBox>),
    Archive(BTreeMap<String, ImageOutcome>),
}

impl IsolatedExtraction {
    pub fn failures(&self) -> usize {
        match self {
            IsolatedExtraction::Single(_) => 0,
            IsolatedExtraction::Archive(images) => {
                images.values().filter(|o| o.is_failed()).count()
            }
        }
    }
}

impl Serialize for IsolatedExtraction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            IsolatedExtraction::Single(faces) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(SINGLE_IMAGE_KEY, faces)?;
                map.end()
            }
            IsolatedExtraction::Archive(images) => images.serialize(serializer),
        }
    }
}

/// Output of [`FaceExtractor::run`](super::FaceExtractor::run); serializes as
/// whichever extraction it holds.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(untagged)]
pub enum Report {
    Strict(Extraction),
    Isolated(IsolatedExtraction),
}
