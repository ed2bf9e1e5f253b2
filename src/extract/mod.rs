//! Face extraction over a single image or a zip archive of images.

mod archive;
mod result;

use std::collections::BTreeMap;
use std::path::Path;

use image::RgbImage;
use log::{debug, info, warn};
use rayon::prelude::*;

pub use result::{Extraction, ImageOutcome, IsolatedExtraction, Report, SINGLE_IMAGE_KEY};

use self::archive::{ArchiveEntry, Workdir};
use crate::config::{ExtractionSettings, FailurePolicy};
use crate::error::ExtractError;
use crate::face::{to_face_boxes, FaceBox};
use crate::utils::{load_rgb, SharedDetector};

/// Runs a shared detector over prediction inputs.
///
/// The detector is loaded once by the caller and reused for every call.
/// Whether an input is an archive is decided from its bytes; archives are
/// unpacked into a working directory chosen by
/// [`ExtractionSettings::workdir`].
pub struct FaceExtractor {
    detector: SharedDetector,
    settings: ExtractionSettings,
}

impl FaceExtractor {
    pub fn new(detector: SharedDetector, settings: ExtractionSettings) -> Self {
        Self { detector, settings }
    }

    pub fn with_defaults(detector: SharedDetector) -> Self {
        Self::new(detector, ExtractionSettings::default())
    }

    /// Runs [`extract`](Self::extract) or
    /// [`extract_isolated`](Self::extract_isolated) as
    /// [`ExtractionSettings::failure_policy`] selects.
    pub fn run(&self, path: &Path) -> Result<Report, ExtractError> {
        match self.settings.failure_policy {
            FailurePolicy::Abort => self.extract(path).map(Report::Strict),
            FailurePolicy::Isolate => self.extract_isolated(path).map(Report::Isolated),
        }
    }

    /// Detects faces in the image or archive at `path`.
    ///
    /// Any entry of an archive that cannot be decoded or analyzed fails the
    /// whole call; no partial result is returned.
    pub fn extract(&self, path: &Path) -> Result<Extraction, ExtractError> {
        let Some(mut zip) = archive::probe(path)? else {
            let faces = self.single_image(path)?;
            info!("{}: {} face(s)", path.display(), faces.len());
            return Ok(Extraction::Single(faces));
        };

        let workdir = Workdir::acquire(&self.settings, path)?;
        archive::unpack(&mut zip, path, &workdir)?;
        let entries = archive::entries(workdir.path())?;

        let results: Vec<Vec<FaceBox>> = if self.settings.parallel {
            entries
                .par_iter()
                .map(|entry| self.archive_entry(entry))
                .collect::<Result<_, _>>()?
        } else {
            entries
                .iter()
                .map(|entry| self.archive_entry(entry))
                .collect::<Result<_, _>>()?
        };

        let images: BTreeMap<String, Vec<FaceBox>> = entries
            .into_iter()
            .map(|entry| entry.name)
            .zip(results)
            .collect();
        let image_count = images.len();
        let extraction = Extraction::Archive(images);
        info!(
            "{}: {} image(s), {} face(s)",
            path.display(),
            image_count,
            extraction.face_count()
        );
        Ok(extraction)
    }

    /// Like [`extract`](Self::extract), but a bad archive entry is reported in
    /// place instead of failing the call.
    ///
    /// Problems with the input itself (missing file, undecodable single image,
    /// corrupt archive) are still errors.
    pub fn extract_isolated(&self, path: &Path) -> Result<IsolatedExtraction, ExtractError> {
        let Some(mut zip) = archive::probe(path)? else {
            return self.single_image(path).map(IsolatedExtraction::Single);
        };

        let workdir = Workdir::acquire(&self.settings, path)?;
        archive::unpack(&mut zip, path, &workdir)?;
        let entries = archive::entries(workdir.path())?;

        let outcome = |entry: &ArchiveEntry| match self.archive_entry(entry) {
            Ok(faces) => ImageOutcome::Faces { faces },
            Err(err) => {
                warn!("skipping {}: {err}", entry.name);
                ImageOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        };
        let outcomes: Vec<ImageOutcome> = if self.settings.parallel {
            entries.par_iter().map(outcome).collect()
        } else {
            entries.iter().map(outcome).collect()
        };

        let extraction = IsolatedExtraction::Archive(
            entries
                .into_iter()
                .map(|entry| entry.name)
                .zip(outcomes)
                .collect(),
        );
        info!(
            "{}: archive processed, {} failed image(s)",
            path.display(),
            extraction.failures()
        );
        Ok(extraction)
    }

    fn single_image(&self, path: &Path) -> Result<Vec<FaceBox>, ExtractError> {
        let image = load_rgb(path).map_err(|source| ExtractError::UndecodableInput {
            path: path.to_path_buf(),
            source,
        })?;
        self.faces_in(&path.display().to_string(), &image)
    }

    fn archive_entry(&self, entry: &ArchiveEntry) -> Result<Vec<FaceBox>, ExtractError> {
        let image = load_rgb(&entry.path).map_err(|source| ExtractError::DecodeFailure {
            entry: entry.name.clone(),
            source,
        })?;
        let faces = self.faces_in(&entry.name, &image)?;
        debug!("{}: {} face(s)", entry.name, faces.len());
        Ok(faces)
    }

    fn faces_in(&self, name: &str, image: &RgbImage) -> Result<Vec<FaceBox>, ExtractError> {
        let (width, height) = image.dimensions();
        let detections = self
            .detector
            .detect(image.as_raw(), width, height)
            .map_err(|source| ExtractError::Detection {
                image: name.to_string(),
                source,
            })?;
        Ok(to_face_boxes(&detections, width, height))
    }
}
