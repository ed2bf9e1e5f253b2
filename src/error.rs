use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::face_detection::DetectionError;

/// Broad class of an [`ExtractError`], for callers that only branch on the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    ArchiveExtraction,
    DecodeFailure,
    DetectionFailure,
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("cannot read input {path}: {source}")]
    InvalidInput {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("input {path} is neither a zip archive nor a decodable image: {source}")]
    UndecodableInput {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to extract archive {path}: {source}")]
    ArchiveExtraction {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("archive entry {entry} could not be decoded: {source}")]
    DecodeFailure {
        entry: String,
        #[source]
        source: image::ImageError,
    },

    #[error("face detection failed for {image}: {source}")]
    Detection {
        image: String,
        #[source]
        source: DetectionError,
    },

    #[error("refusing to clear working directory {path}: {reason}")]
    UnsafeWorkdir { path: PathBuf, reason: &'static str },

    #[error("working directory {path}: {source}")]
    Workdir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ExtractError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExtractError::InvalidInput { .. }
            | ExtractError::UndecodableInput { .. }
            | ExtractError::UnsafeWorkdir { .. } => ErrorKind::InvalidInput,
            // a working directory that cannot be prepared or listed is an extraction failure
            ExtractError::ArchiveExtraction { .. } | ExtractError::Workdir { .. } => {
                ErrorKind::ArchiveExtraction
            }
            ExtractError::DecodeFailure { .. } => ErrorKind::DecodeFailure,
            ExtractError::Detection { .. } => ErrorKind::DetectionFailure,
        }
    }
}
