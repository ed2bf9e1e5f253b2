//! Zip probing, working directories, and entry enumeration.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use log::debug;
use tempfile::TempDir;
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::config::{ExtractionSettings, WorkdirPolicy};
use crate::error::ExtractError;

// every fixed-directory extraction in the process goes through this lock
static FIXED_WORKDIR: Mutex<()> = Mutex::new(());

pub(crate) const SCOPED_PREFIX: &str = "facebatch-";

/// Opens `path` and returns the archive if its contents parse as a zip.
///
/// Only the bytes are inspected; the file name plays no part.
pub(crate) fn probe(path: &Path) -> Result<Option<ZipArchive<File>>, ExtractError> {
    let file = File::open(path).map_err(|source| ExtractError::InvalidInput {
        path: path.to_path_buf(),
        source,
    })?;
    match ZipArchive::new(file) {
        Ok(archive) => Ok(Some(archive)),
        Err(err) => {
            debug!("{} is not a zip archive ({err})", path.display());
            Ok(None)
        }
    }
}

/// Directory an archive is unpacked into for the duration of one call.
pub(crate) enum Workdir {
    Scoped(TempDir),
    Fixed {
        path: PathBuf,
        _lock: MutexGuard<'static, ()>,
    },
}

impl Workdir {
    /// Prepares the directory `input` will be unpacked into.
    ///
    /// Scoped directories are created under `settings.temp_root`, or the
    /// system temp directory when unset.
    pub(crate) fn acquire(
        settings: &ExtractionSettings,
        input: &Path,
    ) -> Result<Self, ExtractError> {
        match &settings.workdir {
            WorkdirPolicy::Scoped => {
                let root = settings
                    .temp_root
                    .clone()
                    .unwrap_or_else(std::env::temp_dir);
                let dir = tempfile::Builder::new()
                    .prefix(SCOPED_PREFIX)
                    .tempdir_in(&root)
                    .map_err(|source| ExtractError::Workdir { path: root, source })?;
                debug!("unpacking into {}", dir.path().display());
                Ok(Workdir::Scoped(dir))
            }
            WorkdirPolicy::Fixed { path } => {
                let lock = FIXED_WORKDIR
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                let workdir_err = |source| ExtractError::Workdir {
                    path: path.clone(),
                    source,
                };
                if path.exists() {
                    let target = path.canonicalize().map_err(workdir_err)?;
                    let cwd = std::env::current_dir()
                        .and_then(|cwd| cwd.canonicalize())
                        .map_err(workdir_err)?;
                    let input = input.canonicalize().map_err(workdir_err)?;
                    check_clearable(&target, &input, &cwd)?;

                    debug!("clearing previous contents of {}", path.display());
                    fs::remove_dir_all(path).map_err(workdir_err)?;
                }
                fs::create_dir_all(path).map_err(workdir_err)?;
                Ok(Workdir::Fixed {
                    path: path.clone(),
                    _lock: lock,
                })
            }
        }
    }

    pub(crate) fn path(&self) -> &Path {
        match self {
            Workdir::Scoped(dir) => dir.path(),
            Workdir::Fixed { path, .. } => path,
        }
    }
}

/// Refuses to wipe a fixed directory that holds the input or the process's
/// working directory. All three paths must be canonical.
fn check_clearable(target: &Path, input: &Path, cwd: &Path) -> Result<(), ExtractError> {
    let reason = if input.starts_with(target) {
        "it contains the input"
    } else if cwd.starts_with(target) {
        "it contains the current directory"
    } else {
        return Ok(());
    };
    Err(ExtractError::UnsafeWorkdir {
        path: target.to_path_buf(),
        reason,
    })
}

/// An unpacked file and the key it is reported under.
#[derive(Debug, Clone)]
pub(crate) struct ArchiveEntry {
    pub name: String,
    pub path: PathBuf,
}

pub(crate) fn unpack(
    archive: &mut ZipArchive<File>,
    source: &Path,
    workdir: &Workdir,
) -> Result<(), ExtractError> {
    archive
        .extract(workdir.path())
        .map_err(|err| ExtractError::ArchiveExtraction {
            path: source.to_path_buf(),
            source: err,
        })
}

/// Lists every regular file below `root`, sorted, keyed by its `/`-separated
/// path relative to `root`. Top-level files are keyed by their bare name.
pub(crate) fn entries(root: &Path) -> Result<Vec<ArchiveEntry>, ExtractError> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|err| ExtractError::Workdir {
            path: root.to_path_buf(),
            source: err.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        entries.push(ArchiveEntry {
            name,
            path: entry.into_path(),
        });
    }
    Ok(entries)
}
