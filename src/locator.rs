//! Finding the artifact a finished job produced.
//!
//! When the server's output directory is on this machine, the newest file
//! on disk that this job wrote wins. Otherwise the last reference the server
//! recorded is downloaded.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::Serialize;

use crate::comfy::{OutputReference, Outputs};
use crate::error::GenError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactSource {
    Local(PathBuf),
    Remote(OutputReference),
}

impl ArtifactSource {
    pub fn file_name(&self) -> Option<&str> {
        match self {
            ArtifactSource::Local(path) => path.file_name().and_then(|n| n.to_str()),
            ArtifactSource::Remote(r) => Some(r.filename.as_str()),
        }
    }
}

/// All references across nodes, in recorded order.
pub fn flatten(outputs: &Outputs) -> Vec<&OutputReference> {
    outputs.references().collect()
}

/// Most recently produced reference by service order.
pub fn select_last<'a>(refs: &[&'a OutputReference]) -> Option<&'a OutputReference> {
    refs.iter()
        .rev()
        .find(|r| r.kind == "output")
        .or_else(|| refs.last())
        .copied()
}

/// Newest file in `dir` named `<prefix>_*` with one of `extensions`,
/// ignoring files last modified before `since`.
///
/// `prefix` may carry a subfolder (`LTX-2/API`), resolved under `dir`.
pub fn scan_latest(
    dir: &Path,
    prefix: &str,
    extensions: &[&str],
    since: Option<SystemTime>,
) -> std::io::Result<Option<PathBuf>> {
    let (folder, stem) = match prefix.rsplit_once('/') {
        Some((sub, stem)) => (dir.join(sub), stem),
        None => (dir.to_path_buf(), prefix),
    };
    if !folder.is_dir() {
        return Ok(None);
    }

    let wanted = format!("{stem}_");
    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in std::fs::read_dir(&folder)? {
        let entry = entry?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let ext_ok = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)));
        if !name.starts_with(&wanted) || !ext_ok {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        if since.is_some_and(|since| modified < since) {
            continue;
        }
        if newest.as_ref().is_none_or(|(t, _)| modified >= *t) {
            newest = Some((modified, path));
        }
    }
    Ok(newest.map(|(_, path)| path))
}

/// Newest of the recorded `output` files that exist under `dir`.
fn recorded_on_disk(dir: &Path, refs: &[&OutputReference]) -> std::io::Result<Option<PathBuf>> {
    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for r in refs.iter().filter(|r| r.kind == "output") {
        let path = dir.join(&r.subfolder).join(&r.filename);
        let modified = match std::fs::metadata(&path) {
            Ok(meta) => meta.modified()?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        if newest.as_ref().is_none_or(|(t, _)| modified >= *t) {
            newest = Some((modified, path));
        }
    }
    Ok(newest.map(|(_, path)| path))
}

/// Picks the artifact to fetch for a finished job submitted at `submitted`.
///
/// A file on disk is only taken when the job recorded its name, or, for a
/// job that recorded nothing, when it was written after submission.
pub fn locate(
    outputs: &Outputs,
    local_output_dir: Option<&Path>,
    prefix: &str,
    extensions: &[&str],
    submitted: SystemTime,
) -> Result<ArtifactSource, GenError> {
    let refs = flatten(outputs);

    if let Some(dir) = local_output_dir.filter(|d| d.is_dir()) {
        let on_disk = if refs.is_empty() {
            // Filesystems with one-second mtime resolution.
            let since = submitted.checked_sub(Duration::from_secs(1)).unwrap_or(submitted);
            scan_latest(dir, prefix, extensions, Some(since))?
        } else {
            recorded_on_disk(dir, &refs)?
        };
        if let Some(path) = on_disk {
            tracing::debug!(path = %path.display(), "artifact found on disk");
            return Ok(ArtifactSource::Local(path));
        }
        tracing::debug!(dir = %dir.display(), prefix, "job output not on disk; using recorded outputs");
    }

    match select_last(&refs) {
        Some(r) => Ok(ArtifactSource::Remote(r.clone())),
        None => Err(GenError::NotFound(match local_output_dir {
            Some(dir) => format!("no new {prefix}_* file in {} and no recorded outputs", dir.display()),
            None => format!("job recorded no outputs for {prefix}"),
        })),
    }
}
