use std::path::Path;

use crate::comfy::ArtifactDownloader;
use crate::error::GenError;
use crate::locator::ArtifactSource;

/// Copies or downloads `source` to `dest`, creating missing parent
/// directories. Returns the number of bytes written.
pub async fn fetch(
    downloader: &impl ArtifactDownloader,
    source: &ArtifactSource,
    dest: &Path,
) -> Result<u64, GenError> {
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let written = match source {
        ArtifactSource::Local(path) => tokio::fs::copy(path, dest).await?,
        ArtifactSource::Remote(reference) => {
            let bytes = downloader.download(reference).await?;
            tokio::fs::write(dest, &bytes).await?;
            bytes.len() as u64
        }
    };

    tracing::debug!(dest = %dest.display(), bytes = written, "artifact written");
    Ok(written)
}
