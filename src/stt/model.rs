//! GGML model path resolution and first-use download.
//!
//! Models are fetched from the whisper.cpp repository on Hugging Face the
//! first time they are needed and cached under the platform data directory.
//! The download happens in the worker child (never on the daemon's
//! threads), which is also why `Transcriber::preload` exists: run the
//! worker once at startup and the first real session pays nothing.

use std::path::{Path, PathBuf};

use crate::config::AppPaths;

use super::{ModelSize, SttError};

const DOWNLOAD_BASE: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";

// ---------------------------------------------------------------------------
// ModelPaths
// ---------------------------------------------------------------------------

/// Resolves on-disk model locations.
#[derive(Debug, Clone)]
pub struct ModelPaths {
    pub models_dir: PathBuf,
}

impl ModelPaths {
    pub fn new(models_dir: PathBuf) -> Self {
        Self { models_dir }
    }

    /// Full path of the GGML file for `size`.
    pub fn model_file(&self, size: ModelSize) -> PathBuf {
        self.models_dir.join(size.file_name())
    }
}

impl Default for ModelPaths {
    fn default() -> Self {
        Self::new(AppPaths::new().models_dir)
    }
}

// ---------------------------------------------------------------------------
// ensure_model
// ---------------------------------------------------------------------------

/// Return the path of the GGML file for `size`, downloading it first if it
/// is not cached yet.
///
/// The download goes to a `.part` file and is renamed into place only on
/// success, so an interrupted fetch never leaves a truncated model behind.
pub fn ensure_model(size: ModelSize, paths: &ModelPaths) -> Result<PathBuf, SttError> {
    let dest = paths.model_file(size);
    if dest.exists() {
        return Ok(dest);
    }

    std::fs::create_dir_all(&paths.models_dir)?;

    let url = format!("{DOWNLOAD_BASE}/{}", size.file_name());
    log::info!(
        "stt: downloading {} model (~{} MB) from {url}",
        size,
        size.approx_download_mb()
    );

    let part = dest.with_extension("bin.part");
    download_to(&url, &part)?;
    std::fs::rename(&part, &dest)?;

    log::info!("stt: model cached at {}", dest.display());
    Ok(dest)
}

fn download_to(url: &str, dest: &Path) -> Result<(), SttError> {
    let mut response = reqwest::blocking::get(url)
        .map_err(|e| SttError::Download(e.to_string()))?;

    if !response.status().is_success() {
        return Err(SttError::Download(format!(
            "{url} returned HTTP {}",
            response.status()
        )));
    }

    let mut file = std::fs::File::create(dest)?;
    response
        .copy_to(&mut file)
        .map_err(|e| SttError::Download(e.to_string()))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn model_file_joins_dir_and_name() {
        let paths = ModelPaths::new(PathBuf::from("/tmp/models"));
        assert_eq!(
            paths.model_file(ModelSize::Tiny),
            PathBuf::from("/tmp/models/ggml-tiny.bin")
        );
    }

    #[test]
    fn ensure_model_returns_cached_file_without_network() {
        let dir = tempdir().unwrap();
        let paths = ModelPaths::new(dir.path().to_path_buf());

        let cached = paths.model_file(ModelSize::Tiny);
        std::fs::write(&cached, b"stub model bytes").unwrap();

        let resolved = ensure_model(ModelSize::Tiny, &paths).unwrap();
        assert_eq!(resolved, cached);
    }

    #[test]
    fn every_size_has_distinct_file_name() {
        let names: std::collections::HashSet<_> =
            ModelSize::ALL.iter().map(|s| s.file_name()).collect();
        assert_eq!(names.len(), ModelSize::ALL.len());
    }
}
