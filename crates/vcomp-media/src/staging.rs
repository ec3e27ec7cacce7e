//! Per-request staging directory.
//!
//! Input bytes are written under a fresh directory named after the request
//! ID, and the engine writes its output there too. [`StagingArea::close`]
//! removes everything and reports failures; if a staging area is dropped
//! without being closed, the directory is still removed.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tokio::fs;
use tracing::debug;

use vcomp_models::AssetRef;

use crate::error::{MediaError, MediaResult};

/// Request-scoped directory for engine inputs and output.
#[derive(Debug)]
pub struct StagingArea {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl StagingArea {
    /// Create a staging directory under `work_dir`.
    pub async fn create(work_dir: &Path, request_id: &str) -> MediaResult<Self> {
        fs::create_dir_all(work_dir).await?;

        let dir = tempfile::Builder::new()
            .prefix(&format!("vcomp-{}-", request_id))
            .tempdir_in(work_dir)?;
        let path = dir.path().to_path_buf();
        debug!("Created staging directory {}", path.display());

        Ok(Self {
            dir: Some(dir),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write one input asset as `input_<index>.<ext>`.
    pub async fn stage(&self, index: usize, asset: &AssetRef) -> MediaResult<PathBuf> {
        let path = self
            .path
            .join(format!("input_{}.{}", index, asset.extension()));
        fs::write(&path, asset.bytes()).await?;
        Ok(path)
    }

    /// Write all inputs in engine order.
    pub async fn stage_all(&self, assets: &[AssetRef]) -> MediaResult<Vec<PathBuf>> {
        let mut paths = Vec::with_capacity(assets.len());
        for (index, asset) in assets.iter().enumerate() {
            paths.push(self.stage(index, asset).await?);
        }
        Ok(paths)
    }

    /// Where the engine should write its output.
    pub fn output_path(&self, format: &str) -> PathBuf {
        self.path.join(format!("output.{}", format))
    }

    /// Remove the directory and everything in it.
    pub fn close(mut self) -> MediaResult<()> {
        match self.dir.take() {
            Some(dir) => dir.close().map_err(|e| {
                MediaError::Cleanup(format!("{}: {}", self.path.display(), e))
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stage_and_close() {
        let work = TempDir::new().unwrap();
        let staging = StagingArea::create(work.path(), "abc123").await.unwrap();

        let inputs = vec![
            AssetRef::video(b"main".to_vec()),
            AssetRef::audio(b"music".to_vec()),
        ];
        let paths = staging.stage_all(&inputs).await.unwrap();

        assert_eq!(paths.len(), 2);
        assert!(paths[0].ends_with("input_0.mp4"));
        assert!(paths[1].ends_with("input_1.wav"));
        assert_eq!(fs::read(&paths[1]).await.unwrap(), b"music");
        assert!(staging
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("vcomp-abc123-"));
        assert_eq!(staging.output_path("mp4").parent(), Some(staging.path()));

        let dir = staging.path().to_path_buf();
        staging.close().unwrap();
        assert!(!dir.exists());
        assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_requests_do_not_collide() {
        let work = TempDir::new().unwrap();
        let a = StagingArea::create(work.path(), "same").await.unwrap();
        let b = StagingArea::create(work.path(), "same").await.unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[tokio::test]
    async fn test_drop_removes_directory() {
        let work = TempDir::new().unwrap();
        let staging = StagingArea::create(&work.path().join("nested"), "x").await.unwrap();
        staging.stage(0, &AssetRef::video(vec![1u8])).await.unwrap();
        let dir = staging.path().to_path_buf();
        drop(staging);
        assert!(!dir.exists());
    }
}
