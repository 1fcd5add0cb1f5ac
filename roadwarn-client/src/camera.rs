//! Directory-backed camera.
//!
//! Plays back JPEG files in name order, looping. If `frames_dir`
//! contains `user/` or `environment/` subdirectories, the one matching
//! the current facing is used; otherwise the directory itself.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info};

use roadwarn_core::{CameraProvider, DetectError, Facing};

pub struct DirectoryCamera {
    root: PathBuf,
    facing: Facing,
    frames: Vec<PathBuf>,
    /// Facing the `frames` list was scanned for.
    scanned: Option<Facing>,
    cursor: usize,
}

impl DirectoryCamera {
    pub fn new(root: impl Into<PathBuf>, facing: Facing) -> Self {
        Self {
            root: root.into(),
            facing,
            frames: Vec::new(),
            scanned: None,
            cursor: 0,
        }
    }

    pub fn facing(&self) -> Facing {
        self.facing
    }

    pub fn set_facing(&mut self, facing: Facing) {
        if self.facing != facing {
            info!("switching camera to {facing}");
            self.facing = facing;
        }
    }

    /// Toggle between the front and rear camera.
    pub fn switch(&mut self) -> Facing {
        self.set_facing(self.facing.toggled());
        self.facing
    }

    /// Number of frames available for the current facing.
    pub fn frame_count(&self) -> usize {
        if self.scanned == Some(self.facing) {
            self.frames.len()
        } else {
            0
        }
    }

    fn source_dir(&self) -> PathBuf {
        let sub = self.root.join(self.facing.as_str());
        if sub.is_dir() { sub } else { self.root.clone() }
    }

    async fn rescan(&mut self) -> Result<(), DetectError> {
        let dir = self.source_dir();
        let mut frames = list_jpegs(&dir).await?;
        frames.sort();
        debug!(dir = %dir.display(), count = frames.len(), "scanned frames");
        self.frames = frames;
        self.scanned = Some(self.facing);
        self.cursor = 0;
        Ok(())
    }
}

async fn list_jpegs(dir: &Path) -> Result<Vec<PathBuf>, DetectError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(DetectError::Capture(format!("{}: {e}", dir.display()))),
    };

    let mut frames = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| DetectError::Capture(format!("{}: {e}", dir.display())))?
    {
        let path = entry.path();
        let is_jpeg = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"));
        if is_jpeg && path.is_file() {
            frames.push(path);
        }
    }
    Ok(frames)
}

#[async_trait]
impl CameraProvider for DirectoryCamera {
    async fn capture_frame(&mut self) -> Result<Option<Bytes>, DetectError> {
        if self.scanned != Some(self.facing) || self.frames.is_empty() {
            self.rescan().await?;
        }
        if self.frames.is_empty() {
            return Ok(None);
        }

        let path = &self.frames[self.cursor % self.frames.len()];
        self.cursor = (self.cursor + 1) % self.frames.len();
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| DetectError::Capture(format!("{}: {e}", path.display())))?;
        Ok(Some(Bytes::from(data)))
    }

    fn current_facing(&self) -> Facing {
        self.facing
    }
}
