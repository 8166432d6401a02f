use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Directory name for images of the target label.
pub const POSITIVE_DIR: &str = "positive";
/// Directory name for pooled images of every other label.
pub const NEGATIVE_DIR: &str = "negative";

/// Scratch location holding one binary class-per-directory layout at a time.
///
/// The orchestrator borrows the handle mutably for a whole label cycle, so the
/// clear, repopulate, consume sequence never interleaves between labels.
#[derive(Debug)]
pub struct WorkDir {
    root: PathBuf,
    _temp: Option<TempDir>,
}

impl WorkDir {
    /// A fresh temporary directory removed when the handle drops.
    pub fn temporary() -> io::Result<Self> {
        let temp = tempfile::Builder::new().prefix("asl-partition-").tempdir()?;
        Ok(Self {
            root: temp.path().to_path_buf(),
            _temp: Some(temp),
        })
    }

    /// A caller-chosen directory; its contents are owned by this handle.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            _temp: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn positive_dir(&self) -> PathBuf {
        self.root.join(POSITIVE_DIR)
    }

    pub fn negative_dir(&self) -> PathBuf {
        self.root.join(NEGATIVE_DIR)
    }

    /// Remove everything under the root and recreate empty class directories.
    pub fn reset(&mut self) -> io::Result<()> {
        if self.root.exists() {
            for entry in fs::read_dir(&self.root)? {
                let path = entry?.path();
                if path.is_dir() {
                    fs::remove_dir_all(&path)?;
                } else {
                    fs::remove_file(&path)?;
                }
            }
        }
        fs::create_dir_all(self.positive_dir())?;
        fs::create_dir_all(self.negative_dir())?;
        Ok(())
    }
}
