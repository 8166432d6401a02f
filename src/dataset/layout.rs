use std::fs;
use std::path::{Path, PathBuf};

use crate::alphabet::Label;

use super::images::list_image_files;

/// A class subdirectory of a dataset root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassDir {
    /// Directory name, which is the class identifier.
    pub name: String,
    pub path: PathBuf,
}

impl ClassDir {
    /// The ASL label this directory represents, if its name is one.
    pub fn label(&self) -> Option<Label> {
        self.name.parse().ok()
    }
}

/// Enumerate the class subdirectories of `root`, sorted by name.
///
/// Loose files at the root and hidden directories are skipped.
pub fn class_directories(root: &Path) -> std::io::Result<Vec<ClassDir>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.is_empty() || name.starts_with('.') {
            continue;
        }
        dirs.push(ClassDir {
            name,
            path: entry.path(),
        });
    }
    dirs.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(dirs)
}

/// Per-class image counts for a dataset root.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DatasetCensus {
    pub classes: Vec<(String, usize)>,
}

impl DatasetCensus {
    pub fn total_images(&self) -> usize {
        self.classes.iter().map(|(_, count)| count).sum()
    }

    pub fn count_for(&self, name: &str) -> Option<usize> {
        self.classes
            .iter()
            .find(|(class, _)| class == name)
            .map(|(_, count)| *count)
    }

    /// Labels of the alphabet with no directory in the dataset.
    pub fn missing_labels(&self) -> Vec<Label> {
        Label::all()
            .filter(|label| self.count_for(&label.dir_name()).is_none())
            .collect()
    }
}

/// Count the images of every class directory under `root`.
pub fn census(root: &Path) -> std::io::Result<DatasetCensus> {
    let mut classes = Vec::new();
    for dir in class_directories(root)? {
        let count = list_image_files(&dir.path)?.len();
        classes.push((dir.name, count));
    }
    Ok(DatasetCensus { classes })
}

/// Find the directory under `dir` (up to `max_depth` levels down) holding the
/// most label-named subdirectories.
///
/// Archives from the dataset host nest the layout one or two levels deep
/// (`asl_dataset/asl_dataset/a/...`); ties resolve to the shallowest match.
pub fn locate_dataset_root(dir: &Path, max_depth: usize) -> Option<PathBuf> {
    let mut best: Option<(usize, PathBuf)> = None;
    let mut frontier = vec![dir.to_path_buf()];
    for _depth in 0..=max_depth {
        let mut next = Vec::new();
        for candidate in frontier {
            let Ok(children) = class_directories(&candidate) else {
                continue;
            };
            let score = children.iter().filter(|child| child.label().is_some()).count();
            if score > 0 && best.as_ref().is_none_or(|(best_score, _)| score > *best_score) {
                best = Some((score, candidate.clone()));
            }
            next.extend(children.into_iter().map(|child| child.path));
        }
        frontier = next;
    }
    best.map(|(_, path)| path)
}
