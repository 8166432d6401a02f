use std::path::PathBuf;

/// Binary class of a sample relative to the target label.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryClass {
    Positive,
    Negative,
}

impl BinaryClass {
    /// Training target: `1.0` for the target label, `0.0` otherwise.
    pub fn target(self) -> f32 {
        match self {
            BinaryClass::Positive => 1.0,
            BinaryClass::Negative => 0.0,
        }
    }
}

/// A file assigned to one side of the binary problem.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabeledFile {
    pub path: PathBuf,
    pub class: BinaryClass,
}

/// Training and validation subsets of a partition.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SplitPlan {
    pub train: Vec<LabeledFile>,
    pub validation: Vec<LabeledFile>,
}

/// Number of files of a class of size `n` reserved for validation.
pub fn validation_count(n: usize, fraction: f64) -> usize {
    let fraction = fraction.clamp(0.0, 1.0);
    ((n as f64) * fraction).floor() as usize
}

/// Split each class independently: files sorted by name, the first
/// `floor(fraction * n)` go to validation, the rest to training.
pub fn split_by_class(positive: &[PathBuf], negative: &[PathBuf], fraction: f64) -> SplitPlan {
    let mut plan = SplitPlan::default();
    for (class, files) in [
        (BinaryClass::Positive, positive),
        (BinaryClass::Negative, negative),
    ] {
        let mut sorted = files.to_vec();
        sorted.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        let cut = validation_count(sorted.len(), fraction);
        for (idx, path) in sorted.into_iter().enumerate() {
            let file = LabeledFile { path, class };
            if idx < cut {
                plan.validation.push(file);
            } else {
                plan.train.push(file);
            }
        }
    }
    plan
}
