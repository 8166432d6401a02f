use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::warn;

use crate::ml::augment::{AugmentOptions, augment_image};

use super::images::{RgbRaster, load_rgb_raster};
use super::split::{BinaryClass, LabeledFile, SplitPlan};

const CHANNELS: usize = 3;

/// A decoded sample ready for batching.
#[derive(Clone, Debug)]
pub struct ImageSample {
    pub raster: RgbRaster,
    pub class: BinaryClass,
}

/// Decoded training and validation subsets.
#[derive(Clone, Debug, Default)]
pub struct ImageSet {
    pub train: Vec<ImageSample>,
    pub validation: Vec<ImageSample>,
    /// Files that failed to decode and were left out.
    pub skipped: usize,
}

impl ImageSet {
    pub fn count(&self, class: BinaryClass) -> usize {
        self.train
            .iter()
            .chain(self.validation.iter())
            .filter(|sample| sample.class == class)
            .count()
    }
}

/// Decode every file of `plan` at `size`×`size`, skipping unreadable images.
pub fn load_image_set(plan: &SplitPlan, size: u32) -> ImageSet {
    let mut skipped = 0usize;
    let mut skipped_errors = Vec::new();
    let mut decode = |files: &[LabeledFile]| -> Vec<ImageSample> {
        let mut out = Vec::with_capacity(files.len());
        for file in files {
            match load_rgb_raster(&file.path, size) {
                Ok(raster) => out.push(ImageSample {
                    raster,
                    class: file.class,
                }),
                Err(err) => {
                    skipped += 1;
                    if skipped_errors.len() < 3 {
                        skipped_errors.push(format!("{}: {err}", file.path.display()));
                    }
                }
            }
        }
        out
    };
    let train = decode(&plan.train);
    let validation = decode(&plan.validation);
    if skipped > 0 {
        warn!("Skipped {skipped} undecodable images; first errors: {skipped_errors:?}");
    }
    ImageSet {
        train,
        validation,
        skipped,
    }
}

/// A batch laid out as `NCHW` pixels in `[0, 1]` plus one target per sample.
#[derive(Clone, Debug, PartialEq)]
pub struct Batch {
    pub pixels: Vec<f32>,
    pub targets: Vec<f32>,
    pub size: usize,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn shape(&self) -> [usize; 4] {
        [self.len(), CHANNELS, self.size, self.size]
    }
}

/// Build a batch from `samples`, augmenting each one when `augment` is given.
pub fn assemble_batch(
    samples: &[&ImageSample],
    size: usize,
    mut augment: Option<(&mut StdRng, &AugmentOptions)>,
) -> Batch {
    let plane = size * size;
    let mut pixels = Vec::with_capacity(samples.len() * CHANNELS * plane);
    let mut targets = Vec::with_capacity(samples.len());
    for sample in samples {
        let mut hwc = sample.raster.to_unit_f32();
        if let Some((rng, options)) = augment.as_mut() {
            hwc = augment_image(&hwc, size, size, CHANNELS, rng, options);
        }
        pixels.extend(hwc_to_chw(&hwc, size));
        targets.push(sample.class.target());
    }
    Batch {
        pixels,
        targets,
        size,
    }
}

/// Shuffled sample order for one training epoch.
pub fn epoch_order(len: usize, rng: &mut StdRng) -> Vec<usize> {
    let mut order: Vec<usize> = (0..len).collect();
    order.shuffle(rng);
    order
}

pub(crate) fn hwc_to_chw(hwc: &[f32], size: usize) -> Vec<f32> {
    let plane = size * size;
    let mut chw = vec![0.0f32; hwc.len()];
    for idx in 0..plane.min(hwc.len() / CHANNELS) {
        for ch in 0..CHANNELS {
            chw[ch * plane + idx] = hwc[idx * CHANNELS + ch];
        }
    }
    chw
}
