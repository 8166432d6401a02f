use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Random geometric augmentation applied to training images only.
///
/// No horizontal flip: a mirrored hand can depict a different sign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentOptions {
    pub enabled: bool,
    /// Maximum absolute rotation, degrees.
    pub rotation_degrees: f32,
    /// Maximum horizontal shift as a fraction of the width.
    pub width_shift: f32,
    /// Maximum vertical shift as a fraction of the height.
    pub height_shift: f32,
    /// Zoom factors are drawn from `[1 - zoom, 1 + zoom]` per axis.
    pub zoom: f32,
    pub seed: u64,
}

impl Default for AugmentOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            rotation_degrees: 15.0,
            width_shift: 0.1,
            height_shift: 0.1,
            zoom: 0.1,
            seed: 42,
        }
    }
}

impl AugmentOptions {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn rng(&self) -> StdRng {
        StdRng::seed_from_u64(self.seed)
    }
}

/// One sampled transform. Row/column conventions follow the raster layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineParams {
    pub theta_degrees: f32,
    pub shift_rows: f32,
    pub shift_cols: f32,
    pub zoom_rows: f32,
    pub zoom_cols: f32,
}

impl AffineParams {
    pub const IDENTITY: AffineParams = AffineParams {
        theta_degrees: 0.0,
        shift_rows: 0.0,
        shift_cols: 0.0,
        zoom_rows: 1.0,
        zoom_cols: 1.0,
    };

    pub fn sample(rng: &mut StdRng, options: &AugmentOptions, height: usize, width: usize) -> Self {
        let theta_degrees = jitter_range(rng, options.rotation_degrees);
        let shift_rows = jitter_range(rng, options.height_shift) * height as f32;
        let shift_cols = jitter_range(rng, options.width_shift) * width as f32;
        let (zoom_rows, zoom_cols) = if options.zoom > 0.0 {
            (
                1.0 + jitter_range(rng, options.zoom),
                1.0 + jitter_range(rng, options.zoom),
            )
        } else {
            (1.0, 1.0)
        };
        Self {
            theta_degrees,
            shift_rows,
            shift_cols,
            zoom_rows,
            zoom_cols,
        }
    }

    /// Output-to-input mapping as a 2x3 matrix in (row, col) coordinates,
    /// composed as rotation · shift · zoom about the origin.
    fn matrix(&self) -> [[f32; 3]; 2] {
        let theta = self.theta_degrees.to_radians();
        let (sin, cos) = theta.sin_cos();
        let rot = [[cos, -sin], [sin, cos]];
        let zoom = [[self.zoom_rows, 0.0], [0.0, self.zoom_cols]];
        let mut linear = [[0.0f32; 2]; 2];
        for r in 0..2 {
            for c in 0..2 {
                linear[r][c] = rot[r][0] * zoom[0][c] + rot[r][1] * zoom[1][c];
            }
        }
        let tx = rot[0][0] * self.shift_rows + rot[0][1] * self.shift_cols;
        let ty = rot[1][0] * self.shift_rows + rot[1][1] * self.shift_cols;
        [[linear[0][0], linear[0][1], tx], [linear[1][0], linear[1][1], ty]]
    }
}

/// Draw a random transform and apply it to an `HWC` raster with `channels`
/// interleaved values per pixel.
pub fn augment_image(
    pixels: &[f32],
    height: usize,
    width: usize,
    channels: usize,
    rng: &mut StdRng,
    options: &AugmentOptions,
) -> Vec<f32> {
    if !options.enabled || pixels.is_empty() {
        return pixels.to_vec();
    }
    let params = AffineParams::sample(rng, options, height, width);
    apply_affine(pixels, height, width, channels, &params)
}

/// Resample `pixels` through `params` about the image centre, bilinear with
/// edge replication outside the source.
pub fn apply_affine(
    pixels: &[f32],
    height: usize,
    width: usize,
    channels: usize,
    params: &AffineParams,
) -> Vec<f32> {
    if pixels.len() != height * width * channels || height == 0 || width == 0 {
        return pixels.to_vec();
    }
    if *params == AffineParams::IDENTITY {
        return pixels.to_vec();
    }
    let m = params.matrix();
    let center_r = height as f32 / 2.0 - 0.5;
    let center_c = width as f32 / 2.0 - 0.5;
    let mut out = vec![0.0f32; pixels.len()];
    for r in 0..height {
        let dr = r as f32 - center_r;
        for c in 0..width {
            let dc = c as f32 - center_c;
            let src_r = m[0][0] * dr + m[0][1] * dc + m[0][2] + center_r;
            let src_c = m[1][0] * dr + m[1][1] * dc + m[1][2] + center_c;
            let base = (r * width + c) * channels;
            sample_bilinear(pixels, height, width, channels, src_r, src_c, &mut out[base..base + channels]);
        }
    }
    out
}

fn sample_bilinear(
    pixels: &[f32],
    height: usize,
    width: usize,
    channels: usize,
    row: f32,
    col: f32,
    out: &mut [f32],
) {
    let max_r = (height - 1) as f32;
    let max_c = (width - 1) as f32;
    let row = if row.is_finite() { row.clamp(0.0, max_r) } else { 0.0 };
    let col = if col.is_finite() { col.clamp(0.0, max_c) } else { 0.0 };
    let r0 = row.floor() as usize;
    let c0 = col.floor() as usize;
    let r1 = (r0 + 1).min(height - 1);
    let c1 = (c0 + 1).min(width - 1);
    let fr = row - r0 as f32;
    let fc = col - c0 as f32;
    for ch in 0..channels {
        let at = |r: usize, c: usize| pixels[(r * width + c) * channels + ch];
        let top = at(r0, c0) + (at(r0, c1) - at(r0, c0)) * fc;
        let bottom = at(r1, c0) + (at(r1, c1) - at(r1, c0)) * fc;
        out[ch] = top + (bottom - top) * fr;
    }
}

fn jitter_range(rng: &mut StdRng, range: f32) -> f32 {
    if range <= 0.0 {
        0.0
    } else {
        rng.random_range(-range..=range)
    }
}
