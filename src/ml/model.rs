//! Convolutional binary classifier for one sign.
//!
//! ```text
//! (batch, 3, 64, 64)
//!   → 3 × [Conv 3x3 (valid) → ReLU → BatchNorm → MaxPool 2x2 → Dropout 0.25]
//!     with 32, 64 and 128 filters
//!   → flatten (4608)
//!   → Linear(256) → ReLU → BatchNorm → Dropout 0.5
//!   → Linear(1) logits
//! ```

use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{
    BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Initializer, Linear, LinearConfig,
    PaddingConfig2d,
};
use burn::prelude::*;
use burn::tensor::activation::{log_sigmoid, relu, sigmoid};

/// Filters of the three convolution blocks.
pub const CONV_FILTERS: [usize; 3] = [32, 64, 128];
const KERNEL: usize = 3;
const POOL: usize = 2;
const BATCH_NORM_EPSILON: f64 = 1e-3;
const BATCH_NORM_MOMENTUM: f64 = 0.01;

#[derive(Config, Debug)]
pub struct SignCnnConfig {
    /// Square input resolution in pixels.
    #[config(default = 64)]
    pub image_size: usize,
    #[config(default = 256)]
    pub dense_units: usize,
    #[config(default = 0.25)]
    pub conv_dropout: f64,
    #[config(default = 0.5)]
    pub dense_dropout: f64,
}

impl SignCnnConfig {
    /// Spatial side length after the last block, or `None` when the input is
    /// too small for three blocks.
    pub fn feature_side(&self) -> Option<usize> {
        let mut side = self.image_size;
        for _ in CONV_FILTERS {
            side = side.checked_sub(KERNEL - 1)? / POOL;
            if side == 0 {
                return None;
            }
        }
        Some(side)
    }

    /// Width of the flattened feature vector fed to the dense layer.
    pub fn flattened_features(&self) -> Option<usize> {
        let side = self.feature_side()?;
        Some(side * side * CONV_FILTERS[CONV_FILTERS.len() - 1])
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> SignCnn<B> {
        let mut channels = 3;
        let mut blocks = Vec::with_capacity(CONV_FILTERS.len());
        for filters in CONV_FILTERS {
            blocks.push(ConvBlock {
                conv: Conv2dConfig::new([channels, filters], [KERNEL, KERNEL])
                    .with_padding(PaddingConfig2d::Valid)
                    .with_initializer(glorot())
                    .init(device),
                norm: batch_norm(filters, device),
                pool: MaxPool2dConfig::new([POOL, POOL])
                    .with_strides([POOL, POOL])
                    .init(),
                dropout: DropoutConfig::new(self.conv_dropout).init(),
            });
            channels = filters;
        }
        let flattened = self.flattened_features().unwrap_or(0);
        SignCnn {
            blocks,
            dense: LinearConfig::new(flattened, self.dense_units)
                .with_initializer(glorot())
                .init(device),
            dense_norm: batch_norm(self.dense_units, device),
            dense_dropout: DropoutConfig::new(self.dense_dropout).init(),
            output: LinearConfig::new(self.dense_units, 1)
                .with_initializer(glorot())
                .init(device),
        }
    }
}

fn glorot() -> Initializer {
    Initializer::XavierUniform { gain: 1.0 }
}

fn batch_norm<B: Backend>(features: usize, device: &B::Device) -> BatchNorm<B> {
    BatchNormConfig::new(features)
        .with_epsilon(BATCH_NORM_EPSILON)
        .with_momentum(BATCH_NORM_MOMENTUM)
        .init(device)
}

#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv2d<B>,
    norm: BatchNorm<B>,
    pool: MaxPool2d,
    dropout: Dropout,
}

impl<B: Backend> ConvBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = relu(self.conv.forward(x));
        let x = self.norm.forward(x);
        let x = self.pool.forward(x);
        self.dropout.forward(x)
    }
}

/// Dropout and batch-norm statistics follow the backend: training behaviour
/// on an autodiff backend, inference behaviour after `valid()`.
#[derive(Module, Debug)]
pub struct SignCnn<B: Backend> {
    blocks: Vec<ConvBlock<B>>,
    dense: Linear<B>,
    dense_norm: BatchNorm<B>,
    dense_dropout: Dropout,
    output: Linear<B>,
}

impl<B: Backend> SignCnn<B> {
    /// Raw logits, shape `(batch, 1)`.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = images;
        for block in &self.blocks {
            x = block.forward(x);
        }
        let [batch, channels, height, width] = x.dims();
        let x = x.reshape([batch, channels * height * width]);
        let x = relu(self.dense.forward(x));
        let [_, units] = x.dims();
        let x = self
            .dense_norm
            .forward(x.reshape([batch, units, 1]))
            .reshape([batch, units]);
        let x = self.dense_dropout.forward(x);
        self.output.forward(x)
    }

    /// Probability that each image shows the target sign, shape `(batch,)`.
    pub fn predict_proba(&self, images: Tensor<B, 4>) -> Tensor<B, 1> {
        let logits = self.forward(images);
        let [batch, _] = logits.dims();
        sigmoid(logits).reshape([batch])
    }
}

/// Mean binary cross-entropy of `logits` against `targets` in `{0, 1}`,
/// computed in log space.
pub fn binary_cross_entropy_with_logits<B: Backend>(
    logits: Tensor<B, 2>,
    targets: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let log_p = log_sigmoid(logits.clone());
    let log_not_p = log_sigmoid(logits.neg());
    let inverse = targets.clone().neg().add_scalar(1.0);
    (targets * log_p + inverse * log_not_p).neg().mean()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::{ElementConversion, TensorData};

    type B = NdArray;

    #[test]
    fn default_input_flattens_to_4608() {
        let config = SignCnnConfig::new();
        assert_eq!(config.feature_side(), Some(6));
        assert_eq!(config.flattened_features(), Some(4608));
    }

    #[test]
    fn tiny_inputs_are_rejected() {
        let config = SignCnnConfig::new().with_image_size(12);
        assert_eq!(config.flattened_features(), None);
        assert_eq!(SignCnnConfig::new().with_image_size(22).feature_side(), Some(1));
    }

    #[test]
    fn forward_yields_one_logit_per_image() {
        let device = Default::default();
        let model = SignCnnConfig::new().with_image_size(32).init::<B>(&device);
        let images = Tensor::<B, 4>::zeros([2, 3, 32, 32], &device);
        assert_eq!(model.forward(images.clone()).dims(), [2, 1]);
        let probs = model.predict_proba(images).into_data().to_vec::<f32>().unwrap();
        assert_eq!(probs.len(), 2);
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn cross_entropy_matches_closed_form() {
        let device = Default::default();
        let logits = Tensor::<B, 2>::from_data(TensorData::new(vec![0.0f32, 2.0], [2, 1]), &device);
        let targets = Tensor::<B, 2>::from_data(TensorData::new(vec![1.0f32, 0.0], [2, 1]), &device);
        let loss = binary_cross_entropy_with_logits(logits, targets)
            .into_scalar()
            .elem::<f32>();
        let expected = (2.0f32.ln() + (1.0 + 2.0f32.exp()).ln()) / 2.0;
        assert!((loss - expected).abs() < 1e-5, "{loss} vs {expected}");
    }
}
