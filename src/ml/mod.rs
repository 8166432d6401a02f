//! Per-sign convolutional classifiers: model, training, persistence and
//! inference.

pub mod artifact;
pub mod augment;
pub mod backend;
pub mod callbacks;
pub mod history;
pub mod infer;
pub mod metrics;
pub mod model;
pub mod train;
