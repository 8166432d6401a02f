//! Per-sign binary classifiers for the ASL alphabet.
//!
//! For every label the dataset is split into "this sign" and "every other
//! sign", a small CNN is trained on the two sets, and the model is persisted
//! as one artifact per label.

/// Dataset download and extraction.
pub mod acquire;
/// The closed label alphabet.
pub mod alphabet;
/// Application directory helpers.
pub mod app_dirs;
/// TOML configuration.
pub mod config;
/// Dataset layout, partitioning and image loading.
pub mod dataset;
mod http_client;
/// Logging setup shared by the binaries.
pub mod logging;
/// Model, training, persistence and inference.
pub mod ml;
/// Per-label orchestration.
pub mod pipeline;
