//! Dataset layout, per-label binary partitions and image batching.

pub mod batch;
pub mod images;
pub mod layout;
pub mod partition;
pub mod split;
pub mod work_dir;

pub use partition::{Partition, PartitionError, PartitionSummary, materialize};
pub use work_dir::WorkDir;
