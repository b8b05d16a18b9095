//! Data plumbing and the training loop for `neurograph-core` models.
//!
//! [`VecDataset`] holds paired examples, [`samplers`] decide the visiting
//! order and [`DataLoader`] copies mini-batches into flat feed buffers.
//! [`train_fnn1`] ties them to an RMSProp optimizer.

pub mod dataloader;
pub mod datasets;
pub mod samplers;
pub mod trainer;

pub use dataloader::DataLoader;
pub use datasets::{Dataset, VecDataset};
pub use trainer::{train_fnn1, TrainConfig};
