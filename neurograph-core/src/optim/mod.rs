// neurograph-core/src/optim/mod.rs

//! Parameter updates over the collated stores.

pub mod grad_clipping;
pub mod optimizer_trait;
pub mod rmsprop;

pub use grad_clipping::clip_grad_norm;
pub use optimizer_trait::Optimizer;
pub use rmsprop::{rmsprop, RmsProp, RmsPropHyperParams, RMSPROP_EPS};
