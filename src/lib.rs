//! A layered feed-forward classifier trained with per-stratum update strategies.
//!
//! `strata-nn` is a small-core, from-scratch training engine. A [`Network`] is an
//! ordered stack of [`Stratum`]s: dense hidden strata, one logits stratum, and a
//! parameter-free softmax terminal that turns logits into a class distribution and
//! a negative log-likelihood loss. Every parametric stratum owns its own weight
//! update [`Strategy`] (RPROP or ADAM), so strategies can be mixed in one network.
//!
//! # Design goals
//!
//! - Predictable performance: every stratum owns its response, error and gradient
//!   buffers, so full-batch training allocates nothing per epoch.
//! - Clear contracts: shapes are explicit and validated when the network is built.
//! - Practical training loop: loss and accuracy halting, an iteration budget,
//!   keep-alive logging, input normalization, and SGD subset sampling.
//!
//! # Panics vs `Result`
//!
//! - Low-level hot path (panics on misuse):
//!   - [`Network::compute`], [`Stratum::forward`], [`Strategy::apply`]
//!     Shape mismatches are treated as programmer error and will panic via `assert!`.
//!
//! - High-level convenience APIs (validated):
//!   - [`NetworkBuilder`], [`Network::train`], [`Network::evaluate`], [`Network::set_normalize`]
//!     These validate inputs and return [`Result`].
//!
//! # Data layout and shapes
//!
//! - Scalars are `f64`.
//! - [`Dataset`] stores samples contiguously in row-major layout with one class
//!   index per row.
//! - Stratum weights are row-major with shape `(nodes, input_width + 1)`; column 0
//!   holds the bias, so every input is implicitly augmented with a leading `1`.
//!
//! # Quick start
//!
//! ```rust
//! use strata_nn::{Dataset, NetworkBuilder, Outcome, StrategyKind};
//!
//! # fn main() -> strata_nn::Result<()> {
//! let xs = vec![
//!     vec![0.0, 0.0],
//!     vec![0.0, 1.0],
//!     vec![1.0, 0.0],
//!     vec![1.0, 1.0],
//! ];
//! let data = Dataset::from_rows(&xs, &[0, 1, 1, 0])?;
//!
//! let mut net = NetworkBuilder::new(2)?
//!     .add_dense_layer(8, StrategyKind::rprop())?
//!     .add_logits_layer(2, StrategyKind::rprop())?
//!     .build_with_seed(0)?;
//! net.set_accuracy();
//! net.set_keep_alive(0);
//!
//! let outcome = net.train(&data)?;
//! assert_ne!(outcome, Outcome::Diverged);
//! let _class = net.compute(&[1.0, 0.0]);
//! # Ok(())
//! # }
//! ```

pub mod activation;
pub mod builder;
pub mod data;
pub mod error;
pub(crate) mod matmul;
pub mod matrix;
pub mod metrics;
pub mod network;
pub mod normalize;
pub mod sampling;
pub mod shape;
pub mod strategy;
pub mod stratum;
pub mod train;

pub use activation::Activation;
pub use builder::NetworkBuilder;
pub use data::Dataset;
pub use error::{Error, Result};
pub use matrix::Matrix;
pub use metrics::EpochStats;
pub use network::Network;
pub use normalize::Normalization;
pub use sampling::Sampler;
pub use shape::Shape;
pub use strategy::{AdamConfig, RpropConfig, Strategy, StrategyKind};
pub use stratum::{LOSS_SENTINEL, Stratum, StratumKind};
pub use train::{EpochReport, Outcome, TrainConfig};
