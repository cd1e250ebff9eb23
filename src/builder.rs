//! Network builder.
//!
//! `NetworkBuilder` is the recommended way to define a network.
//!
//! It makes the stratum structure explicit (hidden widths, the activation they
//! use, the strategy each one trains with) and always closes the stack with a
//! logits stratum feeding the softmax terminal.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{Activation, Error, Network, Result, Shape, StrategyKind, Stratum};

#[derive(Debug, Clone, Copy)]
struct DenseSpec {
    nodes: usize,
    activation: Activation,
    strategy: StrategyKind,
}

#[derive(Debug, Clone, Copy)]
struct LogitsSpec {
    classes: usize,
    strategy: StrategyKind,
}

#[derive(Debug, Clone)]
/// Builder for a `Network`.
///
/// Example:
///
/// ```rust
/// use strata_nn::{Activation, NetworkBuilder, StrategyKind};
///
/// # fn main() -> strata_nn::Result<()> {
/// let net = NetworkBuilder::new(4)?
///     .activation(Activation::Tanh)
///     .add_dense_layer(8, StrategyKind::rprop())?
///     .add_logits_layer(3, StrategyKind::adam())?
///     .build_with_seed(0)?;
/// assert_eq!(net.num_strata(), 3);
/// # Ok(())
/// # }
/// ```
pub struct NetworkBuilder {
    input_width: usize,
    activation: Activation,
    layers: Vec<DenseSpec>,
    logits: Option<LogitsSpec>,
}

impl NetworkBuilder {
    /// Start building a network that accepts inputs of length `input_width`.
    pub fn new(input_width: usize) -> Result<Self> {
        if input_width == 0 {
            return Err(Error::InvalidConfig("input_width must be > 0".to_owned()));
        }
        Ok(Self {
            input_width,
            activation: Activation::default(),
            layers: Vec::new(),
            logits: None,
        })
    }

    /// Activation used by dense layers added after this call (sigmoid by default).
    pub fn activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    /// Add a hidden dense stratum with `width` nodes.
    pub fn add_dense_layer(mut self, width: usize, strategy: StrategyKind) -> Result<Self> {
        if width == 0 {
            return Err(Error::InvalidConfig("layer width must be > 0".to_owned()));
        }
        if self.logits.is_some() {
            return Err(Error::InvalidConfig(
                "dense layers must precede the logits layer".to_owned(),
            ));
        }
        strategy.validate()?;

        self.layers.push(DenseSpec {
            nodes: width,
            activation: self.activation,
            strategy,
        });
        Ok(self)
    }

    /// Add the logits stratum; the softmax terminal over `classes` follows it.
    pub fn add_logits_layer(mut self, classes: usize, strategy: StrategyKind) -> Result<Self> {
        if classes < 2 {
            return Err(Error::InvalidConfig(format!(
                "a classifier needs at least 2 classes, got {classes}"
            )));
        }
        if self.logits.is_some() {
            return Err(Error::InvalidConfig(
                "the logits layer was already added".to_owned(),
            ));
        }
        strategy.validate()?;

        self.logits = Some(LogitsSpec { classes, strategy });
        Ok(self)
    }

    /// Build using a deterministic seed.
    pub fn build_with_seed(self, seed: u64) -> Result<Network> {
        let mut rng = StdRng::seed_from_u64(seed);
        self.build_with_rng(&mut rng)
    }

    /// Build using the provided RNG.
    pub fn build_with_rng<R: Rng + ?Sized>(self, rng: &mut R) -> Result<Network> {
        let Some(logits) = self.logits else {
            return Err(Error::InvalidConfig(
                "network must end with a logits layer".to_owned(),
            ));
        };

        let mut strata = Vec::with_capacity(self.layers.len() + 2);
        let mut input_width = self.input_width;
        for spec in self.layers {
            let shape = Shape::new(spec.nodes, input_width)?;
            strata.push(Stratum::dense(
                strata.len(),
                shape,
                spec.activation,
                spec.strategy,
            )?);
            input_width = spec.nodes;
        }

        let shape = Shape::new(logits.classes, input_width)?;
        strata.push(Stratum::logits(strata.len(), shape, logits.strategy)?);
        strata.push(Stratum::softmax(strata.len(), logits.classes)?);

        Network::from_strata(strata, rng)
    }
}
