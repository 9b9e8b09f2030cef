//! Acoustic model: a feed-forward component stack scoring feature frames

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, Result};

const BATCHNORM_EPSILON: f32 = 1e-5;

/// One layer of the acoustic network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Component {
    /// Affine transform, `weights` is (out_dim, in_dim)
    Linear {
        weights: Array2<f32>,
        bias: Array1<f32>,
    },
    /// Batch normalization. In test mode the stored statistics are used;
    /// in training mode statistics come from the batch itself.
    BatchNorm {
        mean: Array1<f32>,
        var: Array1<f32>,
        test_mode: bool,
    },
    /// Dropout. In test mode this is the identity; in training mode the
    /// expected-value scaling by `1 - proportion` is applied.
    Dropout { proportion: f32, test_mode: bool },
}

impl Component {
    fn output_dim(&self, input_dim: usize) -> usize {
        match self {
            Component::Linear { weights, .. } => weights.nrows(),
            _ => input_dim,
        }
    }

    fn describe(&self, input_dim: usize) -> String {
        match self {
            Component::Linear { weights, .. } => {
                format!("linear ({} -> {})", weights.ncols(), weights.nrows())
            }
            Component::BatchNorm { test_mode, .. } => {
                format!("batchnorm (dim={}, test-mode={})", input_dim, test_mode)
            }
            Component::Dropout {
                proportion,
                test_mode,
            } => format!(
                "dropout (proportion={}, test-mode={})",
                proportion, test_mode
            ),
        }
    }
}

/// The acoustic network: evaluates feature rows into per-pdf activations.
///
/// Loaded as the second section of the model file. Before first use the
/// context forces batch-norm and dropout into inference mode and runs
/// [`collapse`](AcousticModel::collapse) to merge redundant computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcousticModel {
    input_dim: usize,
    components: Vec<Component>,
}

impl AcousticModel {
    /// Build from an ordered component stack, checking dimension
    /// consistency between adjacent components.
    pub fn from_components(input_dim: usize, components: Vec<Component>) -> Result<Self> {
        if input_dim == 0 {
            return Err(DecodeError::model_load("Acoustic input dim must be > 0"));
        }
        if components.is_empty() {
            return Err(DecodeError::model_load("Acoustic model has no components"));
        }

        let mut dim = input_dim;
        for (i, c) in components.iter().enumerate() {
            match c {
                Component::Linear { weights, bias } => {
                    if weights.ncols() != dim {
                        return Err(DecodeError::model_load(format!(
                            "Component {} expects input dim {} but gets {}",
                            i,
                            weights.ncols(),
                            dim
                        )));
                    }
                    if bias.len() != weights.nrows() {
                        return Err(DecodeError::model_load(format!(
                            "Component {} bias length {} does not match output dim {}",
                            i,
                            bias.len(),
                            weights.nrows()
                        )));
                    }
                }
                Component::BatchNorm { mean, var, .. } => {
                    if mean.len() != dim || var.len() != dim {
                        return Err(DecodeError::model_load(format!(
                            "Component {} batchnorm stats sized {}/{} for dim {}",
                            i,
                            mean.len(),
                            var.len(),
                            dim
                        )));
                    }
                }
                Component::Dropout { proportion, .. } => {
                    if !(0.0..1.0).contains(proportion) {
                        return Err(DecodeError::model_load(format!(
                            "Component {} dropout proportion {} out of range",
                            i, proportion
                        )));
                    }
                }
            }
            dim = c.output_dim(dim);
        }

        Ok(Self {
            input_dim,
            components,
        })
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    /// Output (pdf) dimension after the last component
    pub fn output_dim(&self) -> usize {
        let mut dim = self.input_dim;
        for c in &self.components {
            dim = c.output_dim(dim);
        }
        dim
    }

    pub fn num_components(&self) -> usize {
        self.components.len()
    }

    /// Force batch-norm and dropout components into inference mode
    pub fn set_inference_mode(&mut self) {
        for c in &mut self.components {
            match c {
                Component::BatchNorm { test_mode, .. } => *test_mode = true,
                Component::Dropout { test_mode, .. } => *test_mode = true,
                Component::Linear { .. } => {}
            }
        }
    }

    /// Simplification pass run once after load: drops inference-mode
    /// dropout components and merges adjacent linear components into one
    /// affine transform.
    pub fn collapse(&mut self) {
        let mut collapsed: Vec<Component> = Vec::with_capacity(self.components.len());

        for c in self.components.drain(..) {
            if let Component::Dropout { test_mode: true, .. } = c {
                continue;
            }

            // w2 (w1 x + b1) + b2 == (w2 w1) x + (w2 b1 + b2)
            let merged = match (collapsed.last(), &c) {
                (
                    Some(Component::Linear {
                        weights: w1,
                        bias: b1,
                    }),
                    Component::Linear {
                        weights: w2,
                        bias: b2,
                    },
                ) => Some(Component::Linear {
                    weights: w2.dot(w1),
                    bias: w2.dot(b1) + b2,
                }),
                _ => None,
            };

            match merged {
                Some(linear) => {
                    collapsed.pop();
                    collapsed.push(linear);
                }
                None => collapsed.push(c),
            }
        }

        self.components = collapsed;
    }

    /// Evaluate a (frames x input_dim) matrix into (frames x output_dim)
    /// activations.
    ///
    /// A feature-dimension mismatch surfaces here as a scoring error; the
    /// session layer deliberately does not pre-validate it.
    pub fn forward(&self, input: &Array2<f32>) -> Result<Array2<f32>> {
        if input.ncols() != self.input_dim {
            return Err(DecodeError::scoring(format!(
                "Feature dimension {} does not match acoustic input dim {}",
                input.ncols(),
                self.input_dim
            )));
        }

        let mut x = input.to_owned();
        for c in &self.components {
            x = match c {
                Component::Linear { weights, bias } => x.dot(&weights.t()) + bias,
                Component::BatchNorm {
                    mean,
                    var,
                    test_mode,
                } => {
                    let (m, v) = if *test_mode {
                        (mean.clone(), var.clone())
                    } else {
                        let m = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(x.ncols()));
                        let v = x.var_axis(Axis(0), 0.0);
                        (m, v)
                    };
                    let scale = v.mapv(|e| 1.0 / (e + BATCHNORM_EPSILON).sqrt());
                    (x - &m) * &scale
                }
                Component::Dropout {
                    proportion,
                    test_mode,
                } => {
                    if *test_mode {
                        x
                    } else {
                        x * (1.0 - proportion)
                    }
                }
            };
        }
        Ok(x)
    }

    /// Human-readable topology description
    pub fn info(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("input-dim: {}\n", self.input_dim));
        out.push_str(&format!("output-dim: {}\n", self.output_dim()));
        out.push_str(&format!("num-components: {}\n", self.components.len()));

        let mut dim = self.input_dim;
        for (i, c) in self.components.iter().enumerate() {
            out.push_str(&format!("component {}: {}\n", i, c.describe(dim)));
            dim = c.output_dim(dim);
        }
        out
    }
}
