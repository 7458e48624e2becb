mod encoder;
mod onnx;

pub use encoder::*;
pub use onnx::*;

use crate::Result;

/// Ordered input handed to a predictor in one call.
#[derive(Debug, Clone, PartialEq)]
pub enum Batch {
    /// Raw URL strings, for predictors that featurize inside their own graph.
    Urls(Vec<String>),
    /// Numeric feature rows produced by a decoder's forward transform.
    Features(Vec<Vec<f32>>),
}

impl Batch {
    pub fn len(&self) -> usize {
        match self {
            Self::Urls(urls) => urls.len(),
            Self::Features(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What a model accepts as its first input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Text,
    /// Feature rows; `width` is `None` when the graph leaves it symbolic.
    Numeric { width: Option<usize> },
}

/// Maps a batch of inputs to class indices, one per input, in order.
pub trait Predictor: Send + Sync {
    fn predict(&self, batch: &Batch) -> Result<Vec<usize>>;

    /// Get the name of this predictor for logging.
    fn name(&self) -> &str;

    /// Declared input, when the predictor knows it. `None` accepts either batch.
    fn input_kind(&self) -> Option<InputKind> {
        None
    }

    /// Number of classes the predictor can emit, when the model declares it.
    fn n_classes(&self) -> Option<usize> {
        None
    }
}

/// Turns raw URLs into feature rows.
pub trait Featurizer: Send + Sync {
    fn transform(&self, urls: &[String]) -> Result<Vec<Vec<f32>>>;

    fn output_width(&self) -> Option<usize> {
        None
    }
}

/// Maps class indices back to labels and, for bundles built that way, raw
/// URLs forward to feature rows.
pub trait LabelDecoder: Send + Sync {
    fn inverse_transform(&self, indices: &[usize]) -> Result<Vec<String>>;

    fn transform(&self, urls: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Whether `transform` is usable on this decoder.
    fn supports_transform(&self) -> bool;

    /// Width of the rows `transform` produces, when known.
    fn feature_width(&self) -> Option<usize> {
        None
    }

    fn classes(&self) -> &[String];
}
