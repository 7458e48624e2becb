use super::{Featurizer, LabelDecoder, OnnxRef};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

/// Decoder entry as written in a bundle document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncoderSpec {
    pub classes: Vec<String>,
    /// ONNX graph mapping raw URLs to feature rows, for bundles that
    /// featurize before predicting.
    #[serde(default)]
    pub featurizer: Option<OnnxRef>,
}

/// Ordered class labels, with an optional URL featurizer.
#[derive(Clone)]
pub struct LabelEncoder {
    classes: Vec<String>,
    featurizer: Option<Arc<dyn Featurizer>>,
}

impl LabelEncoder {
    pub fn new(classes: Vec<String>) -> Self {
        Self {
            classes,
            featurizer: None,
        }
    }

    pub fn with_featurizer(mut self, featurizer: Arc<dyn Featurizer>) -> Self {
        self.featurizer = Some(featurizer);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.classes.is_empty() {
            return Err(Error::invalid_bundle("label encoder has no classes"));
        }
        Ok(())
    }
}

impl LabelDecoder for LabelEncoder {
    fn inverse_transform(&self, indices: &[usize]) -> Result<Vec<String>> {
        indices
            .iter()
            .map(|&idx| {
                self.classes.get(idx).cloned().ok_or_else(|| {
                    Error::prediction(format!(
                        "y contains previously unseen label {} (encoder knows {} classes)",
                        idx,
                        self.classes.len()
                    ))
                })
            })
            .collect()
    }

    fn transform(&self, urls: &[String]) -> Result<Vec<Vec<f32>>> {
        match &self.featurizer {
            Some(featurizer) => featurizer.transform(urls),
            None => Err(Error::prediction(
                "label encoder has no featurizer, cannot transform URLs",
            )),
        }
    }

    fn supports_transform(&self) -> bool {
        self.featurizer.is_some()
    }

    fn feature_width(&self) -> Option<usize> {
        self.featurizer.as_ref().and_then(|f| f.output_width())
    }

    fn classes(&self) -> &[String] {
        &self.classes
    }
}

impl fmt::Debug for LabelEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LabelEncoder")
            .field("classes", &self.classes)
            .field("featurizer", &self.featurizer.is_some())
            .finish()
    }
}
