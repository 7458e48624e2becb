use crate::model::{EncoderSpec, LabelDecoder, OnnxRef, Predictor};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, sync::Arc};

/// Order in which the predictor and decoder are applied to a request.
///
/// Parsing is case-insensitive wherever the value comes from: bundle marker,
/// config file, or environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum Convention {
    /// `predictor.predict(urls)` then `decoder.inverse_transform(indices)`.
    #[default]
    PredictThenDecode,
    /// `decoder.transform(urls)`, `predictor.predict(features)`, then
    /// `decoder.inverse_transform(indices)`.
    TransformThenPredict,
}

impl Convention {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PredictThenDecode => "predict_then_decode",
            Self::TransformThenPredict => "transform_then_predict",
        }
    }
}

impl fmt::Display for Convention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Convention {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "predict_then_decode" => Ok(Self::PredictThenDecode),
            "transform_then_predict" => Ok(Self::TransformThenPredict),
            other => Err(format!(
                "Unknown convention: '{}'. Valid conventions: predict_then_decode, transform_then_predict",
                other
            )),
        }
    }
}

impl TryFrom<String> for Convention {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Bundle keys accepted for the predictor role, in lookup order.
pub const PREDICTOR_KEYS: [&str; 2] = ["model", "pipeline"];

/// Bundle keys accepted for the decoder role, in lookup order.
pub const DECODER_KEYS: [&str; 2] = ["encoder", "label_encoder"];

pub const CONVENTION_KEY: &str = "convention";

/// A parsed bundle document with synonyms resolved, before any model is loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub predictor_key: &'static str,
    pub predictor: OnnxRef,
    pub decoder_key: &'static str,
    pub encoder: EncoderSpec,
    pub convention: Option<Convention>,
}

/// A loaded bundle with synonyms resolved to a single shape.
#[derive(Clone)]
pub struct ModelBundle {
    pub predictor: Arc<dyn Predictor>,
    pub decoder: Arc<dyn LabelDecoder>,
    pub convention: Convention,
}

impl ModelBundle {
    pub fn new(
        predictor: Arc<dyn Predictor>,
        decoder: Arc<dyn LabelDecoder>,
        convention: Convention,
    ) -> Self {
        Self {
            predictor,
            decoder,
            convention,
        }
    }
}

impl fmt::Debug for ModelBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelBundle")
            .field("predictor", &self.predictor.name())
            .field("classes", &self.decoder.classes())
            .field("convention", &self.convention)
            .finish()
    }
}
