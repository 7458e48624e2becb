use crate::{
    Error, Result,
    bundle::{self, Convention, ModelBundle},
    config::ModelConfig,
    model::Batch,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, warn};

/// Cardinality-tagged prediction input.
#[derive(Debug, Clone, PartialEq)]
pub enum PredictInput {
    Single(String),
    Batch(Vec<String>),
}

impl PredictInput {
    fn into_urls(self) -> (Vec<String>, bool) {
        match self {
            Self::Single(url) => (vec![url], true),
            Self::Batch(urls) => (urls, false),
        }
    }
}

/// Output mirroring the cardinality of [`PredictInput`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PredictOutput {
    Single { prediction: String },
    Batch { predictions: Vec<String> },
}

/// Single-URL result carrying the boolean verdict alongside the label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub url: String,
    pub malicious: bool,
    pub prediction: String,
}

/// Serves predictions from a bundle loaded once at startup.
#[derive(Debug, Clone)]
pub struct ClassifierService {
    bundle: ModelBundle,
    loaded_at: DateTime<Utc>,
}

impl ClassifierService {
    pub fn new(bundle: ModelBundle) -> Self {
        if bundle.convention == Convention::TransformThenPredict
            && !bundle.decoder.supports_transform()
        {
            warn!("Decoder cannot transform URLs; every prediction will fail");
        }
        Self {
            bundle,
            loaded_at: Utc::now(),
        }
    }

    /// Loads the bundle named by `config`; any failure is fatal to startup.
    pub async fn from_config(config: &ModelConfig) -> Result<Self> {
        let bundle = bundle::load(&config.path, config.convention).await?;
        Ok(Self::new(bundle))
    }

    pub fn convention(&self) -> Convention {
        self.bundle.convention
    }

    pub fn classes(&self) -> &[String] {
        self.bundle.decoder.classes()
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn predict(&self, input: PredictInput) -> Result<PredictOutput> {
        let (urls, single) = input.into_urls();
        let (_, mut labels) = self.run(urls)?;

        if single {
            let prediction = labels
                .pop()
                .ok_or_else(|| Error::prediction("decoder returned no label"))?;
            Ok(PredictOutput::Single { prediction })
        } else {
            Ok(PredictOutput::Batch {
                predictions: labels,
            })
        }
    }

    /// Classifies one URL. Class index 0 is the benign class.
    pub fn classify(&self, url: String) -> Result<Verdict> {
        let (indices, mut labels) = self.run(vec![url.clone()])?;
        let (Some(index), Some(prediction)) = (indices.first().copied(), labels.pop()) else {
            return Err(Error::prediction("predictor returned no result"));
        };

        Ok(Verdict {
            url,
            malicious: index != 0,
            prediction,
        })
    }

    /// One predictor call and one decoder call over the whole batch.
    fn run(&self, urls: Vec<String>) -> Result<(Vec<usize>, Vec<String>)> {
        let expected = urls.len();
        let predictor = &self.bundle.predictor;
        let decoder = &self.bundle.decoder;

        let batch = match self.bundle.convention {
            Convention::PredictThenDecode => Batch::Urls(urls),
            Convention::TransformThenPredict => {
                let features = decoder.transform(&urls).map_err(prediction_failure)?;
                ensure_len("decoder.transform", features.len(), expected)?;
                Batch::Features(features)
            }
        };

        debug!(
            "Running {} predictor on {} inputs ({})",
            predictor.name(),
            expected,
            self.bundle.convention
        );

        let indices = predictor.predict(&batch).map_err(prediction_failure)?;
        ensure_len("predictor.predict", indices.len(), expected)?;

        let labels = decoder
            .inverse_transform(&indices)
            .map_err(prediction_failure)?;
        ensure_len("decoder.inverse_transform", labels.len(), expected)?;

        Ok((indices, labels))
    }
}

fn prediction_failure(e: Error) -> Error {
    match e {
        Error::Prediction(_) => e,
        other => Error::prediction(other.to_string()),
    }
}

fn ensure_len(stage: &str, actual: usize, expected: usize) -> Result<()> {
    if actual == expected {
        return Ok(());
    }
    error!(
        "{} returned {} results for {} inputs",
        stage, actual, expected
    );
    Err(Error::prediction(format!(
        "{} returned {} results for {} inputs",
        stage, actual, expected
    )))
}
