use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use urlguard_rust::{
    Error, Result,
    model::{Batch, Featurizer, LabelDecoder, Predictor},
};

/// URLs containing this marker are classified as class 1.
pub const MALICIOUS_MARKER: &str = "evil";

/// Shared, ordered record of predictor and decoder calls.
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn new_call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Mock predictor: class 1 for URLs containing [`MALICIOUS_MARKER`], or for
/// feature rows whose first value is above 0.5.
#[derive(Debug)]
pub struct MockPredictor {
    pub batches: Arc<Mutex<Vec<Batch>>>,
    pub log: CallLog,
    pub error: Option<String>,
    pub delay: Option<Duration>,
}

impl MockPredictor {
    pub fn new(log: CallLog) -> Self {
        Self {
            batches: Arc::new(Mutex::new(Vec::new())),
            log,
            error: None,
            delay: None,
        }
    }

    pub fn with_error(mut self, error: String) -> Self {
        self.error = Some(error);
        self
    }

    /// Block the calling thread for `delay` on every prediction
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn get_batches(&self) -> Vec<Batch> {
        self.batches.lock().unwrap().clone()
    }
}

impl Predictor for MockPredictor {
    fn predict(&self, batch: &Batch) -> Result<Vec<usize>> {
        self.log.lock().unwrap().push("predict".to_string());
        self.batches.lock().unwrap().push(batch.clone());

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        if let Some(ref error) = self.error {
            return Err(Error::prediction(error.clone()));
        }

        Ok(match batch {
            Batch::Urls(urls) => urls
                .iter()
                .map(|u| usize::from(u.contains(MALICIOUS_MARKER)))
                .collect(),
            Batch::Features(rows) => rows
                .iter()
                .map(|r| usize::from(r.first().copied().unwrap_or(0.0) > 0.5))
                .collect(),
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Mock decoder over a fixed class list. `transform` emits one feature per
/// URL: 1.0 when it contains [`MALICIOUS_MARKER`].
#[derive(Debug)]
pub struct MockDecoder {
    pub classes: Vec<String>,
    pub log: CallLog,
    pub transforms: bool,
    pub error: Option<String>,
}

impl MockDecoder {
    pub fn new(log: CallLog) -> Self {
        Self {
            classes: vec!["benign".to_string(), "malicious".to_string()],
            log,
            transforms: false,
            error: None,
        }
    }

    pub fn with_transform(mut self) -> Self {
        self.transforms = true;
        self
    }

    pub fn with_error(mut self, error: String) -> Self {
        self.error = Some(error);
        self
    }
}

impl LabelDecoder for MockDecoder {
    fn inverse_transform(&self, indices: &[usize]) -> Result<Vec<String>> {
        self.log.lock().unwrap().push("inverse_transform".to_string());

        if let Some(ref error) = self.error {
            return Err(Error::prediction(error.clone()));
        }

        indices
            .iter()
            .map(|&i| {
                self.classes
                    .get(i)
                    .cloned()
                    .ok_or_else(|| Error::prediction(format!("unknown class index {}", i)))
            })
            .collect()
    }

    fn transform(&self, urls: &[String]) -> Result<Vec<Vec<f32>>> {
        self.log.lock().unwrap().push("transform".to_string());

        if !self.transforms {
            return Err(Error::prediction("mock decoder cannot transform"));
        }

        Ok(urls
            .iter()
            .map(|u| vec![if u.contains(MALICIOUS_MARKER) { 1.0 } else { 0.0 }])
            .collect())
    }

    fn supports_transform(&self) -> bool {
        self.transforms
    }

    fn classes(&self) -> &[String] {
        &self.classes
    }
}

/// Two features per URL, `[0.0, 1.0]` when it contains [`MALICIOUS_MARKER`]
/// and `[1.0, 0.0]` otherwise.
#[derive(Debug, Default)]
pub struct KeywordFeaturizer;

impl Featurizer for KeywordFeaturizer {
    fn transform(&self, urls: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(urls
            .iter()
            .map(|u| {
                if u.contains(MALICIOUS_MARKER) {
                    vec![0.0, 1.0]
                } else {
                    vec![1.0, 0.0]
                }
            })
            .collect())
    }

    fn output_width(&self) -> Option<usize> {
        Some(2)
    }
}
