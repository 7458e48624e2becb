use super::types::{ApiError, ErrorResponse, HealthResponse, PredictRequest};
use crate::{
    Error,
    service::{ClassifierService, PredictInput, PredictOutput, Verdict},
};
use axum::{extract::State, response::Json};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

const ROOT_MESSAGE: &str = "Malicious URL Detection API is running";

#[derive(Clone)]
pub struct AppState {
    pub classifier: Option<Arc<ClassifierService>>,
    pub model_path: String,
}

impl AppState {
    pub fn new(model_path: impl Into<String>, classifier: ClassifierService) -> Self {
        Self {
            classifier: Some(Arc::new(classifier)),
            model_path: model_path.into(),
        }
    }

    /// State with no model behind it; prediction routes answer 500.
    pub fn unloaded(model_path: impl Into<String>) -> Self {
        Self {
            classifier: None,
            model_path: model_path.into(),
        }
    }

    fn classifier(&self) -> Result<Arc<ClassifierService>, ApiError> {
        self.classifier.clone().ok_or_else(|| {
            error!("Prediction requested but no model is loaded");
            ErrorResponse::from_error(&Error::unavailable("Model or encoder not loaded"))
        })
    }

    async fn health(&self, message: Option<String>) -> HealthResponse {
        let present = tokio::fs::try_exists(&self.model_path)
            .await
            .unwrap_or(false);
        let classifier = self.classifier.as_deref();

        HealthResponse {
            message,
            status: "ok".to_string(),
            model_path: if present {
                self.model_path.clone()
            } else {
                "missing".to_string()
            },
            model_loaded: classifier.is_some(),
            convention: classifier.map(ClassifierService::convention),
            classes: classifier.map(|c| c.classes().to_vec()),
            loaded_at: classifier.map(ClassifierService::loaded_at),
        }
    }
}

pub async fn root(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(state.health(Some(ROOT_MESSAGE.to_string())).await)
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(state.health(None).await)
}

pub async fn predict(
    State(state): State<AppState>,
    PredictRequest(input): PredictRequest,
) -> Result<Json<PredictOutput>, ApiError> {
    let request_id = Uuid::new_v4();
    let classifier = state.classifier()?;

    let count = match &input {
        PredictInput::Single(_) => 1,
        PredictInput::Batch(urls) => urls.len(),
    };
    info!("Received prediction request {} for {} URL(s)", request_id, count);

    match run_blocking(move || classifier.predict(input)).await {
        Ok(output) => {
            info!("Prediction request {} succeeded", request_id);
            Ok(Json(output))
        }
        Err(e) => {
            error!("Prediction request {} failed: {}", request_id, e);
            Err(ErrorResponse::from_error(&e))
        }
    }
}

pub async fn classify(
    State(state): State<AppState>,
    PredictRequest(input): PredictRequest,
) -> Result<Json<Verdict>, ApiError> {
    let request_id = Uuid::new_v4();
    let classifier = state.classifier()?;

    let PredictInput::Single(url) = input else {
        return Err(ErrorResponse::from_error(&Error::validation(
            "classify takes a single `url`; use /predict for batches",
        )));
    };
    info!("Received classify request {}", request_id);

    run_blocking(move || classifier.classify(url))
        .await
        .map(Json)
        .map_err(|e| {
            error!("Classify request {} failed: {}", request_id, e);
            ErrorResponse::from_error(&e)
        })
}

/// Model inference is CPU-bound; keep it off the async workers.
async fn run_blocking<T, F>(work: F) -> crate::Result<T>
where
    F: FnOnce() -> crate::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| Error::prediction(format!("inference task failed: {}", e)))?
}
