use super::mocks::{CallLog, MockDecoder, MockPredictor, new_call_log};
use axum::{Router, body::Body, http::Response};
use serde_json::{Value, json};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tempfile::TempDir;
use urlguard_rust::{
    bundle::{Convention, ModelBundle},
    config::{Config, LogsConfig, ModelConfig, ServerConfig},
    server::{self, AppState},
    service::ClassifierService,
};

/// Create a test configuration pointing at `model_path`
pub fn create_test_config(model_path: &str) -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            logs: LogsConfig {
                level: "debug".to_string(),
            },
            cors: false,
        },
        model: ModelConfig {
            path: model_path.to_string(),
            convention: None,
        },
    }
}

/// Create a temporary directory for test files
pub fn create_temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

/// Write a bundle document as JSON, or YAML when `name` ends in .yaml/.yml
pub fn write_bundle(dir: &TempDir, name: &str, bundle: &Value) -> PathBuf {
    let path = dir.path().join(name);
    let is_yaml = Path::new(name)
        .extension()
        .is_some_and(|ext| ext == "yaml" || ext == "yml");
    let content = if is_yaml {
        serde_yaml::to_string(bundle).unwrap()
    } else {
        serde_json::to_string_pretty(bundle).unwrap()
    };
    std::fs::write(&path, content).unwrap();
    path
}

/// Bundle document naming `model_file` under the `model`/`encoder` keys
pub fn onnx_bundle(model_file: &str) -> Value {
    json!({
        "model": model_file,
        "encoder": { "classes": ["benign", "malicious"] },
        "metadata": { "exported_with": "skl2onnx" }
    })
}

/// Transform-then-predict bundle using the `pipeline`/`label_encoder` keys
pub fn transform_bundle(model_file: &str, featurizer_file: &str) -> Value {
    json!({
        "pipeline": { "onnx": model_file, "output": 0 },
        "label_encoder": {
            "classes": ["benign", "malicious"],
            "featurizer": featurizer_file
        },
        "convention": "transform_then_predict"
    })
}

/// Write bytes that are not an ONNX protobuf
pub fn write_garbage_onnx(dir: &TempDir, name: &str) -> PathBuf {
    let path = dir.path().join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, b"\x80\x04\x95joblib pickle").unwrap();
    path
}

/// Classifier service backed by the recording mocks
pub fn create_mock_service(convention: Convention) -> (ClassifierService, Arc<MockPredictor>, CallLog) {
    let log = new_call_log();
    service_with_predictor(MockPredictor::new(log.clone()), convention, log)
}

/// Classifier service around `predictor`, with a mock decoder on `log`
pub fn service_with_predictor(
    predictor: MockPredictor,
    convention: Convention,
    log: CallLog,
) -> (ClassifierService, Arc<MockPredictor>, CallLog) {
    let predictor = Arc::new(predictor);
    let mut decoder = MockDecoder::new(log.clone());
    if convention == Convention::TransformThenPredict {
        decoder = decoder.with_transform();
    }
    let service = ClassifierService::new(ModelBundle::new(
        predictor.clone(),
        Arc::new(decoder),
        convention,
    ));
    (service, predictor, log)
}

/// Router serving `service`, reporting `model_path` in health checks
pub fn create_test_app(service: ClassifierService, model_path: &str) -> Router {
    server::router(AppState::new(model_path, service), false)
}

/// Router with no model loaded
pub fn create_unloaded_app(model_path: &str) -> Router {
    server::router(AppState::unloaded(model_path), false)
}

/// Collect a response body as JSON
pub async fn read_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
