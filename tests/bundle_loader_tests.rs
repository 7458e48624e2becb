use rstest::rstest;
use serde_json::json;
use urlguard_rust::{
    Error,
    bundle::{self, Convention},
};

mod common;
use common::{create_temp_dir, onnx_bundle, transform_bundle, write_bundle, write_garbage_onnx};

#[tokio::test]
async fn test_missing_file_is_not_found() {
    let temp_dir = create_temp_dir();
    let path = temp_dir.path().join("url_model.json");

    let err = bundle::load(&path, None).await.unwrap_err();

    assert!(matches!(err, Error::NotFound { .. }));
    assert!(err.to_string().contains("url_model.json"));
}

/// Each document format parses far enough to resolve the referenced graph
#[rstest]
#[case("url_model.json")]
#[case("url_model.yaml")]
#[case("url_model.yml")]
#[tokio::test]
async fn test_missing_onnx_graph_is_not_found(#[case] file_name: &str) {
    let temp_dir = create_temp_dir();
    let path = write_bundle(&temp_dir, file_name, &onnx_bundle("url_model.onnx"));

    let err = bundle::load(&path, None).await.unwrap_err();

    assert!(matches!(err, Error::NotFound { .. }));
    let expected = temp_dir.path().join("url_model.onnx");
    assert!(
        err.to_string().contains(&expected.display().to_string()),
        "unexpected message: {}",
        err
    );
}

#[tokio::test]
async fn test_graph_path_is_relative_to_bundle() {
    let temp_dir = create_temp_dir();
    write_garbage_onnx(&temp_dir, "models/url_model.onnx");
    let path = write_bundle(&temp_dir, "url_model.json", &onnx_bundle("models/url_model.onnx"));

    let err = bundle::load(&path, None).await.unwrap_err();

    // found, but not a protobuf
    assert!(matches!(err, Error::InvalidBundle(_)));
    assert!(err.to_string().contains("cannot read"));
}

#[tokio::test]
async fn test_synonym_keys_reach_the_graph_loader() {
    let temp_dir = create_temp_dir();
    write_garbage_onnx(&temp_dir, "pipe.onnx");
    let path = write_bundle(
        &temp_dir,
        "url_model.json",
        &json!({
            "pipeline": "pipe.onnx",
            "label_encoder": { "classes": ["benign", "malicious"] }
        }),
    );

    let err = bundle::load(&path, None).await.unwrap_err();

    assert!(matches!(err, Error::InvalidBundle(_)));
    assert!(err.to_string().contains("pipe.onnx"));
}

#[tokio::test]
async fn test_predictor_graph_loads_before_featurizer() {
    let temp_dir = create_temp_dir();
    write_garbage_onnx(&temp_dir, "scores.onnx");
    let path = write_bundle(
        &temp_dir,
        "url_model.json",
        &transform_bundle("scores.onnx", "features.onnx"),
    );

    let err = bundle::load(&path, Some(Convention::TransformThenPredict))
        .await
        .unwrap_err();

    // the predictor graph fails first
    assert!(matches!(err, Error::InvalidBundle(_)));

    std::fs::remove_file(temp_dir.path().join("scores.onnx")).unwrap();
    let err = bundle::load(&path, None).await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
    assert!(err.to_string().contains("scores.onnx"));
}

#[tokio::test]
async fn test_missing_roles_lists_keys() {
    let temp_dir = create_temp_dir();
    let path = write_bundle(
        &temp_dir,
        "url_model.json",
        &json!({ "classifier": {}, "vectorizer": {}, "version": 3 }),
    );

    let err = bundle::load(&path, None).await.unwrap_err();

    assert!(matches!(err, Error::InvalidBundle(_)));
    assert!(
        err.to_string()
            .ends_with("Found keys: classifier, vectorizer, version"),
        "unexpected message: {}",
        err
    );
}

#[tokio::test]
async fn test_unparseable_file_is_invalid_bundle() {
    let temp_dir = create_temp_dir();
    let path = temp_dir.path().join("url_model.json");
    std::fs::write(&path, "\u{80}joblib pickle bytes").unwrap();

    let err = bundle::load(&path, None).await.unwrap_err();

    assert!(matches!(err, Error::InvalidBundle(_)));
}

#[rstest]
#[case(json!({ "kind": "linear", "coef": [[1.0]], "intercept": [0.0] }))]
#[case(json!(42))]
#[case(json!({ "onnx": "m.onnx", "vectorizer": { "kind": "lexical" } }))]
#[tokio::test]
async fn test_inline_estimators_are_rejected(#[case] model: serde_json::Value) {
    let temp_dir = create_temp_dir();
    let path = write_bundle(
        &temp_dir,
        "url_model.json",
        &json!({ "model": model, "encoder": { "classes": ["a", "b"] } }),
    );

    let err = bundle::load(&path, None).await.unwrap_err();

    assert!(matches!(err, Error::InvalidBundle(_)));
    assert!(err.to_string().contains("bundle key 'model'"));
}

#[tokio::test]
async fn test_unknown_convention_marker() {
    let temp_dir = create_temp_dir();
    let mut document = onnx_bundle("url_model.onnx");
    document["convention"] = json!("decode_then_predict");
    let path = write_bundle(&temp_dir, "url_model.yaml", &document);

    let err = bundle::load(&path, None).await.unwrap_err();

    assert!(matches!(err, Error::InvalidBundle(_)));
    assert!(err.to_string().contains("Unknown convention"));
}
