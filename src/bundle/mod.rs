mod types;

pub use types::*;

use crate::{
    Error, Result,
    model::{InputKind, LabelDecoder, LabelEncoder, OnnxModel, Predictor},
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::{path::Path, sync::Arc};
use tracing::{debug, info};

/// Loads and validates the bundle at `path`.
///
/// A missing file, or a missing ONNX file it references, is
/// [`Error::NotFound`]; anything unreadable or structurally wrong is
/// [`Error::InvalidBundle`]. `convention_override` wins over the bundle's own
/// marker.
pub async fn load(
    path: impl AsRef<Path>,
    convention_override: Option<Convention>,
) -> Result<ModelBundle> {
    let path = path.as_ref();
    let shown = path.display().to_string();

    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Err(Error::not_found(shown));
    }

    debug!("Loading model bundle from: {}", shown);

    let raw = tokio::fs::read_to_string(path).await?;
    let value = parse_document(path, &raw)
        .map_err(|e| Error::invalid_bundle(format!("cannot parse {}: {}", shown, e)))?;

    let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
    let bundle = from_value(value, base_dir, convention_override)?;

    info!(
        "Loaded model bundle from {} (predictor: {}, classes: {}, convention: {})",
        shown,
        bundle.predictor.name(),
        bundle.decoder.classes().len(),
        bundle.convention
    );

    Ok(bundle)
}

fn parse_document(path: &Path, raw: &str) -> std::result::Result<Value, String> {
    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));

    if is_yaml {
        serde_yaml::from_str(raw).map_err(|e| e.to_string())
    } else {
        serde_json::from_str(raw).map_err(|e| e.to_string())
    }
}

/// Normalizes a parsed bundle document and loads the ONNX graphs it names,
/// resolving their paths against `base_dir`.
pub fn from_value(
    value: Value,
    base_dir: &Path,
    convention_override: Option<Convention>,
) -> Result<ModelBundle> {
    let manifest = parse_manifest(value)?;
    let convention = convention_override
        .or(manifest.convention)
        .unwrap_or_default();

    debug!(
        "Resolved bundle roles: predictor from '{}', decoder from '{}', convention {}",
        manifest.predictor_key, manifest.decoder_key, convention
    );

    let predictor = OnnxModel::load(&manifest.predictor.into_spec(), base_dir)?;

    let mut encoder = LabelEncoder::new(manifest.encoder.classes);
    if let Some(featurizer) = manifest.encoder.featurizer {
        let featurizer = OnnxModel::load(&featurizer.into_spec(), base_dir)?;
        if featurizer.input() != InputKind::Text {
            return Err(Error::invalid_bundle(
                "encoder featurizer must take raw URL strings",
            ));
        }
        encoder = encoder.with_featurizer(Arc::new(featurizer));
    }
    encoder.validate()?;

    assemble(Arc::new(predictor), Arc::new(encoder), convention)
}

/// Resolves the predictor and decoder roles, accepting either synonym for
/// each, and reads the optional convention marker.
pub fn parse_manifest(value: Value) -> Result<Manifest> {
    let Value::Object(mut document) = value else {
        return Err(Error::invalid_bundle(format!(
            "Model bundle is not a mapping ({}). Found keys: (none)",
            value_kind(&value)
        )));
    };

    let mut found_keys: Vec<String> = document.keys().cloned().collect();
    found_keys.sort_unstable();

    let roles = (
        take_first(&mut document, &PREDICTOR_KEYS),
        take_first(&mut document, &DECODER_KEYS),
    );
    let ((predictor_key, predictor_value), (decoder_key, decoder_value)) = match roles {
        (Some(predictor), Some(decoder)) => (predictor, decoder),
        _ => {
            let found = if found_keys.is_empty() {
                "(none)".to_string()
            } else {
                found_keys.join(", ")
            };
            return Err(Error::invalid_bundle(format!(
                "Model bundle doesn't contain expected keys. Found keys: {}",
                found
            )));
        }
    };

    let convention = match document.remove(CONVENTION_KEY) {
        Some(Value::Null) | None => None,
        Some(value) => Some(decode_entry(CONVENTION_KEY, value)?),
    };

    Ok(Manifest {
        predictor_key,
        predictor: decode_entry(predictor_key, predictor_value)?,
        decoder_key,
        encoder: decode_entry(decoder_key, decoder_value)?,
        convention,
    })
}

/// Checks that a predictor and decoder can serve together under
/// `convention`, then pairs them.
pub fn assemble(
    predictor: Arc<dyn Predictor>,
    decoder: Arc<dyn LabelDecoder>,
    convention: Convention,
) -> Result<ModelBundle> {
    let known = decoder.classes().len();
    if known == 0 {
        return Err(Error::invalid_bundle("label encoder has no classes"));
    }
    if let Some(emitted) = predictor.n_classes() {
        if emitted != known {
            return Err(Error::invalid_bundle(format!(
                "predictor '{}' emits {} classes but the encoder knows {}",
                predictor.name(),
                emitted,
                known
            )));
        }
    }

    check_convention(predictor.as_ref(), decoder.as_ref(), convention)?;

    Ok(ModelBundle::new(predictor, decoder, convention))
}

/// Removes and returns the first present, non-null key from `keys`.
fn take_first(
    document: &mut Map<String, Value>,
    keys: &[&'static str],
) -> Option<(&'static str, Value)> {
    let mut found = None;
    for key in keys {
        match document.remove(*key) {
            Some(Value::Null) | None => {}
            Some(value) if found.is_none() => found = Some((*key, value)),
            Some(_) => debug!("Ignoring bundle key '{}' shadowed by an earlier synonym", key),
        }
    }
    found
}

fn decode_entry<T: DeserializeOwned>(key: &str, value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| Error::invalid_bundle(format!("bundle key '{}': {}", key, e)))
}

fn check_convention(
    predictor: &dyn Predictor,
    decoder: &dyn LabelDecoder,
    convention: Convention,
) -> Result<()> {
    match (convention, predictor.input_kind()) {
        (Convention::PredictThenDecode, None | Some(InputKind::Text)) => Ok(()),
        (Convention::PredictThenDecode, Some(InputKind::Numeric { .. })) => {
            Err(Error::invalid_bundle(
                "predictor consumes feature rows but the bundle uses predict_then_decode; \
                 export the whole pipeline or use the transform_then_predict convention",
            ))
        }
        (Convention::TransformThenPredict, Some(InputKind::Text)) => Err(Error::invalid_bundle(
            "predictor consumes raw URLs but the bundle uses transform_then_predict",
        )),
        (Convention::TransformThenPredict, kind) => {
            if !decoder.supports_transform() {
                return Err(Error::invalid_bundle(
                    "transform_then_predict requires the encoder to carry a featurizer",
                ));
            }
            match (kind, decoder.feature_width()) {
                (Some(InputKind::Numeric { width: Some(expected) }), Some(produced))
                    if expected != produced =>
                {
                    Err(Error::invalid_bundle(format!(
                        "encoder featurizer produces {} features but predictor expects {}",
                        produced, expected
                    )))
                }
                _ => Ok(()),
            }
        }
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
