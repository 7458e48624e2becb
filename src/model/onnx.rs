use super::{Batch, Featurizer, InputKind, Predictor};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    path::{Path, PathBuf},
};
use tract_onnx::prelude::*;

type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Reference to an ONNX artifact inside a bundle document. A bare string is
/// the file path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OnnxRef {
    Path(PathBuf),
    Spec(OnnxSpec),
}

impl OnnxRef {
    pub fn into_spec(self) -> OnnxSpec {
        match self {
            Self::Path(onnx) => OnnxSpec {
                onnx,
                output: 0,
                threshold: default_threshold(),
            },
            Self::Spec(spec) => spec,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OnnxSpec {
    /// Path to the `.onnx` file, relative to the bundle document.
    pub onnx: PathBuf,
    /// Graph output holding labels or scores. skl2onnx puts labels first.
    #[serde(default)]
    pub output: usize,
    /// Cut-off for single-score outputs.
    #[serde(default = "default_threshold")]
    pub threshold: f32,
}

fn default_threshold() -> f32 {
    0.5
}

/// An optimized ONNX graph, usable as a predictor or as a URL featurizer.
pub struct OnnxModel {
    name: String,
    plan: OnnxPlan,
    input: InputKind,
    input_rank: usize,
    output: usize,
    threshold: f32,
    output_width: Option<usize>,
    n_classes: Option<usize>,
}

impl OnnxModel {
    /// Loads `spec.onnx`, resolved against `base_dir`.
    pub fn load(spec: &OnnxSpec, base_dir: &Path) -> Result<Self> {
        let path = base_dir.join(&spec.onnx);
        if !path.is_file() {
            return Err(Error::not_found(path.display().to_string()));
        }

        let model = tract_onnx::onnx()
            .model_for_path(&path)
            .map_err(|e| Error::invalid_bundle(format!("cannot read {}: {}", path.display(), e)))?;

        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| "onnx".to_string());

        Self::from_model(model, name, spec)
    }

    /// Optimizes an already parsed graph and records what it consumes and emits.
    pub fn from_model(model: InferenceModel, name: impl Into<String>, spec: &OnnxSpec) -> Result<Self> {
        let name = name.into();
        let graph_error = |e: TractError| Error::invalid_bundle(format!("model '{}': {}", name, e));

        let plan = model
            .into_optimized()
            .and_then(|typed| typed.into_runnable())
            .map_err(graph_error)?;

        let graph = plan.model();
        if graph.inputs.len() != 1 {
            return Err(Error::invalid_bundle(format!(
                "model '{}' takes {} inputs, expected 1",
                name,
                graph.inputs.len()
            )));
        }
        if spec.output >= graph.outputs.len() {
            return Err(Error::invalid_bundle(format!(
                "model '{}' has {} outputs, output {} requested",
                name,
                graph.outputs.len(),
                spec.output
            )));
        }

        let input_fact = graph.input_fact(0).map_err(graph_error)?;
        let input_rank = input_fact.shape.len();
        let input = if input_fact.datum_type == DatumType::String {
            InputKind::Text
        } else {
            InputKind::Numeric {
                width: last_dim(input_fact),
            }
        };

        let output_fact = graph.output_fact(spec.output).map_err(graph_error)?;
        let output_width = last_dim(output_fact);
        let n_classes = class_count(graph, spec.output);

        Ok(Self {
            name,
            plan,
            input,
            input_rank,
            output: spec.output,
            threshold: spec.threshold,
            output_width,
            n_classes,
        })
    }

    pub fn input(&self) -> InputKind {
        self.input
    }

    fn run(&self, input: Tensor) -> Result<Tensor> {
        let outputs = self
            .plan
            .run(tvec!(input.into()))
            .map_err(|e| Error::prediction(format!("model '{}': {}", self.name, e)))?;

        outputs
            .into_iter()
            .nth(self.output)
            .map(|value| value.into_tensor())
            .ok_or_else(|| Error::prediction(format!("model '{}' produced no output {}", self.name, self.output)))
    }

    fn text_tensor(&self, urls: &[String]) -> Result<Tensor> {
        // skl2onnx declares string inputs as [N, 1]
        let shape = if self.input_rank == 1 {
            vec![urls.len()]
        } else {
            vec![urls.len(), 1]
        };
        let array = tract_ndarray::ArrayD::from_shape_vec(shape, urls.to_vec())
            .map_err(|e| Error::prediction(e.to_string()))?;
        Ok(array.into_tensor())
    }

    fn feature_tensor(&self, rows: &[Vec<f32>]) -> Result<Tensor> {
        let width = rows.first().map(Vec::len).unwrap_or(0);
        if let InputKind::Numeric { width: Some(expected) } = self.input {
            if width != expected {
                return Err(Error::prediction(format!(
                    "model '{}' expects {} features per row, got {}",
                    self.name, expected, width
                )));
            }
        }
        if let Some(row) = rows.iter().position(|row| row.len() != width) {
            return Err(Error::prediction(format!(
                "feature row {} has {} values, expected {}",
                row,
                rows[row].len(),
                width
            )));
        }

        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        let array = tract_ndarray::Array2::from_shape_vec((rows.len(), width), flat)
            .map_err(|e| Error::prediction(e.to_string()))?;
        Ok(array.into_tensor())
    }

    /// Integer outputs are class indices. Float outputs are scores: argmax
    /// across classes, or `threshold` when there is a single score per row.
    fn decode(&self, output: &Tensor) -> Result<Vec<usize>> {
        let datum_type = output.datum_type();
        let tract_error = |e: TractError| Error::prediction(format!("model '{}': {}", self.name, e));

        if datum_type.is_integer() {
            let labels = output.cast_to::<i64>().map_err(tract_error)?;
            return labels
                .as_slice::<i64>()
                .map_err(tract_error)?
                .iter()
                .map(|&label| {
                    usize::try_from(label)
                        .map_err(|_| Error::prediction(format!("model '{}' emitted class {}", self.name, label)))
                })
                .collect();
        }

        if datum_type.is_float() {
            let scores = output.cast_to::<f32>().map_err(tract_error)?;
            let scores = scores.as_slice::<f32>().map_err(tract_error)?;
            let width = match output.shape() {
                [_, .., last] => *last,
                _ => 1,
            };
            if width <= 1 {
                return Ok(scores.iter().map(|&s| usize::from(s > self.threshold)).collect());
            }
            return Ok(scores.chunks(width).map(argmax).collect());
        }

        Err(Error::prediction(format!(
            "model '{}' output has unsupported type {:?}",
            self.name, datum_type
        )))
    }
}

impl Predictor for OnnxModel {
    fn predict(&self, batch: &Batch) -> Result<Vec<usize>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let input = match (self.input, batch) {
            (InputKind::Text, Batch::Urls(urls)) => self.text_tensor(urls)?,
            (InputKind::Numeric { .. }, Batch::Features(rows)) => self.feature_tensor(rows)?,
            (InputKind::Text, Batch::Features(_)) => {
                return Err(Error::prediction(format!("model '{}' takes raw URLs, got feature rows", self.name)));
            }
            (InputKind::Numeric { .. }, Batch::Urls(_)) => {
                return Err(Error::prediction(format!("model '{}' takes feature rows, got raw URLs", self.name)));
            }
        };

        let output = self.run(input)?;
        self.decode(&output)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn input_kind(&self) -> Option<InputKind> {
        Some(self.input)
    }

    fn n_classes(&self) -> Option<usize> {
        self.n_classes
    }
}

impl Featurizer for OnnxModel {
    fn transform(&self, urls: &[String]) -> Result<Vec<Vec<f32>>> {
        if urls.is_empty() {
            return Ok(Vec::new());
        }
        if self.input != InputKind::Text {
            return Err(Error::prediction(format!("featurizer '{}' does not take raw URLs", self.name)));
        }

        let output = self.run(self.text_tensor(urls)?)?;
        let features = output
            .cast_to::<f32>()
            .map_err(|e| Error::prediction(format!("featurizer '{}': {}", self.name, e)))?;
        let values = features
            .as_slice::<f32>()
            .map_err(|e| Error::prediction(format!("featurizer '{}': {}", self.name, e)))?;

        let width = values.len() / urls.len();
        if width * urls.len() != values.len() {
            return Err(Error::prediction(format!(
                "featurizer '{}' returned {} values for {} URLs",
                self.name,
                values.len(),
                urls.len()
            )));
        }
        Ok(values.chunks(width.max(1)).map(<[f32]>::to_vec).collect())
    }

    fn output_width(&self) -> Option<usize> {
        self.output_width
    }
}

impl fmt::Debug for OnnxModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnnxModel")
            .field("name", &self.name)
            .field("input", &self.input)
            .field("output", &self.output)
            .field("n_classes", &self.n_classes)
            .finish()
    }
}

fn last_dim(fact: &TypedFact) -> Option<usize> {
    fact.shape
        .to_tvec()
        .last()
        .and_then(|dim| dim.to_i64().ok())
        .and_then(|dim| usize::try_from(dim).ok())
}

/// Classes the graph can emit: the score width of a float output, or of the
/// probability output that follows an integer label output.
fn class_count(graph: &TypedModel, output: usize) -> Option<usize> {
    let fact = graph.output_fact(output).ok()?;
    let scores = if fact.datum_type.is_float() {
        fact
    } else {
        let next = graph.output_fact(output + 1).ok()?;
        if !next.datum_type.is_float() {
            return None;
        }
        next
    };

    match (scores.shape.len(), last_dim(scores)) {
        (0 | 1, _) | (_, Some(1)) => Some(2),
        (_, width) => width,
    }
}

fn argmax(row: &[f32]) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best, max), (i, &v)| {
            if v > max { (i, v) } else { (best, max) }
        })
        .0
}
