use crate::{Error, Result, bundle::Convention, service::PredictInput};
use axum::{
    Json,
    body::Bytes,
    extract::{FromRequest, Request},
    http::{StatusCode, header::CONTENT_TYPE},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error half of every handler result.
pub type ApiError = (StatusCode, Json<ErrorResponse>);

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ErrorResponse {
    pub fn from_error(e: &Error) -> ApiError {
        let body = match e {
            Error::Prediction(detail) => ErrorResponse {
                error: "Prediction failed".to_string(),
                detail: Some(detail.clone()),
            },
            Error::Validation(msg) | Error::ServiceUnavailable(msg) => ErrorResponse {
                error: msg.clone(),
                detail: None,
            },
            other => ErrorResponse {
                error: other.to_string(),
                detail: None,
            },
        };
        (e.status_code(), Json(body))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub status: String,
    /// Configured artifact path, or `"missing"` when nothing is there.
    pub model_path: String,
    pub model_loaded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convention: Option<Convention>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loaded_at: Option<DateTime<Utc>>,
}

/// Body of `POST /predict` and `POST /classify`.
///
/// Accepts `{"url": ...}`, `{"urls": [...]}`, a bare JSON string, or a
/// `text/plain` body holding one URL. A string `url` wins when both fields
/// are sent; a non-string `url` falls through to `urls`.
#[derive(Debug)]
pub struct PredictRequest(pub PredictInput);

#[axum::async_trait]
impl<S> FromRequest<S> for PredictRequest
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        let is_text = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/plain"));

        let body = Bytes::from_request(req, state)
            .await
            .map_err(|e| ErrorResponse::from_error(&Error::validation(e.body_text())))?;

        let input = if is_text {
            parse_text(&body)
        } else {
            parse_json(&body)
        };

        input
            .map(Self)
            .map_err(|e| ErrorResponse::from_error(&e))
    }
}

fn parse_text(body: &[u8]) -> Result<PredictInput> {
    let text = std::str::from_utf8(body)
        .map_err(|_| Error::validation("Request body is not valid UTF-8"))?
        .trim();
    if text.is_empty() {
        return Err(Error::validation("Please provide a URL in the request body"));
    }
    Ok(PredictInput::Single(text.to_string()))
}

fn parse_json(body: &[u8]) -> Result<PredictInput> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(Error::validation("Please provide a URL in the request body"));
    }
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| Error::validation(format!("Malformed JSON body: {}", e)))?;
    input_from_value(value)
}

pub fn input_from_value(value: Value) -> Result<PredictInput> {
    match value {
        Value::String(url) => Ok(PredictInput::Single(url)),
        Value::Object(mut fields) => {
            let url = fields.remove("url");
            if let Some(Value::String(url)) = url {
                return Ok(PredictInput::Single(url));
            }
            if let Some(urls) = fields.remove("urls") {
                let Value::Array(items) = urls else {
                    return Err(Error::validation("urls must be an array of strings"));
                };
                return items
                    .into_iter()
                    .map(|item| match item {
                        Value::String(url) => Ok(url),
                        _ => Err(Error::validation("urls must be an array of strings")),
                    })
                    .collect::<Result<Vec<_>>>()
                    .map(PredictInput::Batch);
            }
            if url.is_some() {
                return Err(Error::validation("URL must be a string"));
            }
            Err(Error::validation(
                "Please provide a URL in the request body (`url` or `urls`)",
            ))
        }
        _ => Err(Error::validation(
            "Request body must be a JSON object with `url` or `urls`",
        )),
    }
}
