//! Body extraction: turning a buffered response into a JSON value.

use std::fmt;
use std::sync::Arc;

use anyhow::Context;
use serde_json::Value;

use crate::transport::HttpResponse;

/// Custom extraction function.
pub type ExtractFn = Arc<dyn Fn(&HttpResponse) -> anyhow::Result<Value> + Send + Sync>;

/// How a handler entry reads its response body.
#[derive(Clone, Default)]
pub enum Extract {
    /// Sniff `Content-Type`: JSON when it contains `application/json`, text otherwise.
    #[default]
    Auto,
    /// Always decode the body as JSON.
    Json,
    /// Always read the body as text (`Value::String`).
    Text,
    /// User-supplied extraction.
    Custom(ExtractFn),
}

impl Extract {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&HttpResponse) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Extract::Custom(Arc::new(f))
    }

    /// Run the extraction against `response`.
    pub fn extract(&self, response: &HttpResponse) -> anyhow::Result<Value> {
        match self {
            Extract::Auto => {
                if is_json(response) {
                    json_body(response)
                } else {
                    Ok(text_body(response))
                }
            }
            Extract::Json => json_body(response),
            Extract::Text => Ok(text_body(response)),
            Extract::Custom(f) => f(response),
        }
    }
}

impl fmt::Debug for Extract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Extract::Auto => f.write_str("Auto"),
            Extract::Json => f.write_str("Json"),
            Extract::Text => f.write_str("Text"),
            Extract::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

fn is_json(response: &HttpResponse) -> bool {
    response
        .content_type()
        .is_some_and(|ct| ct.to_ascii_lowercase().contains("application/json"))
}

fn json_body(response: &HttpResponse) -> anyhow::Result<Value> {
    serde_json::from_slice(&response.body).context("response body is not valid JSON")
}

fn text_body(response: &HttpResponse) -> Value {
    Value::String(response.text_lossy())
}
