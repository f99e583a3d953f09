//! HTTP calls for `invoke-http-call` actions.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use reqwest::Method;
use salvo_script::payload::HttpPayload;
use salvo_types::value::display_string;
use salvo_types::{Result, SalvoError};
use serde::Serialize;
use serde_json::Value;

/// A completed HTTP exchange.
#[derive(Debug, Clone, Serialize)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    /// Parsed JSON when the body parses, otherwise the raw text; null when empty.
    pub body: Value,
}

impl HttpResponse {
    /// Transport metadata kept beside the payload: status and headers.
    pub fn transport(&self) -> Value {
        serde_json::json!({
            "status": self.status,
            "headers": self.headers,
        })
    }
}

/// Thin wrapper over a shared `reqwest::Client`.
#[derive(Clone, Default)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Perform the call described by `payload`. Attachment paths resolve
    /// against `base_dir`.
    pub async fn call(
        &self,
        payload: &HttpPayload,
        base_dir: &Path,
        timeout: Duration,
    ) -> Result<HttpResponse> {
        let url = fill_path_placeholders(&payload.target, &payload.path);
        let method = if payload.attachment.is_some() {
            Method::POST
        } else {
            Method::from_bytes(payload.method.trim().to_ascii_uppercase().as_bytes())
                .map_err(|e| SalvoError::capability("http", format!("invalid method: {}", e)))?
        };

        let query: Vec<(String, String)> = payload
            .parameters
            .iter()
            .map(|(k, v)| (k.clone(), display_string(v)))
            .collect();

        let mut request = self
            .client
            .request(method.clone(), &url)
            .timeout(timeout)
            .query(&query);
        for (name, value) in &payload.headers {
            request = request.header(name.as_str(), display_string(value));
        }

        if let Some(attachment) = &payload.attachment {
            let file_path = base_dir.join(&attachment.file_path);
            let bytes = tokio::fs::read(&file_path).await.map_err(|e| {
                SalvoError::capability(
                    "http",
                    format!("cannot read attachment {}: {}", file_path.display(), e),
                )
            })?;
            let file_name = file_path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| attachment.file_name.clone());
            let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
            request = request.multipart(
                reqwest::multipart::Form::new().part(attachment.file_name.clone(), part),
            );
        } else if let Some(data) = payload.data.as_ref().filter(|d| !d.is_null()) {
            if method != Method::GET && method != Method::HEAD {
                request = match data {
                    Value::Object(_) | Value::Array(_) => request.json(data),
                    other => request.body(display_string(other)),
                };
            }
        }

        tracing::debug!(method = %method, url = %url, "Sending HTTP request");
        let response = request
            .send()
            .await
            .map_err(|e| SalvoError::capability("http", e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), String::from_utf8_lossy(v.as_bytes()).to_string()))
            .collect();
        let text = response
            .text()
            .await
            .map_err(|e| SalvoError::capability("http", e.to_string()))?;

        if !(200..300).contains(&status) {
            tracing::warn!(url = %url, status, "HTTP call returned a non-success status");
        }

        Ok(HttpResponse {
            status,
            headers,
            body: parse_body(&text),
        })
    }
}

/// Replace `${name}` placeholders in `target` with values from `path`.
pub fn fill_path_placeholders(target: &str, path: &BTreeMap<String, Value>) -> String {
    let mut url = target.to_string();
    for (name, value) in path {
        url = url.replace(&format!("${{{}}}", name), &display_string(value));
    }
    url
}

/// JSON when the text parses as JSON, the text otherwise, null when blank.
pub fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}
