//! Error types for the generation server API.
//!
//! [`ComfyError`] covers the HTTP endpoints and the WebSocket push channel.
//! The tool-level taxonomy in [`crate::error::GenError`] is derived from it.

use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur while talking to the generation server.
#[derive(Debug, Error)]
pub enum ComfyError {
    /// The server could not be reached at all (connection refused, DNS, connect timeout).
    #[error("server unreachable at {url}: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-2xx status.
    /// `body` is the raw response text, kept for diagnostics.
    #[error("server returned status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Any other transport failure after the connection was established.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The response body did not have the expected shape.
    #[error("unexpected response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The WebSocket push channel failed (handshake or read).
    #[error("push channel error: {0}")]
    Channel(String),
}

#[derive(Deserialize)]
struct RawRejection {
    error: Option<RawErrorBody>,
    #[serde(default)]
    node_errors: serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct RawErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: String,
}

impl ComfyError {
    /// Classify a `reqwest` failure: connect-phase errors become [`ComfyError::Unreachable`].
    pub fn from_request(url: &str, err: reqwest::Error) -> Self {
        if err.is_connect() {
            ComfyError::Unreachable {
                url: url.to_string(),
                source: err,
            }
        } else {
            ComfyError::Http(err)
        }
    }

    /// Human-readable diagnostic for a rejected submission.
    ///
    /// The server reports validation failures as
    /// `{"error": {"message", "details"}, "node_errors": {id: {...}}}`;
    /// when the body has that shape the message and the offending node ids
    /// are extracted, otherwise the raw body is returned.
    pub fn diagnostic(&self) -> String {
        let ComfyError::Rejected { body, .. } = self else {
            return self.to_string();
        };

        let Ok(parsed) = serde_json::from_str::<RawRejection>(body) else {
            return body.clone();
        };

        let mut out = match parsed.error {
            Some(e) if e.details.is_empty() => e.message,
            Some(e) => format!("{}: {}", e.message, e.details),
            None => body.clone(),
        };

        for (node_id, detail) in &parsed.node_errors {
            let class = detail
                .get("class_type")
                .and_then(|v| v.as_str())
                .unwrap_or("?");
            let reasons: Vec<&str> = detail
                .get("errors")
                .and_then(|v| v.as_array())
                .map(|errs| {
                    errs.iter()
                        .filter_map(|e| e.get("message").and_then(|m| m.as_str()))
                        .collect()
                })
                .unwrap_or_default();
            out.push_str(&format!("\n  node {node_id} ({class}): {}", reasons.join("; ")));
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_display() {
        let err = ComfyError::Rejected {
            status: 400,
            body: "bad prompt".into(),
        };
        assert_eq!(err.to_string(), "server returned status 400: bad prompt");
    }

    #[test]
    fn diagnostic_extracts_message_and_node_errors() {
        let body = r#"{
            "error": {"type": "prompt_outputs_failed_validation", "message": "Prompt outputs failed validation", "details": ""},
            "node_errors": {
                "4": {"class_type": "CheckpointLoaderSimple", "errors": [{"message": "Value not in list"}]}
            }
        }"#;
        let err = ComfyError::Rejected {
            status: 400,
            body: body.into(),
        };
        let diag = err.diagnostic();
        assert!(diag.starts_with("Prompt outputs failed validation"));
        assert!(diag.contains("node 4 (CheckpointLoaderSimple): Value not in list"));
    }

    #[test]
    fn diagnostic_falls_back_to_raw_body() {
        let err = ComfyError::Rejected {
            status: 500,
            body: "internal explosion".into(),
        };
        assert_eq!(err.diagnostic(), "internal explosion");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ComfyError>();
    }
}
