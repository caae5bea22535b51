use std::collections::BTreeMap;

use thiserror::Error;

use crate::envelope::ErrorInfo;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Request rejected: {0}")]
    BadRequest(String),

    #[error("Validation failed: {}", ErrorInfo::Fields(.0.clone()))]
    Validation(BTreeMap<String, String>),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(truncated),
            404 => ApiError::NotFound(truncated),
            400 | 422 => ApiError::BadRequest(truncated),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// Map a failed response, preferring the error the body carries.
    ///
    /// Understands the `{ data, error, status }` envelope and the bare list
    /// of `{ path, message }` issues that validation failures come back as.
    pub fn from_body(status: reqwest::StatusCode, body: &str) -> Self {
        let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
        match parsed.as_ref().and_then(error_info_from_value) {
            Some(ErrorInfo::Fields(fields)) if matches!(status.as_u16(), 400 | 422) => {
                ApiError::Validation(fields)
            }
            Some(info) => Self::from_status(status, &info.to_string()),
            None => Self::from_status(status, body),
        }
    }
}

fn error_info_from_value(value: &serde_json::Value) -> Option<ErrorInfo> {
    if let Some(error) = value.get("error") {
        return serde_json::from_value(error.clone()).ok();
    }

    // [{ "path": ["title"], "message": "..." }, ...]
    let issues = value.as_array()?;
    let mut fields = BTreeMap::new();
    for issue in issues {
        let message = issue.get("message")?.as_str()?;
        let path = issue
            .get("path")
            .and_then(|p| p.as_array())
            .map(|parts| {
                parts
                    .iter()
                    .map(|part| match part {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(".")
            })
            .unwrap_or_default();
        fields.entry(path).or_insert_with(|| message.to_string());
    }
    if fields.is_empty() {
        None
    } else {
        Some(ErrorInfo::Fields(fields))
    }
}
