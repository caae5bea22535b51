//! Response shapes returned by producers.
//!
//! Back-office endpoints wrap their payload as `{ data, error, status }`.
//! Other producers hand back the bare value. Which one a producer returns
//! is part of its contract, so it says so explicitly with `Response`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::api::ApiError;
use crate::error::QueryError;

/// Error payload: either one message or per-field messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorInfo {
    Message(String),
    Fields(BTreeMap<String, String>),
}

impl ErrorInfo {
    pub fn message(msg: impl Into<String>) -> Self {
        ErrorInfo::Message(msg.into())
    }

    /// Turn a producer rejection into something a consumer can show.
    ///
    /// Field-level validation failures keep their shape; anything else
    /// becomes its display text, or `fallback` when that text is empty.
    pub fn from_rejection(err: &anyhow::Error, fallback: &str) -> Self {
        if let Some(ApiError::Validation(fields)) = err.downcast_ref::<ApiError>() {
            return ErrorInfo::Fields(fields.clone());
        }
        if let Some(QueryError::EmptyEnvelope {
            error: Some(info), ..
        }) = err.downcast_ref::<QueryError>()
        {
            return info.clone();
        }

        let msg = err.to_string();
        if msg.trim().is_empty() {
            ErrorInfo::Message(fallback.to_string())
        } else {
            ErrorInfo::Message(msg)
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorInfo::Message(msg) => write!(f, "{}", msg),
            ErrorInfo::Fields(fields) => {
                let parts: Vec<String> = fields
                    .iter()
                    .map(|(field, msg)| format!("{}: {}", field, msg))
                    .collect();
                write!(f, "{}", parts.join("; "))
            }
        }
    }
}

impl From<&str> for ErrorInfo {
    fn from(msg: &str) -> Self {
        ErrorInfo::Message(msg.to_string())
    }
}

impl From<String> for ErrorInfo {
    fn from(msg: String) -> Self {
        ErrorInfo::Message(msg)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<ErrorInfo>,
    #[serde(default)]
    pub status: u16,
}

impl<T> Envelope<T> {
    pub fn success(data: T, status: u16) -> Self {
        Self {
            data: Some(data),
            error: None,
            status,
        }
    }

    pub fn failure(error: impl Into<ErrorInfo>, status: u16) -> Self {
        Self {
            data: None,
            error: Some(error.into()),
            status,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// What a producer resolved with.
#[derive(Debug, Clone, PartialEq)]
pub enum Response<T> {
    Raw(T),
    Enveloped(Envelope<T>),
}

impl<T> Response<T> {
    /// The real payload. An envelope without `data` has nothing to hand over.
    pub fn into_payload(self) -> Result<T, QueryError> {
        match self {
            Response::Raw(value) => Ok(value),
            Response::Enveloped(Envelope {
                data: Some(data), ..
            }) => Ok(data),
            Response::Enveloped(Envelope {
                data: None,
                error,
                status,
            }) => Err(QueryError::EmptyEnvelope { status, error }),
        }
    }
}

impl<T> From<Envelope<T>> for Response<T> {
    fn from(envelope: Envelope<T>) -> Self {
        Response::Enveloped(envelope)
    }
}
