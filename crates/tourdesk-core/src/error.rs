use thiserror::Error;

use crate::envelope::ErrorInfo;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Cached value for '{key}' could not be decoded: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Value for '{key}' could not be encoded: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Response carried no data (status {status}){}", describe_error(.error))]
    EmptyEnvelope {
        status: u16,
        error: Option<ErrorInfo>,
    },
}

fn describe_error(error: &Option<ErrorInfo>) -> String {
    match error {
        Some(info) => format!(": {}", info),
        None => String::new(),
    }
}
