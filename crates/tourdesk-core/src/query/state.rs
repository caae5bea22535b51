use crate::envelope::ErrorInfo;

/// Where a consumer is in its fetch lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    /// Disabled and never fetched
    Idle,
    Loading,
    Success,
    Error,
}

/// State one consumer exposes to its caller.
///
/// `data` survives a refetch while `status` is `Loading`, so callers can keep
/// showing the previous payload.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState<T> {
    pub data: Option<T>,
    pub error: Option<ErrorInfo>,
    pub status: QueryStatus,
}

impl<T> QueryState<T> {
    pub fn initial(data: Option<T>, enabled: bool) -> Self {
        Self {
            data,
            error: None,
            status: if enabled {
                QueryStatus::Loading
            } else {
                QueryStatus::Idle
            },
        }
    }

    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
            status: QueryStatus::Success,
        }
    }

    pub fn failure(error: ErrorInfo) -> Self {
        Self {
            data: None,
            error: Some(error),
            status: QueryStatus::Error,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.status == QueryStatus::Loading
    }

    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Error
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    /// Error text for display, if any.
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(|e| e.to_string())
    }
}
