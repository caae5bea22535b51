//! Write operations with tracked state and callbacks.
//!
//! A `Mutation` never touches the query cache. It runs its function, tracks
//! `is_loading` across the call, unwraps the response envelope the same way
//! queries do and then fires `on_success` / `on_error` followed by
//! `on_settled`. Failures are recorded and also returned to the caller.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::envelope::{ErrorInfo, Response};

/// Message used when a failed mutation has nothing better to say.
pub const DEFAULT_MUTATION_ERROR: &str = "Operation failed";

type MutationFn<T, V> = Arc<dyn Fn(V) -> BoxFuture<'static, anyhow::Result<Response<T>>> + Send + Sync>;
type OnSuccess<T, V> = Arc<dyn Fn(T, V) -> BoxFuture<'static, ()> + Send + Sync>;
type OnError<V> = Arc<dyn Fn(&ErrorInfo, &V) + Send + Sync>;
type OnSettled<T, V> = Arc<dyn Fn(Option<&T>, Option<&ErrorInfo>, &V) + Send + Sync>;

pub struct MutationOptions<T, V> {
    on_success: Option<OnSuccess<T, V>>,
    on_error: Option<OnError<V>>,
    on_settled: Option<OnSettled<T, V>>,
}

impl<T, V> Default for MutationOptions<T, V> {
    fn default() -> Self {
        Self {
            on_success: None,
            on_error: None,
            on_settled: None,
        }
    }
}

impl<T, V> Clone for MutationOptions<T, V> {
    fn clone(&self) -> Self {
        Self {
            on_success: self.on_success.clone(),
            on_error: self.on_error.clone(),
            on_settled: self.on_settled.clone(),
        }
    }
}

impl<T, V> MutationOptions<T, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs after a successful call and is awaited before `on_settled`,
    /// so it can refresh queries that depend on the write.
    pub fn on_success<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(T, V) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_success = Some(Arc::new(move |data, variables| f(data, variables).boxed()));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&ErrorInfo, &V) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub fn on_settled(
        mut self,
        f: impl Fn(Option<&T>, Option<&ErrorInfo>, &V) + Send + Sync + 'static,
    ) -> Self {
        self.on_settled = Some(Arc::new(f));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MutationState<T> {
    pub data: Option<T>,
    pub error: Option<ErrorInfo>,
    pub is_loading: bool,
}

impl<T> Default for MutationState<T> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            is_loading: false,
        }
    }
}

impl<T> MutationState<T> {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn is_success(&self) -> bool {
        self.data.is_some()
    }
}

pub struct Mutation<T, V> {
    mutation_fn: MutationFn<T, V>,
    options: MutationOptions<T, V>,
    state: watch::Sender<MutationState<T>>,
}

impl<T, V> Mutation<T, V>
where
    T: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new<F, Fut>(f: F, options: MutationOptions<T, V>) -> Self
    where
        F: Fn(V) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Response<T>>> + Send + 'static,
    {
        let (state, _) = watch::channel(MutationState::default());
        Self {
            mutation_fn: Arc::new(move |variables| f(variables).boxed()),
            options,
            state,
        }
    }

    pub fn state(&self) -> MutationState<T> {
        self.state.borrow().clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading
    }

    pub fn subscribe(&self) -> watch::Receiver<MutationState<T>> {
        self.state.subscribe()
    }

    /// Back to the idle state.
    pub fn reset(&self) {
        self.state.send_replace(MutationState::default());
    }

    /// Run the mutation. On failure the original error comes back after
    /// state and callbacks have been updated.
    pub async fn execute(&self, variables: V) -> anyhow::Result<T> {
        self.state.send_replace(MutationState {
            data: None,
            error: None,
            is_loading: true,
        });

        let outcome = (self.mutation_fn)(variables.clone())
            .await
            .and_then(|response| response.into_payload().map_err(anyhow::Error::from));

        match outcome {
            Ok(data) => {
                self.state.send_replace(MutationState {
                    data: Some(data.clone()),
                    error: None,
                    is_loading: false,
                });
                debug!("Mutation succeeded");

                if let Some(on_success) = &self.options.on_success {
                    on_success(data.clone(), variables.clone()).await;
                }
                if let Some(on_settled) = &self.options.on_settled {
                    on_settled(Some(&data), None, &variables);
                }
                Ok(data)
            }
            Err(e) => {
                let info = ErrorInfo::from_rejection(&e, DEFAULT_MUTATION_ERROR);
                self.state.send_replace(MutationState {
                    data: None,
                    error: Some(info.clone()),
                    is_loading: false,
                });
                warn!(error = %info, "Mutation failed");

                if let Some(on_error) = &self.options.on_error {
                    on_error(&info, &variables);
                }
                if let Some(on_settled) = &self.options.on_settled {
                    on_settled(None, Some(&info), &variables);
                }
                Err(e)
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Envelope;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn logging_options(log: &Log) -> MutationOptions<u32, String> {
        let on_success_log = Arc::clone(log);
        let on_error_log = Arc::clone(log);
        let on_settled_log = Arc::clone(log);
        MutationOptions::new()
            .on_success(move |data: u32, vars: String| {
                let log = Arc::clone(&on_success_log);
                async move {
                    log.lock().unwrap().push(format!("success {} {}", data, vars));
                }
            })
            .on_error(move |e: &ErrorInfo, vars: &String| {
                on_error_log.lock().unwrap().push(format!("error {} {}", e, vars));
            })
            .on_settled(move |data: Option<&u32>, e: Option<&ErrorInfo>, vars: &String| {
                on_settled_log.lock().unwrap().push(format!(
                    "settled {:?} {:?} {}",
                    data,
                    e.map(|e| e.to_string()),
                    vars
                ));
            })
    }

    #[tokio::test]
    async fn test_success_runs_callbacks_in_order() {
        let log: Log = Arc::default();
        let mutation = Mutation::new(
            |vars: String| async move { Ok(Response::from(Envelope::success(vars.len() as u32, 201))) },
            logging_options(&log),
        );

        let data = mutation.execute("tour".to_string()).await.unwrap();
        assert_eq!(data, 4);

        let state = mutation.state();
        assert!(!state.is_loading);
        assert_eq!(state.data, Some(4));
        assert!(state.error.is_none());
        assert_eq!(
            *log.lock().unwrap(),
            vec!["success 4 tour".to_string(), "settled Some(4) None tour".to_string()]
        );
    }

    #[tokio::test]
    async fn test_rejection_is_recorded_and_returned() {
        let log: Log = Arc::default();
        let mutation = Mutation::new(
            |_vars: String| async move { Err::<Response<u32>, _>(anyhow::anyhow!("boom")) },
            logging_options(&log),
        );

        let err = mutation.execute("vars".to_string()).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");

        let state = mutation.state();
        assert!(!state.is_loading);
        assert!(state.data.is_none());
        assert_eq!(state.error, Some(ErrorInfo::message("boom")));
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "error boom vars".to_string(),
                "settled None Some(\"boom\") vars".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_envelope_fails_with_envelope_error() {
        let mutation: Mutation<u32, ()> = Mutation::new(
            |_| async { Ok(Response::from(Envelope::failure("Precio inválido", 400))) },
            MutationOptions::new(),
        );
        assert!(mutation.execute(()).await.is_err());
        assert_eq!(mutation.state().error, Some(ErrorInfo::message("Precio inválido")));
    }

    #[tokio::test]
    async fn test_loading_visible_during_call_and_reset() {
        let mutation: Mutation<u32, ()> = Mutation::new(
            |_| async {
                tokio::task::yield_now().await;
                Ok(Response::Raw(1))
            },
            MutationOptions::new(),
        );
        let mut rx = mutation.subscribe();

        let (result, saw_loading) = tokio::join!(mutation.execute(()), async {
            rx.changed().await.unwrap();
            rx.borrow_and_update().is_loading
        });
        assert_eq!(result.unwrap(), 1);
        assert!(saw_loading);

        mutation.reset();
        assert_eq!(mutation.state(), MutationState::default());
    }
}
