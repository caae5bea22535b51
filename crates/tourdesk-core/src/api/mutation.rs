//! A `Mutation` bound to one endpoint, with optional notifications.

use std::sync::Arc;

use reqwest::Method;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::watch;

use crate::envelope::{ErrorInfo, Response};
use crate::mutation::{Mutation, MutationOptions, MutationState, DEFAULT_MUTATION_ERROR};

use super::{ApiClient, BodyShape, Notifier};

#[derive(Debug, Clone)]
pub struct ApiMutationOptions {
    pub method: Method,
    pub shape: BodyShape,
    pub success_message: Option<String>,
    pub error_message: Option<String>,
}

impl Default for ApiMutationOptions {
    fn default() -> Self {
        Self {
            method: Method::POST,
            shape: BodyShape::Enveloped,
            success_message: None,
            error_message: None,
        }
    }
}

impl ApiMutationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Shape the endpoint answers with. Enveloped unless set.
    pub fn shape(mut self, shape: BodyShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn success_message(mut self, message: impl Into<String>) -> Self {
        self.success_message = Some(message.into());
        self
    }

    pub fn error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

pub struct ApiMutation<T, B> {
    mutation: Mutation<T, Option<B>>,
    notifier: Arc<dyn Notifier>,
    options: ApiMutationOptions,
}

impl<T, B> ApiMutation<T, B>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
    B: Serialize + Clone + Send + Sync + 'static,
{
    pub fn new(
        client: ApiClient,
        path: impl Into<String>,
        options: ApiMutationOptions,
        callbacks: MutationOptions<T, Option<B>>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let path = path.into();
        let method = options.method.clone();
        let shape = options.shape;
        let mutation = Mutation::new(
            move |body: Option<B>| {
                let client = client.clone();
                let path = path.clone();
                let method = method.clone();
                async move {
                    let envelope = client.request::<T, B>(method, &path, body.as_ref(), shape).await?;
                    Ok(Response::Enveloped(envelope))
                }
            },
            callbacks,
        );

        Self {
            mutation,
            notifier,
            options,
        }
    }

    /// Send `body` (or nothing). The success message is posted after the
    /// callbacks ran; the error message only when one was configured.
    pub async fn execute(&self, body: Option<B>) -> anyhow::Result<T> {
        match self.mutation.execute(body).await {
            Ok(data) => {
                if let Some(message) = &self.options.success_message {
                    self.notifier.success(message);
                }
                Ok(data)
            }
            Err(e) => {
                if let Some(message) = &self.options.error_message {
                    self.notifier.error(message);
                }
                Err(e)
            }
        }
    }

    pub fn state(&self) -> MutationState<T> {
        self.mutation.state()
    }

    pub fn is_loading(&self) -> bool {
        self.mutation.is_loading()
    }

    /// Error of the last call, if it failed.
    pub fn error(&self) -> Option<ErrorInfo> {
        self.mutation.state().error
    }

    /// Error text suitable for a status line.
    pub fn error_text(&self) -> Option<String> {
        self.error().map(|e| {
            let text = e.to_string();
            if text.is_empty() {
                self.options
                    .error_message
                    .clone()
                    .unwrap_or_else(|| DEFAULT_MUTATION_ERROR.to_string())
            } else {
                text
            }
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<MutationState<T>> {
        self.mutation.subscribe()
    }

    pub fn reset(&self) {
        self.mutation.reset();
    }
}
