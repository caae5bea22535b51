//! REST client for the back-office API.
//!
//! `ApiClient` speaks JSON over `reqwest` with an optional bearer token and
//! normalizes every body into an `Envelope`, reading each endpoint in the
//! `BodyShape` it declares. `ApiMutation` binds one endpoint to a
//! `Mutation` and reports outcomes through a `Notifier`.

pub mod client;
pub mod error;
pub mod mutation;
pub mod notify;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::{ApiClient, BodyShape, DEFAULT_API_URL};
pub use error::ApiError;
pub use mutation::{ApiMutation, ApiMutationOptions};
pub use notify::{Notifier, TracingNotifier, NOTIFY_TARGET};
