//! HTTP client for the back-office REST API.
//!
//! Every call comes back as an `Envelope<T>`. Each call names the
//! `BodyShape` its endpoint answers with: enveloped bodies are read as
//! `{ data, error, status }`, bare bodies are wrapped, so callers see one
//! shape either way.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{header, Client, Method};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::envelope::Envelope;
use crate::models::{NewTour, Tour};
use crate::pagination::Page;

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Used when neither the config file nor the environment names a server.
pub const DEFAULT_API_URL: &str = "http://localhost:3000/api";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// How an endpoint frames a successful body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyShape {
    /// `{ data, error, status }`.
    #[default]
    Enveloped,
    /// The payload itself.
    Bare,
}

/// API client for the back office.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Set the bearer token for authenticated requests
    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    /// Same server and connection pool, different credentials.
    pub fn with_token(&self, token: String) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: Some(token),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn auth_headers(&self) -> Result<header::HeaderMap> {
        let mut headers = header::HeaderMap::new();
        if let Some(ref token) = self.token {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("Bearer {}", token))?,
            );
        }
        Ok(headers)
    }

    /// Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_body(status, &body).into())
        }
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
    ) -> Result<reqwest::Response> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let mut request = self
                .client
                .request(method.clone(), url)
                .headers(self.auth_headers()?)
                .header(header::ACCEPT, "application/json");
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request
                .send()
                .await
                .with_context(|| format!("Failed to send {} request to {}", method, url))?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => return Ok(response),
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited.into());
                    }
                    warn!(url = url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }

    /// Send a request and read the body in the given shape.
    pub async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        shape: BodyShape,
    ) -> Result<Envelope<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = self.url(path);
        let response = self.send(method.clone(), &url, body).await?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .with_context(|| format!("Failed to read response body from {}", url))?;
        debug!(method = %method, url = %url, status = status, bytes = text.len(), "API response");

        parse_body(shape, status, &text)
            .with_context(|| format!("Failed to parse JSON response from {}", url))
    }

    // The verb helpers expect enveloped bodies; the `_bare` variants read
    // the payload as-is.

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Envelope<T>> {
        self.request::<T, ()>(Method::GET, path, None, BodyShape::Enveloped).await
    }

    pub async fn get_bare<T: DeserializeOwned>(&self, path: &str) -> Result<Envelope<T>> {
        self.request::<T, ()>(Method::GET, path, None, BodyShape::Bare).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Envelope<T>> {
        self.request(Method::POST, path, Some(body), BodyShape::Enveloped).await
    }

    pub async fn post_bare<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Envelope<T>> {
        self.request(Method::POST, path, Some(body), BodyShape::Bare).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Envelope<T>> {
        self.request(Method::PUT, path, Some(body), BodyShape::Enveloped).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<Envelope<T>> {
        self.request::<T, ()>(Method::DELETE, path, None, BodyShape::Enveloped).await
    }

    // ===== Tours =====

    // `/tours` answers with bare JSON.

    /// One page of the tour catalogue.
    ///
    /// Servers that ignore the paging parameters and send the whole list
    /// get sliced here, so callers always see a proper page.
    pub async fn tours_page(&self, page: u32, page_size: u32) -> Result<Page<Tour>> {
        let path = format!("tours?page={}&limit={}", page, page_size);
        let envelope: Envelope<Value> = self.get_bare(&path).await?;
        let payload = crate::envelope::Response::from(envelope).into_payload()?;
        page_from_payload(payload, page, page_size).context("Failed to parse tours page")
    }

    pub async fn create_tour(&self, tour: &NewTour) -> Result<Envelope<Tour>> {
        self.post_bare("tours", tour).await
    }
}

/// Read a success body. Empty bodies (204) carry a JSON `null` payload
/// whatever the shape.
fn parse_body<T: DeserializeOwned>(shape: BodyShape, status: u16, text: &str) -> serde_json::Result<Envelope<T>> {
    if text.trim().is_empty() {
        return Ok(Envelope::success(serde_json::from_value(Value::Null)?, status));
    }

    match shape {
        BodyShape::Enveloped => {
            let mut envelope: Envelope<T> = serde_json::from_str(text)?;
            if envelope.status == 0 {
                envelope.status = status;
            }
            Ok(envelope)
        }
        BodyShape::Bare => Ok(Envelope::success(serde_json::from_str(text)?, status)),
    }
}

fn page_from_payload(payload: Value, page: u32, page_size: u32) -> serde_json::Result<Page<Tour>> {
    match payload {
        Value::Array(_) => {
            let all: Vec<Tour> = serde_json::from_value(payload)?;
            let total = all.len() as u64;
            let start = (page.saturating_sub(1) as usize).saturating_mul(page_size as usize);
            let items = all.into_iter().skip(start).take(page_size as usize).collect();
            Ok(Page { items, total })
        }
        other => serde_json::from_value(other),
    }
}

// ============================================================================
// Tests
// ============================================================================
