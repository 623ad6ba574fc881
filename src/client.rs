//! Core HTTP client for the booking REST API.
//!
//! The [`BookingClient`] struct wraps [`reqwest::Client`] with JSON headers and
//! an optional bearer token and provides typed `get` and `post` methods.
//!
//! API endpoint methods are added to `BookingClient` via `impl` blocks in the
//! [`crate::api`] module.

use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::constants::API_BASE_URL;
use crate::error::{ApiErrorBody, RideError, Result};

/// Core HTTP client for the booking REST API.
///
/// The `Authorization` header value is validated and cached at construction
/// time.
///
/// # Example
///
/// ```no_run
/// use ridesync_rs::client::BookingClient;
///
/// # #[tokio::main]
/// # async fn main() -> ridesync_rs::error::Result<()> {
/// let client = BookingClient::new().with_token("jwt")?;
/// let status = client.get_ride_request_status("b7c1…").await?;
/// println!("{}", status.status);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct BookingClient {
    http: reqwest::Client,
    /// Base URL for REST API requests (defaults to [`API_BASE_URL`]).
    base_url: String,
    /// Pre-built `Authorization: Bearer …` header, if a token was set.
    auth_header: Option<HeaderValue>,
}

impl Default for BookingClient {
    fn default() -> Self {
        Self::new()
    }
}

impl BookingClient {
    /// Create a client for the default base URL (`http://localhost:8002/api/v1`).
    pub fn new() -> Self {
        Self::with_base_url(API_BASE_URL)
    }

    /// Create a client pointing at a custom base URL.
    ///
    /// Useful for testing against a mock server.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .default_headers(Self::default_headers())
            .build()
            .unwrap_or_default();

        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            auth_header: None,
        }
    }

    /// Build a client from `RIDESYNC_API_URL` and `RIDESYNC_TOKEN`.
    ///
    /// Falls back to [`API_BASE_URL`] and no token when unset.
    pub fn from_env() -> Result<Self> {
        let base = std::env::var("RIDESYNC_API_URL").unwrap_or_else(|_| API_BASE_URL.to_owned());
        url::Url::parse(&base)?;
        let client = Self::with_base_url(base);
        match std::env::var("RIDESYNC_TOKEN") {
            Ok(token) if !token.is_empty() => client.with_token(token),
            _ => Ok(client),
        }
    }

    /// Attach a bearer token to every request.
    pub fn with_token(mut self, token: impl AsRef<str>) -> Result<Self> {
        let value = HeaderValue::from_str(&format!("Bearer {}", token.as_ref())).map_err(|_| {
            RideError::InvalidArgument("token contains invalid header characters".into())
        })?;
        self.auth_header = Some(value);
        Ok(self)
    }

    /// Returns a reference to the underlying `reqwest::Client`.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // -----------------------------------------------------------------------
    // Generic HTTP helpers
    // -----------------------------------------------------------------------

    /// Perform a GET request and deserialize the JSON response.
    pub async fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R> {
        let url = self.url(path);
        tracing::debug!(%url, "GET");

        let resp = self
            .http
            .get(&url)
            .headers(self.auth_headers())
            .send()
            .await?;

        self.handle_response(resp).await
    }

    /// Perform a POST request with a JSON body and deserialize the response.
    pub async fn post<B: Serialize, R: DeserializeOwned>(&self, path: &str, body: &B) -> Result<R> {
        let url = self.url(path);
        tracing::debug!(%url, "POST");

        let resp = self
            .http
            .post(&url)
            .headers(self.auth_headers())
            .json(body)
            .send()
            .await?;

        self.handle_response(resp).await
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    /// Build the full URL from a path segment.
    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Default headers applied to every request.
    fn default_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers
    }

    fn auth_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::with_capacity(1);
        if let Some(value) = &self.auth_header {
            headers.insert(header::AUTHORIZATION, value.clone());
        }
        headers
    }

    /// Read a response, returning either the deserialized body or a `RideError`.
    async fn handle_response<R: DeserializeOwned>(&self, resp: reqwest::Response) -> Result<R> {
        let status = resp.status();
        let bytes = resp.bytes().await?;

        if status.is_success() {
            serde_json::from_slice(&bytes).map_err(RideError::Json)
        } else {
            let body = String::from_utf8_lossy(&bytes);
            Err(self.parse_error_body(status, &body))
        }
    }

    /// Try to parse the API's JSON error structure; fall back to a raw HTTP
    /// status error.
    pub(crate) fn parse_error_body(&self, status: reqwest::StatusCode, body: &str) -> RideError {
        if let Ok(api_err) = serde_json::from_str::<ApiErrorBody>(body) {
            if api_err.error_message.is_some() || api_err.message.is_some() {
                return RideError::Api(api_err);
            }
        }
        RideError::HttpStatus {
            status,
            body: body.to_owned(),
        }
    }
}
