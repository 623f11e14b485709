use color_eyre::{eyre::eyre, Report, Result};
use reqwest::{header, Method, RequestBuilder, Response};
use serde_json::Value;
use url::Url;

use crate::config::Config;

/// Error returned by the backend with a non-success status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
  pub status: u16,
  pub message: String,
}

impl std::fmt::Display for ApiError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} (status {})", self.message, self.status)
  }
}

impl std::error::Error for ApiError {}

/// HTTP client for the backend's REST and auth endpoints
#[derive(Clone)]
pub struct RestClient {
  http: reqwest::Client,
  base: Url,
  api_key: String,
  access_token: Option<String>,
}

impl RestClient {
  pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
    // Url::join drops the last path segment unless the base ends with '/'
    let normalized = format!("{}/", base_url.trim_end_matches('/'));
    let base =
      Url::parse(&normalized).map_err(|e| eyre!("Invalid backend URL {}: {}", base_url, e))?;

    let http = reqwest::Client::builder()
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base,
      api_key: api_key.to_string(),
      access_token: None,
    })
  }

  pub fn from_config(config: &Config) -> Result<Self> {
    let api_key = Config::get_api_key()?;
    Self::new(&config.backend.url, &api_key)
  }

  /// Authenticate requests as a signed-in user instead of the anonymous key.
  pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
    self.access_token = Some(token.into());
    self
  }

  pub fn endpoint(&self, path: &str) -> Result<Url> {
    self
      .base
      .join(path.trim_start_matches('/'))
      .map_err(|e| eyre!("Invalid endpoint {}: {}", path, e))
  }

  /// Start a request with the backend's auth headers attached.
  pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
    let url = self.endpoint(path)?;
    let bearer = self.access_token.as_deref().unwrap_or(&self.api_key);

    Ok(
      self
        .http
        .request(method, url)
        .header("apikey", &self.api_key)
        .header(header::AUTHORIZATION, format!("Bearer {}", bearer)),
    )
  }

  /// Send a request, turning non-success statuses into [`ApiError`].
  pub async fn send(&self, request: RequestBuilder) -> Result<Response> {
    let res = request
      .send()
      .await
      .map_err(|e| eyre!("Request failed: {}", e))?;
    handle_response_error(res).await
  }

  /// Send a request and decode its JSON body.
  pub async fn send_json<T: serde::de::DeserializeOwned>(
    &self,
    request: RequestBuilder,
  ) -> Result<T> {
    let res = self.send(request).await?;
    res
      .json::<T>()
      .await
      .map_err(|e| eyre!("Failed to decode response: {}", e))
  }
}

async fn handle_response_error(res: Response) -> Result<Response> {
  let status = res.status();
  if status.is_success() {
    return Ok(res);
  }

  let body = res.text().await.unwrap_or_default();
  let message = error_message(&body).unwrap_or_else(|| {
    status
      .canonical_reason()
      .unwrap_or("Unexpected response")
      .to_string()
  });

  Err(Report::new(ApiError {
    status: status.as_u16(),
    message,
  }))
}

/// Pull the human-readable message out of a PostgREST or GoTrue error body.
fn error_message(body: &str) -> Option<String> {
  let value: Value = serde_json::from_str(body).ok()?;
  ["message", "msg", "error_description", "error"]
    .iter()
    .find_map(|key| value.get(*key).and_then(Value::as_str))
    .map(String::from)
}
