//! Account flows against the backend's auth service and `users` table.

mod messages;
mod session;

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::Config;
use crate::remote::RestClient;

pub use messages::{friendly_message, recovery_token};
pub use session::{AuthUser, Session, SessionStore};

/// Row of the `users` profile table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
  pub id: String,
  pub email: String,
  pub name: String,
  #[serde(default)]
  pub phone: Option<String>,
  #[serde(default)]
  pub student_id: Option<String>,
  #[serde(default = "default_role")]
  pub role: String,
  #[serde(default)]
  pub created_at: Option<DateTime<Utc>>,
}

fn default_role() -> String {
  "user".to_string()
}

#[derive(Debug, Clone, Default)]
pub struct SignupRequest {
  pub email: String,
  pub password: String,
  pub name: String,
  pub phone: String,
  pub student_id: String,
}

impl SignupRequest {
  fn validate(&self) -> Result<()> {
    let fields = [
      &self.email,
      &self.password,
      &self.name,
      &self.phone,
      &self.student_id,
    ];
    if fields.iter().any(|f| f.trim().is_empty()) {
      return Err(eyre!("All fields are required"));
    }
    Ok(())
  }
}

/// Result of a sign-in or sign-up.
#[derive(Debug, Clone)]
pub struct SignedIn {
  /// Absent when the backend requires email confirmation before sign-in
  pub session: Option<Session>,
  pub profile: UserProfile,
}

/// Client for sign-in, sign-up and password flows.
pub struct AuthClient {
  client: RestClient,
  profile_delay: Duration,
  reset_redirect: String,
}

impl AuthClient {
  pub fn new(client: RestClient, profile_delay: Duration, reset_redirect: impl Into<String>) -> Self {
    Self {
      client,
      profile_delay,
      reset_redirect: reset_redirect.into(),
    }
  }

  pub fn from_config(config: &Config) -> Result<Self> {
    Ok(Self::new(
      RestClient::from_config(config)?,
      config.auth.profile_delay(),
      config.auth_redirect_url("/reset-password"),
    ))
  }

  fn as_user(&self, access_token: &str) -> RestClient {
    self.client.clone().with_access_token(access_token)
  }

  pub async fn login(&self, email: &str, password: &str) -> Result<SignedIn> {
    if email.trim().is_empty() || password.is_empty() {
      return Err(eyre!("Email and password are required"));
    }

    let request = self
      .client
      .request(Method::POST, "auth/v1/token")?
      .query(&[("grant_type", "password")])
      .json(&json!({ "email": email, "password": password }));
    let session: Session = self
      .client
      .send_json(request)
      .await
      .map_err(|e| eyre!(friendly_message(&e)))?;

    tracing::info!(user = %session.user.id, "signed in");
    tokio::time::sleep(self.profile_delay).await;

    let user = &session.user;
    let fallback = NewProfile {
      id: user.id.clone(),
      email: user.email.clone().unwrap_or_default(),
      name: user
        .metadata_str("name")
        .map(String::from)
        .unwrap_or_else(|| local_part(user.email.as_deref().unwrap_or_default())),
      role: user.metadata_str("role").unwrap_or("user").to_string(),
      phone: user.metadata_str("phone").map(String::from),
      student_id: user.metadata_str("studentId").map(String::from),
    };

    let profile = self
      .profile_or_create(&self.as_user(&session.access_token), fallback)
      .await?;

    Ok(SignedIn {
      session: Some(session),
      profile,
    })
  }

  pub async fn signup(&self, req: &SignupRequest) -> Result<SignedIn> {
    req.validate()?;

    let request = self.client.request(Method::POST, "auth/v1/signup")?.json(&json!({
      "email": req.email,
      "password": req.password,
      "data": {
        "name": req.name,
        "role": "user",
        "phone": req.phone,
        "studentId": req.student_id,
      },
    }));
    let body: Value = self
      .client
      .send_json(request)
      .await
      .map_err(|e| eyre!(friendly_message(&e)))?;

    // With auto-confirm on the response is a session; otherwise the bare user
    let (session, user) = if body.get("access_token").is_some() {
      let session: Session = serde_json::from_value(body)
        .map_err(|e| eyre!("Unexpected signup response: {}", e))?;
      let user = session.user.clone();
      (Some(session), user)
    } else {
      let user: AuthUser = serde_json::from_value(body.get("user").cloned().unwrap_or(body))
        .map_err(|e| eyre!("No user data received: {}", e))?;
      (None, user)
    };

    tracing::info!(user = %user.id, confirmed = session.is_some(), "signed up");
    tokio::time::sleep(self.profile_delay).await;

    let client = match &session {
      Some(s) => self.as_user(&s.access_token),
      None => self.client.clone(),
    };
    let fallback = NewProfile {
      id: user.id.clone(),
      email: user.email.clone().unwrap_or_else(|| req.email.clone()),
      name: req.name.clone(),
      role: "user".to_string(),
      phone: Some(req.phone.clone()),
      student_id: Some(req.student_id.clone()),
    };

    match self.profile_or_create(&client, fallback).await {
      Ok(profile) => Ok(SignedIn { session, profile }),
      Err(e) => {
        if let Some(s) = &session {
          if let Err(logout_err) = self.logout(s).await {
            tracing::warn!(error = %logout_err, "sign-out after failed signup did not complete");
          }
        }
        Err(e)
      }
    }
  }

  pub async fn logout(&self, session: &Session) -> Result<()> {
    let client = self.as_user(&session.access_token);
    let request = client.request(Method::POST, "auth/v1/logout")?;
    client
      .send(request)
      .await
      .map_err(|e| eyre!("Failed to sign out. Please try again. ({})", e))?;
    tracing::info!(user = %session.user.id, "signed out");
    Ok(())
  }

  /// Email a password-reset link pointing at the site's reset page.
  pub async fn reset_password(&self, email: &str) -> Result<()> {
    if email.trim().is_empty() {
      return Err(eyre!("Email is required"));
    }

    let request = self
      .client
      .request(Method::POST, "auth/v1/recover")?
      .query(&[("redirect_to", self.reset_redirect.as_str())])
      .json(&json!({ "email": email }));
    self
      .client
      .send(request)
      .await
      .map_err(|e| eyre!(friendly_message(&e)))?;
    Ok(())
  }

  /// Set a new password using a session or recovery access token.
  pub async fn update_password(&self, password: &str, access_token: &str) -> Result<()> {
    if password.is_empty() {
      return Err(eyre!("Password is required"));
    }
    if access_token.is_empty() {
      return Err(eyre!(
        "No valid password reset token found. Please request a new password reset link."
      ));
    }

    let client = self.as_user(access_token);
    let request = client
      .request(Method::PUT, "auth/v1/user")?
      .json(&json!({ "password": password }));
    client
      .send(request)
      .await
      .map_err(|e| eyre!(friendly_message(&e)))?;
    tracing::info!("password updated");
    Ok(())
  }

  async fn profile_or_create(&self, client: &RestClient, fallback: NewProfile) -> Result<UserProfile> {
    let id_filter = format!("eq.{}", fallback.id);
    let request = client
      .request(Method::GET, "rest/v1/users")?
      .query(&[("select", "*"), ("id", id_filter.as_str())]);
    let rows: Vec<UserProfile> = client.send_json(request).await.map_err(|e| {
      tracing::error!(error = %e, "profile lookup failed");
      eyre!("Failed to fetch user profile")
    })?;

    if let Some(profile) = rows.into_iter().next() {
      return Ok(profile);
    }

    tracing::info!(user = %fallback.id, "profile missing, creating it");
    let request = client
      .request(Method::POST, "rest/v1/users")?
      .header("Prefer", "return=representation")
      .json(&fallback);
    let rows: Vec<UserProfile> = client.send_json(request).await.map_err(|e| {
      tracing::error!(error = %e, "profile creation failed");
      eyre!("Failed to create user profile")
    })?;

    rows
      .into_iter()
      .next()
      .ok_or_else(|| eyre!("Failed to create user profile"))
  }
}

#[derive(Debug, Serialize)]
struct NewProfile {
  id: String,
  email: String,
  name: String,
  role: String,
  phone: Option<String>,
  student_id: Option<String>,
}

fn local_part(email: &str) -> String {
  email.split('@').next().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
  use super::*;
  use wiremock::matchers::{body_partial_json, header, method, path, query_param};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  async fn client(server: &MockServer) -> AuthClient {
    let rest = RestClient::new(&server.uri(), "anon").unwrap();
    AuthClient::new(rest, Duration::ZERO, "https://site.test/reset-password")
  }

  fn session_body() -> Value {
    json!({
      "access_token": "user-token",
      "refresh_token": "r",
      "expires_at": 1_700_000_000,
      "user": {
        "id": "u1",
        "email": "ada@example.com",
        "user_metadata": {}
      }
    })
  }

  fn profile_body(name: &str) -> Value {
    json!({
      "id": "u1",
      "email": "ada@example.com",
      "name": name,
      "role": "user",
      "created_at": "2024-01-01T00:00:00Z"
    })
  }

  #[tokio::test]
  async fn test_login_returns_existing_profile() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/auth/v1/token"))
      .and(query_param("grant_type", "password"))
      .respond_with(ResponseTemplate::new(200).set_body_json(session_body()))
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path("/rest/v1/users"))
      .and(query_param("id", "eq.u1"))
      .and(header("authorization", "Bearer user-token"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([profile_body("Ada")])))
      .mount(&server)
      .await;

    let signed_in = client(&server)
      .await
      .login("ada@example.com", "secret")
      .await
      .unwrap();
    assert_eq!(signed_in.profile.name, "Ada");
    assert_eq!(signed_in.session.unwrap().access_token, "user-token");
  }

  #[tokio::test]
  async fn test_login_creates_missing_profile_from_email() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/auth/v1/token"))
      .respond_with(ResponseTemplate::new(200).set_body_json(session_body()))
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path("/rest/v1/users"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
      .mount(&server)
      .await;
    Mock::given(method("POST"))
      .and(path("/rest/v1/users"))
      .and(body_partial_json(json!({"name": "ada", "role": "user"})))
      .respond_with(ResponseTemplate::new(201).set_body_json(json!([profile_body("ada")])))
      .expect(1)
      .mount(&server)
      .await;

    let signed_in = client(&server)
      .await
      .login("ada@example.com", "secret")
      .await
      .unwrap();
    assert_eq!(signed_in.profile.name, "ada");
  }

  #[tokio::test]
  async fn test_login_requires_credentials_and_maps_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/auth/v1/token"))
      .respond_with(
        ResponseTemplate::new(400)
          .set_body_json(json!({"error_description": "Invalid login credentials"})),
      )
      .mount(&server)
      .await;

    let auth = client(&server).await;
    assert_eq!(
      auth.login("", "x").await.unwrap_err().to_string(),
      "Email and password are required"
    );
    assert_eq!(
      auth.login("a@b.c", "bad").await.unwrap_err().to_string(),
      "Invalid email or password"
    );
  }

  #[tokio::test]
  async fn test_signup_sends_metadata_and_maps_duplicates() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/auth/v1/signup"))
      .and(body_partial_json(json!({
        "data": {"name": "Ada", "role": "user", "phone": "123", "studentId": "S1"}
      })))
      .respond_with(ResponseTemplate::new(422).set_body_json(json!({"msg": "User already registered"})))
      .mount(&server)
      .await;

    let req = SignupRequest {
      email: "ada@example.com".to_string(),
      password: "secret1".to_string(),
      name: "Ada".to_string(),
      phone: "123".to_string(),
      student_id: "S1".to_string(),
    };
    let err = client(&server).await.signup(&req).await.unwrap_err();
    assert_eq!(err.to_string(), "Email already registered");

    let incomplete = SignupRequest {
      phone: String::new(),
      ..req
    };
    let err = client(&server).await.signup(&incomplete).await.unwrap_err();
    assert_eq!(err.to_string(), "All fields are required");
  }

  #[tokio::test]
  async fn test_signup_without_confirmation_uses_bare_user() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/auth/v1/signup"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "id": "u1", "email": "ada@example.com", "user_metadata": {"name": "Ada"}
      })))
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path("/rest/v1/users"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([profile_body("Ada")])))
      .mount(&server)
      .await;

    let req = SignupRequest {
      email: "ada@example.com".to_string(),
      password: "secret1".to_string(),
      name: "Ada".to_string(),
      phone: "123".to_string(),
      student_id: "S1".to_string(),
    };
    let signed_in = client(&server).await.signup(&req).await.unwrap();
    assert!(signed_in.session.is_none());
    assert_eq!(signed_in.profile.id, "u1");
  }

  #[tokio::test]
  async fn test_reset_password_redirects_to_site() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/auth/v1/recover"))
      .and(query_param("redirect_to", "https://site.test/reset-password"))
      .and(body_partial_json(json!({"email": "ada@example.com"})))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
      .expect(1)
      .mount(&server)
      .await;

    let auth = client(&server).await;
    auth.reset_password("ada@example.com").await.unwrap();
    assert!(auth.reset_password(" ").await.is_err());
  }

  #[tokio::test]
  async fn test_update_password_uses_given_token() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
      .and(path("/auth/v1/user"))
      .and(header("authorization", "Bearer recovery-token"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "u1"})))
      .expect(1)
      .mount(&server)
      .await;

    let auth = client(&server).await;
    auth
      .update_password("new-secret", "recovery-token")
      .await
      .unwrap();
    assert!(auth.update_password("new-secret", "").await.is_err());
    assert!(auth.update_password("", "recovery-token").await.is_err());
  }
}
