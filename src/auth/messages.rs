use color_eyre::Report;
use url::Url;

use crate::remote::ApiError;

/// Turn a GoTrue failure into something a user can act on.
pub fn friendly_message(err: &Report) -> String {
  let api = err.downcast_ref::<ApiError>();
  let raw = match api {
    Some(api) => api.message.clone(),
    None => err.to_string(),
  };
  let lower = raw.to_lowercase();

  if lower.contains("invalid login credentials") {
    "Invalid email or password".to_string()
  } else if lower.contains("email not confirmed") {
    "Please verify your email address before signing in".to_string()
  } else if lower.contains("already registered") || lower.contains("duplicate key") {
    "Email already registered".to_string()
  } else if api.is_some_and(|a| a.status == 429) || lower.contains("rate limit") {
    "Too many attempts. Please wait a moment and try again".to_string()
  } else if lower.contains("password should be") {
    "Password must be at least 6 characters long".to_string()
  } else {
    raw
  }
}

/// Extract the access token from a password-recovery link.
///
/// Understands `#access_token=...`, `#...token=...`, a bare token in the
/// fragment, and `?type=recovery&access_token=...`.
pub fn recovery_token(link: &str) -> Option<String> {
  let url = Url::parse(link).ok()?;

  if let Some(fragment) = url.fragment().filter(|f| !f.is_empty()) {
    if fragment.contains("access_token=") {
      return url::form_urlencoded::parse(fragment.as_bytes())
        .find(|(k, _)| k == "access_token")
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty());
    }
    if let Some(start) = fragment.find("token=") {
      let rest = &fragment[start + "token=".len()..];
      let token = rest.split('&').next().unwrap_or_default();
      return (!token.is_empty()).then(|| token.to_string());
    }
    return Some(fragment.to_string());
  }

  let mut is_recovery = false;
  let mut token = None;
  for (key, value) in url.query_pairs() {
    match key.as_ref() {
      "type" => is_recovery = value == "recovery",
      "access_token" => token = Some(value.into_owned()),
      _ => {}
    }
  }
  token.filter(|t| is_recovery && !t.is_empty())
}
