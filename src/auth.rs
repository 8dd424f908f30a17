//! Authentication operations and session observation.
//!
//! Sign-in and sign-up validate their inputs locally before any network
//! call; request failures surface the backend's own message. The session
//! lives in the backend handle's session cell, and [`SessionWatch`] lets
//! a view redirect the moment the session drops. A failed session probe
//! is treated as signed out; nothing here retries.

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::client::Backend;
use crate::error::{Error, Result};
use crate::observability::{AUTH_ERRORS, AUTH_REQUESTS};
use crate::types::{Session, SessionState, User};

/// Fallback token lifetime when the backend omits expiry information.
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::hours(1);

/// Validates sign-in form fields locally.
pub fn validate_sign_in(email: &str, password: &str) -> Result<()> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(Error::validation(
            "Please fill in all required fields.",
            None,
        ));
    }
    Ok(())
}

/// Validates sign-up form fields locally, including the password
/// confirmation. Rejections here never reach the network.
pub fn validate_sign_up(email: &str, password: &str, confirm: &str) -> Result<()> {
    if email.trim().is_empty() || password.is_empty() || confirm.is_empty() {
        return Err(Error::validation(
            "Please fill in all required fields.",
            None,
        ));
    }
    if password != confirm {
        return Err(Error::validation(
            "Passwords do not match.",
            Some("confirm_password".to_string()),
        ));
    }
    Ok(())
}

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

/// Wire shape of a successful password grant.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Seconds until expiry, relative to now.
    expires_in: Option<i64>,
    /// Absolute expiry as a unix timestamp; wins over `expires_in`.
    expires_at: Option<i64>,
    user: User,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|ts| OffsetDateTime::from_unix_timestamp(ts).ok())
            .or_else(|| {
                self.expires_in
                    .map(|secs| OffsetDateTime::now_utc() + Duration::seconds(secs))
            })
            .unwrap_or_else(|| OffsetDateTime::now_utc() + DEFAULT_TOKEN_LIFETIME);
        Session {
            access_token: self.access_token,
            expires_at,
            user: self.user,
        }
    }
}

/// Wire shape of a sign-up response; the user may arrive nested or flat.
#[derive(Deserialize)]
struct SignUpResponse {
    user: Option<User>,
    id: Option<String>,
    email: Option<String>,
}

impl Backend {
    /// Sign in with email and password.
    ///
    /// On success the session is stored in the handle's session cell and
    /// watchers are notified.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        validate_sign_in(email, password)?;

        let url = self.endpoint("auth/v1/token")?;
        AUTH_REQUESTS.click();
        let response = self
            .client()
            .post(url)
            .headers(self.default_headers())
            .query(&[("grant_type", "password")])
            .json(&Credentials { email, password })
            .timeout(self.request_timeout())
            .send()
            .await
            .map_err(|e| {
                AUTH_ERRORS.click();
                self.map_request_error(e)
            })?;

        if !response.status().is_success() {
            AUTH_ERRORS.click();
            return Err(Self::process_error_response(response).await);
        }

        let token = response.json::<TokenResponse>().await.map_err(|e| {
            AUTH_ERRORS.click();
            Error::decode(
                format!("token response failed schema validation: {e}"),
                Some("auth".to_string()),
            )
        })?;
        let session = token.into_session();
        self.store_session(session.clone());
        Ok(session)
    }

    /// Create a new account with email and password.
    ///
    /// No session is stored: the backend may require email confirmation
    /// before the account can sign in.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<User> {
        validate_sign_in(email, password)?;

        let url = self.endpoint("auth/v1/signup")?;
        AUTH_REQUESTS.click();
        let response = self
            .client()
            .post(url)
            .headers(self.default_headers())
            .json(&Credentials { email, password })
            .timeout(self.request_timeout())
            .send()
            .await
            .map_err(|e| {
                AUTH_ERRORS.click();
                self.map_request_error(e)
            })?;

        if !response.status().is_success() {
            AUTH_ERRORS.click();
            return Err(Self::process_error_response(response).await);
        }

        let body = response.json::<SignUpResponse>().await.map_err(|e| {
            AUTH_ERRORS.click();
            Error::decode(
                format!("sign-up response failed schema validation: {e}"),
                Some("auth".to_string()),
            )
        })?;
        match body.user {
            Some(user) => Ok(user),
            None => match body.id {
                Some(id) => Ok(User {
                    id,
                    email: body.email,
                }),
                None => Err(Error::decode(
                    "sign-up response carried no user".to_string(),
                    Some("auth".to_string()),
                )),
            },
        }
    }

    /// Retrieve the current session, probing the backend to confirm the
    /// token is still honored.
    ///
    /// Any failure — expired token, network error, rejected probe — is
    /// treated as signed out, clearing the cell and notifying watchers.
    pub async fn current_session(&self) -> Option<Session> {
        let session = match self.session() {
            Some(session) if session.is_valid() => session,
            Some(_) => {
                self.clear_session();
                return None;
            }
            None => return None,
        };

        let url = match self.endpoint("auth/v1/user") {
            Ok(url) => url,
            Err(_) => return None,
        };
        AUTH_REQUESTS.click();
        let probe = self
            .client()
            .get(url)
            .headers(self.default_headers())
            .timeout(self.request_timeout())
            .send()
            .await;
        match probe {
            Ok(response) if response.status().is_success() => Some(session),
            _ => {
                AUTH_ERRORS.click();
                self.clear_session();
                None
            }
        }
    }

    /// Sign out: best-effort revoke, then clear the local session.
    pub async fn sign_out(&self) {
        if let Ok(url) = self.endpoint("auth/v1/logout") {
            AUTH_REQUESTS.click();
            let _ = self
                .client()
                .post(url)
                .headers(self.default_headers())
                .timeout(self.request_timeout())
                .send()
                .await;
        }
        self.clear_session();
    }
}

/// Observes the session lifecycle for the duration of a view.
///
/// Holds a watch receiver on the backend handle's session cell; callers
/// poll [`SessionWatch::state`] or await [`SessionWatch::changed`] and
/// redirect to the auth view on [`SessionState::SignedOut`].
pub struct SessionWatch {
    rx: tokio::sync::watch::Receiver<SessionState>,
}

impl SessionWatch {
    /// Creates a watch over the given backend handle's session.
    pub fn new(backend: &Backend) -> Self {
        Self {
            rx: backend.watch_session(),
        }
    }

    /// Returns the current session state.
    pub fn state(&self) -> SessionState {
        self.rx.borrow().clone()
    }

    /// Returns true if a user is currently signed in.
    pub fn is_signed_in(&self) -> bool {
        self.state().is_signed_in()
    }

    /// Waits for the next session transition and returns the new state.
    ///
    /// If the backend handle is gone the state is reported as signed out.
    pub async fn changed(&mut self) -> SessionState {
        if self.rx.changed().await.is_err() {
            return SessionState::SignedOut;
        }
        self.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_up_rejects_mismatched_passwords_locally() {
        let err = validate_sign_up("a@b.com", "x", "y").unwrap_err();
        assert!(err.is_validation());
        assert_eq!(err.message(), "Passwords do not match.");
    }

    #[test]
    fn sign_up_requires_all_fields() {
        assert!(validate_sign_up("", "x", "x").unwrap_err().is_validation());
        assert!(validate_sign_up("a@b.com", "", "").unwrap_err().is_validation());
        assert!(validate_sign_up("a@b.com", "x", "x").is_ok());
    }

    #[test]
    fn sign_in_requires_all_fields() {
        assert!(validate_sign_in("", "pw").unwrap_err().is_validation());
        assert!(validate_sign_in("a@b.com", "").unwrap_err().is_validation());
        assert!(validate_sign_in("a@b.com", "pw").is_ok());
    }

    #[test]
    fn token_response_expiry_resolution() {
        let user = User {
            id: "u1".to_string(),
            email: None,
        };
        let absolute = TokenResponse {
            access_token: "t".to_string(),
            expires_in: Some(60),
            expires_at: Some(4_102_444_800), // 2100-01-01
            user: user.clone(),
        }
        .into_session();
        assert_eq!(absolute.expires_at.unix_timestamp(), 4_102_444_800);

        let relative = TokenResponse {
            access_token: "t".to_string(),
            expires_in: Some(3600),
            expires_at: None,
            user: user.clone(),
        }
        .into_session();
        assert!(relative.is_valid());

        let fallback = TokenResponse {
            access_token: "t".to_string(),
            expires_in: None,
            expires_at: None,
            user,
        }
        .into_session();
        assert!(fallback.is_valid());
    }

    #[tokio::test]
    async fn session_watch_sees_sign_out() {
        let backend = Backend::new(
            Some("https://chat.example.com".to_string()),
            Some("anon-key".to_string()),
        )
        .unwrap();
        let mut watch = SessionWatch::new(&backend);
        assert!(!watch.is_signed_in());

        backend.store_session(Session {
            access_token: "jwt".to_string(),
            expires_at: OffsetDateTime::now_utc() + Duration::hours(1),
            user: User {
                id: "u1".to_string(),
                email: None,
            },
        });
        assert_eq!(
            watch.changed().await,
            SessionState::SignedIn {
                user_id: "u1".to_string()
            }
        );

        backend.clear_session();
        assert_eq!(watch.changed().await, SessionState::SignedOut);
    }
}
