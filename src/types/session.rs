use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// An authenticated backend user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    /// Stable user identifier; messages reference senders by this value.
    pub id: String,

    /// Email address, when the backend exposes it.
    pub email: Option<String>,
}

/// Proof of authenticated identity for the current user.
///
/// Owned by the backend handle's session cell; everything else observes it
/// through [`crate::auth::SessionWatch`]. A session past its expiry is
/// treated the same as an absent one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    /// Bearer token presented on authenticated requests.
    pub access_token: String,

    /// Instant at which the access token stops being honored.
    #[serde(with = "crate::utils::time")]
    pub expires_at: OffsetDateTime,

    /// The authenticated user.
    pub user: User,
}

impl Session {
    /// Returns true if the session has not yet expired.
    pub fn is_valid(&self) -> bool {
        self.expires_at > OffsetDateTime::now_utc()
    }

    /// Returns the authenticated user's identifier.
    pub fn user_id(&self) -> &str {
        &self.user.id
    }
}

/// Signed-in / signed-out lifecycle of the current session.
///
/// Published through a watch channel by the backend handle whenever the
/// session it owns changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No authenticated user; the UI should redirect to the auth view.
    SignedOut,
    /// An authenticated user is present.
    SignedIn {
        /// Identifier of the signed-in user.
        user_id: String,
    },
}

impl SessionState {
    /// Derives the state from an optional session, honoring expiry.
    pub fn of(session: Option<&Session>) -> Self {
        match session {
            Some(s) if s.is_valid() => SessionState::SignedIn {
                user_id: s.user.id.clone(),
            },
            _ => SessionState::SignedOut,
        }
    }

    /// Returns true if a user is signed in.
    pub fn is_signed_in(&self) -> bool {
        matches!(self, SessionState::SignedIn { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn session(expires_at: OffsetDateTime) -> Session {
        Session {
            access_token: "jwt".to_string(),
            expires_at,
            user: User {
                id: "u1".to_string(),
                email: Some("a@b.com".to_string()),
            },
        }
    }

    #[test]
    fn validity_tracks_expiry() {
        let now = OffsetDateTime::now_utc();
        assert!(session(now + Duration::hours(1)).is_valid());
        assert!(!session(now - Duration::seconds(1)).is_valid());
    }

    #[test]
    fn user_id_accessor() {
        let now = OffsetDateTime::now_utc();
        assert_eq!(session(now).user_id(), "u1");
    }

    #[test]
    fn state_of_expired_session_is_signed_out() {
        let now = OffsetDateTime::now_utc();
        let live = session(now + Duration::hours(1));
        let stale = session(now - Duration::hours(1));
        assert!(SessionState::of(Some(&live)).is_signed_in());
        assert_eq!(SessionState::of(Some(&stale)), SessionState::SignedOut);
        assert_eq!(SessionState::of(None), SessionState::SignedOut);
    }
}
