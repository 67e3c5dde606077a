//! Session handling
//!
//! Every remote write needs a signed-in user. [`ensure_session`] reuses
//! the current session when there is one and signs in otherwise.

use std::fmt;

use tracing::debug;

use crate::error::{SyncError, SyncResult};
use crate::models::User;
use crate::remote::SessionService;

/// Email and password used to sign in
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"********")
            .finish()
    }
}

/// Resolve the signed-in user, signing in if needed
///
/// Credentials are only read when a sign-in is actually required.
pub async fn ensure_session<S, F>(session: &S, credentials: F) -> SyncResult<User>
where
    S: SessionService,
    F: FnOnce() -> SyncResult<Credentials>,
{
    if !session.has_active_session().await {
        let credentials = credentials()?;
        debug!("No active session, signing in as {}", credentials.email);
        return session
            .sign_in(&credentials.email, &credentials.password)
            .await
            .map_err(|e| SyncError::Authentication(e.to_string()));
    }

    match session.current_user().await {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err(SyncError::Authentication(
            "No user found despite active session".to_string(),
        )),
        Err(e) => Err(SyncError::Authentication(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{MemoryRemote, RemoteCall};

    fn credentials() -> SyncResult<Credentials> {
        Ok(Credentials {
            email: "me@example.com".to_string(),
            password: "secret".to_string(),
        })
    }

    #[test]
    fn test_debug_masks_password() {
        let printed = format!("{:?}", credentials().unwrap());
        assert!(printed.contains("me@example.com"));
        assert!(!printed.contains("secret"));
    }

    #[tokio::test]
    async fn test_signs_in_without_session() {
        let remote = MemoryRemote::new().with_account("me@example.com", "secret", "user-1");
        let user = ensure_session(&remote, credentials).await.unwrap();
        assert_eq!(user.id, "user-1");
        assert_eq!(
            remote.calls(),
            vec![RemoteCall::SignIn("me@example.com".to_string())]
        );
    }

    #[tokio::test]
    async fn test_reuses_active_session() {
        let remote = MemoryRemote::new().with_session(User {
            id: "user-2".to_string(),
            email: None,
        });
        let user = ensure_session(&remote, || {
            Err(SyncError::Configuration("not needed".to_string()))
        })
        .await
        .unwrap();
        assert_eq!(user.id, "user-2");
        assert_eq!(remote.calls(), vec![RemoteCall::CurrentUser]);
    }

    #[tokio::test]
    async fn test_wrong_password_is_authentication_error() {
        let remote = MemoryRemote::new().with_account("me@example.com", "other", "user-1");
        let result = ensure_session(&remote, credentials).await;
        assert!(matches!(result, Err(SyncError::Authentication(_))));
    }

    #[tokio::test]
    async fn test_missing_credentials_surface_as_configuration() {
        let remote = MemoryRemote::new();
        let result = ensure_session(&remote, || {
            Err(SyncError::Configuration("email is not configured".to_string()))
        })
        .await;
        assert!(matches!(result, Err(SyncError::Configuration(_))));
        assert!(remote.calls().is_empty());
    }
}
