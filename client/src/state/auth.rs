//! Session credentials and the login/signup/logout flow.
//!
//! The bearer token is the only value persisted across runs. It lives in a
//! single file (the native stand-in for browser local storage) and is read
//! at startup to seed the authenticated flag before any network call.

#[cfg(test)]
#[path = "auth_test.rs"]
mod auth_test;

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::net::api::{ApiError, AuthApi};
use crate::net::transport::Realtime;
use crate::net::types::User;

// =============================================================================
// TOKEN STORE
// =============================================================================

#[derive(Debug, thiserror::Error)]
#[error("token file {path}: {source}")]
pub struct TokenStoreError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// File-backed persistence for the bearer token.
#[derive(Clone, Debug)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted token. A missing or blank file means no token.
    ///
    /// # Errors
    ///
    /// Returns [`TokenStoreError`] for I/O failures other than "not found".
    pub async fn load(&self) -> Result<Option<String>, TokenStoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => {
                let token = raw.trim();
                Ok((!token.is_empty()).then(|| token.to_owned()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(self.error(source)),
        }
    }

    /// # Errors
    ///
    /// Returns [`TokenStoreError`] if the directory or file cannot be written.
    pub async fn save(&self, token: &str) -> Result<(), TokenStoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| self.error(e))?;
        }
        tokio::fs::write(&self.path, token).await.map_err(|e| self.error(e))
    }

    /// Delete the token file. Succeeds when there is nothing to delete.
    ///
    /// # Errors
    ///
    /// Returns [`TokenStoreError`] if an existing file cannot be removed.
    pub async fn clear(&self) -> Result<(), TokenStoreError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(self.error(source)),
        }
    }

    fn error(&self, source: std::io::Error) -> TokenStoreError {
        TokenStoreError { path: self.path.clone(), source }
    }
}

// =============================================================================
// AUTH STATE
// =============================================================================

/// Process-wide credentials: written only by the auth flow, read everywhere.
#[derive(Clone, Debug, Default)]
pub struct AuthState {
    pub token: Option<String>,
    pub user: Option<User>,
}

impl AuthState {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.id.as_str())
    }
}

// =============================================================================
// AUTH FLOW
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Form-level validation failure, shown to the user as-is.
    #[error("{0}")]
    Invalid(&'static str),
    #[error("not logged in")]
    NotAuthenticated,
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Token(#[from] TokenStoreError),
}

pub struct AuthService<A> {
    api: A,
    tokens: TokenStore,
    state: AuthState,
}

impl<A: AuthApi> AuthService<A> {
    #[must_use]
    pub fn new(api: A, tokens: TokenStore) -> Self {
        Self { api, tokens, state: AuthState::default() }
    }

    #[must_use]
    pub fn state(&self) -> &AuthState {
        &self.state
    }

    #[must_use]
    pub fn api(&self) -> &A {
        &self.api
    }

    /// Seed the token from disk. Returns whether a token was found.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Token`] if the token file is unreadable.
    pub async fn restore(&mut self) -> Result<bool, AuthError> {
        self.state.token = self.tokens.load().await?;
        Ok(self.state.is_authenticated())
    }

    /// Fetch the profile for the current token via `GET /auth/me`.
    ///
    /// A rejected token is discarded so the next start does not reuse it.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::NotAuthenticated`] without a token, or the API error.
    pub async fn refresh_profile(&mut self) -> Result<User, AuthError> {
        let token = self.state.token.clone().ok_or(AuthError::NotAuthenticated)?;
        match self.api.me(&token).await {
            Ok(user) => {
                self.state.user = Some(user.clone());
                Ok(user)
            }
            Err(e) if e.is_unauthorized() => {
                warn!(error = %e, "auth: stored token rejected, clearing");
                self.tokens.clear().await?;
                self.state = AuthState::default();
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// # Errors
    ///
    /// Returns [`AuthError::Invalid`] for an empty email, or the API/token error.
    pub async fn login(&mut self, email: &str) -> Result<User, AuthError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(AuthError::Invalid("email is required"));
        }

        let resp = self.api.login(email).await?;
        self.tokens.save(&resp.token).await?;
        info!(user_id = %resp.data.id, "auth: logged in");
        self.state = AuthState { token: Some(resp.token), user: Some(resp.data.clone()) };
        Ok(resp.data)
    }

    /// Create an account. The backend issues no token; log in afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Invalid`] when a field is blank, or the API error.
    pub async fn signup(&mut self, first_name: &str, last_name: &str, email: &str) -> Result<User, AuthError> {
        let (first_name, last_name, email) = (first_name.trim(), last_name.trim(), email.trim());
        if first_name.is_empty() || last_name.is_empty() {
            return Err(AuthError::Invalid("first and last name are required"));
        }
        if email.is_empty() {
            return Err(AuthError::Invalid("email is required"));
        }

        let resp = self.api.signup(first_name, last_name, email).await?;
        info!(user_id = %resp.data.id, "auth: signed up");
        Ok(resp.data)
    }

    /// Forget credentials everywhere and close the realtime session.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Token`] if the token file cannot be removed; the
    /// in-memory state and realtime session are cleared regardless.
    pub async fn logout<R: Realtime + ?Sized>(&mut self, realtime: &mut R) -> Result<(), AuthError> {
        self.state = AuthState::default();
        realtime.close().await;
        self.tokens.clear().await?;
        info!("auth: logged out");
        Ok(())
    }
}
