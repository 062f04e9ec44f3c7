//! Authentication: credential storage, device-code sign-in, and the session
//! lifecycle.
//!
//! This module provides:
//! - `CredentialStore`: per-origin secret tokens in OS-level secure storage
//! - `device_flow`: the out-of-band device authorization protocol
//! - `SessionManager`: the authenticate/refresh/logout state machine
//!
//! Sessions live only in memory; credentials persist in the secure store and
//! are deleted when the backend rejects them.

pub mod credentials;
pub mod device_flow;
pub mod session;

pub use credentials::{Credential, CredentialStore, KeyringStore, SecretStore, StoredSecret};
pub use session::{Session, SessionManager};

use thiserror::Error;

use crate::api::ApiError;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("access token was rejected by the backend")]
    InvalidToken,

    #[error("network failure during authentication")]
    Network(#[source] ApiError),

    #[error("credential store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("sign-in was cancelled")]
    Cancelled,

    #[error("sign-in request was denied")]
    Denied,

    #[error("sign-in request expired before completion")]
    Expired,

    #[error("backend error: {0}")]
    Rpc(String),
}

impl AuthError {
    pub fn from_api(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized => AuthError::InvalidToken,
            ApiError::Rpc(message) => AuthError::Rpc(message),
            other => AuthError::Network(other),
        }
    }

    /// Cancellation is user intent, not a failure; it produces no message.
    pub fn is_silent(&self) -> bool {
        matches!(self, AuthError::Cancelled)
    }
}
