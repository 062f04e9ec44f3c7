//! Secure credential storage, namespaced per backend origin.
//!
//! Tokens live in the OS keychain. The store itself is reached through the
//! [`SecretStore`] trait so tests can substitute an in-memory fake; the
//! production implementation is [`KeyringStore`].

use std::sync::Arc;

use keyring::Entry;
use tracing::{debug, warn};

use crate::api::INTEGRATION_NAME;

use super::AuthError;

/// Keychain account holding the list of known accounts for a service.
/// The OS keychain cannot enumerate entries, so the roster is stored beside
/// the secrets themselves.
const ROSTER_ACCOUNT: &str = "__accounts__";

/// One stored token, keyed by the account (profile id) it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub account: String,
    pub token: String,
}

/// Raw entry as seen by the external secure store.
#[derive(Debug, Clone)]
pub struct StoredSecret {
    pub account: String,
    pub secret: String,
}

/// External secure-storage capability.
///
/// `find` returns entries in the order they were first saved; callers rely on
/// that order being stable.
pub trait SecretStore: Send + Sync {
    fn find(&self, service: &str) -> Result<Vec<StoredSecret>, AuthError>;
    fn set(&self, service: &str, account: &str, secret: &str) -> Result<(), AuthError>;
    fn delete(&self, service: &str, account: &str) -> Result<bool, AuthError>;
}

/// OS keychain implementation of [`SecretStore`].
pub struct KeyringStore;

impl KeyringStore {
    fn entry(service: &str, account: &str) -> Result<Entry, AuthError> {
        Entry::new(service, account).map_err(|err| AuthError::StoreUnavailable(err.to_string()))
    }

    fn roster(service: &str) -> Result<Vec<String>, AuthError> {
        match Self::entry(service, ROSTER_ACCOUNT)?.get_password() {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(accounts) => Ok(accounts),
                Err(err) => {
                    warn!(error = %err, "account roster is corrupt, resetting");
                    Ok(Vec::new())
                }
            },
            Err(keyring::Error::NoEntry) => Ok(Vec::new()),
            Err(err) => Err(AuthError::StoreUnavailable(err.to_string())),
        }
    }

    fn write_roster(service: &str, accounts: &[String]) -> Result<(), AuthError> {
        let raw = serde_json::to_string(accounts)
            .map_err(|err| AuthError::StoreUnavailable(err.to_string()))?;
        Self::entry(service, ROSTER_ACCOUNT)?
            .set_password(&raw)
            .map_err(|err| AuthError::StoreUnavailable(err.to_string()))
    }
}

impl SecretStore for KeyringStore {
    fn find(&self, service: &str) -> Result<Vec<StoredSecret>, AuthError> {
        let mut secrets = Vec::new();
        for account in Self::roster(service)? {
            match Self::entry(service, &account)?.get_password() {
                Ok(secret) => secrets.push(StoredSecret {
                    account: account.clone(),
                    secret,
                }),
                // Roster can briefly reference a deleted entry; skip it.
                Err(keyring::Error::NoEntry) => {
                    debug!(account = %account, "roster entry with no secret, skipping");
                }
                Err(err) => return Err(AuthError::StoreUnavailable(err.to_string())),
            }
        }
        Ok(secrets)
    }

    fn set(&self, service: &str, account: &str, secret: &str) -> Result<(), AuthError> {
        Self::entry(service, account)?
            .set_password(secret)
            .map_err(|err| AuthError::StoreUnavailable(err.to_string()))?;

        let mut roster = Self::roster(service)?;
        if !roster.iter().any(|existing| existing == account) {
            roster.push(account.to_string());
            Self::write_roster(service, &roster)?;
        }
        Ok(())
    }

    fn delete(&self, service: &str, account: &str) -> Result<bool, AuthError> {
        let deleted = match Self::entry(service, account)?.delete_credential() {
            Ok(()) => true,
            Err(keyring::Error::NoEntry) => false,
            Err(err) => return Err(AuthError::StoreUnavailable(err.to_string())),
        };

        let mut roster = Self::roster(service)?;
        let before = roster.len();
        roster.retain(|existing| existing != account);
        if roster.len() != before {
            Self::write_roster(service, &roster)?;
        }
        Ok(deleted)
    }
}

/// Credential access for one backend origin.
///
/// Every operation round-trips to the secure store; there is no in-memory
/// cache. Replacement is delete + set, never an in-place mutation.
pub struct CredentialStore {
    service: String,
    store: Arc<dyn SecretStore>,
}

impl CredentialStore {
    pub fn new(origin: &str, store: Arc<dyn SecretStore>) -> Self {
        Self {
            service: service_id(origin),
            store,
        }
    }

    /// List every stored credential for this origin, oldest first.
    pub fn list(&self) -> Result<Vec<Credential>, AuthError> {
        Ok(self
            .store
            .find(&self.service)?
            .into_iter()
            .map(|entry| Credential {
                account: entry.account,
                token: entry.secret,
            })
            .collect())
    }

    pub fn save(&self, account: &str, token: &str) -> Result<(), AuthError> {
        self.store.delete(&self.service, account)?;
        self.store.set(&self.service, account, token)
    }

    pub fn delete(&self, account: &str) -> Result<bool, AuthError> {
        self.store.delete(&self.service, account)
    }

    pub fn delete_all(&self) -> Result<Vec<(String, bool)>, AuthError> {
        let mut results = Vec::new();
        for credential in self.list()? {
            let deleted = self.store.delete(&self.service, &credential.account)?;
            results.push((credential.account, deleted));
        }
        Ok(results)
    }

    /// Second handle over the same backing store, for test assertions.
    #[cfg(test)]
    pub(crate) fn clone_for_test(&self) -> Self {
        Self {
            service: self.service.clone(),
            store: Arc::clone(&self.store),
        }
    }
}

/// Derive the secure-store service identifier from an origin URL:
/// scheme stripped, integration suffix appended.
fn service_id(origin: &str) -> String {
    let host = origin
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/');
    format!("{host}/integration/{INTEGRATION_NAME}")
}
