//! Backend RPC boundary.
//!
//! The hosted time-tracking backend is reached through the [`Backend`] trait:
//! identity lookup for token validation, activity-event creation, and the two
//! device-authorization endpoints. [`HttpBackend`] is the production
//! implementation; tests script the trait directly.

pub mod client;
pub mod error;

pub use client::HttpBackend;
pub use error::ApiError;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Source tag attached to every activity event we create.
pub const EVENT_SOURCE: &str = "editor";

/// Integration name used for service-id derivation and device-code requests.
pub const INTEGRATION_NAME: &str = "pulsetrack";

/// Identity of the authenticated user, as reported by the backend.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: String,
    pub profile_id: String,
    pub profile_name: String,
}

/// Input for the create-activity-event mutation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEventInput {
    pub filename: String,
    pub source: &'static str,
    pub is_heartbeat: bool,
    pub start_date_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_remote_url: Option<String>,
}

/// Acknowledgement for a persisted activity event.
#[derive(Debug, Clone)]
pub struct EventReceipt {
    pub id: String,
}

/// One device-authorization request, alive for a single sign-in attempt.
#[derive(Debug, Clone)]
pub struct DeviceAuthorization {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub interval: Duration,
    pub expires_in: Duration,
}

/// Token issued at the end of a successful device authorization.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub access_token: String,
    pub expires_in: Option<Duration>,
}

/// Outcome of a single device-token poll.
#[derive(Debug, Clone)]
pub enum DevicePoll {
    Issued(IssuedToken),
    Pending,
    SlowDown,
    Denied,
    Expired,
}

#[async_trait]
pub trait Backend: Send + Sync {
    /// Validate a token by asking the backend who it belongs to.
    async fn me(&self, token: &str) -> Result<Identity, ApiError>;

    /// Persist one activity heartbeat.
    async fn create_activity_event(
        &self,
        token: &str,
        input: &ActivityEventInput,
    ) -> Result<EventReceipt, ApiError>;

    /// Start a device authorization and obtain the user/device code pair.
    async fn request_device_code(&self) -> Result<DeviceAuthorization, ApiError>;

    /// Ask whether the device authorization has completed.
    async fn poll_device_token(&self, device_code: &str) -> Result<DevicePoll, ApiError>;
}
