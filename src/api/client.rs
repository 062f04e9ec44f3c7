//! HTTP implementation of the backend RPC boundary.
//!
//! Identity and activity events go through the GraphQL endpoint with JWT
//! bearer authentication; device authorization uses two JSON endpoints under
//! the same origin.

use std::time::Duration;

use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use tracing::{debug, warn};

use super::{
    ActivityEventInput, ApiError, Backend, DeviceAuthorization, DevicePoll, EventReceipt,
    Identity, IssuedToken, INTEGRATION_NAME,
};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Device authorization endpoints, relative to the origin
const DEVICE_CODE_PATH: &str = "/api/auth/device/code";
const DEVICE_TOKEN_PATH: &str = "/api/auth/device/token";

/// GraphQL error code the backend uses for rejected tokens
const UNAUTHENTICATED_CODE: &str = "UNAUTHENTICATED";

/// Backend client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    origin: String,
    api_url: String,
}

impl HttpBackend {
    pub fn new(origin: &str, api_url: &str) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            origin: origin.trim_end_matches('/').to_string(),
            api_url: api_url.to_string(),
        })
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn graphql<T: DeserializeOwned>(
        &self,
        token: &str,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T, ApiError> {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(token)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        let envelope: GraphqlEnvelope<T> = response.json().await?;

        if let Some(error) = envelope.errors.into_iter().flatten().next() {
            warn!(message = %error.message, "GraphQL error");
            if error.code().is_some_and(|code| code == UNAUTHENTICATED_CODE) {
                return Err(ApiError::Unauthorized);
            }
            return Err(ApiError::Rpc(error.message));
        }

        envelope
            .data
            .ok_or_else(|| ApiError::InvalidResponse("missing data payload".to_string()))
    }
}

#[async_trait::async_trait]
impl Backend for HttpBackend {
    async fn me(&self, token: &str) -> Result<Identity, ApiError> {
        let query = "{ me { id profile { id name } } }";
        let data: MeData = self.graphql(token, query, json!({})).await?;
        debug!(profile = %data.me.profile.name, "identity resolved");

        Ok(Identity {
            user_id: data.me.id,
            profile_id: data.me.profile.id,
            profile_name: data.me.profile.name,
        })
    }

    async fn create_activity_event(
        &self,
        token: &str,
        input: &ActivityEventInput,
    ) -> Result<EventReceipt, ApiError> {
        let query = "mutation CreateActivityEvent($input: ActivityEventInput!) { \
                     createActivityEvent(input: $input) { id } }";
        let variables = json!({ "input": input });
        let data: CreateEventData = self.graphql(token, query, variables).await?;

        Ok(EventReceipt {
            id: data.create_activity_event.id,
        })
    }

    async fn request_device_code(&self) -> Result<DeviceAuthorization, ApiError> {
        let url = format!("{}{}", self.origin, DEVICE_CODE_PATH);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "integration": INTEGRATION_NAME }))
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        let wire: DeviceCodeWire = response.json().await?;
        debug!(user_code = %wire.user_code, "device code issued");

        Ok(DeviceAuthorization {
            device_code: wire.device_code,
            user_code: wire.user_code,
            verification_uri: wire.verification_uri,
            interval: Duration::from_secs(wire.interval.max(1)),
            expires_in: Duration::from_secs(wire.expires_in),
        })
    }

    async fn poll_device_token(&self, device_code: &str) -> Result<DevicePoll, ApiError> {
        let url = format!("{}{}", self.origin, DEVICE_TOKEN_PATH);
        // The token endpoint reports pending/denied states in the body with a
        // non-2xx status, so the body is parsed regardless of status.
        let response = self
            .client
            .post(&url)
            .json(&json!({ "device_code": device_code }))
            .send()
            .await?;

        let wire: DeviceTokenWire = response.json().await?;
        classify_device_token(wire)
    }
}

fn classify_device_token(wire: DeviceTokenWire) -> Result<DevicePoll, ApiError> {
    if let Some(access_token) = wire.access_token {
        return Ok(DevicePoll::Issued(IssuedToken {
            access_token,
            expires_in: wire.expires_in.map(Duration::from_secs),
        }));
    }

    match wire.error.as_deref() {
        Some("authorization_pending") => Ok(DevicePoll::Pending),
        Some("slow_down") => Ok(DevicePoll::SlowDown),
        Some("access_denied") => Ok(DevicePoll::Denied),
        Some("expired_token") => Ok(DevicePoll::Expired),
        Some(other) => Err(ApiError::Rpc(format!(
            "unexpected device token response: {other}"
        ))),
        None => Err(ApiError::InvalidResponse(
            "device token response had neither token nor error".to_string(),
        )),
    }
}

// Internal wire types for parsing

#[derive(Debug, Deserialize)]
struct GraphqlEnvelope<T> {
    data: Option<T>,
    errors: Option<Vec<GraphqlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
    extensions: Option<GraphqlErrorExtensions>,
}

#[derive(Debug, Deserialize)]
struct GraphqlErrorExtensions {
    code: Option<String>,
}

impl GraphqlError {
    fn code(&self) -> Option<&str> {
        self.extensions.as_ref().and_then(|ext| ext.code.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct MeData {
    me: MeUser,
}

#[derive(Debug, Deserialize)]
struct MeUser {
    id: String,
    profile: MeProfile,
}

#[derive(Debug, Deserialize)]
struct MeProfile {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct CreateEventData {
    #[serde(rename = "createActivityEvent")]
    create_activity_event: CreatedEvent,
}

#[derive(Debug, Deserialize)]
struct CreatedEvent {
    id: String,
}

#[derive(Debug, Deserialize)]
struct DeviceCodeWire {
    device_code: String,
    user_code: String,
    verification_uri: String,
    expires_in: u64,
    interval: u64,
}

#[derive(Debug, Deserialize)]
struct DeviceTokenWire {
    access_token: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
}
