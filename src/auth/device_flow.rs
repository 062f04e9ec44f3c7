//! Out-of-band device authorization.
//!
//! One invocation is one sign-in attempt: request a code, show it to the
//! human, poll until the backend reports a terminal outcome. Polling is a
//! bounded loop (never recursion) capped by the authorization's advertised
//! lifetime, and every step observes the cancellation token.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::api::{Backend, DevicePoll, IssuedToken};
use crate::host::UserInterface;

use super::AuthError;

/// Wait multiplier applied when the backend asks us to slow down.
const SLOW_DOWN_BACKOFF_FACTOR: u32 = 2;

pub async fn run(
    backend: &dyn Backend,
    ui: &dyn UserInterface,
    cancel: &CancellationToken,
) -> Result<IssuedToken, AuthError> {
    let authorization = backend
        .request_device_code()
        .await
        .map_err(AuthError::from_api)?;

    info!(user_code = %authorization.user_code, "device authorization started");
    ui.show_user_code(&authorization.user_code, &authorization.verification_uri)
        .await;
    ui.open_external(&authorization.verification_uri).await;

    // Even if the server keeps answering "pending" past its own expiry, the
    // iteration cap bounds total wall-clock time to roughly expires_in.
    let interval_secs = authorization.interval.as_secs().max(1);
    let max_polls = (authorization.expires_in.as_secs() / interval_secs).max(1);
    let mut wait = authorization.interval;

    for _ in 0..max_polls {
        if cancel.is_cancelled() {
            return Err(AuthError::Cancelled);
        }

        let poll = backend.poll_device_token(&authorization.device_code).await;

        // A cancellation that raced the in-flight poll discards its result.
        if cancel.is_cancelled() {
            debug!("discarding device poll result after cancellation");
            return Err(AuthError::Cancelled);
        }

        match poll.map_err(AuthError::from_api)? {
            DevicePoll::Issued(token) => {
                info!("device authorization granted");
                return Ok(token);
            }
            DevicePoll::Pending => {}
            DevicePoll::SlowDown => {
                wait *= SLOW_DOWN_BACKOFF_FACTOR;
                debug!(wait_secs = wait.as_secs(), "backend asked to slow down");
            }
            DevicePoll::Denied => return Err(AuthError::Denied),
            DevicePoll::Expired => return Err(AuthError::Expired),
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(AuthError::Cancelled),
            _ = tokio::time::sleep(wait) => {}
        }
    }

    Err(AuthError::Expired)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::api::DevicePoll;
    use crate::testutil::{RecordingUi, ScriptedBackend};

    fn issued(token: &str) -> DevicePoll {
        DevicePoll::Issued(IssuedToken {
            access_token: token.to_string(),
            expires_in: None,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn polls_until_token_is_issued_with_backoff() {
        let backend = ScriptedBackend::new();
        backend.script_polls([
            DevicePoll::Pending,
            DevicePoll::Pending,
            DevicePoll::SlowDown,
            issued("fresh-token"),
        ]);
        let ui = RecordingUi::new();
        let cancel = CancellationToken::new();

        let token = run(&backend, &ui, &cancel).await.expect("token issued");
        assert_eq!(token.access_token, "fresh-token");

        let times = backend.poll_times();
        assert_eq!(times.len(), 4, "exactly one request per scripted response");

        let interval = Duration::from_secs(5);
        assert_eq!(times[1] - times[0], interval, "pending waits one interval");
        assert_eq!(times[2] - times[1], interval, "pending waits one interval");
        assert!(
            times[3] - times[2] >= interval * 2,
            "slow_down at least doubles the wait"
        );

        // The user saw the code and the browser was opened
        assert_eq!(ui.shown_codes().len(), 1);
        assert_eq!(ui.opened_urls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn denial_is_terminal() {
        let backend = ScriptedBackend::new();
        backend.script_polls([DevicePoll::Pending, DevicePoll::Denied]);
        let ui = RecordingUi::new();

        let result = run(&backend, &ui, &CancellationToken::new()).await;
        assert!(matches!(result, Err(AuthError::Denied)));
        assert_eq!(backend.poll_times().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_reported_by_server_is_terminal() {
        let backend = ScriptedBackend::new();
        backend.script_polls([DevicePoll::Expired]);
        let ui = RecordingUi::new();

        let result = run(&backend, &ui, &CancellationToken::new()).await;
        assert!(matches!(result, Err(AuthError::Expired)));
    }

    #[tokio::test(start_paused = true)]
    async fn endless_pending_is_bounded_by_advertised_lifetime() {
        let backend = ScriptedBackend::new();
        // Authorization in testutil advertises 60s lifetime at 5s interval:
        // 12 polls maximum. Script more pendings than could ever be used.
        backend.script_polls(std::iter::repeat(DevicePoll::Pending).take(50));
        let ui = RecordingUi::new();

        let result = run(&backend, &ui, &CancellationToken::new()).await;
        assert!(matches!(result, Err(AuthError::Expired)));
        assert_eq!(backend.poll_times().len(), 12);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_polling_without_error_noise() {
        let backend = ScriptedBackend::new();
        backend.script_polls([DevicePoll::Pending, DevicePoll::Pending]);
        let ui = RecordingUi::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = run(&backend, &ui, &cancel).await;
        assert!(matches!(result, Err(AuthError::Cancelled)));
        assert!(result.unwrap_err().is_silent());
        assert!(backend.poll_times().is_empty(), "no poll after cancellation");
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_wait_interrupts_the_sleep() {
        let backend = ScriptedBackend::new();
        backend.script_polls([DevicePoll::Pending, issued("never-reached")]);
        let ui = RecordingUi::new();
        let cancel = CancellationToken::new();

        let child = cancel.child_token();
        let flow = tokio::spawn(async move {
            let backend = backend;
            let ui = ui;
            run(&backend, &ui, &child).await
        });

        // Let the first poll happen, then cancel mid-sleep
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();

        let result = flow.await.expect("task completes");
        assert!(matches!(result, Err(AuthError::Cancelled)));
    }
}
