//! Bounded polling for backend state
//!
//! The settle barrier in quota reconciliation needs to wait until the backend
//! has computed usage for a freshly created quota object. This helper polls a
//! check function at a fixed interval under a hard deadline; it never waits
//! forever.

use std::future::Future;
use std::time::Duration;

use tracing::trace;

use crate::{Error, Result};

/// Poll until a condition is met or the deadline expires.
///
/// Repeatedly calls `check_fn` every `poll_interval` until it returns
/// `Ok(true)`, or fails with [`Error::Backend`] carrying `timeout_msg` once
/// `deadline` has elapsed. Errors from the check function are treated as
/// "condition not yet met" and retried, since transient backend failures are
/// expected while state converges.
pub async fn poll_until<F, Fut>(
    deadline: Duration,
    poll_interval: Duration,
    timeout_msg: impl Into<String>,
    mut check_fn: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let start = std::time::Instant::now();
    let timeout_msg = timeout_msg.into();

    loop {
        match check_fn().await {
            Ok(true) => return Ok(()),
            Ok(false) => {
                trace!("polling condition not yet met, retrying");
            }
            Err(e) => {
                trace!("polling check returned error (retrying): {}", e);
            }
        }

        if start.elapsed() > deadline {
            return Err(Error::backend(timeout_msg));
        }

        tokio::time::sleep(poll_interval).await;
    }
}
