//! Deadline enforcement for back-end calls.
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; the inner future is dropped on expiry,
//!   which cancels it (helper processes are spawned with `kill_on_drop`)
//! - Timeout errors are distinct from back-end errors

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("Deadline of {0:?} exceeded")]
pub struct DeadlineExceeded(pub Duration);

/// Run `fut`, giving up after `deadline`.
pub async fn with_deadline<F, T>(deadline: Duration, fut: F) -> Result<T, DeadlineExceeded>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(deadline, fut)
        .await
        .map_err(|_| DeadlineExceeded(deadline))
}
