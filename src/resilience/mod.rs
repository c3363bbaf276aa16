//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to a ledger back end:
//!     → timeouts.rs (one deadline covering every attempt)
//!     → On BackendUnavailable: backoff.rs (sleep, then retry)
//! ```
//!
//! # Design Decisions
//! - Every external call has a deadline
//! - Only failures that happened before the ledger saw the submission are
//!   retried

pub mod backoff;
pub mod timeouts;

pub use backoff::{calculate_backoff, RetryPolicy};
pub use timeouts::{with_deadline, DeadlineExceeded};
