//! Dispatch subsystem.
//!
//! Hands processed payloads to ledger back ends. Each back end is an
//! [`LedgerAdapter`]; the [`DispatchCoordinator`] owns the set built at
//! startup and produces a [`DispatchReport`] per batch.

pub mod adapter;
pub mod coordinator;
pub mod grouping;
pub mod types;

pub use adapter::LedgerAdapter;
pub use coordinator::{DispatchCoordinator, DispatchSettings};
pub use types::{
    BackendKind, BackendSelection, DispatchErrorKind, DispatchReport, DispatchResult,
    DispatchStatus, Submission,
};
