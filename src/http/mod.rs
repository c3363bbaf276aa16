//! HTTP API subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, request ID, trace, limits)
//!     → handlers.rs
//!         /sendTx          → pipeline::ingest → dispatch::DispatchCoordinator
//!         /api/v1/process  → pipeline::process
//!         /api/v1/decode   → pipeline::open
//!         /api/blocks      → storage::ReceiptStore
//!     → response.rs (JSON bodies, ApiError → status + { error })
//! ```

pub mod handlers;
pub mod request;
pub mod response;
pub mod server;

pub use response::{ApiError, ApiResult};
pub use server::{build_router, AppState, HttpServer, X_REQUEST_ID};
