//! Ledger back ends.
//!
//! Each adapter implements [`LedgerAdapter`](crate::dispatch::LedgerAdapter)
//! and is built from its config section at startup:
//!
//! - [`evm::EvmAdapter`]: contract call on an EVM chain (alloy)
//! - [`move_call::MoveCallAdapter`]: Move call on an object ledger (JSON-RPC)
//! - [`feeless::FeelessAdapter`]: external helper posting to a feeless tangle

pub mod evm;
pub mod feeless;
pub mod move_call;
pub mod types;
pub mod wallet;

pub use evm::EvmAdapter;
pub use feeless::{index_for, FeelessAdapter};
pub use move_call::{MoveCallAdapter, MoveSigner};
pub use types::{LedgerError, LedgerResult};
pub use wallet::Wallet;
