//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;
use tokio::net::TcpListener;

use telemetry_anchor::config::AnchorConfig;
use telemetry_anchor::crypto::daily_key::parse_day;
use telemetry_anchor::crypto::{KeyDerivation, KeySchedule, MasterKey};
use telemetry_anchor::dispatch::{BackendKind, LedgerAdapter, Submission};
use telemetry_anchor::http::AppState;
use telemetry_anchor::ledger::{LedgerError, LedgerResult};
use telemetry_anchor::lifecycle::startup::assemble_state;
use telemetry_anchor::storage::ReceiptStore;

pub const MASTER_HEX: &str = "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff";

/// 2025-03-14T12:00:00Z
pub const TIMESTAMP: u64 = 1_741_953_600;

pub fn key_schedule(derivation: KeyDerivation) -> KeySchedule {
    KeySchedule::new(MasterKey::from_hex(MASTER_HEX).unwrap(), derivation)
        .with_enrollment("VEH-001", parse_day("2025-03-10").unwrap())
}

/// How a [`MockAdapter`] answers.
#[derive(Clone)]
pub enum Behavior {
    /// Reference is `<id>-<hex>`.
    Succeed,
    Unavailable,
    Reject,
    HelperFailure,
    /// Never answers within any reasonable deadline.
    Hang,
    /// Panics inside `submit`.
    Panic,
}

pub struct MockAdapter {
    id: String,
    kind: BackendKind,
    behavior: Behavior,
    pub calls: AtomicU32,
    pub seen: Mutex<Vec<Submission>>,
}

impl MockAdapter {
    pub fn new(id: &str, kind: BackendKind, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            kind,
            behavior,
            calls: AtomicU32::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerAdapter for MockAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn submit(&self, submission: &Submission) -> LedgerResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(submission.clone());

        match self.behavior {
            Behavior::Succeed => Ok(format!("{}-{}", self.id, submission.hex)),
            Behavior::Unavailable => Err(LedgerError::Unavailable("connection refused".into())),
            Behavior::Reject => Err(LedgerError::Rejected("execution reverted".into())),
            Behavior::HelperFailure => Err(LedgerError::HelperProcess("exit status 1".into())),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok("never".into())
            }
            Behavior::Panic => panic!("adapter bug"),
        }
    }

    fn explorer_link(&self, reference: &str) -> Option<String> {
        Some(format!("https://explorer.test/{}/{}", self.id, reference))
    }
}

pub fn as_adapters(mocks: &[Arc<MockAdapter>]) -> Vec<Arc<dyn LedgerAdapter>> {
    mocks
        .iter()
        .map(|m| m.clone() as Arc<dyn LedgerAdapter>)
        .collect()
}

/// Handler state over mock back ends with an in-memory receipt store.
pub fn app_state(config: &AnchorConfig, mocks: &[Arc<MockAdapter>]) -> (AppState, Arc<ReceiptStore>) {
    let store = Arc::new(ReceiptStore::open_in_memory().unwrap());
    let state = assemble_state(
        config,
        key_schedule(config.keys.derivation),
        as_adapters(mocks),
        Some(store.clone()),
    );
    (state, store)
}

/// Captured JSON-RPC requests.
pub type RpcLog = Arc<Mutex<Vec<Value>>>;

/// Start a JSON-RPC sink on an ephemeral port. `respond` maps each request
/// body to the response body.
pub async fn start_mock_rpc<F>(respond: F) -> (SocketAddr, RpcLog)
where
    F: Fn(&Value) -> Value + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let log: RpcLog = Arc::new(Mutex::new(Vec::new()));

    let respond = Arc::new(respond);
    let captured = log.clone();
    let app = Router::new().route(
        "/",
        post(move |Json(body): Json<Value>| {
            let respond = respond.clone();
            let captured = captured.clone();
            async move {
                captured.lock().unwrap().push(body.clone());
                Json(respond(&body))
            }
        }),
    );

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, log)
}

/// Write an executable-by-`sh` helper script into a fresh temp dir.
pub fn helper_script(body: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("helper.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    (dir, path)
}
