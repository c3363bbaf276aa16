//! Dispatch coordinator.
//!
//! # Responsibilities
//! - Fan a processed payload out to every selected ledger adapter
//! - Isolate failures: one back end failing or panicking never affects its
//!   siblings
//! - Enforce a per-backend deadline and retry `BackendUnavailable`
//! - Split oversized payloads into groups, dispatched in order
//! - Keep the whole dispatch inside `budget`, so the HTTP request deadline
//!   never fires before a report exists
//! - Record feeless receipts, best-effort
//!
//! # Data Flow
//! ```text
//! SensorBatch(Processed)
//!     → begin_dispatch (Dispatching)
//!     → grouping::split_payload
//!     → for each group, sequentially, while budget remains:
//!           join_all(catch_unwind(adapter.submit)) each under with_deadline
//!       groups past the budget are reported as BackendTimeout
//!     → DispatchReport (Completed)
//! ```

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use futures_util::FutureExt;

use super::adapter::LedgerAdapter;
use super::grouping::{split_payload, PayloadGroup};
use super::types::{
    BackendKind, BackendSelection, DispatchErrorKind, DispatchReport, DispatchResult,
    DispatchStatus, GroupReport, Submission,
};
use crate::config::{DispatchConfig, TimeoutConfig};
use crate::ledger::types::LedgerResult;
use crate::observability::metrics;
use crate::pipeline::{BatchState, PipelineResult, SensorBatch};
use crate::resilience::{with_deadline, RetryPolicy};
use crate::storage::ReceiptStore;

/// Coordinator tuning.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Per back-end call deadline, retries included.
    pub call_timeout: Duration,
    /// Wall-clock limit for one whole dispatch, every group included.
    pub budget: Duration,
    pub group_bytes: usize,
    pub max_group_bytes: usize,
    pub retry: RetryPolicy,
}

impl DispatchSettings {
    pub fn from_config(dispatch: &DispatchConfig, timeouts: &TimeoutConfig) -> Self {
        Self {
            call_timeout: Duration::from_millis(dispatch.call_timeout_ms),
            budget: dispatch_budget(timeouts.request_secs),
            group_bytes: dispatch.group_bytes,
            max_group_bytes: dispatch.max_group_bytes,
            retry: RetryPolicy::from_config(&dispatch.retry),
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::from_config(&DispatchConfig::default(), &TimeoutConfig::default())
    }
}

/// Four fifths of the request deadline; the rest covers ingest and the response.
pub fn dispatch_budget(request_secs: u64) -> Duration {
    Duration::from_millis(request_secs.saturating_mul(1000) / 5 * 4)
}

pub struct DispatchCoordinator {
    adapters: Vec<Arc<dyn LedgerAdapter>>,
    receipts: Option<Arc<ReceiptStore>>,
    settings: DispatchSettings,
}

impl DispatchCoordinator {
    pub fn new(adapters: Vec<Arc<dyn LedgerAdapter>>, settings: DispatchSettings) -> Self {
        Self {
            adapters,
            receipts: None,
            settings,
        }
    }

    /// Persist feeless references to `store`.
    pub fn with_receipts(mut self, store: Arc<ReceiptStore>) -> Self {
        self.receipts = Some(store);
        self
    }

    pub fn adapters(&self) -> &[Arc<dyn LedgerAdapter>] {
        &self.adapters
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Dispatch a processed batch and consume it.
    pub async fn dispatch_batch(
        &self,
        mut batch: SensorBatch,
        selection: &BackendSelection,
        timeout: Option<Duration>,
    ) -> PipelineResult<DispatchReport> {
        let hex = batch.begin_dispatch()?;
        let submission = Submission {
            vehicle_id: batch.vehicle_id().to_string(),
            timestamp: batch.timestamp(),
            hex,
        };

        let mut report = self.dispatch(submission, selection, timeout).await?;
        report.state = batch.complete()?;
        Ok(report)
    }

    /// Dispatch a payload to the selected back ends.
    ///
    /// Fails only when the payload itself is malformed; back-end failures
    /// are reported per result. A caller `timeout` replaces the per-call
    /// deadline but is capped by the dispatch budget.
    pub async fn dispatch(
        &self,
        submission: Submission,
        selection: &BackendSelection,
        timeout: Option<Duration>,
    ) -> PipelineResult<DispatchReport> {
        let started = Instant::now();
        let budget = self.settings.budget;
        let deadline = timeout.unwrap_or(self.settings.call_timeout).min(budget);
        let selected: Vec<&Arc<dyn LedgerAdapter>> = self
            .adapters
            .iter()
            .filter(|a| selection.includes(a.id(), a.kind()))
            .collect();

        let groups = split_payload(
            &submission.hex,
            self.settings.group_bytes,
            self.settings.max_group_bytes,
        )?;

        tracing::info!(
            vehicle_id = %submission.vehicle_id,
            timestamp = submission.timestamp,
            backends = selected.len(),
            groups = groups.len(),
            deadline_ms = deadline.as_millis() as u64,
            "Dispatching batch"
        );

        let mut reports = Vec::with_capacity(groups.len());
        for group in &groups {
            let group_submission = Submission {
                vehicle_id: submission.vehicle_id.clone(),
                timestamp: submission.timestamp,
                hex: group.hex(),
            };
            let remaining = budget.saturating_sub(started.elapsed());
            let report = if remaining.is_zero() {
                out_of_budget(group, &group_submission, &selected)
            } else {
                self.dispatch_group(group, &group_submission, &selected, deadline.min(remaining))
                    .await
            };
            reports.push(report);
        }

        let status = DispatchStatus::from_outcomes(
            reports
                .iter()
                .flat_map(|g| g.results.iter().map(|r| r.success)),
        );
        metrics::record_batch(status.as_str());

        tracing::info!(
            vehicle_id = %submission.vehicle_id,
            status = status.as_str(),
            "Dispatch finished"
        );

        Ok(DispatchReport {
            vehicle_id: submission.vehicle_id,
            timestamp: submission.timestamp,
            state: BatchState::Dispatching,
            status,
            groups: reports,
        })
    }

    async fn dispatch_group(
        &self,
        group: &PayloadGroup,
        submission: &Submission,
        selected: &[&Arc<dyn LedgerAdapter>],
        deadline: Duration,
    ) -> GroupReport {
        let calls = selected.iter().map(|adapter| async move {
            let adapter: &dyn LedgerAdapter = adapter.as_ref();
            let start = Instant::now();
            AssertUnwindSafe(self.call_adapter(adapter, submission, deadline))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| panicked(adapter, panic.as_ref(), start.elapsed()))
        });
        let results = join_all(calls).await;

        for result in results.iter().filter(|r| r.success) {
            if result.backend == BackendKind::Feeless {
                if let Some(reference) = &result.reference {
                    self.record_receipt(reference, submission.timestamp).await;
                }
            }
        }

        GroupReport {
            index: group.index,
            hex: submission.hex.clone(),
            iv: group.iv_hex(),
            results,
        }
    }

    async fn call_adapter(
        &self,
        adapter: &dyn LedgerAdapter,
        submission: &Submission,
        deadline: Duration,
    ) -> DispatchResult {
        let start = Instant::now();
        let outcome = with_deadline(deadline, self.submit_with_retries(adapter, submission)).await;
        let elapsed = start.elapsed();
        let elapsed_ms = elapsed.as_millis() as u64;

        let result = match outcome {
            Ok(Ok(reference)) => {
                let link = adapter.explorer_link(&reference);
                tracing::info!(
                    backend = adapter.id(),
                    reference = %reference,
                    elapsed_ms,
                    "Backend accepted submission"
                );
                DispatchResult::succeeded(adapter.id(), adapter.kind(), reference, link, elapsed_ms)
            }
            Ok(Err(e)) => {
                tracing::warn!(backend = adapter.id(), error = %e, "Backend submission failed");
                DispatchResult::failed(adapter.id(), adapter.kind(), e.kind(), e.to_string(), elapsed_ms)
            }
            Err(e) => {
                tracing::warn!(backend = adapter.id(), error = %e, "Backend submission timed out");
                DispatchResult::failed(
                    adapter.id(),
                    adapter.kind(),
                    DispatchErrorKind::BackendTimeout,
                    e.to_string(),
                    elapsed_ms,
                )
            }
        };

        let outcome_label = match result.error_kind() {
            None => "success",
            Some(DispatchErrorKind::BackendUnavailable) => "unavailable",
            Some(DispatchErrorKind::BackendTimeout) => "timeout",
            Some(DispatchErrorKind::BackendRejected) => "rejected",
            Some(DispatchErrorKind::HelperProcessFailure) => "helper_failure",
        };
        metrics::record_dispatch(adapter.id(), outcome_label, elapsed);

        result
    }

    async fn submit_with_retries(
        &self,
        adapter: &dyn LedgerAdapter,
        submission: &Submission,
    ) -> LedgerResult<String> {
        let policy = self.settings.retry;
        let mut attempt = 1;

        loop {
            match adapter.submit(submission).await {
                Err(e) if e.is_retryable() && policy.allows_retry_after(attempt) => {
                    let delay = policy.delay_after(attempt);
                    tracing::debug!(
                        backend = adapter.id(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying unavailable backend"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn record_receipt(&self, reference: &str, timestamp: u64) {
        let Some(store) = self.receipts.clone() else {
            return;
        };
        let digest = reference.to_string();
        match tokio::task::spawn_blocking(move || store.record(&digest, timestamp)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(reference, error = %e, "Failed to record receipt"),
            Err(e) => tracing::warn!(reference, error = %e, "Receipt writer task failed"),
        }
    }
}

/// Failed result for an adapter whose `submit` panicked.
fn panicked(
    adapter: &dyn LedgerAdapter,
    payload: &(dyn Any + Send),
    elapsed: Duration,
) -> DispatchResult {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());

    tracing::error!(backend = adapter.id(), panic = %message, "Backend adapter panicked");
    metrics::record_dispatch(adapter.id(), "panic", elapsed);

    DispatchResult::failed(
        adapter.id(),
        adapter.kind(),
        DispatchErrorKind::BackendUnavailable,
        format!("adapter panicked: {message}"),
        elapsed.as_millis() as u64,
    )
}

/// Report for a group reached after the dispatch budget ran out. No back end
/// is called.
fn out_of_budget(
    group: &PayloadGroup,
    submission: &Submission,
    selected: &[&Arc<dyn LedgerAdapter>],
) -> GroupReport {
    tracing::warn!(
        vehicle_id = %submission.vehicle_id,
        group = group.index,
        "Dispatch budget exhausted, group not sent"
    );

    let results = selected
        .iter()
        .map(|adapter| {
            metrics::record_dispatch(adapter.id(), "timeout", Duration::ZERO);
            DispatchResult::failed(
                adapter.id(),
                adapter.kind(),
                DispatchErrorKind::BackendTimeout,
                "dispatch budget exhausted before this group was sent",
                0,
            )
        })
        .collect();

    GroupReport {
        index: group.index,
        hex: submission.hex.clone(),
        iv: group.iv_hex(),
        results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::types::LedgerError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        id: &'static str,
        kind: BackendKind,
        failures_before_success: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl LedgerAdapter for Flaky {
        fn id(&self) -> &str {
            self.id
        }

        fn kind(&self) -> BackendKind {
            self.kind
        }

        async fn submit(&self, submission: &Submission) -> LedgerResult<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures_before_success {
                Err(LedgerError::Unavailable("connection refused".into()))
            } else {
                Ok(format!("{}-{}", self.id, submission.hex))
            }
        }
    }

    struct Rejecting {
        calls: AtomicU32,
    }

    #[async_trait]
    impl LedgerAdapter for Rejecting {
        fn id(&self) -> &str {
            "rejecting"
        }

        fn kind(&self) -> BackendKind {
            BackendKind::Evm
        }

        async fn submit(&self, _submission: &Submission) -> LedgerResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(LedgerError::Rejected("reverted".into()))
        }
    }

    fn fast_settings() -> DispatchSettings {
        DispatchSettings {
            call_timeout: Duration::from_secs(5),
            budget: Duration::from_secs(10),
            group_bytes: 20,
            max_group_bytes: 64,
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
            },
        }
    }

    fn submission(hex: &str) -> Submission {
        Submission {
            vehicle_id: "VEH-001".to_string(),
            timestamp: 1_741_953_600,
            hex: hex.to_string(),
        }
    }

    #[tokio::test]
    async fn test_retries_unavailable_until_success() {
        let flaky = Arc::new(Flaky {
            id: "flaky",
            kind: BackendKind::Move,
            failures_before_success: 2,
            calls: AtomicU32::new(0),
        });
        let coordinator = DispatchCoordinator::new(vec![flaky.clone() as Arc<dyn LedgerAdapter>], fast_settings());

        let report = coordinator
            .dispatch(submission("0116020053"), &BackendSelection::All, None)
            .await
            .unwrap();

        assert_eq!(report.status, DispatchStatus::AllSucceeded);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
        assert_eq!(report.first_reference(BackendKind::Move), Some("flaky-0116020053"));
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let flaky = Arc::new(Flaky {
            id: "flaky",
            kind: BackendKind::Move,
            failures_before_success: 10,
            calls: AtomicU32::new(0),
        });
        let coordinator = DispatchCoordinator::new(vec![flaky.clone() as Arc<dyn LedgerAdapter>], fast_settings());

        let report = coordinator
            .dispatch(submission("0116020053"), &BackendSelection::All, None)
            .await
            .unwrap();

        assert_eq!(report.status, DispatchStatus::AllFailed);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
        let result = report.results().next().unwrap();
        assert_eq!(result.error_kind(), Some(DispatchErrorKind::BackendUnavailable));
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let rejecting = Arc::new(Rejecting {
            calls: AtomicU32::new(0),
        });
        let coordinator = DispatchCoordinator::new(vec![rejecting.clone() as Arc<dyn LedgerAdapter>], fast_settings());

        let report = coordinator
            .dispatch(submission("0116020053"), &BackendSelection::All, None)
            .await
            .unwrap();

        assert_eq!(rejecting.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            report.results().next().unwrap().error_kind(),
            Some(DispatchErrorKind::BackendRejected)
        );
    }

    #[tokio::test]
    async fn test_nothing_selected() {
        let coordinator = DispatchCoordinator::new(Vec::new(), fast_settings());
        let report = coordinator
            .dispatch(submission("0116020053"), &BackendSelection::All, None)
            .await
            .unwrap();
        assert_eq!(report.status, DispatchStatus::NothingToDo);
    }

    #[tokio::test]
    async fn test_groups_dispatched_in_order_with_ivs() {
        let ok = Arc::new(Flaky {
            id: "ok",
            kind: BackendKind::Evm,
            failures_before_success: 0,
            calls: AtomicU32::new(0),
        });
        let mut settings = fast_settings();
        settings.max_group_bytes = 10;
        settings.group_bytes = 5;
        let coordinator = DispatchCoordinator::new(vec![ok as Arc<dyn LedgerAdapter>], settings);

        let report = coordinator
            .dispatch(
                submission("aabb000000ccdd000000eeff000000"),
                &BackendSelection::All,
                None,
            )
            .await
            .unwrap();

        assert_eq!(report.groups.len(), 3);
        let ivs: Vec<&str> = report
            .groups
            .iter()
            .map(|g| g.iv.as_deref().unwrap())
            .collect();
        assert_eq!(
            ivs,
            vec![
                "aabb0000000000000000000000000000",
                "ccdd0000000000000000000000000000",
                "eeff0000000000000000000000000000"
            ]
        );
        assert_eq!(report.groups[2].results[0].reference.as_deref(), Some("ok-eeff000000"));
    }

    #[tokio::test]
    async fn test_malformed_payload_fails_before_dispatch() {
        let coordinator = DispatchCoordinator::new(Vec::new(), fast_settings());
        assert!(coordinator
            .dispatch(submission("xyz"), &BackendSelection::All, None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_feeless_success_recorded() {
        let feeless = Arc::new(Flaky {
            id: "feeless",
            kind: BackendKind::Feeless,
            failures_before_success: 0,
            calls: AtomicU32::new(0),
        });
        let store = Arc::new(ReceiptStore::open_in_memory().unwrap());
        let coordinator =
            DispatchCoordinator::new(vec![feeless as Arc<dyn LedgerAdapter>], fast_settings())
                .with_receipts(store.clone());

        coordinator
            .dispatch(submission("0116020053"), &BackendSelection::All, None)
            .await
            .unwrap();

        let receipts = store.recent(10).unwrap();
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0].digest, "feeless-0116020053");
    }
}
