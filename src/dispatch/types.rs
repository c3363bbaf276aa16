//! Dispatch types.

use serde::{Deserialize, Serialize};

use crate::pipeline::BatchState;

/// The three ledger families the service knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Evm,
    Move,
    Feeless,
}

/// Why a back end did not produce a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DispatchErrorKind {
    BackendUnavailable,
    BackendTimeout,
    BackendRejected,
    HelperProcessFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchError {
    pub kind: DispatchErrorKind,
    pub message: String,
}

/// What one back end is asked to anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub vehicle_id: String,
    /// Epoch seconds.
    pub timestamp: u64,
    /// Lowercase hex payload.
    pub hex: String,
}

/// Outcome of one back end for one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResult {
    pub backend_id: String,
    pub backend: BackendKind,
    pub success: bool,
    pub reference: Option<String>,
    pub error: Option<DispatchError>,
    pub link: Option<String>,
    pub elapsed_ms: u64,
}

impl DispatchResult {
    pub fn succeeded(
        backend_id: impl Into<String>,
        backend: BackendKind,
        reference: String,
        link: Option<String>,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            backend_id: backend_id.into(),
            backend,
            success: true,
            reference: Some(reference),
            error: None,
            link,
            elapsed_ms,
        }
    }

    pub fn failed(
        backend_id: impl Into<String>,
        backend: BackendKind,
        kind: DispatchErrorKind,
        message: impl Into<String>,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            backend_id: backend_id.into(),
            backend,
            success: false,
            reference: None,
            error: Some(DispatchError {
                kind,
                message: message.into(),
            }),
            link: None,
            elapsed_ms,
        }
    }

    pub fn error_kind(&self) -> Option<DispatchErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

/// Which back ends a request targets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BackendSelection {
    #[default]
    All,
    /// Back-end ids or kind names (`evm`, `move`, `feeless`).
    Only(Vec<String>),
}

impl BackendSelection {
    /// `None` or an empty list selects everything.
    pub fn from_list(list: Option<Vec<String>>) -> Self {
        match list {
            Some(ids) if !ids.is_empty() => Self::Only(ids),
            _ => Self::All,
        }
    }

    pub fn includes(&self, backend_id: &str, kind: BackendKind) -> bool {
        match self {
            Self::All => true,
            Self::Only(ids) => ids.iter().any(|id| {
                id.eq_ignore_ascii_case(backend_id) || id.eq_ignore_ascii_case(kind_name(kind))
            }),
        }
    }
}

fn kind_name(kind: BackendKind) -> &'static str {
    match kind {
        BackendKind::Evm => "evm",
        BackendKind::Move => "move",
        BackendKind::Feeless => "feeless",
    }
}

/// Results for one group of the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupReport {
    pub index: usize,
    pub hex: String,
    /// Reconstructed CTR IV, present when the payload was split.
    pub iv: Option<String>,
    pub results: Vec<DispatchResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DispatchStatus {
    AllSucceeded,
    PartialFailure,
    AllFailed,
    /// No back end was selected or configured.
    NothingToDo,
}

impl DispatchStatus {
    /// Aggregate success flags.
    pub fn from_outcomes(outcomes: impl IntoIterator<Item = bool>) -> Self {
        let (mut ok, mut failed) = (0usize, 0usize);
        for success in outcomes {
            if success {
                ok += 1;
            } else {
                failed += 1;
            }
        }
        match (ok, failed) {
            (0, 0) => Self::NothingToDo,
            (_, 0) => Self::AllSucceeded,
            (0, _) => Self::AllFailed,
            _ => Self::PartialFailure,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AllSucceeded => "all_succeeded",
            Self::PartialFailure => "partial_failure",
            Self::AllFailed => "all_failed",
            Self::NothingToDo => "nothing_to_do",
        }
    }
}

/// Structured outcome of dispatching one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    pub vehicle_id: String,
    pub timestamp: u64,
    pub state: BatchState,
    pub status: DispatchStatus,
    pub groups: Vec<GroupReport>,
}

impl DispatchReport {
    pub fn results(&self) -> impl Iterator<Item = &DispatchResult> {
        self.groups.iter().flat_map(|g| g.results.iter())
    }

    pub fn succeeded(&self) -> usize {
        self.results().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> usize {
        self.results().filter(|r| !r.success).count()
    }

    /// First successful reference from a back end of `kind`.
    pub fn first_reference(&self, kind: BackendKind) -> Option<&str> {
        self.results()
            .filter(|r| r.backend == kind && r.success)
            .find_map(|r| r.reference.as_deref())
    }

    pub fn first_link(&self, kind: BackendKind) -> Option<&str> {
        self.results()
            .filter(|r| r.backend == kind && r.success)
            .find_map(|r| r.link.as_deref())
    }
}
