//! The seam between the coordinator and ledger back ends.

use async_trait::async_trait;

use super::types::{BackendKind, Submission};
use crate::ledger::types::LedgerResult;

/// An opaque asynchronous sink that anchors a payload and returns an id.
#[async_trait]
pub trait LedgerAdapter: Send + Sync {
    /// Stable identifier used in reports and backend selection.
    fn id(&self) -> &str;

    fn kind(&self) -> BackendKind;

    /// Anchor `submission`, returning the ledger's reference for it.
    async fn submit(&self, submission: &Submission) -> LedgerResult<String>;

    /// Explorer URL for a reference returned by [`submit`](Self::submit).
    fn explorer_link(&self, _reference: &str) -> Option<String> {
        None
    }
}

/// Fill a `{ref}` placeholder. Empty templates produce no link.
pub fn render_link(template: &str, reference: &str) -> Option<String> {
    if template.is_empty() {
        None
    } else {
        Some(template.replace("{ref}", reference))
    }
}
