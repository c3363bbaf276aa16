//! Feeless tangle back end.
//!
//! The tangle client lives in an external helper program. The adapter
//! spawns it per submission with `vehicleId hexData [timestamp]` and reads
//! the block id from stdout.

use std::process::Stdio;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::process::Command;

use super::types::{LedgerError, LedgerResult};
use crate::config::FeelessConfig;
use crate::crypto::daily_key::format_day;
use crate::dispatch::adapter::{render_link, LedgerAdapter};
use crate::dispatch::types::{BackendKind, Submission};

/// Hex-encoded `DATA|YYYY-MM-DD|<vehicleId>`, the index blocks are looked up by.
pub fn index_for(date: NaiveDate, vehicle_id: &str) -> String {
    hex::encode(format!("DATA|{}|{}", format_day(date), vehicle_id))
}

pub struct FeelessAdapter {
    id: String,
    config: FeelessConfig,
}

impl FeelessAdapter {
    pub fn new(id: impl Into<String>, config: &FeelessConfig) -> LedgerResult<Self> {
        if config.program.trim().is_empty() {
            return Err(LedgerError::Config("feeless.program is empty".to_string()));
        }
        Ok(Self {
            id: id.into(),
            config: config.clone(),
        })
    }

    fn command(&self, submission: &Submission) -> Command {
        let mut command = Command::new(&self.config.program);
        command
            .args(&self.config.args)
            .arg(&submission.vehicle_id)
            .arg(&submission.hex);
        if self.config.include_timestamp {
            command.arg(submission.timestamp.to_string());
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl LedgerAdapter for FeelessAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Feeless
    }

    async fn submit(&self, submission: &Submission) -> LedgerResult<String> {
        let output = self.command(submission).output().await.map_err(|e| {
            LedgerError::HelperProcess(format!("failed to spawn {}: {}", self.config.program, e))
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LedgerError::HelperProcess(format!(
                "helper exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        block_id_from_stdout(&stdout)
    }

    fn explorer_link(&self, reference: &str) -> Option<String> {
        render_link(&self.config.explorer_url, reference)
    }
}

/// Exactly one non-empty line is a block id.
fn block_id_from_stdout(stdout: &str) -> LedgerResult<String> {
    let mut lines = stdout.lines().map(str::trim).filter(|l| !l.is_empty());
    match (lines.next(), lines.next()) {
        (Some(id), None) => Ok(id.to_string()),
        (None, _) => Err(LedgerError::HelperProcess("helper printed nothing".to_string())),
        (Some(_), Some(_)) => Err(LedgerError::HelperProcess(format!(
            "helper printed more than one line: {:?}",
            stdout.trim()
        ))),
    }
}
