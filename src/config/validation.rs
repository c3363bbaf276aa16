//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, group sizes block-aligned)
//! - Check that enabled back ends carry what they need to start
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AnchorConfig → Result<(), Vec<ValidationError>>
//! - Environment variables are checked at startup, not here

use std::fmt;
use std::net::SocketAddr;

use crate::codec::block::BLOCK_BYTES;
use crate::config::schema::AnchorConfig;
use crate::crypto::daily_key::parse_day;
use crate::crypto::KeyDerivation;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &AnchorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::new("listener.max_body_bytes", "must be > 0"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be > 0"));
    }

    validate_keys(config, &mut errors);
    validate_dispatch(config, &mut errors);
    validate_backends(config, &mut errors);

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "is not a socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_keys(config: &AnchorConfig, errors: &mut Vec<ValidationError>) {
    let keys = &config.keys;

    if keys.master_key_env.trim().is_empty() {
        errors.push(ValidationError::new("keys.master_key_env", "must not be empty"));
    }
    if keys.default_vehicle_id.trim().is_empty() {
        errors.push(ValidationError::new("keys.default_vehicle_id", "must not be empty"));
    }

    if let Some(date) = &keys.enrollment_date {
        if parse_day(date).is_err() {
            errors.push(ValidationError::new(
                "keys.enrollment_date",
                format!("'{date}' is not YYYY-MM-DD"),
            ));
        }
    }
    for (vehicle, date) in &keys.enrollments {
        if parse_day(date).is_err() {
            errors.push(ValidationError::new(
                &format!("keys.enrollments.{vehicle}"),
                format!("'{date}' is not YYYY-MM-DD"),
            ));
        }
    }

    if keys.derivation == KeyDerivation::Chained
        && keys.enrollment_date.is_none()
        && !keys.enrollments.contains_key(&keys.default_vehicle_id)
    {
        errors.push(ValidationError::new(
            "keys.enrollment_date",
            "chained derivation needs an enrollment date for the default vehicle",
        ));
    }
}

fn validate_dispatch(config: &AnchorConfig, errors: &mut Vec<ValidationError>) {
    let dispatch = &config.dispatch;

    if dispatch.call_timeout_ms == 0 {
        errors.push(ValidationError::new("dispatch.call_timeout_ms", "must be > 0"));
    }
    if dispatch.call_timeout_ms >= config.timeouts.request_secs.saturating_mul(1000) {
        errors.push(ValidationError::new(
            "dispatch.call_timeout_ms",
            "must be shorter than timeouts.request_secs",
        ));
    }
    if dispatch.group_bytes < 2 {
        errors.push(ValidationError::new(
            "dispatch.group_bytes",
            "must hold at least the 2-byte IV prefix",
        ));
    }
    if dispatch.group_bytes % BLOCK_BYTES != 0 {
        errors.push(ValidationError::new(
            "dispatch.group_bytes",
            format!("must be a multiple of {BLOCK_BYTES} so groups hold whole blocks"),
        ));
    }
    if dispatch.max_group_bytes < dispatch.group_bytes {
        errors.push(ValidationError::new(
            "dispatch.max_group_bytes",
            "must be >= dispatch.group_bytes",
        ));
    }
    if dispatch.retry.enabled && dispatch.retry.max_attempts == 0 {
        errors.push(ValidationError::new("dispatch.retry.max_attempts", "must be > 0"));
    }
    if dispatch.retry.base_delay_ms > dispatch.retry.max_delay_ms {
        errors.push(ValidationError::new(
            "dispatch.retry.base_delay_ms",
            "must be <= max_delay_ms",
        ));
    }
}

fn validate_backends(config: &AnchorConfig, errors: &mut Vec<ValidationError>) {
    let evm = &config.evm;
    if evm.enabled {
        if url::Url::parse(&evm.rpc_url).is_err() {
            errors.push(ValidationError::new("evm.rpc_url", "is not a URL"));
        }
        if evm.contract_address.trim().is_empty() {
            errors.push(ValidationError::new("evm.contract_address", "must be set"));
        }
    }

    let move_call = &config.move_call;
    if move_call.enabled {
        if url::Url::parse(&move_call.rpc_url).is_err() {
            errors.push(ValidationError::new("move_call.rpc_url", "is not a URL"));
        }
        if move_call.package_id.trim().is_empty() {
            errors.push(ValidationError::new("move_call.package_id", "must be set"));
        }
        if move_call.module.is_empty() || move_call.function.is_empty() {
            errors.push(ValidationError::new(
                "move_call.function",
                "module and function must be set",
            ));
        }
    }

    if config.feeless.enabled && config.feeless.program.trim().is_empty() {
        errors.push(ValidationError::new("feeless.program", "must be set"));
    }

    if config.storage.enabled && config.storage.database_path.trim().is_empty() {
        errors.push(ValidationError::new("storage.database_path", "must be set"));
    }
}
