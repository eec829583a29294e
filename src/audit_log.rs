//! Audit-trail receiver: user actions reported by the GRC front end are
//! validated, rendered as one line and emitted on the `audit_trail` target.
//! `file_layers` persists that target to `combined.log` and `error.log`.

use std::net::IpAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{Level, Subscriber};
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::filter::Targets;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, Layer};

pub const AUDIT_TARGET: &str = "audit_trail";

/// Every audit entry.
pub const COMBINED_LOG: &str = "combined.log";
/// Error-level audit entries only.
pub const ERROR_LOG: &str = "error.log";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LogEntry {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub user_role: Option<String>,
    pub module: String,
    #[serde(default)]
    pub entity_type: Option<String>,
    pub action_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default)]
    pub ip_address: Option<IpAddr>,
    #[serde(default)]
    pub additional_info: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LogEntryError {
    #[error("\"{0}\" is not allowed to be empty")]
    Empty(&'static str),
}

impl LogEntry {
    pub fn validate(&self) -> Result<(), LogEntryError> {
        if self.module.trim().is_empty() {
            return Err(LogEntryError::Empty("module"));
        }
        if self.action_type.trim().is_empty() {
            return Err(LogEntryError::Empty("actionType"));
        }
        Ok(())
    }
}

/// `[MODULE] <Module> Module - Action: ACTION on Entity by User: name (Role: r) | Details: ...`
pub fn build_log_message(entry: &LogEntry) -> String {
    let mut message = format!("[{}]", entry.module.to_uppercase());

    let module_name = match entry.module.to_lowercase().as_str() {
        "risk" => "Risk",
        "policy" => "Policy",
        "compliance" => "Compliance",
        _ => entry.module.as_str(),
    };
    message.push_str(&format!(" {module_name} Module -"));
    message.push_str(&format!(" Action: {}", entry.action_type.to_uppercase()));

    if let Some(ref entity) = entry.entity_type {
        message.push_str(&format!(" on {entity}"));
    }
    if let Some(ref name) = entry.user_name {
        message.push_str(&format!(" by User: {name}"));
    }
    if let Some(ref role) = entry.user_role {
        message.push_str(&format!(" (Role: {role})"));
    }

    if let Some(ref description) = entry.description {
        message.push_str(&format!(" | Details: {description}"));
    } else if let Some(ref info) = entry.additional_info {
        let details = serde_json::to_string(info).unwrap_or_default();
        message.push_str(&format!(" | Details: {details}"));
    }

    message
}

/// Effective level and message for an entry. Explicit non-INFO levels win;
/// INFO is refined by module and action.
pub fn classify(entry: &LogEntry) -> (LogLevel, String) {
    let message = build_log_message(entry);
    if entry.log_level != LogLevel::Info {
        return (entry.log_level, message);
    }

    let module = entry.module.to_lowercase();
    let action = entry.action_type.to_lowercase();
    let refined = match (module.as_str(), action.as_str()) {
        ("risk", "create") => Some((LogLevel::Info, "Risk created successfully")),
        ("risk", "update") => Some((LogLevel::Info, "Risk updated")),
        ("risk", "delete") => Some((LogLevel::Warn, "Risk deleted")),
        ("risk", "view") | ("risk", "click") => Some((LogLevel::Debug, "Risk viewed or clicked")),
        ("policy", "submit") => Some((LogLevel::Info, "Policy submitted")),
        ("policy", "approve") => Some((LogLevel::Info, "Policy approved")),
        _ => None,
    };

    match refined {
        Some((level, suffix)) => (level, format!("{message} [{suffix}]")),
        None => (LogLevel::Info, message),
    }
}

/// Emit an entry on the audit-trail target.
pub fn record(entry: &LogEntry) {
    let (level, message) = classify(entry);
    let user_id = entry.user_id.as_deref().unwrap_or_default();
    let ip = entry.ip_address.map(|ip| ip.to_string()).unwrap_or_default();

    match level {
        LogLevel::Error => {
            tracing::error!(target: AUDIT_TARGET, user_id, ip_address = %ip, "{message}")
        }
        LogLevel::Warn => {
            tracing::warn!(target: AUDIT_TARGET, user_id, ip_address = %ip, "{message}")
        }
        LogLevel::Debug => {
            tracing::debug!(target: AUDIT_TARGET, user_id, ip_address = %ip, "{message}")
        }
        LogLevel::Info => {
            tracing::info!(target: AUDIT_TARGET, user_id, ip_address = %ip, "{message}")
        }
    }
}

/// File sinks for the audit trail, appended to and never rotated.
pub fn file_layers<S>(dir: impl AsRef<Path>) -> Result<impl Layer<S> + Send + Sync, InitError>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let dir = dir.as_ref();
    let open = |name: &str| {
        RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(name)
            .build(dir)
    };

    let combined = fmt::layer()
        .with_ansi(false)
        .with_writer(open(COMBINED_LOG)?)
        .with_filter(Targets::new().with_target(AUDIT_TARGET, Level::DEBUG));
    let errors = fmt::layer()
        .with_ansi(false)
        .with_writer(open(ERROR_LOG)?)
        .with_filter(Targets::new().with_target(AUDIT_TARGET, Level::ERROR));

    Ok(combined.and_then(errors))
}
