//! Logging level control and progress notification types.

use serde::{Deserialize, Serialize};

use super::core::ProgressToken;

/// RFC-5424-derived log level, ordered from least to most severe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetLevelRequest {
    pub level: LogLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetLevelResult {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingNotification {
    pub level: LogLevel,
    pub data: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,
}

/// Progress report correlated to a request via `progress_token`.
///
/// `progress` is monotone within the lifetime of one token; `total`, when present, lets
/// a caller render a determinate percentage instead of a spinner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressNotification {
    #[serde(rename = "progressToken")]
    pub progress_token: ProgressToken,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_levels_order_by_severity() {
        assert!(LogLevel::Debug < LogLevel::Emergency);
        assert!(LogLevel::Warning < LogLevel::Critical);
    }
}
