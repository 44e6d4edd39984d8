//! Retry policy and connection configuration for the streamable HTTP client transport.

use std::collections::HashMap;
use std::time::Duration;

/// Reject anything that isn't an absolute `http://`/`https://` URI, per the endpoint
/// contract shared by the streamable and legacy SSE transports.
pub(crate) fn validate_http_endpoint(endpoint: &str) -> Result<(), String> {
    let url = url::Url::parse(endpoint).map_err(|e| format!("invalid endpoint '{endpoint}': {e}"))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(format!(
            "endpoint '{endpoint}' must use http or https, found scheme '{other}'"
        )),
    }
}

/// Backoff policy governing SSE reconnect/resumption attempts.
#[derive(Clone, Debug)]
pub enum RetryPolicy {
    /// Fixed interval between retries.
    Fixed {
        interval: Duration,
        max_attempts: Option<u32>,
    },
    /// Exponential backoff, capped at `max_delay`.
    Exponential {
        base: Duration,
        max_delay: Duration,
        max_attempts: Option<u32>,
    },
    /// Never retry; a dropped stream closes the transport.
    Never,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_attempts: Some(10),
        }
    }
}

impl RetryPolicy {
    /// Delay before the given (zero-indexed) attempt, or `None` if attempts are exhausted.
    pub(crate) fn delay(&self, attempt: u32) -> Option<Duration> {
        match self {
            Self::Fixed {
                interval,
                max_attempts,
            } => {
                if let Some(max) = max_attempts
                    && attempt >= *max
                {
                    return None;
                }
                Some(*interval)
            }
            Self::Exponential {
                base,
                max_delay,
                max_attempts,
            } => {
                if let Some(max) = max_attempts
                    && attempt >= *max
                {
                    return None;
                }
                let delay = base.as_secs().saturating_mul(2u64.saturating_pow(attempt));
                Some(Duration::from_secs(delay.min(max_delay.as_secs())))
            }
            Self::Never => None,
        }
    }
}

/// A previously-known session id, used to resume an existing session rather than run a
/// fresh handshake. Constructing the transport with this set changes the "owns the
/// session" semantics: the transport will not DELETE a session it did not originate the
/// handshake for, and will refuse to carry an `initialize` request (see
/// [`crate::client::StreamableHttpTransport::send`]).
#[derive(Clone, Debug)]
pub struct ResumeSession {
    pub session_id: String,
}

/// Configuration for [`crate::client::StreamableHttpTransport`].
#[derive(Clone, Debug)]
pub struct StreamableHttpClientConfig {
    /// Absolute `https?://` URL of the single MCP endpoint.
    pub endpoint: String,

    /// Per-request HTTP timeout.
    pub timeout: Duration,

    /// Backoff policy for the background GET/SSE reader.
    pub retry_policy: RetryPolicy,

    /// Default interval between resumption GETs when the server has not sent a
    /// `retry:` field yet.
    pub default_retry_interval: Duration,

    /// Bearer token, if any.
    pub auth_token: Option<String>,

    /// Additional headers sent on every request. A key colliding with a header this
    /// transport manages itself (`Accept`, `Mcp-Session-Id`, `MCP-Protocol-Version`,
    /// `Last-Event-ID`, `Authorization`) is a configuration error at construction time.
    pub headers: HashMap<String, String>,

    pub user_agent: String,

    /// Resume an existing session instead of performing a fresh handshake.
    pub resume: Option<ResumeSession>,
}

impl Default for StreamableHttpClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080/mcp".to_string(),
            timeout: Duration::from_secs(30),
            retry_policy: RetryPolicy::default(),
            default_retry_interval: Duration::from_secs(1),
            auth_token: None,
            headers: HashMap::new(),
            user_agent: format!("mcprs-client/{}", env!("CARGO_PKG_VERSION")),
            resume: None,
        }
    }
}

impl StreamableHttpClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    const RESERVED_HEADERS: &'static [&'static str] = &[
        "accept",
        "mcp-session-id",
        "mcp-protocol-version",
        "last-event-id",
        "authorization",
    ];

    /// Reject configurations that shadow a header this transport manages itself, or
    /// whose endpoint is not an absolute `http://`/`https://` URI.
    pub(crate) fn validate(&self) -> Result<(), String> {
        for key in self.headers.keys() {
            if Self::RESERVED_HEADERS.contains(&key.to_ascii_lowercase().as_str()) {
                return Err(format!("header '{key}' is reserved and cannot be overridden"));
            }
        }
        validate_http_endpoint(&self.endpoint)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_doubles_and_caps() {
        let policy = RetryPolicy::Exponential {
            base: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_attempts: None,
        };
        assert_eq!(policy.delay(0), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay(1), Some(Duration::from_secs(2)));
        assert_eq!(policy.delay(10), Some(Duration::from_secs(10)));
    }

    #[test]
    fn fixed_policy_respects_max_attempts() {
        let policy = RetryPolicy::Fixed {
            interval: Duration::from_secs(5),
            max_attempts: Some(2),
        };
        assert_eq!(policy.delay(0), Some(Duration::from_secs(5)));
        assert_eq!(policy.delay(1), Some(Duration::from_secs(5)));
        assert_eq!(policy.delay(2), None);
    }

    #[test]
    fn reserved_header_fails_validation() {
        let mut config = StreamableHttpClientConfig::default();
        config.headers.insert("Mcp-Session-Id".to_string(), "x".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn non_http_scheme_fails_validation() {
        let config = StreamableHttpClientConfig::new("ws://localhost:8080/mcp");
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_endpoint_fails_validation() {
        let config = StreamableHttpClientConfig::new("not a url");
        assert!(config.validate().is_err());
    }

    #[test]
    fn https_endpoint_passes_validation() {
        let config = StreamableHttpClientConfig::new("https://example.com/mcp");
        assert!(config.validate().is_ok());
    }
}
