//! Foundational MCP types shared across requests, results, and notifications.

use serde::{Deserialize, Serialize};

/// A protocol version string, e.g. `"2025-06-18"`.
pub type ProtocolVersion = String;

/// An opaque pagination cursor returned by list endpoints.
pub type Cursor = String;

/// An opaque token correlating `notifications/progress` events back to the request
/// that asked for progress reporting, carried in `_meta.progressToken`.
pub type ProgressToken = String;

/// A resource URI. Kept as a bare `String` alias (rather than a validated newtype)
/// to match how the wire actually carries it.
pub type Uri = String;

/// A MIME type string, e.g. `"text/plain"`.
pub type MimeType = String;

/// Base64-encoded binary payload, carried as the raw encoded string.
pub type Base64String = String;

/// Client-facing hints attached to content and resources: who it's for and how
/// important it is. Both fields are advisory; clients may ignore either.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Annotations {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audience: Option<Vec<Role>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<f64>,
}

/// Identifies a peer implementation during the `initialize` handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Implementation {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Default for Implementation {
    fn default() -> Self {
        Self {
            name: "unknown".to_string(),
            version: "0.0.0".to_string(),
            title: None,
        }
    }
}

/// Role attached to sampling messages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}
