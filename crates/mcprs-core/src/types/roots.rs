//! `roots/list`: a client-side inventory of filesystem (or other URI) roots a server
//! may restrict its operations to. The request travels server-to-client, the inverse
//! direction of most other methods in this module.

use serde::{Deserialize, Serialize};

use super::core::Uri;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Root {
    pub uri: Uri,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Root {
    #[must_use]
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            name: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListRootsRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListRootsResult {
    pub roots: Vec<Root>,
}

/// Sent by the client when its root set changes, prompting the server to re-fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootsListChangedNotification {}
