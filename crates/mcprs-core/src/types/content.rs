//! Message content blocks shared by tool results, prompt messages, and sampling.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::core::{Annotations, Base64String, MimeType, Uri};

/// One block of rich content. Tagged on the wire by `type` so that a peer can add new
/// variants without breaking deserialization of the ones it already understands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text(TextContent),
    #[serde(rename = "image")]
    Image(ImageContent),
    #[serde(rename = "audio")]
    Audio(AudioContent),
    #[serde(rename = "resource_link")]
    ResourceLink(ResourceLink),
    #[serde(rename = "resource")]
    Resource(EmbeddedResource),
}

impl ContentBlock {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(TextContent {
            text: text.into(),
            annotations: None,
            meta: None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextContent {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<HashMap<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageContent {
    pub data: Base64String,
    #[serde(rename = "mimeType")]
    pub mime_type: MimeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<HashMap<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioContent {
    pub data: Base64String,
    #[serde(rename = "mimeType")]
    pub mime_type: MimeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<HashMap<String, serde_json::Value>>,
}

/// A reference to an external resource, carried inline rather than fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceLink {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub uri: Uri,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<MimeType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedResource {
    pub resource: ResourceContent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextResourceContents {
    pub uri: Uri,
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<MimeType>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobResourceContents {
    pub uri: Uri,
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<MimeType>,
    pub blob: Base64String,
}

/// Either half of the text/binary split every `resources/read` result returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceContent {
    Text(TextResourceContents),
    Blob(BlobResourceContents),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_block_tags_by_type_field() {
        let block = ContentBlock::text("hello");
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["text"], "hello");
    }

    #[test]
    fn resource_content_untagged_round_trips_text_and_blob() {
        let text = ResourceContent::Text(TextResourceContents {
            uri: "file:///a".into(),
            mime_type: Some("text/plain".into()),
            text: "hi".into(),
        });
        let json = serde_json::to_value(&text).unwrap();
        let back: ResourceContent = serde_json::from_value(json).unwrap();
        assert!(matches!(back, ResourceContent::Text(_)));

        let blob = ResourceContent::Blob(BlobResourceContents {
            uri: "file:///b".into(),
            mime_type: None,
            blob: "AAAA".into(),
        });
        let json = serde_json::to_value(&blob).unwrap();
        let back: ResourceContent = serde_json::from_value(json).unwrap();
        assert!(matches!(back, ResourceContent::Blob(_)));
    }
}
