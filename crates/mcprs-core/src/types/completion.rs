//! `completion/complete`: argument autocompletion for prompt and resource templates.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgumentInfo {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptReferenceData {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceTemplateReferenceData {
    pub uri: String,
}

/// What's being completed: a prompt argument, or a resource template's URI variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CompletionReference {
    #[serde(rename = "ref/prompt")]
    Prompt(PromptReferenceData),
    #[serde(rename = "ref/resource")]
    ResourceTemplate(ResourceTemplateReferenceData),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteRequest {
    pub argument: ArgumentInfo,
    #[serde(rename = "ref")]
    pub reference: CompletionReference,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<CompletionContext>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionData {
    pub values: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u32>,
    #[serde(rename = "hasMore", skip_serializing_if = "Option::is_none")]
    pub has_more: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteResult {
    pub completion: CompletionData,
}

impl CompleteResult {
    #[must_use]
    pub fn with_values(values: Vec<String>) -> Self {
        Self {
            completion: CompletionData {
                total: Some(values.len() as u32),
                has_more: Some(false),
                values,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_reference_tags_prompt_as_ref_prompt() {
        let reference = CompletionReference::Prompt(PromptReferenceData {
            name: "greeting".into(),
            title: None,
        });
        let json = serde_json::to_value(&reference).unwrap();
        assert_eq!(json["type"], "ref/prompt");
    }
}
