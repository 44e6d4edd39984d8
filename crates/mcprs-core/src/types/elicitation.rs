//! `elicitation/create`: the server-to-client request asking the user to fill in a
//! small, schema-described form.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ElicitationAction {
    Accept,
    Decline,
    Cancel,
}

/// One field of an elicitation form. Kept to the primitive shapes the protocol allows
/// (string/number/boolean/enum) rather than arbitrary JSON Schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PrimitiveSchemaDefinition {
    String {
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(rename = "minLength", skip_serializing_if = "Option::is_none")]
        min_length: Option<u32>,
        #[serde(rename = "maxLength", skip_serializing_if = "Option::is_none")]
        max_length: Option<u32>,
    },
    Number {
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        minimum: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        maximum: Option<f64>,
    },
    Boolean {
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        default: Option<bool>,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ElicitationSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub properties: HashMap<String, PrimitiveSchemaDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
}

impl ElicitationSchema {
    #[must_use]
    pub fn new() -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: HashMap::new(),
            required: None,
        }
    }

    #[must_use]
    pub fn add_string_property(mut self, name: impl Into<String>, title: Option<String>) -> Self {
        self.properties.insert(
            name.into(),
            PrimitiveSchemaDefinition::String {
                title,
                description: None,
                min_length: None,
                max_length: None,
            },
        );
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElicitRequest {
    pub message: String,
    #[serde(rename = "requestedSchema")]
    pub requested_schema: ElicitationSchema,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElicitResult {
    pub action: ElicitationAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<HashMap<String, serde_json::Value>>,
}
