//! MCP protocol types layered on top of the JSON-RPC envelope.

mod capabilities;
mod completion;
mod content;
mod core;
mod elicitation;
mod initialization;
mod logging;
mod pagination;
mod prompts;
mod resources;
mod roots;
mod sampling;
mod tools;

pub use capabilities::{
    ClientCapabilities, CompletionCapabilities, ElicitationCapabilities, LoggingCapabilities,
    PromptsCapabilities, ResourcesCapabilities, RootsCapabilities, SamplingCapabilities,
    ServerCapabilities, ToolsCapabilities,
};
pub use completion::{
    ArgumentInfo, CompleteRequest, CompleteResult, CompletionContext, CompletionData,
    CompletionReference, PromptReferenceData, ResourceTemplateReferenceData,
};
pub use content::{
    AudioContent, BlobResourceContents, ContentBlock, EmbeddedResource, ImageContent,
    ResourceContent, ResourceLink, TextContent, TextResourceContents,
};
pub use core::{
    Annotations, Base64String, Cursor, Implementation, MimeType, ProgressToken, ProtocolVersion,
    Role, Uri,
};
pub use elicitation::{
    ElicitRequest, ElicitResult, ElicitationAction, ElicitationSchema, PrimitiveSchemaDefinition,
};
pub use initialization::{InitializeRequest, InitializeResult, InitializedNotification};
pub use logging::{
    LogLevel, LoggingNotification, ProgressNotification, SetLevelRequest, SetLevelResult,
};
pub use pagination::{PaginatedRequest, PaginatedResult};
pub use prompts::{
    GetPromptRequest, GetPromptResult, ListPromptsRequest, ListPromptsResult, Prompt,
    PromptArgument, PromptMessage,
};
pub use resources::{
    ListResourceTemplatesRequest, ListResourceTemplatesResult, ListResourcesRequest,
    ListResourcesResult, ReadResourceRequest, ReadResourceResult, Resource,
    ResourceListChangedNotification, ResourceTemplate, ResourceUpdatedNotification,
    SubscribeRequest, UnsubscribeRequest,
};
pub use roots::{ListRootsRequest, ListRootsResult, Root, RootsListChangedNotification};
pub use sampling::{
    CreateMessageRequest, CreateMessageResult, IncludeContext, ModelHint, ModelPreferences,
    SamplingMessage, StopReason,
};
pub use tools::{
    CallToolRequest, CallToolResult, ListToolsRequest, ListToolsResult, Tool, ToolAnnotations,
    ToolSchema,
};
