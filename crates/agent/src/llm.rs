use anyhow::Result;
use async_trait::async_trait;
use larder_core::TurnRole;

/// One replayed turn of conversation history.
#[derive(Clone, Debug, PartialEq)]
pub struct TurnMessage {
    pub role: TurnRole,
    pub content: String,
}

/// An image the user attached to the current turn. Forwarded to the model,
/// never persisted.
#[derive(Clone, Debug, PartialEq)]
pub struct Attachment {
    pub base64_data: String,
    pub mime_type: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub history: Vec<TurnMessage>,
    pub user_text: String,
    pub attachment: Option<Attachment>,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}
