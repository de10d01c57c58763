use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use larder_core::config::{LlmConfig, LlmProvider};
use larder_core::TurnRole;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::llm::{CompletionRequest, LlmClient};

const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

/// Chat-completions client for OpenAI-compatible endpoints. Ollama serves
/// the same `/v1/chat/completions` shape, so one request body covers both
/// providers; they differ only in base URL and auth header.
pub struct HttpLlmClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("could not build completion http client")?;

        let base_url = match (&config.base_url, config.provider) {
            (Some(url), _) => url.trim_end_matches('/').to_string(),
            (None, LlmProvider::OpenAi) => OPENAI_DEFAULT_BASE_URL.to_string(),
            (None, LlmProvider::Ollama) => {
                return Err(anyhow!("llm.base_url is required for the ollama provider"))
            }
        };

        Ok(Self { http, base_url, model: config.model.clone(), api_key: config.api_key.clone() })
    }

    fn build_messages(request: &CompletionRequest) -> Vec<Value> {
        let mut messages = Vec::with_capacity(request.history.len() + 2);
        messages.push(json!({ "role": "system", "content": request.system }));

        for turn in &request.history {
            let role = match turn.role {
                TurnRole::User => "user",
                TurnRole::Assistant => "assistant",
            };
            messages.push(json!({ "role": role, "content": turn.content }));
        }

        match &request.attachment {
            Some(attachment) => {
                let mime = attachment.mime_type.as_deref().unwrap_or(DEFAULT_IMAGE_MIME);
                let data_url = format!("data:{mime};base64,{}", attachment.base64_data);
                messages.push(json!({
                    "role": "user",
                    "content": [
                        { "type": "text", "text": request.user_text },
                        { "type": "image_url", "image_url": { "url": data_url } },
                    ],
                }));
            }
            None => {
                messages.push(json!({ "role": "user", "content": request.user_text }));
            }
        }

        messages
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": Self::build_messages(&request),
        });

        let mut http_request = self.http.post(&url).json(&body);
        if let Some(api_key) = &self.api_key {
            http_request =
                http_request.header("Authorization", format!("Bearer {}", api_key.expose_secret()));
        }

        let response = http_request
            .send()
            .await
            .map_err(|err| anyhow!("failed to reach completion endpoint at {url}: {err}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("completion endpoint returned {status}: {body}"));
        }

        let decoded: CompletionResponse =
            response.json().await.context("completion endpoint returned invalid JSON")?;
        let content = decoded
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("completion endpoint returned no choices"))?;

        debug!(
            event_name = "llm.completion.received",
            model = %self.model,
            reply_chars = content.len(),
            "completion received"
        );
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use larder_core::TurnRole;

    use crate::llm::{Attachment, CompletionRequest, TurnMessage};

    use super::HttpLlmClient;

    fn request(attachment: Option<Attachment>) -> CompletionRequest {
        CompletionRequest {
            system: "be helpful".to_string(),
            history: vec![
                TurnMessage { role: TurnRole::User, content: "got milk?".to_string() },
                TurnMessage { role: TurnRole::Assistant, content: "two cartons".to_string() },
            ],
            user_text: "use one".to_string(),
            attachment,
        }
    }

    #[test]
    fn messages_replay_system_then_history_then_user() {
        let messages = HttpLlmClient::build_messages(&request(None));

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["content"], "got milk?");
        assert_eq!(messages[2]["role"], "assistant");
        assert_eq!(messages[3]["content"], "use one");
    }

    #[test]
    fn attachment_becomes_an_image_content_part_with_mime_fallback() {
        let messages = HttpLlmClient::build_messages(&request(Some(Attachment {
            base64_data: "aGVsbG8=".to_string(),
            mime_type: None,
        })));

        let content = messages.last().expect("user message")["content"]
            .as_array()
            .expect("multi-part content")
            .clone();
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[1]["type"], "image_url");
        assert_eq!(content[1]["image_url"]["url"], "data:image/jpeg;base64,aGVsbG8=");
    }
}
