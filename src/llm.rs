use crate::error::AppError;
use crate::openai_types::{
    OpenAIBatchResponse, OpenAIMessage, OpenAIPayload, OpenAITool, OpenAIToolCall,
};

use async_trait::async_trait;
use tracing::{debug, error, warn};

/// What the model answered for one chat turn.
#[derive(Clone, Default, PartialEq, Debug)]
pub struct ChatCompletion {
    pub content: String,
    pub tool_calls: Vec<OpenAIToolCall>,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Conversational turn with tools available.
    async fn chat(
        &self,
        messages: Vec<OpenAIMessage>,
        tools: Vec<OpenAITool>,
    ) -> Result<ChatCompletion, AppError>;

    /// Plain completion without tools.
    async fn complete(&self, messages: Vec<OpenAIMessage>) -> Result<String, AppError>;
}

pub struct OpenAiClient {
    pub http_client: reqwest::Client,
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
}

impl OpenAiClient {
    async fn post(&self, payload: &OpenAIPayload) -> Result<OpenAIBatchResponse, AppError> {
        let key = self.api_key.as_str();
        let resp = self
            .http_client
            .post(&self.endpoint)
            .header(reqwest::header::AUTHORIZATION, format!("Bearer {key}"))
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                error!(error=%e, "failed to send request to OpenAI");
                AppError::Model(format!("request failed: {e}"))
            })?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!(status=%status, body=%body, "OpenAI returned an error");
            return Err(AppError::Model(format!("OpenAI status {status}")));
        }
        let resp = resp.json::<OpenAIBatchResponse>().await.map_err(|e| {
            error!(error=%e, "failed to deserialize OpenAI response");
            AppError::Model(format!("bad response: {e}"))
        })?;
        debug!(id=%resp.id, model=%resp.model, "openai response");
        if let Some(usage) = &resp.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                total_tokens = usage.total_tokens,
                "openai usage"
            );
        }
        Ok(resp)
    }
}

fn first_message(resp: OpenAIBatchResponse) -> Result<OpenAIMessage, AppError> {
    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| AppError::Model("response without choices".to_string()))?;
    if choice.finish_reason.as_deref() == Some("length") {
        warn!(id=%resp.id, "openai answer cut at the token limit");
    }
    Ok(choice.message)
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    async fn chat(
        &self,
        messages: Vec<OpenAIMessage>,
        tools: Vec<OpenAITool>,
    ) -> Result<ChatCompletion, AppError> {
        let payload = OpenAIPayload {
            model: self.model.clone(),
            messages,
            tools: Some(tools),
            // Speech synthesis caps a single prompt at 400 characters
            max_tokens: Some(400),
            temperature: Some(0.0),
        };
        let message = first_message(self.post(&payload).await?)?;
        Ok(ChatCompletion {
            content: message.content.unwrap_or_default(),
            tool_calls: message.tool_calls.unwrap_or_default(),
        })
    }

    async fn complete(&self, messages: Vec<OpenAIMessage>) -> Result<String, AppError> {
        let payload = OpenAIPayload {
            model: self.model.clone(),
            messages,
            max_tokens: Some(1_000),
            temperature: Some(0.0),
            ..Default::default()
        };
        let message = first_message(self.post(&payload).await?)?;
        Ok(message.content.unwrap_or_default())
    }
}
