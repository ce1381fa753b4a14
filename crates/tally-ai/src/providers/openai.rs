//! OpenAI Chat Completions API provider

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use serde::{Deserialize, Serialize};

use super::CompletionApi;
use crate::{
    error::{Error, Result},
    stream::{ChunkStream, CompletionChunk},
    types::{ChatMessage, CompletionRequest, TokenUsage},
};

/// Default API root
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI API client
pub struct OpenAIProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider with an API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the client at a different API root (proxies, compatible servers)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// List available chat models
    pub async fn list_models(&self) -> Result<Vec<OpenAIModelInfo>> {
        let url = format!("{}/models", self.base_url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::api(status.as_u16(), api_error_message(&text)));
        }

        let list: OpenAIModelList = response.json().await?;

        let mut chat_models: Vec<_> = list
            .data
            .into_iter()
            .filter(|m| is_chat_model(&m.id))
            .collect();
        chat_models.sort_by(|a, b| a.id.cmp(&b.id));

        Ok(chat_models)
    }

    fn build_request(&self, request: &CompletionRequest, stream: bool) -> OpenAIRequest {
        OpenAIRequest {
            model: request.model.clone(),
            messages: request.messages.iter().map(OpenAIMessage::from).collect(),
            stream,
            stream_options: (stream && request.include_usage)
                .then_some(StreamOptions { include_usage: true }),
        }
    }
}

#[async_trait]
impl CompletionApi for OpenAIProvider {
    async fn stream(&self, request: &CompletionRequest) -> Result<ChunkStream> {
        let body = self.build_request(request, true);
        let url = format!("{}/chat/completions", self.base_url);

        tracing::debug!(
            model = %body.model,
            messages = body.messages.len(),
            "opening completion stream"
        );

        let request_builder = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body);

        let event_source = EventSource::new(request_builder)
            .map_err(|e| Error::Sse(format!("Failed to create event source: {}", e)))?;

        Ok(Box::pin(create_stream(event_source)))
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = self.build_request(request, false);
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::api(status.as_u16(), api_error_message(&text)));
        }

        let completion: CompletionResponse = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::UnexpectedResponse("completion had no content".into()))
    }
}

/// Filter function to identify chat-capable models
fn is_chat_model(id: &str) -> bool {
    if id.starts_with("gpt-4") || id.starts_with("gpt-3.5-turbo") {
        // Exclude instruct, audio, realtime and other non-chat variants
        !["instruct", "embedding", "audio", "realtime", "transcribe", "tts", "search"]
            .iter()
            .any(|tag| id.contains(tag))
    } else {
        id.starts_with("o1") || id.starts_with("o3") || id.starts_with("o4")
    }
}

/// Pull the human-readable message out of an OpenAI error body
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.to_string())
}

/// Decode one SSE data payload. `Ok(None)` marks the `[DONE]` terminator.
fn parse_chunk(data: &str) -> Result<Option<CompletionChunk>> {
    if data.trim() == "[DONE]" {
        return Ok(None);
    }

    let raw: StreamChunk = serde_json::from_str(data)?;
    if let Some(err) = raw.error {
        return Err(Error::api(0, err.message));
    }

    let mut chunk = CompletionChunk::default();
    for choice in raw.choices {
        if let Some(content) = choice.delta.content {
            chunk.delta.get_or_insert_with(String::new).push_str(&content);
        }
    }
    chunk.usage = raw
        .usage
        .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens));

    Ok(Some(chunk))
}

fn create_stream(
    mut event_source: EventSource,
) -> impl futures::Stream<Item = Result<CompletionChunk>> {
    stream! {
        while let Some(event) = event_source.next().await {
            match event {
                Ok(Event::Open) => {}
                Ok(Event::Message(msg)) => match parse_chunk(&msg.data) {
                    Ok(Some(chunk)) => yield Ok(chunk),
                    Ok(None) => break,
                    Err(e) => {
                        event_source.close();
                        yield Err(e);
                        return;
                    }
                },
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(reqwest_eventsource::Error::InvalidStatusCode(status, response)) => {
                    event_source.close();
                    let text = response.text().await.unwrap_or_default();
                    yield Err(Error::api(status.as_u16(), api_error_message(&text)));
                    return;
                }
                Err(e) => {
                    event_source.close();
                    yield Err(Error::Sse(e.to_string()));
                    return;
                }
            }
        }
        event_source.close();
    }
}

/// Model info returned from the models endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAIModelInfo {
    pub id: String,
    pub created: i64,
    pub owned_by: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIModelList {
    data: Vec<OpenAIModelInfo>,
}

// Request types

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: &'static str,
    content: String,
}

impl From<&ChatMessage> for OpenAIMessage {
    fn from(msg: &ChatMessage) -> Self {
        Self {
            role: msg.role.as_str(),
            content: msg.content.clone(),
        }
    }
}

// Response types

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

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<StreamUsage>,
    #[serde(default)]
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}
