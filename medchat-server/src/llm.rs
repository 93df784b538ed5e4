use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, Stop,
    },
    Client,
};
use async_trait::async_trait;
use medchat_shared::{ChatMessage, MessageRole};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::config::ProviderConfig;
use crate::error::ModelError;

const TEMPERATURE: f32 = 0.0;
const TOP_P: f32 = 1.0;
const FREQUENCY_PENALTY: f32 = 0.0;
const PRESENCE_PENALTY: f32 = 0.0;
const COMPLETIONS: u8 = 1;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub stop: Option<Vec<String>>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self { max_tokens: 512, stop: None }
    }
}

/// One completion per call: the first choice's text, trimmed.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<String, ModelError>;
}

pub fn build_client(provider: &ProviderConfig) -> anyhow::Result<Box<dyn ModelClient>> {
    match provider {
        ProviderConfig::Azure { endpoint, api_key } => {
            Ok(Box::new(HttpCompletionClient::new(endpoint, api_key)?))
        }
        ProviderConfig::OpenAi { api_key, model, api_base } => Ok(Box::new(
            OpenAiCompletionClient::new(api_key.clone(), model.clone(), api_base.clone()),
        )),
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    messages: &'a [ChatMessage],
    frequency_penalty: f32,
    presence_penalty: f32,
    max_tokens: u32,
    stop: Option<&'a [String]>,
    temperature: f32,
    top_p: f32,
    n: u8,
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

/// Posts directly to a full completion URL (Azure OpenAI deployment style),
/// authenticating with an `api-key` header.
pub struct HttpCompletionClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpCompletionClient {
    pub fn new(endpoint: &str, api_key: &str) -> Result<Self, ModelError> {
        let parsed = reqwest::Url::parse(endpoint)
            .map_err(|e| ModelError::Unavailable(format!("invalid endpoint '{}': {}", endpoint, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ModelError::Unavailable(format!(
                "endpoint must use http or https, got: {}",
                parsed.scheme()
            )));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ModelError::Unavailable(format!("failed to create HTTP client: {}", e)))?;

        info!("HTTP completion client created for {}", parsed.host_str().unwrap_or("<no host>"));

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn headers(&self) -> Result<HeaderMap, ModelError> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&self.api_key)
            .map_err(|_| ModelError::Unavailable("API key is not a valid header value".to_string()))?;
        headers.insert("api-key", key);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

#[async_trait]
impl ModelClient for HttpCompletionClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<String, ModelError> {
        let body = CompletionRequest {
            messages,
            frequency_penalty: FREQUENCY_PENALTY,
            presence_penalty: PRESENCE_PENALTY,
            max_tokens: params.max_tokens,
            stop: params.stop.as_deref(),
            temperature: TEMPERATURE,
            top_p: TOP_P,
            n: COMPLETIONS,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Completion request failed: {}", e);
                ModelError::Unavailable(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Completion endpoint returned {}: {}", status, body);
            return Err(ModelError::Unavailable(format!("status {}: {}", status, body)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ModelError::Unavailable(format!("failed to read body: {}", e)))?;
        let parsed: CompletionResponse = serde_json::from_slice(&bytes)
            .map_err(|e| ModelError::Malformed(format!("unexpected response body: {}", e)))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ModelError::Malformed("response has no choices[0].message.content".to_string()))?;

        debug!("Completion returned {} chars", content.len());
        Ok(content.trim().to_string())
    }
}

/// Completion client for the OpenAI API, or any compatible `api_base`.
pub struct OpenAiCompletionClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiCompletionClient {
    pub fn new(api_key: String, model: String, api_base: Option<String>) -> Self {
        info!("Initializing OpenAI completion client with model: {}", model);
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base) = api_base {
            config = config.with_api_base(base);
        }
        let client = Client::with_config(config);
        Self { client, model }
    }

    fn convert_to_openai_message(
        &self,
        msg: &ChatMessage,
    ) -> Result<ChatCompletionRequestMessage, OpenAIError> {
        let content = msg.content.clone();
        let message = match msg.role {
            MessageRole::System => ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(content)
                    .build()?,
            ),
            MessageRole::User => ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(content)
                    .build()?,
            ),
            MessageRole::Assistant => ChatCompletionRequestMessage::Assistant(
                ChatCompletionRequestAssistantMessageArgs::default()
                    .content(content)
                    .build()?,
            ),
        };
        Ok(message)
    }
}

fn map_openai_error(e: OpenAIError) -> ModelError {
    match e {
        OpenAIError::JSONDeserialize(err) => ModelError::Malformed(err.to_string()),
        OpenAIError::ApiError(api_err) => ModelError::Unavailable(format!(
            "OpenAI API Error: {} (Code: {:?}, Type: {:?})",
            api_err.message, api_err.code, api_err.r#type
        )),
        other => ModelError::Unavailable(other.to_string()),
    }
}

#[async_trait]
impl ModelClient for OpenAiCompletionClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<String, ModelError> {
        let messages = messages
            .iter()
            .map(|msg| self.convert_to_openai_message(msg))
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_openai_error)?;

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model)
            .messages(messages)
            .frequency_penalty(FREQUENCY_PENALTY)
            .presence_penalty(PRESENCE_PENALTY)
            .max_tokens(params.max_tokens)
            .temperature(TEMPERATURE)
            .top_p(TOP_P)
            .n(COMPLETIONS);
        if let Some(stop) = &params.stop {
            args.stop(Stop::StringArray(stop.clone()));
        }
        let request = args.build().map_err(map_openai_error)?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            error!("OpenAI completion failed: {:?}", e);
            map_openai_error(e)
        })?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ModelError::Malformed("response has no choices[0].message.content".to_string()))?;

        Ok(content.trim().to_string())
    }
}
