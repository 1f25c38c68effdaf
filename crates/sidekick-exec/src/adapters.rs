use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use serde::Serialize;

#[derive(thiserror::Error, Debug)]
pub enum ProviderError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
    #[error("unexpected response from {url}: {message}")]
    Malformed { url: String, message: String },
}

/// The chat-completion service that turns a request into a reply.
pub trait ChatProvider {
    fn complete(
        &self,
        model: &str,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, ProviderError>;

    fn list_models(&self) -> Result<Vec<String>, ProviderError>;
}

/// Any server speaking the OpenAI chat-completions dialect (LM Studio,
/// llama.cpp, vLLM, Ollama's `/v1`, ...).
#[derive(Debug, Clone)]
pub struct OpenAiCompatProvider {
    api_base: String,
    api_key: String,
    client: Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

/// The system prompt and the request travel as one user message, which
/// every compatible server accepts.
pub fn build_chat_prompt(system_prompt: &str, user_prompt: &str) -> String {
    format!("{system_prompt}\nUser Request: {user_prompt}")
}

impl OpenAiCompatProvider {
    pub fn new(
        api_base: &str,
        api_key: &str,
        request_timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let api_base = api_base.trim_end_matches('/').to_string();
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|source| ProviderError::Transport {
                url: api_base.clone(),
                source,
            })?;
        Ok(Self {
            api_base,
            api_key: api_key.to_string(),
            client,
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.api_base)
    }

    fn read_body(
        url: &str,
        response: reqwest::Result<reqwest::blocking::Response>,
    ) -> Result<String, ProviderError> {
        let transport = |source| ProviderError::Transport {
            url: url.to_string(),
            source,
        };
        let response = response.map_err(transport)?;
        let status = response.status();
        let body = response.text().map_err(transport)?;
        if !status.is_success() {
            return Err(ProviderError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

impl ChatProvider for OpenAiCompatProvider {
    fn complete(
        &self,
        model: &str,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, ProviderError> {
        let url = self.endpoint("chat/completions");
        let request = ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: build_chat_prompt(system_prompt, user_prompt),
            }],
        };
        tracing::debug!(%url, model, "sending chat completion");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send();
        let body = Self::read_body(&url, response)?;

        let parsed: ChatResponse =
            serde_json::from_str(&body).map_err(|err| ProviderError::Malformed {
                url: url.clone(),
                message: err.to_string(),
            })?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::Malformed {
                url: url.clone(),
                message: "no message content in choices".to_string(),
            })?;
        tracing::info!(model, chars = content.len(), "chat completion received");
        Ok(content)
    }

    fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let url = self.endpoint("models");
        let response = self.client.get(&url).bearer_auth(&self.api_key).send();
        let body = Self::read_body(&url, response)?;
        let parsed: ModelList =
            serde_json::from_str(&body).map_err(|err| ProviderError::Malformed {
                url: url.clone(),
                message: err.to_string(),
            })?;
        Ok(parsed.data.into_iter().map(|model| model.id).collect())
    }
}
