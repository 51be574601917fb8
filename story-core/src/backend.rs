//! The seam between the story engine and the model serving it.

use async_trait::async_trait;
use openai::{Client, Message, Request};
use tracing::debug;

/// Something that turns a compiled prompt into a reply.
///
/// Calls are slow and fallible. The engine never issues two at once.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Send the messages and return the reply text.
    async fn complete(&self, messages: Vec<Message>) -> Result<String, openai::Error>;

    /// Backend name for logs.
    fn name(&self) -> &str;
}

/// Backend for any OpenAI-compatible chat-completions endpoint.
#[derive(Debug)]
pub struct OpenAiBackend {
    client: Client,
    max_tokens: Option<usize>,
    temperature: Option<f32>,
}

impl OpenAiBackend {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    async fn complete(&self, messages: Vec<Message>) -> Result<String, openai::Error> {
        let mut request = Request::new(messages);
        if let Some(max_tokens) = self.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }
        if let Some(temperature) = self.temperature {
            request = request.with_temperature(temperature);
        }

        let response = self.client.complete(request).await?;
        if let Some(usage) = &response.usage {
            debug!(
                model = %response.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "completion received"
            );
        }
        Ok(response.content)
    }

    fn name(&self) -> &str {
        self.client.model()
    }
}
