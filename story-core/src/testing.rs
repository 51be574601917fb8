//! Testing utilities.
//!
//! `MockBackend` serves scripted replies in order and records every prompt it
//! receives, so flows can be exercised without API calls.

use crate::backend::LlmBackend;
use async_trait::async_trait;
use openai::Message;
use std::collections::VecDeque;
use std::sync::Mutex;

/// One scripted outcome for a backend call.
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    Error(openai::Error),
}

impl MockReply {
    pub fn text(text: impl Into<String>) -> Self {
        MockReply::Text(text.into())
    }

    /// A transient network failure.
    pub fn network_error() -> Self {
        MockReply::Error(openai::Error::Network("connection reset".to_string()))
    }
}

/// A backend that returns scripted replies.
///
/// Once the script runs out the fallback reply is served, when one is set;
/// otherwise the call fails with [`openai::Error::EmptyResponse`].
#[derive(Debug, Default)]
pub struct MockBackend {
    replies: Mutex<VecDeque<MockReply>>,
    fallback: Option<String>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl MockBackend {
    pub fn new(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Script plain text replies.
    pub fn with_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(texts.into_iter().map(MockReply::text).collect())
    }

    /// Serve `text` for every call once the script is empty.
    pub fn with_fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback = Some(text.into());
        self
    }

    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Every prompt received, oldest first.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        lock(&self.requests).clone()
    }

    pub fn last_request(&self) -> Option<Vec<Message>> {
        lock(&self.requests).last().cloned()
    }
}

#[async_trait]
impl LlmBackend for MockBackend {
    async fn complete(&self, messages: Vec<Message>) -> Result<String, openai::Error> {
        lock(&self.requests).push(messages);

        let next = lock(&self.replies).pop_front();
        match next {
            Some(MockReply::Text(text)) => Ok(text),
            Some(MockReply::Error(e)) => Err(e),
            None => self.fallback.clone().ok_or(openai::Error::EmptyResponse),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// A poisoned lock only means another test thread panicked mid-call.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
