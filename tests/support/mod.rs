#![allow(dead_code)]

use std::sync::Mutex;

use async_trait::async_trait;
use jarvis::{ChatClient, ChatError, ChatMessage};

type Handler = Box<dyn Fn(&str, &[ChatMessage]) -> Result<String, ChatError> + Send + Sync>;

/// Chat client that answers from a closure and remembers every question.
pub struct FakeChat {
    pub handler: Handler,
    pub delay_ms: u64,
    pub calls: Mutex<Vec<(String, String)>>,
}

impl FakeChat {
    pub fn new(
        handler: impl Fn(&str, &[ChatMessage]) -> Result<String, ChatError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            delay_ms: 0,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Replies "echo: <question>".
    pub fn echo() -> Self {
        Self::new(|_, messages| Ok(format!("echo: {}", messages[0].content)))
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    /// `(model, question)` pairs in call order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatClient for FakeChat {
    async fn chat(&self, model: &str, messages: &[ChatMessage]) -> Result<String, ChatError> {
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        let question = messages.last().map(|m| m.content.clone()).unwrap_or_default();
        self.calls.lock().unwrap().push((model.to_string(), question));
        (self.handler)(model, messages)
    }
}

/// Progress sink that records every sample.
#[derive(Default)]
pub struct RecordingSink {
    pub samples: Mutex<Vec<f64>>,
    pub finished: Mutex<Vec<jarvis::RunSummary>>,
}

impl RecordingSink {
    pub fn samples(&self) -> Vec<f64> {
        self.samples.lock().unwrap().clone()
    }
}

impl jarvis::ProgressSink for RecordingSink {
    fn progress(&self, percent: f64) {
        self.samples.lock().unwrap().push(percent);
    }

    fn finished(&self, summary: &jarvis::RunSummary) {
        self.finished.lock().unwrap().push(summary.clone());
    }
}
