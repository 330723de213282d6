// Chat session state shared by the web UI and the terminal chat.

use anyhow::Result;
use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info};
use uuid::Uuid;

use crate::error::ChatError;
use crate::ollama::{ChatClient, ChatMessage};

pub const GREETING: &str = "Hello! I'm your AI agent. I can help you with questions and tasks. How can I assist you today?";
pub const APOLOGY: &str = "Sorry, I encountered an error while processing your request. Please make sure Ollama is running and try again.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatEntry {
    pub id: Uuid,
    pub content: String,
    pub is_user: bool,
    pub timestamp: DateTime<Local>,
}

impl ChatEntry {
    fn new(content: impl Into<String>, is_user: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            is_user,
            timestamp: Local::now(),
        }
    }
}

#[derive(Debug)]
pub struct ChatSession {
    model: String,
    entries: Vec<ChatEntry>,
}

impl ChatSession {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            entries: vec![ChatEntry::new(GREETING, false)],
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    pub fn entries(&self) -> &[ChatEntry] {
        &self.entries
    }

    /// Record a user turn and return the single message to send for it.
    /// Blank input records nothing.
    pub fn push_user(&mut self, input: &str) -> Option<ChatMessage> {
        if input.trim().is_empty() {
            return None;
        }
        self.entries.push(ChatEntry::new(input, true));
        Some(ChatMessage::user(input))
    }

    /// Record the model's answer to the latest user turn. A failed call is
    /// recorded as the apology.
    pub fn push_reply(&mut self, model: &str, result: Result<String, ChatError>) -> &ChatEntry {
        let reply = result.unwrap_or_else(|e| {
            error!(model, error = %e, "Error communicating with Ollama");
            APOLOGY.to_string()
        });
        self.entries.push(ChatEntry::new(reply, false));
        &self.entries[self.entries.len() - 1]
    }

    /// Send one user turn and record the reply. Each call is single-turn:
    /// earlier entries are not sent to the model.
    ///
    /// Returns `None` (recording nothing) for blank input. Dropping the
    /// future mid-call leaves the user turn unanswered and the session usable.
    pub async fn send<C>(&mut self, client: &C, input: &str) -> Option<&ChatEntry>
    where
        C: ChatClient + ?Sized,
    {
        let message = self.push_user(input)?;
        let model = self.model.clone();
        let result = client.chat(&model, &[message]).await;
        Some(self.push_reply(&model, result))
    }
}

/// Interactive chat on stdin/stdout. `/model <name>` switches model,
/// `/quit` or end of input leaves.
pub async fn run_terminal_chat<C>(client: &C, model: &str) -> Result<()>
where
    C: ChatClient + ?Sized,
{
    info!(model, "Starting terminal chat session");
    let mut session = ChatSession::new(model);
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    stdout
        .write_all(format!("AI Agent: {}\n(model: {}; /model <name> to switch, /quit to exit)\n", GREETING, model).as_bytes())
        .await?;

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();

        if line == "/quit" {
            break;
        }
        if let Some(name) = line.strip_prefix("/model") {
            let name = name.trim();
            if name.is_empty() {
                stdout
                    .write_all(format!("Current model: {}\n", session.model()).as_bytes())
                    .await?;
            } else {
                session.set_model(name);
                stdout
                    .write_all(format!("Switched to model {}\n", name).as_bytes())
                    .await?;
            }
            continue;
        }

        if let Some(reply) = session.send(client, line).await {
            let text = format!("AI Agent • {}\n{}\n", reply.timestamp.format("%H:%M:%S"), reply.content);
            stdout.write_all(text.as_bytes()).await?;
        }
    }

    info!("Chat session finished");
    Ok(())
}
