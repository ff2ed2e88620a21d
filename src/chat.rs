use std::path::Path;

use anyhow::Context;
use chrono::Local;

use crate::ai::ChatMessage;

/// Messages sent to the model, led by the system prompt.
#[derive(Clone, Debug)]
pub struct Conversation {
    system:   ChatMessage,
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self { system: ChatMessage::system(system_prompt), messages: Vec::new() }
    }
    pub fn push_user(&mut self, content: impl Into<String>) { self.messages.push(ChatMessage::user(content)); }
    pub fn push_assistant(&mut self, content: impl Into<String>) { self.messages.push(ChatMessage::assistant(content)); }
    pub fn clear(&mut self) { self.messages.clear(); }
    /// Messages excluding the system prompt.
    pub fn message_count(&self) -> usize { self.messages.len() }
    pub fn messages(&self) -> &[ChatMessage] { &self.messages }

    /// Full request payload, system prompt first.
    pub fn to_request(&self) -> Vec<ChatMessage> {
        std::iter::once(self.system.clone()).chain(self.messages.iter().cloned()).collect()
    }

    pub fn transcript(&self) -> String {
        let mut out = format!("# Conversation saved {}\n\n", Local::now().format("%Y-%m-%d %H:%M:%S"));
        for msg in &self.messages {
            let role = if msg.role == "user" { "User" } else { "Assistant" };
            out.push_str(&format!("[{role}]:\n{}\n\n", msg.content));
        }
        out
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        std::fs::write(path, self.transcript()).with_context(|| format!("writing {}", path.display()))
    }
}

/// Previously submitted lines, walked with the arrow keys.
#[derive(Clone, Debug, Default)]
pub struct InputHistory {
    entries: Vec<String>,
    cursor:  usize,
}

impl InputHistory {
    pub fn push(&mut self, line: &str) {
        if line.trim().is_empty() { return; }
        self.entries.push(line.to_string());
        self.cursor = self.entries.len();
    }

    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Older entry, or `current` when already at the oldest one.
    pub fn previous(&mut self, current: &str) -> String {
        if self.cursor > 0 && !self.entries.is_empty() {
            self.cursor -= 1;
            return self.entries[self.cursor].clone();
        }
        current.to_string()
    }

    /// Newer entry; stepping past the newest yields an empty line.
    pub fn next(&mut self, current: &str) -> String {
        if self.cursor + 1 < self.entries.len() {
            self.cursor += 1;
            self.entries[self.cursor].clone()
        } else if self.cursor + 1 == self.entries.len() {
            self.cursor = self.entries.len();
            String::new()
        } else {
            current.to_string()
        }
    }
}
