//! Conversation history shared between the turn controller and the
//! response generator.
//!
//! The controller is the only writer; adapters receive cloned snapshots.

use serde::{Deserialize, Serialize};

/// Speaker role for one conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// One finalized turn of the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub text: String,
}

impl ChatTurn {
    pub fn new(role: ChatRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

/// Ordered conversation history. Owned exclusively by the turn controller;
/// user turns are appended after end-of-turn commit, assistant turns after
/// synthesis completes (or is cancelled with a partial result).
#[derive(Debug, Clone, Default)]
pub struct ConversationContext {
    turns: Vec<ChatTurn>,
}

impl ConversationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a history with a system prompt as the first entry.
    pub fn with_system(prompt: impl Into<String>) -> Self {
        Self {
            turns: vec![ChatTurn::new(ChatRole::System, prompt)],
        }
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.turns.push(ChatTurn::new(ChatRole::User, text));
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.turns.push(ChatTurn::new(ChatRole::Assistant, text));
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    /// Immutable copy handed to the response generator for one turn.
    pub fn snapshot(&self) -> Vec<ChatTurn> {
        self.turns.clone()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_is_first() {
        let mut ctx = ConversationContext::with_system("be brief");
        ctx.push_user("hello");
        ctx.push_assistant("hi there");

        assert_eq!(ctx.len(), 3);
        assert_eq!(ctx.turns()[0].role, ChatRole::System);
        assert_eq!(ctx.turns()[1].role, ChatRole::User);
        assert_eq!(ctx.turns()[2].text, "hi there");
    }

    #[test]
    fn snapshot_is_detached() {
        let mut ctx = ConversationContext::with_system("sys");
        let snap = ctx.snapshot();
        ctx.push_user("after");
        assert_eq!(snap.len(), 1);
        assert_eq!(ctx.len(), 2);
    }
}
