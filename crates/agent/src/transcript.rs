//! Append-only conversation transcript.

use serde::{Deserialize, Serialize};

use crate::prompts;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Bot,
    User,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// Ordered message log. Messages are only ever appended; a prediction turn
/// may append several bot messages at once but never rewrites history.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    /// A fresh transcript holds exactly the greeting. The prompt for the
    /// current field is surfaced as an input placeholder, not a message.
    pub fn opening() -> Self {
        let mut transcript = Self::default();
        transcript.push_bot(prompts::GREETING);
        transcript
    }

    pub fn push_bot(&mut self, content: impl Into<String>) {
        self.messages.push(Message { role: Role::Bot, content: content.into() });
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message { role: Role::User, content: content.into() });
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last_bot_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|message| message.role == Role::Bot)
            .map(|message| message.content.as_str())
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{Role, Transcript};

    #[test]
    fn opening_transcript_holds_exactly_the_greeting() {
        let transcript = Transcript::opening();

        assert_eq!(transcript.len(), 1);
        assert_eq!(
            transcript.messages()[0].content,
            "Hello! I'll analyze readmission risk. Let's start!"
        );
        assert_eq!(transcript.messages()[0].role, Role::Bot);
    }

    #[test]
    fn last_bot_message_skips_user_entries() {
        let mut transcript = Transcript::opening();
        transcript.push_user("Caucasian");

        assert!(transcript.last_bot_message().map(|m| m.contains("Hello")).unwrap_or(false));
    }
}
