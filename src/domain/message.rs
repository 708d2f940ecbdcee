//! Direct conversations between two users

use super::account::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Longest message body accepted, in characters
pub const MAX_MESSAGE_CHARS: usize = 2000;

/// Characters of the latest message kept on the conversation
pub const PREVIEW_CHARS: usize = 50;

/// Page size when none is given
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Largest page a caller may ask for
pub const MAX_PAGE_SIZE: u32 = 100;

/// One side of a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    /// User ID
    pub id: String,
    /// Display name
    pub name: String,
    /// Account role
    pub role: Role,
}

/// A conversation as one participant sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Conversation ID
    pub id: String,
    /// Both participants, in stable order
    pub participants: Vec<Participant>,
    /// Contract the conversation was opened from, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_id: Option<String>,
    /// Start of the latest message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    /// When the latest message was sent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_time: Option<DateTime<Utc>>,
    /// Messages from the other participant the viewer has not read
    pub unread_count: u32,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last activity
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Whether `user_id` takes part
    pub fn includes(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p.id == user_id)
    }

    /// The participant who is not `user_id`
    pub fn other(&self, user_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id != user_id)
    }
}

/// A message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message ID
    pub id: String,
    /// Conversation it belongs to
    pub conversation_id: String,
    /// Author
    pub sender_id: String,
    /// Author's display name when sent
    pub sender_name: String,
    /// Body
    pub content: String,
    /// Send time
    pub timestamp: DateTime<Utc>,
    /// Whether the recipient has fetched it
    pub is_read: bool,
}

/// Request to open, or reopen, a conversation with another user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewConversation {
    /// The other user
    pub participant_id: String,
    /// Contract to link, if the conversation starts from one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_id: Option<String>,
}

/// Message body to send
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    /// Body, 1 to 2000 characters
    pub content: String,
}

impl NewMessage {
    /// Check the body is present and not too long
    pub fn validate(&self) -> Result<(), String> {
        if self.content.trim().is_empty() {
            return Err("Message cannot be empty".to_string());
        }
        if self.content.chars().count() > MAX_MESSAGE_CHARS {
            return Err(format!(
                "Message cannot exceed {} characters",
                MAX_MESSAGE_CHARS
            ));
        }
        Ok(())
    }

    /// What the conversation shows as its latest message
    pub fn preview(&self) -> String {
        self.content.chars().take(PREVIEW_CHARS).collect()
    }
}

/// Window of messages, oldest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePage {
    /// Messages to skip
    #[serde(default)]
    pub skip: u32,
    /// Messages to return, 1 to 100
    #[serde(default = "default_page_size")]
    pub limit: u32,
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl Default for MessagePage {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl MessagePage {
    /// Check the page size is within bounds
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=MAX_PAGE_SIZE).contains(&self.limit) {
            return Err(format!("limit must be between 1 and {}", MAX_PAGE_SIZE));
        }
        Ok(())
    }
}

/// Participant IDs in the order conversations are keyed by
pub fn participant_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_bounds() {
        assert!(NewMessage { content: "  ".to_string() }.validate().is_err());
        assert!(NewMessage { content: "x".repeat(MAX_MESSAGE_CHARS) }.validate().is_ok());
        assert!(NewMessage { content: "x".repeat(MAX_MESSAGE_CHARS + 1) }.validate().is_err());
    }

    #[test]
    fn test_preview_counts_characters() {
        let message = NewMessage {
            content: "مرحبا".repeat(20),
        };
        assert_eq!(message.preview().chars().count(), PREVIEW_CHARS);
    }

    #[test]
    fn test_page_defaults_and_bounds() {
        let page: MessagePage = serde_json::from_str("{}").unwrap();
        assert_eq!(page, MessagePage::default());
        assert!(MessagePage { skip: 0, limit: 0 }.validate().is_err());
        assert!(MessagePage { skip: 0, limit: 101 }.validate().is_err());
    }

    #[test]
    fn test_participant_pair_is_order_free() {
        assert_eq!(participant_pair("b", "a"), participant_pair("a", "b"));
    }
}
