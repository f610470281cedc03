//! Role-tagged transcript messages.
//!
//! `message_history` is append-only within a turn; synthetic `Tool` messages
//! record dispatched results so the model always sees what actually ran.

use crate::tools::ToolResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry in an agent's message history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    /// User-authored prompt or steering text.
    User {
        /// Message body.
        content: String,
        /// Creation time.
        timestamp: DateTime<Utc>,
    },
    /// Model (or step-program) authored text.
    Assistant {
        /// Message body.
        content: String,
        /// Creation time.
        timestamp: DateTime<Utc>,
    },
    /// Host-injected instructions or notices.
    System {
        /// Message body.
        content: String,
        /// Creation time.
        timestamp: DateTime<Utc>,
    },
    /// Synthetic record of a dispatched tool result.
    Tool {
        /// The normalized result.
        result: ToolResult,
        /// Creation time.
        timestamp: DateTime<Utc>,
    },
}

impl Message {
    /// Build a user message timestamped now.
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Build an assistant message timestamped now.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Build a system message timestamped now.
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Build a synthetic tool-result message timestamped now.
    pub fn tool(result: ToolResult) -> Self {
        Self::Tool {
            result,
            timestamp: Utc::now(),
        }
    }

    /// The role tag as a string (for logging and tests).
    pub fn role(&self) -> &'static str {
        match self {
            Self::User { .. } => "user",
            Self::Assistant { .. } => "assistant",
            Self::System { .. } => "system",
            Self::Tool { .. } => "tool",
        }
    }

    /// The textual content, if this is a text-bearing message.
    pub fn content(&self) -> Option<&str> {
        match self {
            Self::User { content, .. }
            | Self::Assistant { content, .. }
            | Self::System { content, .. } => Some(content),
            Self::Tool { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ToolCallId;
    use crate::tools::{ToolErrorKind, ToolResult};

    #[test]
    fn roles_match_variants() {
        assert_eq!(Message::user("hi").role(), "user");
        assert_eq!(Message::assistant("ok").role(), "assistant");
        assert_eq!(Message::system("note").role(), "system");
        let result = ToolResult::error(
            "t",
            ToolCallId::generate(),
            ToolErrorKind::NotFound,
            "missing",
        );
        assert_eq!(Message::tool(result).role(), "tool");
    }

    #[test]
    fn content_for_text_messages_only() {
        assert_eq!(Message::user("hi").content(), Some("hi"));
        let result = ToolResult::error(
            "t",
            ToolCallId::generate(),
            ToolErrorKind::NotFound,
            "missing",
        );
        assert_eq!(Message::tool(result).content(), None);
    }

    #[test]
    fn serde_tags_by_role() {
        let value = serde_json::to_value(Message::assistant("text")).unwrap();
        assert_eq!(value["role"], "assistant");
        assert_eq!(value["content"], "text");
    }
}
