// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Chat turns and the JSON transcript format.
//!
//! A transcript file is a snapshot of a conversation as held by the chat UI:
//!
//! ```json
//! {
//!     "title": "Repository Chat",
//!     "contextLabel": "owner/repo",
//!     "messages": [
//!         { "role": "user", "content": "Explain this" },
//!         { "role": "assistant", "content": "Sure.", "relevantFiles": ["src/lib.rs"] }
//!     ]
//! }
//! ```
//!
//! # Example
//!
//! ```
//! use chat2md::parser::{Role, parse_transcript};
//!
//! let json = r#"{ "messages": [{ "role": "model", "content": "Hi" }] }"#;
//!
//! let transcript = parse_transcript(json).unwrap();
//! assert_eq!(transcript.messages[0].role, Role::Assistant);
//! ```

use serde::Deserialize;
use snafu::prelude::*;

/// Error type for transcript parsing failures.
#[derive(Debug, Snafu)]
pub enum ParseError {
    /// Failed to parse JSON content.
    #[snafu(display("failed to parse JSON: {source}"))]
    Json {
        /// The underlying JSON parsing error.
        source: serde_json::Error,
    },
}

/// Who authored a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human asking questions.
    User,
    /// The AI answering them. Also accepted as `"model"`.
    #[serde(alias = "model")]
    Assistant,
}

/// One message in a conversation.
///
/// Turns are never mutated by the export pipeline; rewriting produces a copy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurn {
    /// The author of the message.
    pub role: Role,

    /// The markdown body of the message, possibly containing diagram blocks.
    #[serde(default)]
    pub content: String,

    /// Repository paths the message referred to, in display order.
    #[serde(default)]
    pub relevant_files: Vec<String>,
}

impl ChatTurn {
    /// Creates a user turn with no relevant files.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            relevant_files: Vec::new(),
        }
    }

    /// Creates an assistant turn with no relevant files.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            relevant_files: Vec::new(),
        }
    }

    /// Attaches the list of relevant files.
    #[must_use]
    pub fn with_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relevant_files = files.into_iter().map(Into::into).collect();
        self
    }
}

/// A saved conversation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    /// Document title; callers fall back to a default when absent.
    #[serde(default)]
    pub title: Option<String>,

    /// What the conversation was about (usually a repository name).
    #[serde(default)]
    pub context_label: Option<String>,

    /// The turns in conversation order.
    pub messages: Vec<ChatTurn>,
}

/// Parses a JSON string into a [`Transcript`].
///
/// # Errors
///
/// Returns an error if the JSON is malformed, a message has an unknown role,
/// or the `messages` array is missing.
pub fn parse_transcript(json_str: &str) -> Result<Transcript, ParseError> {
    serde_json::from_str(json_str).context(JsonSnafu)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_transcript() {
        let json = r#"{
            "title": "Repository Chat",
            "contextLabel": "owner/repo",
            "messages": [
                { "role": "user", "content": "Explain this" },
                {
                    "role": "assistant",
                    "content": "Sure.",
                    "relevantFiles": ["src/lib.rs", "Cargo.toml"]
                }
            ]
        }"#;

        let transcript = parse_transcript(json).unwrap();

        assert_eq!(transcript.title.as_deref(), Some("Repository Chat"));
        assert_eq!(transcript.context_label.as_deref(), Some("owner/repo"));
        assert_eq!(transcript.messages.len(), 2);
        assert_eq!(transcript.messages[0], ChatTurn::user("Explain this"));
        assert_eq!(
            transcript.messages[1],
            ChatTurn::assistant("Sure.").with_files(["src/lib.rs", "Cargo.toml"])
        );
    }

    #[test]
    fn accepts_model_as_assistant() {
        let json = r#"{ "messages": [{ "role": "model", "content": "Hi" }] }"#;
        let transcript = parse_transcript(json).unwrap();

        assert_eq!(transcript.messages[0].role, Role::Assistant);
    }

    #[test]
    fn optional_fields_default() {
        let json = r#"{ "messages": [{ "role": "user" }] }"#;
        let transcript = parse_transcript(json).unwrap();

        assert_eq!(transcript.title, None);
        assert_eq!(transcript.context_label, None);
        assert_eq!(transcript.messages[0].content, "");
        assert!(transcript.messages[0].relevant_files.is_empty());
    }

    #[test]
    fn rejects_unknown_role() {
        let json = r#"{ "messages": [{ "role": "system", "content": "x" }] }"#;
        assert!(parse_transcript(json).is_err());
    }

    #[test]
    fn rejects_missing_messages() {
        assert!(parse_transcript(r#"{ "title": "x" }"#).is_err());
    }

    #[test]
    fn rejects_malformed_json() {
        let err = parse_transcript("{ not json").unwrap_err();
        assert!(err.to_string().starts_with("failed to parse JSON"));
    }
}
