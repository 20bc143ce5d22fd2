// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Markdown composition for exported transcripts.
//!
//! The layout is consumed by tooling that parses exports, so it is fixed:
//!
//! ```text
//! # <title>
//!
//! - Context: <context label>
//! - Exported: <ISO-8601 UTC>
//! - Messages: <count>
//!
//! ---
//!
//! ## User Query 1
//!
//! <content>
//!
//! **Relevant files**
//!
//! - `<path>`
//!
//! ---
//!
//! ## AI Response 1
//! ...
//! ```
//!
//! # Example
//!
//! ```
//! use chat2md::markdown::compose_transcript;
//! use chat2md::parser::ChatTurn;
//! use chrono::Utc;
//!
//! let turns = vec![ChatTurn::user("Hello!"), ChatTurn::assistant("Hi there!")];
//! let markdown = compose_transcript("Repository Chat", "owner/repo", &turns, &Utc::now());
//!
//! assert!(markdown.starts_with("# Repository Chat\n"));
//! assert!(markdown.contains("## User Query 1\n\nHello!\n"));
//! assert!(markdown.contains("## AI Response 1\n\nHi there!\n"));
//! ```

use crate::filename::iso_timestamp;
use crate::parser::{ChatTurn, Role};
use chrono::{DateTime, Utc};
use std::fmt::Write;

/// Shown in place of a message with no visible content.
pub const EMPTY_MESSAGE: &str = "_(empty message)_";

/// Renders turns as a transcript document.
///
/// User and assistant turns are numbered independently, starting at 1.
/// Turn contents are trimmed; the "Relevant files" list is only written for
/// turns that have files.
#[must_use]
pub fn compose_transcript(
    title: &str,
    context_label: &str,
    turns: &[ChatTurn],
    exported_at: &DateTime<Utc>,
) -> String {
    let mut out = String::new();
    writeln!(out, "# {title}\n").unwrap();
    writeln!(out, "- Context: {context_label}").unwrap();
    writeln!(out, "- Exported: {}", iso_timestamp(exported_at)).unwrap();
    writeln!(out, "- Messages: {}", turns.len()).unwrap();

    let mut user_queries = 0;
    let mut ai_responses = 0;
    for turn in turns {
        let heading = match turn.role {
            Role::User => {
                user_queries += 1;
                format!("User Query {user_queries}")
            }
            Role::Assistant => {
                ai_responses += 1;
                format!("AI Response {ai_responses}")
            }
        };
        render_turn(&mut out, &heading, turn);
    }

    out
}

fn render_turn(out: &mut String, heading: &str, turn: &ChatTurn) {
    let content = match turn.content.trim() {
        "" => EMPTY_MESSAGE,
        trimmed => trimmed,
    };

    // Blank line closing the previous section.
    out.push('\n');
    writeln!(out, "---\n\n## {heading}\n\n{content}").unwrap();

    if !turn.relevant_files.is_empty() {
        writeln!(out, "\n**Relevant files**\n").unwrap();
        for file in &turn.relevant_files {
            writeln!(out, "- `{file}`").unwrap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn new_year() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn compose(turns: &[ChatTurn]) -> String {
        compose_transcript("Chat", "owner/repo", turns, &new_year())
    }

    fn headings(markdown: &str) -> Vec<&str> {
        markdown
            .lines()
            .filter_map(|line| line.strip_prefix("## "))
            .collect()
    }

    #[test]
    fn renders_exact_layout() {
        let turns = vec![
            ChatTurn::user("  Explain this  "),
            ChatTurn::assistant("Here it is.").with_files(["src/lib.rs", "Cargo.toml"]),
        ];

        assert_eq!(
            compose(&turns),
            "# Chat\n\
             \n\
             - Context: owner/repo\n\
             - Exported: 2024-01-01T00:00:00.000Z\n\
             - Messages: 2\n\
             \n\
             ---\n\
             \n\
             ## User Query 1\n\
             \n\
             Explain this\n\
             \n\
             ---\n\
             \n\
             ## AI Response 1\n\
             \n\
             Here it is.\n\
             \n\
             **Relevant files**\n\
             \n\
             - `src/lib.rs`\n\
             - `Cargo.toml`\n"
        );
    }

    #[test]
    fn renders_preamble_without_turns() {
        assert_eq!(
            compose(&[]),
            "# Chat\n\n- Context: owner/repo\n- Exported: 2024-01-01T00:00:00.000Z\n- Messages: 0\n"
        );
    }

    #[test]
    fn numbers_roles_independently() {
        let turns = vec![
            ChatTurn::user("q1"),
            ChatTurn::assistant("a1"),
            ChatTurn::user("q2"),
            ChatTurn::assistant("a2"),
        ];

        assert_eq!(
            headings(&compose(&turns)),
            ["User Query 1", "AI Response 1", "User Query 2", "AI Response 2"]
        );
    }

    #[test]
    fn consecutive_turns_of_one_role_keep_counting() {
        let turns = vec![
            ChatTurn::assistant("greeting"),
            ChatTurn::assistant("more"),
            ChatTurn::user("q1"),
        ];

        assert_eq!(
            headings(&compose(&turns)),
            ["AI Response 1", "AI Response 2", "User Query 1"]
        );
    }

    #[test]
    fn placeholder_for_blank_content() {
        let output = compose(&[ChatTurn::user("   "), ChatTurn::assistant("")]);

        assert_eq!(output.matches(EMPTY_MESSAGE).count(), 2);
    }

    #[test]
    fn divider_precedes_every_turn() {
        let turns = vec![ChatTurn::user("a"), ChatTurn::assistant("b"), ChatTurn::user("c")];
        let output = compose(&turns);

        assert_eq!(output.matches("\n---\n\n## ").count(), 3);
    }

    #[test]
    fn omits_relevant_files_when_empty() {
        let output = compose(&[ChatTurn::assistant("answer")]);

        assert!(!output.contains("Relevant files"));
    }

    #[test]
    fn lists_files_in_given_order() {
        let output = compose(&[ChatTurn::user("q").with_files(["z.rs", "a.rs", "m.rs"])]);

        assert!(output.ends_with("- `z.rs`\n- `a.rs`\n- `m.rs`\n"));
    }

    #[test]
    fn keeps_interior_whitespace_of_content() {
        let output = compose(&[ChatTurn::assistant("\n\nline one\n\n    indented\n\n")]);

        assert!(output.contains("\n\nline one\n\n    indented\n"));
    }

    #[test]
    fn counts_all_messages_in_preamble() {
        let turns = vec![ChatTurn::user("a"), ChatTurn::user(""), ChatTurn::assistant("b")];

        assert!(compose(&turns).contains("- Messages: 3\n"));
    }
}
