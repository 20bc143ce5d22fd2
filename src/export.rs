// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! End-to-end export of a conversation.
//!
//! [`export_transcript`] rewrites the diagram blocks of every turn, composes
//! the transcript, names it, and hands it to a [`DeliverySink`]. Render
//! failures only ever downgrade a single block to its source; a delivery
//! failure fails the whole export.
//!
//! # Example
//!
//! ```
//! use chat2md::capability::{Capabilities, UnavailableRenderer};
//! use chat2md::export::{ExportRequest, build_document};
//! use chat2md::parser::ChatTurn;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let request = ExportRequest::new(
//!     "Repository Chat",
//!     "owner/repo",
//!     vec![ChatTurn::user("Explain this")],
//!     Capabilities::new(UnavailableRenderer),
//! );
//!
//! let document = build_document(&request).await;
//! assert!(document.filename.starts_with("owner-repo-chat-export-"));
//! assert!(document.content.contains("## User Query 1"));
//! # });
//! ```

use crate::capability::Capabilities;
use crate::diagram::rewrite_with_id_prefix;
use crate::filename::build_export_filename;
use crate::markdown::compose_transcript;
use crate::parser::ChatTurn;
use crate::sink::{DeliveryError, DeliverySink};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use snafu::prelude::*;
use tokio::task::JoinSet;

/// Error type for export failures.
#[derive(Debug, Snafu)]
pub enum ExportError {
    /// The sink rejected the finished document.
    #[snafu(display("failed to deliver {filename}: {source}"))]
    Deliver {
        /// The name the document was to be delivered under.
        filename: String,
        /// The underlying delivery error.
        source: DeliveryError,
    },
}

/// Everything needed to export one conversation.
#[derive(Debug, Clone)]
pub struct ExportRequest {
    /// Document title.
    pub title: String,
    /// What the conversation was about; also names the file.
    pub context_label: String,
    /// The turns in conversation order.
    pub turns: Vec<ChatTurn>,
    /// Export time, shown in the preamble and embedded in the filename.
    pub exported_at: DateTime<Utc>,
    /// Renderer, decoder, and render limits shared by all turns.
    pub capabilities: Capabilities,
}

impl ExportRequest {
    /// Creates a request stamped with the current time.
    pub fn new(
        title: impl Into<String>,
        context_label: impl Into<String>,
        turns: Vec<ChatTurn>,
        capabilities: Capabilities,
    ) -> Self {
        Self {
            title: title.into(),
            context_label: context_label.into(),
            turns,
            exported_at: Utc::now(),
            capabilities,
        }
    }

    /// Overrides the export time.
    #[must_use]
    pub const fn with_exported_at(mut self, exported_at: DateTime<Utc>) -> Self {
        self.exported_at = exported_at;
        self
    }
}

/// A finished, self-contained markdown document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedDocument {
    /// `<label>-chat-export-<timestamp>.md`
    pub filename: String,
    /// The transcript, with rendered diagrams inlined as data URIs.
    pub content: String,
}

/// Rewrites, composes, and names the document without delivering it.
///
/// Turns are rewritten concurrently; the document keeps their original order.
/// The request's turns are left untouched.
pub async fn build_document(request: &ExportRequest) -> ExportedDocument {
    let turns = rewrite_turns(request).await;
    let content = compose_transcript(
        &request.title,
        &request.context_label,
        &turns,
        &request.exported_at,
    );
    let filename = build_export_filename(&request.context_label, &request.exported_at);
    debug!("composed {filename} ({} bytes)", content.len());

    ExportedDocument { filename, content }
}

/// Builds the document and hands it to `sink`.
///
/// Returns the filename the document was delivered under.
///
/// # Errors
///
/// Returns [`ExportError::Deliver`] if the sink fails. Diagram failures are
/// never errors; those blocks stay as source.
pub async fn export_transcript(
    request: ExportRequest,
    sink: &dyn DeliverySink,
) -> Result<String, ExportError> {
    let document = build_document(&request).await;
    sink.deliver(&document).context(DeliverSnafu {
        filename: &document.filename,
    })?;
    Ok(document.filename)
}

async fn rewrite_turns(request: &ExportRequest) -> Vec<ChatTurn> {
    let stamp = request.exported_at.timestamp_millis();
    let mut rewrites = JoinSet::new();
    for (index, turn) in request.turns.iter().enumerate() {
        let content = turn.content.clone();
        let caps = request.capabilities.clone();
        let id_prefix = format!("export-{stamp}-{index}");
        rewrites.spawn(async move {
            let rewritten = rewrite_with_id_prefix(&content, &caps, &id_prefix).await;
            (index, rewritten)
        });
    }

    let mut contents: Vec<Option<String>> = vec![None; request.turns.len()];
    while let Some(joined) = rewrites.join_next().await {
        match joined {
            Ok((index, rewritten)) => contents[index] = Some(rewritten),
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(err) => warn!("turn rewrite did not finish, keeping original: {err}"),
        }
    }

    request
        .turns
        .iter()
        .zip(contents)
        .map(|(turn, content)| ChatTurn {
            content: content.unwrap_or_else(|| turn.content.clone()),
            ..turn.clone()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{BoxFuture, DiagramRenderer, RenderError, UnavailableRenderer};
    use chrono::TimeZone;
    use std::sync::Mutex;

    struct FixedSvg;

    impl DiagramRenderer for FixedSvg {
        fn render<'a>(&'a self, _source: &'a str, _id: &'a str)
        -> BoxFuture<'a, Result<String, RenderError>> {
            Box::pin(async { Ok("<svg>...</svg>".to_owned()) })
        }
    }

    /// Records every delivered document.
    #[derive(Default)]
    struct Collect(Mutex<Vec<ExportedDocument>>);

    impl DeliverySink for Collect {
        fn deliver(&self, document: &ExportedDocument) -> Result<(), DeliveryError> {
            self.0.lock().unwrap().push(document.clone());
            Ok(())
        }
    }

    struct Refuse;

    impl DeliverySink for Refuse {
        fn deliver(&self, document: &ExportedDocument) -> Result<(), DeliveryError> {
            Err(DeliveryError::AlreadyExists {
                path: document.filename.clone().into(),
            })
        }
    }

    fn new_year() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn request(turns: Vec<ChatTurn>, capabilities: Capabilities) -> ExportRequest {
        ExportRequest::new("Chat", "my repo", turns, capabilities).with_exported_at(new_year())
    }

    #[tokio::test]
    async fn exports_end_to_end() {
        let sink = Collect::default();
        let turns = vec![
            ChatTurn::user("Explain this"),
            ChatTurn::assistant("Here:\n```mermaid\ngraph TD; A-->B\n```"),
        ];

        let filename = export_transcript(request(turns, Capabilities::new(FixedSvg)), &sink)
            .await
            .unwrap();

        assert_eq!(filename, "my-repo-chat-export-2024-01-01T00-00-00-000Z.md");
        let delivered = sink.0.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        let content = &delivered[0].content;
        assert!(content.contains("## User Query 1"));
        assert!(content.contains("## AI Response 1"));
        assert!(content.contains("Here:\n![Mermaid chart 1](data:image/svg+xml;utf8,%3Csvg%3E"));
        assert!(!content.contains("```mermaid"));
    }

    #[tokio::test]
    async fn keeps_turn_order_and_files() {
        let turns = vec![
            ChatTurn::user("one"),
            ChatTurn::assistant("```mermaid\nA\n```").with_files(["a.rs"]),
            ChatTurn::user("three"),
        ];

        let document = build_document(&request(turns, Capabilities::new(FixedSvg))).await;

        let one = document.content.find("one").unwrap();
        let chart = document.content.find("Mermaid chart 1").unwrap();
        let three = document.content.find("three").unwrap();
        assert!(one < chart && chart < three);
        assert!(document.content.contains("- `a.rs`"));
        assert!(document.content.contains("- Messages: 3"));
    }

    #[tokio::test]
    async fn does_not_mutate_request_turns() {
        let request = request(
            vec![ChatTurn::assistant("```mermaid\nA\n```")],
            Capabilities::new(FixedSvg),
        );
        let before = request.turns.clone();

        build_document(&request).await;

        assert_eq!(request.turns, before);
    }

    #[tokio::test]
    async fn render_failures_fall_back_to_source() {
        let block = "```mermaid\ngraph TD\n```";
        let turns = vec![ChatTurn::assistant(block)];

        let document = build_document(&request(turns, Capabilities::new(UnavailableRenderer))).await;

        assert!(document.content.contains(block));
    }

    #[tokio::test]
    async fn delivery_failure_propagates() {
        let err = export_transcript(
            request(vec![ChatTurn::user("q")], Capabilities::new(FixedSvg)),
            &Refuse,
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            ExportError::Deliver {
                source: DeliveryError::AlreadyExists { .. },
                ..
            }
        ));
        assert!(err.to_string().starts_with("failed to deliver my-repo-chat-export-"));
    }

    #[tokio::test]
    async fn exports_empty_conversation() {
        let document = build_document(&request(vec![], Capabilities::new(FixedSvg))).await;

        assert!(document.content.ends_with("- Messages: 0\n"));
    }
}
