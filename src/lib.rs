// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Export chat transcripts to self-contained Markdown.
//!
//! This crate turns a conversation (user queries and AI responses) into a
//! single portable Markdown document. Mermaid diagrams embedded in the
//! messages are rendered through an injected renderer and inlined as SVG
//! data URIs, so the exported file needs no rendering service to be read.
//!
//! # Overview
//!
//! 1. Every turn's `mermaid` / `mermaid-json` blocks are rewritten into
//!    images, concurrently and order-preserving; blocks that fail to render
//!    stay as source
//! 2. The turns are composed into a numbered transcript with a metadata preamble
//! 3. The document is named after its context label and export time and
//!    handed to a delivery sink
//!
//! # Example
//!
//! ```no_run
//! use chat2md::capability::{Capabilities, CommandRenderer, JsonStringDecoder};
//! use chat2md::export::{ExportRequest, export_transcript};
//! use chat2md::parser;
//! use chat2md::sink::DirectorySink;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let json = std::fs::read_to_string("chat.json")?;
//! let transcript = parser::parse_transcript(&json)?;
//!
//! let caps = Capabilities::new(CommandRenderer::new("mmdc", ["-i", "{input}", "-o", "{output}"]))
//!     .with_json_decoder(JsonStringDecoder);
//! let request = ExportRequest::new("Repository Chat", "owner/repo", transcript.messages, caps);
//!
//! let filename = export_transcript(request, &DirectorySink::new("exports")).await?;
//! println!("{filename}");
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`parser`]: chat turns and the JSON transcript format
//! - [`filename`]: filesystem-safe export names
//! - [`capability`]: renderer and JSON decoder interfaces
//! - [`diagram`]: diagram block discovery and rewriting
//! - [`markdown`]: transcript composition
//! - [`export`]: the end-to-end export driver
//! - [`sink`]: where finished documents go

#![deny(missing_docs)]

pub mod capability;
pub mod diagram;
pub mod export;
pub mod filename;
pub mod markdown;
pub mod parser;
pub mod sink;
