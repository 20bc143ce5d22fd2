// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Rewriting of fenced diagram blocks into embedded SVG images.
//!
//! Two fence tags are recognised:
//!
//! - `` ```mermaid `` holds diagram source directly.
//! - `` ```mermaid-json `` holds a JSON payload that a [`JsonDecoder`] turns
//!   into diagram source.
//!
//! The opening fence must start a line and be followed by a newline; the block
//! ends at the next line consisting of three backticks. An unterminated fence
//! is left as literal text. Everything outside the matched blocks is copied
//! through byte for byte.
//!
//! Each block becomes either `![Mermaid chart N](data:image/svg+xml;utf8,...)`
//! or, if decoding or rendering fails, its original text. Blocks are rendered
//! concurrently and spliced back by position, so the output order never
//! depends on which render finishes first.
//!
//! [`JsonDecoder`]: crate::capability::JsonDecoder

use crate::capability::{Capabilities, RenderError};
use chrono::Utc;
use log::{Level, debug, log, warn};
use regex::Regex;
use std::fmt::Write;
use std::ops::Range;
use std::sync::LazyLock;
use tokio::task::JoinSet;

static FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?msR)^```(mermaid-json|mermaid)\n(.*?)^```[ \t]*$")
        .expect("diagram fence pattern is valid")
});

/// How a block's payload encodes its diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Diagram source as-is (`mermaid`).
    Source,
    /// Diagram source wrapped in JSON (`mermaid-json`).
    Json,
}

impl BlockKind {
    /// The fence tag introducing this kind of block.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Source => "mermaid",
            Self::Json => "mermaid-json",
        }
    }
}

/// A diagram block found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramBlock<'a> {
    /// Which encoding the payload uses.
    pub kind: BlockKind,
    /// The trimmed text between the fences.
    pub payload: &'a str,
    /// The complete block, fences included.
    pub text: &'a str,
    /// Byte range of [`DiagramBlock::text`] in the document.
    pub span: Range<usize>,
    /// 0-based position among the document's diagram blocks.
    pub ordinal: usize,
}

/// Finds all diagram blocks in `text`, left to right and non-overlapping.
///
/// ```
/// use chat2md::diagram::{BlockKind, find_diagram_blocks};
///
/// let blocks = find_diagram_blocks("Intro\n```mermaid\ngraph TD\n```\n");
/// assert_eq!(blocks.len(), 1);
/// assert_eq!(blocks[0].kind, BlockKind::Source);
/// assert_eq!(blocks[0].payload, "graph TD");
/// ```
#[must_use]
pub fn find_diagram_blocks(text: &str) -> Vec<DiagramBlock<'_>> {
    FENCE
        .captures_iter(text)
        .enumerate()
        .filter_map(|(ordinal, caps)| {
            let whole = caps.get(0)?;
            let kind = match caps.get(1)?.as_str() {
                "mermaid-json" => BlockKind::Json,
                _ => BlockKind::Source,
            };
            Some(DiagramBlock {
                kind,
                payload: caps.get(2)?.as_str().trim(),
                text: whole.as_str(),
                span: whole.range(),
                ordinal,
            })
        })
        .collect()
}

/// Replaces every diagram block in `text` with an embedded image.
///
/// Blocks that cannot be decoded or rendered are kept verbatim; this function
/// never fails. Render ids are `export-<now millis>-<ordinal>`.
///
/// Must be called from within a Tokio runtime.
pub async fn rewrite_diagram_blocks(text: &str, caps: &Capabilities) -> String {
    let id_prefix = format!("export-{}", Utc::now().timestamp_millis());
    rewrite_with_id_prefix(text, caps, &id_prefix).await
}

/// [`rewrite_diagram_blocks`] with a caller-chosen render id prefix.
pub(crate) async fn rewrite_with_id_prefix(
    text: &str,
    caps: &Capabilities,
    id_prefix: &str,
) -> String {
    let blocks = find_diagram_blocks(text);
    if blocks.is_empty() {
        return text.to_owned();
    }

    let mut renders = JoinSet::new();
    for block in &blocks {
        let Some(source) = diagram_source(block, caps) else {
            continue;
        };
        let caps = caps.clone();
        let id = format!("{id_prefix}-{}", block.ordinal);
        let ordinal = block.ordinal;
        renders.spawn(async move { (ordinal, caps.render(&source, &id).await) });
    }

    // One slot per block; `None` means the block falls back to its source.
    let mut images: Vec<Option<String>> = vec![None; blocks.len()];
    while let Some(joined) = renders.join_next().await {
        match joined {
            Ok((ordinal, Ok(svg))) => images[ordinal] = Some(image_markdown(ordinal, &svg)),
            Ok((ordinal, Err(err))) => {
                log!(fallback_level(&err), "diagram {} kept as source: {err}", ordinal + 1);
            }
            Err(err) => warn!("diagram render task failed: {err}"),
        }
    }

    splice(text, &blocks, &images)
}

/// Log level for a block that falls back because its render failed.
const fn fallback_level(err: &RenderError) -> Level {
    match err {
        RenderError::Unavailable => Level::Debug,
        _ => Level::Warn,
    }
}

/// Resolves the source to render, or `None` if the block must stay as-is.
fn diagram_source(block: &DiagramBlock<'_>, caps: &Capabilities) -> Option<String> {
    match block.kind {
        BlockKind::Source => Some(block.payload.to_owned()),
        BlockKind::Json => {
            let Some(decoder) = &caps.json_decoder else {
                debug!(
                    "diagram {} kept as source: no JSON decoder",
                    block.ordinal + 1
                );
                return None;
            };
            let decoded = decoder.decode(block.payload);
            if decoded.is_none() {
                debug!(
                    "diagram {} kept as source: JSON payload not decodable",
                    block.ordinal + 1
                );
            }
            decoded
        }
    }
}

fn splice(text: &str, blocks: &[DiagramBlock<'_>], images: &[Option<String>]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (block, image) in blocks.iter().zip(images) {
        out.push_str(&text[last..block.span.start]);
        out.push_str(image.as_deref().unwrap_or(block.text));
        last = block.span.end;
    }
    out.push_str(&text[last..]);
    out
}

fn image_markdown(ordinal: usize, svg: &str) -> String {
    format!("![Mermaid chart {}]({})", ordinal + 1, svg_data_uri(svg))
}

/// Encodes an SVG document as a `data:image/svg+xml;utf8,` URI.
///
/// ```
/// use chat2md::diagram::svg_data_uri;
///
/// assert_eq!(
///     svg_data_uri("<svg/>"),
///     "data:image/svg+xml;utf8,%3Csvg%2F%3E"
/// );
/// ```
#[must_use]
pub fn svg_data_uri(svg: &str) -> String {
    format!("data:image/svg+xml;utf8,{}", encode_uri_component(svg))
}

/// Percent-encodes everything except `A-Z a-z 0-9 - _ . ! ~ * ' ( )`,
/// the set URI components may carry unescaped.
fn encode_uri_component(s: &str) -> String {
    let mut out = String::with_capacity(s.len() * 3);
    for &byte in s.as_bytes() {
        if byte.is_ascii_alphanumeric() || b"-_.!~*'()".contains(&byte) {
            out.push(char::from(byte));
        } else {
            write!(out, "%{byte:02X}").unwrap();
        }
    }
    out
}
