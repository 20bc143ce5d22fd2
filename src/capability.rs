// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Injected collaborators for diagram rewriting.
//!
//! The export core never renders a diagram itself. It calls a
//! [`DiagramRenderer`] for each block and, for JSON-wrapped blocks, a
//! [`JsonDecoder`] first. Both are bundled into [`Capabilities`] together with
//! the limits that govern how renders are scheduled.
//!
//! # Example
//!
//! ```
//! use std::num::NonZeroUsize;
//! use std::time::Duration;
//! use chat2md::capability::{Capabilities, JsonStringDecoder, UnavailableRenderer};
//!
//! let caps = Capabilities::new(UnavailableRenderer)
//!     .with_json_decoder(JsonStringDecoder)
//!     .with_render_timeout(Duration::from_secs(10))
//!     .with_max_concurrent_renders(NonZeroUsize::new(4).unwrap());
//! # let _ = caps;
//! ```

use snafu::prelude::*;
use std::fmt;
use std::future::Future;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Semaphore;

/// A boxed, sendable future, as returned by [`DiagramRenderer::render`].
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Why a single diagram could not be rendered.
///
/// Render errors never abort an export; the affected block is kept as source.
#[derive(Debug, Snafu)]
pub enum RenderError {
    /// No renderer is configured.
    #[snafu(display("no diagram renderer available"))]
    Unavailable,

    /// The renderer program could not be started.
    #[snafu(display("failed to start {}: {source}", program.display()))]
    Spawn {
        /// The program that was invoked.
        program: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Talking to the renderer process failed.
    #[snafu(display("renderer I/O failed: {source}"))]
    Io {
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The renderer process exited unsuccessfully.
    #[snafu(display("renderer exited with {status}: {stderr}"))]
    Exited {
        /// The exit status of the process.
        status: ExitStatus,
        /// Whatever the process wrote to stderr, trimmed.
        stderr: String,
    },

    /// The renderer succeeded but produced no image.
    #[snafu(display("renderer produced no output"))]
    EmptyOutput,

    /// The render took longer than the configured timeout.
    #[snafu(display("render timed out after {}ms", after.as_millis()))]
    TimedOut {
        /// The timeout that elapsed.
        after: Duration,
    },

    /// Any other renderer-specific failure.
    #[snafu(display("{message}"))]
    Failed {
        /// Description of the failure.
        message: String,
    },
}

/// Turns diagram source into a self-contained SVG document.
pub trait DiagramRenderer: Send + Sync {
    /// Renders `source`; `id` is unique within one export run.
    fn render<'a>(&'a self, source: &'a str, id: &'a str)
    -> BoxFuture<'a, Result<String, RenderError>>;
}

/// Extracts diagram source from a JSON-encoded block payload.
///
/// Returning `None` leaves the block untouched.
pub trait JsonDecoder: Send + Sync {
    /// Decodes `payload`, the trimmed body of a `mermaid-json` block.
    fn decode(&self, payload: &str) -> Option<String>;
}

impl<F> JsonDecoder for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn decode(&self, payload: &str) -> Option<String> {
        self(payload)
    }
}

/// The renderer, decoder, and scheduling limits shared by every block of an export.
///
/// Cloning is cheap; clones share the renderer and the concurrency limit.
#[derive(Clone)]
pub struct Capabilities {
    pub(crate) renderer: Arc<dyn DiagramRenderer>,
    pub(crate) json_decoder: Option<Arc<dyn JsonDecoder>>,
    pub(crate) render_timeout: Option<Duration>,
    pub(crate) render_limit: Option<Arc<Semaphore>>,
}

impl Capabilities {
    /// Creates capabilities with no JSON decoder, no timeout, and unbounded concurrency.
    pub fn new(renderer: impl DiagramRenderer + 'static) -> Self {
        Self::from_shared(Arc::new(renderer))
    }

    /// Like [`Capabilities::new`] for a renderer that is already shared.
    #[must_use]
    pub fn from_shared(renderer: Arc<dyn DiagramRenderer>) -> Self {
        Self {
            renderer,
            json_decoder: None,
            render_timeout: None,
            render_limit: None,
        }
    }

    /// Enables `mermaid-json` blocks.
    #[must_use]
    pub fn with_json_decoder(mut self, decoder: impl JsonDecoder + 'static) -> Self {
        self.json_decoder = Some(Arc::new(decoder));
        self
    }

    /// Treats any render slower than `timeout` as failed.
    #[must_use]
    pub const fn with_render_timeout(mut self, timeout: Duration) -> Self {
        self.render_timeout = Some(timeout);
        self
    }

    /// Caps the number of renders in flight at once, across all turns.
    #[must_use]
    pub fn with_max_concurrent_renders(mut self, limit: NonZeroUsize) -> Self {
        self.render_limit = Some(Arc::new(Semaphore::new(limit.get())));
        self
    }

    /// Runs the renderer under the configured limit and timeout.
    pub(crate) async fn render(&self, source: &str, id: &str) -> Result<String, RenderError> {
        // The semaphore is never closed.
        let _permit = match &self.render_limit {
            Some(limit) => limit.acquire().await.ok(),
            None => None,
        };

        let render = self.renderer.render(source, id);
        match self.render_timeout {
            Some(after) => tokio::time::timeout(after, render)
                .await
                .unwrap_or_else(|_| TimedOutSnafu { after }.fail()),
            None => render.await,
        }
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities")
            .field("json_decoder", &self.json_decoder.is_some())
            .field("render_timeout", &self.render_timeout)
            .field(
                "render_limit",
                &self.render_limit.as_ref().map(|s| s.available_permits()),
            )
            .finish_non_exhaustive()
    }
}

/// A renderer that always fails, leaving every diagram as source.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableRenderer;

impl DiagramRenderer for UnavailableRenderer {
    fn render<'a>(&'a self, _source: &'a str, _id: &'a str)
    -> BoxFuture<'a, Result<String, RenderError>> {
        Box::pin(async { UnavailableSnafu.fail::<String>() })
    }
}

/// Renders diagrams by running an external program.
///
/// Placeholders in the arguments are substituted per render:
///
/// - `{id}`: the block id
/// - `{input}`: a temporary file holding the diagram source; without it the
///   source is written to stdin
/// - `{output}`: a temporary file the program writes the SVG to; without it
///   the SVG is read from stdout
///
/// Tools such as `mmdc` cannot pipe, so they are run as
/// `mmdc -i {input} -o {output}`. The child is killed if the render is
/// abandoned (e.g. on timeout).
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandRenderer {
    /// Creates a renderer for `program` invoked with `args`.
    pub fn new<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    fn uses_placeholder(&self, placeholder: &str) -> bool {
        self.args.iter().any(|arg| arg.contains(placeholder))
    }

    async fn run(&self, source: &str, id: &str) -> Result<String, RenderError> {
        let file_input = self.uses_placeholder("{input}");
        let file_output = self.uses_placeholder("{output}");

        // Removed when dropped, after the child has finished.
        let workdir = tempfile::tempdir().context(IoSnafu)?;
        let input_path = workdir.path().join("diagram.mmd");
        let output_path = workdir.path().join("diagram.svg");
        if file_input {
            tokio::fs::write(&input_path, source)
                .await
                .context(IoSnafu)?;
        }

        let args = self.args.iter().map(|arg| {
            arg.replace("{id}", id)
                .replace("{input}", &input_path.to_string_lossy())
                .replace("{output}", &output_path.to_string_lossy())
        });
        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(if file_input {
                Stdio::null()
            } else {
                Stdio::piped()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .context(SpawnSnafu {
                program: &self.program,
            })?;

        // Feed stdin while the output is drained; dropping it closes the pipe.
        let stdin = child.stdin.take();
        let feed = async move {
            match stdin {
                Some(mut stdin) => stdin.write_all(source.as_bytes()).await,
                None => Ok(()),
            }
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output.context(IoSnafu)?;
        // A renderer may exit without reading all of its input.
        if let Err(err) = fed
            && err.kind() != std::io::ErrorKind::BrokenPipe
        {
            return Err(err).context(IoSnafu);
        }
        ensure!(
            output.status.success(),
            ExitedSnafu {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim(),
            }
        );

        let svg = if file_output {
            match tokio::fs::read_to_string(&output_path).await {
                Ok(svg) => svg.trim().to_owned(),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
                Err(err) => return Err(err).context(IoSnafu),
            }
        } else {
            String::from_utf8_lossy(&output.stdout).trim().to_owned()
        };
        ensure!(!svg.is_empty(), EmptyOutputSnafu);
        Ok(svg)
    }
}

impl DiagramRenderer for CommandRenderer {
    fn render<'a>(&'a self, source: &'a str, id: &'a str)
    -> BoxFuture<'a, Result<String, RenderError>> {
        Box::pin(self.run(source, id))
    }
}

/// Decodes payloads that are a JSON string literal holding the diagram source.
///
/// ```
/// use chat2md::capability::{JsonDecoder, JsonStringDecoder};
///
/// let source = JsonStringDecoder.decode(r#""graph TD;\nA-->B""#);
/// assert_eq!(source.as_deref(), Some("graph TD;\nA-->B"));
/// assert_eq!(JsonStringDecoder.decode("{}"), None);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonStringDecoder;

impl JsonDecoder for JsonStringDecoder {
    fn decode(&self, payload: &str) -> Option<String> {
        serde_json::from_str::<String>(payload)
            .ok()
            .filter(|source| !source.trim().is_empty())
    }
}
