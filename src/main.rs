// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Command-line interface for chat2md.
//!
//! This binary provides the `chat2md` command for exporting saved chat
//! transcripts (JSON) to self-contained Markdown documents.

use chat2md::capability::{
    Capabilities, CommandRenderer, DiagramRenderer, JsonStringDecoder, UnavailableRenderer,
};
use chat2md::export::{ExportError, ExportRequest, export_transcript};
use chat2md::parser;
use chat2md::sink::{DeliveryError, DeliverySink, DirectorySink, DryRunSink, StdoutSink};
use chrono::{DateTime, Utc};
use lexopt::prelude::*;
use log::{LevelFilter, debug};
use snafu::{OptionExt, ensure, prelude::*};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use walkdir::WalkDir;

const DEFAULT_TITLE: &str = "Chat Export";

/// Where to deliver the exported documents.
#[derive(Clone)]
enum OutputTarget {
    /// Write each document to the specified directory.
    Directory(PathBuf),
    /// Write to stdout.
    Stdout,
}

#[allow(clippy::struct_excessive_bools)]
struct Cli {
    input: Vec<PathBuf>,
    output: OutputTarget,
    title: Option<String>,
    context: Option<String>,
    exported_at: Option<DateTime<Utc>>,
    renderer: Option<PathBuf>,
    renderer_args: Vec<String>,
    render_timeout: Option<Duration>,
    max_renders: Option<NonZeroUsize>,
    json_decode: bool,
    log_level: LevelFilter,
    quiet: bool,
    dry_run: bool,
    force: bool,
}

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to parse arguments: {source}"))]
    ParseArgs { source: lexopt::Error },

    #[snafu(display("at least one input file or directory is required"))]
    NoInputFiles,

    #[snafu(display("cannot output multiple files to stdout"))]
    MultipleFilesToStdout,

    #[snafu(display("failed to read {}: {source}", path.display()))]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to parse {}: {source}", path.display()))]
    ParseFile {
        path: PathBuf,
        source: parser::ParseError,
    },

    #[snafu(display("invalid input filename: no file stem"))]
    InvalidFilename,

    #[snafu(display("failed to export {}: {source}", path.display()))]
    Export { path: PathBuf, source: ExportError },
}

fn print_help() {
    println!(
        "\
{name} {version}
Export chat transcripts to self-contained Markdown

Usage: {name} [OPTIONS] -o <OUTPUT> <INPUT>...

Arguments:
  <INPUT>...  Transcript JSON files or directories containing them

Options:
  -o, --output <OUTPUT>       Output directory (or - for stdout)
      --title <TITLE>         Document title (default: transcript title or \"{DEFAULT_TITLE}\")
      --context <LABEL>       Context label (default: transcript label or input file name)
      --exported-at <TIME>    Export time as RFC 3339 (default: now)

Diagram rendering:
      --renderer <PROGRAM>    Program that reads Mermaid source on stdin and writes SVG
                              to stdout (default: none, diagrams stay as source)
      --renderer-arg <ARG>    Argument for the renderer, repeatable; {{id}} is replaced
                              by the diagram id, {{input}} and {{output}} by temporary
                              files used instead of stdin and stdout
      --render-timeout <MS>   Give up on a diagram after this many milliseconds
      --max-renders <N>       Run at most N renders at once (default: unlimited)
      --no-json-decode        Leave mermaid-json blocks as source

Other options:
      --log-level <LEVEL>     off, error, warn, info, debug or trace (default: warn)
  -q, --quiet                 Suppress progress messages
  -n, --dry-run               Show what would be written without writing
  -f, --force                 Overwrite existing output files
  -h, --help                  Print help
  -V, --version               Print version",
        name = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
    );
}

#[allow(clippy::too_many_lines)]
fn parse_args() -> Result<Cli, lexopt::Error> {
    // Show help if no arguments provided
    if std::env::args().len() == 1 {
        print_help();
        std::process::exit(0);
    }

    let mut input = Vec::new();
    let mut output: Option<OutputTarget> = None;
    let mut title = None;
    let mut context = None;
    let mut exported_at = None;
    let mut renderer = None;
    let mut renderer_args = Vec::new();
    let mut render_timeout = None;
    let mut max_renders = None;
    let mut json_decode = true;
    let mut log_level = LevelFilter::Warn;
    let mut quiet = false;
    let mut dry_run = false;
    let mut force = false;

    let mut parser = lexopt::Parser::from_env();
    while let Some(arg) = parser.next()? {
        match arg {
            Short('o') | Long("output") => {
                let val: PathBuf = parser.value()?.parse()?;
                output = Some(if val == Path::new("-") {
                    OutputTarget::Stdout
                } else {
                    OutputTarget::Directory(val)
                });
            }
            Long("title") => title = Some(parser.value()?.string()?),
            Long("context") => context = Some(parser.value()?.string()?),
            Long("exported-at") => {
                let val = parser.value()?.string()?;
                let parsed = DateTime::parse_from_rfc3339(&val)
                    .map_err(|_| "exported-at must be an RFC 3339 timestamp")?;
                exported_at = Some(parsed.with_timezone(&Utc));
            }
            Long("renderer") => renderer = Some(parser.value()?.parse()?),
            Long("renderer-arg") => renderer_args.push(parser.value()?.string()?),
            Long("render-timeout") => {
                let millis: u64 = parser
                    .value()?
                    .parse()
                    .map_err(|_| "render-timeout must be a number of milliseconds")?;
                render_timeout = Some(Duration::from_millis(millis));
            }
            Long("max-renders") => {
                let val: NonZeroUsize = parser
                    .value()?
                    .parse()
                    .map_err(|_| "max-renders must be a positive number")?;
                max_renders = Some(val);
            }
            Long("no-json-decode") => json_decode = false,
            Long("log-level") => {
                log_level = parser
                    .value()?
                    .string()?
                    .parse()
                    .map_err(|_| "log-level must be off, error, warn, info, debug or trace")?;
            }
            Short('q') | Long("quiet") => quiet = true,
            Short('n') | Long("dry-run") => dry_run = true,
            Short('f') | Long("force") => force = true,
            Short('h') | Long("help") => {
                print_help();
                std::process::exit(0);
            }
            Short('V') | Long("version") => {
                println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            Value(val) => input.push(val.parse()?),
            _ => return Err(arg.unexpected()),
        }
    }

    Ok(Cli {
        input,
        output: output.ok_or("missing required option: --output")?,
        title,
        context,
        exported_at,
        renderer,
        renderer_args,
        render_timeout,
        max_renders,
        json_decode,
        log_level,
        quiet,
        dry_run,
        force,
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Error> {
    let cli = parse_args().context(ParseArgsSnafu)?;

    env_logger::Builder::from_env(env_logger::Env::default())
        .filter_level(cli.log_level)
        .init();

    ensure!(!cli.input.is_empty(), NoInputFilesSnafu);

    // Collect all input files first
    let files = collect_input_files(&cli.input);
    if matches!(cli.output, OutputTarget::Stdout) {
        ensure!(files.len() == 1, MultipleFilesToStdoutSnafu);
    }

    let caps = make_capabilities(&cli);
    let sink = make_sink(&cli);
    debug!("exporting {} file(s) with {caps:?}", files.len());

    for file in &files {
        process_file(file, &caps, sink.as_ref(), &cli).await?;
    }

    Ok(())
}

/// Collects all JSON files from the given inputs (files and directories).
fn collect_input_files(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            for entry in WalkDir::new(input)
                .sort_by_file_name()
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
            {
                files.push(entry.path().to_path_buf());
            }
        } else {
            files.push(input.clone());
        }
    }
    files
}

/// Creates the renderer, decoder, and limits from CLI arguments.
fn make_capabilities(cli: &Cli) -> Capabilities {
    let renderer: Arc<dyn DiagramRenderer> = match &cli.renderer {
        Some(program) => Arc::new(CommandRenderer::new(program, cli.renderer_args.clone())),
        None => Arc::new(UnavailableRenderer),
    };

    let mut caps = Capabilities::from_shared(renderer);
    if cli.json_decode {
        caps = caps.with_json_decoder(JsonStringDecoder);
    }
    if let Some(timeout) = cli.render_timeout {
        caps = caps.with_render_timeout(timeout);
    }
    if let Some(limit) = cli.max_renders {
        caps = caps.with_max_concurrent_renders(limit);
    }
    caps
}

/// Creates the delivery sink from CLI arguments.
fn make_sink(cli: &Cli) -> Box<dyn DeliverySink> {
    match (&cli.output, cli.dry_run) {
        (OutputTarget::Directory(dir), true) => Box::new(DryRunSink::new(Some(dir.clone()))),
        (OutputTarget::Stdout, true) => Box::new(DryRunSink::new(None)),
        (OutputTarget::Directory(dir), false) => {
            Box::new(DirectorySink::new(dir).force(cli.force))
        }
        (OutputTarget::Stdout, false) => Box::new(StdoutSink),
    }
}

/// Exports a single transcript file through the sink.
async fn process_file(
    input: &Path,
    caps: &Capabilities,
    sink: &dyn DeliverySink,
    cli: &Cli,
) -> Result<(), Error> {
    let json = std::fs::read_to_string(input).context(ReadFileSnafu { path: input })?;
    let transcript = parser::parse_transcript(&json).context(ParseFileSnafu { path: input })?;

    let title = cli
        .title
        .clone()
        .or(transcript.title)
        .unwrap_or_else(|| DEFAULT_TITLE.to_owned());
    let context_label = match cli.context.clone().or(transcript.context_label) {
        Some(label) => label,
        None => input
            .file_stem()
            .context(InvalidFilenameSnafu)?
            .to_string_lossy()
            .into_owned(),
    };

    let request = ExportRequest::new(title, context_label, transcript.messages, caps.clone())
        .with_exported_at(cli.exported_at.unwrap_or_else(Utc::now));

    match export_transcript(request, sink).await {
        Ok(filename) => {
            if let OutputTarget::Directory(dir) = &cli.output
                && !cli.quiet
                && !cli.dry_run
            {
                eprintln!("Wrote {}", dir.join(filename).display());
            }
            Ok(())
        }
        Err(ExportError::Deliver {
            source: DeliveryError::AlreadyExists { path },
            ..
        }) => {
            eprintln!(
                "Skipping {} (already exists, use --force to overwrite)",
                path.display()
            );
            Ok(())
        }
        Err(source) => Err(source).context(ExportSnafu { path: input }),
    }
}
