// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Destinations for exported documents.

use crate::export::ExportedDocument;
use log::info;
use snafu::prelude::*;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Error type for delivery failures.
#[derive(Debug, Snafu)]
pub enum DeliveryError {
    /// The output directory could not be created.
    #[snafu(display("failed to create output directory {}: {source}", path.display()))]
    CreateDir {
        /// The directory that was being created.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The target file exists and overwriting was not requested.
    #[snafu(display("{} already exists", path.display()))]
    AlreadyExists {
        /// The existing file.
        path: PathBuf,
    },

    /// Writing the document failed.
    #[snafu(display("failed to write {}: {source}", path.display()))]
    Write {
        /// The file that was being written.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Writing to stdout failed.
    #[snafu(display("failed to write to stdout: {source}"))]
    Stdout {
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

/// Presents or persists an exported document.
pub trait DeliverySink {
    /// Hands over the finished document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document could not be delivered; nothing is
    /// partially delivered.
    fn deliver(&self, document: &ExportedDocument) -> Result<(), DeliveryError>;
}

/// Writes each document as a UTF-8 `.md` file in a directory.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
    force: bool,
}

impl DirectorySink {
    /// Creates a sink writing into `dir`, which is created on first delivery.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            force: false,
        }
    }

    /// Allows replacing files that already exist.
    #[must_use]
    pub const fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// The directory documents are written to.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DeliverySink for DirectorySink {
    fn deliver(&self, document: &ExportedDocument) -> Result<(), DeliveryError> {
        let path = self.dir.join(&document.filename);
        ensure!(self.force || !path.exists(), AlreadyExistsSnafu { path: &path });

        std::fs::create_dir_all(&self.dir).context(CreateDirSnafu { path: &self.dir })?;
        // Staged in the same directory, then renamed into place.
        let mut staged =
            tempfile::NamedTempFile::new_in(&self.dir).context(WriteSnafu { path: &path })?;
        staged
            .write_all(document.content.as_bytes())
            .and_then(|()| staged.as_file().sync_all())
            .context(WriteSnafu { path: &path })?;
        staged
            .persist(&path)
            .map_err(|err| err.error)
            .context(WriteSnafu { path: &path })?;

        info!("wrote {}", path.display());
        Ok(())
    }
}

/// Prints each document to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutSink;

impl DeliverySink for StdoutSink {
    fn deliver(&self, document: &ExportedDocument) -> Result<(), DeliveryError> {
        let mut stdout = std::io::stdout().lock();
        stdout
            .write_all(document.content.as_bytes())
            .and_then(|()| stdout.flush())
            .context(StdoutSnafu)
    }
}

/// Reports where each document would go without writing anything.
#[derive(Debug, Clone)]
pub struct DryRunSink {
    dir: Option<PathBuf>,
}

impl DryRunSink {
    /// A dry run for a [`DirectorySink`] on `dir`, or for stdout when `None`.
    #[must_use]
    pub const fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }
}

impl DeliverySink for DryRunSink {
    fn deliver(&self, document: &ExportedDocument) -> Result<(), DeliveryError> {
        match &self.dir {
            Some(dir) => eprintln!("Would write {}", dir.join(&document.filename).display()),
            None => eprintln!("Would output {}", document.filename),
        }
        Ok(())
    }
}
