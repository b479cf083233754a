// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::io;

/// Errors raised while reading configuration from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors raised while deriving the time baseline of a log file.
///
/// All of these are fatal for the file being processed and for nothing else.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("no date or epoch timestamp found in archive '{archive}' or build '{build}'")]
    NoBaseline { archive: String, build: String },

    #[error("invalid calendar date '{0}' in archive name")]
    InvalidDate(String),

    #[error("epoch timestamp {0} is out of range")]
    InvalidEpoch(i64),
}

/// A failed bulk request, classified by whether retrying can help.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Network failures, throttling (429) and server errors (5xx).
    #[error("transient backend failure: {0}")]
    Transient(String),

    /// Any other rejection; retrying the same payload would fail again.
    #[error("permanent backend failure: {0}")]
    Permanent(String),
}

/// Unrecoverable sink failures.
///
/// Once one of these is raised the sink stops accepting records; the owner
/// of the sink is expected to terminate the process.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    #[error("bulk request failed after {attempts} attempts, {documents} documents undelivered: {reason}")]
    RetriesExhausted {
        attempts: u32,
        documents: usize,
        reason: String,
    },

    #[error("backend rejected {documents} documents: {reason}")]
    Rejected { documents: usize, reason: String },

    #[error("failed to serialize record: {0}")]
    Serialization(String),

    #[error("bulk delivery task failed: {0}")]
    Task(String),

    #[error("sink is closed")]
    Closed,
}

/// Errors surfaced by the pipeline orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The file's baseline could not be derived; the file is skipped.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// The file could not be read; the file is skipped.
    #[error("failed to read '{entry}': {source}")]
    Io {
        entry: String,
        #[source]
        source: io::Error,
    },

    /// The sink failed; the whole run must stop.
    #[error(transparent)]
    Sink(#[from] SinkError),
}

impl PipelineError {
    /// Returns true if the error must abort the whole run rather than a
    /// single file.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineError::Sink(_))
    }
}
