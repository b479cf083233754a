// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Drives log files one at a time through segmentation, timestamp
//! resolution and the sink.
//!
//! Files are processed strictly in sequence and the sink is flushed after
//! each one. Segmentation runs on the blocking thread pool and submits to
//! the sink with [`SinkHandle::blocking_submit`], so a saturated sink
//! suspends the reader rather than buffering the file in memory.
//!
//! A file whose baseline cannot be derived, or which cannot be read, is
//! skipped. A sink failure ends the run.

pub mod source;

use std::io::{self, BufRead};

use tracing::{debug, error, info, warn};

use crate::error::PipelineError;
use crate::logs::timestamp::ResolveStats;
use crate::logs::{segment, LogRecord, ResolverConfig, TimestampResolver};
use crate::sink::SinkHandle;

pub use source::{ArchiveEntry, DirectorySource, SourceFile};

/// Outcome of indexing one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSummary {
    pub build_name: String,
    pub records: u64,
    pub timestamps: ResolveStats,
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub files_processed: u64,
    pub files_skipped: u64,
    pub records_submitted: u64,
}

pub struct Pipeline {
    sink: SinkHandle,
    resolver_config: ResolverConfig,
}

impl Pipeline {
    #[must_use]
    pub fn new(sink: SinkHandle, resolver_config: ResolverConfig) -> Self {
        Pipeline {
            sink,
            resolver_config,
        }
    }

    /// Segments `reader`, resolves each record's timestamp and submits it,
    /// then waits for the sink to deliver everything submitted.
    ///
    /// On a read error the records submitted before it are still
    /// delivered.
    pub async fn index_entry<R>(
        &self,
        entry: ArchiveEntry,
        reader: R,
    ) -> Result<FileSummary, PipelineError>
    where
        R: BufRead + Send + 'static,
    {
        let resolver = TimestampResolver::for_entry(
            &entry.archive_name,
            &entry.build_name,
            &self.resolver_config,
        )?;
        let sink = self.sink.clone();
        let archive_name = entry.archive_name.clone();

        let segmented = tokio::task::spawn_blocking(move || {
            segment_into(entry, reader, resolver, &sink)
        })
        .await
        .map_err(|e| PipelineError::Io {
            entry: archive_name,
            source: io::Error::new(io::ErrorKind::Other, e),
        });

        self.sink.flush().await?;
        let summary = segmented??;
        debug!(
            "PIPELINE | Indexed {} records from {} ({} timestamps carried forward)",
            summary.records, summary.build_name, summary.timestamps.carried_forward
        );
        Ok(summary)
    }

    /// Indexes every file of `source`. Returns early only on a sink
    /// failure.
    pub async fn run(&self, source: &DirectorySource) -> Result<RunSummary, PipelineError> {
        let files = source.files();
        let mut summary = RunSummary::default();
        if files.is_empty() {
            info!(
                "PIPELINE | No log files found under {}",
                source.root().display()
            );
            return Ok(summary);
        }
        info!("PIPELINE | Indexing {} log files", files.len());

        for file in files {
            let reader = match file.open() {
                Ok(reader) => reader,
                Err(e) => {
                    warn!(
                        "PIPELINE | Skipping {}: {}",
                        file.entry.archive_name, e
                    );
                    summary.files_skipped += 1;
                    continue;
                }
            };

            let name = file.entry.archive_name.clone();
            match self.index_entry(file.entry, reader).await {
                Ok(file_summary) => {
                    summary.files_processed += 1;
                    summary.records_submitted += file_summary.records;
                }
                Err(e) if e.is_fatal() => {
                    error!("PIPELINE | Aborting run at {}: {}", name, e);
                    return Err(e);
                }
                Err(e) => {
                    error!("PIPELINE | Skipping {}: {}", name, e);
                    summary.files_skipped += 1;
                }
            }
        }

        info!(
            "PIPELINE | Run complete: {} files indexed, {} skipped, {} records",
            summary.files_processed, summary.files_skipped, summary.records_submitted
        );
        Ok(summary)
    }
}

fn segment_into<R: BufRead>(
    entry: ArchiveEntry,
    reader: R,
    mut resolver: TimestampResolver,
    sink: &SinkHandle,
) -> Result<FileSummary, PipelineError> {
    let mut records = 0;
    for text in segment(reader) {
        let text = text.map_err(|source| PipelineError::Io {
            entry: entry.archive_name.clone(),
            source,
        })?;
        let timestamp = resolver.resolve(&text);
        sink.blocking_submit(LogRecord::new(entry.build_name.clone(), text, timestamp))?;
        records += 1;
    }
    Ok(FileSummary {
        build_name: entry.build_name,
        records,
        timestamps: resolver.stats(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::sink::{Batch, BulkOutcome, BulkTransport, SinkConfig, SinkService};
    use async_trait::async_trait;
    use std::io::{BufReader, Cursor, Read};
    use std::time::Duration;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    struct Accepting;

    #[async_trait]
    impl BulkTransport for Accepting {
        async fn send(&self, _batch: &Batch) -> Result<BulkOutcome, TransportError> {
            Ok(BulkOutcome::Accepted)
        }
    }

    struct Failing;

    impl Read for Failing {
        fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "truncated archive"))
        }
    }

    fn pipeline() -> (Pipeline, SinkHandle) {
        let (sink, _task) = SinkService::spawn(SinkConfig::default(), Accepting);
        (
            Pipeline::new(sink.clone(), ResolverConfig::default()),
            sink,
        )
    }

    #[tokio::test]
    async fn test_read_error_delivers_earlier_records() {
        let (pipeline, sink) = pipeline();
        let reader = BufReader::new(
            Cursor::new(b"12:00:00,000 a\n12:00:01,000 b\n".to_vec()).chain(Failing),
        );

        let err = pipeline
            .index_entry(ArchiveEntry::from_archive_name("logs-1593456789/job.log"), reader)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Io { ref entry, .. } if entry == "logs-1593456789/job.log"));
        assert!(!err.is_fatal());

        let report = sink.close(Duration::from_secs(5)).await.unwrap();
        assert_eq!(report.documents_indexed, 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_skipped_files_are_logged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs-ci").join("latest.log");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "12:00:00,000 a\n").unwrap();

        let (pipeline, _sink) = pipeline();
        let summary = pipeline.run(&DirectorySource::new(dir.path())).await.unwrap();
        assert_eq!(summary.files_skipped, 1);
        assert!(logs_contain("Skipping logs-ci/latest.log"));
    }
}
