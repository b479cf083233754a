// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

mod common;

use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use chrono::{Local, TimeZone};
use ci_logs_indexer::error::{PipelineError, ResolveError, SinkError};
use ci_logs_indexer::logs::ResolverConfig;
use ci_logs_indexer::pipeline::{ArchiveEntry, DirectorySource, Pipeline, RunSummary};
use ci_logs_indexer::sink::ShutdownStatus;
use common::{spawn_sink, Capture, SAMPLE_LOG};
use serde_json::Value;
use tempfile::TempDir;

const CLOCK_12_52_27: i64 = ((12 * 60 + 52) * 60 + 27) * 1000;

fn sorted_by_timestamp(mut documents: Vec<Value>) -> Vec<Value> {
    documents.sort_by_key(|doc| doc["log-ts"].as_i64().unwrap());
    documents
}

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

#[tokio::test]
async fn test_reference_sample() {
    let capture = Capture::default();
    let sink = spawn_sink(capture.clone());
    let pipeline = Pipeline::new(sink.clone(), ResolverConfig::default());

    let entry = ArchiveEntry {
        archive_name: "logs-ci-blinkplanner/20200629.4.tar.gz".to_string(),
        build_name: "logs-ci-blinkplanner/20200629.4.tar.gz".to_string(),
    };
    let summary = pipeline
        .index_entry(entry, Cursor::new(SAMPLE_LOG.as_bytes().to_vec()))
        .await
        .unwrap();
    assert_eq!(summary.records, 4);
    assert_eq!(summary.timestamps.resolved, 4);
    assert_eq!(summary.timestamps.carried_forward, 0);

    let documents = sorted_by_timestamp(capture.documents());
    assert_eq!(documents.len(), 4);

    let warn = documents[1]["line"].as_str().unwrap();
    assert!(warn.starts_with("12:52:27,908"));
    assert!(warn.contains("WARN  org.apache.flink.streaming.api.operators.BackendRestorerProcedure"));
    assert!(warn.contains(
        "org.apache.flink.test.state.operator.restore.StreamOperatorSnapshotRestoreTest.testOperatorStatesSnapshotRestoreWithLocalStateDeletedTM"
    ));
    assert!(warn.ends_with("\t... 47 more"));
    assert!(documents[2]["line"].as_str().unwrap().contains("12:52:27,922"));

    let midnight = Local
        .with_ymd_and_hms(2020, 6, 29, 0, 0, 0)
        .earliest()
        .unwrap()
        .timestamp_millis();
    assert_eq!(documents[0]["log-ts"], midnight + CLOCK_12_52_27 + 904);
    assert_eq!(documents[2]["log-ts"], midnight + CLOCK_12_52_27 + 922);
    assert_eq!(documents[0]["buildname"], "logs-ci-blinkplanner/20200629.4.tar.gz");

    let joined: Vec<&str> = documents.iter().map(|d| d["line"].as_str().unwrap()).collect();
    assert_eq!(joined.join("\n"), SAMPLE_LOG);

    let report = sink.close(Duration::from_secs(5)).await.unwrap();
    assert_eq!(report.documents_indexed, 4);
    assert_eq!(report.status, ShutdownStatus::Drained);
}

#[tokio::test]
async fn test_epoch_baseline_and_carry_forward() {
    let capture = Capture::default();
    let pipeline = Pipeline::new(spawn_sink(capture.clone()), ResolverConfig::default());

    // 1593456789 is 2020-06-29T18:53:09Z; minus 8 hours stays on the 29th.
    let day_start = 1_593_388_800_000;
    let entry = ArchiveEntry::from_archive_name("logs-ci-1593456789.zip/flink.log");
    let text = "Starting build\n12:52:27,904 INFO a\nmalformed line\n9 bottles\n";
    let summary = pipeline
        .index_entry(entry, Cursor::new(text.as_bytes().to_vec()))
        .await
        .unwrap();
    assert_eq!(summary.records, 3);
    assert_eq!(summary.build_name, "logs-ci-1593456789.zip-flink.log");
    assert_eq!(summary.timestamps.resolved, 1);
    assert_eq!(summary.timestamps.carried_forward, 2);

    let documents = capture.documents();
    let by_line = |prefix: &str| {
        documents
            .iter()
            .find(|doc| doc["line"].as_str().unwrap().starts_with(prefix))
            .unwrap()["log-ts"]
            .as_i64()
            .unwrap()
    };
    let origin = (1_593_456_789 - 8 * 3600) * 1000;
    assert_eq!(by_line("Starting"), origin);
    assert_eq!(by_line("12:52"), day_start + CLOCK_12_52_27 + 904);
    assert!(documents
        .iter()
        .any(|doc| doc["line"] == "12:52:27,904 INFO a\nmalformed line"));
    assert_eq!(by_line("9 bottles"), day_start + CLOCK_12_52_27 + 904);
}

#[tokio::test]
async fn test_unresolvable_file_is_skipped() {
    let capture = Capture::default();
    let pipeline = Pipeline::new(spawn_sink(capture.clone()), ResolverConfig::default());

    let err = pipeline
        .index_entry(
            ArchiveEntry::from_archive_name("logs-ci/latest/job.log"),
            Cursor::new(b"12:00:00,000 a\n".to_vec()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Resolve(ResolveError::NoBaseline { .. })));
    assert!(!err.is_fatal());
    assert_eq!(capture.requests(), 0);
}

#[tokio::test]
async fn test_run_over_directory() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "logs-ci/latest/job.log", "12:00:00,000 no baseline\n");
    write(dir.path(), "logs-ci-1593456789/job.log", SAMPLE_LOG);
    write(dir.path(), "logs-ci-blinkplanner/20200629.4/job.log", "12:00:00,000 a\n12:00:01,000 b");
    write(dir.path(), "reports/summary.log", "12:00:00,000 ignored\n");

    let capture = Capture::default();
    let sink = spawn_sink(capture.clone());
    let pipeline = Pipeline::new(sink.clone(), ResolverConfig::default());

    let summary = pipeline.run(&DirectorySource::new(dir.path())).await.unwrap();
    assert_eq!(
        summary,
        RunSummary {
            files_processed: 2,
            files_skipped: 1,
            records_submitted: 6,
        }
    );
    assert_eq!(capture.documents().len(), 6);
    assert!(capture
        .documents()
        .iter()
        .all(|doc| doc["buildname"] != "reports-summary.log"));

    let report = sink.close(Duration::from_secs(5)).await.unwrap();
    assert_eq!(report.documents_indexed, 6);
}

#[tokio::test]
async fn test_empty_directory_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let capture = Capture::default();
    let pipeline = Pipeline::new(spawn_sink(capture.clone()), ResolverConfig::default());

    let summary = pipeline.run(&DirectorySource::new(dir.path())).await.unwrap();
    assert_eq!(summary, RunSummary::default());
    assert_eq!(capture.requests(), 0);
}

#[tokio::test]
async fn test_sink_failure_aborts_run() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "logs-ci-1593456789/a.log", "12:00:00,000 a\n");
    write(dir.path(), "logs-ci-1593456789/b.log", "12:00:00,000 b\n");

    let capture = Capture::rejecting();
    let sink = spawn_sink(capture.clone());
    let pipeline = Pipeline::new(sink.clone(), ResolverConfig::default());

    let err = pipeline
        .run(&DirectorySource::new(dir.path()))
        .await
        .unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(
        err,
        PipelineError::Sink(SinkError::Rejected { documents: 1, .. })
    ));
    assert_eq!(capture.requests(), 1);
    assert!(sink.close(Duration::from_secs(1)).await.is_err());
}
