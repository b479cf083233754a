// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ci_logs_indexer::error::TransportError;
use ci_logs_indexer::sink::{
    Batch, BulkOutcome, BulkTransport, RetryStrategy, SinkConfig, SinkHandle, SinkService,
};
use serde_json::Value;

pub const SAMPLE_LOG: &str = include_str!("../fixtures/flink-restore.log");

#[derive(Default)]
struct Captured {
    documents: Mutex<Vec<Value>>,
    requests: Mutex<usize>,
}

/// Transport that keeps every document it is sent, optionally rejecting
/// everything. Clones share what was captured.
#[derive(Clone, Default)]
pub struct Capture {
    captured: Arc<Captured>,
    reject: bool,
}

impl Capture {
    pub fn rejecting() -> Self {
        Capture {
            reject: true,
            ..Capture::default()
        }
    }

    pub fn documents(&self) -> Vec<Value> {
        self.captured.documents.lock().unwrap().clone()
    }

    pub fn requests(&self) -> usize {
        *self.captured.requests.lock().unwrap()
    }
}

#[async_trait]
impl BulkTransport for Capture {
    async fn send(&self, batch: &Batch) -> Result<BulkOutcome, TransportError> {
        *self.captured.requests.lock().unwrap() += 1;
        if self.reject {
            return Err(TransportError::Permanent("400 Bad Request".to_string()));
        }
        let body = String::from_utf8(batch.body()).unwrap();
        let mut documents = self.captured.documents.lock().unwrap();
        for line in body.lines().skip(1).step_by(2) {
            documents.push(serde_json::from_str(line).unwrap());
        }
        Ok(BulkOutcome::Accepted)
    }
}

pub fn sink_config() -> SinkConfig {
    SinkConfig {
        max_actions: 2,
        flush_interval: Duration::from_secs(60),
        retry_strategy: RetryStrategy::Immediate(2),
        ..SinkConfig::default()
    }
}

pub fn spawn_sink<T: BulkTransport>(transport: T) -> SinkHandle {
    let (handle, _task) = SinkService::spawn(sink_config(), transport);
    handle
}
