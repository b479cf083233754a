// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batching of records into bulk request bodies.
//!
//! Each record becomes one NDJSON action/document pair:
//!
//! ```text
//! {"index":{"_index":"logs"}}
//! {"buildname":"...","line":"...","log-ts":1593433947904}
//! ```
//!
//! A batch is closed once any of these holds:
//! 1. **Count limit**: it holds `max_actions` documents
//! 2. **Size limit**: its serialized size reached `max_size_bytes`
//! 3. **Age limit**: it has been open for the flush interval
//! 4. **Explicit flush**
//!
//! Count and size are checked by [`BatchBuilder::is_full`]; age by the
//! sink service through [`BatchBuilder::deadline`].

use std::mem;
use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;
use tracing::warn;

use crate::error::SinkError;
use crate::logs::LogRecord;

/// A closed batch, ready to be handed to the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    entries: Vec<Vec<u8>>,
    size_bytes: usize,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialized size of the batch, in bytes.
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// The NDJSON bulk request body.
    pub fn body(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(self.size_bytes);
        for entry in &self.entries {
            body.extend_from_slice(entry);
        }
        body
    }

    /// Keeps only the entries at `positions`, in their original order.
    /// Out-of-range positions are ignored.
    pub fn select(&self, positions: &[usize]) -> Batch {
        let mut positions = positions.to_vec();
        positions.sort_unstable();
        positions.dedup();

        let mut selected = Batch::default();
        for entry in positions.iter().filter_map(|&p| self.entries.get(p)) {
            selected.push(entry.clone());
        }
        selected
    }

    fn push(&mut self, entry: Vec<u8>) {
        self.size_bytes += entry.len();
        self.entries.push(entry);
    }
}

/// Accumulates records into the currently open batch.
#[derive(Debug)]
pub struct BatchBuilder {
    action_line: Vec<u8>,
    max_actions: usize,
    max_size_bytes: usize,
    open: Batch,
    opened_at: Option<Instant>,
}

impl BatchBuilder {
    /// Creates a builder writing to `index`.
    #[must_use]
    pub fn new(index: &str, max_actions: usize, max_size_bytes: usize) -> Self {
        let mut action_line = json!({ "index": { "_index": index } }).to_string().into_bytes();
        action_line.push(b'\n');
        BatchBuilder {
            action_line,
            max_actions,
            max_size_bytes,
            open: Batch::default(),
            opened_at: None,
        }
    }

    /// Appends `record` to the open batch, opening one if needed.
    pub fn push(&mut self, record: &LogRecord) -> Result<(), SinkError> {
        let document = record
            .to_document()
            .map_err(|e| SinkError::Serialization(e.to_string()))?;

        let mut entry = Vec::with_capacity(self.action_line.len() + document.len() + 1);
        entry.extend_from_slice(&self.action_line);
        entry.extend_from_slice(&document);
        entry.push(b'\n');

        if entry.len() > self.max_size_bytes {
            warn!(
                "SINK | Document of {} bytes exceeds the {} byte batch limit, sending it alone",
                entry.len(),
                self.max_size_bytes
            );
        }

        if self.open.is_empty() {
            self.opened_at = Some(Instant::now());
        }
        self.open.push(entry);
        Ok(())
    }

    /// True once the open batch reached the count or size limit.
    pub fn is_full(&self) -> bool {
        self.open.len() >= self.max_actions || self.open.size_bytes() >= self.max_size_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    /// Instant at which the open batch must be closed because of its age.
    pub fn deadline(&self, flush_interval: Duration) -> Option<Instant> {
        self.opened_at.map(|opened| opened + flush_interval)
    }

    /// Closes the open batch. Returns `None` if it holds no records.
    pub fn take(&mut self) -> Option<Batch> {
        self.opened_at = None;
        if self.open.is_empty() {
            return None;
        }
        Some(mem::take(&mut self.open))
    }
}
