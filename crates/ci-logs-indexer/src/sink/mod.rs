// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bulk indexing sink.
//!
//! - **[`batch`]**: NDJSON batches closed on count, size or age
//! - **[`transport`]**: the backend seam and the `_bulk` implementation
//! - **[`retry`]**: bounded retries of transient failures
//! - **[`service`]**: the actor owning batches and in-flight deliveries

pub mod batch;
pub mod retry;
pub mod service;
pub mod transport;

pub use batch::{Batch, BatchBuilder};
pub use retry::RetryStrategy;
pub use service::{ShutdownStatus, SinkConfig, SinkHandle, SinkReport, SinkService};
pub use transport::{BulkOutcome, BulkTransport, ElasticsearchTransport};
