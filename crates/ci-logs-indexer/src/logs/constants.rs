// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Defaults for the ingestion pipeline.
//!
//! The batching and retry values match the bulk-processor settings the CI
//! index has always been fed with; they can all be overridden through
//! [`crate::config::Config`].

use std::time::Duration;

/// Collection that every log document is written to.
pub const DEFAULT_INDEX_NAME: &str = "logs";

/// Close a batch once it holds this many documents.
pub const DEFAULT_BULK_ACTIONS: usize = 5_000;

/// Close a batch once its serialized size reaches this many bytes (10 MB).
pub const DEFAULT_BULK_SIZE_BYTES: usize = 10 * 1_024 * 1_024;

/// Close a batch once it has been open this long.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(10);

/// Number of batches that may be in flight to the backend at once.
pub const DEFAULT_CONCURRENT_REQUESTS: usize = 4;

/// Records buffered between the producer and the batching task before
/// `submit` starts to block.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Constant delay between retries of a failed batch.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Retries after the first attempt before a batch failure becomes fatal.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Hours subtracted from the epoch timestamp embedded in build names.
///
/// The CI system stamps builds in a zone eight hours off the index's; the
/// correction is not known to hold for other CI systems.
pub const DEFAULT_TZ_CORRECTION_HOURS: i64 = 8;

pub(crate) const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1_000;
