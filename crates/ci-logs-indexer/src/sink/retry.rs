// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{SinkError, TransportError};
use crate::sink::batch::Batch;
use crate::sink::transport::{BulkOutcome, BulkTransport};

/// How a failed bulk request is retried. The first field is the number of
/// retries after the initial attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStrategy {
    Immediate(u32),
    /// Retries, delay between attempts in milliseconds.
    ConstantBackoff(u32, u64),
}

impl RetryStrategy {
    pub fn max_retries(&self) -> u32 {
        match self {
            RetryStrategy::Immediate(retries) | RetryStrategy::ConstantBackoff(retries, _) => {
                *retries
            }
        }
    }

    pub fn delay(&self) -> Duration {
        match self {
            RetryStrategy::Immediate(_) => Duration::ZERO,
            RetryStrategy::ConstantBackoff(_, millis) => Duration::from_millis(*millis),
        }
    }
}

/// What a successful delivery cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub documents: usize,
    pub retries: u32,
}

/// Sends `batch`, retrying transient failures and throttled documents
/// according to `strategy`.
///
/// Permanent failures are returned immediately as [`SinkError::Rejected`].
/// When the retries are used up, the documents still pending are reported
/// in [`SinkError::RetriesExhausted`].
pub async fn deliver<T: BulkTransport + ?Sized>(
    transport: &T,
    batch: Batch,
    strategy: RetryStrategy,
) -> Result<Delivery, SinkError> {
    let documents = batch.len();
    let mut pending = batch;
    let mut retries = 0;

    loop {
        let reason = match transport.send(&pending).await {
            Ok(BulkOutcome::Accepted) => {
                debug!(
                    "SINK | Delivered {} documents after {} retries",
                    documents, retries
                );
                return Ok(Delivery { documents, retries });
            }
            Ok(BulkOutcome::PartiallyRejected { retryable }) => {
                let throttled = pending.select(&retryable);
                let reason = format!("{} documents throttled", throttled.len());
                pending = throttled;
                reason
            }
            Err(TransportError::Transient(reason)) => reason,
            Err(TransportError::Permanent(reason)) => {
                return Err(SinkError::Rejected {
                    documents: pending.len(),
                    reason,
                });
            }
        };

        if retries >= strategy.max_retries() {
            return Err(SinkError::RetriesExhausted {
                attempts: retries + 1,
                documents: pending.len(),
                reason,
            });
        }
        retries += 1;
        warn!(
            "SINK | Bulk request of {} documents failed: {}, retry {}/{}",
            pending.len(),
            reason,
            retries,
            strategy.max_retries()
        );
        let delay = strategy.delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}
