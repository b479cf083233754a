// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Actor-based bulk indexing sink.
//!
//! ```text
//!    ┌──────────────┐
//!    │  SinkHandle  │ (Clone, one per producer)
//!    └──────┬───────┘
//!           │ bounded command channel
//!           v
//!    ┌──────────────┐
//!    │ SinkService  │ owns the open batch
//!    └──────┬───────┘
//!           │ at most `concurrent_requests` deliveries
//!           v
//!    ┌──────────────┐
//!    │ BulkTransport│
//!    └──────────────┘
//! ```
//!
//! Producers block in two places: when the command channel is full, and,
//! transitively, while the service waits for a delivery slot before
//! dispatching a closed batch. Nothing is ever dropped to relieve pressure.
//!
//! A delivery that fails permanently or runs out of retries is fatal: the
//! error is published on a watch channel, every in-flight delivery is
//! aborted, and every later handle call returns that error.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use crate::error::SinkError;
use crate::logs::{constants, LogRecord};
use crate::sink::batch::BatchBuilder;
use crate::sink::retry::{deliver, Delivery, RetryStrategy};
use crate::sink::transport::BulkTransport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkConfig {
    pub index: String,
    pub max_actions: usize,
    pub max_size_bytes: usize,
    pub flush_interval: Duration,
    pub concurrent_requests: usize,
    pub queue_capacity: usize,
    pub retry_strategy: RetryStrategy,
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig {
            index: constants::DEFAULT_INDEX_NAME.to_string(),
            max_actions: constants::DEFAULT_BULK_ACTIONS,
            max_size_bytes: constants::DEFAULT_BULK_SIZE_BYTES,
            flush_interval: constants::DEFAULT_FLUSH_INTERVAL,
            concurrent_requests: constants::DEFAULT_CONCURRENT_REQUESTS,
            queue_capacity: constants::DEFAULT_QUEUE_CAPACITY,
            retry_strategy: RetryStrategy::ConstantBackoff(
                constants::DEFAULT_MAX_RETRIES,
                u64::try_from(constants::DEFAULT_RETRY_BACKOFF.as_millis()).unwrap_or(1000),
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownStatus {
    /// Every accepted record was delivered.
    Drained,
    /// The close timeout elapsed with deliveries still pending.
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkReport {
    pub documents_indexed: u64,
    pub batches_sent: u64,
    pub retries: u64,
    pub status: ShutdownStatus,
}

#[derive(Debug, Default)]
struct Counters {
    documents_indexed: AtomicU64,
    batches_sent: AtomicU64,
    retries: AtomicU64,
}

impl Counters {
    fn record(&self, delivery: Delivery) {
        self.documents_indexed
            .fetch_add(delivery.documents as u64, Ordering::Relaxed);
        self.batches_sent.fetch_add(1, Ordering::Relaxed);
        self.retries
            .fetch_add(u64::from(delivery.retries), Ordering::Relaxed);
    }

    fn report(&self, status: ShutdownStatus) -> SinkReport {
        SinkReport {
            documents_indexed: self.documents_indexed.load(Ordering::Relaxed),
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            status,
        }
    }
}

#[derive(Debug)]
pub enum SinkCommand {
    Submit(LogRecord),
    /// Dispatch the open batch and wait for every delivery to finish.
    Flush(oneshot::Sender<()>),
    /// Like `Flush`, then stop the service.
    Close(oneshot::Sender<SinkReport>),
}

/// Handle for submitting records to the sink service.
#[derive(Clone, Debug)]
pub struct SinkHandle {
    tx: mpsc::Sender<SinkCommand>,
    fatal: watch::Receiver<Option<SinkError>>,
    counters: Arc<Counters>,
}

impl SinkHandle {
    /// Queues `record`, waiting while the sink is saturated.
    pub async fn submit(&self, record: LogRecord) -> Result<(), SinkError> {
        self.check()?;
        self.tx
            .send(SinkCommand::Submit(record))
            .await
            .map_err(|_| self.failure())
    }

    /// Blocking variant of [`SinkHandle::submit`] for synchronous producers.
    ///
    /// Must not be called from within an async execution context.
    pub fn blocking_submit(&self, record: LogRecord) -> Result<(), SinkError> {
        self.check()?;
        self.tx
            .blocking_send(SinkCommand::Submit(record))
            .map_err(|_| self.failure())
    }

    /// Waits until every record submitted so far has been delivered.
    pub async fn flush(&self) -> Result<(), SinkError> {
        self.check()?;
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(SinkCommand::Flush(response_tx))
            .await
            .map_err(|_| self.failure())?;
        response_rx.await.map_err(|_| self.failure())
    }

    /// Flushes and stops the sink, giving up after `timeout`.
    ///
    /// Returns the fatal error if one was raised before or during the close.
    pub async fn close(&self, timeout: Duration) -> Result<SinkReport, SinkError> {
        self.check()?;
        let (response_tx, response_rx) = oneshot::channel();
        let close = async {
            self.tx
                .send(SinkCommand::Close(response_tx))
                .await
                .map_err(|_| self.failure())?;
            response_rx.await.map_err(|_| self.failure())
        };
        match tokio::time::timeout(timeout, close).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "SINK | Close timed out after {} s with deliveries pending",
                    timeout.as_secs()
                );
                Ok(self.counters.report(ShutdownStatus::TimedOut))
            }
        }
    }

    /// The fatal error, if the sink has failed.
    pub fn fatal_error(&self) -> Option<SinkError> {
        self.fatal.borrow().clone()
    }

    fn check(&self) -> Result<(), SinkError> {
        match self.fatal_error() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn failure(&self) -> SinkError {
        self.fatal_error().unwrap_or(SinkError::Closed)
    }
}

enum Event {
    Command(Option<SinkCommand>),
    Deadline,
    Delivered(Result<Result<Delivery, SinkError>, JoinError>),
}

/// Sink service that owns the open batch and the in-flight deliveries.
pub struct SinkService<T: BulkTransport> {
    transport: Arc<T>,
    builder: BatchBuilder,
    flush_interval: Duration,
    concurrent_requests: usize,
    retry_strategy: RetryStrategy,
    rx: mpsc::Receiver<SinkCommand>,
    in_flight: JoinSet<Result<Delivery, SinkError>>,
    fatal: watch::Sender<Option<SinkError>>,
    counters: Arc<Counters>,
}

impl<T: BulkTransport> SinkService<T> {
    /// Creates the service and its handle. The service does nothing until
    /// [`SinkService::run`] is polled.
    #[must_use]
    pub fn new(config: SinkConfig, transport: T) -> (Self, SinkHandle) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let (fatal_tx, fatal_rx) = watch::channel(None);
        let counters = Arc::new(Counters::default());

        let service = SinkService {
            transport: Arc::new(transport),
            builder: BatchBuilder::new(&config.index, config.max_actions, config.max_size_bytes),
            flush_interval: config.flush_interval,
            concurrent_requests: config.concurrent_requests.max(1),
            retry_strategy: config.retry_strategy,
            rx,
            in_flight: JoinSet::new(),
            fatal: fatal_tx,
            counters: Arc::clone(&counters),
        };
        let handle = SinkHandle {
            tx,
            fatal: fatal_rx,
            counters,
        };
        (service, handle)
    }

    /// Creates the service and runs it on the current tokio runtime.
    #[must_use]
    pub fn spawn(config: SinkConfig, transport: T) -> (SinkHandle, JoinHandle<()>) {
        let (service, handle) = Self::new(config, transport);
        let task = tokio::spawn(service.run());
        (handle, task)
    }

    /// Processes commands until the sink is closed, every handle is
    /// dropped, or a delivery fails fatally.
    pub async fn run(mut self) {
        debug!("SINK | Sink service started");

        loop {
            let deadline = self.builder.deadline(self.flush_interval);
            let event = tokio::select! {
                command = self.rx.recv() => Event::Command(command),
                () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    Event::Deadline
                }
                Some(joined) = self.in_flight.join_next() => Event::Delivered(joined),
            };

            let outcome = match event {
                Event::Command(Some(SinkCommand::Submit(record))) => self.accept(&record).await,
                Event::Command(Some(SinkCommand::Flush(response_tx))) => {
                    self.drain().await.map(|()| {
                        if response_tx.send(()).is_err() {
                            debug!("SINK | Flush requester went away");
                        }
                    })
                }
                Event::Command(Some(SinkCommand::Close(response_tx))) => {
                    if self.drain().await.is_ok() {
                        let report = self.counters.report(ShutdownStatus::Drained);
                        info!(
                            "SINK | Closed: {} documents indexed in {} batches, {} retries",
                            report.documents_indexed, report.batches_sent, report.retries
                        );
                        if response_tx.send(report).is_err() {
                            debug!("SINK | Close requester went away");
                        }
                    }
                    break;
                }
                Event::Command(None) => {
                    debug!("SINK | All handles dropped, draining");
                    let _ = self.drain().await;
                    break;
                }
                Event::Deadline => self.dispatch().await,
                Event::Delivered(joined) => self.settle(joined),
            };

            if outcome.is_err() {
                break;
            }
        }

        self.in_flight.abort_all();
        debug!("SINK | Sink service stopped");
    }

    async fn accept(&mut self, record: &LogRecord) -> Result<(), SinkError> {
        if let Err(e) = self.builder.push(record) {
            return Err(self.fail(e));
        }
        if self.builder.is_full() {
            self.dispatch().await?;
        }
        Ok(())
    }

    /// Closes the open batch and hands it to a delivery task, first waiting
    /// for a free slot.
    async fn dispatch(&mut self) -> Result<(), SinkError> {
        let Some(batch) = self.builder.take() else {
            return Ok(());
        };
        while self.in_flight.len() >= self.concurrent_requests {
            match self.in_flight.join_next().await {
                Some(joined) => self.settle(joined)?,
                None => break,
            }
        }

        debug!(
            "SINK | Dispatching batch of {} documents ({} bytes)",
            batch.len(),
            batch.size_bytes()
        );
        let transport = Arc::clone(&self.transport);
        let strategy = self.retry_strategy;
        self.in_flight
            .spawn(async move { deliver(transport.as_ref(), batch, strategy).await });
        Ok(())
    }

    async fn drain(&mut self) -> Result<(), SinkError> {
        self.dispatch().await?;
        while let Some(joined) = self.in_flight.join_next().await {
            self.settle(joined)?;
        }
        Ok(())
    }

    fn settle(
        &mut self,
        joined: Result<Result<Delivery, SinkError>, JoinError>,
    ) -> Result<(), SinkError> {
        match joined {
            Ok(Ok(delivery)) => {
                self.counters.record(delivery);
                Ok(())
            }
            Ok(Err(e)) => Err(self.fail(e)),
            Err(e) => Err(self.fail(SinkError::Task(e.to_string()))),
        }
    }

    fn fail(&self, e: SinkError) -> SinkError {
        error!("SINK | Fatal indexing failure: {}", e);
        self.fatal.send_replace(Some(e.clone()));
        e
    }
}
