// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Turning raw CI log text into timestamped records.
//!
//! # Architecture
//!
//! ```text
//!   decompressed log stream
//!            │
//!            v
//!     ┌─────────────┐
//!     │  Segmenter  │  (one record per top-level line + continuations)
//!     └──────┬──────┘
//!            │ record text
//!            v
//!     ┌─────────────┐
//!     │  Resolver   │  (baseline day + HH:mm:ss,SSS, else carry forward)
//!     └──────┬──────┘
//!            │ LogRecord
//!            v
//!          sink
//! ```
//!
//! # Components
//!
//! - **[`segmenter`]**: lazy, forward-only record iterator over a `BufRead`
//! - **[`timestamp`]**: per-file baseline derivation and per-record resolution
//! - **[`pattern`]**: the boundary, clock-string and archive-name patterns
//! - **[`record`]**: the record type and its index document form
//! - **[`constants`]**: batching, retry and time-zone defaults

pub mod constants;
pub mod pattern;
pub mod record;
pub mod segmenter;
pub mod timestamp;

pub use record::LogRecord;
pub use segmenter::{segment, Segmenter};
pub use timestamp::{ResolverConfig, TimeBaseline, TimestampResolver};
