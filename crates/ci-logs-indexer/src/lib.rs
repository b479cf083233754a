// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # CI Logs Indexer
//!
//! Turns decompressed CI build logs into timestamped records and bulk-indexes
//! them into a document index for later search.
//!
//! ## Architecture
//!
//! - [`logs`]: segmentation of a raw log stream into records and timestamp
//!   resolution against a per-file baseline
//! - [`sink`]: batching, bounded-concurrency dispatch and retrying of bulk
//!   writes to the index backend
//! - [`pipeline`]: drives archive entries one at a time through the
//!   segmenter, resolver and sink
//! - [`config`]: environment-driven configuration
//! - [`logger`]: tracing event formatter used by the binary

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod error;
pub mod http;
pub mod logger;
pub mod logs;
pub mod pipeline;
pub mod sink;
