// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Splits one decompressed log file into logical records.
//!
//! A record is one top-level log line plus every continuation line that
//! follows it. Top-level lines start with a digit (the hour of the clock
//! string); anything else, such as a stack frame or a wrapped message, is
//! folded into the preceding record.
//!
//! ```text
//!   12:52:27,908 [main] WARN  ... will retry   ┐
//!   org.apache.flink...BackendBuildingException│ record 2
//!   \tat org.apache.flink...build(...)         ┘
//!   12:52:27,922 [main] INFO  ...              ─ record 3
//! ```
//!
//! The newline consumed at each boundary belongs to neither record, so
//! joining the emitted records with `\n` reproduces the input exactly.

use std::io::{self, BufRead};
use std::mem;

use tracing::warn;

use crate::logs::pattern::starts_record;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Appending bytes to the current record.
    Accumulating,
    /// A newline was read; the next byte decides whether it ends the record.
    BoundaryCheck,
    Done,
}

/// Pull-based iterator over the records of a single log stream.
///
/// The iterator is forward-only and single-pass. Segmenting the same file
/// again requires a fresh reader.
///
/// A stream that opens with `\n` followed by a digit yields an empty first
/// record, which is indexed as a document with an empty `line`. Blank lines
/// anywhere else fold into the preceding record.
pub struct Segmenter<R> {
    reader: R,
    buffer: Vec<u8>,
    state: State,
}

impl<R: BufRead> Segmenter<R> {
    pub fn new(reader: R) -> Self {
        Segmenter {
            reader,
            buffer: Vec::new(),
            state: State::Accumulating,
        }
    }

    fn finish(&mut self) -> Option<String> {
        if self.state == State::BoundaryCheck {
            self.buffer.push(b'\n');
        }
        self.state = State::Done;
        if self.buffer.is_empty() {
            return None;
        }
        Some(decode(mem::take(&mut self.buffer)))
    }
}

impl<R: BufRead> Iterator for Segmenter<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.state == State::Done {
                return None;
            }

            let available = match self.reader.fill_buf() {
                Ok(available) => available,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.state = State::Done;
                    return Some(Err(e));
                }
            };

            if available.is_empty() {
                return self.finish().map(Ok);
            }

            let mut consumed = 0;
            let mut completed = None;
            for &byte in available {
                consumed += 1;
                match self.state {
                    State::Accumulating => {
                        if byte == b'\n' {
                            self.state = State::BoundaryCheck;
                        } else {
                            self.buffer.push(byte);
                        }
                    }
                    State::BoundaryCheck => {
                        if starts_record(byte) {
                            completed = Some(mem::take(&mut self.buffer));
                            self.buffer.push(byte);
                            self.state = State::Accumulating;
                            break;
                        }
                        self.buffer.push(b'\n');
                        if byte != b'\n' {
                            self.buffer.push(byte);
                            self.state = State::Accumulating;
                        }
                    }
                    State::Done => break,
                }
            }
            self.reader.consume(consumed);

            if let Some(record) = completed {
                return Some(Ok(decode(record)));
            }
        }
    }
}

/// Segments `reader` into records. Equivalent to [`Segmenter::new`].
pub fn segment<R: BufRead>(reader: R) -> Segmenter<R> {
    Segmenter::new(reader)
}

fn decode(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            warn!("SEGMENTER | Record is not valid UTF-8, replacing invalid sequences");
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    }
}
