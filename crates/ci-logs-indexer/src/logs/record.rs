// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::Serialize;

/// One logical log entry, possibly spanning several physical lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogRecord {
    #[serde(rename = "buildname")]
    pub build_name: String,
    #[serde(rename = "line")]
    pub text: String,
    #[serde(rename = "log-ts")]
    pub timestamp_millis: i64,
}

impl LogRecord {
    pub fn new(build_name: impl Into<String>, text: impl Into<String>, timestamp_millis: i64) -> Self {
        Self {
            build_name: build_name.into(),
            text: text.into(),
            timestamp_millis,
        }
    }

    /// Serializes the record as the JSON document stored in the index.
    pub fn to_document(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
