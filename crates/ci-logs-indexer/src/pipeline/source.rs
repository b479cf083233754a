// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Discovery of extracted CI log files under a data directory.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Identity of one log file, as used for baseline derivation and as the
/// `buildname` of its records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Path of the file relative to the data directory, `/`-separated.
    pub archive_name: String,
    pub build_name: String,
}

impl ArchiveEntry {
    /// Creates an entry whose build name is `archive_name` with path
    /// separators replaced by `-`.
    pub fn from_archive_name(archive_name: impl Into<String>) -> Self {
        let archive_name = archive_name.into();
        let build_name = archive_name.replace('/', "-");
        ArchiveEntry {
            archive_name,
            build_name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Plain,
    Gzip,
}

/// A log file found by [`DirectorySource`].
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub entry: ArchiveEntry,
    pub path: PathBuf,
    encoding: Encoding,
}

impl SourceFile {
    /// Opens the file, decompressing it if needed.
    pub fn open(&self) -> io::Result<Box<dyn BufRead + Send>> {
        let file = File::open(&self.path)?;
        Ok(match self.encoding {
            Encoding::Plain => Box::new(BufReader::new(file)),
            Encoding::Gzip => Box::new(BufReader::new(GzDecoder::new(file))),
        })
    }
}

/// Walks a data directory for `*.log` and `*.log.gz` files that have a
/// path component containing `logs`.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirectorySource { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lists the matching files in path order. Unreadable directory
    /// entries are logged and skipped.
    pub fn files(&self) -> Vec<SourceFile> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(true).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("PIPELINE | Skipping unreadable path: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(encoding) = encoding_of(entry.path()) else {
                continue;
            };
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let archive_name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if !archive_name.split('/').any(|part| part.contains("logs")) {
                debug!("PIPELINE | Ignoring {}: not a logs file", archive_name);
                continue;
            }
            files.push(SourceFile {
                entry: ArchiveEntry::from_archive_name(archive_name),
                path: entry.path().to_path_buf(),
                encoding,
            });
        }
        files
    }
}

fn encoding_of(path: &Path) -> Option<Encoding> {
    let name = path.file_name()?.to_str()?;
    if name.ends_with(".log.gz") {
        Some(Encoding::Gzip)
    } else if name.ends_with(".log") {
        Some(Encoding::Plain)
    } else {
        None
    }
}
