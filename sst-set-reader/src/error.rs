// Copyright (c) 2022-2025 Alex Chi Z
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use std::path::PathBuf;

use thiserror::Error;

type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by [`crate::SstFileSetReader`] and the streams it returns.
#[derive(Debug, Error)]
pub enum SstReaderError {
    /// A supplied path does not exist or is not a valid table file.
    #[error("failed to open table file {}", .path.display())]
    FileOpen {
        path: PathBuf,
        #[source]
        source: BoxedError,
    },
    /// Raw tombstone scanning was requested but is not available on this host.
    #[error("raw tombstone scan is not available")]
    CapabilityUnavailable,
    /// The raw scan produced output that does not parse into well-formed entries.
    #[error("malformed scan output for {} at line {line}: {reason}", .path.display())]
    MalformedScanOutput {
        path: PathBuf,
        line: usize,
        reason: String,
    },
    /// Reading an already open table failed.
    #[error("failed to read table files")]
    Read {
        #[source]
        source: BoxedError,
    },
    /// Releasing the resources of a session failed before all of its data was consumed.
    #[error("failed to release read session before it was fully consumed")]
    Release {
        #[source]
        source: BoxedError,
    },
}

impl SstReaderError {
    pub(crate) fn file_open(path: impl Into<PathBuf>, source: anyhow::Error) -> Self {
        Self::FileOpen {
            path: path.into(),
            source: source.into(),
        }
    }

    /// Recover a typed error raised below an `anyhow` layer, or classify it as a read failure.
    pub(crate) fn from_read(err: anyhow::Error) -> Self {
        match err.downcast::<SstReaderError>() {
            Ok(err) => err,
            Err(err) => Self::Read { source: err.into() },
        }
    }

    pub(crate) fn release(err: anyhow::Error) -> Self {
        Self::Release { source: err.into() }
    }
}

pub type Result<T, E = SstReaderError> = std::result::Result<T, E>;
