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


use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;

use crate::capability::RawScanCapability;
use crate::dump::DumpRange;
use crate::error::{Result, SstReaderError};
use crate::iterators::StorageIterator;
use crate::iterators::bounded_iterator::BoundedIterator;
use crate::iterators::merge_iterator::{DuplicatePolicy, MergeIterator};
use crate::key::KeySlice;
use crate::raw_scanner::RawSstScanner;
use crate::session::KeyStream;
use crate::source::SstSource;
use crate::table::{SsTable, SsTableIterator};

/// Which entries a read session surfaces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadMode {
    /// Keys whose winning entry is a live write, read through standard iteration.
    LiveKeysOnly,
    /// Every touched key, deletes included, read through the raw scan.
    AllKeysWithTombstones,
}

#[derive(Clone, Debug, Default)]
pub struct SstReaderOptions {
    pub duplicate_policy: DuplicatePolicy,
    /// `None` uses the capability detected once for this process.
    pub raw_scan: Option<RawScanCapability>,
}

impl SstReaderOptions {
    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    pub fn with_raw_scan(mut self, capability: RawScanCapability) -> Self {
        self.raw_scan = Some(capability);
        self
    }

    fn raw_scan_capability(&self) -> RawScanCapability {
        self.raw_scan
            .clone()
            .unwrap_or_else(|| RawScanCapability::detect().clone())
    }
}

/// Reads the keys of a set of table files as one sorted sequence.
///
/// Construction does no I/O; files are opened, and validated, when a stream is requested. The
/// order in which files are listed only matters for resolving duplicate keys, see
/// [`DuplicatePolicy`].
pub struct SstFileSetReader {
    files: Vec<PathBuf>,
    options: SstReaderOptions,
}

impl SstFileSetReader {
    pub fn new<I, P>(files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self::with_options(files, SstReaderOptions::default())
    }

    pub fn with_options<I, P>(files: I, options: SstReaderOptions) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            files: files.into_iter().map(Into::into).collect(),
            options,
        }
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn options(&self) -> &SstReaderOptions {
        &self.options
    }

    /// Sum of the entry counts recorded in each file's footer, delete markers included. Keys
    /// present in more than one file are counted once per file.
    pub fn estimated_total_keys(&self) -> Result<u64> {
        self.files.iter().try_fold(0u64, |total, path| {
            let table = SsTable::open(path).map_err(|e| SstReaderError::file_open(path, e))?;
            Ok(total + table.properties().num_entries)
        })
    }

    /// Live keys in `[lower, upper)`, ascending, each once. A missing bound leaves that side open.
    pub fn key_stream(&self, lower: Option<&[u8]>, upper: Option<&[u8]>) -> Result<KeyStream> {
        self.open_stream(ReadMode::LiveKeysOnly, lower, upper)
    }

    /// Every key in `[lower, upper)` whose winning entry is either a write or a delete.
    ///
    /// Fails with [`SstReaderError::CapabilityUnavailable`] before touching any file if raw
    /// scanning is not available.
    pub fn key_stream_with_tombstone(
        &self,
        lower: Option<&[u8]>,
        upper: Option<&[u8]>,
    ) -> Result<KeyStream> {
        self.open_stream(ReadMode::AllKeysWithTombstones, lower, upper)
    }

    fn open_stream(
        &self,
        mode: ReadMode,
        lower: Option<&[u8]>,
        upper: Option<&[u8]>,
    ) -> Result<KeyStream> {
        if self.files.is_empty() {
            return Ok(KeyStream::empty(mode));
        }
        let capability = match mode {
            ReadMode::LiveKeysOnly => None,
            ReadMode::AllKeysWithTombstones => {
                let capability = self.options.raw_scan_capability();
                if !capability.is_available() {
                    return Err(SstReaderError::CapabilityUnavailable);
                }
                Some(capability)
            }
        };

        let start_bound = lower.map_or(Bound::Unbounded, |key| {
            Bound::Included(Bytes::copy_from_slice(key))
        });
        let end_bound = upper.map_or(Bound::Unbounded, |key| {
            Bound::Excluded(Bytes::copy_from_slice(key))
        });
        tracing::debug!(
            files = self.files.len(),
            ?mode,
            lower = ?lower,
            upper = ?upper,
            "opening key stream"
        );

        let dump_range = DumpRange::new(lower, upper);
        let mut sources = Vec::with_capacity(self.files.len());
        for path in &self.files {
            let source = self
                .open_source(path, capability.as_ref(), &start_bound, &dump_range)
                .and_then(|source| {
                    BoundedIterator::create(source, start_bound.clone(), end_bound.clone()).map_err(
                        |e| {
                            SstReaderError::from_read(
                                e.context(format!("failed to position {}", path.display())),
                            )
                        },
                    )
                });
            match source {
                Ok(source) => sources.push(Box::new(source)),
                Err(e) => {
                    release_opened(sources);
                    return Err(e);
                }
            }
        }

        let merge = MergeIterator::create(sources, self.options.duplicate_policy);
        tracing::trace!(active = merge.num_active_iterators(), "merged sources");
        Ok(KeyStream::new(merge, mode, end_bound))
    }

    fn open_source(
        &self,
        path: &Path,
        capability: Option<&RawScanCapability>,
        start_bound: &Bound<Bytes>,
        dump_range: &DumpRange,
    ) -> Result<SstSource> {
        // The raw scan is restricted to the range when the dump starts.
        if let Some(capability) = capability {
            return RawSstScanner::open(path, capability, dump_range).map(SstSource::Raw);
        }
        let table = Arc::new(SsTable::open(path).map_err(|e| SstReaderError::file_open(path, e))?);
        let iter = match start_bound {
            Bound::Included(key) | Bound::Excluded(key) => {
                SsTableIterator::create_and_seek_to_key(table, KeySlice::from_slice(key))
            }
            Bound::Unbounded => SsTableIterator::create_and_seek_to_first(table),
        };
        iter.map(SstSource::Normal)
            .map_err(|e| SstReaderError::file_open(path, e))
    }
}

/// Close the sources of a session that failed to open.
fn release_opened(sources: Vec<Box<BoundedIterator<SstSource>>>) {
    for mut source in sources {
        if let Err(e) = source.close() {
            tracing::warn!(error = %format!("{e:#}"), "failed to release source of aborted session");
        }
    }
}
