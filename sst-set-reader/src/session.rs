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

use anyhow::Result;
use bytes::Bytes;

use crate::error::SstReaderError;
use crate::iterators::StorageIterator;
use crate::iterators::bounded_iterator::{BoundedIterator, key_within_end_bound};
use crate::iterators::merge_iterator::MergeIterator;
use crate::key::KeySlice;
use crate::reader::ReadMode;
use crate::source::SstSource;

/// The merged, bounded per-file sources behind a stream over a file set.
pub type SessionIterator = MergeIterator<BoundedIterator<SstSource>>;

/// A lazily produced, ascending sequence of distinct keys read from a set of table files.
///
/// The stream owns every file handle and dump opened for it. They are released together by
/// [`KeyStream::close`], or when the stream is dropped.
pub struct KeyStream<I: StorageIterator = SessionIterator> {
    inner: Option<FusedIterator<I>>,
    mode: ReadMode,
    end_bound: Bound<Bytes>,
    started: bool,
    exhausted: bool,
    failed: bool,
}

impl<I: StorageIterator> KeyStream<I> {
    pub(crate) fn new(
        iter: I,
        mode: ReadMode,
        end_bound: Bound<Bytes>,
    ) -> Self {
        Self {
            inner: Some(FusedIterator::new(iter)),
            mode,
            end_bound,
            started: false,
            exhausted: false,
            failed: false,
        }
    }

    /// A stream over no files: empty and already closed.
    pub(crate) fn empty(mode: ReadMode) -> Self {
        Self {
            inner: None,
            mode,
            end_bound: Bound::Unbounded,
            started: true,
            exhausted: true,
            failed: false,
        }
    }

    pub fn mode(&self) -> ReadMode {
        self.mode
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    /// Pull the next key together with whether its winning entry is a delete marker.
    pub fn next_entry(&mut self) -> Option<Result<(Bytes, bool), SstReaderError>> {
        if self.exhausted || self.failed {
            return None;
        }
        let inner = self.inner.as_mut()?;
        if self.started {
            if let Err(e) = inner.next() {
                self.failed = true;
                return Some(Err(SstReaderError::from_read(e)));
            }
        }
        self.started = true;
        // Sources stop at the end bound themselves; this guards against one that is not sorted.
        if !inner.is_valid() || !key_within_end_bound(inner.key().raw_ref(), &self.end_bound) {
            self.exhausted = true;
            return None;
        }
        Some(Ok((
            Bytes::copy_from_slice(inner.key().raw_ref()),
            inner.is_tombstone(),
        )))
    }

    /// Release every resource held by the stream. Closing again is a no-op.
    ///
    /// A release failure after the stream was fully consumed is only logged; before that it is
    /// reported, since the keys read so far may be incomplete.
    pub fn close(&mut self) -> Result<(), SstReaderError> {
        let Some(mut inner) = self.inner.take() else {
            return Ok(());
        };
        let result = inner.close();
        drop(inner);
        tracing::debug!(mode = ?self.mode, exhausted = self.exhausted, "closed key stream");
        match result {
            Ok(()) => Ok(()),
            Err(e) if self.exhausted => {
                tracing::warn!(error = %format!("{e:#}"), "failed to release fully consumed key stream");
                Ok(())
            }
            Err(e) => Err(SstReaderError::release(e)),
        }
    }
}

impl<I: StorageIterator> Iterator for KeyStream<I> {
    type Item = Result<Bytes, SstReaderError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().map(|entry| entry.map(|(key, _)| key))
    }
}

impl<I: StorageIterator> std::iter::FusedIterator for KeyStream<I> {}

impl<I: StorageIterator> Drop for KeyStream<I> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "failed to close key stream");
        }
    }
}

/// A wrapper around existing iterator, will prevent users from calling `next` when the iterator is
/// invalid. If an iterator is already invalid, `next` does not do anything. If `next` returns an error,
/// `is_valid` should return false, and `next` should always return an error.
pub struct FusedIterator<I: StorageIterator> {
    iter: I,
    has_errored: bool,
}

impl<I: StorageIterator> FusedIterator<I> {
    pub fn new(iter: I) -> Self {
        Self {
            iter,
            has_errored: false,
        }
    }
}

impl<I: StorageIterator> StorageIterator for FusedIterator<I> {
    fn key(&self) -> KeySlice<'_> {
        self.iter.key()
    }

    fn value(&self) -> &[u8] {
        self.iter.value()
    }

    fn seq(&self) -> u64 {
        self.iter.seq()
    }

    fn is_tombstone(&self) -> bool {
        self.iter.is_tombstone()
    }

    fn is_valid(&self) -> bool {
        !self.has_errored && self.iter.is_valid()
    }

    fn next(&mut self) -> Result<()> {
        if self.has_errored {
            return Err(anyhow::anyhow!("Iterator has already errored"));
        }
        if !self.iter.is_valid() {
            return Ok(());
        }
        self.iter.next().inspect_err(|_| self.has_errored = true)
    }

    fn seek_to_key(&mut self, key: KeySlice) -> Result<()> {
        if self.has_errored {
            return Err(anyhow::anyhow!("Iterator has already errored"));
        }
        self.iter.seek_to_key(key).inspect_err(|_| self.has_errored = true)
    }

    fn close(&mut self) -> Result<()> {
        self.iter.close()
    }

    fn num_active_iterators(&self) -> usize {
        self.iter.num_active_iterators()
    }
}
