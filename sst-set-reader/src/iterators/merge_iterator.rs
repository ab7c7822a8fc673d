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


use std::cmp::{self};
use std::collections::BinaryHeap;

use anyhow::Result;

use crate::key::KeySlice;

use super::StorageIterator;

/// How the merge picks one entry when the same key occurs in more than one source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// The entry with the largest sequence number wins. Equal sequence numbers fall back to the
    /// source listed last.
    #[default]
    NewestSequence,
    /// The source listed last wins, regardless of sequence numbers.
    LastListedFile,
}

struct HeapWrapper<I: StorageIterator>(pub usize, pub Box<I>, DuplicatePolicy);

impl<I: StorageIterator> HeapWrapper<I> {
    /// Ordering among entries sharing a key; the greater one wins.
    fn precedence(&self, other: &Self) -> cmp::Ordering {
        match self.2 {
            DuplicatePolicy::NewestSequence => self
                .1
                .seq()
                .cmp(&other.1.seq())
                .then(self.0.cmp(&other.0)),
            DuplicatePolicy::LastListedFile => self.0.cmp(&other.0),
        }
    }
}

impl<I: StorageIterator> PartialEq for HeapWrapper<I> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == cmp::Ordering::Equal
    }
}

impl<I: StorageIterator> Eq for HeapWrapper<I> {}

impl<I: StorageIterator> PartialOrd for HeapWrapper<I> {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<I: StorageIterator> Ord for HeapWrapper<I> {
    /// `BinaryHeap` is a max-heap: the smallest key, then the winning duplicate, sits on top.
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        other
            .1
            .key()
            .cmp(&self.1.key())
            .then_with(|| self.precedence(other))
    }
}

/// Merge multiple iterators of the same type into one sorted sequence in which every key occurs
/// once. Duplicates are resolved by the [`DuplicatePolicy`]; the losing entries are skipped.
pub struct MergeIterator<I: StorageIterator> {
    iters: BinaryHeap<HeapWrapper<I>>,
    current: Option<HeapWrapper<I>>,
}

impl<I: StorageIterator> MergeIterator<I> {
    /// `iters` are given in listing order. Sources that are already exhausted are released
    /// right away.
    pub fn create(iters: Vec<Box<I>>, policy: DuplicatePolicy) -> Self {
        let mut heap = BinaryHeap::with_capacity(iters.len());
        for (idx, iter) in iters.into_iter().enumerate() {
            if iter.is_valid() {
                heap.push(HeapWrapper(idx, iter, policy));
            } else {
                release_exhausted(idx, iter);
            }
        }
        let current = heap.pop();
        Self {
            iters: heap,
            current,
        }
    }

    /// Index, in listing order, of the source the current entry comes from.
    pub fn current_source(&self) -> Option<usize> {
        self.current.as_ref().map(|current| current.0)
    }
}

/// Close a source that has nothing left to yield. All of its data was consumed, so a failure
/// here does not affect the result.
fn release_exhausted<I: StorageIterator>(idx: usize, mut iter: Box<I>) {
    if let Err(e) = iter.close() {
        tracing::warn!(source = idx, error = %format!("{e:#}"), "failed to release exhausted source");
    }
}

impl<I: StorageIterator> StorageIterator for MergeIterator<I> {
    fn key(&self) -> KeySlice<'_> {
        self.current
            .as_ref()
            .map_or(KeySlice::from_slice(&[]), |current| current.1.key())
    }

    fn value(&self) -> &[u8] {
        self.current
            .as_ref()
            .map_or(&[], |current| current.1.value())
    }

    fn seq(&self) -> u64 {
        self.current.as_ref().map_or(0, |current| current.1.seq())
    }

    fn is_tombstone(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|current| current.1.is_tombstone())
    }

    fn is_valid(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|current| current.1.is_valid())
    }

    fn next(&mut self) -> Result<()> {
        let Some(mut current) = self.current.take() else {
            return Ok(());
        };

        // Own the key because advancing iterators may invalidate borrowed slices.
        let current_key = current.1.key().to_key_vec();
        let current_key_slice = current_key.as_key_slice();

        // Every other source positioned at the same key holds a losing duplicate.
        while let Some(mut dup) = self
            .iters
            .peek_mut()
            .filter(|top| top.1.key() == current_key_slice)
        {
            tracing::trace!(
                key = ?current_key_slice,
                winner = current.0,
                loser = dup.0,
                "skipping duplicate key"
            );
            if let Err(e) = dup.1.next() {
                // Put the current source back so that `close` still reaches it.
                self.current = Some(current);
                return Err(e);
            }
            if !dup.1.is_valid() {
                let dup = std::collections::binary_heap::PeekMut::pop(dup);
                release_exhausted(dup.0, dup.1);
            }
        }

        if let Err(e) = current.1.next() {
            self.current = Some(current);
            return Err(e);
        }
        if current.1.is_valid() {
            self.iters.push(current);
        } else {
            release_exhausted(current.0, current.1);
        }

        self.current = self.iters.pop();
        Ok(())
    }

    /// Skips forward: every source is sought and the heap rebuilt. A source that fails to seek
    /// is closed and the first such error is returned.
    fn seek_to_key(&mut self, key: KeySlice) -> Result<()> {
        let mut sources: Vec<_> = self.iters.drain().collect();
        sources.extend(self.current.take());
        let mut first_error = None;
        for mut source in sources {
            match source.1.seek_to_key(key) {
                Ok(()) if source.1.is_valid() => self.iters.push(source),
                Ok(()) => release_exhausted(source.0, source.1),
                Err(e) => {
                    if let Err(close_err) = source.1.close() {
                        tracing::warn!(source = source.0, error = %format!("{close_err:#}"), "failed to release source");
                    }
                    first_error.get_or_insert(e);
                }
            }
        }
        self.current = self.iters.pop();
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Close every source still held, reporting the first failure.
    fn close(&mut self) -> Result<()> {
        let mut result = Ok(());
        for mut source in self.current.take().into_iter().chain(self.iters.drain()) {
            if let Err(e) = source.1.close() {
                if result.is_ok() {
                    result = Err(e);
                } else {
                    tracing::warn!(source = source.0, error = %format!("{e:#}"), "failed to release source");
                }
            }
        }
        result
    }

    fn num_active_iterators(&self) -> usize {
        self.iters
            .iter()
            .map(|x| x.1.num_active_iterators())
            .sum::<usize>()
            + self
                .current
                .as_ref()
                .map(|x| x.1.num_active_iterators())
                .unwrap_or(0)
    }
}
