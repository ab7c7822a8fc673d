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

use super::StorageIterator;
use crate::key::KeySlice;

/// Restricts a sorted source to a key range. The lower bound is applied once, by seeking the
/// source if it is positioned before it. Once the source reaches the upper bound the iterator
/// is exhausted and the source is never advanced again.
pub struct BoundedIterator<I: StorageIterator> {
    inner: I,
    end_bound: Bound<Bytes>,
    reach_bound: bool,
}

impl<I: StorageIterator> BoundedIterator<I> {
    pub fn create(mut inner: I, start_bound: Bound<Bytes>, end_bound: Bound<Bytes>) -> Result<Self> {
        if let Bound::Included(start) | Bound::Excluded(start) = &start_bound {
            // Only seek when the source has not reached the bound yet.
            if inner.is_valid() && inner.key().raw_ref() < start.as_ref() {
                inner.seek_to_key(KeySlice::from_slice(start))?;
            }
        }
        if let Bound::Excluded(start) = &start_bound {
            if inner.is_valid() && inner.key().raw_ref() == start.as_ref() {
                inner.next()?;
            }
        }
        let mut iter = Self {
            inner,
            end_bound,
            reach_bound: false,
        };
        iter.check_end_bound();
        Ok(iter)
    }

    /// Mark iterator as invalid if current key is out of `end_bound`.
    fn check_end_bound(&mut self) {
        if self.reach_bound || !self.inner.is_valid() {
            return;
        }
        self.reach_bound = !key_within_end_bound(self.inner.key().raw_ref(), &self.end_bound);
    }

    pub fn inner(&self) -> &I {
        &self.inner
    }
}

/// Whether `key` lies on the near side of `end_bound`.
pub(crate) fn key_within_end_bound(key: &[u8], end_bound: &Bound<Bytes>) -> bool {
    match end_bound {
        Bound::Unbounded => true,
        Bound::Included(end) => key <= end.as_ref(),
        Bound::Excluded(end) => key < end.as_ref(),
    }
}

impl<I: StorageIterator> StorageIterator for BoundedIterator<I> {
    fn key(&self) -> KeySlice<'_> {
        self.inner.key()
    }

    fn value(&self) -> &[u8] {
        self.inner.value()
    }

    fn seq(&self) -> u64 {
        self.inner.seq()
    }

    fn is_tombstone(&self) -> bool {
        self.inner.is_tombstone()
    }

    fn is_valid(&self) -> bool {
        !self.reach_bound && self.inner.is_valid()
    }

    fn next(&mut self) -> Result<()> {
        if !self.is_valid() {
            return Ok(());
        }
        self.inner.next()?;
        self.check_end_bound();
        Ok(())
    }

    fn seek_to_key(&mut self, key: KeySlice) -> Result<()> {
        if self.reach_bound {
            return Ok(());
        }
        self.inner.seek_to_key(key)?;
        self.check_end_bound();
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }

    fn num_active_iterators(&self) -> usize {
        self.inner.num_active_iterators()
    }
}
