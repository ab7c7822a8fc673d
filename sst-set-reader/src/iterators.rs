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


pub mod bounded_iterator;
pub mod merge_iterator;

use crate::key::KeySlice;

/// A forward cursor over entries sorted by key, with no duplicate keys.
pub trait StorageIterator {
    /// Get the current key.
    fn key(&self) -> KeySlice<'_>;

    /// Get the current value.
    fn value(&self) -> &[u8];

    /// Recency marker of the current entry; a larger value was written later.
    fn seq(&self) -> u64;

    /// Whether the current entry is a delete marker.
    fn is_tombstone(&self) -> bool;

    /// Check if the current iterator is valid.
    fn is_valid(&self) -> bool;

    /// Move to the next position.
    fn next(&mut self) -> anyhow::Result<()>;

    /// Position at the first entry whose key >= `key`. Callers only seek forward.
    fn seek_to_key(&mut self, key: KeySlice) -> anyhow::Result<()>;

    /// Release the resources held by this iterator. Must be safe to call more than once.
    fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Number of underlying active iterators for this iterator.
    fn num_active_iterators(&self) -> usize {
        1
    }
}
