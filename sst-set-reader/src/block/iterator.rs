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


use std::sync::Arc;

use bytes::Buf;

use crate::key::{KeySlice, KeyVec};

use super::{Block, EntryKind};

/// Iterates on a block, surfacing every stored entry including tombstones.
pub struct BlockIterator {
    /// The internal `Block`, wrapped by an `Arc`
    block: Arc<Block>,
    /// The current key, empty represents the iterator is invalid
    key: KeyVec,
    /// the current value range in the block.data, corresponds to the current key
    value_range: (usize, usize),
    /// Sequence number of the current entry
    seq: u64,
    kind: EntryKind,
    /// Current index of the entry, should be in range of [0, num_of_elements)
    idx: usize,
    /// The first key in the block
    first_key: KeyVec,
}

impl BlockIterator {
    fn new(block: Arc<Block>) -> Self {
        let first_key = Self::decode_first_key(&block);
        Self {
            block,
            key: KeyVec::new(),
            value_range: (0, 0),
            seq: 0,
            kind: EntryKind::Put,
            idx: 0,
            first_key,
        }
    }

    fn decode_first_key(block: &Block) -> KeyVec {
        let Some(&offset) = block.offsets.first() else {
            return KeyVec::new();
        };
        let mut buf = &block.data[offset as usize..];
        let key_len = buf.get_u16_le() as usize;
        KeyVec::from_vec(buf[..key_len].to_vec())
    }

    /// Creates a block iterator and seek to the first entry.
    pub fn create_and_seek_to_first(block: Arc<Block>) -> Self {
        let mut iter = Self::new(block);
        iter.seek_to_first();
        iter
    }

    /// Creates a block iterator and seek to the first key that >= `key`.
    pub fn create_and_seek_to_key(block: Arc<Block>, key: KeySlice) -> Self {
        let mut iter = Self::new(block);
        iter.seek_to_key(key);
        iter
    }

    /// Returns the key of the current entry.
    pub fn key(&self) -> KeySlice<'_> {
        self.key.as_key_slice()
    }

    /// Returns the value of the current entry.
    pub fn value(&self) -> &[u8] {
        &self.block.data[self.value_range.0..self.value_range.1]
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    /// Returns true if the iterator is valid.
    pub fn is_valid(&self) -> bool {
        self.idx < self.block.offsets.len()
    }

    /// Seeks to the first key in the block.
    pub fn seek_to_first(&mut self) {
        self.seek_to(0);
    }

    /// Move to the next key in the block.
    pub fn next(&mut self) {
        self.seek_to(self.idx + 1);
    }

    /// Seek to the first key that >= `key`.
    pub fn seek_to_key(&mut self, key: KeySlice) {
        // lower_bound: find the first index i such that key[i] >= target.
        let mut low = 0;
        let mut high = self.block.offsets.len();
        while low < high {
            let mid = low + (high - low) / 2;
            self.seek_to(mid);
            if self.key() < key {
                low = mid + 1;
            } else {
                high = mid;
            }
        }
        self.seek_to(low);
    }

    /// Decode the entry at `idx`, or invalidate the iterator when `idx` is out of range.
    fn seek_to(&mut self, idx: usize) {
        self.idx = idx;
        if idx >= self.block.offsets.len() {
            self.key.clear();
            self.value_range = (0, 0);
            return;
        }
        let offset = self.block.offsets[idx] as usize;
        let mut buf = &self.block.data[offset..];
        let key_len = buf.get_u16_le() as usize;
        self.key.clear();
        if idx == 0 {
            self.key.append(&buf[..key_len]);
            buf.advance(key_len);
        } else {
            let prefix_len = buf.get_u16_le() as usize;
            let rest_len = buf.get_u16_le() as usize;
            self.key.append(&self.first_key.raw_ref()[..prefix_len]);
            self.key.append(&buf[..rest_len]);
            buf.advance(rest_len);
        }
        self.seq = buf.get_u64_le();
        // Kinds were checked when the block was decoded.
        self.kind = EntryKind::from_u8(buf.get_u8()).unwrap_or(EntryKind::Put);
        let value_len = buf.get_u16_le() as usize;
        let value_start = self.block.data.len() - buf.remaining();
        self.value_range = (value_start, value_start + value_len);
    }
}
