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


use bytes::BufMut;

use crate::key::{KeySlice, KeyVec};

use super::{Block, ENTRY_OVERHEAD, EntryKind};

/// Builds a block.
pub struct BlockBuilder {
    /// Offsets of each entry.
    offsets: Vec<u16>,
    /// All serialized entries in the block.
    data: Vec<u8>,
    /// The expected block size.
    block_size: usize,
    /// The first key in the block
    first_key: KeyVec,
}

impl BlockBuilder {
    /// Creates a new block builder.
    pub fn new(block_size: usize) -> Self {
        Self {
            offsets: Vec::new(),
            data: Vec::new(),
            block_size,
            first_key: KeyVec::new(),
        }
    }

    fn estimated_size(&self) -> usize {
        self.data.len() + self.offsets.len() * 2 + 2
    }

    /// Adds an entry to the block. Returns false when the block is full.
    ///
    /// Every key after the first one is stored as the length of the prefix it shares with the
    /// first key plus the remaining bytes.
    #[must_use]
    pub fn add(&mut self, key: KeySlice, seq: u64, kind: EntryKind, value: &[u8]) -> bool {
        assert!(key.key_len() <= u16::MAX as usize - 4, "key too large");
        assert!(value.len() <= u16::MAX as usize, "value too large");
        let is_first = self.offsets.is_empty();
        let (prefix_len, encoded_key_len) = if is_first {
            (0, key.key_len())
        } else {
            let prefix_len = self.first_key.common_prefix_len(&key);
            (prefix_len, 4 + key.key_len() - prefix_len)
        };
        let entry_size = ENTRY_OVERHEAD + encoded_key_len + value.len() + 2;
        // The first entry always fits, even if it exceeds the target block size.
        if !is_first && self.estimated_size() + entry_size > self.block_size {
            return false;
        }
        if self.data.len() > u16::MAX as usize {
            return false;
        }

        self.offsets.push(self.data.len() as u16);
        self.data.put_u16_le(encoded_key_len as u16);
        if is_first {
            self.first_key = key.to_key_vec();
            self.data.put_slice(key.raw_ref());
        } else {
            let rest = &key.raw_ref()[prefix_len..];
            self.data.put_u16_le(prefix_len as u16);
            self.data.put_u16_le(rest.len() as u16);
            self.data.put_slice(rest);
        }
        self.data.put_u64_le(seq);
        self.data.put_u8(kind as u8);
        self.data.put_u16_le(value.len() as u16);
        self.data.put_slice(value);
        true
    }

    /// Check if there is no entry in the block.
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Finalize the block.
    pub fn build(self) -> Block {
        Block {
            offsets: self.offsets,
            data: self.data,
        }
    }

    pub fn first_key(&self) -> &KeyVec {
        &self.first_key
    }
}
