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


use std::path::Path;

use anyhow::Result;
use bytes::BufMut;

use super::{BlockMeta, FOOTER_SIZE, FileObject, SsTable, TABLE_MAGIC, TableProperties};
use crate::block::{BlockBuilder, EntryKind};
use crate::key::{KeySlice, KeyVec};

/// Builds a table file from entries added in strictly ascending key order.
pub struct SsTableBuilder {
    builder: BlockBuilder,
    first_key: Vec<u8>,
    last_key: Vec<u8>,
    data: Vec<u8>,
    pub(crate) meta: Vec<BlockMeta>,
    block_size: usize,
    properties: TableProperties,
}

impl SsTableBuilder {
    /// Create a builder based on target block size.
    pub fn new(block_size: usize) -> Self {
        Self {
            builder: BlockBuilder::new(block_size),
            first_key: Vec::new(),
            last_key: Vec::new(),
            data: Vec::new(),
            meta: Vec::new(),
            block_size,
            properties: TableProperties::default(),
        }
    }

    fn flush_current_block(&mut self) {
        let old_builder = std::mem::replace(&mut self.builder, BlockBuilder::new(self.block_size));
        let offset = self.data.len();
        let first_key = old_builder.first_key().raw_ref().to_vec();
        let block_data = old_builder.build().encode();
        let checksum = crc32fast::hash(&block_data);
        self.data.extend_from_slice(&block_data);
        self.data.put_u32(checksum);
        self.meta.push(BlockMeta {
            offset,
            first_key: KeyVec::from_vec(first_key).into_key_bytes(),
            last_key: KeyVec::from_vec(self.last_key.clone()).into_key_bytes(),
        });
    }

    /// Adds a live entry.
    pub fn put(&mut self, key: &[u8], seq: u64, value: &[u8]) {
        self.add(KeySlice::from_slice(key), seq, EntryKind::Put, value);
    }

    /// Adds a delete marker for `key`.
    pub fn delete(&mut self, key: &[u8], seq: u64) {
        self.add(KeySlice::from_slice(key), seq, EntryKind::Delete, &[]);
    }

    /// Adds an entry, splitting a new block when the current one is full.
    pub fn add(&mut self, key: KeySlice, seq: u64, kind: EntryKind, value: &[u8]) {
        assert!(
            self.properties.num_entries == 0 || key.raw_ref() > self.last_key.as_slice(),
            "keys must be added in strictly ascending order"
        );
        if self.properties.num_entries == 0 {
            self.first_key = key.raw_ref().to_vec();
        }

        if !self.builder.add(key, seq, kind, value) {
            self.flush_current_block();
            if !self.builder.add(key, seq, kind, value) {
                panic!("split block failed: single entry too large");
            }
        }
        self.last_key = key.raw_ref().to_vec();

        self.properties.num_entries += 1;
        if kind.is_tombstone() {
            self.properties.num_tombstones += 1;
        }
        self.properties.max_seq = self.properties.max_seq.max(seq);
    }

    /// Get the estimated size of the table, counting data blocks only.
    pub fn estimated_size(&self) -> usize {
        self.data.len()
    }

    /// Builds the table and writes it to the given path.
    pub fn build(mut self, path: impl AsRef<Path>) -> Result<SsTable> {
        if !self.builder.is_empty() {
            self.flush_current_block();
        }

        let block_meta_offset = self.data.len();
        if block_meta_offset > u32::MAX as usize {
            return Err(anyhow::anyhow!(
                "table too large: data section {} bytes",
                block_meta_offset
            ));
        }
        let mut meta_buf = Vec::new();
        BlockMeta::encode_block_meta(&self.meta, &mut meta_buf);
        self.data.extend_from_slice(&meta_buf);

        let mut footer = Vec::with_capacity(FOOTER_SIZE);
        footer.put_u32_le(block_meta_offset as u32);
        self.properties.encode(&mut footer);
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&meta_buf);
        hasher.update(&footer);
        footer.put_u32(hasher.finalize());
        footer.put_u32(TABLE_MAGIC);
        self.data.extend_from_slice(&footer);

        let path = path.as_ref();
        let file = FileObject::create(path, self.data)?;
        Ok(SsTable {
            file,
            block_meta: self.meta,
            block_meta_offset,
            path: path.to_path_buf(),
            first_key: KeyVec::from_vec(self.first_key).into_key_bytes(),
            last_key: KeyVec::from_vec(self.last_key).into_key_bytes(),
            properties: self.properties,
        })
    }
}
