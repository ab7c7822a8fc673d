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

use anyhow::{Context, Result};

use super::SsTable;
use crate::block::BlockIterator;
use crate::iterators::StorageIterator;
use crate::key::KeySlice;

/// The standard iteration path over one table file. Delete markers are elided, so this iterator
/// only ever yields live entries.
pub struct SsTableIterator {
    table: Arc<SsTable>,
    /// `None` once every block has been consumed, or for a table with no blocks.
    blk_iter: Option<BlockIterator>,
    blk_idx: usize,
}

impl SsTableIterator {
    /// Create a new iterator and seek to the first live entry.
    pub fn create_and_seek_to_first(table: Arc<SsTable>) -> Result<Self> {
        let mut iter = Self {
            table,
            blk_iter: None,
            blk_idx: 0,
        };
        iter.seek_to_first()?;
        Ok(iter)
    }

    /// Create a new iterator and seek to the first live entry whose key >= `key`.
    pub fn create_and_seek_to_key(table: Arc<SsTable>, key: KeySlice) -> Result<Self> {
        let mut iter = Self {
            table,
            blk_iter: None,
            blk_idx: 0,
        };
        iter.seek_to_key(key)?;
        Ok(iter)
    }

    pub fn table(&self) -> &Arc<SsTable> {
        &self.table
    }

    /// Seek to the first live entry of the table.
    pub fn seek_to_first(&mut self) -> Result<()> {
        self.load_block(0, None)?;
        self.skip_tombstones()
    }

    fn load_block(&mut self, blk_idx: usize, key: Option<KeySlice>) -> Result<()> {
        self.blk_idx = blk_idx;
        if blk_idx >= self.table.num_of_blocks() {
            self.blk_iter = None;
            return Ok(());
        }
        let block = self
            .table
            .read_block(blk_idx)
            .with_context(|| format!("failed to read {}", self.table.path().display()))?;
        self.blk_iter = Some(match key {
            Some(key) => BlockIterator::create_and_seek_to_key(block, key),
            None => BlockIterator::create_and_seek_to_first(block),
        });
        Ok(())
    }

    /// Move to the next block once the current one is drained.
    fn settle(&mut self) -> Result<()> {
        while self.blk_iter.as_ref().is_some_and(|iter| !iter.is_valid()) {
            self.load_block(self.blk_idx + 1, None)?;
        }
        Ok(())
    }

    fn skip_tombstones(&mut self) -> Result<()> {
        self.settle()?;
        while let Some(iter) = self.blk_iter.as_mut() {
            if !iter.kind().is_tombstone() {
                break;
            }
            iter.next();
            self.settle()?;
        }
        Ok(())
    }
}

impl StorageIterator for SsTableIterator {
    fn key(&self) -> KeySlice<'_> {
        self.blk_iter
            .as_ref()
            .map_or(KeySlice::from_slice(&[]), |iter| iter.key())
    }

    fn value(&self) -> &[u8] {
        self.blk_iter.as_ref().map_or(&[], |iter| iter.value())
    }

    fn seq(&self) -> u64 {
        self.blk_iter.as_ref().map_or(0, |iter| iter.seq())
    }

    fn is_tombstone(&self) -> bool {
        false
    }

    fn is_valid(&self) -> bool {
        self.blk_iter.as_ref().is_some_and(|iter| iter.is_valid())
    }

    fn next(&mut self) -> Result<()> {
        if let Some(iter) = self.blk_iter.as_mut() {
            iter.next();
        }
        self.skip_tombstones()
    }

    /// Binary search the block meta for the candidate block, then the block itself.
    fn seek_to_key(&mut self, key: KeySlice) -> Result<()> {
        let blk_idx = self.table.find_block_idx(key);
        self.load_block(blk_idx, Some(key))?;
        self.skip_tombstones()
    }
}
