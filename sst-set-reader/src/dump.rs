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


//! Line-oriented dump of the entries stored in a table file, delete markers included.
//!
//! The output is produced block by block straight from the data blocks, bypassing the standard
//! iteration path that hides deletes. A dump may be restricted to a `[from, to)` key range; the
//! header echoes the range, with `[]` for an open side:
//!
//! ```text
//! from ['6b6579'] to []
//! '6b6579' seq:12, type:1 => 76616c7565
//! '6b657a' seq:13, type:0 =>
//! # entries: 2
//! ```
//!
//! Keys and values are hex encoded; `type` is 1 for a put and 0 for a delete.

pub mod parser;

use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;

use crate::block::{BlockIterator, EntryKind};
use crate::key::KeySlice;
use crate::table::SsTable;

pub(crate) const TRAILER_PREFIX: &str = "# entries: ";

/// Key range covered by a dump: `from` is inclusive, `to` exclusive.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DumpRange {
    from: Option<Bytes>,
    to: Option<Bytes>,
}

impl DumpRange {
    /// An empty `from` is the same as no lower bound and is normalized away.
    pub fn new(from: Option<&[u8]>, to: Option<&[u8]>) -> Self {
        Self {
            from: from.filter(|from| !from.is_empty()).map(Bytes::copy_from_slice),
            to: to.map(Bytes::copy_from_slice),
        }
    }

    pub fn from(&self) -> Option<&[u8]> {
        self.from.as_deref()
    }

    pub fn to(&self) -> Option<&[u8]> {
        self.to.as_deref()
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.from.as_ref().map_or(true, |from| key >= from.as_ref()) && self.before_end(key)
    }

    fn before_end(&self, key: &[u8]) -> bool {
        self.to.as_ref().map_or(true, |to| key < to.as_ref())
    }

    /// The header line, without its terminator.
    pub fn header(&self) -> String {
        fn bound(key: Option<&[u8]>) -> String {
            key.map(|key| format!("'{}'", hex::encode(key)))
                .unwrap_or_default()
        }
        format!("from [{}] to [{}]", bound(self.from()), bound(self.to()))
    }
}

/// Render one entry line, including the trailing newline.
pub fn format_entry(out: &mut Vec<u8>, key: &[u8], seq: u64, kind: EntryKind, value: &[u8]) {
    let line = format!(
        "'{}' seq:{}, type:{} => {}\n",
        hex::encode(key),
        seq,
        kind as u8,
        hex::encode(value)
    );
    out.extend_from_slice(line.as_bytes());
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    Header,
    Blocks,
    Done,
}

/// A lazy `Read` over the dump of one table, rendering one data block at a time.
///
/// Only the blocks that may hold keys of the range are read: the first one is located through
/// the block index and reading stops at the first key past the end of the range.
pub struct DumpStream {
    table: Arc<SsTable>,
    range: DumpRange,
    first_block: usize,
    next_block: usize,
    entries: u64,
    buf: Vec<u8>,
    pos: usize,
    stage: Stage,
}

impl DumpStream {
    pub fn open(path: impl AsRef<Path>, range: DumpRange) -> Result<Self> {
        Ok(Self::new(Arc::new(SsTable::open(path)?), range))
    }

    pub fn new(table: Arc<SsTable>, range: DumpRange) -> Self {
        let first_block = range
            .from()
            .map_or(0, |from| table.find_block_idx(KeySlice::from_slice(from)));
        Self {
            table,
            range,
            first_block,
            next_block: first_block,
            entries: 0,
            buf: Vec::new(),
            pos: 0,
            stage: Stage::Header,
        }
    }

    pub fn range(&self) -> &DumpRange {
        &self.range
    }

    /// Whether block `idx` may hold keys before the end of the range.
    fn block_in_range(&self, idx: usize) -> bool {
        self.table
            .block_meta
            .get(idx)
            .is_some_and(|meta| self.range.before_end(meta.first_key.raw_ref()))
    }

    /// Render the next chunk of output into `buf`.
    fn fill(&mut self) -> Result<()> {
        self.buf.clear();
        self.pos = 0;
        match self.stage {
            Stage::Header => {
                self.buf.extend_from_slice(self.range.header().as_bytes());
                self.buf.push(b'\n');
                self.stage = Stage::Blocks;
            }
            Stage::Blocks if self.block_in_range(self.next_block) => {
                let block = self.table.read_block(self.next_block).with_context(|| {
                    format!("failed to dump {}", self.table.path().display())
                })?;
                let mut iter = match self.range.from() {
                    Some(from) if self.next_block == self.first_block => {
                        BlockIterator::create_and_seek_to_key(block, KeySlice::from_slice(from))
                    }
                    _ => BlockIterator::create_and_seek_to_first(block),
                };
                self.next_block += 1;
                while iter.is_valid() {
                    if !self.range.before_end(iter.key().raw_ref()) {
                        self.next_block = self.table.num_of_blocks();
                        break;
                    }
                    format_entry(
                        &mut self.buf,
                        iter.key().raw_ref(),
                        iter.seq(),
                        iter.kind(),
                        iter.value(),
                    );
                    self.entries += 1;
                    iter.next();
                }
            }
            Stage::Blocks => {
                self.buf
                    .extend_from_slice(format!("{TRAILER_PREFIX}{}\n", self.entries).as_bytes());
                self.stage = Stage::Done;
            }
            Stage::Done => {}
        }
        Ok(())
    }
}

impl Read for DumpStream {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        while self.pos == self.buf.len() {
            if self.stage == Stage::Done {
                return Ok(0);
            }
            self.fill().map_err(io::Error::other)?;
        }
        let n = out.len().min(self.buf.len() - self.pos);
        out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Dump the entries of the table at `path` within `range` into `out`. Returns the number of
/// entries written.
pub fn dump_table(path: impl AsRef<Path>, range: DumpRange, out: &mut impl Write) -> Result<u64> {
    let mut stream = DumpStream::open(path, range)?;
    io::copy(&mut stream, out)?;
    Ok(stream.entries)
}
