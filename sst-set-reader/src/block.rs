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


mod builder;
mod iterator;

use anyhow::{Result, bail, ensure};
pub use builder::BlockBuilder;
use bytes::{Buf, Bytes};
pub use iterator::BlockIterator;

/// Size of the fixed part of an entry besides the key and value bytes:
/// key_len(u16) + seq(u64) + kind(u8) + value_len(u16).
pub(crate) const ENTRY_OVERHEAD: usize = 2 + 8 + 1 + 2;

/// The kind of a stored entry. A `Delete` entry is a tombstone and carries no value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum EntryKind {
    Delete = 0,
    Put = 1,
}

impl EntryKind {
    pub fn from_u8(kind: u8) -> Option<Self> {
        match kind {
            0 => Some(Self::Delete),
            1 => Some(Self::Put),
            _ => None,
        }
    }

    pub fn is_tombstone(self) -> bool {
        self == Self::Delete
    }
}

/// A block is the smallest unit of read in a table file. It is a collection of sorted entries.
pub struct Block {
    pub(crate) data: Vec<u8>,
    pub(crate) offsets: Vec<u16>,
}

impl Block {
    /// Encode the entries followed by the offset array and the number of entries.
    pub fn encode(&self) -> Bytes {
        let num = self.offsets.len() as u16;
        let mut encoded = self.data.clone();
        encoded.extend(self.offsets.iter().flat_map(|offset| offset.to_le_bytes()));
        encoded.extend(num.to_le_bytes());
        Bytes::from(encoded)
    }

    /// Decode a block and check that every entry lies within the data section, so that
    /// `BlockIterator` can index into it without further checks.
    pub fn decode(data: &[u8]) -> Result<Self> {
        ensure!(data.len() >= 2, "block too small: {} bytes", data.len());
        let data_len = data.len();
        let mut num_buf = &data[data_len - 2..];
        let num = num_buf.get_u16_le() as usize;
        let offsets_start = (data_len - 2)
            .checked_sub(num * 2)
            .ok_or_else(|| anyhow::anyhow!("block offset array overflows block ({num} entries)"))?;
        let mut offset_buf = &data[offsets_start..data_len - 2];
        let mut offsets = Vec::with_capacity(num);
        for _ in 0..num {
            offsets.push(offset_buf.get_u16_le());
        }
        let block = Block {
            data: data[..offsets_start].to_vec(),
            offsets,
        };
        block.validate()?;
        Ok(block)
    }

    fn validate(&self) -> Result<()> {
        let mut first_key_len = 0;
        for (idx, &offset) in self.offsets.iter().enumerate() {
            let mut buf = self
                .data
                .get(offset as usize..)
                .ok_or_else(|| anyhow::anyhow!("entry {idx} offset {offset} out of block"))?;
            ensure!(buf.remaining() >= 2, "entry {idx} truncated");
            let key_len = buf.get_u16_le() as usize;
            ensure!(buf.remaining() >= key_len, "entry {idx} key truncated");
            if idx == 0 {
                first_key_len = key_len;
            } else {
                ensure!(key_len >= 4, "entry {idx} has a short prefix header");
                let mut header = &buf[..4];
                let prefix_len = header.get_u16_le() as usize;
                let rest_len = header.get_u16_le() as usize;
                ensure!(
                    prefix_len <= first_key_len && 4 + rest_len == key_len,
                    "entry {idx} has an invalid key prefix ({prefix_len}, {rest_len})"
                );
            }
            buf.advance(key_len);
            ensure!(buf.remaining() >= 8 + 1 + 2, "entry {idx} header truncated");
            buf.advance(8);
            let kind = buf.get_u8();
            if EntryKind::from_u8(kind).is_none() {
                bail!("entry {idx} has unknown kind {kind}");
            }
            let value_len = buf.get_u16_le() as usize;
            ensure!(buf.remaining() >= value_len, "entry {idx} value truncated");
        }
        Ok(())
    }
}
