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

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail, ensure};
pub use builder::SsTableBuilder;
use bytes::{Buf, BufMut};
pub use iterator::SsTableIterator;

use crate::block::Block;
use crate::key::{KeyBytes, KeySlice};

/// Trailing magic number identifying a table file.
pub(crate) const TABLE_MAGIC: u32 = 0x5353_5446;

/// Footer layout:
/// | meta offset | num entries | num tombstones | max seq | footer checksum | magic |
/// |    u32      |     u64     |      u64       |   u64   |       u32       |  u32  |
pub(crate) const FOOTER_SIZE: usize = 4 + 8 + 8 + 8 + 4 + 4;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockMeta {
    /// Offset of this data block.
    pub offset: usize,
    /// The first key of the data block.
    pub first_key: KeyBytes,
    /// The last key of the data block.
    pub last_key: KeyBytes,
}

impl BlockMeta {
    /// Encode block meta to a buffer.
    pub fn encode_block_meta(block_meta: &[BlockMeta], buf: &mut Vec<u8>) {
        buf.put_u32(block_meta.len() as u32);
        for meta in block_meta {
            assert!(meta.offset <= u32::MAX as usize);
            buf.put_u32(meta.offset as u32);
            buf.put_u16(meta.first_key.key_len() as u16);
            buf.put_slice(meta.first_key.raw_ref());
            buf.put_u16(meta.last_key.key_len() as u16);
            buf.put_slice(meta.last_key.raw_ref());
        }
    }

    /// Decode block meta from a buffer.
    pub fn decode_block_meta(mut buf: &[u8]) -> Result<Vec<BlockMeta>> {
        ensure!(buf.remaining() >= 4, "block meta truncated");
        let nums = buf.get_u32() as usize;
        let mut metas = Vec::with_capacity(nums.min(buf.remaining()));
        for idx in 0..nums {
            ensure!(buf.remaining() >= 6, "block meta {idx} truncated");
            let offset = buf.get_u32() as usize;
            let first_key = Self::decode_key(&mut buf).with_context(|| format!("block meta {idx}"))?;
            let last_key = Self::decode_key(&mut buf).with_context(|| format!("block meta {idx}"))?;
            metas.push(BlockMeta {
                offset,
                first_key,
                last_key,
            });
        }
        ensure!(!buf.has_remaining(), "trailing bytes after block meta");
        Ok(metas)
    }

    fn decode_key(buf: &mut &[u8]) -> Result<KeyBytes> {
        ensure!(buf.remaining() >= 2, "key length truncated");
        let len = buf.get_u16() as usize;
        ensure!(buf.remaining() >= len, "key truncated");
        Ok(KeyBytes::from_bytes(buf.copy_to_bytes(len)))
    }
}

/// Summary statistics recorded by the writer in the table footer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TableProperties {
    /// Number of stored entries, tombstones included.
    pub num_entries: u64,
    pub num_tombstones: u64,
    /// The largest sequence number stored in this table.
    pub max_seq: u64,
}

impl TableProperties {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.put_u64_le(self.num_entries);
        buf.put_u64_le(self.num_tombstones);
        buf.put_u64_le(self.max_seq);
    }

    fn decode(buf: &mut &[u8]) -> Self {
        Self {
            num_entries: buf.get_u64_le(),
            num_tombstones: buf.get_u64_le(),
            max_seq: buf.get_u64_le(),
        }
    }
}

/// A file object.
pub struct FileObject(File, u64);

impl FileObject {
    pub fn read(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        use std::os::unix::fs::FileExt;
        let mut data = vec![0; len as usize];
        self.0.read_exact_at(&mut data[..], offset)?;
        Ok(data)
    }

    pub fn size(&self) -> u64 {
        self.1
    }

    /// Write `data` to a new file at `path` and reopen it read-only.
    pub fn create(path: &Path, data: Vec<u8>) -> Result<Self> {
        std::fs::write(path, &data)?;
        File::open(path)?.sync_all()?;
        Ok(FileObject(
            File::options().read(true).write(false).open(path)?,
            data.len() as u64,
        ))
    }

    pub fn open(path: &Path) -> Result<Self> {
        let file = File::options().read(true).write(false).open(path)?;
        let size = file.metadata()?.len();
        Ok(FileObject(file, size))
    }
}

/// An immutable sorted table file.
pub struct SsTable {
    /// The actual storage unit of SsTable, the format is as above.
    pub(crate) file: FileObject,
    /// The meta blocks that hold info for data blocks.
    pub(crate) block_meta: Vec<BlockMeta>,
    /// The offset that indicates the start point of meta blocks in `file`.
    pub(crate) block_meta_offset: usize,
    path: PathBuf,
    first_key: KeyBytes,
    last_key: KeyBytes,
    properties: TableProperties,
}

impl SsTable {
    /// Open a table file and validate its footer and block meta.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = FileObject::open(path)
            .with_context(|| format!("failed to open table file {}", path.display()))?;
        Self::open_file(path, file).with_context(|| format!("invalid table file {}", path.display()))
    }

    fn open_file(path: &Path, file: FileObject) -> Result<Self> {
        let file_size = file.size();
        if file_size < FOOTER_SIZE as u64 {
            bail!("table file too small: {} bytes", file_size);
        }

        let footer = file.read(file_size - FOOTER_SIZE as u64, FOOTER_SIZE as u64)?;
        let mut footer_buf = footer.as_slice();
        let block_meta_offset = footer_buf.get_u32_le() as usize;
        let properties = TableProperties::decode(&mut footer_buf);
        let checksum = footer_buf.get_u32();
        let magic = footer_buf.get_u32();
        if magic != TABLE_MAGIC {
            bail!("bad table magic {:#010x}", magic);
        }

        let meta_end = file_size as usize - FOOTER_SIZE;
        if block_meta_offset > meta_end {
            bail!(
                "invalid block meta offset {} (meta end {})",
                block_meta_offset,
                meta_end
            );
        }
        let meta_buf = file.read(
            block_meta_offset as u64,
            (meta_end - block_meta_offset) as u64,
        )?;
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&meta_buf);
        hasher.update(&footer[..FOOTER_SIZE - 8]);
        if hasher.finalize() != checksum {
            bail!("meta checksum mismatched");
        }

        let block_meta = BlockMeta::decode_block_meta(&meta_buf)?;
        let mut last_offset = 0;
        for meta in &block_meta {
            ensure!(
                meta.offset >= last_offset && meta.offset + 4 <= block_meta_offset,
                "block offset {} out of order",
                meta.offset
            );
            last_offset = meta.offset + 4;
        }
        let first_key = block_meta
            .first()
            .map(|meta| meta.first_key.clone())
            .unwrap_or_default();
        let last_key = block_meta
            .last()
            .map(|meta| meta.last_key.clone())
            .unwrap_or_default();

        Ok(Self {
            file,
            block_meta,
            block_meta_offset,
            path: path.to_path_buf(),
            first_key,
            last_key,
            properties,
        })
    }

    /// Read a block from the disk and verify its checksum.
    pub fn read_block(&self, block_idx: usize) -> Result<Arc<Block>> {
        let meta = self
            .block_meta
            .get(block_idx)
            .ok_or_else(|| anyhow::anyhow!("block {block_idx} out of range"))?;
        let end = self
            .block_meta
            .get(block_idx + 1)
            .map_or(self.block_meta_offset, |next| next.offset);
        let data_len = end - meta.offset;
        let raw = self.file.read(meta.offset as u64, data_len as u64)?;
        let (data, mut checksum) = raw.split_at(data_len - 4);
        if crc32fast::hash(data) != checksum.get_u32() {
            bail!("block {block_idx} checksum mismatched");
        }
        let block = Block::decode(data).with_context(|| format!("corrupted block {block_idx}"))?;
        Ok(Arc::new(block))
    }

    /// Find the block that may contain `key`: the last block whose first key is <= `key`,
    /// clamped to 0 when `key` is smaller than the first block.
    pub fn find_block_idx(&self, key: KeySlice) -> usize {
        self.block_meta
            .partition_point(|meta| meta.first_key.as_key_slice() <= key)
            .saturating_sub(1)
    }

    /// Get number of data blocks.
    pub fn num_of_blocks(&self) -> usize {
        self.block_meta.len()
    }

    pub fn first_key(&self) -> &KeyBytes {
        &self.first_key
    }

    pub fn last_key(&self) -> &KeyBytes {
        &self.last_key
    }

    pub fn table_size(&self) -> u64 {
        self.file.size()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn properties(&self) -> TableProperties {
        self.properties
    }
}
