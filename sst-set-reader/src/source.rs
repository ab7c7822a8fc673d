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


use anyhow::Result;

use crate::iterators::StorageIterator;
use crate::key::KeySlice;
use crate::raw_scanner::RawSstScanner;
use crate::table::SsTableIterator;

/// The per-file source of a read session, picked by the read mode when the session opens.
pub enum SstSource {
    /// Standard iteration; only live entries.
    Normal(SsTableIterator),
    /// Raw scan; every stored entry, delete markers included.
    Raw(RawSstScanner),
}

macro_rules! delegate {
    ($self:ident, $iter:ident => $body:expr) => {
        match $self {
            SstSource::Normal($iter) => $body,
            SstSource::Raw($iter) => $body,
        }
    };
}

impl StorageIterator for SstSource {
    fn key(&self) -> KeySlice<'_> {
        delegate!(self, iter => iter.key())
    }

    fn value(&self) -> &[u8] {
        delegate!(self, iter => iter.value())
    }

    fn seq(&self) -> u64 {
        delegate!(self, iter => iter.seq())
    }

    fn is_tombstone(&self) -> bool {
        delegate!(self, iter => iter.is_tombstone())
    }

    fn is_valid(&self) -> bool {
        delegate!(self, iter => iter.is_valid())
    }

    fn next(&mut self) -> Result<()> {
        delegate!(self, iter => iter.next())
    }

    fn seek_to_key(&mut self, key: KeySlice) -> Result<()> {
        delegate!(self, iter => iter.seek_to_key(key))
    }

    fn close(&mut self) -> Result<()> {
        delegate!(self, iter => iter.close())
    }
}
