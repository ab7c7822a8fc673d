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


use std::fmt::Debug;

use bytes::Bytes;

/// A user key. Keys compare lexicographically over their raw bytes.
pub struct Key<T: AsRef<[u8]>>(T);

pub type KeySlice<'a> = Key<&'a [u8]>;
pub type KeyVec = Key<Vec<u8>>;
pub type KeyBytes = Key<Bytes>;

impl<T: AsRef<[u8]>> Key<T> {
    pub fn key_len(&self) -> usize {
        self.0.as_ref().len()
    }

    /// Length of the prefix shared with `other`.
    pub fn common_prefix_len<U: AsRef<[u8]>>(&self, other: &Key<U>) -> usize {
        self.0
            .as_ref()
            .iter()
            .zip(other.0.as_ref())
            .take_while(|(a, b)| a == b)
            .count()
    }
}

impl Key<Vec<u8>> {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_vec(key: Vec<u8>) -> Self {
        Self(key)
    }

    pub fn clear(&mut self) {
        self.0.clear()
    }

    pub fn append(&mut self, data: &[u8]) {
        self.0.extend(data)
    }

    pub fn as_key_slice(&self) -> KeySlice<'_> {
        Key(self.0.as_slice())
    }

    pub fn into_key_bytes(self) -> KeyBytes {
        Key(self.0.into())
    }

    pub fn raw_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl Key<Bytes> {
    pub fn from_bytes(bytes: Bytes) -> KeyBytes {
        Key(bytes)
    }

    pub fn as_key_slice(&self) -> KeySlice<'_> {
        Key(&self.0)
    }

    pub fn raw_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl<'a> Key<&'a [u8]> {
    pub fn to_key_vec(self) -> KeyVec {
        Key(self.0.to_vec())
    }

    pub fn from_slice(slice: &'a [u8]) -> Self {
        Self(slice)
    }

    pub fn raw_ref(self) -> &'a [u8] {
        self.0
    }
}

impl<T: AsRef<[u8]> + Debug> Debug for Key<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl<T: AsRef<[u8]> + Default> Default for Key<T> {
    fn default() -> Self {
        Self(T::default())
    }
}

impl<T: AsRef<[u8]> + PartialEq> PartialEq for Key<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq(&other.0)
    }
}

impl<T: AsRef<[u8]> + Eq> Eq for Key<T> {}

impl<T: AsRef<[u8]> + Clone> Clone for Key<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: AsRef<[u8]> + Copy> Copy for Key<T> {}

impl<T: AsRef<[u8]> + PartialOrd> PartialOrd for Key<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.0.partial_cmp(&other.0)
    }
}

impl<T: AsRef<[u8]> + Ord> Ord for Key<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}
