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


//! A merge reader over a set of immutable sorted table files.
//!
//! [`SstFileSetReader`] produces, in ascending order and without duplicates, the keys stored
//! across a set of table files, restricted to a half-open `[lower, upper)` range. It has two
//! read modes: live keys only, through the standard table iteration, and every touched key
//! including deletes, through a raw scan of the files' dump output that is gated by
//! [`RawScanCapability`].

pub mod block;
pub mod capability;
pub mod dump;
pub mod error;
pub mod iterators;
pub mod key;
pub mod raw_scanner;
pub mod reader;
pub mod session;
pub mod source;
pub mod table;

pub use capability::{RawScanCapability, try_load_capability};
pub use error::SstReaderError;
pub use iterators::merge_iterator::DuplicatePolicy;
pub use reader::{ReadMode, SstFileSetReader, SstReaderOptions};
pub use session::KeyStream;
