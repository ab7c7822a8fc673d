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


//! Grammar of the dump output:
//!
//! ```text
//! line    := header | entry | trailer
//! header  := "from [" bound "] to [" bound "]"
//! bound   := "" | "'" HEX "'"
//! entry   := "'" HEX "' seq:" DIGITS ", type:" ("0" | "1") " => " HEX?
//! trailer := "# entries: " DIGITS
//! ```

use bytes::Bytes;
use thiserror::Error;

use super::{DumpRange, TRAILER_PREFIX};
use crate::block::EntryKind;

/// One stored entry as reported by the dump.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawEntry {
    pub key: Bytes,
    pub seq: u64,
    pub kind: EntryKind,
    pub value: Bytes,
}

impl RawEntry {
    pub fn is_tombstone(&self) -> bool {
        self.kind.is_tombstone()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DumpLine {
    Header(DumpRange),
    Entry(RawEntry),
    Trailer { entries: u64 },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unrecognized line")]
    UnrecognizedLine,
    #[error("missing {0}")]
    Missing(&'static str),
    #[error("invalid hex in {0}")]
    InvalidHex(&'static str),
    #[error("invalid sequence number `{0}`")]
    InvalidSeq(String),
    #[error("unknown entry type `{0}`")]
    UnknownType(String),
    #[error("delete entry carries a value")]
    TombstoneWithValue,
    #[error("invalid entry count `{0}`")]
    InvalidCount(String),
}

/// Parse one line of dump output. The line terminator, if any, is ignored.
pub fn parse_line(line: &str) -> Result<DumpLine, ParseError> {
    let line = line.trim_end_matches(|c: char| c == '\n' || c == '\r');
    if let Some(bounds) = line.strip_prefix("from [") {
        return parse_header(bounds).map(DumpLine::Header);
    }
    if let Some(count) = line.strip_prefix(TRAILER_PREFIX) {
        let entries = parse_digits(count).ok_or_else(|| ParseError::InvalidCount(count.into()))?;
        return Ok(DumpLine::Trailer { entries });
    }
    if line.starts_with('\'') {
        return parse_entry_line(line).map(DumpLine::Entry);
    }
    Err(ParseError::UnrecognizedLine)
}

/// Parse what follows `from [` in a header line.
fn parse_header(bounds: &str) -> Result<DumpRange, ParseError> {
    let (from, to) = bounds
        .split_once("] to [")
        .ok_or(ParseError::Missing("upper bound"))?;
    let to = to
        .strip_suffix(']')
        .ok_or(ParseError::Missing("closing bracket"))?;
    let from = parse_bound(from, "lower bound")?;
    let to = parse_bound(to, "upper bound")?;
    Ok(DumpRange::new(from.as_deref(), to.as_deref()))
}

fn parse_bound(bound: &str, what: &'static str) -> Result<Option<Vec<u8>>, ParseError> {
    if bound.is_empty() {
        return Ok(None);
    }
    let hex = bound
        .strip_prefix('\'')
        .and_then(|bound| bound.strip_suffix('\''))
        .ok_or(ParseError::Missing("quotes around bound"))?;
    hex::decode(hex).map(Some).map_err(|_| ParseError::InvalidHex(what))
}

/// Parse an entry line: `'<hex key>' seq:<seq>, type:<kind> => <hex value>`.
pub fn parse_entry_line(line: &str) -> Result<RawEntry, ParseError> {
    let rest = line
        .strip_prefix('\'')
        .ok_or(ParseError::Missing("opening quote"))?;
    let (key_hex, rest) = rest
        .split_once('\'')
        .ok_or(ParseError::Missing("closing quote"))?;
    let rest = rest
        .strip_prefix(" seq:")
        .ok_or(ParseError::Missing("sequence number"))?;
    let (seq, rest) = rest
        .split_once(", type:")
        .ok_or(ParseError::Missing("entry type"))?;
    let (kind, value_hex) = rest
        .split_once(" =>")
        .ok_or(ParseError::Missing("value separator"))?;
    let value_hex = match value_hex {
        "" => "",
        _ => value_hex
            .strip_prefix(' ')
            .ok_or(ParseError::Missing("value separator"))?,
    };

    let key = hex::decode(key_hex).map_err(|_| ParseError::InvalidHex("key"))?;
    let seq = parse_digits(seq).ok_or_else(|| ParseError::InvalidSeq(seq.into()))?;
    let kind = parse_digits(kind)
        .and_then(|kind| u8::try_from(kind).ok())
        .and_then(EntryKind::from_u8)
        .ok_or_else(|| ParseError::UnknownType(kind.into()))?;
    let value = hex::decode(value_hex).map_err(|_| ParseError::InvalidHex("value"))?;
    if kind.is_tombstone() && !value.is_empty() {
        return Err(ParseError::TombstoneWithValue);
    }

    Ok(RawEntry {
        key: key.into(),
        seq,
        kind,
        value: value.into(),
    })
}

/// Only plain ASCII digits: no sign, no whitespace.
fn parse_digits(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dump::format_entry;

    fn entry(key: &'static [u8], seq: u64, kind: EntryKind, value: &'static [u8]) -> RawEntry {
        RawEntry {
            key: Bytes::from_static(key),
            seq,
            kind,
            value: Bytes::from_static(value),
        }
    }

    #[test]
    fn test_parse_entry_lines() {
        assert_eq!(
            parse_line("'6b6579' seq:12, type:1 => 76616c7565\n").unwrap(),
            DumpLine::Entry(entry(b"key", 12, EntryKind::Put, b"value"))
        );
        assert_eq!(
            parse_line("'6b657a' seq:13, type:0 => ").unwrap(),
            DumpLine::Entry(entry(b"kez", 13, EntryKind::Delete, b""))
        );
        assert_eq!(
            parse_line("'6b657a' seq:13, type:0 =>").unwrap(),
            DumpLine::Entry(entry(b"kez", 13, EntryKind::Delete, b""))
        );
        // The empty key is a valid key.
        assert_eq!(
            parse_line("'' seq:0, type:1 => 00\r\n").unwrap(),
            DumpLine::Entry(entry(b"", 0, EntryKind::Put, b"\0"))
        );
    }

    #[test]
    fn test_parse_header_and_trailer() {
        assert_eq!(
            parse_line("from [] to []\n").unwrap(),
            DumpLine::Header(DumpRange::default())
        );
        assert_eq!(
            parse_line("from ['6b'] to ['']").unwrap(),
            DumpLine::Header(DumpRange::new(Some(b"k".as_slice()), Some(b"".as_slice())))
        );
        let range = DumpRange::new(Some(b"\x00\xff".as_slice()), Some(b"zz".as_slice()));
        assert_eq!(parse_line(&range.header()).unwrap(), DumpLine::Header(range));
        assert_eq!(
            parse_line("# entries: 1000").unwrap(),
            DumpLine::Trailer { entries: 1000 }
        );
        assert_eq!(
            parse_line("# entries: -1"),
            Err(ParseError::InvalidCount("-1".into()))
        );
    }

    #[test]
    fn test_parse_round_trips_binary_keys() {
        let key: Vec<u8> = (0..=255u8).collect();
        let mut line = Vec::new();
        format_entry(&mut line, &key, u64::MAX, EntryKind::Delete, b"");
        let parsed = parse_entry_line(std::str::from_utf8(&line).unwrap().trim_end()).unwrap();
        assert_eq!(parsed.key.as_ref(), key.as_slice());
        assert_eq!(parsed.seq, u64::MAX);
        assert!(parsed.is_tombstone());
    }

    #[test]
    fn test_parse_rejects_malformed_lines() {
        let cases = [
            ("", ParseError::UnrecognizedLine),
            ("key seq:1, type:1 => ", ParseError::UnrecognizedLine),
            ("'6b6579 seq:1, type:1 => ", ParseError::Missing("closing quote")),
            ("'6b6579' seq=1, type:1 => ", ParseError::Missing("sequence number")),
            ("'6b6579' seq:1 type:1 => ", ParseError::Missing("entry type")),
            ("'6b6579' seq:1, type:1", ParseError::Missing("value separator")),
            ("'6b6579' seq:1, type:1 =>00", ParseError::Missing("value separator")),
            ("'6b657' seq:1, type:1 => ", ParseError::InvalidHex("key")),
            ("'zz' seq:1, type:1 => ", ParseError::InvalidHex("key")),
            ("'6b6579' seq:1, type:1 => 0g", ParseError::InvalidHex("value")),
            ("'6b6579' seq:+1, type:1 => ", ParseError::InvalidSeq("+1".into())),
            (
                "'6b6579' seq:99999999999999999999, type:1 => ",
                ParseError::InvalidSeq("99999999999999999999".into()),
            ),
            ("'6b6579' seq:1, type:7 => ", ParseError::UnknownType("7".into())),
            ("'6b6579' seq:1, type:300 => ", ParseError::UnknownType("300".into())),
            ("'6b6579' seq:1, type:0 => 00", ParseError::TombstoneWithValue),
            ("from []", ParseError::Missing("upper bound")),
            ("from [] to [", ParseError::Missing("closing bracket")),
            ("from [6b] to []", ParseError::Missing("quotes around bound")),
            ("from [] to ['6'] ", ParseError::Missing("closing bracket")),
            ("from ['zz'] to []", ParseError::InvalidHex("lower bound")),
        ];
        for (line, expected) in cases {
            assert_eq!(parse_line(line), Err(expected), "line: {line:?}");
        }
    }
}
