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


use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use anyhow::{Context, Result, ensure};
use bytes::Bytes;

use crate::capability::RawScanCapability;
use crate::dump::{DumpRange, DumpStream};
use crate::dump::parser::{DumpLine, RawEntry, parse_line};
use crate::error::SstReaderError;
use crate::iterators::StorageIterator;
use crate::key::KeySlice;
use crate::table::SsTable;

/// Scans one table file through its dump output, yielding every stored entry including delete
/// markers. The dump is restricted to the requested key range up front, so seeking within it is
/// a linear skip.
pub struct RawSstScanner {
    path: PathBuf,
    reader: Box<dyn BufRead + Send>,
    /// The external dump tool, if the dump runs out of process.
    child: Option<Child>,
    /// The range announced by the dump header.
    range: DumpRange,
    line: String,
    line_no: usize,
    current: Option<RawEntry>,
    last_key: Option<Bytes>,
    entries: u64,
    /// Set once the trailer was read and checked.
    finished: bool,
}

impl RawSstScanner {
    /// Start a dump of the entries of `path` within `range` and position the scanner at the
    /// first of them.
    pub fn open(
        path: &Path,
        capability: &RawScanCapability,
        range: &DumpRange,
    ) -> Result<Self, SstReaderError> {
        let scanner = match capability {
            RawScanCapability::Unavailable => Err(SstReaderError::CapabilityUnavailable),
            RawScanCapability::InProcess => {
                let stream = DumpStream::open(path, range.clone())
                    .map_err(|e| SstReaderError::file_open(path, e))?;
                Self::from_reader(path, Box::new(BufReader::new(stream)), None)
            }
            RawScanCapability::External(tool) => {
                // The tool reports a bad file only through its exit status, so check up front.
                SsTable::open(path).map_err(|e| SstReaderError::file_open(path, e))?;
                let mut command = Command::new(tool);
                if let Some(from) = range.from() {
                    command.arg(format!("--from={}", hex::encode(from)));
                }
                if let Some(to) = range.to() {
                    command.arg(format!("--to={}", hex::encode(to)));
                }
                let mut child = command
                    .arg(path)
                    .stdin(Stdio::null())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::null())
                    .spawn()
                    .with_context(|| format!("failed to spawn dump tool {}", tool.display()))
                    .map_err(|e| SstReaderError::file_open(path, e))?;
                let Some(stdout) = child.stdout.take() else {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(SstReaderError::file_open(
                        path,
                        anyhow::anyhow!("dump tool stdout is not captured"),
                    ));
                };
                Self::from_reader(path, Box::new(BufReader::new(stdout)), Some(child))
            }
        }?;
        if scanner.range != *range {
            // Dropping the scanner reaps the tool.
            return Err(SstReaderError::MalformedScanOutput {
                path: path.to_path_buf(),
                line: 1,
                reason: format!(
                    "dump covers `{}`, expected `{}`",
                    scanner.range.header(),
                    range.header()
                ),
            });
        }
        Ok(scanner)
    }

    /// Scan dump output from an arbitrary reader.
    pub fn from_reader(
        path: &Path,
        reader: Box<dyn BufRead + Send>,
        child: Option<Child>,
    ) -> Result<Self, SstReaderError> {
        let mut scanner = Self {
            path: path.to_path_buf(),
            reader,
            child,
            range: DumpRange::default(),
            line: String::new(),
            line_no: 0,
            current: None,
            last_key: None,
            entries: 0,
            finished: false,
        };
        // On failure the scanner is dropped here, which reaps the tool.
        scanner
            .read_header()
            .and_then(|()| scanner.advance())
            .map_err(SstReaderError::from_read)?;
        Ok(scanner)
    }

    fn malformed(&self, reason: impl Into<String>) -> anyhow::Error {
        anyhow::Error::new(SstReaderError::MalformedScanOutput {
            path: self.path.clone(),
            line: self.line_no,
            reason: reason.into(),
        })
    }

    fn read_line(&mut self) -> Result<Option<DumpLine>> {
        self.line.clear();
        let n = match self.reader.read_line(&mut self.line) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                self.line_no += 1;
                return Err(self.malformed("output is not valid UTF-8"));
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read dump of {}", self.path.display()));
            }
        };
        if n == 0 {
            return Ok(None);
        }
        self.line_no += 1;
        if !self.line.ends_with('\n') {
            return Err(self.malformed("truncated line"));
        }
        match parse_line(&self.line) {
            Ok(line) => Ok(Some(line)),
            Err(e) => Err(self.malformed(e.to_string())),
        }
    }

    fn read_header(&mut self) -> Result<()> {
        match self.read_line()? {
            Some(DumpLine::Header(range)) => {
                self.range = range;
                Ok(())
            }
            None => Err(self.malformed("empty output")),
            Some(_) => Err(self.malformed("missing header")),
        }
    }

    /// Move to the next entry, checking the trailer once the entries run out.
    fn advance(&mut self) -> Result<()> {
        self.current = None;
        match self.read_line()? {
            Some(DumpLine::Entry(entry)) => {
                if self.last_key.as_ref().is_some_and(|last| entry.key <= *last) {
                    return Err(self.malformed("keys are not in ascending order"));
                }
                if !self.range.contains(&entry.key) {
                    return Err(self.malformed("key outside the dumped range"));
                }
                self.entries += 1;
                self.last_key = Some(entry.key.clone());
                self.current = Some(entry);
                Ok(())
            }
            Some(DumpLine::Trailer { entries }) => {
                if entries != self.entries {
                    return Err(self.malformed(format!(
                        "trailer reports {entries} entries but {} were listed",
                        self.entries
                    )));
                }
                if self.read_line()?.is_some() {
                    return Err(self.malformed("output continues after trailer"));
                }
                self.finished = true;
                Ok(())
            }
            Some(DumpLine::Header(_)) => Err(self.malformed("unexpected header")),
            None => Err(self.malformed("output ended without trailer")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn range(&self) -> &DumpRange {
        &self.range
    }

    /// Whether the whole dump was read and its trailer checked.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl StorageIterator for RawSstScanner {
    fn key(&self) -> KeySlice<'_> {
        self.current
            .as_ref()
            .map_or(KeySlice::from_slice(&[]), |entry| {
                KeySlice::from_slice(&entry.key)
            })
    }

    fn value(&self) -> &[u8] {
        self.current.as_ref().map_or(&[], |entry| &entry.value[..])
    }

    fn seq(&self) -> u64 {
        self.current.as_ref().map_or(0, |entry| entry.seq)
    }

    fn is_tombstone(&self) -> bool {
        self.current.as_ref().is_some_and(RawEntry::is_tombstone)
    }

    fn is_valid(&self) -> bool {
        self.current.is_some()
    }

    fn next(&mut self) -> Result<()> {
        if self.current.is_none() {
            return Ok(());
        }
        self.advance()
    }

    fn seek_to_key(&mut self, key: KeySlice) -> Result<()> {
        while self.is_valid() && self.key() < key {
            self.advance()?;
        }
        Ok(())
    }

    /// Stop the dump. A tool that is still running is killed; one that ran to completion must
    /// have exited successfully.
    fn close(&mut self) -> Result<()> {
        self.current = None;
        self.reader = Box::new(io::empty());
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        if !self.finished {
            let _ = child.kill();
            child
                .wait()
                .with_context(|| format!("failed to reap dump tool for {}", self.path.display()))?;
            return Ok(());
        }
        let status = child
            .wait()
            .with_context(|| format!("failed to reap dump tool for {}", self.path.display()))?;
        ensure!(
            status.success(),
            "dump tool for {} exited with {}",
            self.path.display(),
            status
        );
        Ok(())
    }
}

impl Drop for RawSstScanner {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(path = %self.path.display(), error = %format!("{e:#}"), "failed to close raw scanner");
        }
    }
}
