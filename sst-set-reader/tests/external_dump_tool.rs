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


use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use sst_set_reader::table::SsTableBuilder;
use sst_set_reader::{RawScanCapability, SstFileSetReader, SstReaderError, SstReaderOptions};
use tempfile::{TempDir, tempdir};

const SST_DUMP: &str = env!("CARGO_BIN_EXE_sst-dump");

fn build_tables(dir: &Path) -> Vec<PathBuf> {
    (0..3)
        .map(|file| {
            let mut builder = SsTableBuilder::new(128);
            for i in (file..300).step_by(3) {
                let key = format!("key{i:04}");
                let seq = i as u64 + 1;
                if i % 4 == 0 {
                    builder.delete(key.as_bytes(), seq);
                } else {
                    builder.put(key.as_bytes(), seq, b"value");
                }
            }
            let path = dir.join(format!("{file}.sst"));
            builder.build(&path).unwrap();
            path
        })
        .collect()
}

fn reader(files: &[PathBuf], capability: RawScanCapability) -> SstFileSetReader {
    SstFileSetReader::with_options(
        files.to_vec(),
        SstReaderOptions::default().with_raw_scan(capability),
    )
}

fn write_tool(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn collect_entries(reader: &SstFileSetReader) -> Vec<(Vec<u8>, bool)> {
    let mut stream = reader.key_stream_with_tombstone(None, None).unwrap();
    let mut entries = Vec::new();
    while let Some(entry) = stream.next_entry() {
        let (key, tombstone) = entry.unwrap();
        entries.push((key.to_vec(), tombstone));
    }
    stream.close().unwrap();
    entries
}

fn external_matches_in_process(files: &[PathBuf]) {
    let in_process = collect_entries(&reader(files, RawScanCapability::in_process()));
    let external = collect_entries(&reader(files, RawScanCapability::external(SST_DUMP)));
    assert_eq!(in_process.len(), 300);
    assert_eq!(in_process.iter().filter(|(_, tombstone)| *tombstone).count(), 75);
    assert_eq!(external, in_process);

    let lower = b"key0100".as_slice();
    let upper = b"key0200".as_slice();
    let mut stream = reader(files, RawScanCapability::external(SST_DUMP))
        .key_stream_with_tombstone(Some(lower), Some(upper))
        .unwrap();
    let keys: Vec<_> = stream.by_ref().map(Result::unwrap).collect();
    assert_eq!(keys.len(), 100);
    assert_eq!(&keys[0][..], lower);
    stream.close().unwrap();
}

fn external_close_before_exhaustion(files: &[PathBuf]) {
    let mut stream = reader(files, RawScanCapability::external(SST_DUMP))
        .key_stream_with_tombstone(None, None)
        .unwrap();
    stream.next().unwrap().unwrap();
    stream.close().unwrap();
    assert!(stream.is_closed());
    assert!(stream.next().is_none());
}

fn garbage_output(tools: &TempDir, files: &[PathBuf]) {
    let tool = write_tool(tools, "garbage.sh", "echo 'this is not a dump'");
    match reader(files, RawScanCapability::external(tool)).key_stream_with_tombstone(None, None) {
        Err(SstReaderError::MalformedScanOutput { line, .. }) => assert_eq!(line, 1),
        Err(other) => panic!("unexpected error {other}"),
        Ok(_) => panic!("garbage output was accepted"),
    }
}

fn truncated_output(tools: &TempDir, files: &[PathBuf]) {
    let tool = write_tool(
        tools,
        "truncated.sh",
        &format!("'{SST_DUMP}' \"$@\" | head -n 3"),
    );
    let mut stream = reader(&files[..1], RawScanCapability::external(tool))
        .key_stream_with_tombstone(None, None)
        .unwrap();
    // The header and two entries survive the cut.
    assert!(stream.next().unwrap().is_ok());
    assert!(stream.next().unwrap().is_ok());
    match stream.next() {
        Some(Err(SstReaderError::MalformedScanOutput { line, .. })) => assert_eq!(line, 3),
        other => panic!("unexpected item {other:?}"),
    }
    assert!(stream.next().is_none());
    stream.close().unwrap();
}

fn failing_exit_after_full_output(tools: &TempDir, files: &[PathBuf]) {
    let tool = write_tool(tools, "exit3.sh", &format!("'{SST_DUMP}' \"$@\"\nexit 3"));
    let reader = reader(&files[..1], RawScanCapability::external(tool));
    // Every key was delivered, so the exit status is only logged.
    let mut stream = reader.key_stream_with_tombstone(None, None).unwrap();
    assert_eq!(stream.by_ref().count(), 100);
    stream.close().unwrap();
}

fn tool_ignoring_range(tools: &TempDir, files: &[PathBuf]) {
    // Dumps the whole file, whatever range is asked for.
    let tool = write_tool(
        tools,
        "unranged.sh",
        &format!("for path; do :; done\nexec '{SST_DUMP}' \"$path\""),
    );
    let reader = reader(&files[..1], RawScanCapability::external(tool));
    match reader.key_stream_with_tombstone(Some(b"key0100".as_slice()), None) {
        Err(SstReaderError::MalformedScanOutput { line, reason, .. }) => {
            assert_eq!(line, 1);
            assert!(reason.contains("from ['6b657930313030'] to []"), "{reason}");
        }
        Err(other) => panic!("unexpected error {other}"),
        Ok(_) => panic!("dump of the wrong range was accepted"),
    }
    // Without a range the same tool is fine.
    assert_eq!(reader.key_stream_with_tombstone(None, None).unwrap().count(), 100);
}

fn invalid_table_with_external_tool(tools: &TempDir) {
    let bogus = tools.path().join("bogus.sst");
    fs::write(&bogus, b"not a table").unwrap();
    assert!(matches!(
        reader(&[bogus], RawScanCapability::external(SST_DUMP)).key_stream_with_tombstone(None, None),
        Err(SstReaderError::FileOpen { .. })
    ));
}

fn sst_dump_prints_entries(dir: &Path) {
    let mut builder = SsTableBuilder::new(4096);
    builder.put(b"a", 1, b"x");
    builder.delete(b"b", 2);
    let path = dir.join("small.sst");
    builder.build(&path).unwrap();

    let output = std::process::Command::new(SST_DUMP).arg(&path).output().unwrap();
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8(output.stdout).unwrap(),
        "from [] to []\n'61' seq:1, type:1 => 78\n'62' seq:2, type:0 => \n# entries: 2\n"
    );

    let output = std::process::Command::new(SST_DUMP)
        .args(["--from=62", "--to=63"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8(output.stdout).unwrap(),
        "from ['62'] to ['63']\n'62' seq:2, type:0 => \n# entries: 1\n"
    );

    let output = std::process::Command::new(SST_DUMP)
        .arg("--to=")
        .arg(&path)
        .output()
        .unwrap();
    assert_eq!(
        String::from_utf8(output.stdout).unwrap(),
        "from [] to ['']\n# entries: 0\n"
    );

    let output = std::process::Command::new(SST_DUMP)
        .arg("--from=zz")
        .arg(&path)
        .output()
        .unwrap();
    assert!(!output.status.success());

    let output = std::process::Command::new(SST_DUMP)
        .arg(dir.join("missing.sst"))
        .output()
        .unwrap();
    assert!(!output.status.success());
}

// Scenarios run one after another: spawning freshly written scripts from concurrent test threads
// can fail with ETXTBSY.
#[test]
fn test_external_dump_tool() {
    let dir = tempdir().unwrap();
    let tools = tempdir().unwrap();
    let files = build_tables(dir.path());

    external_matches_in_process(&files);
    external_close_before_exhaustion(&files);
    garbage_output(&tools, &files);
    truncated_output(&tools, &files);
    failing_exit_after_full_output(&tools, &files);
    tool_ignoring_range(&tools, &files);
    invalid_table_with_external_tool(&tools);
    sst_dump_prints_entries(dir.path());
}
