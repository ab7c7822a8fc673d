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


use tempfile::tempdir;

use super::harness::*;
use crate::error::SstReaderError;
use crate::iterators::merge_iterator::DuplicatePolicy;
use crate::reader::{SstFileSetReader, SstReaderOptions};
use crate::table::SsTableBuilder;

#[test]
fn test_key_stream_over_bounds() {
    for number_of_files in [0, 1, 2, 3, 7, 10] {
        let dir = tempdir().unwrap();
        let (keys, files) = create_dummy_data(dir.path(), number_of_files);
        let bounds = testing_bounds(&keys);
        let reader = SstFileSetReader::new(files);
        for lower in &bounds {
            for upper in &bounds {
                let (lower, upper) = (lower.as_deref(), upper.as_deref());
                let stream = reader.key_stream(lower, upper).unwrap();
                assert_eq!(
                    collect_keys(stream),
                    expected_keys(&keys, lower, upper, false),
                    "files: {number_of_files}, lower: {lower:?}, upper: {upper:?}"
                );
            }
        }
    }
}

fn scenario_files(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
    let keys: Vec<String> = (0..1000).map(|i| format!("a{i}")).collect();
    let mut per_file = vec![KeySet::new(); 3];
    for (i, key) in keys.iter().enumerate() {
        per_file[i % 3].insert(key.clone().into_bytes(), i % 2 == 0);
    }
    per_file
        .iter()
        .enumerate()
        .map(|(i, file_keys)| {
            create_sst_file(&dir.join(format!("{i}.sst")), file_keys, i as u64 * 1000)
        })
        .collect()
}

#[test]
fn test_round_robin_puts_and_deletes() {
    let dir = tempdir().unwrap();
    let files = scenario_files(dir.path());
    let reader = SstFileSetReader::new(files.clone());

    let mut expected: Vec<Vec<u8>> = (0..1000)
        .filter(|i| i % 2 == 0)
        .map(|i| format!("a{i}").into_bytes())
        .collect();
    expected.sort();
    let live = collect_keys(reader.key_stream(None, None).unwrap());
    assert_eq!(live.len(), 500);
    assert_eq!(live, expected);

    let all = collect_keys(
        raw_scan_reader(&files)
            .key_stream_with_tombstone(None, None)
            .unwrap(),
    );
    assert_eq!(all.len(), 1000);
    assert!(all.windows(2).all(|w| w[0] < w[1]));

    let ranged = collect_keys(
        reader
            .key_stream(Some(b"a500".as_slice()), Some(b"a600".as_slice()))
            .unwrap(),
    );
    let expected_ranged: Vec<Vec<u8>> = expected
        .iter()
        .filter(|key| key.as_slice() >= b"a500".as_slice() && key.as_slice() < b"a600".as_slice())
        .cloned()
        .collect();
    assert!(!ranged.is_empty());
    assert_eq!(ranged, expected_ranged);
    for key in &ranged {
        let index: usize = std::str::from_utf8(&key[1..]).unwrap().parse().unwrap();
        assert_eq!(index % 2, 0);
    }
}

#[test]
fn test_key_stream_is_repeatable() {
    let dir = tempdir().unwrap();
    let (keys, files) = create_dummy_data(dir.path(), 3);
    let reader = SstFileSetReader::new(files.clone());
    let lower = keys.keys().nth(100).cloned();
    let first = collect_keys(reader.key_stream(lower.as_deref(), None).unwrap());
    let second = collect_keys(reader.key_stream(lower.as_deref(), None).unwrap());
    let reopened = collect_keys(
        SstFileSetReader::new(files)
            .key_stream(lower.as_deref(), None)
            .unwrap(),
    );
    assert_eq!(first, second);
    assert_eq!(first, reopened);
}

#[test]
fn test_file_listing_order_does_not_change_output() {
    let dir = tempdir().unwrap();
    let (keys, mut files) = create_dummy_data(dir.path(), 7);
    files.reverse();
    files.swap(1, 4);
    let stream = SstFileSetReader::new(files).key_stream(None, None).unwrap();
    assert_eq!(collect_keys(stream), expected_keys(&keys, None, None, false));
}

#[test]
fn test_missing_file_fails_when_stream_opens() {
    let dir = tempdir().unwrap();
    let (_, mut files) = create_dummy_data(dir.path(), 2);
    let missing = dir.path().join("missing.sst");
    files.push(missing.clone());
    // Construction does no I/O.
    let reader = SstFileSetReader::new(files);
    match reader.key_stream(None, None) {
        Err(SstReaderError::FileOpen { path, .. }) => assert_eq!(path, missing),
        Err(other) => panic!("unexpected error {other}"),
        Ok(_) => panic!("stream opened over a missing file"),
    }
}

#[test]
fn test_invalid_file_fails_when_stream_opens() {
    let dir = tempdir().unwrap();
    let bogus = dir.path().join("bogus.sst");
    std::fs::write(&bogus, vec![7u8; 4096]).unwrap();
    let reader = SstFileSetReader::new([&bogus]);
    assert!(matches!(
        reader.key_stream(None, None),
        Err(SstReaderError::FileOpen { .. })
    ));
    assert!(matches!(
        reader.estimated_total_keys(),
        Err(SstReaderError::FileOpen { .. })
    ));
}

#[test]
fn test_empty_file_set() {
    let reader = SstFileSetReader::new(Vec::<std::path::PathBuf>::new());
    let mut stream = reader.key_stream(None, None).unwrap();
    assert!(stream.is_closed());
    assert!(stream.next().is_none());
    stream.close().unwrap();
    assert_eq!(reader.estimated_total_keys().unwrap(), 0);
}

#[test]
fn test_empty_tables_in_file_set() {
    let dir = tempdir().unwrap();
    let empty = dir.path().join("empty.sst");
    SsTableBuilder::new(256).build(&empty).unwrap();
    let (keys, mut files) = create_dummy_data(dir.path(), 2);
    files.insert(1, empty);
    let stream = SstFileSetReader::new(files).key_stream(None, None).unwrap();
    assert_eq!(collect_keys(stream), expected_keys(&keys, None, None, false));
}

fn overlapping_files(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
    // older.sst holds the first versions; newer.sst rewrites "b" and "c" later on.
    let mut older = SsTableBuilder::new(256);
    older.put(b"a", 1, b"a1");
    older.put(b"b", 2, b"b1");
    older.put(b"c", 3, b"c1");
    older.build(dir.join("older.sst")).unwrap();
    let mut newer = SsTableBuilder::new(256);
    newer.put(b"b", 10, b"b2");
    newer.delete(b"c", 11);
    newer.put(b"d", 12, b"d2");
    newer.build(dir.join("newer.sst")).unwrap();
    vec![dir.join("newer.sst"), dir.join("older.sst")]
}

#[test]
fn test_duplicate_keys_are_yielded_once() {
    let dir = tempdir().unwrap();
    let files = overlapping_files(dir.path());
    let stream = SstFileSetReader::new(files.clone())
        .key_stream(None, None)
        .unwrap();
    // Standard iteration cannot see the delete of "c", so the older put still shows.
    assert_eq!(
        collect_keys(stream),
        [b"a".to_vec(), b"b".to_vec(), b"c".to_vec(), b"d".to_vec()]
    );

    for policy in [DuplicatePolicy::NewestSequence, DuplicatePolicy::LastListedFile] {
        let reader = SstFileSetReader::with_options(
            files.clone(),
            SstReaderOptions::default().with_duplicate_policy(policy),
        );
        assert_eq!(reader.key_stream(None, None).unwrap().count(), 4);
    }
}

#[test]
fn test_estimated_total_keys() {
    let dir = tempdir().unwrap();
    let (keys, files) = create_dummy_data(dir.path(), 3);
    let reader = SstFileSetReader::new(files);
    assert_eq!(reader.estimated_total_keys().unwrap(), keys.len() as u64);

    let files = overlapping_files(dir.path());
    assert_eq!(SstFileSetReader::new(files).estimated_total_keys().unwrap(), 6);
}
