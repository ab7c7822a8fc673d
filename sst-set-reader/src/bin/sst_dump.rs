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


use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use sst_set_reader::dump::{DumpRange, dump_table};
use sst_set_reader::table::SsTable;
use tracing_subscriber::EnvFilter;

/// Print the entries of a table file, delete markers included, in the raw scan format.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Table file to dump
    path: PathBuf,

    /// Hex encoded first key to dump (inclusive)
    #[arg(long, value_parser = parse_hex_key)]
    from: Option<HexKey>,

    /// Hex encoded key to stop at (exclusive)
    #[arg(long, value_parser = parse_hex_key)]
    to: Option<HexKey>,

    /// Print the footer properties to stderr once the dump is written
    #[arg(long)]
    show_properties: bool,
}

#[derive(Clone, Debug)]
struct HexKey(Vec<u8>);

fn parse_hex_key(s: &str) -> Result<HexKey, hex::FromHexError> {
    hex::decode(s).map(HexKey)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let range = DumpRange::new(
        args.from.as_ref().map(|key| key.0.as_slice()),
        args.to.as_ref().map(|key| key.0.as_slice()),
    );
    let entries = dump_table(&args.path, range, &mut out)
        .with_context(|| format!("failed to dump {}", args.path.display()))?;
    out.flush()?;
    tracing::debug!(path = %args.path.display(), entries, "dumped table");

    if args.show_properties {
        let table = SsTable::open(&args.path)?;
        let properties = table.properties();
        eprintln!(
            "entries: {}, tombstones: {}, max seq: {}, blocks: {}, size: {}",
            properties.num_entries,
            properties.num_tombstones,
            properties.max_seq,
            table.num_of_blocks(),
            table.table_size()
        );
    }
    Ok(())
}
