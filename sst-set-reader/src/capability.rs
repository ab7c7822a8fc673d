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


use std::ffi::OsString;
use std::path::PathBuf;

use once_cell::sync::OnceCell;

/// Environment switch enabling the raw tombstone scan (`1`, `true` or `on`).
pub const RAW_SCAN_ENV: &str = "SST_READER_RAW_SCAN";
/// Optional path to an external `sst-dump` executable used by the raw scan.
pub const DUMP_TOOL_ENV: &str = "SST_READER_DUMP_TOOL";

static DETECTED: OnceCell<RawScanCapability> = OnceCell::new();

/// Whether, and how, table files can be scanned below the standard iteration path so that
/// delete markers become visible.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum RawScanCapability {
    #[default]
    Unavailable,
    /// Dump tables with the dump facility linked into this process.
    InProcess,
    /// Spawn the given dump tool and parse its standard output.
    External(PathBuf),
}

impl RawScanCapability {
    pub fn unavailable() -> Self {
        Self::Unavailable
    }

    pub fn in_process() -> Self {
        Self::InProcess
    }

    pub fn external(tool: impl Into<PathBuf>) -> Self {
        Self::External(tool.into())
    }

    /// The capability of this process, detected from the environment on first use and cached for
    /// the lifetime of the process.
    pub fn detect() -> &'static RawScanCapability {
        DETECTED.get_or_init(|| {
            let capability = Self::from_settings(
                std::env::var(RAW_SCAN_ENV).ok().as_deref(),
                std::env::var_os(DUMP_TOOL_ENV),
            );
            tracing::debug!(?capability, "detected raw scan capability");
            capability
        })
    }

    pub(crate) fn from_settings(enabled: Option<&str>, tool: Option<OsString>) -> Self {
        let enabled = matches!(
            enabled.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
            Some("1" | "true" | "on")
        );
        if !enabled {
            return Self::Unavailable;
        }
        match tool.filter(|tool| !tool.is_empty()) {
            Some(tool) => {
                let tool = PathBuf::from(tool);
                if tool.is_file() {
                    Self::External(tool)
                } else {
                    tracing::warn!(tool = %tool.display(), "dump tool not found, raw scan disabled");
                    Self::Unavailable
                }
            }
            None => Self::InProcess,
        }
    }

    pub fn is_available(&self) -> bool {
        !matches!(self, Self::Unavailable)
    }
}

/// Check (once per process) whether raw tombstone scanning can be used.
pub fn try_load_capability() -> bool {
    RawScanCapability::detect().is_available()
}
