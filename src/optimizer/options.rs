// Copyright 2025 Stoolap Contributors
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

//! Compilation options
//!
//! Read once when a plan is compiled. Dead-CTE elimination has no switch: it
//! always runs.

use std::fmt;
use std::str::FromStr;

use crate::core::{Error, Result};

/// Minimum rows in one relation before a scan is split into partitions
pub const DEFAULT_PARALLEL_ROW_THRESHOLD: usize = 10_000;

/// Rows per partition when a scan is split
pub const DEFAULT_PARALLEL_CHUNK_SIZE: usize = 2048;

/// How much of the plan may run concurrently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParallelizationMode {
    /// Everything runs on the calling thread, CTEs in declaration order
    None,
    /// Independent CTEs of a level run concurrently and large scans are
    /// partitioned across worker threads
    #[default]
    Full,
}

impl fmt::Display for ParallelizationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParallelizationMode::None => write!(f, "none"),
            ParallelizationMode::Full => write!(f, "full"),
        }
    }
}

impl FromStr for ParallelizationMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "none" | "off" | "0" | "sequential" => Ok(ParallelizationMode::None),
            "full" | "on" | "1" | "parallel" => Ok(ParallelizationMode::Full),
            other => Err(Error::invalid_argument(format!(
                "unknown parallelization mode '{}'",
                other
            ))),
        }
    }
}

/// Options consumed by [`Executor::compile`](crate::executor::Executor::compile)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationOptions {
    /// Parallelization mode
    /// Default: Full
    pub parallelization: ParallelizationMode,

    /// Cache repeated deterministic subexpressions per row
    /// Default: true
    pub enable_cse: bool,

    /// Run independent CTEs of a level concurrently (only with Full)
    /// Default: true
    pub enable_cte_parallelization: bool,

    /// Minimum relation size before row partitions run in parallel
    /// Default: 10000
    pub parallel_row_threshold: usize,

    /// Rows per partition
    /// Default: 2048
    pub chunk_size: usize,

    /// Size of a dedicated worker pool; None uses the global rayon pool
    /// Default: None
    pub max_threads: Option<usize>,
}

impl Default for CompilationOptions {
    fn default() -> Self {
        Self {
            parallelization: ParallelizationMode::Full,
            enable_cse: true,
            enable_cte_parallelization: true,
            parallel_row_threshold: DEFAULT_PARALLEL_ROW_THRESHOLD,
            chunk_size: DEFAULT_PARALLEL_CHUNK_SIZE,
            max_threads: None,
        }
    }
}

impl CompilationOptions {
    /// Creates options with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Options with every concurrent path disabled
    pub fn sequential() -> Self {
        Self {
            parallelization: ParallelizationMode::None,
            ..Self::default()
        }
    }

    /// Set the parallelization mode
    pub fn with_parallelization(mut self, mode: ParallelizationMode) -> Self {
        self.parallelization = mode;
        self
    }

    /// Enable or disable common subexpression elimination
    pub fn with_cse(mut self, enabled: bool) -> Self {
        self.enable_cse = enabled;
        self
    }

    /// Enable or disable concurrent CTE levels
    pub fn with_cte_parallelization(mut self, enabled: bool) -> Self {
        self.enable_cte_parallelization = enabled;
        self
    }

    /// Set the partitioning threshold
    pub fn with_parallel_row_threshold(mut self, rows: usize) -> Self {
        self.parallel_row_threshold = rows;
        self
    }

    /// Set the partition size
    pub fn with_chunk_size(mut self, rows: usize) -> Self {
        self.chunk_size = rows.max(1);
        self
    }

    /// Run on a dedicated pool of `threads` workers
    pub fn with_max_threads(mut self, threads: usize) -> Self {
        self.max_threads = Some(threads.max(1));
        self
    }

    /// True if CTEs of one level may run concurrently
    #[inline]
    pub fn parallel_ctes(&self) -> bool {
        self.parallelization == ParallelizationMode::Full && self.enable_cte_parallelization
    }

    /// Parse a `key=value&key=value` option string
    ///
    /// Recognized keys: `parallel`, `cse`, `cte_parallel`, `row_threshold`,
    /// `chunk_size`, `threads`. Unknown keys and malformed values are errors.
    pub fn parse(options: &str) -> Result<Self> {
        let mut opts = Self::default();
        for param in options.split('&').filter(|p| !p.trim().is_empty()) {
            let mut parts = param.splitn(2, '=');
            let key = parts.next().unwrap_or("").trim();
            let value = parts.next().unwrap_or("").trim();

            match key {
                // parallel=none|full
                "parallel" | "parallelization" => {
                    opts.parallelization = value.parse()?;
                }
                // cse=on|off
                "cse" => {
                    opts.enable_cse = parse_flag(key, value)?;
                }
                // cte_parallel=on|off
                "cte_parallel" | "cte_parallelization" => {
                    opts.enable_cte_parallelization = parse_flag(key, value)?;
                }
                // row_threshold=10000
                "row_threshold" | "parallel_row_threshold" => {
                    opts.parallel_row_threshold = parse_count(key, value)?;
                }
                // chunk_size=2048
                "chunk_size" => {
                    opts.chunk_size = parse_count(key, value)?.max(1);
                }
                // threads=8, threads=auto
                "threads" | "max_threads" => {
                    opts.max_threads = if value.eq_ignore_ascii_case("auto") {
                        None
                    } else {
                        Some(parse_count(key, value)?.max(1))
                    };
                }
                other => {
                    return Err(Error::invalid_argument(format!(
                        "unknown compilation option '{}'",
                        other
                    )))
                }
            }
        }
        Ok(opts)
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "on" | "true" | "1" | "yes" => Ok(true),
        "off" | "false" | "0" | "no" => Ok(false),
        _ => Err(Error::invalid_argument(format!(
            "option '{}' expects on/off, got '{}'",
            key, value
        ))),
    }
}

fn parse_count(key: &str, value: &str) -> Result<usize> {
    value.parse::<usize>().map_err(|_| {
        Error::invalid_argument(format!(
            "option '{}' expects a non-negative integer, got '{}'",
            key, value
        ))
    })
}

impl FromStr for CompilationOptions {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
