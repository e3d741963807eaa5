//! Binary update-log format ("agelog")
//!
//! A log file carries the pre-recorded sequence of edge insertions and
//! deletions that the aging driver replays against the system under test,
//! plus the list of temporary vertices to remove at the end of the run.
//!
//! Layout:
//! ```text
//! # agelog v1\n                      magic line
//! key = value\n                      UTF-8 property lines
//! ...
//! __BINARY_SECTIONS_FOLLOW\n        sentinel
//! [EDGES section]                    blocks of parallel arrays
//! [VTX_TEMP section]                 u64 vertex ids
//! ```
//!
//! Section byte offsets are recorded in the properties, so readers parse
//! the header once and seek straight to the section they need. All binary
//! integers are little-endian.

pub mod generator;
pub mod reader;
pub mod writer;

#[cfg(test)]
mod tests;

pub use generator::{generate_log, GeneratedLog, GeneratorParams};
pub use reader::{EdgeLoader, GraphlogReader};
pub use writer::LogWriter;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{DriverError, Result};

/// Magic first line identifying the format
pub const MAGIC_LINE: &str = "# agelog v1";

/// Line separating the textual header from the binary sections
pub const SECTION_SENTINEL: &str = "__BINARY_SECTIONS_FOLLOW";

// Required properties, written by the generator and consumed by the driver.
pub const PROP_TEMP_VERTICES: &str = "internal.vertices.temporary.cardinality";
pub const PROP_FINAL_VERTICES: &str = "internal.vertices.final.cardinality";
pub const PROP_FINAL_EDGES: &str = "internal.edges.final";
pub const PROP_TOTAL_OPERATIONS: &str = "internal.edges.cardinality";
pub const PROP_BLOCK_SIZE: &str = "internal.edges.block_size";
pub const PROP_SECTION_EDGES: &str = "internal.section.edges";
pub const PROP_SECTION_VTX_TEMP: &str = "internal.section.vtx_temp";

/// Binary sections of a log file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Edges,
    VtxTemp,
}

impl Section {
    /// Property key holding the section's byte offset
    pub fn offset_key(&self) -> &'static str {
        match self {
            Section::Edges => PROP_SECTION_EDGES,
            Section::VtxTemp => PROP_SECTION_VTX_TEMP,
        }
    }
}

/// A single update: insertion when `weight > 0`, deletion otherwise
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightedEdge {
    pub source: u64,
    pub destination: u64,
    pub weight: f64,
}

impl WeightedEdge {
    pub fn new(source: u64, destination: u64, weight: f64) -> Self {
        Self {
            source,
            destination,
            weight,
        }
    }

    /// Deletion marker: any non-positive weight
    pub fn deletion(source: u64, destination: u64) -> Self {
        Self {
            source,
            destination,
            weight: -1.0,
        }
    }

    pub fn is_insertion(&self) -> bool {
        self.weight > 0.0
    }
}

/// One block of updates in the parallel-array layout of the log
#[derive(Debug, Clone, Default)]
pub struct EdgeBatch {
    pub sources: Vec<u64>,
    pub destinations: Vec<u64>,
    pub weights: Vec<f64>,
}

impl EdgeBatch {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sources: Vec::with_capacity(capacity),
            destinations: Vec::with_capacity(capacity),
            weights: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn clear(&mut self) {
        self.sources.clear();
        self.destinations.clear();
        self.weights.clear();
    }

    pub fn get(&self, index: usize) -> WeightedEdge {
        WeightedEdge {
            source: self.sources[index],
            destination: self.destinations[index],
            weight: self.weights[index],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = WeightedEdge> + '_ {
        (0..self.len()).map(move |i| self.get(i))
    }
}

/// Key-value metadata parsed from a log header
#[derive(Debug, Clone, Default)]
pub struct LogProperties {
    entries: BTreeMap<String, String>,
}

impl LogProperties {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Fetch a required numeric property
    pub fn get_u64(&self, key: &str) -> Result<u64> {
        let raw = self
            .entries
            .get(key)
            .ok_or_else(|| DriverError::MissingProperty(key.to_string()))?;
        raw.parse::<u64>().map_err(|_| {
            DriverError::InvalidFormat(format!("property `{key}` is not an integer: `{raw}`"))
        })
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parse the textual header of a log file.
    ///
    /// Returns the properties and the byte offset of the first binary
    /// section (one past the sentinel line).
    pub fn parse(data: &[u8]) -> Result<(Self, usize)> {
        let mut properties = LogProperties::default();
        let mut cursor = 0usize;
        let mut first_line = true;

        loop {
            let rest = &data[cursor..];
            let end = rest
                .iter()
                .position(|&b| b == b'\n')
                .ok_or_else(|| DriverError::InvalidFormat("unterminated header".into()))?;
            let line = std::str::from_utf8(&rest[..end])
                .map_err(|_| DriverError::InvalidFormat("header is not valid UTF-8".into()))?;
            cursor += end + 1;

            if first_line {
                if line != MAGIC_LINE {
                    return Err(DriverError::InvalidFormat(format!(
                        "bad magic line: `{line}`"
                    )));
                }
                first_line = false;
                continue;
            }

            if line == SECTION_SENTINEL {
                return Ok((properties, cursor));
            }

            let (key, value) = line.split_once('=').ok_or_else(|| {
                DriverError::InvalidFormat(format!("malformed property line: `{line}`"))
            })?;
            properties.insert(key.trim(), value.trim());
        }
    }
}
