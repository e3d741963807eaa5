//! Memory-mapped log reading

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use super::{EdgeBatch, LogProperties, Section, PROP_BLOCK_SIZE, PROP_TEMP_VERTICES, PROP_TOTAL_OPERATIONS};
use crate::error::{DriverError, Result};

/// Read-only view over a log file
pub struct GraphlogReader {
    mmap: Mmap,
    properties: LogProperties,
}

impl GraphlogReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let mmap = unsafe { Mmap::map(&file)? };
        let (properties, _header_len) = LogProperties::parse(&mmap)?;
        Ok(Self { mmap, properties })
    }

    pub fn properties(&self) -> &LogProperties {
        &self.properties
    }

    /// Byte range of a binary section, validated against the file length
    fn section(&self, section: Section) -> Result<&[u8]> {
        let offset = self.properties.get_u64(section.offset_key())? as usize;
        if offset > self.mmap.len() {
            return Err(DriverError::InvalidFormat(format!(
                "section offset {offset} past end of file ({} bytes)",
                self.mmap.len()
            )));
        }
        Ok(&self.mmap[offset..])
    }

    /// Blockwise loader over the EDGES section
    pub fn edge_loader(&self) -> Result<EdgeLoader<'_>> {
        let remaining = self.properties.get_u64(PROP_TOTAL_OPERATIONS)?;
        let block_size = self.properties.get_u64(PROP_BLOCK_SIZE)?;
        if block_size < 3 {
            return Err(DriverError::InvalidFormat(format!(
                "block size {block_size} too small"
            )));
        }
        Ok(EdgeLoader {
            data: self.section(Section::Edges)?,
            cursor: 0,
            remaining,
            edges_per_block: block_size / 3,
        })
    }

    /// Read the full list of temporary vertex ids
    pub fn load_temporary_vertices(&self) -> Result<Vec<u64>> {
        let count = self.properties.get_u64(PROP_TEMP_VERTICES)? as usize;
        let data = self.section(Section::VtxTemp)?;
        let needed = count * 8;
        if data.len() < needed {
            return Err(DriverError::TruncatedLog {
                section: "VTX_TEMP",
                expected: needed,
                available: data.len(),
            });
        }
        let mut vertices = Vec::with_capacity(count);
        for i in 0..count {
            vertices.push(read_u64(data, i * 8));
        }
        Ok(vertices)
    }
}

/// Streams edge blocks out of the EDGES section.
///
/// Each block holds `n` logical triples as `n` sources, `n` destinations
/// and `n` weights; `n` never exceeds `block_size / 3`.
pub struct EdgeLoader<'a> {
    data: &'a [u8],
    cursor: usize,
    remaining: u64,
    edges_per_block: u64,
}

impl<'a> EdgeLoader<'a> {
    /// Fill `batch` with the next block.
    ///
    /// Returns `Ok(false)` once all declared operations have been read.
    pub fn load_into(&mut self, batch: &mut EdgeBatch) -> Result<bool> {
        batch.clear();
        if self.remaining == 0 {
            return Ok(false);
        }

        let num_edges = self.take_u64("EDGES")?;
        if num_edges == 0 || num_edges > self.edges_per_block || num_edges > self.remaining {
            return Err(DriverError::InvalidFormat(format!(
                "bad block header: {num_edges} edges (cap {}, {} outstanding)",
                self.edges_per_block, self.remaining
            )));
        }

        let n = num_edges as usize;
        self.ensure(n * 24, "EDGES")?;
        for i in 0..n {
            batch.sources.push(read_u64(self.data, self.cursor + i * 8));
        }
        self.cursor += n * 8;
        for i in 0..n {
            batch
                .destinations
                .push(read_u64(self.data, self.cursor + i * 8));
        }
        self.cursor += n * 8;
        for i in 0..n {
            batch
                .weights
                .push(f64::from_le_bytes(
                    self.data[self.cursor + i * 8..self.cursor + i * 8 + 8]
                        .try_into()
                        .unwrap(),
                ));
        }
        self.cursor += n * 8;

        self.remaining -= num_edges;
        Ok(true)
    }

    fn ensure(&self, bytes: usize, section: &'static str) -> Result<()> {
        let available = self.data.len().saturating_sub(self.cursor);
        if available < bytes {
            return Err(DriverError::TruncatedLog {
                section,
                expected: bytes,
                available,
            });
        }
        Ok(())
    }

    fn take_u64(&mut self, section: &'static str) -> Result<u64> {
        self.ensure(8, section)?;
        let value = read_u64(self.data, self.cursor);
        self.cursor += 8;
        Ok(value)
    }
}

fn read_u64(data: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(data[offset..offset + 8].try_into().unwrap())
}
