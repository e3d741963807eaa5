//! Log file writing

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::{
    WeightedEdge, MAGIC_LINE, PROP_BLOCK_SIZE, PROP_FINAL_EDGES, PROP_FINAL_VERTICES,
    PROP_SECTION_EDGES, PROP_SECTION_VTX_TEMP, PROP_TEMP_VERTICES, PROP_TOTAL_OPERATIONS,
    SECTION_SENTINEL,
};
use crate::error::{DriverError, Result};

/// Default block size in u64 words (3 words per edge)
pub const DEFAULT_BLOCK_SIZE: u64 = 3 * 4096;

// Section offsets are zero-padded to this width so the header length does
// not depend on their value.
const OFFSET_DIGITS: usize = 20;

/// Accumulates an update stream and writes it out as a log file.
pub struct LogWriter {
    num_final_vertices: u64,
    num_final_edges: u64,
    block_size: u64,
    operations: Vec<WeightedEdge>,
    temporary_vertices: Vec<u64>,
}

impl LogWriter {
    pub fn new(num_final_vertices: u64, num_final_edges: u64) -> Self {
        Self {
            num_final_vertices,
            num_final_edges,
            block_size: DEFAULT_BLOCK_SIZE,
            operations: Vec::new(),
            temporary_vertices: Vec::new(),
        }
    }

    pub fn with_block_size(mut self, block_size: u64) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn push(&mut self, edge: WeightedEdge) {
        self.operations.push(edge);
    }

    pub fn extend(&mut self, edges: impl IntoIterator<Item = WeightedEdge>) {
        self.operations.extend(edges);
    }

    pub fn set_temporary_vertices(&mut self, vertices: Vec<u64>) {
        self.temporary_vertices = vertices;
    }

    pub fn num_operations(&self) -> u64 {
        self.operations.len() as u64
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if self.block_size < 3 {
            return Err(DriverError::Config(format!(
                "block size must be at least 3, got {}",
                self.block_size
            )));
        }

        let header = self.render_header();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        writer.write_all(header.as_bytes())?;

        // EDGES: blocks of parallel arrays
        let edges_per_block = (self.block_size / 3) as usize;
        for block in self.operations.chunks(edges_per_block) {
            writer.write_all(&(block.len() as u64).to_le_bytes())?;
            for edge in block {
                writer.write_all(&edge.source.to_le_bytes())?;
            }
            for edge in block {
                writer.write_all(&edge.destination.to_le_bytes())?;
            }
            for edge in block {
                writer.write_all(&edge.weight.to_le_bytes())?;
            }
        }

        // VTX_TEMP: flat id array
        for vertex in &self.temporary_vertices {
            writer.write_all(&vertex.to_le_bytes())?;
        }

        writer.flush()?;
        Ok(())
    }

    fn render_header(&self) -> String {
        // Two passes: render once with zeroed offsets to learn the header
        // length, then again with the real section offsets.
        let draft = self.render_header_with(0, 0);
        let header_len = draft.len() as u64;
        let edges_bytes = self.edges_section_len();
        self.render_header_with(header_len, header_len + edges_bytes)
    }

    fn render_header_with(&self, edges_offset: u64, vtx_offset: u64) -> String {
        let mut header = String::new();
        header.push_str(MAGIC_LINE);
        header.push('\n');
        let mut prop = |key: &str, value: String| {
            header.push_str(key);
            header.push_str(" = ");
            header.push_str(&value);
            header.push('\n');
        };
        prop(PROP_BLOCK_SIZE, self.block_size.to_string());
        prop(PROP_TOTAL_OPERATIONS, self.operations.len().to_string());
        prop(PROP_FINAL_EDGES, self.num_final_edges.to_string());
        prop(
            PROP_SECTION_EDGES,
            format!("{:0width$}", edges_offset, width = OFFSET_DIGITS),
        );
        prop(
            PROP_SECTION_VTX_TEMP,
            format!("{:0width$}", vtx_offset, width = OFFSET_DIGITS),
        );
        prop(PROP_FINAL_VERTICES, self.num_final_vertices.to_string());
        prop(
            PROP_TEMP_VERTICES,
            self.temporary_vertices.len().to_string(),
        );
        header.push_str(SECTION_SENTINEL);
        header.push('\n');
        header
    }

    fn edges_section_len(&self) -> u64 {
        let edges_per_block = self.block_size / 3;
        let full_blocks = self.operations.len() as u64 / edges_per_block;
        let tail = self.operations.len() as u64 % edges_per_block;
        let num_blocks = full_blocks + u64::from(tail > 0);
        num_blocks * 8 + self.operations.len() as u64 * 24
    }
}
