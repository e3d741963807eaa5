//! Reference system under test: a concurrent in-memory adjacency list
//!
//! Sharded by vertex via `DashMap`; an undirected edge is mirrored into
//! both endpoints' lists so lookups work from either side. The structure
//! is deliberately simple — it exists to validate the driver and to give
//! plugged-in libraries a behavioral baseline, not to win benchmarks.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{GraphInterface, UpdateInterface};
use crate::error::Result;
use crate::graphlog::WeightedEdge;

#[derive(Debug, Default)]
struct VertexEntry {
    /// Outgoing `(neighbour, weight)` pairs; holds both directions of an
    /// undirected edge
    out: Vec<(u64, f64)>,
    /// Sources of incoming edges, tracked only for directed graphs so
    /// `remove_vertex` can detach them
    inc: Vec<u64>,
}

pub struct AdjacencyList {
    directed: bool,
    vertices: DashMap<u64, VertexEntry>,
    num_edges: AtomicU64,
    build_invocations: AtomicU64,
}

impl AdjacencyList {
    pub fn new(directed: bool) -> Self {
        Self {
            directed,
            vertices: DashMap::new(),
            num_edges: AtomicU64::new(0),
            build_invocations: AtomicU64::new(0),
        }
    }

    pub fn undirected() -> Self {
        Self::new(false)
    }

    /// How many times `build()` has been invoked
    pub fn num_build_invocations(&self) -> u64 {
        self.build_invocations.load(Ordering::Acquire)
    }

    fn detach_from(&self, neighbour: u64, vertex: u64) {
        if let Some(mut entry) = self.vertices.get_mut(&neighbour) {
            entry.out.retain(|&(dst, _)| dst != vertex);
            entry.inc.retain(|&src| src != vertex);
        }
    }
}

impl GraphInterface for AdjacencyList {
    fn is_directed(&self) -> bool {
        self.directed
    }

    fn num_vertices(&self) -> u64 {
        self.vertices.len() as u64
    }

    fn num_edges(&self) -> u64 {
        self.num_edges.load(Ordering::Acquire)
    }

    fn has_vertex(&self, vertex: u64) -> bool {
        self.vertices.contains_key(&vertex)
    }

    fn has_edge(&self, source: u64, destination: u64) -> bool {
        self.get_weight(source, destination).is_some()
    }

    fn get_weight(&self, source: u64, destination: u64) -> Option<f64> {
        let entry = self.vertices.get(&source)?;
        entry
            .out
            .iter()
            .find(|&&(dst, _)| dst == destination)
            .map(|&(_, weight)| weight)
    }
}

impl UpdateInterface for AdjacencyList {
    fn add_vertex(&self, vertex: u64) -> Result<bool> {
        match self.vertices.entry(vertex) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(VertexEntry::default());
                Ok(true)
            }
        }
    }

    fn remove_vertex(&self, vertex: u64) -> Result<bool> {
        let Some((_, entry)) = self.vertices.remove(&vertex) else {
            return Ok(false);
        };
        // Detach incident edges. Undirected edges are mirrored, so the out
        // list enumerates every incident edge exactly once.
        let mut detached = 0u64;
        for &(neighbour, _) in &entry.out {
            detached += 1;
            if neighbour != vertex {
                self.detach_from(neighbour, vertex);
            }
        }
        if self.directed {
            for &source in &entry.inc {
                detached += 1;
                if source != vertex {
                    self.detach_from(source, vertex);
                }
            }
        }
        self.num_edges.fetch_sub(detached, Ordering::AcqRel);
        Ok(true)
    }

    fn add_edge(&self, edge: WeightedEdge) -> Result<bool> {
        let WeightedEdge {
            source,
            destination,
            weight,
        } = edge;

        // Both endpoints must exist first; the caller retries while the
        // other thread's add_vertex is still in flight.
        let inserted = {
            let Some(mut entry) = self.vertices.get_mut(&source) else {
                return Ok(false);
            };
            match entry.out.iter_mut().find(|(dst, _)| *dst == destination) {
                Some((_, stored)) => {
                    *stored = weight;
                    false
                }
                None => {
                    entry.out.push((destination, weight));
                    true
                }
            }
        };

        {
            let Some(mut entry) = self.vertices.get_mut(&destination) else {
                // Roll back so a retried insert starts from a clean slate.
                if inserted {
                    if let Some(mut entry) = self.vertices.get_mut(&source) {
                        entry.out.retain(|&(dst, _)| dst != destination);
                    }
                }
                return Ok(false);
            };
            if self.directed {
                if inserted {
                    entry.inc.push(source);
                }
            } else {
                match entry.out.iter_mut().find(|(dst, _)| *dst == source) {
                    Some((_, stored)) => *stored = weight,
                    None => entry.out.push((source, weight)),
                }
            }
        }

        if inserted {
            self.num_edges.fetch_add(1, Ordering::AcqRel);
        }
        Ok(true)
    }

    fn remove_edge(&self, source: u64, destination: u64) -> Result<bool> {
        let removed = {
            let Some(mut entry) = self.vertices.get_mut(&source) else {
                return Ok(false);
            };
            let before = entry.out.len();
            entry.out.retain(|&(dst, _)| dst != destination);
            entry.out.len() != before
        };
        if !removed {
            return Ok(false);
        }

        if let Some(mut entry) = self.vertices.get_mut(&destination) {
            if self.directed {
                entry.inc.retain(|&src| src != source);
            } else {
                entry.out.retain(|&(dst, _)| dst != source);
            }
        }
        self.num_edges.fetch_sub(1, Ordering::AcqRel);
        Ok(true)
    }

    fn build(&self) -> Result<()> {
        self.build_invocations.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}
