//! Capability boundary over the system under test
//!
//! The driver does not know which graph library it is exercising; it only
//! requires the update capability set below. Read-only accessors and the
//! thread lifecycle hooks live in [`GraphInterface`]; mutation and
//! snapshot building in [`UpdateInterface`]. A library that cannot update
//! simply does not implement the second trait, so "unsupported" is a type
//! error at the plug-in point rather than a failed downcast at run time.

pub mod adjacency_list;


pub use adjacency_list::AdjacencyList;

use crate::error::Result;
use crate::graphlog::WeightedEdge;

/// Read side and lifecycle of a pluggable graph library.
///
/// Lifecycle protocol: `on_main_init(n)` is called once with the total
/// number of threads that will touch the library; each of those threads
/// calls `on_thread_init(id)` with a distinct id in `[0, n)` from its own
/// thread of execution, and the matching `on_thread_destroy(id)` before it
/// exits; `on_main_destroy` closes the bracket.
pub trait GraphInterface: Send + Sync {
    fn on_main_init(&self, _expected_num_threads: usize) -> Result<()> {
        Ok(())
    }

    fn on_main_destroy(&self) -> Result<()> {
        Ok(())
    }

    fn on_thread_init(&self, _thread_id: usize) -> Result<()> {
        Ok(())
    }

    fn on_thread_destroy(&self, _thread_id: usize) -> Result<()> {
        Ok(())
    }

    fn is_directed(&self) -> bool;

    /// Only meaningful after all mutating threads have quiesced
    fn num_vertices(&self) -> u64;

    /// Only meaningful after all mutating threads have quiesced
    fn num_edges(&self) -> u64;

    fn has_vertex(&self, vertex: u64) -> bool;

    fn has_edge(&self, source: u64, destination: u64) -> bool;

    fn get_weight(&self, source: u64, destination: u64) -> Option<f64>;
}

/// Update capability required by the aging driver.
///
/// All mutations are safe to call concurrently from any thread that has
/// issued `on_thread_init` with a distinct id.
pub trait UpdateInterface: GraphInterface {
    /// Returns whether the vertex was absent before the call
    fn add_vertex(&self, vertex: u64) -> Result<bool>;

    /// Returns whether the vertex was present before the call
    fn remove_vertex(&self, vertex: u64) -> Result<bool>;

    /// Returns `Ok(false)` when the edge cannot be inserted *yet* because
    /// an endpoint vertex is still in flight on another thread; the caller
    /// is expected to retry.
    fn add_edge(&self, edge: WeightedEdge) -> Result<bool>;

    /// Returns whether the edge was present before the call
    fn remove_edge(&self, source: u64, destination: u64) -> Result<bool>;

    /// Materialize a new snapshot/delta. May be a no-op.
    fn build(&self) -> Result<()>;
}
