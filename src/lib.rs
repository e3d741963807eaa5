//! agebench - aging benchmark driver for graph-update libraries
//!
//! # Architecture
//!
//! - **Update log**: binary file of insert/delete operations with a
//!   key=value header declaring the final graph's cardinalities
//! - **Aging driver**: master + worker pool replaying the log against a
//!   pluggable library, with per-edge ordering guaranteed by a symmetric
//!   partition hash
//! - **Build service**: background thread invoking the library's
//!   snapshot hook at a configured cadence
//! - **Validation**: the final vertex/edge counts are checked against the
//!   log and reported in the run's [`AgingResult`]
//!
//! # Usage example
//!
//! ```no_run
//! use std::sync::Arc;
//! use agebench::{AdjacencyList, AgingExperiment};
//!
//! # fn main() -> agebench::Result<()> {
//! let result = AgingExperiment::new()
//!     .library(Arc::new(AdjacencyList::undirected()))
//!     .log("updates.agelog")
//!     .parallelism_degree(8)
//!     .execute()?;
//! println!("{} edges in {} us", result.num_edges_final_graph, result.completion_time_us);
//! # Ok(())
//! # }
//! ```

pub mod driver;
pub mod error;
pub mod graphlog;
pub mod sut;

pub use driver::{AgingExperiment, AgingResult};
pub use error::{DriverError, Result};
pub use graphlog::{EdgeBatch, GraphlogReader, LogProperties, LogWriter, WeightedEdge};
pub use sut::{AdjacencyList, GraphInterface, UpdateInterface};
