//! The aging driver
//!
//! Replays a pre-recorded insert/delete log against a pluggable graph
//! library with a pool of writer threads, an optional background build
//! service and quantized progress reporting, then validates the final
//! graph against the cardinalities declared in the log.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use agebench::{AdjacencyList, AgingExperiment};
//!
//! # fn main() -> agebench::Result<()> {
//! let result = AgingExperiment::new()
//!     .library(Arc::new(AdjacencyList::undirected()))
//!     .log("updates.agelog")
//!     .parallelism_degree(8)
//!     .build_frequency(Duration::from_millis(50))
//!     .measure_latency(true)
//!     .execute()?;
//! assert!(result.cardinality_match());
//! # Ok(())
//! # }
//! ```

mod build_service;
pub mod interrupt;
mod master;
mod result;
mod worker;

#[cfg(test)]
mod tests;

pub use result::AgingResult;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{DriverError, Result};
use crate::sut::UpdateInterface;

/// Operations a worker executes between two polls of the shared counters
pub const DEFAULT_WORKER_GRANULARITY: u64 = 1024;

/// Validated configuration handed to the master
pub(crate) struct ExperimentConfig {
    pub log_path: PathBuf,
    pub num_threads: usize,
    pub worker_granularity: u64,
    pub build_frequency: Duration,
    pub report_progress: bool,
    pub num_reports_per_ops: u64,
    pub measure_latency: bool,
}

/// Builder for a single aging run.
///
/// A library and a log path are required; everything else has defaults.
pub struct AgingExperiment {
    library: Option<Arc<dyn UpdateInterface>>,
    log_path: Option<PathBuf>,
    num_threads: usize,
    worker_granularity: u64,
    max_weight: f64,
    build_frequency: Duration,
    report_progress: bool,
    num_reports_per_ops: u64,
    measure_latency: bool,
}

impl Default for AgingExperiment {
    fn default() -> Self {
        Self {
            library: None,
            log_path: None,
            num_threads: 1,
            worker_granularity: DEFAULT_WORKER_GRANULARITY,
            max_weight: 1.0,
            build_frequency: Duration::ZERO,
            report_progress: false,
            num_reports_per_ops: 1,
            measure_latency: false,
        }
    }
}

impl AgingExperiment {
    pub fn new() -> Self {
        Self::default()
    }

    /// The library to evaluate
    pub fn library(mut self, library: Arc<dyn UpdateInterface>) -> Self {
        self.library = Some(library);
        self
    }

    /// Path to the update log
    pub fn log<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.log_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Number of writer threads
    pub fn parallelism_degree(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    /// Operations per worker chunk between progress polls
    pub fn worker_granularity(mut self, granularity: u64) -> Self {
        self.worker_granularity = granularity;
        self
    }

    /// Cap on generated edge weights. Recorded for log generation; the
    /// run itself does not consume it.
    pub fn max_weight(mut self, max_weight: f64) -> Self {
        self.max_weight = max_weight;
        self
    }

    /// Cadence of the background `build()` service; zero disables it
    pub fn build_frequency(mut self, frequency: Duration) -> Self {
        self.build_frequency = frequency;
        self
    }

    /// Emit a progress line whenever a quantum is crossed
    pub fn report_progress(mut self, enabled: bool) -> Self {
        self.report_progress = enabled;
        self
    }

    /// Progress samples per `num_edges_load` operations.
    ///
    /// With N = 1 progress is sampled after 1x, 2x, 3x ... the final edge
    /// count; with N = 4 after 0.25x, 0.5x, 0.75x, 1x ...
    pub fn num_reports_per_ops(mut self, reports: u64) -> Self {
        self.num_reports_per_ops = reports;
        self
    }

    /// Record one latency sample per operation
    pub fn measure_latency(mut self, enabled: bool) -> Self {
        self.measure_latency = enabled;
        self
    }

    /// Run the experiment with the current configuration.
    pub fn execute(&self) -> Result<AgingResult> {
        let library = self
            .library
            .as_ref()
            .cloned()
            .ok_or_else(|| DriverError::Config("no library to evaluate".into()))?;
        let log_path = self
            .log_path
            .clone()
            .ok_or_else(|| DriverError::Config("no update log set".into()))?;
        if self.num_threads == 0 {
            return Err(DriverError::Config("num_threads must be at least 1".into()));
        }
        if self.num_reports_per_ops == 0 {
            return Err(DriverError::Config(
                "num_reports_per_ops must be at least 1".into(),
            ));
        }
        if self.worker_granularity == 0 {
            return Err(DriverError::Config(
                "worker_granularity must be at least 1".into(),
            ));
        }
        if !(self.max_weight > 0.0) {
            return Err(DriverError::Config(format!(
                "max_weight must be positive, got {}",
                self.max_weight
            )));
        }

        let config = ExperimentConfig {
            log_path,
            num_threads: self.num_threads,
            worker_granularity: self.worker_granularity,
            build_frequency: self.build_frequency,
            report_progress: self.report_progress,
            num_reports_per_ops: self.num_reports_per_ops,
            measure_latency: self.measure_latency,
        };
        master::AgingMaster::new(library, config)?.execute()
    }
}
