//! Master orchestration of the aging experiment
//!
//! The master owns the log reader and the worker pool. A run proceeds in
//! phases: parse the log header, spawn workers, stream edge blocks into
//! the per-worker queues (double-buffered), drive the execute phase with
//! the build service running beside it, delete the temporary vertices,
//! then collect metrics and tear everything down.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;

use dashmap::DashSet;
use sysinfo::{MemoryRefreshKind, RefreshKind, System};

use super::build_service::BuildService;
use super::interrupt::InterruptGuard;
use super::result::AgingResult;
use super::worker::AgingWorker;
use super::ExperimentConfig;
use crate::error::{DriverError, Result};
use crate::graphlog::{
    EdgeBatch, GraphlogReader, PROP_FINAL_EDGES, PROP_FINAL_VERTICES, PROP_TEMP_VERTICES,
    PROP_TOTAL_OPERATIONS,
};
use crate::sut::UpdateInterface;

/// State shared between the master and the worker threads
pub(crate) struct SharedState {
    /// Operations finished against the SUT; retried attempts do not count
    pub completed_ops: AtomicU64,
    /// Operations appended to worker queues during the load phase
    pub ops_loaded: AtomicU64,
    /// Vertex ids already handed to `add_vertex`
    pub vertices_present: DashSet<u64>,
    pub measure_latency: bool,
    pub worker_granularity: u64,
    report_progress: bool,
    stop: Arc<AtomicBool>,
    time_start: OnceLock<Instant>,
    /// Operations per progress sample; zero disables reporting
    quantum: u64,
    num_operations_total: u64,
    /// Slot `i` holds the elapsed µs when bucket `i + 1` was claimed
    reported_times: Vec<AtomicU64>,
    last_reported_bucket: AtomicU64,
    claim_lock: Mutex<()>,
}

impl SharedState {
    pub fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Called by workers at every granularity boundary.
    ///
    /// The fast path is a pair of atomic loads. A worker that sees an
    /// unclaimed bucket takes the claim lock, re-checks, and stamps every
    /// newly crossed slot with the current elapsed time; stamping under
    /// the lock is what keeps `reported_times` non-decreasing. Losers
    /// return on the fast path without blocking.
    pub fn poll_progress(&self) {
        if self.quantum == 0 {
            return;
        }
        let completed = self.completed_ops.load(Ordering::Acquire);
        let bucket = (completed / self.quantum).min(self.reported_times.len() as u64);
        if bucket <= self.last_reported_bucket.load(Ordering::Acquire) {
            return;
        }

        let _claim = self.claim_lock.lock().unwrap();
        let last = self.last_reported_bucket.load(Ordering::Acquire);
        if bucket <= last {
            return;
        }
        let elapsed_us = self
            .time_start
            .get()
            .map(|start| start.elapsed().as_micros() as u64)
            .unwrap_or(0);
        for claimed in last + 1..=bucket {
            self.reported_times[(claimed - 1) as usize].store(elapsed_us, Ordering::Release);
        }
        self.last_reported_bucket.store(bucket, Ordering::Release);

        if self.report_progress {
            let percent =
                completed as f64 / self.num_operations_total.max(1) as f64 * 100.0;
            tracing::info!(completed, "progress: {percent:.1}%");
        }
    }
}

pub(crate) struct AgingMaster {
    config: ExperimentConfig,
    library: Arc<dyn UpdateInterface>,
    shared: Arc<SharedState>,
    workers: Vec<AgingWorker>,
    results: AgingResult,
    /// Tracks the on_main_init .. on_main_destroy bracket
    lifecycle_open: bool,
}

impl AgingMaster {
    pub fn new(library: Arc<dyn UpdateInterface>, config: ExperimentConfig) -> Result<Self> {
        let reader = GraphlogReader::open(&config.log_path)?;
        let properties = reader.properties();
        let mut results = AgingResult::default();
        results.num_artificial_vertices = properties.get_u64(PROP_TEMP_VERTICES)?;
        results.num_vertices_load = properties.get_u64(PROP_FINAL_VERTICES)?;
        results.num_edges_load = properties.get_u64(PROP_FINAL_EDGES)?;
        results.num_operations_total = properties.get_u64(PROP_TOTAL_OPERATIONS)?;
        drop(reader);

        // One progress sample every `quantum` operations. The slot count
        // follows from the log: R samples per num_edges_load operations,
        // rounded up over the whole run, plus a slack slot.
        let (quantum, num_slots) = if results.num_edges_load == 0 {
            (0, 0)
        } else {
            let quantum = (results.num_edges_load / config.num_reports_per_ops).max(1);
            let rounds = (results.num_operations_total + results.num_edges_load - 1)
                / results.num_edges_load;
            (quantum, (rounds * config.num_reports_per_ops + 1) as usize)
        };

        let shared = Arc::new(SharedState {
            completed_ops: AtomicU64::new(0),
            ops_loaded: AtomicU64::new(0),
            vertices_present: DashSet::new(),
            measure_latency: config.measure_latency,
            worker_granularity: config.worker_granularity,
            report_progress: config.report_progress,
            stop: Arc::new(AtomicBool::new(false)),
            time_start: OnceLock::new(),
            quantum,
            num_operations_total: results.num_operations_total,
            reported_times: (0..num_slots).map(|_| AtomicU64::new(0)).collect(),
            last_reported_bucket: AtomicU64::new(0),
            claim_lock: Mutex::new(()),
        });

        library.on_main_init(config.num_threads + 2)?;

        tracing::info!(num_threads = config.num_threads, "initialising workers");
        let mut workers = Vec::with_capacity(config.num_threads);
        for worker_id in 0..config.num_threads {
            match AgingWorker::spawn(
                worker_id,
                config.num_threads,
                Arc::clone(&library),
                Arc::clone(&shared),
            ) {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    workers.clear();
                    let _ = library.on_main_destroy();
                    return Err(e);
                }
            }
        }
        if let Err(e) = library.on_thread_init(config.num_threads) {
            workers.clear();
            let _ = library.on_main_destroy();
            return Err(e);
        }

        Ok(Self {
            config,
            library,
            shared,
            workers,
            results,
            lifecycle_open: true,
        })
    }

    pub fn execute(mut self) -> Result<AgingResult> {
        let guard = match InterruptGuard::install(self.shared.stop_flag()) {
            Ok(guard) => Some(guard),
            Err(DriverError::InterruptBusy) => {
                tracing::warn!(
                    "interrupt registry already taken; running without interruption support"
                );
                None
            }
            Err(e) => return Err(e),
        };

        let run = self.run_phases();
        drop(guard);
        let teardown = self.teardown();
        run?;
        teardown?;
        Ok(std::mem::take(&mut self.results))
    }

    fn run_phases(&mut self) -> Result<()> {
        self.load_edges()?;
        self.run_updates()?;
        self.remove_temporary_vertices()?;
        self.store_results();
        Ok(())
    }

    /// Stream edge blocks into the worker queues, double-buffered: the
    /// next block is read from the log while the workers partition the
    /// current one.
    fn load_edges(&mut self) -> Result<()> {
        tracing::info!(path = %self.config.log_path.display(), "loading the update log");
        let load_started = Instant::now();

        let reader = GraphlogReader::open(&self.config.log_path)?;
        let mut loader = reader.edge_loader()?;
        let mut front = Arc::new(EdgeBatch::default());
        let mut back = Arc::new(EdgeBatch::default());

        let mut available = loader.load_into(Arc::make_mut(&mut front))?;
        while available {
            for worker in &mut self.workers {
                worker.load_edges(Arc::clone(&front));
            }
            // keep scanning batches until the first insertion is found;
            // a leading block may hold only deletions
            if self.results.random_vertex_id == 0 {
                self.pick_random_vertex(&front);
            }

            available = loader.load_into(Arc::make_mut(&mut back))?;

            for worker in &mut self.workers {
                worker.wait()?;
            }
            std::mem::swap(&mut front, &mut back);
        }

        let loaded = self.shared.ops_loaded.load(Ordering::Acquire);
        if loaded != self.results.num_operations_total {
            return Err(DriverError::InvalidFormat(format!(
                "log declares {} operations but {loaded} were loaded",
                self.results.num_operations_total
            )));
        }

        tracing::info!(
            operations = loaded,
            elapsed = ?load_started.elapsed(),
            "update log loaded"
        );
        Ok(())
    }

    /// Seed `random_vertex_id` from the first insertion in `batch`, if any.
    fn pick_random_vertex(&mut self, batch: &EdgeBatch) {
        for edge in batch.iter() {
            if edge.is_insertion() {
                self.results.random_vertex_id = edge.source;
                return;
            }
        }
    }

    fn run_updates(&mut self) -> Result<()> {
        tracing::info!(num_threads = self.config.num_threads, "experiment started");
        let _ = self.shared.time_start.set(Instant::now());

        let build_service = BuildService::start(
            Arc::clone(&self.library),
            self.config.num_threads + 1,
            self.config.build_frequency,
        );

        let timer = Instant::now();
        for worker in &mut self.workers {
            worker.execute_updates();
        }
        let mut run = Ok(());
        for worker in &mut self.workers {
            let outcome = worker.wait();
            if run.is_ok() {
                run = outcome;
            }
        }
        let build_outcome = build_service.stop();
        run?;
        self.results.num_build_invocations = build_outcome?;

        // flush the residual delta before reading the clock
        self.library.build()?;
        self.results.completion_time_us = timer.elapsed().as_micros() as u64;

        tracing::info!(
            num_threads = self.config.num_threads,
            elapsed_us = self.results.completion_time_us,
            "updates completed"
        );
        Ok(())
    }

    fn remove_temporary_vertices(&mut self) -> Result<()> {
        let reader = GraphlogReader::open(&self.config.log_path)?;
        let vertices = Arc::new(reader.load_temporary_vertices()?);
        self.results.num_artificial_vertices = vertices.len() as u64;

        for worker in &mut self.workers {
            worker.remove_vertices(Arc::clone(&vertices));
        }
        let mut outcome = Ok(());
        for worker in &mut self.workers {
            let reply = worker.wait();
            if outcome.is_ok() {
                outcome = reply;
            }
        }
        outcome?;
        self.library.build()?;

        tracing::info!(
            num_temporary = vertices.len(),
            "temporary vertices removed"
        );
        Ok(())
    }

    fn store_results(&mut self) {
        self.results.num_vertices_final_graph = self.library.num_vertices();
        self.results.num_edges_final_graph = self.library.num_edges();

        let claimed = (self.shared.last_reported_bucket.load(Ordering::Acquire) as usize)
            .min(self.shared.reported_times.len());
        self.results.reported_times = self.shared.reported_times[..claimed]
            .iter()
            .map(|slot| slot.load(Ordering::Acquire))
            .collect();

        if self.config.measure_latency {
            let mut latencies = Vec::with_capacity(self.results.num_operations_total as usize);
            for worker in &self.workers {
                latencies.extend(worker.collect_latencies());
            }
            self.results.latencies = latencies;
        }

        self.log_cardinalities();
        self.log_memory_usage();
    }

    fn log_cardinalities(&self) {
        let r = &self.results;
        if r.cardinality_match() {
            tracing::info!(
                vertices = r.num_vertices_final_graph,
                edges = r.num_edges_final_graph,
                "final graph matches the log"
            );
        } else {
            tracing::warn!(
                vertices = r.num_vertices_final_graph,
                expected_vertices = r.num_vertices_load,
                edges = r.num_edges_final_graph,
                expected_edges = r.num_edges_load,
                "final graph does NOT match the log"
            );
        }
    }

    fn log_memory_usage(&self) {
        let mut system = System::new_with_specifics(
            RefreshKind::new().with_memory(MemoryRefreshKind::everything()),
        );
        system.refresh_memory();
        let total = system.total_memory();
        if total > 0 {
            tracing::debug!(
                used_mb = system.used_memory() / (1024 * 1024),
                total_mb = total / (1024 * 1024),
                "system memory after run"
            );
        }
    }

    fn teardown(&mut self) -> Result<()> {
        if !self.lifecycle_open {
            return Ok(());
        }
        self.lifecycle_open = false;

        let thread_destroy = self.library.on_thread_destroy(self.config.num_threads);
        // dropping a worker sends Shutdown and joins its thread
        self.workers.clear();
        let main_destroy = self.library.on_main_destroy();
        thread_destroy?;
        main_destroy
    }
}

impl Drop for AgingMaster {
    fn drop(&mut self) {
        if self.lifecycle_open {
            if let Err(e) = self.teardown() {
                tracing::warn!(error = %e, "teardown failed");
            }
        }
    }
}
