//! End-to-end driver tests
//!
//! Logs are generated into temporary directories and replayed against the
//! reference adjacency list, plain or wrapped in an interposer that
//! perturbs `add_edge` (refusals, silent drops, artificial latency).

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use super::interrupt::{self, InterruptGuard};
use super::worker::partition;
use super::*;
use crate::error::DriverError;
use crate::graphlog::{generate_log, GeneratorParams, LogWriter, WeightedEdge};
use crate::sut::{AdjacencyList, GraphInterface, UpdateInterface};

mod partitioning {
    use super::*;

    #[test]
    fn symmetric_under_endpoint_swap() {
        for num_workers in [1, 2, 3, 8, 13] {
            for a in 1..64u64 {
                for b in 1..64u64 {
                    assert_eq!(
                        partition(a, b, num_workers),
                        partition(b, a, num_workers),
                        "asymmetry for ({a}, {b}) over {num_workers} workers"
                    );
                }
            }
        }
    }

    #[test]
    fn stable_and_in_range() {
        for a in 1..200u64 {
            let b = a * 31 + 7;
            let w = partition(a, b, 8);
            assert!(w < 8);
            assert_eq!(w, partition(a, b, 8), "hash must be deterministic");
        }
    }

    #[test]
    fn spreads_across_workers() {
        let num_workers = 8;
        let mut counts = vec![0u64; num_workers];
        for a in 1..512u64 {
            for b in (a + 1)..(a + 17) {
                counts[partition(a, b, num_workers)] += 1;
            }
        }
        for (worker, &count) in counts.iter().enumerate() {
            assert!(count > 0, "worker {worker} never assigned");
        }
    }
}

/// Wraps the adjacency list, routing `add_edge` through an interposer.
struct InterposeAddEdge<F> {
    inner: AdjacencyList,
    interpose: F,
}

impl<F> InterposeAddEdge<F> {
    fn new(interpose: F) -> Self {
        Self {
            inner: AdjacencyList::undirected(),
            interpose,
        }
    }
}

impl<F: Send + Sync> GraphInterface for InterposeAddEdge<F> {
    fn is_directed(&self) -> bool {
        self.inner.is_directed()
    }

    fn num_vertices(&self) -> u64 {
        self.inner.num_vertices()
    }

    fn num_edges(&self) -> u64 {
        self.inner.num_edges()
    }

    fn has_vertex(&self, vertex: u64) -> bool {
        self.inner.has_vertex(vertex)
    }

    fn has_edge(&self, source: u64, destination: u64) -> bool {
        self.inner.has_edge(source, destination)
    }

    fn get_weight(&self, source: u64, destination: u64) -> Option<f64> {
        self.inner.get_weight(source, destination)
    }
}

impl<F> UpdateInterface for InterposeAddEdge<F>
where
    F: Fn(&AdjacencyList, WeightedEdge) -> crate::error::Result<bool> + Send + Sync,
{
    fn add_vertex(&self, vertex: u64) -> crate::error::Result<bool> {
        self.inner.add_vertex(vertex)
    }

    fn remove_vertex(&self, vertex: u64) -> crate::error::Result<bool> {
        self.inner.remove_vertex(vertex)
    }

    fn add_edge(&self, edge: WeightedEdge) -> crate::error::Result<bool> {
        (self.interpose)(&self.inner, edge)
    }

    fn remove_edge(&self, source: u64, destination: u64) -> crate::error::Result<bool> {
        self.inner.remove_edge(source, destination)
    }

    fn build(&self) -> crate::error::Result<()> {
        self.inner.build()
    }
}

fn small_log(dir: &TempDir) -> (PathBuf, crate::graphlog::GeneratedLog) {
    let path = dir.path().join("updates.agelog");
    let params = GeneratorParams {
        num_vertices: 256,
        num_final_edges: 512,
        num_temporary_vertices: 32,
        ops_multiplier: 4,
        seed: 99,
        ..GeneratorParams::default()
    };
    let summary = generate_log(&path, &params).unwrap();
    (path, summary)
}

#[test]
fn parallel_run_matches_declared_cardinalities() {
    let dir = TempDir::new().unwrap();
    let (path, summary) = small_log(&dir);

    let sut = Arc::new(AdjacencyList::undirected());
    let result = AgingExperiment::new()
        .library(Arc::clone(&sut) as Arc<dyn UpdateInterface>)
        .log(&path)
        .parallelism_degree(8)
        .execute()
        .unwrap();

    assert_eq!(result.num_operations_total, summary.num_operations);
    assert_eq!(result.num_edges_load, summary.num_final_edges);
    assert_eq!(result.num_vertices_load, summary.num_final_vertices);
    assert!(result.cardinality_match(), "{result:?}");
    assert_eq!(result.num_edges_final_graph, sut.num_edges());
    assert_ne!(result.random_vertex_id, 0);
    assert_eq!(result.num_artificial_vertices, summary.num_temporary_vertices);
}

#[test]
fn two_runs_are_deterministic() {
    let dir = TempDir::new().unwrap();
    let (path, _) = small_log(&dir);

    let run = || {
        AgingExperiment::new()
            .library(Arc::new(AdjacencyList::undirected()))
            .log(&path)
            .parallelism_degree(4)
            .execute()
            .unwrap()
    };
    let first = run();
    let second = run();

    assert_eq!(first.num_vertices_final_graph, second.num_vertices_final_graph);
    assert_eq!(first.num_edges_final_graph, second.num_edges_final_graph);
    assert_eq!(first.random_vertex_id, second.random_vertex_id);
}

#[test]
fn random_vertex_comes_from_first_insertion_even_past_batch_zero() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("deletion-led.agelog");

    // one edge per block: the whole first batch is a deletion, so the
    // scan must carry on into the later batches
    let mut writer = LogWriter::new(3, 2).with_block_size(3);
    writer.push(WeightedEdge::deletion(5, 6));
    writer.push(WeightedEdge::new(1, 2, 0.5));
    writer.push(WeightedEdge::new(2, 3, 0.75));
    writer.write(&path).unwrap();

    let result = AgingExperiment::new()
        .library(Arc::new(AdjacencyList::undirected()))
        .log(&path)
        .execute()
        .unwrap();

    assert_eq!(result.random_vertex_id, 1, "{result:?}");
    assert!(result.cardinality_match(), "{result:?}");
}

#[test]
fn empty_log_yields_empty_result() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.agelog");
    LogWriter::new(0, 0).write(&path).unwrap();

    let result = AgingExperiment::new()
        .library(Arc::new(AdjacencyList::undirected()))
        .log(&path)
        .parallelism_degree(2)
        .execute()
        .unwrap();

    assert_eq!(result.num_operations_total, 0);
    assert_eq!(result.num_build_invocations, 0);
    assert_eq!(result.num_vertices_final_graph, 0);
    assert_eq!(result.num_edges_final_graph, 0);
    assert!(result.reported_times.is_empty());
    assert!(result.latencies.is_empty());
}

#[test]
fn latency_vector_covers_every_operation() {
    let dir = TempDir::new().unwrap();
    let (path, summary) = small_log(&dir);

    let result = AgingExperiment::new()
        .library(Arc::new(AdjacencyList::undirected()))
        .log(&path)
        .parallelism_degree(4)
        .measure_latency(true)
        .execute()
        .unwrap();

    assert_eq!(result.latencies.len() as u64, summary.num_operations);
}

#[test]
fn reported_times_are_monotonic() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("updates.agelog");
    let params = GeneratorParams {
        num_vertices: 128,
        num_final_edges: 256,
        num_temporary_vertices: 16,
        ops_multiplier: 8,
        seed: 3,
        ..GeneratorParams::default()
    };
    let summary = generate_log(&path, &params).unwrap();

    let reports_per_ops = 4u64;
    let result = AgingExperiment::new()
        .library(Arc::new(AdjacencyList::undirected()))
        .log(&path)
        .parallelism_degree(4)
        .worker_granularity(64)
        .num_reports_per_ops(reports_per_ops)
        .execute()
        .unwrap();

    let quantum = (summary.num_final_edges / reports_per_ops).max(1);
    let rounds = (summary.num_operations + summary.num_final_edges - 1) / summary.num_final_edges;
    let num_slots = rounds * reports_per_ops + 1;
    let expected = (summary.num_operations / quantum).min(num_slots);
    assert_eq!(result.reported_times.len() as u64, expected);
    assert!(result.reported_times.len() as u64 >= (summary.num_operations / summary.num_final_edges) * reports_per_ops);

    for window in result.reported_times.windows(2) {
        assert!(window[0] <= window[1], "{:?}", result.reported_times);
    }
}

#[test]
fn build_service_runs_at_cadence_without_losing_updates() {
    let dir = TempDir::new().unwrap();
    let (path, _) = small_log(&dir);

    // an artificially slow insert path stretches the run over many cadences
    let sut = Arc::new(InterposeAddEdge::new(|inner: &AdjacencyList, edge| {
        std::thread::sleep(Duration::from_micros(20));
        inner.add_edge(edge)
    }));
    let result = AgingExperiment::new()
        .library(Arc::clone(&sut) as Arc<dyn UpdateInterface>)
        .log(&path)
        .parallelism_degree(2)
        .build_frequency(Duration::from_millis(1))
        .execute()
        .unwrap();

    assert!(result.num_build_invocations >= 1, "{result:?}");
    assert!(result.cardinality_match(), "{result:?}");
    // the service's builds plus the two explicit flushes
    assert!(sut.inner.num_build_invocations() >= result.num_build_invocations + 2);
}

#[test]
fn refused_insertions_are_retried_to_completion() {
    let dir = TempDir::new().unwrap();
    let (path, _) = small_log(&dir);

    // refuse roughly every tenth edge on its first attempt
    let refused = dashmap::DashSet::new();
    let sut = Arc::new(InterposeAddEdge::new(move |inner: &AdjacencyList, edge: WeightedEdge| {
        let key = (
            edge.source.min(edge.destination),
            edge.source.max(edge.destination),
        );
        if (key.0 ^ key.1) % 10 == 0 && refused.insert(key) {
            return Ok(false);
        }
        inner.add_edge(edge)
    }));

    let result = AgingExperiment::new()
        .library(sut as Arc<dyn UpdateInterface>)
        .log(&path)
        .parallelism_degree(8)
        .execute()
        .unwrap();

    assert!(result.cardinality_match(), "{result:?}");
}

#[test]
fn permanently_refused_insertion_fails_the_run() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tiny.agelog");
    let mut writer = LogWriter::new(2, 1);
    writer.push(WeightedEdge::new(1, 2, 1.0));
    writer.write(&path).unwrap();

    let sut = Arc::new(InterposeAddEdge::new(|_: &AdjacencyList, _| Ok(false)));
    let err = AgingExperiment::new()
        .library(sut as Arc<dyn UpdateInterface>)
        .log(&path)
        .execute()
        .unwrap_err();

    assert!(matches!(err, DriverError::RetryLimit { edge_source: 1, destination: 2, .. }), "{err}");
}

#[test]
fn silently_dropped_edges_are_reported_as_mismatch() {
    let dir = TempDir::new().unwrap();
    let (path, _) = small_log(&dir);

    let calls = AtomicU64::new(0);
    let sut = Arc::new(InterposeAddEdge::new(move |inner: &AdjacencyList, edge| {
        if calls.fetch_add(1, Ordering::AcqRel) % 10 == 9 {
            return Ok(true); // claim success, store nothing
        }
        inner.add_edge(edge)
    }));

    let result = AgingExperiment::new()
        .library(sut as Arc<dyn UpdateInterface>)
        .log(&path)
        .parallelism_degree(1)
        .execute()
        .unwrap();

    assert!(!result.cardinality_match());
    assert!(result.num_edges_final_graph < result.num_edges_load, "{result:?}");
}

mod config_validation {
    use super::*;

    fn expect_config_error(experiment: AgingExperiment) {
        match experiment.execute() {
            Err(DriverError::Config(_)) => {}
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn missing_library() {
        expect_config_error(AgingExperiment::new().log("whatever.agelog"));
    }

    #[test]
    fn missing_log() {
        expect_config_error(AgingExperiment::new().library(Arc::new(AdjacencyList::undirected())));
    }

    #[test]
    fn zero_threads() {
        expect_config_error(
            AgingExperiment::new()
                .library(Arc::new(AdjacencyList::undirected()))
                .log("whatever.agelog")
                .parallelism_degree(0),
        );
    }

    #[test]
    fn zero_reports_per_ops() {
        expect_config_error(
            AgingExperiment::new()
                .library(Arc::new(AdjacencyList::undirected()))
                .log("whatever.agelog")
                .num_reports_per_ops(0),
        );
    }

    #[test]
    fn unreadable_log_fails_before_spawning_workers() {
        let err = AgingExperiment::new()
            .library(Arc::new(AdjacencyList::undirected()))
            .log("/nonexistent/updates.agelog")
            .execute()
            .unwrap_err();
        assert!(matches!(err, DriverError::Io(_)), "{err}");
    }
}

mod interruption {
    use super::*;

    // Concurrently running driver tests also take the registry, so grab
    // it with a retry loop instead of failing on contention.
    fn install_eventually(flag: Arc<AtomicBool>) -> InterruptGuard {
        loop {
            match InterruptGuard::install(Arc::clone(&flag)) {
                Ok(guard) => return guard,
                Err(_) => std::thread::yield_now(),
            }
        }
    }

    #[test]
    fn single_registration_only() {
        let first = install_eventually(Arc::new(AtomicBool::new(false)));
        let second = InterruptGuard::install(Arc::new(AtomicBool::new(false)));
        assert!(matches!(second, Err(DriverError::InterruptBusy)));
        drop(first);

        // the slot frees up once the guard goes out of scope
        let third = install_eventually(Arc::new(AtomicBool::new(false)));
        drop(third);
    }

    #[test]
    fn request_stop_reaches_the_registered_flag() {
        let flag = Arc::new(AtomicBool::new(false));
        let guard = install_eventually(Arc::clone(&flag));
        assert!(interrupt::request_stop());
        assert!(flag.load(Ordering::Acquire));
        drop(guard);
    }
}
