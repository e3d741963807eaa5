//! Aging worker threads
//!
//! Each worker owns a queue of update operations and a dedicated OS
//! thread that blocks on a command channel fed by the master:
//!
//! ```text
//! Master                 Channel                    Worker Thread
//!   │                       │                            │
//!   ├─ load_edges() ───────►│ LoadEdges ────────────────►│ partition batch
//!   ├─ execute_updates() ──►│ ExecuteUpdates ───────────►│ drain queue → SUT
//!   ├─ remove_vertices() ──►│ RemoveVertices ───────────►│ delete its slice
//!   │◄── wait() ────────────│ done ◄─────────────────────│
//! ```
//!
//! Commands reply on a per-command channel, so the master can pipeline:
//! it sends a batch to every worker, reads the next batch from the log,
//! and only then waits for the replies.

use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use super::master::SharedState;
use crate::error::{DriverError, Result};
use crate::graphlog::{EdgeBatch, WeightedEdge};
use crate::sut::UpdateInterface;

/// Cap on attempts for a refused edge insertion. A refusal normally
/// resolves as soon as the other worker's vertex insert lands, so hitting
/// the cap means the SUT is stuck.
const MAX_ADD_EDGE_ATTEMPTS: u32 = 1 << 24;

/// In-place retries before a refused insertion is parked at the queue
/// tail. Re-enqueueing moves the op behind every outstanding op, including
/// later ops on the same edge, so it must stay the slow path for refusals
/// that outlive a vertex-insert race.
const IN_PLACE_RETRY_SPINS: u32 = 256;

/// A single update replayed against the SUT
#[derive(Debug, Clone, Copy)]
enum UpdateOp {
    AddEdge {
        source: u64,
        destination: u64,
        weight: f64,
    },
    RemoveEdge {
        source: u64,
        destination: u64,
    },
}

impl UpdateOp {
    fn from_edge(edge: WeightedEdge) -> Self {
        if edge.is_insertion() {
            UpdateOp::AddEdge {
                source: edge.source,
                destination: edge.destination,
                weight: edge.weight,
            }
        } else {
            UpdateOp::RemoveEdge {
                source: edge.source,
                destination: edge.destination,
            }
        }
    }
}

struct QueuedOp {
    op: UpdateOp,
    /// Latency slot: the op's load-order index within this worker
    slot: u64,
    attempts: u32,
}

enum WorkerCommand {
    LoadEdges {
        batch: Arc<EdgeBatch>,
        done: Sender<Result<()>>,
    },
    ExecuteUpdates {
        done: Sender<Result<()>>,
    },
    RemoveVertices {
        vertices: Arc<Vec<u64>>,
        done: Sender<Result<()>>,
    },
    CollectLatencies {
        response: Sender<Vec<u64>>,
    },
    Shutdown,
}

/// Handle to one worker thread, owned by the master
pub(crate) struct AgingWorker {
    worker_id: usize,
    command_tx: Sender<WorkerCommand>,
    pending: Vec<Receiver<Result<()>>>,
    thread: Option<JoinHandle<()>>,
}

impl AgingWorker {
    /// Spawn the worker thread and wait for its `on_thread_init` to land.
    pub fn spawn(
        worker_id: usize,
        num_workers: usize,
        library: Arc<dyn UpdateInterface>,
        shared: Arc<SharedState>,
    ) -> Result<Self> {
        let (command_tx, command_rx) = unbounded();
        let (ready_tx, ready_rx) = bounded(1);

        let thread = thread::spawn(move || {
            worker_main(worker_id, num_workers, library, shared, command_rx, ready_tx);
        });

        ready_rx
            .recv()
            .map_err(|_| DriverError::Sut(format!("worker {worker_id} died during init")))??;

        Ok(Self {
            worker_id,
            command_tx,
            pending: Vec::new(),
            thread: Some(thread),
        })
    }

    fn dispatch(&mut self, make: impl FnOnce(Sender<Result<()>>) -> WorkerCommand) {
        let (done_tx, done_rx) = bounded(1);
        self.pending.push(done_rx);
        let _ = self.command_tx.send(make(done_tx));
    }

    /// Asynchronously partition `batch`; pair with [`wait`](Self::wait).
    pub fn load_edges(&mut self, batch: Arc<EdgeBatch>) {
        self.dispatch(|done| WorkerCommand::LoadEdges { batch, done });
    }

    /// Asynchronously drain the local queue into the SUT.
    pub fn execute_updates(&mut self) {
        self.dispatch(|done| WorkerCommand::ExecuteUpdates { done });
    }

    /// Asynchronously delete this worker's round-robin slice of `vertices`.
    pub fn remove_vertices(&mut self, vertices: Arc<Vec<u64>>) {
        self.dispatch(|done| WorkerCommand::RemoveVertices { vertices, done });
    }

    /// Barrier: block until every outstanding command has replied.
    pub fn wait(&mut self) -> Result<()> {
        let mut outcome = Ok(());
        for done_rx in self.pending.drain(..) {
            let reply = match done_rx.recv() {
                Ok(reply) => reply,
                Err(_) => Err(DriverError::Sut(format!(
                    "worker {} exited before replying",
                    self.worker_id
                ))),
            };
            if outcome.is_ok() {
                outcome = reply;
            }
        }
        outcome
    }

    /// Fetch the worker's latency samples (empty when not measured).
    pub fn collect_latencies(&self) -> Vec<u64> {
        let (response_tx, response_rx) = bounded(1);
        let _ = self
            .command_tx
            .send(WorkerCommand::CollectLatencies {
                response: response_tx,
            });
        response_rx.recv().unwrap_or_default()
    }
}

impl Drop for AgingWorker {
    fn drop(&mut self) {
        let _ = self.command_tx.send(WorkerCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Deterministic worker assignment for an edge.
///
/// Symmetric under endpoint swap and independent of batch boundaries, so
/// every operation on the same undirected edge lands in the same worker's
/// FIFO queue. 64-bit multiplier-xor finalizer over the sorted endpoints.
pub(crate) fn partition(source: u64, destination: u64, num_workers: usize) -> usize {
    let (lo, hi) = if source <= destination {
        (source, destination)
    } else {
        (destination, source)
    };
    let mut h = lo
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add(hi.wrapping_mul(0xC2B2_AE3D_27D4_EB4F));
    h ^= h >> 33;
    h = h.wrapping_mul(0xFF51_AFD7_ED55_8CCD);
    h ^= h >> 33;
    h = h.wrapping_mul(0xC4CE_B9FE_1A85_EC53);
    h ^= h >> 33;
    (h % num_workers as u64) as usize
}

struct WorkerState {
    worker_id: usize,
    num_workers: usize,
    library: Arc<dyn UpdateInterface>,
    shared: Arc<SharedState>,
    queue: VecDeque<QueuedOp>,
    latencies: Vec<u64>,
}

fn worker_main(
    worker_id: usize,
    num_workers: usize,
    library: Arc<dyn UpdateInterface>,
    shared: Arc<SharedState>,
    command_rx: Receiver<WorkerCommand>,
    ready_tx: Sender<Result<()>>,
) {
    let init = library.on_thread_init(worker_id);
    let failed = init.is_err();
    let _ = ready_tx.send(init);
    if failed {
        return;
    }

    let mut state = WorkerState {
        worker_id,
        num_workers,
        library,
        shared,
        queue: VecDeque::new(),
        latencies: Vec::new(),
    };

    while let Ok(command) = command_rx.recv() {
        match command {
            WorkerCommand::LoadEdges { batch, done } => {
                let _ = done.send(state.load_edges(&batch));
            }
            WorkerCommand::ExecuteUpdates { done } => {
                let _ = done.send(state.execute_updates());
            }
            WorkerCommand::RemoveVertices { vertices, done } => {
                let _ = done.send(state.remove_vertices(&vertices));
            }
            WorkerCommand::CollectLatencies { response } => {
                let _ = response.send(std::mem::take(&mut state.latencies));
            }
            WorkerCommand::Shutdown => break,
        }
    }

    if let Err(e) = state.library.on_thread_destroy(worker_id) {
        tracing::warn!(worker_id, error = %e, "on_thread_destroy failed");
    }
}

impl WorkerState {
    /// Append this worker's share of `batch` to the local queue.
    fn load_edges(&mut self, batch: &EdgeBatch) -> Result<()> {
        let mut loaded = 0u64;
        for edge in batch.iter() {
            if partition(edge.source, edge.destination, self.num_workers) != self.worker_id {
                continue;
            }
            self.queue.push_back(QueuedOp {
                op: UpdateOp::from_edge(edge),
                slot: self.queue.len() as u64,
                attempts: 0,
            });
            loaded += 1;
        }
        self.shared.ops_loaded.fetch_add(loaded, Ordering::AcqRel);
        Ok(())
    }

    /// Drain the queue into the SUT in granularity-bounded bursts.
    fn execute_updates(&mut self) -> Result<()> {
        let measure = self.shared.measure_latency;
        if measure {
            self.latencies = vec![0; self.queue.len()];
        }
        let granularity = self.shared.worker_granularity.max(1);

        while !self.queue.is_empty() {
            for _ in 0..granularity {
                let Some(mut queued) = self.queue.pop_front() else {
                    break;
                };
                let started = measure.then(Instant::now);

                match queued.op {
                    UpdateOp::AddEdge {
                        source,
                        destination,
                        weight,
                    } => {
                        self.add_vertex_once(source)?;
                        self.add_vertex_once(destination)?;
                        let edge = WeightedEdge::new(source, destination, weight);

                        let mut accepted = self.library.add_edge(edge)?;
                        queued.attempts = queued.attempts.saturating_add(1);
                        // spin briefly: the endpoint vertex is usually a
                        // few instructions away from being visible
                        while !accepted && queued.attempts % IN_PLACE_RETRY_SPINS != 0 {
                            std::hint::spin_loop();
                            accepted = self.library.add_edge(edge)?;
                            queued.attempts = queued.attempts.saturating_add(1);
                        }

                        if !accepted {
                            if queued.attempts >= MAX_ADD_EDGE_ATTEMPTS {
                                return Err(DriverError::RetryLimit {
                                    edge_source: source,
                                    destination,
                                    attempts: queued.attempts,
                                });
                            }
                            self.queue.push_back(queued);
                            continue;
                        }
                    }
                    UpdateOp::RemoveEdge {
                        source,
                        destination,
                    } => {
                        self.library.remove_edge(source, destination)?;
                    }
                }

                if let Some(started) = started {
                    self.latencies[queued.slot as usize] = started.elapsed().as_nanos() as u64;
                }
                self.shared.completed_ops.fetch_add(1, Ordering::AcqRel);
            }

            self.shared.poll_progress();
            if self.shared.stopped() {
                self.queue.clear();
                break;
            }
        }

        self.shared.poll_progress();
        Ok(())
    }

    fn add_vertex_once(&self, vertex: u64) -> Result<()> {
        if self.shared.vertices_present.insert(vertex) {
            self.library.add_vertex(vertex)?;
        }
        Ok(())
    }

    /// Delete this worker's round-robin slice of the temporary vertices.
    fn remove_vertices(&mut self, vertices: &[u64]) -> Result<()> {
        let mut index = self.worker_id;
        while index < vertices.len() {
            self.library.remove_vertex(vertices[index])?;
            index += self.num_workers;
        }
        Ok(())
    }
}
