//! Accumulated metrics of a single aging run

use serde::Serialize;

/// Everything a surrounding driver needs to persist about one run.
///
/// `reported_times` holds the elapsed microseconds at each progress
/// quantum; `latencies` the per-operation nanoseconds when latency
/// measurement was enabled, in worker order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AgingResult {
    pub num_operations_total: u64,
    pub num_artificial_vertices: u64,
    pub num_vertices_load: u64,
    pub num_edges_load: u64,
    pub num_vertices_final_graph: u64,
    pub num_edges_final_graph: u64,
    pub completion_time_us: u64,
    pub num_build_invocations: u64,
    pub reported_times: Vec<u64>,
    pub latencies: Vec<u64>,
    pub random_vertex_id: u64,
}

impl AgingResult {
    /// Whether the graph after the run matches the log's declared final
    /// cardinalities
    pub fn cardinality_match(&self) -> bool {
        self.num_vertices_final_graph == self.num_vertices_load
            && self.num_edges_final_graph == self.num_edges_load
    }
}
