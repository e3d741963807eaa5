//! Seeded aging-workload generation
//!
//! Produces a log whose net effect is a known final graph: every final
//! edge is inserted exactly once, and the remaining operations are
//! insert/delete pairs over "churn" edges that cancel out. Temporary
//! vertices only ever appear in churn edges, so removing them at the end
//! of a run restores the declared final vertex cardinality.

use std::collections::HashSet;
use std::path::Path;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::{writer::DEFAULT_BLOCK_SIZE, LogWriter, WeightedEdge};
use crate::error::{DriverError, Result};

/// Parameters for [`generate_log`]
#[derive(Debug, Clone)]
pub struct GeneratorParams {
    /// Vertex id space of the final graph: ids `1..=num_vertices`
    pub num_vertices: u64,
    /// Number of distinct undirected edges in the final graph
    pub num_final_edges: u64,
    /// Extra vertices used only by churn edges, removed at end of run
    pub num_temporary_vertices: u64,
    /// Total operations ≈ `ops_multiplier × num_final_edges`
    pub ops_multiplier: u64,
    /// Upper bound for generated insertion weights
    pub max_weight: f64,
    /// RNG seed; equal seeds produce byte-identical logs
    pub seed: u64,
    /// Block size of the emitted log, in u64 words
    pub block_size: u64,
}

impl Default for GeneratorParams {
    fn default() -> Self {
        Self {
            num_vertices: 1024,
            num_final_edges: 2048,
            num_temporary_vertices: 128,
            ops_multiplier: 4,
            max_weight: 1.0,
            seed: 7,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

/// Summary of a generated log
#[derive(Debug, Clone, Copy)]
pub struct GeneratedLog {
    pub num_final_vertices: u64,
    pub num_final_edges: u64,
    pub num_operations: u64,
    pub num_temporary_vertices: u64,
}

/// Generate an aging log at `path`.
pub fn generate_log<P: AsRef<Path>>(path: P, params: &GeneratorParams) -> Result<GeneratedLog> {
    validate(params)?;

    let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
    let num_vertices = params.num_vertices;
    let num_final_edges = params.num_final_edges;
    let id_space = num_vertices + params.num_temporary_vertices;

    // Final graph: distinct undirected edges over the non-temporary ids.
    let mut seen: HashSet<(u64, u64)> = HashSet::new();
    let mut final_edges = Vec::with_capacity(num_final_edges as usize);
    while (final_edges.len() as u64) < num_final_edges {
        if let Some(pair) = sample_pair(&mut rng, num_vertices, &seen) {
            seen.insert(pair);
            final_edges.push(pair);
        }
    }

    // Churn: insert/delete pairs over the whole id space, distinct from
    // the final edges and from each other.
    let target_ops = num_final_edges * params.ops_multiplier;
    let num_churn = target_ops.saturating_sub(num_final_edges) / 2;
    let mut churn_edges = Vec::with_capacity(num_churn as usize);
    while (churn_edges.len() as u64) < num_churn {
        if let Some(pair) = sample_pair(&mut rng, id_space, &seen) {
            seen.insert(pair);
            churn_edges.push(pair);
        }
    }

    // Interleave with random sort keys. A churn deletion draws its key
    // from the interval above its insertion's key, which preserves
    // insert-before-delete in the emitted log order.
    let mut keyed: Vec<(f64, WeightedEdge)> =
        Vec::with_capacity((num_final_edges + num_churn * 2) as usize);
    for &(a, b) in &final_edges {
        keyed.push((rng.gen::<f64>(), insertion(&mut rng, a, b, params.max_weight)));
    }
    for &(a, b) in &churn_edges {
        let key_insert = rng.gen::<f64>();
        let key_delete = key_insert + rng.gen::<f64>() * (1.0 - key_insert);
        keyed.push((key_insert, insertion(&mut rng, a, b, params.max_weight)));
        keyed.push((key_delete, WeightedEdge::deletion(a, b)));
    }
    keyed.sort_by(|x, y| x.0.partial_cmp(&y.0).unwrap_or(std::cmp::Ordering::Equal));

    // Declared final vertex cardinality: every non-temporary endpoint that
    // an insertion touches survives the temporary-vertex cleanup.
    let mut final_vertices: HashSet<u64> = HashSet::new();
    for (_, edge) in &keyed {
        if edge.is_insertion() {
            if edge.source <= num_vertices {
                final_vertices.insert(edge.source);
            }
            if edge.destination <= num_vertices {
                final_vertices.insert(edge.destination);
            }
        }
    }

    let mut writer = LogWriter::new(final_vertices.len() as u64, num_final_edges)
        .with_block_size(params.block_size);
    writer.extend(keyed.into_iter().map(|(_, edge)| edge));
    writer.set_temporary_vertices((num_vertices + 1..=id_space).collect());
    let num_operations = writer.num_operations();
    writer.write(path)?;

    Ok(GeneratedLog {
        num_final_vertices: final_vertices.len() as u64,
        num_final_edges,
        num_operations,
        num_temporary_vertices: params.num_temporary_vertices,
    })
}

fn validate(params: &GeneratorParams) -> Result<()> {
    if params.num_vertices < 2 {
        return Err(DriverError::Config("need at least two vertices".into()));
    }
    if params.ops_multiplier == 0 {
        return Err(DriverError::Config("ops multiplier must be positive".into()));
    }
    if !(params.max_weight > 0.0) {
        return Err(DriverError::Config(format!(
            "max weight must be positive, got {}",
            params.max_weight
        )));
    }
    let max_pairs = params.num_vertices * (params.num_vertices - 1) / 2;
    if params.num_final_edges > max_pairs {
        return Err(DriverError::Config(format!(
            "{} final edges do not fit in a graph of {} vertices",
            params.num_final_edges, params.num_vertices
        )));
    }
    let id_space = params.num_vertices + params.num_temporary_vertices;
    let churn = params.num_final_edges * params.ops_multiplier.saturating_sub(1) / 2;
    if params.num_final_edges + churn > id_space * (id_space - 1) / 2 {
        return Err(DriverError::Config(
            "id space too small for the requested churn volume".into(),
        ));
    }
    Ok(())
}

fn sample_pair(rng: &mut ChaCha8Rng, id_space: u64, seen: &HashSet<(u64, u64)>) -> Option<(u64, u64)> {
    let a = rng.gen_range(1..=id_space);
    let b = rng.gen_range(1..=id_space);
    if a == b {
        return None;
    }
    let pair = (a.min(b), a.max(b));
    if seen.contains(&pair) {
        None
    } else {
        Some(pair)
    }
}

fn insertion(rng: &mut ChaCha8Rng, source: u64, destination: u64, max_weight: f64) -> WeightedEdge {
    let weight = loop {
        let w = rng.gen::<f64>() * max_weight;
        if w > 0.0 {
            break w;
        }
    };
    WeightedEdge::new(source, destination, weight)
}
