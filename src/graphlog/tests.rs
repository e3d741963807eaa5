//! Tests for the log format: header parsing, round-trips, error paths

use super::*;
use crate::error::DriverError;

use std::fs;

use tempfile::TempDir;

fn sample_ops() -> Vec<WeightedEdge> {
    vec![
        WeightedEdge::new(1, 2, 0.5),
        WeightedEdge::new(2, 3, 1.25),
        WeightedEdge::deletion(1, 2),
        WeightedEdge::new(1, 2, 2.0),
        WeightedEdge::new(4, 7, 0.125),
    ]
}

mod header {
    use super::*;

    #[test]
    fn parse_properties() {
        let data = format!(
            "{MAGIC_LINE}\nfoo = bar\ninternal.edges.cardinality = 42\n{SECTION_SENTINEL}\nbinary"
        );
        let (props, offset) = LogProperties::parse(data.as_bytes()).unwrap();
        assert_eq!(props.get("foo"), Some("bar"));
        assert_eq!(props.get_u64(PROP_TOTAL_OPERATIONS).unwrap(), 42);
        assert_eq!(&data.as_bytes()[offset..], b"binary");
    }

    #[test]
    fn rejects_bad_magic() {
        let data = format!("# not a log\n{SECTION_SENTINEL}\n");
        let err = LogProperties::parse(data.as_bytes()).unwrap_err();
        assert!(matches!(err, DriverError::InvalidFormat(_)));
    }

    #[test]
    fn rejects_missing_sentinel() {
        let data = format!("{MAGIC_LINE}\nfoo = bar\n");
        let err = LogProperties::parse(data.as_bytes()).unwrap_err();
        assert!(matches!(err, DriverError::InvalidFormat(_)));
    }

    #[test]
    fn missing_property_is_reported_by_name() {
        let props = LogProperties::default();
        match props.get_u64(PROP_FINAL_EDGES) {
            Err(DriverError::MissingProperty(key)) => assert_eq!(key, PROP_FINAL_EDGES),
            other => panic!("expected MissingProperty, got {other:?}"),
        }
    }
}

mod round_trip {
    use super::*;

    #[test]
    fn writer_to_reader() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("updates.agelog");

        let ops = sample_ops();
        let mut writer = LogWriter::new(5, 3).with_block_size(6); // 2 edges per block
        writer.extend(ops.clone());
        writer.set_temporary_vertices(vec![100, 101, 102]);
        writer.write(&path).unwrap();

        let reader = GraphlogReader::open(&path).unwrap();
        let props = reader.properties();
        assert_eq!(props.get_u64(PROP_TOTAL_OPERATIONS).unwrap(), 5);
        assert_eq!(props.get_u64(PROP_FINAL_EDGES).unwrap(), 3);
        assert_eq!(props.get_u64(PROP_FINAL_VERTICES).unwrap(), 5);
        assert_eq!(props.get_u64(PROP_TEMP_VERTICES).unwrap(), 3);

        let mut loader = reader.edge_loader().unwrap();
        let mut batch = EdgeBatch::default();
        let mut replayed = Vec::new();
        let mut blocks = 0;
        while loader.load_into(&mut batch).unwrap() {
            assert!(batch.len() <= 2, "block exceeds declared block size");
            replayed.extend(batch.iter());
            blocks += 1;
        }
        assert_eq!(blocks, 3); // 2 + 2 + 1
        assert_eq!(replayed, ops);

        assert_eq!(reader.load_temporary_vertices().unwrap(), vec![100, 101, 102]);
    }

    #[test]
    fn empty_log() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.agelog");
        LogWriter::new(0, 0).write(&path).unwrap();

        let reader = GraphlogReader::open(&path).unwrap();
        let mut loader = reader.edge_loader().unwrap();
        let mut batch = EdgeBatch::default();
        assert!(!loader.load_into(&mut batch).unwrap());
        assert!(reader.load_temporary_vertices().unwrap().is_empty());
    }

    #[test]
    fn truncated_edges_section() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("truncated.agelog");

        let mut writer = LogWriter::new(5, 3);
        writer.extend(sample_ops());
        writer.write(&path).unwrap();

        // chop off the tail of the file
        let data = fs::read(&path).unwrap();
        fs::write(&path, &data[..data.len() - 16]).unwrap();

        let reader = GraphlogReader::open(&path).unwrap();
        let mut loader = reader.edge_loader().unwrap();
        let mut batch = EdgeBatch::default();
        let err = loader.load_into(&mut batch).unwrap_err();
        assert!(matches!(err, DriverError::TruncatedLog { .. }), "{err}");
    }
}

mod generator {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn net_effect_matches_declared_cardinalities() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("generated.agelog");
        let params = GeneratorParams {
            num_vertices: 64,
            num_final_edges: 128,
            num_temporary_vertices: 16,
            ops_multiplier: 5,
            ..GeneratorParams::default()
        };
        let summary = generate_log(&path, &params).unwrap();

        let reader = GraphlogReader::open(&path).unwrap();
        assert_eq!(
            reader.properties().get_u64(PROP_TOTAL_OPERATIONS).unwrap(),
            summary.num_operations
        );

        // Replay the log sequentially and compute the net edge multiset.
        let mut live: HashMap<(u64, u64), f64> = HashMap::new();
        let mut loader = reader.edge_loader().unwrap();
        let mut batch = EdgeBatch::default();
        let mut first_op_is_insertion = None;
        while loader.load_into(&mut batch).unwrap() {
            for edge in batch.iter() {
                let key = (
                    edge.source.min(edge.destination),
                    edge.source.max(edge.destination),
                );
                if first_op_is_insertion.is_none() {
                    first_op_is_insertion = Some(edge.is_insertion());
                }
                if edge.is_insertion() {
                    live.insert(key, edge.weight);
                } else {
                    assert!(live.remove(&key).is_some(), "deletion of absent edge {key:?}");
                }
            }
        }

        assert_eq!(live.len() as u64, summary.num_final_edges);
        assert_eq!(first_op_is_insertion, Some(true));

        // No surviving edge touches a temporary vertex.
        let temp = reader.load_temporary_vertices().unwrap();
        assert_eq!(temp.len() as u64, params.num_temporary_vertices);
        for &(a, b) in live.keys() {
            assert!(!temp.contains(&a) && !temp.contains(&b));
        }
    }

    #[test]
    fn same_seed_same_log() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("a.agelog");
        let second = dir.path().join("b.agelog");
        let params = GeneratorParams::default();
        generate_log(&first, &params).unwrap();
        generate_log(&second, &params).unwrap();
        assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
    }

    #[test]
    fn rejects_impossible_density() {
        let dir = TempDir::new().unwrap();
        let params = GeneratorParams {
            num_vertices: 4,
            num_final_edges: 100,
            ..GeneratorParams::default()
        };
        let err = generate_log(dir.path().join("x.agelog"), &params).unwrap_err();
        assert!(matches!(err, DriverError::Config(_)));
    }
}
