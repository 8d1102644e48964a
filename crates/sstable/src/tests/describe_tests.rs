use super::*;
use crate::*;
use anyhow::Result;
use std::collections::BTreeSet;
use tempfile::tempdir;

/// Records field names, descending into nested records with a dotted path.
#[derive(Default)]
struct NameRecorder {
    prefix: String,
    names: Vec<String>,
}

impl FieldVisitor for NameRecorder {
    fn visit_field(&mut self, name: &'static str, value: FieldValue<'_>) {
        let full = format!("{}{}", self.prefix, name);
        self.names.push(full.clone());
        if let FieldValue::Array(items) = value {
            for item in items {
                if let FieldValue::Record(record) = item {
                    let mut nested = NameRecorder {
                        prefix: format!("{}.", full),
                        names: Vec::new(),
                    };
                    record.describe(&mut nested);
                    self.names.extend(nested.names);
                }
            }
        }
    }
}

fn names_of(block: &dyn Describe) -> Vec<String> {
    let mut recorder = NameRecorder::default();
    block.describe(&mut recorder);
    recorder.names
}

fn assert_unique(names: &[String]) {
    let set: BTreeSet<&String> = names.iter().collect();
    assert_eq!(set.len(), names.len(), "duplicate field in {:?}", names);
}

#[test]
fn validation_fields_in_declaration_order() {
    let block = ValidationMetadata {
        partitioner: PARTITIONER.to_string(),
        filter_chance: 0.01,
    };
    assert_eq!(names_of(&block), vec!["partitioner", "filter_chance"]);
}

#[test]
fn stats_fields_are_each_visited_once() -> Result<()> {
    let dir = tempdir()?;
    let sst = open(&write(dir.path(), 1, &memtable(0..3, 2, 1))?)?;
    let stats = sst.statistics().stats.as_ref().expect("stats block");
    let names = names_of(stats);
    assert_unique(&names);
    assert_eq!(names.len(), 20);
    assert_eq!(names.first().map(String::as_str), Some("estimated_partition_size"));
    assert_eq!(names.last().map(String::as_str), Some("commitlog_intervals"));
    Ok(())
}

#[test]
fn serialization_header_describes_nested_columns() -> Result<()> {
    let header = SerializationHeader::for_schema(&test_schema());
    let names = names_of(&header);
    assert_unique(&names[..7]);
    assert_eq!(
        names,
        vec![
            "min_timestamp_base",
            "min_local_deletion_time_base",
            "min_ttl_base",
            "pk_type_name",
            "clustering_key_types_names",
            "static_columns",
            "static_columns.name",
            "static_columns.type_name",
            "regular_columns",
            "regular_columns.name",
            "regular_columns.type_name",
        ]
    );
    Ok(())
}

#[test]
fn compaction_arrays_carry_every_element() {
    struct Lengths(Vec<usize>);
    impl FieldVisitor for Lengths {
        fn visit_field(&mut self, _name: &'static str, value: FieldValue<'_>) {
            if let FieldValue::Array(items) = value {
                self.0.push(items.len());
            }
        }
    }
    let block = CompactionMetadata {
        ancestors: vec![1, 2, 3],
        cardinality: vec![9; 5],
    };
    let mut lengths = Lengths(Vec::new());
    block.describe(&mut lengths);
    assert_eq!(lengths.0, vec![3, 5]);
}
