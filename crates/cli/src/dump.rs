//! The `dump` operation: every fragment as one line of text.
//!
//! ```text
//! {stream_start}
//! {sstable_start: filename /data/me-1-big-Data.db}
//! {partition_start: {key: 7 (00000007), token: -8215373640593741457}}
//! {static_row: {owner: alice @1000}}
//! {clustering_row: {key: [1], marker: {timestamp: 1000}, cells: {v: hello @1000}}}
//! {range_tombstone: {start: incl_start [2], end: excl_end [5], tombstone: {timestamp: 900, deletion_time: 1700000000}}}
//! {partition_end}
//! {sstable_end}
//! {stream_end}
//! ```
//!
//! Values are rendered through the schema; a column the schema does not
//! know is shown as `#<id>` with a hex value.

use std::io::Write;

use mutation::{
    AtomicCell, Cell, ClusteringBound, ClusteringRow, CollectionMutation, DecoratedKey,
    PartitionStart, RangeTombstone, Row, RowMarker, StaticRow, Tombstone,
};
use schema::{ColumnKind, ColumnType, Schema};
use sstable::SSTable;

use crate::consumer::{Flow, SstableConsumer, CONTINUE};
use crate::error::Result;

pub struct DumpingConsumer<'a, W> {
    schema: &'a Schema,
    out: W,
}

impl<'a, W: Write> DumpingConsumer<'a, W> {
    pub fn new(schema: &'a Schema, out: W) -> Self {
        Self { schema, out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> SstableConsumer for DumpingConsumer<'_, W> {
    fn on_start_of_stream(&mut self) -> Result<()> {
        writeln!(self.out, "{{stream_start}}")?;
        Ok(())
    }

    fn on_new_sstable(&mut self, sstable: Option<&SSTable>) -> Result<Flow> {
        match sstable {
            Some(sst) => writeln!(self.out, "{{sstable_start: filename {}}}", sst.filename())?,
            None => writeln!(self.out, "{{sstable_start}}")?,
        }
        Ok(CONTINUE)
    }

    fn consume_partition_start(&mut self, ps: PartitionStart) -> Result<Flow> {
        let mut line = format!("{{partition_start: {}", format_key(self.schema, &ps.key));
        if let Some(t) = ps.tombstone {
            line.push_str(&format!(", tombstone: {}", format_tombstone(&t)));
        }
        writeln!(self.out, "{}}}", line)?;
        Ok(CONTINUE)
    }

    fn consume_static_row(&mut self, sr: StaticRow) -> Result<Flow> {
        writeln!(
            self.out,
            "{{static_row: {}}}",
            format_row(self.schema, ColumnKind::Static, &sr.cells)
        )?;
        Ok(CONTINUE)
    }

    fn consume_clustering_row(&mut self, cr: ClusteringRow) -> Result<Flow> {
        writeln!(self.out, "{{clustering_row: {}}}", format_clustering_row(self.schema, &cr))?;
        Ok(CONTINUE)
    }

    fn consume_range_tombstone(&mut self, rt: RangeTombstone) -> Result<Flow> {
        writeln!(
            self.out,
            "{{range_tombstone: {{start: {}, end: {}, tombstone: {}}}}}",
            format_bound(self.schema, &rt.start),
            format_bound(self.schema, &rt.end),
            format_tombstone(&rt.tombstone)
        )?;
        Ok(CONTINUE)
    }

    fn consume_partition_end(&mut self) -> Result<Flow> {
        writeln!(self.out, "{{partition_end}}")?;
        Ok(CONTINUE)
    }

    fn on_end_of_sstable(&mut self) -> Result<Flow> {
        writeln!(self.out, "{{sstable_end}}")?;
        Ok(CONTINUE)
    }

    fn on_end_of_stream(&mut self) -> Result<()> {
        writeln!(self.out, "{{stream_end}}")?;
        self.out.flush()?;
        Ok(())
    }
}

/// `<key rendered with the schema> (<hex>)`.
pub(crate) fn format_partition_key(schema: &Schema, raw: &[u8]) -> String {
    format!("{} ({})", schema.format_partition_key(raw), hex::encode(raw))
}

pub(crate) fn format_key(schema: &Schema, key: &DecoratedKey) -> String {
    format!(
        "{{key: {}, token: {}}}",
        format_partition_key(schema, key.key()),
        key.token()
    )
}

pub(crate) fn format_tombstone(t: &Tombstone) -> String {
    format!(
        "{{timestamp: {}, deletion_time: {}}}",
        t.timestamp, t.deletion_time
    )
}

fn format_marker(marker: &RowMarker) -> String {
    match marker.expiry {
        Some(e) => format!(
            "{{timestamp: {}, ttl: {}, expires_at: {}}}",
            marker.timestamp, e.ttl, e.expires_at
        ),
        None => format!("{{timestamp: {}}}", marker.timestamp),
    }
}

fn format_bound(schema: &Schema, bound: &ClusteringBound) -> String {
    format!(
        "{} {}",
        bound.kind.as_str(),
        schema.format_clustering_prefix(bound.prefix.components())
    )
}

fn format_clustering_row(schema: &Schema, cr: &ClusteringRow) -> String {
    let mut out = format!(
        "{{key: {}",
        schema.format_clustering_prefix(cr.key.components())
    );
    if let Some(marker) = &cr.marker {
        out.push_str(&format!(", marker: {}", format_marker(marker)));
    }
    if let Some(t) = &cr.tombstone {
        out.push_str(&format!(", tombstone: {}", format_tombstone(t)));
    }
    out.push_str(&format!(
        ", cells: {}}}",
        format_row(schema, ColumnKind::Regular, &cr.cells)
    ));
    out
}

pub(crate) fn format_row(schema: &Schema, kind: ColumnKind, row: &Row) -> String {
    let cells: Vec<String> = row
        .cells()
        .map(|(id, cell)| match schema.column_at(kind, id) {
            Some(col) => format!("{}: {}", col.name, format_cell(Some(&col.ty), cell)),
            None => format!("#{}: {}", id, format_cell(None, cell)),
        })
        .collect();
    format!("{{{}}}", cells.join(", "))
}

fn format_cell(ty: Option<&ColumnType>, cell: &Cell) -> String {
    match cell {
        Cell::Atomic(c) => format_atomic(c, |v| match ty {
            Some(ty) => ty.format_value(v),
            None => hex::encode(v),
        }),
        Cell::Collection(m) => format_collection(ty, m),
    }
}

fn format_atomic(cell: &AtomicCell, render: impl Fn(&[u8]) -> String) -> String {
    match cell {
        AtomicCell::Live {
            timestamp,
            value,
            expiry,
        } => match expiry {
            Some(e) => format!(
                "{} @{} ttl: {}, expires_at: {}",
                render(value),
                timestamp,
                e.ttl,
                e.expires_at
            ),
            None => format!("{} @{}", render(value), timestamp),
        },
        AtomicCell::Dead {
            timestamp,
            deletion_time,
        } => format!("dead @{} deleted at {}", timestamp, deletion_time),
    }
}

fn format_collection(ty: Option<&ColumnType>, m: &CollectionMutation) -> String {
    let items: Vec<String> = m
        .cells
        .iter()
        .map(|(path, cell)| {
            format_atomic(cell, |value| match ty {
                Some(ty) => ty.format_collection_cell(path, value),
                None => format!("{}: {}", hex::encode(path), hex::encode(value)),
            })
        })
        .collect();
    match &m.tombstone {
        Some(t) => format!(
            "{{tombstone: {}, cells: [{}]}}",
            format_tombstone(t),
            items.join(", ")
        ),
        None => format!("{{cells: [{}]}}", items.join(", ")),
    }
}
