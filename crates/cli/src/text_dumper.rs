//! Brace-tagged text rendering of [`Describe`] metadata blocks.

use std::fmt::Write as _;

use sstable::{Describe, FieldValue, FieldVisitor};

/// A [`FieldVisitor`] that renders every field as `{name: value}`.
///
/// Arrays and histograms put one `[i]: value` entry per line; records
/// render their own fields inline.
#[derive(Debug, Default)]
pub struct TextDumper {
    buf: String,
    /// Fields of a record nested in another field: no line breaks.
    inline: bool,
}

impl TextDumper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Renders all fields of `block`.
    pub fn dump(block: &dyn Describe) -> String {
        let mut dumper = Self::new();
        block.describe(&mut dumper);
        dumper.buf
    }

    pub fn into_string(self) -> String {
        self.buf
    }

    fn value(&mut self, value: FieldValue<'_>) {
        // Writing into a String cannot fail.
        let buf = &mut self.buf;
        match value {
            FieldValue::Int(v) => {
                let _ = write!(buf, " {}", v);
            }
            FieldValue::UInt(v) => {
                let _ = write!(buf, " {}", v);
            }
            FieldValue::Float(v) => {
                let _ = write!(buf, " {}", v);
            }
            FieldValue::Bool(v) => {
                let _ = write!(buf, " {}", v);
            }
            FieldValue::Str(v) => {
                let _ = write!(buf, " {}", v);
            }
            FieldValue::Bytes(v) => {
                let _ = write!(buf, " {}", hex::encode(v));
            }
            FieldValue::Array(items) => {
                buf.push('\n');
                for (i, item) in items.into_iter().enumerate() {
                    let _ = write!(self.buf, "[{}]:", i);
                    self.value(item);
                    self.buf.push('\n');
                }
            }
            FieldValue::Record(record) => {
                let mut inner = TextDumper {
                    buf: String::new(),
                    inline: true,
                };
                record.describe(&mut inner);
                buf.push_str(&inner.buf);
            }
            FieldValue::EstimatedHistogram(h) => {
                buf.push('\n');
                for (i, value) in h.buckets.iter().enumerate() {
                    let offset = h
                        .bucket_offsets
                        .get(i.saturating_sub(1))
                        .copied()
                        .unwrap_or_default();
                    let _ = writeln!(buf, "[{}]: offset: {}, value: {}", i, offset, value);
                }
            }
            FieldValue::StreamingHistogram(h) => {
                buf.push('\n');
                for (point, count) in &h.bins {
                    let _ = writeln!(buf, "[{}]: {}", point, count);
                }
            }
            FieldValue::ReplayPosition(rp) => {
                let _ = write!(buf, " id: {}, pos: {}", rp.id, rp.pos);
            }
            FieldValue::CommitlogInterval(ci) => {
                let _ = write!(
                    buf,
                    " {{start: id: {}, pos: {}}} {{end: id: {}, pos: {}}}",
                    ci.start.id, ci.start.pos, ci.end.id, ci.end.pos
                );
            }
        }
    }
}

impl FieldVisitor for TextDumper {
    fn visit_field(&mut self, name: &'static str, value: FieldValue<'_>) {
        if self.inline {
            let _ = write!(self.buf, " {{{}:", name);
            self.value(value);
            self.buf.push('}');
        } else {
            let _ = write!(self.buf, "{{{}:", name);
            self.value(value);
            self.buf.push_str("}\n");
        }
    }
}
