//! Column types, their textual names, and value rendering.
//!
//! Type names follow the CQL spelling (`int`, `text`, `map<text, int>`,
//! `frozen<list<int>>`, ...). Values are stored as the raw big-endian
//! serialized bytes; [`ColumnType::format_value`] turns them back into
//! something a human can read.

use std::fmt;

use crate::SchemaError;

/// The type of a single column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    Boolean,
    Int,
    BigInt,
    Double,
    Text,
    Blob,
    /// Milliseconds since the Unix epoch.
    Timestamp,
    Uuid,
    List(Box<ColumnType>),
    Set(Box<ColumnType>),
    Map(Box<ColumnType>, Box<ColumnType>),
    /// A collection serialized as a single opaque value.
    Frozen(Box<ColumnType>),
}

impl ColumnType {
    /// Parses a type name such as `int` or `map<text, frozen<set<int>>>`.
    pub fn parse(name: &str) -> Result<Self, SchemaError> {
        let mut parser = TypeParser {
            input: name,
            pos: 0,
        };
        let ty = parser.parse_type()?;
        parser.skip_ws();
        if parser.pos != name.len() {
            return Err(SchemaError::InvalidType {
                name: name.to_string(),
                reason: format!("trailing characters at offset {}", parser.pos),
            });
        }
        Ok(ty)
    }

    /// Returns `true` if a cell of this type holds a single value with a
    /// single timestamp. Non-frozen collections are multi-cell.
    #[must_use]
    pub fn is_atomic(&self) -> bool {
        !self.is_multi_cell()
    }

    #[must_use]
    pub fn is_multi_cell(&self) -> bool {
        matches!(
            self,
            ColumnType::List(_) | ColumnType::Set(_) | ColumnType::Map(_, _)
        )
    }

    /// Renders a serialized value of this type.
    ///
    /// Values that do not decode under this type fall back to hex so that
    /// a dump of a damaged sstable is still complete.
    #[must_use]
    pub fn format_value(&self, bytes: &[u8]) -> String {
        self.try_format(bytes)
            .unwrap_or_else(|| hex::encode(bytes))
    }

    /// Renders one cell of a multi-cell collection.
    ///
    /// `key` is the cell path (list position, set element or map key) and
    /// `value` the cell value (empty for sets).
    #[must_use]
    pub fn format_collection_cell(&self, key: &[u8], value: &[u8]) -> String {
        match self {
            ColumnType::List(elem) => elem.format_value(value),
            ColumnType::Set(elem) => elem.format_value(key),
            ColumnType::Map(k, v) => format!("{}: {}", k.format_value(key), v.format_value(value)),
            other => other.format_value(value),
        }
    }

    fn try_format(&self, bytes: &[u8]) -> Option<String> {
        Some(match self {
            ColumnType::Boolean => match bytes {
                [0] => "false".to_string(),
                [_] => "true".to_string(),
                _ => return None,
            },
            ColumnType::Int => i32::from_be_bytes(bytes.try_into().ok()?).to_string(),
            ColumnType::BigInt | ColumnType::Timestamp => {
                i64::from_be_bytes(bytes.try_into().ok()?).to_string()
            }
            ColumnType::Double => f64::from_be_bytes(bytes.try_into().ok()?).to_string(),
            ColumnType::Text => std::str::from_utf8(bytes).ok()?.to_string(),
            ColumnType::Blob => hex::encode(bytes),
            ColumnType::Uuid => uuid::Uuid::from_slice(bytes).ok()?.to_string(),
            ColumnType::Frozen(inner) => inner.format_frozen(bytes)?,
            ColumnType::List(_) | ColumnType::Set(_) | ColumnType::Map(_, _) => {
                self.format_frozen(bytes)?
            }
        })
    }

    /// Frozen collections: `[count: i32 BE]` followed by `[len: i32 BE][bytes]`
    /// per element (two per entry for maps).
    fn format_frozen(&self, bytes: &[u8]) -> Option<String> {
        let mut items = FrozenItems { rest: bytes };
        let count = items.read_i32()?;
        let mut parts = Vec::with_capacity(count.clamp(0, 1024) as usize);
        for _ in 0..count {
            match self {
                ColumnType::List(elem) | ColumnType::Set(elem) => {
                    parts.push(elem.format_value(items.next_item()?));
                }
                ColumnType::Map(k, v) => {
                    let key = k.format_value(items.next_item()?);
                    let value = v.format_value(items.next_item()?);
                    parts.push(format!("{}: {}", key, value));
                }
                _ => return None,
            }
        }
        if !items.rest.is_empty() {
            return None;
        }
        Some(match self {
            ColumnType::List(_) => format!("[{}]", parts.join(", ")),
            _ => format!("{{{}}}", parts.join(", ")),
        })
    }
}

struct FrozenItems<'a> {
    rest: &'a [u8],
}

impl<'a> FrozenItems<'a> {
    fn read_i32(&mut self) -> Option<i32> {
        let (head, tail) = self.rest.split_at_checked(4)?;
        self.rest = tail;
        Some(i32::from_be_bytes(head.try_into().ok()?))
    }

    fn next_item(&mut self) -> Option<&'a [u8]> {
        let len = usize::try_from(self.read_i32()?).ok()?;
        let (head, tail) = self.rest.split_at_checked(len)?;
        self.rest = tail;
        Some(head)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Boolean => write!(f, "boolean"),
            ColumnType::Int => write!(f, "int"),
            ColumnType::BigInt => write!(f, "bigint"),
            ColumnType::Double => write!(f, "double"),
            ColumnType::Text => write!(f, "text"),
            ColumnType::Blob => write!(f, "blob"),
            ColumnType::Timestamp => write!(f, "timestamp"),
            ColumnType::Uuid => write!(f, "uuid"),
            ColumnType::List(e) => write!(f, "list<{}>", e),
            ColumnType::Set(e) => write!(f, "set<{}>", e),
            ColumnType::Map(k, v) => write!(f, "map<{}, {}>", k, v),
            ColumnType::Frozen(inner) => write!(f, "frozen<{}>", inner),
        }
    }
}

/// Recursive-descent parser over a type name.
struct TypeParser<'a> {
    input: &'a str,
    pos: usize,
}

impl TypeParser<'_> {
    fn skip_ws(&mut self) {
        while let Some(c) = self.input[self.pos..].chars().next().filter(|c| c.is_whitespace()) {
            self.pos += c.len_utf8();
        }
    }

    fn error(&self, reason: impl Into<String>) -> SchemaError {
        SchemaError::InvalidType {
            name: self.input.to_string(),
            reason: reason.into(),
        }
    }

    fn ident(&mut self) -> Result<&str, SchemaError> {
        self.skip_ws();
        let start = self.pos;
        let rest = &self.input[start..];
        let len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(self.error(format!("expected a type name at offset {}", start)));
        }
        self.pos += len;
        Ok(&self.input[start..start + len])
    }

    fn expect(&mut self, c: char) -> Result<(), SchemaError> {
        self.skip_ws();
        if self.input[self.pos..].starts_with(c) {
            self.pos += c.len_utf8();
            Ok(())
        } else {
            Err(self.error(format!("expected '{}' at offset {}", c, self.pos)))
        }
    }

    fn parse_type(&mut self) -> Result<ColumnType, SchemaError> {
        let name = self.ident()?.to_ascii_lowercase();
        let ty = match name.as_str() {
            "boolean" => ColumnType::Boolean,
            "int" => ColumnType::Int,
            "bigint" => ColumnType::BigInt,
            "double" => ColumnType::Double,
            "text" | "varchar" => ColumnType::Text,
            "blob" => ColumnType::Blob,
            "timestamp" => ColumnType::Timestamp,
            "uuid" => ColumnType::Uuid,
            "list" | "set" | "frozen" => {
                self.expect('<')?;
                let inner = Box::new(self.parse_type()?);
                self.expect('>')?;
                match name.as_str() {
                    "list" | "set" if inner.is_multi_cell() => {
                        return Err(self.error("non-frozen collection inside a collection"));
                    }
                    "list" => ColumnType::List(inner),
                    "set" => ColumnType::Set(inner),
                    _ => {
                        if !inner.is_multi_cell() {
                            return Err(self.error("frozen<> only applies to collections"));
                        }
                        ColumnType::Frozen(inner)
                    }
                }
            }
            "map" => {
                self.expect('<')?;
                let key = Box::new(self.parse_type()?);
                self.expect(',')?;
                let value = Box::new(self.parse_type()?);
                self.expect('>')?;
                if key.is_multi_cell() || value.is_multi_cell() {
                    return Err(self.error("non-frozen collection inside a collection"));
                }
                ColumnType::Map(key, value)
            }
            other => return Err(self.error(format!("unknown type '{}'", other))),
        };
        Ok(ty)
    }
}
