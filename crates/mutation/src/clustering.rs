//! Clustering keys, range-tombstone bounds, and positions within a partition.
//!
//! Components compare byte-wise (unsigned, lexicographic), component by
//! component. A bound is a key *prefix* plus a kind; its weight places it
//! immediately before (-1) or after (+1) every row sharing the prefix.

use std::cmp::Ordering;

/// Full clustering key of a row: one serialized value per clustering column.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClusteringKey(pub Vec<Vec<u8>>);

impl ClusteringKey {
    pub fn new(components: Vec<Vec<u8>>) -> Self {
        Self(components)
    }

    pub fn components(&self) -> &[Vec<u8>] {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundKind {
    InclStart,
    ExclStart,
    InclEnd,
    ExclEnd,
}

impl BoundKind {
    fn weight(self) -> i8 {
        match self {
            BoundKind::InclStart | BoundKind::ExclEnd => -1,
            BoundKind::ExclStart | BoundKind::InclEnd => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BoundKind::InclStart => "incl_start",
            BoundKind::ExclStart => "excl_start",
            BoundKind::InclEnd => "incl_end",
            BoundKind::ExclEnd => "excl_end",
        }
    }
}

/// One end of a clustering range.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClusteringBound {
    pub prefix: ClusteringKey,
    pub kind: BoundKind,
}

impl ClusteringBound {
    pub fn new(prefix: ClusteringKey, kind: BoundKind) -> Self {
        Self { prefix, kind }
    }

    /// The bound before every row of the partition.
    pub fn bottom() -> Self {
        Self::new(ClusteringKey::default(), BoundKind::InclStart)
    }

    /// The bound after every row of the partition.
    pub fn top() -> Self {
        Self::new(ClusteringKey::default(), BoundKind::InclEnd)
    }

    pub fn position(&self) -> PositionInPartition {
        PositionInPartition::clustered(self.prefix.0.clone(), self.kind.weight())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Region {
    PartitionStart,
    StaticRow,
    Clustered,
    PartitionEnd,
}

/// Where a fragment sits inside its partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PositionInPartition {
    region: Region,
    prefix: Vec<Vec<u8>>,
    weight: i8,
}

impl PositionInPartition {
    pub fn partition_start() -> Self {
        Self {
            region: Region::PartitionStart,
            prefix: Vec::new(),
            weight: 0,
        }
    }

    pub fn static_row() -> Self {
        Self {
            region: Region::StaticRow,
            prefix: Vec::new(),
            weight: 0,
        }
    }

    pub fn partition_end() -> Self {
        Self {
            region: Region::PartitionEnd,
            prefix: Vec::new(),
            weight: 0,
        }
    }

    pub fn for_row(key: &ClusteringKey) -> Self {
        Self::clustered(key.0.clone(), 0)
    }

    fn clustered(prefix: Vec<Vec<u8>>, weight: i8) -> Self {
        Self {
            region: Region::Clustered,
            prefix,
            weight,
        }
    }

    pub fn region(&self) -> Region {
        self.region
    }
}

impl Ord for PositionInPartition {
    fn cmp(&self, other: &Self) -> Ordering {
        self.region.cmp(&other.region).then_with(|| {
            compare_prefixes(&self.prefix, self.weight, &other.prefix, other.weight)
        })
    }
}

impl PartialOrd for PositionInPartition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// When one prefix is a strict prefix of the other, the shorter one's
/// weight decides: negative sorts before all extensions, positive after.
fn compare_prefixes(a: &[Vec<u8>], wa: i8, b: &[Vec<u8>], wb: i8) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        match x.cmp(y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    match a.len().cmp(&b.len()) {
        Ordering::Equal => wa.cmp(&wb),
        Ordering::Less if wa > 0 => Ordering::Greater,
        Ordering::Less => Ordering::Less,
        Ordering::Greater if wb > 0 => Ordering::Less,
        Ordering::Greater => Ordering::Greater,
    }
}
