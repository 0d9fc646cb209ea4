//! Table façade: one type covering both representations.
//!
//! Construction inserts into a [`LinkedTable`]; closing the build compiles
//! it into a [`HybridTable`] that serves all queries afterwards.
//! Operations that do not apply to the current representation are refused
//! with [`LshError::Unsupported`].

use crate::error::LshError;
use crate::hybrid::{HybridPoints, HybridTable, PackedLayout};
use crate::linked::{LinkedPoints, LinkedTable};
use crate::uhash::{Coefficients, Probe};
use std::fmt;
use std::sync::Arc;

/// Default number of slots per table.
pub const DEFAULT_TABLE_SIZE: usize = 1_017_881;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableKind {
    Linked,
    Hybrid,
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TableKind::Linked => "linked",
            TableKind::Hybrid => "hybrid",
        })
    }
}

/// A bucket table in either representation.
pub enum Table {
    Linked(LinkedTable),
    Hybrid(HybridTable),
}

impl Table {
    /// A fresh, empty linked table on the given coefficient set.
    pub fn new_linked(table_size: usize, coeffs: Arc<Coefficients>) -> Self {
        Table::Linked(LinkedTable::new(table_size, coeffs))
    }

    pub fn kind(&self) -> TableKind {
        match self {
            Table::Linked(_) => TableKind::Linked,
            Table::Hybrid(_) => TableKind::Hybrid,
        }
    }

    /// Files a point under its bucket. Linked tables only.
    pub fn insert(&mut self, probe: Probe, point: u32) -> Result<(), LshError> {
        match self {
            Table::Linked(table) => table.insert(probe, point),
            Table::Hybrid(_) => Err(LshError::Unsupported {
                op: "insert",
                kind: TableKind::Hybrid,
            }),
        }
    }

    /// Returns the point stream of the probe's bucket, empty on a miss.
    /// Supported by both representations.
    pub fn lookup(&self, probe: Probe) -> Result<Points<'_>, LshError> {
        match self {
            Table::Linked(table) => table.lookup(probe).map(Points::Linked),
            Table::Hybrid(table) => table.lookup(probe).map(Points::Hybrid),
        }
    }

    /// Empties the table for a rebuild. Linked tables only.
    pub fn clear(&mut self) -> Result<(), LshError> {
        match self {
            Table::Linked(table) => {
                table.clear();
                Ok(())
            }
            Table::Hybrid(_) => Err(LshError::Unsupported {
                op: "clear",
                kind: TableKind::Hybrid,
            }),
        }
    }

    /// Compiles this (linked) table into its read-optimized form. The
    /// source stays usable and the two share no storage.
    pub fn compile(&self) -> Result<Table, LshError> {
        self.compile_with_layout(PackedLayout::default())
    }

    pub fn compile_with_layout(&self, layout: PackedLayout) -> Result<Table, LshError> {
        match self {
            Table::Linked(table) => {
                HybridTable::compile_with_layout(table, layout).map(Table::Hybrid)
            }
            Table::Hybrid(_) => Err(LshError::Unsupported {
                op: "compile",
                kind: TableKind::Hybrid,
            }),
        }
    }

    pub fn table_size(&self) -> usize {
        match self {
            Table::Linked(table) => table.table_size(),
            Table::Hybrid(table) => table.table_size(),
        }
    }

    pub fn n_buckets(&self) -> u32 {
        match self {
            Table::Linked(table) => table.n_buckets(),
            Table::Hybrid(table) => table.n_buckets(),
        }
    }

    pub fn n_points(&self) -> u32 {
        match self {
            Table::Linked(table) => table.n_points(),
            Table::Hybrid(table) => table.n_points(),
        }
    }

    pub fn coefficients(&self) -> &Arc<Coefficients> {
        match self {
            Table::Linked(table) => table.coefficients(),
            Table::Hybrid(table) => table.coefficients(),
        }
    }

    pub fn memory_usage_bytes(&self) -> usize {
        match self {
            Table::Linked(table) => table.memory_usage_bytes(),
            Table::Hybrid(table) => table.memory_usage_bytes(),
        }
    }
}

/// Point stream of one bucket, from either representation.
pub enum Points<'a> {
    Linked(LinkedPoints<'a>),
    Hybrid(HybridPoints<'a>),
}

impl Iterator for Points<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        match self {
            Points::Linked(points) => points.next(),
            Points::Hybrid(points) => points.next(),
        }
    }
}
