//! The mutable, chained representation a table is built in.
//!
//! Nodes live in two slabs (buckets and entries) and link each other by
//! index, so `clear` can hand every live node back to a freelist and a
//! rebuild reuses both the slab capacity and the slot array. This is the
//! representation `insert` targets; queries against it walk the chains
//! directly.

use crate::error::LshError;
use crate::uhash::{Coefficients, Probe};
use log::trace;
use rand::Rng;
use std::mem;
use std::sync::Arc;

/// Index sentinel for "no node" / "empty slot".
pub(crate) const NIL: u32 = u32::MAX;

/// One bucket: all points whose fingerprints collided on this table's
/// `(slot, control)` pair. The first point is stored inline; further
/// points hang off the entry chain.
#[derive(Clone, Copy)]
pub(crate) struct BucketNode {
    pub(crate) control: u32,
    pub(crate) head_point: u32,
    /// Entry slab index of the second point, or `NIL`.
    pub(crate) more: u32,
    /// Next bucket in this slot's chain, or `NIL`. Doubles as the
    /// freelist link while the node is unused.
    pub(crate) next: u32,
}

#[derive(Clone, Copy)]
pub(crate) struct EntryNode {
    pub(crate) point: u32,
    /// Next entry of the same bucket, or `NIL`. Doubles as the freelist
    /// link while the node is unused.
    pub(crate) next: u32,
}

/// The mutable hash table: slot array over chains of buckets over chains
/// of point entries.
pub struct LinkedTable {
    pub(crate) slots: Vec<u32>,
    pub(crate) buckets: Vec<BucketNode>,
    pub(crate) entries: Vec<EntryNode>,
    /// Heads of the per-table freelists, threaded through the slabs.
    free_bucket: u32,
    free_entry: u32,
    pub(crate) coeffs: Arc<Coefficients>,
    pub(crate) n_buckets: u32,
    pub(crate) n_points: u32,
}

impl LinkedTable {
    /// Creates an empty table of `table_size` slots hashing with the
    /// given coefficient set.
    pub fn new(table_size: usize, coeffs: Arc<Coefficients>) -> Self {
        assert!(table_size > 0, "table size must be positive");
        LinkedTable {
            slots: vec![NIL; table_size],
            buckets: Vec::new(),
            entries: Vec::new(),
            free_bucket: NIL,
            free_entry: NIL,
            coeffs,
            n_buckets: 0,
            n_points: 0,
        }
    }

    /// Creates an empty table with freshly drawn coefficients. Use
    /// [`LinkedTable::coefficients`] afterwards to share them with other
    /// tables.
    pub fn with_random_coefficients<R: Rng + ?Sized>(
        table_size: usize,
        dims: usize,
        rng: &mut R,
    ) -> Self {
        Self::new(table_size, Arc::new(Coefficients::generate(dims, rng)))
    }

    pub fn table_size(&self) -> usize {
        self.slots.len()
    }

    pub fn dims(&self) -> usize {
        self.coeffs.dims()
    }

    /// Number of distinct `(slot, control)` buckets currently hashed.
    pub fn n_buckets(&self) -> u32 {
        self.n_buckets
    }

    /// Number of points currently hashed.
    pub fn n_points(&self) -> u32 {
        self.n_points
    }

    pub fn coefficients(&self) -> &Arc<Coefficients> {
        &self.coeffs
    }

    /// Heap footprint of the slot array and both slabs.
    pub fn memory_usage_bytes(&self) -> usize {
        self.slots.capacity() * mem::size_of::<u32>()
            + self.buckets.capacity() * mem::size_of::<BucketNode>()
            + self.entries.capacity() * mem::size_of::<EntryNode>()
    }

    fn alloc_bucket(&mut self, node: BucketNode) -> u32 {
        if self.free_bucket != NIL {
            let idx = self.free_bucket;
            self.free_bucket = self.buckets[idx as usize].next;
            self.buckets[idx as usize] = node;
            idx
        } else {
            self.buckets.push(node);
            (self.buckets.len() - 1) as u32
        }
    }

    fn alloc_entry(&mut self, node: EntryNode) -> u32 {
        if self.free_entry != NIL {
            let idx = self.free_entry;
            self.free_entry = self.entries[idx as usize].next;
            self.entries[idx as usize] = node;
            idx
        } else {
            self.entries.push(node);
            (self.entries.len() - 1) as u32
        }
    }

    /// Hashes the probe and files `point` under its bucket, creating the
    /// bucket at the head of the slot chain if no bucket with the same
    /// control value exists there yet.
    ///
    /// Distinct fingerprints mapping to the same `(slot, control)` pair
    /// are merged into one bucket; that is the documented false-collision
    /// contribution of the scheme, not an error.
    pub fn insert(&mut self, probe: Probe, point: u32) -> Result<(), LshError> {
        let (slot, control) = self.coeffs.locate(probe, self.slots.len())?;

        let mut b = self.slots[slot];
        while b != NIL && self.buckets[b as usize].control != control {
            b = self.buckets[b as usize].next;
        }

        if b != NIL {
            // Existing bucket: prepend right after the inline first entry.
            let entry = self.alloc_entry(EntryNode {
                point,
                next: self.buckets[b as usize].more,
            });
            self.buckets[b as usize].more = entry;
        } else {
            let bucket = self.alloc_bucket(BucketNode {
                control,
                head_point: point,
                more: NIL,
                next: self.slots[slot],
            });
            self.slots[slot] = bucket;
            self.n_buckets += 1;
        }
        self.n_points += 1;
        Ok(())
    }

    /// Hashes the probe and returns the point stream of its bucket; an
    /// empty stream if nothing was filed under it.
    pub fn lookup(&self, probe: Probe) -> Result<LinkedPoints<'_>, LshError> {
        let (slot, control) = self.coeffs.locate(probe, self.slots.len())?;

        let mut b = self.slots[slot];
        while b != NIL && self.buckets[b as usize].control != control {
            b = self.buckets[b as usize].next;
        }

        Ok(if b != NIL {
            let bucket = &self.buckets[b as usize];
            LinkedPoints {
                entries: &self.entries,
                head: Some(bucket.head_point),
                next: bucket.more,
            }
        } else {
            LinkedPoints {
                entries: &self.entries,
                head: None,
                next: NIL,
            }
        })
    }

    /// Returns every live bucket and entry to the freelists, nulls all
    /// slots and resets the counters. The slot array and slab capacity
    /// are kept, so a rebuild allocates nothing until it outgrows the
    /// previous population.
    pub fn clear(&mut self) {
        for slot in 0..self.slots.len() {
            let mut b = mem::replace(&mut self.slots[slot], NIL);
            while b != NIL {
                let BucketNode { more, next, .. } = self.buckets[b as usize];

                let mut e = more;
                while e != NIL {
                    let n = self.entries[e as usize].next;
                    self.entries[e as usize].next = self.free_entry;
                    self.free_entry = e;
                    e = n;
                }

                self.buckets[b as usize].next = self.free_bucket;
                self.free_bucket = b;
                b = next;
            }
        }
        trace!(
            "cleared linked table: {} buckets, {} points recycled",
            self.n_buckets,
            self.n_points
        );
        self.n_buckets = 0;
        self.n_points = 0;
    }
}

/// Point stream of one linked bucket: the inline first point, then the
/// entry chain.
pub struct LinkedPoints<'a> {
    entries: &'a [EntryNode],
    head: Option<u32>,
    next: u32,
}

impl Iterator for LinkedPoints<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if let Some(point) = self.head.take() {
            return Some(point);
        }
        if self.next == NIL {
            return None;
        }
        let entry = &self.entries[self.next as usize];
        self.next = entry.next;
        Some(entry.point)
    }
}
