//! The packed, read-only representation a linked table is compiled into.
//!
//! All buckets of all slots live in one contiguous arena of 4-byte
//! records. A slot's chain is laid out as alternating bucket headers (the
//! raw control value) and runs of point records; queries walk it with
//! sequential reads instead of chasing node pointers. Buckets larger than
//! the primary run spill into an overflow region filled from the arena's
//! tail, so the arena ends up exactly `n_points + n_buckets` records with
//! no holes.
//!
//! Point records are explicit bit-packed words, LSB to MSB:
//!
//! ```text
//! bit 0      is_last_bucket   set on the header-adjacent record of the
//!                             last bucket in the slot's chain
//! bit 1      is_last_point    set on the final record of the bucket
//! bits 2..   bucket_length    b bits; 0 means the bucket overflows
//! rest       point_index      32 - 2 - b bits
//! ```
//!
//! For an overflowed bucket, the `bucket_length` fields of the `F`
//! records after the first point record hold the overflow offset,
//! little-endian in base `2^b`, relative to one past the primary run.
//! Those records still carry their real point index.

use crate::error::LshError;
use crate::linked::{LinkedTable, NIL};
use crate::uhash::{Coefficients, Probe};
use log::debug;
use std::mem;
use std::sync::Arc;

/// The bit-packing parameters of a hybrid arena.
///
/// `length_bits` is the width of the `bucket_length` field;
/// `overflow_fields` is how many of those fields chain together to encode
/// an overflow offset. Everything else is derived: a bucket keeps at most
/// `2^length_bits - 1` points in its primary run, and point indices get
/// the remaining `32 - 2 - length_bits` bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PackedLayout {
    length_bits: u32,
    overflow_fields: u32,
}

impl Default for PackedLayout {
    /// 10 length bits (primary runs up to 1023 points, 20-bit point
    /// indices) and 4 offset fields, enough for any 32-bit offset.
    fn default() -> Self {
        PackedLayout {
            length_bits: 10,
            overflow_fields: 4,
        }
    }
}

impl PackedLayout {
    pub fn new(length_bits: u32, overflow_fields: u32) -> Result<Self, LshError> {
        if !(1..=28).contains(&length_bits) {
            return Err(LshError::LengthBits { bits: length_bits });
        }
        let max_plain = (1u32 << length_bits) - 1;
        // The offset fields live in primary-run records after the first
        // one, so an overflowed run must have room for all of them.
        if overflow_fields == 0 || overflow_fields + 1 > max_plain {
            return Err(LshError::OverflowFields {
                fields: overflow_fields,
                max_plain,
            });
        }
        Ok(PackedLayout {
            length_bits,
            overflow_fields,
        })
    }

    /// Largest bucket that fits its primary run without overflowing.
    pub fn max_plain(&self) -> u32 {
        (1 << self.length_bits) - 1
    }

    /// Width of the point-index field.
    pub fn index_bits(&self) -> u32 {
        32 - 2 - self.length_bits
    }

    /// Largest representable point index.
    pub fn max_point_index(&self) -> u32 {
        (1 << self.index_bits()) - 1
    }

    fn pack(&self, last_bucket: bool, last_point: bool, length: u32, point: u32) -> u32 {
        debug_assert!(length <= self.max_plain());
        debug_assert!(point <= self.max_point_index());
        u32::from(last_bucket)
            | u32::from(last_point) << 1
            | length << 2
            | point << (2 + self.length_bits)
    }

    fn is_last_bucket(&self, record: u32) -> bool {
        record & 1 != 0
    }

    fn is_last_point(&self, record: u32) -> bool {
        record & 0b10 != 0
    }

    fn bucket_length(&self, record: u32) -> u32 {
        (record >> 2) & self.max_plain()
    }

    fn point_index(&self, record: u32) -> u32 {
        record >> (2 + self.length_bits)
    }

    fn with_last_point(&self, record: u32) -> u32 {
        record | 0b10
    }

    fn with_bucket_length(&self, record: u32, length: u32) -> u32 {
        debug_assert!(length <= self.max_plain());
        (record & !(self.max_plain() << 2)) | length << 2
    }
}

/// The read-optimized table. Built once from a populated [`LinkedTable`],
/// immutable afterwards; it shares no storage with its source.
pub struct HybridTable {
    /// Per-slot arena index of the first bucket header, `NIL` when empty.
    heads: Vec<u32>,
    arena: Vec<u32>,
    layout: PackedLayout,
    coeffs: Arc<Coefficients>,
    n_buckets: u32,
    n_points: u32,
}

impl HybridTable {
    /// Compiles `source` with the default layout.
    pub fn compile(source: &LinkedTable) -> Result<Self, LshError> {
        Self::compile_with_layout(source, PackedLayout::default())
    }

    /// Compiles `source` into a packed arena.
    ///
    /// One pass in slot order, preserving chain order. The forward cursor
    /// lays out headers and primary runs; overflow records are taken from
    /// the tail cursor. Fails if a point index or an overflow offset does
    /// not fit the layout's field widths; the source is left untouched
    /// either way.
    pub fn compile_with_layout(
        source: &LinkedTable,
        layout: PackedLayout,
    ) -> Result<Self, LshError> {
        let max_plain = layout.max_plain();
        let check_point = |point: u32| {
            if point > layout.max_point_index() {
                Err(LshError::PointIndexWidth {
                    index: point,
                    bits: layout.index_bits(),
                })
            } else {
                Ok(())
            }
        };

        let n = (source.n_points() + source.n_buckets()) as usize;
        let mut heads = vec![NIL; source.table_size()];
        let mut arena = vec![0u32; n];

        // Forward cursor for headers and primary runs; tail cursor for
        // overflow records.
        let mut forward = 0usize;
        let mut tail = n.wrapping_sub(1);
        let mut overflowed_buckets = 0u32;

        for (slot, head) in heads.iter_mut().enumerate() {
            let mut b = source.slots[slot];
            if b == NIL {
                continue;
            }
            *head = forward as u32;

            while b != NIL {
                let bucket = source.buckets[b as usize];

                // Size of this bucket: inline head plus entry chain.
                let mut points = 1u32;
                let mut e = bucket.more;
                while e != NIL {
                    points += 1;
                    e = source.entries[e as usize].next;
                }

                check_point(bucket.head_point)?;
                arena[forward] = bucket.control;
                forward += 1;

                let first_record = forward;
                arena[forward] = layout.pack(
                    bucket.next == NIL,
                    points == 1,
                    if points <= max_plain { points } else { 0 },
                    bucket.head_point,
                );
                forward += 1;

                // Reserve the rest of the primary run, and the overflow
                // run when the bucket is too large for it.
                let mut overflow_start = usize::MAX;
                if points <= max_plain {
                    forward = first_record + points as usize;
                } else {
                    let spill = (points - max_plain) as usize;
                    overflow_start = tail + 1 - spill;
                    tail = overflow_start - 1;
                    forward = first_record + max_plain as usize;
                }

                // Lay the remaining points into the reserved space,
                // switching to the overflow run when the primary one
                // fills.
                let mut cursor = first_record + 1;
                let mut e = bucket.more;
                while e != NIL {
                    let entry = source.entries[e as usize];
                    check_point(entry.point)?;
                    arena[cursor] = layout.pack(false, false, 0, entry.point);
                    e = entry.next;
                    cursor += 1;
                    if cursor == forward && overflow_start != usize::MAX {
                        cursor = overflow_start;
                    }
                }
                arena[cursor - 1] = layout.with_last_point(arena[cursor - 1]);

                if overflow_start != usize::MAX {
                    overflowed_buckets += 1;
                    // Offset of the overflow run, relative to one past
                    // the primary run, spread over the length fields of
                    // the records after the first one.
                    let offset = (overflow_start - (first_record + max_plain as usize)) as u32;
                    let offset_bits = layout.overflow_fields * layout.length_bits;
                    if offset_bits < 32 && offset >> offset_bits != 0 {
                        return Err(LshError::OverflowOffsetWidth {
                            offset,
                            bits: offset_bits,
                        });
                    }
                    let mut rest = offset;
                    for field in 0..layout.overflow_fields as usize {
                        let at = first_record + 1 + field;
                        arena[at] = layout.with_bucket_length(arena[at], rest & max_plain);
                        rest >>= layout.length_bits;
                    }
                }

                b = bucket.next;
            }
        }

        // Both cursors must meet: the arena is exactly full.
        if n > 0 {
            assert_eq!(forward, tail + 1, "arena not fully packed");
        } else {
            assert_eq!(forward, 0);
        }

        debug!(
            "compiled hybrid table: {} slots, {} buckets ({} overflowed), {} points, {} arena records",
            source.table_size(),
            source.n_buckets(),
            overflowed_buckets,
            source.n_points(),
            n
        );

        Ok(HybridTable {
            heads,
            arena,
            layout,
            coeffs: Arc::clone(source.coefficients()),
            n_buckets: source.n_buckets(),
            n_points: source.n_points(),
        })
    }

    pub fn table_size(&self) -> usize {
        self.heads.len()
    }

    pub fn dims(&self) -> usize {
        self.coeffs.dims()
    }

    pub fn n_buckets(&self) -> u32 {
        self.n_buckets
    }

    pub fn n_points(&self) -> u32 {
        self.n_points
    }

    pub fn layout(&self) -> PackedLayout {
        self.layout
    }

    pub fn coefficients(&self) -> &Arc<Coefficients> {
        &self.coeffs
    }

    /// Heap footprint of the head array and the arena.
    pub fn memory_usage_bytes(&self) -> usize {
        self.heads.capacity() * mem::size_of::<u32>()
            + self.arena.capacity() * mem::size_of::<u32>()
    }

    /// Hashes the probe and returns the point stream of its bucket; an
    /// empty stream if nothing was filed under it.
    ///
    /// Walks the slot's chain header by header: a control match starts
    /// the stream at the adjacent record; otherwise the header-adjacent
    /// record tells whether the chain ends here and how far the next
    /// header is.
    pub fn lookup(&self, probe: Probe) -> Result<HybridPoints<'_>, LshError> {
        let (slot, control) = self.coeffs.locate(probe, self.heads.len())?;

        let head = self.heads[slot];
        if head == NIL {
            return Ok(HybridPoints::empty(self));
        }

        let mut p = head as usize;
        loop {
            if self.arena[p] == control {
                return Ok(HybridPoints::start(self, p + 1));
            }
            let record = self.arena[p + 1];
            if self.layout.is_last_bucket(record) {
                return Ok(HybridPoints::empty(self));
            }
            let length = self.layout.bucket_length(record);
            let span = if length == 0 {
                self.layout.max_plain()
            } else {
                length
            };
            p += 1 + span as usize;
        }
    }
}

/// Point stream of one hybrid bucket. Follows the jump into the overflow
/// run transparently once the primary run is consumed.
pub struct HybridPoints<'a> {
    arena: &'a [u32],
    layout: PackedLayout,
    pos: usize,
    consumed: u32,
    /// Arena index of the overflow run, `usize::MAX` for in-line buckets.
    overflow_start: usize,
    done: bool,
}

impl<'a> HybridPoints<'a> {
    fn empty(table: &'a HybridTable) -> Self {
        HybridPoints {
            arena: &table.arena,
            layout: table.layout,
            pos: 0,
            consumed: 0,
            overflow_start: usize::MAX,
            done: true,
        }
    }

    fn start(table: &'a HybridTable, first_record: usize) -> Self {
        let layout = table.layout;
        let arena: &[u32] = &table.arena;
        // A zero length on the first record marks an overflowed bucket;
        // the offset of its overflow run is spread over the length
        // fields of the following records.
        let overflow_start = if layout.bucket_length(arena[first_record]) == 0 {
            let mut offset = 0u64;
            for field in (0..layout.overflow_fields as usize).rev() {
                let length = layout.bucket_length(arena[first_record + 1 + field]);
                offset = offset << layout.length_bits | u64::from(length);
            }
            first_record + layout.max_plain() as usize + offset as usize
        } else {
            usize::MAX
        };
        HybridPoints {
            arena,
            layout,
            pos: first_record,
            consumed: 0,
            overflow_start,
            done: false,
        }
    }
}

impl Iterator for HybridPoints<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.done {
            return None;
        }
        let record = self.arena[self.pos];
        if self.layout.is_last_point(record) {
            self.done = true;
        } else {
            self.consumed += 1;
            if self.consumed == self.layout.max_plain() && self.overflow_start != usize::MAX {
                self.pos = self.overflow_start;
            } else {
                self.pos += 1;
            }
        }
        Some(self.layout.point_index(record))
    }
}
