//! # lsh-buckets
//!
//! The universal-hashing bucket layer of a locality-sensitive-hashing
//! (LSH) index: hash tables mapping composite LSH fingerprints
//! (*g-functions*) to sets of point identifiers.
//!
//! The layer has two representations with one lifecycle between them:
//!
//! - [`LinkedTable`] is the mutable form the index is built in. Inserts
//!   chain buckets per slot and recycle nodes through per-table
//!   freelists, so parameter sweeps can [`LinkedTable::clear`] and
//!   rebuild without going back to the allocator.
//! - [`HybridTable`] is compiled from a populated linked table: every
//!   bucket of every slot packed into one contiguous arena of bit-packed
//!   4-byte records, with oversized buckets spilling into an overflow
//!   region at the arena's tail. Queries walk it with sequential reads;
//!   the compiled table is immutable and safe to share across threads.
//!
//! Fingerprints are hashed twice, with independent coefficient vectors:
//! the *main* hash picks the slot, the *control* hash is stored with the
//! bucket and distinguishes fingerprints that share a slot. Distinct
//! fingerprints agreeing on both are merged; that residual collision
//! probability is part of the LSH contract, not an error. One
//! [`Coefficients`] set can be shared across many tables, in which case
//! each u-vector is hashed once ([`Coefficients::precompute`]) and
//! tables combine the cached products per probe.
//!
//! ## Example
//!
//! ```rust
//! use lsh_buckets::{Coefficients, Probe, Table};
//! use std::sync::Arc;
//!
//! let mut rng = rand::rng();
//! let coeffs = Arc::new(Coefficients::generate(4, &mut rng));
//!
//! // Build: insert fingerprint/point pairs into the linked form.
//! let mut build = Table::new_linked(1 << 16, Arc::clone(&coeffs));
//! build.insert(Probe::single(&[1, 0, 0, 0]), 10).unwrap();
//! build.insert(Probe::single(&[1, 0, 0, 0]), 11).unwrap();
//! build.insert(Probe::single(&[0, 1, 0, 0]), 12).unwrap();
//!
//! // Close the build: compile into the packed, read-only form.
//! let index = build.compile().unwrap();
//!
//! let mut ids: Vec<u32> = index
//!     .lookup(Probe::single(&[1, 0, 0, 0]))
//!     .unwrap()
//!     .collect();
//! ids.sort_unstable();
//! assert_eq!(ids, [10, 11]);
//! assert_eq!(index.lookup(Probe::single(&[0, 0, 1, 0])).unwrap().count(), 0);
//! ```
//!
//! The external LSH machinery (projection functions producing the
//! fingerprints, the exact-distance re-ranker consuming the point ids,
//! persistence) lives outside this crate; the tables only ever see
//! integer lane vectors and point identifiers.

pub mod error;
pub mod hybrid;
pub mod linked;
pub mod table;
pub mod uhash;

pub use error::LshError;
pub use hybrid::{HybridPoints, HybridTable, PackedLayout};
pub use linked::{LinkedPoints, LinkedTable};
pub use table::{Points, Table, TableKind, DEFAULT_TABLE_SIZE};
pub use uhash::{Coefficients, Fingerprint, Probe, UProducts, MAX_COEFFICIENT, UH_PRIME};

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use std::sync::Arc;

    #[test]
    fn build_compile_query() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let coeffs = Arc::new(Coefficients::generate(8, &mut rng));

        let mut build = Table::new_linked(997, Arc::clone(&coeffs));
        let fingerprints: Vec<[u32; 8]> = (0..64).map(|_| rng.random()).collect();
        for (id, fp) in fingerprints.iter().enumerate() {
            build.insert(Probe::single(fp), id as u32).unwrap();
        }

        let index = build.compile().unwrap();
        assert_eq!(index.n_points(), 64);
        for (id, fp) in fingerprints.iter().enumerate() {
            let ids: Vec<u32> = index.lookup(Probe::single(fp)).unwrap().collect();
            assert!(ids.contains(&(id as u32)));
        }
    }

    #[test]
    fn shared_coefficients_across_tables() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let coeffs = Arc::new(Coefficients::generate(4, &mut rng));

        let mut a = Table::new_linked(101, Arc::clone(&coeffs));
        let mut b = Table::new_linked(101, Arc::clone(&coeffs));
        let fp = [5, 6, 7, 8];
        let products = coeffs.precompute(&fp).unwrap();
        a.insert(Probe::shared(&products), 1).unwrap();
        b.insert(Probe::single(&fp), 1).unwrap();

        // Same coefficients, same hashes: both tables answer alike.
        let from_a: Vec<u32> = a.lookup(Probe::single(&fp)).unwrap().collect();
        let from_b: Vec<u32> = b.lookup(Probe::shared(&products)).unwrap().collect();
        assert_eq!(from_a, [1]);
        assert_eq!(from_b, [1]);
    }

    #[test]
    fn default_table_size_is_usable() {
        let coeffs = Arc::new(Coefficients::from_parts(vec![1], vec![2]).unwrap());
        let mut table = Table::new_linked(DEFAULT_TABLE_SIZE, coeffs);
        table.insert(Probe::single(&[123]), 0).unwrap();
        assert_eq!(table.lookup(Probe::single(&[123])).unwrap().count(), 1);
    }
}
