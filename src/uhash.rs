//! Universal hashing over 32-bit lane vectors.
//!
//! Every table hashes a fingerprint twice with independent coefficient
//! vectors: the *main* product selects the slot, the *control* product is
//! stored with the bucket to tell apart fingerprints that share a slot.
//! Products are taken modulo [`UH_PRIME`] = 2^32 - 5, reduced per lane by
//! folding the high word back into the low one, so the inner loop never
//! divides.

use crate::error::LshError;
use rand::Rng;

/// The modulus of all lane products: 2^32 - 5.
pub const UH_PRIME: u64 = (1 << 32) - 5;

/// Largest legal hash coefficient; lanes are drawn from `[1, 2^29)`.
pub const MAX_COEFFICIENT: u32 = (1 << 29) - 1;

const LOW_32: u64 = (1 << 32) - 1;

/// Channel indices into the per-u-vector product arrays.
const MAIN: usize = 0;
const CONTROL: usize = 1;

/// A fingerprint to hash: the integer lane vector an LSH projection
/// produced for one point and one table.
#[derive(Clone, Copy, Debug)]
pub enum Fingerprint<'a> {
    /// One lane vector covering all `D` hashed lanes.
    Single(&'a [u32]),
    /// Two lane vectors of `D/2` lanes each, hashed as their
    /// concatenation. This is the shape of a g-function realized as a
    /// pair of u-functions.
    Pair(&'a [u32], &'a [u32]),
}

impl Fingerprint<'_> {
    /// Total number of lanes across all pieces.
    pub fn lanes(&self) -> usize {
        match self {
            Fingerprint::Single(v) => v.len(),
            Fingerprint::Pair(a, b) => a.len() + b.len(),
        }
    }
}

/// Computes `acc + sum(coeffs[i] * lanes[i]) mod UH_PRIME`.
///
/// The accumulator is folded back below the prime after every lane, so all
/// intermediates stay under 2^33 and the 64-bit sum cannot overflow.
fn dot_mod_prime(acc: u32, coeffs: &[u32], lanes: &[u32]) -> u32 {
    debug_assert_eq!(coeffs.len(), lanes.len());
    let mut h = u64::from(acc);
    for (&a, &x) in coeffs.iter().zip(lanes) {
        h += u64::from(a) * u64::from(x);
        h = (h & LOW_32) + 5 * (h >> 32);
        if h >= UH_PRIME {
            h -= UH_PRIME;
        }
        debug_assert!(h < UH_PRIME);
    }
    h as u32
}

/// Hashes a whole fingerprint, indexing `coeffs` linearly across the join
/// of a two-piece fingerprint.
fn fingerprint_product(coeffs: &[u32], fp: Fingerprint) -> u32 {
    match fp {
        Fingerprint::Single(v) => dot_mod_prime(0, coeffs, v),
        Fingerprint::Pair(a, b) => {
            let h = dot_mod_prime(0, &coeffs[..a.len()], a);
            dot_mod_prime(h, &coeffs[a.len()..], b)
        }
    }
}

/// The four lane products precomputed for one u-vector against one
/// coefficient set.
///
/// In the shared-coefficient mode a u-vector is hashed once and the
/// products are reused by every table built on the same coefficients. The
/// leading pair covers the first half of the coefficient lanes (or all of
/// them for a full-length vector); the trailing pair covers the second
/// half and is consumed when this u-vector serves as the trailing piece of
/// a two-piece g-function.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UProducts {
    leading: [u32; 2],
    trailing: [u32; 2],
}

/// Combines precomputed products into the requested hash channel.
///
/// For a single-piece g-function this is just the leading product, which
/// is already below the prime. For a two-piece one, the leading product of
/// the first u-vector and the trailing product of the second are added
/// modulo the prime.
fn combine(first: &UProducts, second: Option<&UProducts>, channel: usize) -> u32 {
    match second {
        None => {
            let h = first.leading[channel];
            debug_assert!(u64::from(h) < UH_PRIME);
            h
        }
        Some(second) => {
            let r = u64::from(first.leading[channel]) + u64::from(second.trailing[channel]);
            if r >= UH_PRIME {
                (r - UH_PRIME) as u32
            } else {
                r as u32
            }
        }
    }
}

/// What `insert` and `lookup` hash: either a raw fingerprint, or products
/// precomputed against coefficients shared across tables.
#[derive(Clone, Copy, Debug)]
pub enum Probe<'a> {
    /// Hash the fingerprint on demand with the table's own coefficients.
    Vector(Fingerprint<'a>),
    /// Combine products precomputed with [`Coefficients::precompute`].
    /// `second` is present exactly when the g-function is a pair of
    /// u-functions; it contributes its trailing products.
    Shared {
        first: &'a UProducts,
        second: Option<&'a UProducts>,
    },
}

impl<'a> Probe<'a> {
    /// A single-piece raw fingerprint.
    pub fn single(lanes: &'a [u32]) -> Self {
        Probe::Vector(Fingerprint::Single(lanes))
    }

    /// A two-piece raw fingerprint hashed as the concatenation
    /// `leading ++ trailing`.
    pub fn pair(leading: &'a [u32], trailing: &'a [u32]) -> Self {
        Probe::Vector(Fingerprint::Pair(leading, trailing))
    }

    /// A precomputed single-piece g-function.
    pub fn shared(first: &'a UProducts) -> Self {
        Probe::Shared {
            first,
            second: None,
        }
    }

    /// A precomputed two-piece g-function.
    pub fn shared_pair(first: &'a UProducts, second: &'a UProducts) -> Self {
        Probe::Shared {
            first,
            second: Some(second),
        }
    }
}

/// The two coefficient vectors of one universal hash family instance.
///
/// Wrap in `std::sync::Arc` to share one instance across several tables;
/// each table holds a handle and the vectors are released with the last
/// one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Coefficients {
    main: Vec<u32>,
    control: Vec<u32>,
}

impl Coefficients {
    /// Draws fresh coefficients, every lane uniform in `[1, 2^29)`.
    pub fn generate<R: Rng + ?Sized>(dims: usize, rng: &mut R) -> Self {
        debug_assert!(dims > 0);
        let mut draw = |_| rng.random_range(1..=MAX_COEFFICIENT);
        Coefficients {
            main: (0..dims).map(&mut draw).collect(),
            control: (0..dims).map(&mut draw).collect(),
        }
    }

    /// Builds a coefficient set from explicit lane vectors, validating
    /// lengths and the `[1, 2^29)` range.
    pub fn from_parts(main: Vec<u32>, control: Vec<u32>) -> Result<Self, LshError> {
        if main.is_empty() {
            return Err(LshError::EmptyCoefficients);
        }
        if main.len() != control.len() {
            return Err(LshError::CoefficientLengths {
                main: main.len(),
                control: control.len(),
            });
        }
        for &value in main.iter().chain(&control) {
            if value == 0 || value > MAX_COEFFICIENT {
                return Err(LshError::CoefficientRange { value });
            }
        }
        Ok(Coefficients { main, control })
    }

    /// Number of hashed lanes `D` this set covers.
    pub fn dims(&self) -> usize {
        self.main.len()
    }

    /// Hashes one u-vector into the products shared by every table built
    /// on these coefficients.
    ///
    /// A vector of `D` lanes fills only the leading products; a vector of
    /// `D/2` lanes is additionally hashed against the trailing coefficient
    /// halves so it can serve as either piece of a two-piece g-function.
    pub fn precompute(&self, u_vector: &[u32]) -> Result<UProducts, LshError> {
        let d = self.dims();
        if u_vector.len() == d {
            Ok(UProducts {
                leading: [
                    dot_mod_prime(0, &self.main, u_vector),
                    dot_mod_prime(0, &self.control, u_vector),
                ],
                trailing: [0, 0],
            })
        } else if u_vector.len() * 2 == d {
            let half = u_vector.len();
            Ok(UProducts {
                leading: [
                    dot_mod_prime(0, &self.main[..half], u_vector),
                    dot_mod_prime(0, &self.control[..half], u_vector),
                ],
                trailing: [
                    dot_mod_prime(0, &self.main[half..], u_vector),
                    dot_mod_prime(0, &self.control[half..], u_vector),
                ],
            })
        } else {
            Err(LshError::UVectorLength {
                want: d,
                got: u_vector.len(),
            })
        }
    }

    /// Resolves a probe to its `(slot, control)` pair for a table of
    /// `table_size` slots.
    pub(crate) fn locate(
        &self,
        probe: Probe,
        table_size: usize,
    ) -> Result<(usize, u32), LshError> {
        let (slot_hash, control) = match probe {
            Probe::Vector(fp) => {
                if fp.lanes() != self.dims() {
                    return Err(LshError::DimensionMismatch {
                        want: self.dims(),
                        got: fp.lanes(),
                    });
                }
                (
                    fingerprint_product(&self.main, fp),
                    fingerprint_product(&self.control, fp),
                )
            }
            Probe::Shared { first, second } => (
                combine(first, second, MAIN),
                combine(first, second, CONTROL),
            ),
        };
        Ok((slot_hash as usize % table_size, control))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    /// Reference product over u128, no incremental reduction.
    fn naive_product(coeffs: &[u32], lanes: &[u32]) -> u32 {
        let sum: u128 = coeffs
            .iter()
            .zip(lanes)
            .map(|(&a, &x)| u128::from(a) * u128::from(x))
            .sum();
        (sum % u128::from(UH_PRIME)) as u32
    }

    #[test]
    fn folded_product_matches_naive() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for dims in [1, 2, 7, 64, 257] {
            let coeffs = Coefficients::generate(dims, &mut rng);
            let lanes: Vec<u32> = (0..dims).map(|_| rng.random()).collect();
            assert_eq!(
                fingerprint_product(&coeffs.main, Fingerprint::Single(&lanes)),
                naive_product(&coeffs.main, &lanes),
            );
        }
    }

    #[test]
    fn pair_matches_concatenated_single() {
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let coeffs = Coefficients::generate(16, &mut rng);
        let lanes: Vec<u32> = (0..16).map(|_| rng.random()).collect();
        let (a, b) = lanes.split_at(8);
        assert_eq!(
            fingerprint_product(&coeffs.main, Fingerprint::Pair(a, b)),
            fingerprint_product(&coeffs.main, Fingerprint::Single(&lanes)),
        );
    }

    #[test]
    fn precomputed_mode_matches_on_demand() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let coeffs = Coefficients::generate(8, &mut rng);

        // Single-piece g-function.
        let g: Vec<u32> = (0..8).map(|_| rng.random()).collect();
        let products = coeffs.precompute(&g).unwrap();
        let on_demand = coeffs.locate(Probe::single(&g), 1_017_881).unwrap();
        let shared = coeffs.locate(Probe::shared(&products), 1_017_881).unwrap();
        assert_eq!(on_demand, shared);

        // Two-piece g-function built from two u-vectors of 4 lanes.
        let u1: Vec<u32> = (0..4).map(|_| rng.random()).collect();
        let u2: Vec<u32> = (0..4).map(|_| rng.random()).collect();
        let p1 = coeffs.precompute(&u1).unwrap();
        let p2 = coeffs.precompute(&u2).unwrap();
        let on_demand = coeffs.locate(Probe::pair(&u1, &u2), 997).unwrap();
        let shared = coeffs.locate(Probe::shared_pair(&p1, &p2), 997).unwrap();
        assert_eq!(on_demand, shared);
    }

    #[test]
    fn generated_coefficients_are_in_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(10);
        let coeffs = Coefficients::generate(1000, &mut rng);
        for &value in coeffs.main.iter().chain(&coeffs.control) {
            assert!(value >= 1 && value <= MAX_COEFFICIENT);
        }
    }

    #[test]
    fn from_parts_validates() {
        assert!(matches!(
            Coefficients::from_parts(vec![], vec![]),
            Err(LshError::EmptyCoefficients)
        ));
        assert!(matches!(
            Coefficients::from_parts(vec![1, 2], vec![3]),
            Err(LshError::CoefficientLengths { .. })
        ));
        assert!(matches!(
            Coefficients::from_parts(vec![1, 0], vec![2, 3]),
            Err(LshError::CoefficientRange { value: 0 })
        ));
        assert!(matches!(
            Coefficients::from_parts(vec![1 << 29], vec![2]),
            Err(LshError::CoefficientRange { .. })
        ));
        assert!(Coefficients::from_parts(vec![1, 2], vec![3, 4]).is_ok());
    }

    #[test]
    fn precompute_rejects_odd_lengths() {
        let coeffs = Coefficients::from_parts(vec![1, 2, 3, 4], vec![5, 6, 7, 8]).unwrap();
        assert!(coeffs.precompute(&[1, 2, 3, 4]).is_ok());
        assert!(coeffs.precompute(&[1, 2]).is_ok());
        assert!(matches!(
            coeffs.precompute(&[1, 2, 3]),
            Err(LshError::UVectorLength { want: 4, got: 3 })
        ));
    }

    #[test]
    fn locate_rejects_wrong_dims() {
        let coeffs = Coefficients::from_parts(vec![1, 2], vec![3, 4]).unwrap();
        assert!(matches!(
            coeffs.locate(Probe::single(&[1, 2, 3]), 7),
            Err(LshError::DimensionMismatch { want: 2, got: 3 })
        ));
    }
}
