use crate::table::TableKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LshError {
    #[error("fingerprint has {got} lanes, hash coefficients cover {want}")]
    DimensionMismatch { want: usize, got: usize },

    #[error("u-vector has {got} lanes, expected {want} (full) or half of it")]
    UVectorLength { want: usize, got: usize },

    #[error("coefficient vectors must not be empty")]
    EmptyCoefficients,

    #[error("coefficient vectors have mismatched lengths: main {main}, control {control}")]
    CoefficientLengths { main: usize, control: usize },

    #[error("coefficient {value} is outside [1, 2^29)")]
    CoefficientRange { value: u32 },

    #[error("bucket length field needs 1..=28 bits, got {bits}")]
    LengthBits { bits: u32 },

    #[error("{fields} overflow offset fields do not fit before a {max_plain}-point primary region")]
    OverflowFields { fields: u32, max_plain: u32 },

    #[error("point index {index} does not fit in {bits} bits")]
    PointIndexWidth { index: u32, bits: u32 },

    #[error("overflow offset {offset} does not fit in {bits} bits")]
    OverflowOffsetWidth { offset: u32, bits: u32 },

    #[error("{op} is not supported by a {kind} table")]
    Unsupported { op: &'static str, kind: TableKind },
}
