//! Fixed-point and integer math utilities for deterministic simulation.
//!
//! Anything that feeds gameplay decisions (distances, path costs) is
//! computed with integers or fixed-point values. Floating-point math can
//! produce different results on different CPUs.

use fixed::types::I32F32;

/// Fixed-point number type for simulation math.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
pub type Fixed = I32F32;

/// √2 in fixed-point, the relative cost of a diagonal step.
pub const SQRT2: Fixed = Fixed::from_bits(0x1_6A09_E667);

/// Serde support for fixed-point numbers.
///
/// Serializes fixed-point numbers as their raw bit representation (i64)
/// to preserve exact precision across serialization boundaries.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as its raw bit representation.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a fixed-point number from its raw bit representation.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}

/// Integer square root (floor) using binary search.
#[must_use]
pub fn isqrt(value: u64) -> u64 {
    if value < 2 {
        return value;
    }

    let mut low = 1u64;
    let mut high = value.min(u64::from(u32::MAX));

    while low <= high {
        let mid = low + (high - low) / 2;
        match mid.checked_mul(mid) {
            Some(sq) if sq <= value => low = mid + 1,
            _ => high = mid - 1,
        }
    }

    high
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isqrt_exact_squares() {
        for n in 0u64..200 {
            assert_eq!(isqrt(n * n), n);
        }
    }

    #[test]
    fn test_isqrt_floors() {
        assert_eq!(isqrt(2), 1);
        assert_eq!(isqrt(8), 2);
        assert_eq!(isqrt(99), 9);
        assert_eq!(isqrt(u64::MAX), u64::from(u32::MAX));
    }

    #[test]
    fn test_sqrt2_precision() {
        let sq = SQRT2 * SQRT2;
        let two = Fixed::from_num(2);
        let epsilon = Fixed::ONE / Fixed::from_num(1_000_000);
        assert!((sq - two).abs() < epsilon, "sqrt2² = {sq:?}");
    }

    #[test]
    fn test_fixed_determinism() {
        // Same operations must produce identical results
        let a = Fixed::from_num(1) / Fixed::from_num(3);
        let b = Fixed::from_num(1) / Fixed::from_num(3);
        assert_eq!(a, b);
        assert_eq!(a * SQRT2, b * SQRT2);
    }
}
