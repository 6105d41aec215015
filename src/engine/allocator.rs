//! Fixed-fraction splitting of a payout pool.

use crate::domain::Decimal;
use thiserror::Error;

/// Splits a pool amount into winner shares by fixed fractions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayoutAllocator {
    fractions: Vec<Decimal>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AllocatorError {
    #[error("payout fractions must sum to 1.0, got {0}")]
    BadSum(Decimal),
    #[error("payout fractions must all be positive")]
    NonPositiveFraction,
    #[error("at least one payout fraction is required")]
    Empty,
}

impl PayoutAllocator {
    /// Build an allocator from ordered winner fractions (first place first).
    ///
    /// # Errors
    /// Rejects empty, non-positive, or non-unit-sum fraction lists.
    pub fn new(fractions: Vec<Decimal>) -> Result<Self, AllocatorError> {
        if fractions.is_empty() {
            return Err(AllocatorError::Empty);
        }
        if fractions.iter().any(|f| !f.is_positive()) {
            return Err(AllocatorError::NonPositiveFraction);
        }
        let sum: Decimal = fractions.iter().copied().sum();
        if sum != Decimal::one() {
            return Err(AllocatorError::BadSum(sum));
        }
        Ok(PayoutAllocator { fractions })
    }

    /// Number of winner shares this allocator produces.
    pub fn share_count(&self) -> usize {
        self.fractions.len()
    }

    /// Split `pool_amount` into one full-precision share per fraction.
    ///
    /// No rounding correction is applied; sub-minimum shares are rejected
    /// later, at transfer time, not here.
    pub fn allocate(&self, pool_amount: Decimal) -> Vec<Decimal> {
        self.fractions
            .iter()
            .map(|fraction| pool_amount * *fraction)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn default_allocator() -> PayoutAllocator {
        PayoutAllocator::new(vec![d("0.80"), d("0.15"), d("0.05")]).unwrap()
    }

    #[test]
    fn test_split_of_300() {
        let shares = default_allocator().allocate(d("300"));
        assert_eq!(shares, vec![d("240"), d("45"), d("15")]);
        let total: Decimal = shares.into_iter().sum();
        assert_eq!(total, d("300"));
    }

    #[test]
    fn test_full_precision_shares() {
        let shares = default_allocator().allocate(d("1.01"));
        assert_eq!(shares[0], d("0.808"));
        assert_eq!(shares[1], d("0.1515"));
        assert_eq!(shares[2], d("0.0505"));
    }

    #[test]
    fn test_rejects_bad_sum() {
        let err = PayoutAllocator::new(vec![d("0.80"), d("0.15")]).unwrap_err();
        assert_eq!(err, AllocatorError::BadSum(d("0.95")));
    }

    #[test]
    fn test_rejects_zero_fraction() {
        let err = PayoutAllocator::new(vec![d("1.0"), d("0")]).unwrap_err();
        assert_eq!(err, AllocatorError::NonPositiveFraction);
    }

    #[test]
    fn test_rejects_empty() {
        assert_eq!(
            PayoutAllocator::new(vec![]).unwrap_err(),
            AllocatorError::Empty
        );
    }
}
