//! Compute-unit metering for deterministic execution
//!
//! Every kernel operation has a fixed integer cost. A [`ComputeBudget`] is
//! charged before the work runs, so an exhausted budget aborts without doing
//! the expensive part.

use crate::{Error, Result};
use tracing::warn;

/// Metered operations and their unit costs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// Modular addition or subtraction
    FieldAdd,
    /// Modular multiplication
    FieldMul,
    /// Fermat inversion (256 squarings plus multiplications)
    FieldInverse,
    /// Affine point addition
    PointAdd,
    /// Affine point doubling
    PointDouble,
    /// One double-and-add step of the scalar multiplication ladder
    LadderStep,
    /// One 32-byte word absorbed by the challenge hash
    HashWord,
    /// Comparison of an encoded integer against a modulus
    RangeCheck,
    /// Curve equation check of a decoded point
    CurveCheck,
}

impl Op {
    pub const fn cost(self) -> u64 {
        match self {
            Op::FieldAdd => 1,
            Op::FieldMul => 4,
            Op::FieldInverse => 1_100,
            Op::PointAdd => 1_116,
            Op::PointDouble => 1_120,
            Op::LadderStep => 82,
            Op::HashWord => 30,
            Op::RangeCheck => 2,
            Op::CurveCheck => 14,
        }
    }
}

/// Bits processed by every scalar multiplication
pub const LADDER_STEPS: u64 = 256;

/// Cost of one scalar multiplication including the final normalization
pub const fn scalar_mul_cost() -> u64 {
    LADDER_STEPS * Op::LadderStep.cost() + Op::FieldInverse.cost() + 3 * Op::FieldMul.cost()
}

/// Cost of verifying one signature; identical for every well-formed input
pub const fn verification_cost() -> u64 {
    // s, R.x, R.y, P.x, P.y
    5 * Op::RangeCheck.cost()
        // R and P
        + 2 * Op::CurveCheck.cost()
        // R.x || R.y || P.x || P.y || m
        + 5 * Op::HashWord.cost()
        + Op::RangeCheck.cost()
        // s*G and e*P
        + 2 * scalar_mul_cost()
        + Op::PointAdd.cost()
}

/// Default per-call limit for a single verification
pub const DEFAULT_VERIFY_BUDGET: u64 = 50_000;

/// Running compute budget for one metered call
#[derive(Debug, Clone)]
pub struct ComputeBudget {
    limit: u64,
    consumed: u64,
}

impl ComputeBudget {
    pub fn new(limit: u64) -> Self {
        Self { limit, consumed: 0 }
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    pub fn remaining(&self) -> u64 {
        self.limit - self.consumed
    }

    /// Charge `count` executions of `op`, failing if the limit would be passed.
    ///
    /// A failed charge leaves the budget untouched.
    pub fn charge(&mut self, op: Op, count: u64) -> Result<()> {
        let required = op
            .cost()
            .checked_mul(count)
            .and_then(|units| units.checked_add(self.consumed));

        match required {
            Some(required) if required <= self.limit => {
                self.consumed = required;
                Ok(())
            }
            _ => {
                let required = required.unwrap_or(u64::MAX);
                warn!(?op, count, limit = self.limit, required, "Compute budget exceeded");
                Err(Error::BudgetExceeded {
                    limit: self.limit,
                    required,
                })
            }
        }
    }

    /// Charge the fixed cost of a scalar multiplication
    pub fn charge_scalar_mul(&mut self) -> Result<()> {
        self.charge(Op::LadderStep, LADDER_STEPS)?;
        self.charge(Op::FieldInverse, 1)?;
        self.charge(Op::FieldMul, 3)
    }
}

impl Default for ComputeBudget {
    fn default() -> Self {
        Self::new(DEFAULT_VERIFY_BUDGET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charge_accumulates() {
        let mut budget = ComputeBudget::new(100);
        budget.charge(Op::FieldMul, 5).unwrap();
        budget.charge(Op::FieldAdd, 3).unwrap();
        assert_eq!(budget.consumed(), 23);
        assert_eq!(budget.remaining(), 77);
    }

    #[test]
    fn test_exceeding_leaves_budget_untouched() {
        let mut budget = ComputeBudget::new(10);
        budget.charge(Op::FieldMul, 2).unwrap();
        let err = budget.charge(Op::FieldMul, 1).unwrap_err();
        assert!(matches!(err, Error::BudgetExceeded { limit: 10, required: 12 }));
        assert_eq!(budget.consumed(), 8);
    }

    #[test]
    fn test_overflow_is_rejected() {
        let mut budget = ComputeBudget::new(u64::MAX);
        assert!(budget.charge(Op::FieldInverse, u64::MAX).is_err());
        assert_eq!(budget.consumed(), 0);

        // The sum overflowing is rejected the same way as the product.
        budget.charge(Op::FieldAdd, u64::MAX - 1).unwrap();
        assert!(matches!(
            budget.charge(Op::FieldMul, 1),
            Err(Error::BudgetExceeded { limit: u64::MAX, .. })
        ));
        assert_eq!(budget.consumed(), u64::MAX - 1);
        assert_eq!(budget.remaining(), 1);
    }

    #[test]
    fn test_verification_fits_default_budget() {
        assert!(verification_cost() <= DEFAULT_VERIFY_BUDGET);
        let mut budget = ComputeBudget::default();
        budget.charge_scalar_mul().unwrap();
        assert_eq!(budget.consumed(), scalar_mul_cost());
    }
}
