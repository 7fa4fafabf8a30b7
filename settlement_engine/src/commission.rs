//! Commission calculator.
//!
//! Splits a gross charge amount into `{processor fee, platform fee, payee amount}` using integer arithmetic on minor
//! currency units. The payee amount is always the remainder after the two fees, so
//! `processor_fee + platform_fee + payee_amount == gross` holds by construction and is never subject to rounding.
//! Pure, no I/O, safe to share across threads.

use mps_common::MinorUnits;
use serde::Serialize;
use thiserror::Error;

/// Rates are expressed in basis points (1 bps = 0.01%) so that they stay in integer arithmetic end to end.
pub const BPS_DENOMINATOR: i128 = 10_000;

pub const DEFAULT_PROCESSOR_RATE_BPS: u32 = 290;
pub const DEFAULT_PROCESSOR_FIXED_FEE: MinorUnits = MinorUnits::from_cents(30);
pub const DEFAULT_PLATFORM_RATE_BPS: u32 = 2000;
/// The processor rejects charges below this amount.
pub const DEFAULT_MINIMUM_CHARGE: MinorUnits = MinorUnits::from_cents(50);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommissionError {
    #[error("Charge amount must be positive, got {0}")]
    NonPositiveAmount(MinorUnits),
    #[error("Charge amount {gross} is below the minimum of {minimum}")]
    BelowMinimumCharge { gross: MinorUnits, minimum: MinorUnits },
    #[error("Fees ({fees}) meet or exceed the gross amount ({gross})")]
    FeesExceedGross { gross: MinorUnits, fees: MinorUnits },
}

/// The fee schedule applied to every charge. Processor rate and fixed fee mirror the processor's published pricing
/// and are configuration, not business logic.
#[derive(Debug, Clone, Copy)]
pub struct CommissionSchedule {
    pub processor_rate_bps: u32,
    pub processor_fixed_fee: MinorUnits,
    pub platform_rate_bps: u32,
    pub minimum_charge: MinorUnits,
}

impl Default for CommissionSchedule {
    fn default() -> Self {
        Self {
            processor_rate_bps: DEFAULT_PROCESSOR_RATE_BPS,
            processor_fixed_fee: DEFAULT_PROCESSOR_FIXED_FEE,
            platform_rate_bps: DEFAULT_PLATFORM_RATE_BPS,
            minimum_charge: DEFAULT_MINIMUM_CHARGE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommissionSplit {
    pub gross: MinorUnits,
    pub processor_fee: MinorUnits,
    pub platform_fee: MinorUnits,
    pub payee_amount: MinorUnits,
}

impl CommissionSchedule {
    pub fn split(&self, gross: MinorUnits) -> Result<CommissionSplit, CommissionError> {
        if !gross.is_positive() {
            return Err(CommissionError::NonPositiveAmount(gross));
        }
        if gross < self.minimum_charge {
            return Err(CommissionError::BelowMinimumCharge { gross, minimum: self.minimum_charge });
        }
        let processor_fee = round_rate(gross, self.processor_rate_bps) + self.processor_fixed_fee;
        let net = gross - processor_fee;
        if !net.is_positive() {
            return Err(CommissionError::FeesExceedGross { gross, fees: processor_fee });
        }
        let platform_fee = round_rate(net, self.platform_rate_bps);
        let payee_amount = net - platform_fee;
        Ok(CommissionSplit { gross, processor_fee, platform_fee, payee_amount })
    }
}

/// `amount × rate`, rounded half-to-even on minor units. Banker's rounding keeps the fee unbiased over many charges;
/// plain half-up would systematically overcharge.
fn round_rate(amount: MinorUnits, rate_bps: u32) -> MinorUnits {
    debug_assert!(!amount.is_negative());
    let numerator = amount.value() as i128 * rate_bps as i128;
    let quotient = numerator / BPS_DENOMINATOR;
    let remainder = numerator % BPS_DENOMINATOR;
    let half = BPS_DENOMINATOR / 2;
    let rounded = match remainder.cmp(&half) {
        std::cmp::Ordering::Less => quotient,
        std::cmp::Ordering::Greater => quotient + 1,
        std::cmp::Ordering::Equal => {
            if quotient % 2 == 0 {
                quotient
            } else {
                quotient + 1
            }
        },
    };
    #[allow(clippy::cast_possible_truncation)]
    MinorUnits::from(rounded as i64)
}

#[cfg(test)]
mod test {
    use super::*;

    fn schedule() -> CommissionSchedule {
        CommissionSchedule::default()
    }

    #[test]
    fn reference_split_for_one_hundred_dollars() {
        // gross = $100.00: processor fee = 2.9% + 30¢ = 320¢, net = 9680¢, platform = 20% = 1936¢, payee = 7744¢
        let split = schedule().split(MinorUnits::from(10_000)).unwrap();
        assert_eq!(split.processor_fee, MinorUnits::from(320));
        assert_eq!(split.platform_fee, MinorUnits::from(1936));
        assert_eq!(split.payee_amount, MinorUnits::from(7744));
        assert_eq!(split.processor_fee + split.platform_fee + split.payee_amount, split.gross);
    }

    #[test]
    fn money_is_conserved_for_every_amount() {
        let schedule = schedule();
        for cents in 50..=25_000i64 {
            let gross = MinorUnits::from(cents);
            let split = schedule.split(gross).expect("amount above minimum must split");
            assert_eq!(
                split.processor_fee + split.platform_fee + split.payee_amount,
                gross,
                "conservation violated at {gross}"
            );
            assert!(!split.payee_amount.is_negative(), "negative payee amount at {gross}");
        }
    }

    #[test]
    fn half_to_even_rounding() {
        // 250 × 2.9% = 7.25 rounds down to 7; 750 × 2.9% = 21.75 rounds up to 22.
        assert_eq!(round_rate(MinorUnits::from(250), 290), MinorUnits::from(7));
        assert_eq!(round_rate(MinorUnits::from(750), 290), MinorUnits::from(22));
        // Exact halves: 2500 × 2.9% = 72.5 → 72 (even); 17500 × 2.9% = 507.5 → 508 (507 is odd).
        assert_eq!(round_rate(MinorUnits::from(2500), 290), MinorUnits::from(72));
        assert_eq!(round_rate(MinorUnits::from(17_500), 290), MinorUnits::from(508));
    }

    #[test]
    fn rejects_amounts_below_minimum() {
        let err = schedule().split(MinorUnits::from(49)).unwrap_err();
        assert!(matches!(err, CommissionError::BelowMinimumCharge { .. }));
        let err = schedule().split(MinorUnits::from(0)).unwrap_err();
        assert!(matches!(err, CommissionError::NonPositiveAmount(_)));
        let err = schedule().split(MinorUnits::from(-100)).unwrap_err();
        assert!(matches!(err, CommissionError::NonPositiveAmount(_)));
    }
}
