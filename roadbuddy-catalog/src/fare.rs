use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FareConfig {
    /// Digits kept after the decimal point (2 for cents).
    pub minor_unit_digits: u32,
}

impl Default for FareConfig {
    fn default() -> Self {
        Self { minor_unit_digits: 2 }
    }
}

/// Seat count × per-seat price, rounded half-up to the currency minor unit.
#[derive(Debug, Clone, Default)]
pub struct FareCalculator {
    config: FareConfig,
}

impl FareCalculator {
    pub fn new(config: FareConfig) -> Self {
        Self { config }
    }

    pub fn compute_total(&self, price_per_seat: Decimal, seat_count: u32) -> Result<Decimal, FareError> {
        if seat_count < 1 {
            return Err(FareError::InvalidSeatCount(seat_count));
        }
        if price_per_seat.is_sign_negative() && !price_per_seat.is_zero() {
            return Err(FareError::NegativePrice(price_per_seat));
        }

        let total = price_per_seat
            .checked_mul(Decimal::from(seat_count))
            .ok_or(FareError::Overflow)?;

        // Prices are non-negative here, so away-from-zero is half-up.
        Ok(total.round_dp_with_strategy(
            self.config.minor_unit_digits,
            RoundingStrategy::MidpointAwayFromZero,
        ))
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FareError {
    #[error("Seat count must be at least 1, got {0}")]
    InvalidSeatCount(u32),

    #[error("Price per seat must not be negative, got {0}")]
    NegativePrice(Decimal),

    #[error("Fare exceeds representable range")]
    Overflow,
}
