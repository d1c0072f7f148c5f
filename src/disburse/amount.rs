//! Randomized transfer amounts at fixed decimal precision

use crate::error::{DisburseError, DisburseResult};

use ethers::types::U256;
use rand::Rng;

/// Decimals of the native token
const NATIVE_DECIMALS: u32 = 18;

/// Closed token range sampled on a fixed decimal grid
///
/// Amounts are drawn uniformly from the integers
/// `[ceil(min * 10^d), floor(max * 10^d)]` and scaled to wei, so every sample
/// lies inside `[min, max]` exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmountRange {
    low_units: u64,
    high_units: u64,
    decimals: u32,
}

impl AmountRange {
    pub fn new(min: f64, max: f64, decimals: u32) -> DisburseResult<Self> {
        if !min.is_finite() || !max.is_finite() || min <= 0.0 {
            return Err(DisburseError::Config(format!(
                "Amount bounds must be positive numbers, got [{}, {}]",
                min, max
            )));
        }
        if min > max {
            return Err(DisburseError::Config(format!(
                "MIN_AMOUNT {} is greater than MAX_AMOUNT {}",
                min, max
            )));
        }
        if decimals > NATIVE_DECIMALS {
            return Err(DisburseError::Config(format!(
                "Amount precision {} exceeds {} decimals",
                decimals, NATIVE_DECIMALS
            )));
        }

        let scale = 10f64.powi(decimals as i32);
        let low = snap(min * scale).ceil();
        let high = snap(max * scale).floor();

        if low > high {
            return Err(DisburseError::Config(format!(
                "No amount with {} decimals lies in [{}, {}]",
                decimals, min, max
            )));
        }
        if high >= u64::MAX as f64 {
            return Err(DisburseError::Config(format!(
                "MAX_AMOUNT {} is too large",
                max
            )));
        }

        Ok(Self {
            low_units: low as u64,
            high_units: high as u64,
            decimals,
        })
    }

    /// Draw an amount in wei
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> U256 {
        let units = rng.gen_range(self.low_units..=self.high_units);
        self.to_wei(units)
    }

    pub fn random_amount(&self) -> U256 {
        self.sample(&mut rand::thread_rng())
    }

    pub fn min_wei(&self) -> U256 {
        self.to_wei(self.low_units)
    }

    pub fn max_wei(&self) -> U256 {
        self.to_wei(self.high_units)
    }

    fn to_wei(&self, units: u64) -> U256 {
        U256::from(units) * U256::exp10((NATIVE_DECIMALS - self.decimals) as usize)
    }
}

/// Absorb float noise such as 0.001 * 1000 = 1.0000000000000002
fn snap(value: f64) -> f64 {
    let rounded = value.round();
    if (value - rounded).abs() < 1e-6 {
        rounded
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::utils::parse_ether;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_default_range_bounds() {
        let range = AmountRange::new(0.001, 0.005, 3).unwrap();
        assert_eq!(range.min_wei(), parse_ether("0.001").unwrap());
        assert_eq!(range.max_wei(), parse_ether("0.005").unwrap());
    }

    #[test]
    fn test_samples_stay_within_bounds() {
        let range = AmountRange::new(0.001, 0.005, 3).unwrap();
        let min = parse_ether("0.001").unwrap();
        let max = parse_ether("0.005").unwrap();
        let step = parse_ether("0.001").unwrap();
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..1000 {
            let amount = range.sample(&mut rng);
            assert!(amount >= min && amount <= max, "{} out of range", amount);
            assert!((amount % step).is_zero(), "{} not on 3-decimal grid", amount);
        }
    }

    #[test]
    fn test_bounds_off_grid_are_tightened() {
        // Only 0.002 and 0.003 are representable with 3 decimals
        let range = AmountRange::new(0.0015, 0.0035, 3).unwrap();
        assert_eq!(range.min_wei(), parse_ether("0.002").unwrap());
        assert_eq!(range.max_wei(), parse_ether("0.003").unwrap());
    }

    #[test]
    fn test_degenerate_range() {
        let range = AmountRange::new(0.001, 0.001, 3).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(range.sample(&mut rng), parse_ether("0.001").unwrap());
    }

    #[test]
    fn test_invalid_ranges() {
        assert!(AmountRange::new(0.005, 0.001, 3).is_err());
        assert!(AmountRange::new(0.0, 0.001, 3).is_err());
        assert!(AmountRange::new(0.0011, 0.0019, 3).is_err());
        assert!(AmountRange::new(0.001, 0.005, 19).is_err());
        assert!(AmountRange::new(f64::NAN, 0.005, 3).is_err());
    }
}
