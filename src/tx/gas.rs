//! Gas parameters carried by every request

use crate::error::{OrchestratorError, OrchestratorResult};

use ethers::types::U256;
use ethers::utils::parse_units;
use serde::Serialize;

/// Legacy gas price and limit applied to every transaction of one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GasPolicy {
    pub gas_price: U256,
    pub gas_limit: U256,
}

impl GasPolicy {
    pub fn new(gas_price: U256, gas_limit: U256) -> OrchestratorResult<Self> {
        if gas_price.is_zero() {
            return Err(OrchestratorError::Validation(
                "gas price must be greater than zero".to_string(),
            ));
        }
        if gas_limit.is_zero() {
            return Err(OrchestratorError::Validation(
                "gas limit must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            gas_price,
            gas_limit,
        })
    }

    /// Build from a decimal Gwei fee such as `"1.5"`
    pub fn from_gwei(gas_fee_gwei: &str, gas_limit: u64) -> OrchestratorResult<Self> {
        let gas_fee_gwei = gas_fee_gwei.trim();
        if gas_fee_gwei.starts_with('-') {
            return Err(OrchestratorError::Validation(
                "gas fee must be positive".to_string(),
            ));
        }
        let gas_price: U256 = parse_units(gas_fee_gwei, "gwei")
            .map_err(|e| OrchestratorError::Validation(format!("invalid gas fee: {}", e)))?
            .into();
        Self::new(gas_price, U256::from(gas_limit))
    }

    /// Worst-case cost in wei of one transaction under this policy
    pub fn max_cost(&self) -> U256 {
        self.gas_limit.saturating_mul(self.gas_price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_gwei() {
        let gas = GasPolicy::from_gwei("1.5", 300_000).unwrap();
        assert_eq!(gas.gas_price, U256::from(1_500_000_000u64));
        assert_eq!(gas.max_cost(), U256::from(450_000_000_000_000u64));
    }

    #[test]
    fn test_rejects_zero_and_garbage() {
        assert!(GasPolicy::from_gwei("0", 300_000).is_err());
        assert!(GasPolicy::from_gwei("1", 0).is_err());
        assert!(GasPolicy::from_gwei("fast", 300_000).is_err());
        assert!(GasPolicy::from_gwei("-2", 300_000).is_err());
    }
}
