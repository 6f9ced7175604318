//! Metric records extracted from Etherscan responses and their database representation.

use crate::database::record::Record;
use crate::database::record::Value;
use crate::error::Error;
use chrono::DateTime;
use chrono::Utc;
use num_bigint::BigUint;

/// Table and column names of `gas_metrics`; the camel case matches the field names of the gas oracle.
pub mod gas_metrics {
    pub const TABLE: &str = "gas_metrics";
    pub const LAST_BLOCK: &str = "lastBlock";
    pub const SAFE_GAS_PRICE: &str = "safeGasPrice";
    pub const PROPOSE_GAS_PRICE: &str = "proposeGasPrice";
    pub const FAST_GAS_PRICE: &str = "fastGasPrice";
    pub const SUGGEST_BASE_FEE: &str = "suggestBaseFee";
}

/// Table and column names of `block_metrics`.
pub mod block_metrics {
    pub const TABLE: &str = "block_metrics";
    pub const BLOCK_HEIGHT: &str = "block_height";
    pub const TRANSACTION_COUNT: &str = "transaction_count";
    pub const TOTAL_FEES: &str = "total_fees";
    pub const CREATED_AT: &str = "created_at";
}

/// Fee oracle snapshot for one block height. Prices are decimal strings in Gwei, kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasMetric {
    pub block_height: u64,
    pub safe_gas_price: String,
    pub propose_gas_price: String,
    pub fast_gas_price: String,
    pub suggested_base_fee: String,
}

impl GasMetric {
    pub fn to_record(&self) -> Result<Record, Error> {
        Record::new(gas_metrics::TABLE, gas_metrics::LAST_BLOCK, Value::text(self.block_height.to_string()))?
            .with(gas_metrics::SAFE_GAS_PRICE, Value::text(&self.safe_gas_price))?
            .with(gas_metrics::PROPOSE_GAS_PRICE, Value::text(&self.propose_gas_price))?
            .with(gas_metrics::FAST_GAS_PRICE, Value::text(&self.fast_gas_price))?
            .with(gas_metrics::SUGGEST_BASE_FEE, Value::text(&self.suggested_base_fee))
    }
}

/// Aggregates of one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMetric {
    /// Always fits into a signed 64-bit integer, see [`crate::parser::block_metric`].
    pub block_height: u64,
    pub transaction_count: u64,

    /// Sum of all transaction gas prices multiplied by the gas used by the block, in Wei.
    pub total_fees: BigUint,
    pub created_at: DateTime<Utc>,
}

impl BlockMetric {
    pub fn to_record(&self) -> Result<Record, Error> {
        let block_height = i64::try_from(self.block_height)
            .map_err(|_| Error::PayloadOutOfRange("number", self.block_height.to_string()))?;
        let transaction_count = i64::try_from(self.transaction_count)
            .map_err(|_| Error::PayloadOutOfRange("transactions", self.transaction_count.to_string()))?;

        Record::new(block_metrics::TABLE, block_metrics::BLOCK_HEIGHT, Value::BigInt(block_height))?
            .with(block_metrics::TRANSACTION_COUNT, Value::BigInt(transaction_count))?
            .with(block_metrics::TOTAL_FEES, Value::numeric(&self.total_fees))?
            .with(block_metrics::CREATED_AT, Value::Timestamp(self.created_at))
    }
}

#[cfg(test)]
mod tests {
    use super::BlockMetric;
    use super::GasMetric;
    use crate::database::record::Value;
    use chrono::TimeZone;
    use chrono::Utc;
    use num_bigint::BigUint;

    #[test]
    fn gas_record() {
        let metric = GasMetric {
            block_height: 123,
            safe_gas_price: "10".to_string(),
            propose_gas_price: "12".to_string(),
            fast_gas_price: "15".to_string(),
            suggested_base_fee: "9.5".to_string(),
        };

        let record = metric.to_record().unwrap();
        assert_eq!(record.table().as_str(), "gas_metrics");
        assert_eq!(record.key_field().as_str(), "lastBlock");
        assert_eq!(record.key_value(), &Value::text("123"));

        let columns: Vec<(&str, &Value)> = record.columns().iter().map(|(name, value)| (name.as_str(), value)).collect();
        assert_eq!(
            columns,
            vec![
                ("fastGasPrice", &Value::text("15")),
                ("proposeGasPrice", &Value::text("12")),
                ("safeGasPrice", &Value::text("10")),
                ("suggestBaseFee", &Value::text("9.5")),
            ]
        );
    }

    #[test]
    fn block_record() {
        let metric = BlockMetric {
            block_height: 42,
            transaction_count: 2,
            total_fees: BigUint::from(300u32),
            created_at: Utc.timestamp_opt(100_000_000, 0).unwrap(),
        };

        let record = metric.to_record().unwrap();
        assert_eq!(record.table().as_str(), "block_metrics");
        assert_eq!(record.key_value(), &Value::BigInt(42));
        assert_eq!(record.columns().len(), 3);

        let total_fees = record.columns().iter().find(|(column, _)| column.as_str() == "total_fees");
        assert_eq!(total_fees.map(|(_, value)| value), Some(&Value::Numeric("300".to_string())));
    }

    #[test]
    fn block_record_out_of_range() {
        let metric = BlockMetric {
            block_height: u64::MAX,
            transaction_count: 0,
            total_fees: BigUint::from(0u32),
            created_at: Utc.timestamp_opt(0, 0).unwrap(),
        };

        assert!(metric.to_record().is_err());
    }
}
