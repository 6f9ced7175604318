//! Parser responsible for extracting typed metrics from raw Etherscan response bodies.
//!
//! Every body is deserialized exactly once into the structs below, all of whose fields are optional. A field
//! that is absent (or `null`) is reported as [`Error::PayloadMissingField`], a field with the wrong JSON type
//! fails deserialization altogether. Blockchain quantities arrive as `0x` prefixed hex strings, see
//! [`decode_hex`].

use crate::error::Error;
use crate::model::BlockMetric;
use crate::model::GasMetric;
use chrono::TimeZone;
use chrono::Utc;
use num_bigint::BigUint;
use num_traits::ToPrimitive;
use num_traits::Zero;
use serde::Deserialize;

#[derive(Deserialize)]
struct Envelope<T> {
    result: Option<T>,
}

#[derive(Deserialize)]
struct GasOracle {
    #[serde(rename = "LastBlock")]
    last_block: Option<String>,

    #[serde(rename = "SafeGasPrice")]
    safe_gas_price: Option<String>,

    #[serde(rename = "ProposeGasPrice")]
    propose_gas_price: Option<String>,

    #[serde(rename = "FastGasPrice")]
    fast_gas_price: Option<String>,

    #[serde(rename = "suggestBaseFee")]
    suggest_base_fee: Option<String>,
}

#[derive(Deserialize)]
struct Block {
    number: Option<String>,
    timestamp: Option<String>,

    #[serde(rename = "gasUsed")]
    gas_used: Option<String>,

    // Only present as objects if the block was requested with `boolean=true`
    transactions: Option<Vec<Transaction>>,
}

#[derive(Deserialize)]
struct Transaction {
    #[serde(rename = "gasPrice")]
    gas_price: Option<String>,
}

#[inline]
fn required(value: Option<String>, field: &'static str) -> Result<String, Error> {
    value.ok_or(Error::PayloadMissingField(field))
}

/// Decodes a hex string with an optional `0x` prefix into an unsigned integer of arbitrary size.
///
/// Unlike [`BigUint::parse_bytes`] this rejects signs and `_` separators.
pub fn decode_hex(value: &str) -> Option<BigUint> {
    let digits = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")).unwrap_or(value);

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }

    BigUint::parse_bytes(digits.as_bytes(), 16)
}

fn decode_hex_field(value: Option<String>, field: &'static str) -> Result<BigUint, Error> {
    let value = required(value, field)?;

    match decode_hex(&value) {
        Some(decoded) => Ok(decoded),
        None => Err(Error::PayloadInvalidHex(field, value)),
    }
}

/// Extracts a [`GasMetric`] from a `module=gastracker&action=gasoracle` response.
pub fn gas_metric(payload: &str) -> Result<GasMetric, Error> {
    let oracle = serde_json::from_str::<Envelope<GasOracle>>(payload)?
        .result
        .ok_or(Error::PayloadMissingResult)?;

    let last_block = required(oracle.last_block, "LastBlock")?;
    let block_height = match last_block.bytes().all(|b| b.is_ascii_digit()) {
        true => last_block.parse::<u64>().map_err(|_| Error::PayloadInvalidDecimal("LastBlock", last_block.clone()))?,
        false => return Err(Error::PayloadInvalidDecimal("LastBlock", last_block)),
    };

    Ok(GasMetric {
        block_height,
        safe_gas_price: required(oracle.safe_gas_price, "SafeGasPrice")?,
        propose_gas_price: required(oracle.propose_gas_price, "ProposeGasPrice")?,
        fast_gas_price: required(oracle.fast_gas_price, "FastGasPrice")?,
        suggested_base_fee: required(oracle.suggest_base_fee, "suggestBaseFee")?,
    })
}

/// Extracts a [`BlockMetric`] from a `module=proxy&action=eth_getBlockByNumber` response.
///
/// The total fees are approximated as the sum of all transaction gas prices multiplied by the gas used by
/// the whole block.
pub fn block_metric(payload: &str) -> Result<BlockMetric, Error> {
    let block = serde_json::from_str::<Envelope<Block>>(payload)?
        .result
        .ok_or(Error::PayloadMissingResult)?;

    let number = decode_hex_field(block.number, "number")?;
    let block_height = match number.to_i64() {
        Some(height) => height as u64,
        None => return Err(Error::PayloadOutOfRange("number", number.to_str_radix(10))),
    };

    let timestamp = decode_hex_field(block.timestamp, "timestamp")?;
    let created_at = timestamp
        .to_i64()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .ok_or_else(|| Error::PayloadOutOfRange("timestamp", timestamp.to_str_radix(10)))?;

    let gas_used = decode_hex_field(block.gas_used, "gasUsed")?;
    let transactions = block.transactions.unwrap_or_default();

    let mut gas_price_sum = BigUint::zero();
    for transaction in &transactions {
        gas_price_sum += decode_hex_field(transaction.gas_price.clone(), "gasPrice")?;
    }

    Ok(BlockMetric {
        block_height,
        transaction_count: transactions.len() as u64,
        total_fees: gas_price_sum * gas_used,
        created_at,
    })
}
