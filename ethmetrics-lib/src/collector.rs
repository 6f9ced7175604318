//! One collection cycle: fetch a resource, extract its metric and persist it.
//!
//! Extraction happens before anything is written, so a malformed payload never reaches the database.

use crate::api::etherscan::BlockTag;
use crate::api::etherscan::Fetch;
use crate::api::etherscan::Resource;
use crate::database::handler::Executor;
use crate::database::handler::MetricsHandler;
use crate::error::Error;
use crate::parser;

/// Trait providing the entry point for a single collection cycle.
pub trait Collector: Send {
    /// Short name used in logs and reports.
    fn name(&self) -> &'static str;

    /// Runs one cycle, returning a human readable summary of what was stored.
    fn collect(&self) -> Result<String, Error>;
}

impl<C: Collector + ?Sized> Collector for Box<C> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn collect(&self) -> Result<String, Error> {
        (**self).collect()
    }
}

/// Collects the gas oracle into `gas_metrics`.
pub struct GasCollector<F, E> {
    client: F,
    metrics: MetricsHandler<E>,
}

impl<F: Fetch, E: Executor> GasCollector<F, E> {
    pub fn new(client: F, metrics: MetricsHandler<E>) -> Self {
        GasCollector { client, metrics }
    }
}

impl<F: Fetch + Send, E: Executor> Collector for GasCollector<F, E> {
    fn name(&self) -> &'static str {
        "gas"
    }

    fn collect(&self) -> Result<String, Error> {
        let content = self.client.fetch(&Resource::GasOracle)?;
        let metric = parser::gas_metric(&content)?;
        let outcome = self.metrics.upsert_record(&metric.to_record()?)?;

        Ok(format!(
            "{outcome:?} gas metrics of block {} (safe {}, propose {}, fast {}, base fee {})",
            metric.block_height,
            metric.safe_gas_price,
            metric.propose_gas_price,
            metric.fast_gas_price,
            metric.suggested_base_fee
        ))
    }
}

/// Collects a block (by default the latest one) into `block_metrics`.
pub struct BlockCollector<F, E> {
    client: F,
    metrics: MetricsHandler<E>,
    tag: BlockTag,
}

impl<F: Fetch, E: Executor> BlockCollector<F, E> {
    pub fn new(client: F, metrics: MetricsHandler<E>) -> Self {
        BlockCollector {
            client,
            metrics,
            tag: BlockTag::Latest,
        }
    }

    pub fn with_tag(mut self, tag: BlockTag) -> Self {
        self.tag = tag;
        self
    }
}

impl<F: Fetch + Send, E: Executor> Collector for BlockCollector<F, E> {
    fn name(&self) -> &'static str {
        "block"
    }

    fn collect(&self) -> Result<String, Error> {
        let content = self.client.fetch(&Resource::Block(self.tag))?;
        let metric = parser::block_metric(&content)?;
        let outcome = self.metrics.upsert_record(&metric.to_record()?)?;

        Ok(format!(
            "{outcome:?} block metrics of block {} ({} transactions, {} wei total fees)",
            metric.block_height, metric.transaction_count, metric.total_fees
        ))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::BlockCollector;
    use super::Collector;
    use super::GasCollector;
    use crate::api::etherscan::BlockTag;
    use crate::api::etherscan::Fetch;
    use crate::api::etherscan::Resource;
    use crate::database::handler::metrics::tests::MemoryExecutor;
    use crate::database::handler::MetricsHandler;
    use crate::database::handler::UpsertStrategy;
    use crate::database::record::Value;
    use crate::error::Error;
    use crate::error::ErrorKind;
    use chrono::TimeZone;
    use chrono::Utc;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::Mutex;

    /// [`Fetch`] replaying canned responses in order, failing with a 503 once they run out.
    #[derive(Clone, Default)]
    pub struct ScriptedFetch {
        responses: Arc<Mutex<VecDeque<Result<String, u16>>>>,
        requested: Arc<Mutex<Vec<Resource>>>,
    }

    impl ScriptedFetch {
        pub fn push(&self, response: Result<&str, u16>) -> &Self {
            self.responses.lock().unwrap().push_back(response.map(str::to_string));
            self
        }

        pub fn requested(&self) -> Vec<Resource> {
            self.requested.lock().unwrap().clone()
        }
    }

    impl Fetch for ScriptedFetch {
        fn fetch(&self, resource: &Resource) -> Result<String, Error> {
            self.requested.lock().unwrap().push(*resource);

            match self.responses.lock().unwrap().pop_front() {
                Some(Ok(content)) => Ok(content),
                Some(Err(status)) => Err(Error::HttpStatus(status, "https://api.etherscan.io/api".to_string())),
                None => Err(Error::HttpStatus(503, "https://api.etherscan.io/api".to_string())),
            }
        }
    }

    pub const GAS_ORACLE: &str = r#"{"status":"1","message":"OK","result":{"LastBlock":"123","SafeGasPrice":"10","ProposeGasPrice":"12","FastGasPrice":"15","suggestBaseFee":"9"}}"#;

    const BLOCK: &str = r#"{"jsonrpc":"2.0","id":1,"result":{"number":"0x2a","timestamp":"0x5f5e100","gasUsed":"0x64","transactions":[{"gasPrice":"0x1"},{"gasPrice":"0x2"}]}}"#;

    #[test]
    fn gas_end_to_end() {
        for strategy in [UpsertStrategy::Atomic, UpsertStrategy::CheckThenWrite] {
            let client = ScriptedFetch::default();
            client.push(Ok(GAS_ORACLE)).push(Ok(GAS_ORACLE));

            let executor = MemoryExecutor::default();
            let collector = GasCollector::new(client.clone(), MetricsHandler::new(executor.clone(), strategy));

            // Observing the same block twice must not duplicate the row
            assert!(collector.collect().unwrap().contains("block 123"));
            collector.collect().unwrap();

            let rows = executor.rows("gas_metrics");
            assert_eq!(rows.len(), 1);

            let row = &rows["123"];
            assert_eq!(row["safeGasPrice"], Value::text("10"));
            assert_eq!(row["proposeGasPrice"], Value::text("12"));
            assert_eq!(row["fastGasPrice"], Value::text("15"));
            assert_eq!(row["suggestBaseFee"], Value::text("9"));
            assert_eq!(client.requested(), vec![Resource::GasOracle, Resource::GasOracle]);
        }
    }

    #[test]
    fn block_end_to_end() {
        let client = ScriptedFetch::default();
        client.push(Ok(BLOCK));

        let executor = MemoryExecutor::default();
        let collector = BlockCollector::new(client.clone(), MetricsHandler::new(executor.clone(), UpsertStrategy::Atomic));

        collector.collect().unwrap();

        let rows = executor.rows("block_metrics");
        assert_eq!(rows.len(), 1);

        let row = &rows["42"];
        assert_eq!(row["transaction_count"], Value::BigInt(2));
        assert_eq!(row["total_fees"], Value::Numeric("300".to_string()));
        assert_eq!(row["created_at"], Value::Timestamp(Utc.timestamp_opt(100_000_000, 0).unwrap()));
        assert_eq!(client.requested(), vec![Resource::Block(BlockTag::Latest)]);
    }

    #[test]
    fn block_with_tag() {
        let client = ScriptedFetch::default();
        client.push(Ok(BLOCK));

        let collector = BlockCollector::new(
            client.clone(),
            MetricsHandler::new(MemoryExecutor::default(), UpsertStrategy::Atomic),
        )
        .with_tag(BlockTag::Number(42));

        collector.collect().unwrap();
        assert_eq!(client.requested(), vec![Resource::Block(BlockTag::Number(42))]);
    }

    #[test]
    fn malformed_payload_is_never_persisted() {
        let client = ScriptedFetch::default();
        client.push(Ok(r#"{"status":"1","message":"OK","result":{"LastBlock":"123"}}"#));

        let executor = MemoryExecutor::default();
        let collector = GasCollector::new(client, MetricsHandler::new(executor.clone(), UpsertStrategy::CheckThenWrite));

        assert_eq!(collector.collect().unwrap_err().kind(), ErrorKind::MalformedPayload);
        assert!(executor.statements().is_empty());
    }

    #[test]
    fn transport_error_is_surfaced() {
        let client = ScriptedFetch::default();
        client.push(Err(502));

        let executor = MemoryExecutor::default();
        let collector = BlockCollector::new(client, MetricsHandler::new(executor.clone(), UpsertStrategy::Atomic));

        assert_eq!(collector.collect().unwrap_err().kind(), ErrorKind::Transport);
        assert!(executor.statements().is_empty());
    }
}
