use anyhow::Error;
use ethmetrics_lib::api::etherscan::EtherscanClient;
use ethmetrics_lib::collector::BlockCollector;
use ethmetrics_lib::collector::Collector;
use ethmetrics_lib::collector::GasCollector;
use ethmetrics_lib::config::Config;
use ethmetrics_lib::database::handler::DatabaseClient;
use ethmetrics_lib::retry::RetryPolicy;
use ethmetrics_lib::scheduler::CycleStatus;
use ethmetrics_lib::scheduler::Scheduler;
use ethmetrics_lib::scheduler::SchedulerHandle;
use log::error;
use log::info;
use log::warn;
use simplelog::CombinedLogger;
use simplelog::*;
use std::sync::mpsc;
use std::sync::mpsc::Sender;
use std::time::Duration;

extern crate log;
extern crate simplelog;

fn main() -> Result<(), Error> {
    let config = Config::new()?;
    init_logger(&config)?;

    let dbc = DatabaseClient::connect(&config.database_url, &RetryPolicy::new(config.connect_max_elapsed))?;
    let esc = EtherscanClient::new(&config)?;

    let (tx, rx) = mpsc::channel();
    let _handles = start_collector_threads(&config, &dbc, &esc, &tx);

    // Only the scheduler threads hold senders from here on
    drop(tx);

    // This blocks until all schedulers are gone, which only happens if their threads died
    loop {
        match rx.recv() {
            Ok(CycleStatus::Collected { collector, message }) => info!("[{collector}] {message}"),
            Ok(CycleStatus::Failed { collector, error }) => error!("[{collector}] Cycle failed; {error}"),
            Ok(CycleStatus::Skipped { collector }) => warn!("[{collector}] Tick skipped, previous cycle still running"),

            Err(why) => anyhow::bail!("All collectors stopped; {why}"),
        }
    }
}

fn init_logger(config: &Config) -> Result<(), Error> {
    CombinedLogger::init(vec![
        TermLogger::new(
            config.log_level,
            ConfigBuilder::new()
                .add_filter_allow_str("ethmetrics")
                .set_time_format_str("[%d.%m.%Y; %T]")
                .build(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ),
        WriteLogger::new(
            LevelFilter::Debug,
            ConfigBuilder::new()
                .add_filter_allow_str("ethmetrics")
                .set_time_format_str("[%d.%m.%Y; %T]")
                .build(),
            std::fs::OpenOptions::new().create(true).append(true).open(&config.log_file)?,
        ),
    ])?;

    Ok(())
}

fn start_collector_threads(
    config: &Config,
    dbc: &DatabaseClient,
    esc: &EtherscanClient,
    tx: &Sender<CycleStatus>,
) -> Vec<SchedulerHandle> {
    let collectors: Vec<(Box<dyn Collector>, Duration)> = vec![
        (
            Box::new(GasCollector::new(esc.clone(), dbc.metrics(config.upsert_strategy))),
            config.gas_interval,
        ),
        (
            Box::new(BlockCollector::new(esc.clone(), dbc.metrics(config.upsert_strategy))),
            config.block_interval,
        ),
    ];

    let mut handles = Vec::new();
    for (collector, interval) in collectors {
        info!("Starting collector '{}' every {:?}", collector.name(), interval);

        let scheduler = Scheduler::new(interval, RetryPolicy::new(config.cycle_max_elapsed));
        handles.push(scheduler.spawn(collector, tx.clone()));
    }

    handles
}
