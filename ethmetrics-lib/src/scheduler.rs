//! Fixed-rate scheduling of collection cycles.
//!
//! Every scheduled [`Collector`] gets two threads: a timer emitting ticks at a fixed rate and a worker running
//! one cycle per tick. Ticks travel through a queue holding at most one pending tick, hence cycles of the same
//! collector never overlap; a tick arriving while one is already pending is dropped and reported as
//! [`CycleStatus::Skipped`]. Every cycle is wrapped in the [`RetryPolicy`] and its outcome sent to the
//! reporting channel, a failed cycle never stops the scheduler.

use crate::collector::Collector;
use crate::retry::RetryPolicy;
use log::debug;
use log::warn;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::sync::mpsc::Sender;
use std::sync::mpsc::TrySendError;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use std::time::Instant;

/// Outcome of a single tick, sent from the scheduler threads to the reporting loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleStatus {
    Collected { collector: &'static str, message: String },
    Failed { collector: &'static str, error: String },
    Skipped { collector: &'static str },
}

/// Granularity at which the timer checks whether it should stop.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct Scheduler {
    interval: Duration,
    retry: RetryPolicy,
}

/// Handle to the threads of a running [`Scheduler`].
pub struct SchedulerHandle {
    stop: Arc<AtomicBool>,
    timer: JoinHandle<()>,
    worker: JoinHandle<()>,
}

impl Scheduler {
    pub fn new(interval: Duration, retry: RetryPolicy) -> Self {
        Scheduler { interval, retry }
    }

    /// Starts ticking immediately, the first cycle runs right away.
    pub fn spawn<C: Collector + 'static>(&self, collector: C, reporter: Sender<CycleStatus>) -> SchedulerHandle {
        let name = collector.name();
        let stop = Arc::new(AtomicBool::new(false));
        let (tick_tx, tick_rx) = mpsc::sync_channel::<()>(1);

        let worker_reporter = reporter.clone();
        let worker_stop = stop.clone();
        let retry = self.retry.clone();
        let worker = std::thread::spawn(move || {
            // Ends once the timer drops its sender
            for _ in tick_rx {
                // A tick still pending when stop was requested never starts a cycle
                if worker_stop.load(Ordering::SeqCst) {
                    break;
                }

                let start = Instant::now();
                let result = retry.retry_notify(
                    || collector.collect(),
                    |why, delay| warn!("Collector '{name}' failed, retrying in {delay:?}; {why}"),
                );

                let status = match result {
                    Ok(message) => CycleStatus::Collected { collector: name, message },
                    Err(why) => CycleStatus::Failed { collector: name, error: why.to_string() },
                };
                debug!("Collector '{name}' finished cycle in {:?}", start.elapsed());

                if worker_reporter.send(status).is_err() {
                    break;
                }
            }
        });

        let interval = self.interval;
        let timer_stop = stop.clone();
        let timer = std::thread::spawn(move || {
            let mut next_tick = Instant::now();

            while !timer_stop.load(Ordering::SeqCst) {
                let now = Instant::now();
                if now < next_tick {
                    std::thread::sleep((next_tick - now).min(STOP_POLL_INTERVAL));
                    continue;
                }

                match tick_tx.try_send(()) {
                    Ok(()) => {}

                    Err(TrySendError::Full(())) => {
                        warn!("Collector '{name}' still busy, skipping tick");
                        if reporter.send(CycleStatus::Skipped { collector: name }).is_err() {
                            break;
                        }
                    }

                    Err(TrySendError::Disconnected(())) => break,
                }

                // Fixed rate; if we fell behind by more than one interval don't try to catch up
                next_tick += interval;
                if next_tick < now {
                    next_tick = now + interval;
                }
            }
        });

        SchedulerHandle { stop, timer, worker }
    }
}

impl SchedulerHandle {
    /// Stops ticking and waits for the cycle in flight (if any) to finish.
    pub fn stop(self) {
        self.stop.store(true, Ordering::SeqCst);

        if self.timer.join().is_err() {
            warn!("Scheduler timer thread panicked");
        }

        if self.worker.join().is_err() {
            warn!("Scheduler worker thread panicked");
        }
    }
}
