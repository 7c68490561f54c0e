//! Periodic ingestion.
//!
//! The scheduler runs the pipeline on a jittered interval next to the HTTP
//! trigger. A run in which every source failed counts as a failure and
//! stretches the next delay with exponential backoff.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use civicfeed_protocol::IngestionReport;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};

use crate::pipeline::Ingestor;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Base interval between runs.
    pub interval: Duration,
    /// Maximum jitter, as a fraction of the interval (0.0-1.0).
    pub jitter_fraction: f64,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    /// Skip the run at startup and wait one interval first.
    pub delay_first_run: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(6 * 3600),
            jitter_fraction: 0.05,
            initial_backoff: Duration::from_secs(60),
            max_backoff: Duration::from_secs(3600),
            backoff_multiplier: 2.0,
            delay_first_run: false,
        }
    }
}

impl SchedulerConfig {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    pub fn with_jitter(mut self, fraction: f64) -> Self {
        self.jitter_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration, multiplier: f64) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_delayed_first_run(mut self, delay: bool) -> Self {
        self.delay_first_run = delay;
        self
    }

    /// Interval plus or minus jitter.
    pub fn next_run_delay(&self) -> Duration {
        let base = self.interval.as_secs_f64();
        let jitter = rand_jitter(base * self.jitter_fraction);
        Duration::from_secs_f64((base + jitter).max(0.0))
    }

    /// Delay after `consecutive_failures` failed runs in a row.
    pub fn backoff_delay(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(consecutive_failures - 1).unwrap_or(i32::MAX);
        let delay = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        Duration::from_secs_f64(delay.min(self.max_backoff.as_secs_f64()))
    }
}

/// Pseudo-random value in `[-range, range]` derived from the clock.
fn rand_jitter(range: f64) -> f64 {
    use std::time::SystemTime;

    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();

    let fraction = f64::from(nanos) / 1_000_000_000.0;
    (fraction * 2.0 - 1.0) * range
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerCommand {
    /// Run the pipeline now.
    RunNow,
    Pause,
    Resume,
    Stop,
}

/// What the scheduler has done so far.
#[derive(Debug, Clone, Default)]
pub struct SchedulerState {
    pub paused: bool,
    pub consecutive_failures: u32,
    pub runs: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_upserted: usize,
    pub last_expired: usize,
}

impl SchedulerState {
    /// Folds a finished run into the state. Returns true if it counts as a success.
    pub fn record(&mut self, report: &IngestionReport) -> bool {
        self.runs += 1;
        self.last_run = Some(report.started_at);
        self.last_upserted = report.upserted;
        self.last_expired = report.expired;

        if report.all_failed() {
            self.consecutive_failures += 1;
            false
        } else {
            self.consecutive_failures = 0;
            self.last_success = Some(report.started_at);
            true
        }
    }
}

pub type SharedSchedulerState = Arc<RwLock<SchedulerState>>;

/// Runs ingestion periodically until stopped.
pub struct Scheduler {
    config: SchedulerConfig,
    state: SharedSchedulerState,
    command_tx: mpsc::Sender<SchedulerCommand>,
    command_rx: mpsc::Receiver<SchedulerCommand>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let (command_tx, command_rx) = mpsc::channel(16);
        Self {
            config,
            state: Arc::default(),
            command_tx,
            command_rx,
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            command_tx: self.command_tx.clone(),
            state: self.state.clone(),
        }
    }

    /// Runs the loop until [`SchedulerCommand::Stop`] or every handle is dropped.
    pub async fn run(self, ingestor: Ingestor) {
        let Self {
            config,
            state,
            command_tx,
            mut command_rx,
        } = self;
        // Only external handles keep the channel open.
        drop(command_tx);

        info!(interval_secs = config.interval.as_secs(), "Ingestion scheduler started");

        if !config.delay_first_run {
            run_once(&ingestor, &state).await;
        }

        loop {
            let delay = next_delay(&config, &state).await;
            debug!(delay_secs = delay.as_secs(), "Next ingestion scheduled");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    if state.read().await.paused {
                        debug!("Scheduler paused, skipping run");
                        continue;
                    }
                    run_once(&ingestor, &state).await;
                }
                cmd = command_rx.recv() => match cmd {
                    Some(SchedulerCommand::RunNow) => run_once(&ingestor, &state).await,
                    Some(SchedulerCommand::Pause) => {
                        info!("Scheduler paused");
                        state.write().await.paused = true;
                    }
                    Some(SchedulerCommand::Resume) => {
                        info!("Scheduler resumed");
                        state.write().await.paused = false;
                    }
                    Some(SchedulerCommand::Stop) | None => {
                        info!("Scheduler stopping");
                        break;
                    }
                },
            }
        }
    }
}

async fn next_delay(config: &SchedulerConfig, state: &SharedSchedulerState) -> Duration {
    let failures = state.read().await.consecutive_failures;
    if failures > 0 {
        let backoff = config.backoff_delay(failures);
        debug!(failures, backoff_secs = backoff.as_secs(), "Using backoff delay");
        return backoff;
    }
    config.next_run_delay()
}

async fn run_once(ingestor: &Ingestor, state: &SharedSchedulerState) {
    let report = ingestor.run().await;
    let ok = state.write().await.record(&report);
    if !ok {
        warn!(sources = report.sources.len(), "Scheduled ingestion failed for every source");
    }
}

/// Sends commands to a running [`Scheduler`].
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<SchedulerCommand>,
    state: SharedSchedulerState,
}

impl SchedulerHandle {
    pub async fn run_now(&self) -> Result<(), mpsc::error::SendError<SchedulerCommand>> {
        self.command_tx.send(SchedulerCommand::RunNow).await
    }

    pub async fn pause(&self) -> Result<(), mpsc::error::SendError<SchedulerCommand>> {
        self.command_tx.send(SchedulerCommand::Pause).await
    }

    pub async fn resume(&self) -> Result<(), mpsc::error::SendError<SchedulerCommand>> {
        self.command_tx.send(SchedulerCommand::Resume).await
    }

    pub async fn stop(&self) -> Result<(), mpsc::error::SendError<SchedulerCommand>> {
        self.command_tx.send(SchedulerCommand::Stop).await
    }

    pub async fn state(&self) -> SchedulerState {
        self.state.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::store::MemoryStore;
    use civicfeed_feeds::{FeedSource, StaticFetcher};

    mod config {
        use super::*;

        #[test]
        fn jittered_delay_stays_in_range() {
            let config = SchedulerConfig::new(Duration::from_secs(100)).with_jitter(0.1);
            let delay = config.next_run_delay().as_secs_f64();
            assert!((90.0..=110.0).contains(&delay));
        }

        #[test]
        fn backoff_grows_and_caps() {
            let config = SchedulerConfig::default().with_backoff(
                Duration::from_secs(10),
                Duration::from_secs(100),
                2.0,
            );
            assert_eq!(config.backoff_delay(0), Duration::ZERO);
            assert_eq!(config.backoff_delay(1), Duration::from_secs(10));
            assert_eq!(config.backoff_delay(3), Duration::from_secs(40));
            assert_eq!(config.backoff_delay(9), Duration::from_secs(100));
        }
    }

    #[test]
    fn total_failure_counts_as_failure() {
        let mut state = SchedulerState::default();
        let mut report = IngestionReport::new(Utc::now(), 45);
        report.sources.push(civicfeed_protocol::SourceResult::new("a", "A"));
        report.sources[0].fail("timeout", "slow");

        assert!(!state.record(&report));
        assert!(!state.record(&report));
        assert_eq!(state.consecutive_failures, 2);

        report.sources[0] = civicfeed_protocol::SourceResult::new("a", "A");
        assert!(state.record(&report));
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.runs, 3);
        assert!(state.last_success.is_some());
    }

    fn ingestor() -> Ingestor {
        let config = PipelineConfig::new(vec![FeedSource::new(
            "down",
            "Down",
            "https://down.example/cal.ics",
        )]);
        Ingestor::new(config, Arc::new(StaticFetcher::new()), Arc::new(MemoryStore::new()))
    }

    #[tokio::test(start_paused = true)]
    async fn commands_drive_the_loop() {
        let scheduler = Scheduler::new(
            SchedulerConfig::new(Duration::from_secs(3600))
                .with_backoff(Duration::from_secs(600), Duration::from_secs(600), 1.0),
        );
        let handle = scheduler.handle();
        let task = tokio::spawn(scheduler.run(ingestor()));

        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(handle.state().await.runs, 1);

        handle.run_now().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let state = handle.state().await;
        assert_eq!(state.runs, 2);
        assert_eq!(state.consecutive_failures, 2);

        handle.pause().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(handle.state().await.paused);

        tokio::time::sleep(Duration::from_secs(601)).await;
        assert_eq!(handle.state().await.runs, 2);

        handle.resume().await.unwrap();
        handle.stop().await.unwrap();
        task.await.unwrap();
    }
}
