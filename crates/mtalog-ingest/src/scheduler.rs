//! Ingestion scheduler
//!
//! A [`Scheduler`] owns one job, its [`Cadence`], the time zone used to read
//! daily times, a [`Clock`], and the next fire timestamp. Nothing is global:
//! tests drive [`Scheduler::tick`] with a [`ManualClock`] instead of sleeping.
//!
//! [`Scheduler::run`] is the perpetual loop used by the binary: check whether
//! the job is due, run it if so, sleep for the poll interval, repeat. A failed
//! or panicking run is logged and the loop carries on.

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::error::IngestResult;
use crate::models::IngestOutcome;

/// Default delay between two due checks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// When a job fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Fixed interval measured from the previous run (or from start-up)
    Interval(Duration),
    /// Once a day at a wall-clock time in the scheduler's time zone
    DailyAt(NaiveTime),
}

impl Cadence {
    /// Next fire time strictly after `now`.
    ///
    /// For [`Cadence::DailyAt`], a local time that does not exist on a given
    /// day (DST gap) moves the run to the next day where it does exist.
    pub fn next_after(&self, now: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
        match *self {
            Cadence::Interval(interval) => TimeDelta::from_std(interval)
                .ok()
                .and_then(|delta| now.checked_add_signed(delta))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            Cadence::DailyAt(at) => {
                let mut date = now.with_timezone(&tz).date_naive();
                for _ in 0..3 {
                    let candidate = tz
                        .from_local_datetime(&date.and_time(at))
                        .earliest()
                        .map(|local| local.with_timezone(&Utc));
                    if let Some(candidate) = candidate.filter(|c| *c > now) {
                        return candidate;
                    }
                    match date.succ_opt() {
                        Some(next) => date = next,
                        None => break,
                    }
                }
                now + TimeDelta::days(1)
            },
        }
    }
}

impl std::fmt::Display for Cadence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cadence::Interval(interval) => write!(f, "every {} minutes", interval.as_secs() / 60),
            Cadence::DailyAt(at) => write!(f, "daily at {}", at.format("%H:%M")),
        }
    }
}

/// Work the scheduler can run
#[async_trait]
pub trait ScheduledJob: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn run(&self) -> IngestResult<IngestOutcome>;
}

/// What happened on one tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The job was not due
    Idle,
    Ran(IngestOutcome),
    /// The job returned an error or panicked; already logged
    Failed(String),
}

/// Single-job scheduler with an injectable clock
pub struct Scheduler<C: Clock = SystemClock> {
    job: Arc<dyn ScheduledJob>,
    cadence: Cadence,
    timezone: Tz,
    clock: C,
    poll_interval: Duration,
    next_run: DateTime<Utc>,
}

impl<C: Clock> Scheduler<C> {
    /// Create a scheduler; the first run is one cadence step after `clock.now()`
    pub fn new(job: Arc<dyn ScheduledJob>, cadence: Cadence, timezone: Tz, clock: C) -> Self {
        let next_run = cadence.next_after(clock.now(), timezone);
        Self {
            job,
            cadence,
            timezone,
            clock,
            poll_interval: DEFAULT_POLL_INTERVAL,
            next_run,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn next_run(&self) -> DateTime<Utc> {
        self.next_run
    }

    pub fn is_due(&self) -> bool {
        self.clock.now() >= self.next_run
    }

    /// Run the job if it is due.
    ///
    /// The job runs on its own task so a panic is contained and reported as
    /// [`TickOutcome::Failed`]. The next fire time advances either way.
    pub async fn tick(&mut self) -> TickOutcome {
        if !self.is_due() {
            return TickOutcome::Idle;
        }

        let job = Arc::clone(&self.job);
        info!(job = job.name(), scheduled_for = %self.next_run, "Running scheduled job");

        let result = tokio::spawn(async move { job.run().await }).await;

        self.next_run = self.cadence.next_after(self.clock.now(), self.timezone);

        match result {
            Ok(Ok(outcome)) => {
                info!(job = self.job.name(), outcome = %outcome, next_run = %self.next_run, "Scheduled job finished");
                TickOutcome::Ran(outcome)
            },
            Ok(Err(e)) => {
                error!(job = self.job.name(), error = %e, next_run = %self.next_run, "Scheduled job failed");
                TickOutcome::Failed(e.to_string())
            },
            Err(e) => {
                error!(job = self.job.name(), error = %e, next_run = %self.next_run, "Scheduled job panicked");
                TickOutcome::Failed(e.to_string())
            },
        }
    }

    /// Tick forever, sleeping `poll_interval` between checks, until
    /// `shutdown` resolves. A run in progress is allowed to finish.
    pub async fn run<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        info!(
            job = self.job.name(),
            cadence = %self.cadence,
            timezone = %self.timezone,
            next_run = %self.next_run,
            "Scheduler started"
        );

        loop {
            if let TickOutcome::Failed(_) = self.tick().await {
                warn!(job = self.job.name(), "Continuing after failed run");
            }

            tokio::select! {
                _ = &mut shutdown => {
                    info!(job = self.job.name(), "Scheduler stopping");
                    break;
                },
                _ = tokio::time::sleep(self.poll_interval) => {},
            }
        }
    }
}
