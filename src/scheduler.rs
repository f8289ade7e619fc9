//! Periodic tasks and the sweep that drives triage
//!
//! Three cron schedules share one single-threaded loop. Due tasks run
//! serially, so the snapshot and marker files only ever have one writer.

use crate::booking::{BookingApi, SyncWindow};
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::flags::FlagSet;
use crate::messages::MessageFetcher;
use crate::reservations::{self, ReservationStore};
use crate::triage::{TriageDecision, TriagePolicy};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use cron::Schedule;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, error, info};

/// Work units of the daemon loop, in the order they run when due together
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PeriodicTask {
    Resync,
    Sync,
    Sweep,
}

impl fmt::Display for PeriodicTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeriodicTask::Resync => write!(f, "resync"),
            PeriodicTask::Sync => write!(f, "sync"),
            PeriodicTask::Sweep => write!(f, "sweep"),
        }
    }
}

/// Parse a cron expression, accepting the 5-field form by prepending seconds
pub fn parse_schedule(expr: &str) -> Result<Schedule> {
    let full = if expr.split_whitespace().count() == 5 {
        format!("0 {}", expr)
    } else {
        expr.to_string()
    };

    Schedule::from_str(&full).map_err(|e| Error::Config(format!("invalid cron expression '{}': {}", expr, e)))
}

/// Cron table with a last-run time per task
pub struct TaskSchedule {
    entries: Vec<(PeriodicTask, Schedule)>,
    last_run: HashMap<PeriodicTask, DateTime<Utc>>,
}

impl TaskSchedule {
    pub fn new(config: &Config) -> Result<Self> {
        let mut entries = vec![
            (PeriodicTask::Resync, parse_schedule(&config.resync_schedule)?),
            (PeriodicTask::Sync, parse_schedule(&config.sync_schedule)?),
            (PeriodicTask::Sweep, parse_schedule(&config.sweep_schedule)?),
        ];
        entries.sort_by_key(|(task, _)| *task);

        Ok(Self {
            entries,
            last_run: HashMap::new(),
        })
    }

    /// Tasks due at `now`. A task that never ran is due; otherwise it is due
    /// when its schedule fires after the last run and at or before `now`.
    /// Missed ticks collapse into a single run.
    pub fn check_due(&mut self, now: DateTime<Utc>) -> Vec<PeriodicTask> {
        let mut due = Vec::new();

        for (task, schedule) in &self.entries {
            let is_due = match self.last_run.get(task) {
                None => true,
                Some(last) => schedule.after(last).next().is_some_and(|next| next <= now),
            };
            if is_due {
                due.push(*task);
            }
        }

        for task in &due {
            self.last_run.insert(*task, now);
        }

        due
    }

    pub fn last_run(&self, task: PeriodicTask) -> Option<DateTime<Utc>> {
        self.last_run.get(&task).copied()
    }
}

/// Outcome counts of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub checked: usize,
    pub stale: usize,
    pub excluded: usize,
    pub ignored: usize,
    pub escalated: usize,
    pub already_replied: usize,
    pub sent: usize,
    pub failed: usize,
}

/// Everything the periodic tasks act on
pub struct Poller<'a> {
    config: &'a Config,
    api: &'a dyn BookingApi,
    snapshot: ReservationStore,
    policy: TriagePolicy,
    flags: FlagSet,
    dispatcher: Dispatcher<'a>,
}

impl<'a> Poller<'a> {
    pub fn new(
        config: &'a Config,
        api: &'a dyn BookingApi,
        snapshot: ReservationStore,
        policy: TriagePolicy,
        flags: FlagSet,
        dispatcher: Dispatcher<'a>,
    ) -> Self {
        Self {
            config,
            api,
            snapshot,
            policy,
            flags,
            dispatcher,
        }
    }

    pub fn snapshot(&self) -> &ReservationStore {
        &self.snapshot
    }

    pub fn dispatcher(&self) -> &Dispatcher<'a> {
        &self.dispatcher
    }

    pub fn run_task(&mut self, task: PeriodicTask, now: NaiveDateTime) -> Result<()> {
        debug!(%task, "Running task");
        match task {
            PeriodicTask::Resync => self.resync(now).map(|_| ()),
            PeriodicTask::Sync => self.sync_new(now).map(|_| ()),
            PeriodicTask::Sweep => self.sweep(now.date()).map(|_| ()),
        }
    }

    /// Merge bookings created in the last few minutes
    pub fn sync_new(&mut self, now: NaiveDateTime) -> Result<usize> {
        let window = SyncWindow::new_bookings(now, self.config.new_booking_window_mins);
        reservations::sync(self.api, &mut self.snapshot, &window, self.config.max_pages)
    }

    /// Merge every booking arriving around today
    pub fn resync(&mut self, now: NaiveDateTime) -> Result<usize> {
        let window = SyncWindow::arrivals(now, self.config.resync_days_back, self.config.resync_days_ahead);
        reservations::sync(self.api, &mut self.snapshot, &window, self.config.max_pages)
    }

    /// Triage the latest message of every current reservation and act on it.
    /// Reservations without a departure date are always current.
    pub fn sweep(&mut self, today: NaiveDate) -> Result<SweepReport> {
        let fetcher = MessageFetcher::new(self.api, self.config.max_pages);
        let cutoff = today - Duration::days(self.config.stale_after_days);
        let mut report = SweepReport::default();

        for reservation in self.snapshot.all() {
            report.checked += 1;

            if reservation.departure.is_some_and(|departure| departure < cutoff) {
                report.stale += 1;
                continue;
            }

            if let Some(reason) = self.flags.exclusion(reservation.id) {
                debug!(reservation_id = reservation.id, %reason, "Skipping reservation");
                report.excluded += 1;
                continue;
            }

            let messages = fetcher.fetch_messages(reservation.id);
            let decision = self.policy.decide(reservation, &messages);

            let Some(latest) = messages.first() else {
                report.ignored += 1;
                continue;
            };

            if decision.replies() && self.dispatcher.already_replied(reservation.id, latest) {
                report.already_replied += 1;
                continue;
            }

            let sent = match self.dispatcher.dispatch(reservation, &decision, latest) {
                Ok(sent) => sent,
                Err(e) => {
                    error!(reservation_id = reservation.id, error = %e, "Dispatch failed");
                    report.failed += 1;
                    continue;
                }
            };
            match decision {
                TriageDecision::Ignore(_) => report.ignored += 1,
                TriageDecision::Escalate { .. } => report.escalated += 1,
                _ if sent => report.sent += 1,
                _ => report.failed += 1,
            }
        }

        info!(
            checked = report.checked,
            stale = report.stale,
            excluded = report.excluded,
            escalated = report.escalated,
            sent = report.sent,
            failed = report.failed,
            "Sweep finished"
        );
        Ok(report)
    }
}
