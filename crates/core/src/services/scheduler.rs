use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Source of "now" for the scheduler. Injected so tests can move time by hand.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// What asked for a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefreshTrigger {
    /// First refresh after start-up
    Initial,
    /// Periodic timer fired
    Timer,
    /// User pulled to refresh / pressed "refresh now"
    Manual,
    /// Cadence, currency or provider priority changed
    SettingsChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerState {
    Idle,
    Refreshing,
}

/// Handed out when a refresh may start; must be returned via `complete`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTicket {
    pub trigger: RefreshTrigger,
    pub started_at: DateTime<Utc>,
    epoch: u64,
}

#[derive(Debug)]
struct Inner {
    interval: Option<Duration>,
    next_due: Option<DateTime<Utc>>,
    /// Bumped on cadence change, target change and shutdown; in-flight
    /// refreshes from an older epoch have their results discarded.
    epoch: u64,
    /// Epoch of the refresh currently in flight, if any.
    in_flight: Option<u64>,
    coalesced: u64,
    last_completed: Option<DateTime<Utc>>,
    shut_down: bool,
}

/// Decides when the aggregator and FX client run.
///
/// Two states: `Idle` and `Refreshing`. A trigger while `Refreshing` is
/// ignored (coalesced into the refresh already in flight) and counted, so
/// there is never more than one refresh per epoch on the wire. A refresh
/// started before a cadence change, a target change or shutdown may still
/// finish, but its ticket is stale and `complete` tells the caller to
/// discard the results; a new trigger does not wait for such a refresh.
///
/// The scheduler does no I/O and never sleeps: the periodic timer is a
/// deadline checked with `poll_due` against the injected clock.
pub struct RefreshScheduler {
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for RefreshScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("RefreshScheduler")
            .field("interval", &inner.interval)
            .field("next_due", &inner.next_due)
            .field("in_flight", &inner.in_flight.is_some())
            .finish()
    }
}

impl RefreshScheduler {
    /// `interval_minutes` of `None` or `Some(0)` disables periodic refresh.
    pub fn new(clock: Arc<dyn Clock>, interval_minutes: Option<u32>) -> Self {
        let interval = to_interval(interval_minutes);
        let next_due = interval.map(|i| clock.now() + i);
        Self {
            clock,
            inner: Mutex::new(Inner {
                interval,
                next_due,
                epoch: 0,
                in_flight: None,
                coalesced: 0,
                last_completed: None,
                shut_down: false,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Try to start a refresh. `None` means it was coalesced into the one in
    /// flight, or the scheduler is shut down.
    pub fn request(&self, trigger: RefreshTrigger) -> Option<RefreshTicket> {
        let mut inner = self.lock();
        self.request_locked(&mut inner, trigger)
    }

    fn request_locked(&self, inner: &mut Inner, trigger: RefreshTrigger) -> Option<RefreshTicket> {
        if inner.shut_down {
            debug!("Refresh ({trigger:?}) ignored: scheduler shut down");
            return None;
        }
        if inner.in_flight == Some(inner.epoch) {
            inner.coalesced += 1;
            debug!("Refresh ({trigger:?}) coalesced into the one in flight");
            return None;
        }
        inner.in_flight = Some(inner.epoch);
        Some(RefreshTicket {
            trigger,
            started_at: self.clock.now(),
            epoch: inner.epoch,
        })
    }

    /// Fire the periodic trigger if its deadline has passed.
    ///
    /// The deadline advances by whole intervals past "now", so ticks missed
    /// while nothing polled collapse into one.
    pub fn poll_due(&self) -> Option<RefreshTicket> {
        let now = self.clock.now();
        let mut inner = self.lock();
        let (interval, due) = match (inner.interval, inner.next_due) {
            (Some(interval), Some(due)) if due <= now => (interval, due),
            _ => return None,
        };

        let mut next = due + interval;
        while next <= now {
            next += interval;
        }
        inner.next_due = Some(next);
        self.request_locked(&mut inner, RefreshTrigger::Timer)
    }

    /// Report that both the FX fetch and the price fetch settled.
    /// Returns `false` when the results must be discarded (stale ticket).
    pub fn complete(&self, ticket: &RefreshTicket) -> bool {
        let mut inner = self.lock();
        if inner.in_flight == Some(ticket.epoch) {
            inner.in_flight = None;
        }
        let accepted = ticket.epoch == inner.epoch && !inner.shut_down;
        if accepted {
            inner.last_completed = Some(self.clock.now());
        } else {
            info!("Discarding results of a refresh started before a schedule or target change");
        }
        accepted
    }

    /// Change the cadence. Clears the pending timer and starts a new epoch.
    pub fn set_interval(&self, interval_minutes: Option<u32>) {
        let now = self.clock.now();
        let mut inner = self.lock();
        inner.interval = to_interval(interval_minutes);
        inner.next_due = inner.interval.map(|i| now + i);
        inner.epoch += 1;
        match inner.interval {
            Some(i) => info!("Auto-refresh every {} min", i.num_minutes()),
            None => info!("Auto-refresh disabled"),
        }
    }

    /// Start a new epoch without touching the timer. Used when the refresh
    /// target changes (currency pair, provider chain, tracked symbols): a
    /// refresh in flight keeps running but its results are discarded, and
    /// the next trigger starts a fresh one instead of being coalesced.
    pub fn invalidate_in_flight(&self) {
        let mut inner = self.lock();
        if inner.shut_down {
            return;
        }
        inner.epoch += 1;
        if inner.in_flight.is_some() {
            debug!("Refresh target changed while a refresh was in flight");
        }
    }

    /// Tear down: clear the timer and refuse further requests. Anything in
    /// flight is left to finish; its results will be discarded.
    pub fn shutdown(&self) {
        let mut inner = self.lock();
        inner.next_due = None;
        inner.shut_down = true;
        inner.epoch += 1;
    }

    pub fn state(&self) -> SchedulerState {
        if self.lock().in_flight.is_some() {
            SchedulerState::Refreshing
        } else {
            SchedulerState::Idle
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.lock().shut_down
    }

    pub fn interval(&self) -> Option<Duration> {
        self.lock().interval
    }

    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.lock().next_due
    }

    /// How many triggers were ignored because a refresh was in flight.
    pub fn coalesced_count(&self) -> u64 {
        self.lock().coalesced
    }

    pub fn last_completed(&self) -> Option<DateTime<Utc>> {
        self.lock().last_completed
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

fn to_interval(minutes: Option<u32>) -> Option<Duration> {
    minutes
        .filter(|m| *m > 0)
        .map(|m| Duration::minutes(i64::from(m)))
}
