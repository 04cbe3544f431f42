use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::models::fx::FxRate;
use super::aggregator::{AggregationReport, PriceAggregator};
use super::fx_service::FxRateClient;
use super::scheduler::{RefreshScheduler, RefreshTicket, RefreshTrigger};

/// How the FX side of a refresh ended.
#[derive(Debug, Clone, PartialEq)]
pub enum FxStatus {
    Live(FxRate),
    Cached(FxRate),
    /// No live provider and no usable cache; valuation falls back to manual prices.
    Unavailable(String),
}

/// Summary of a refresh that ran to completion.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshReport {
    pub trigger: RefreshTrigger,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub prices: AggregationReport,
    pub fx: FxStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    Completed(RefreshReport),
    /// A refresh was already in flight; this trigger was folded into it.
    Coalesced,
    /// The schedule changed (or the scheduler shut down) while this refresh
    /// was in flight; results dropped.
    Discarded,
}

#[derive(Debug, Clone)]
struct Target {
    symbols: BTreeSet<String>,
    base: String,
    local: String,
}

/// Runs refreshes: asks the scheduler for permission, fetches FX and
/// prices concurrently, and publishes both only if the scheduler accepts
/// the completion.
pub struct RefreshService {
    scheduler: Arc<RefreshScheduler>,
    aggregator: Arc<PriceAggregator>,
    fx: Arc<FxRateClient>,
    target: RwLock<Target>,
}

impl RefreshService {
    pub fn new(
        scheduler: Arc<RefreshScheduler>,
        aggregator: Arc<PriceAggregator>,
        fx: Arc<FxRateClient>,
        base_currency: &str,
        local_currency: &str,
    ) -> Self {
        Self {
            scheduler,
            aggregator,
            fx,
            target: RwLock::new(Target {
                symbols: BTreeSet::new(),
                base: base_currency.to_uppercase(),
                local: local_currency.to_uppercase(),
            }),
        }
    }

    /// Symbols the next refresh will quote (watch-list ∪ held symbols).
    pub fn set_tracked_symbols(&self, symbols: BTreeSet<String>) {
        self.target.write().unwrap_or_else(|e| e.into_inner()).symbols = symbols;
    }

    pub fn tracked_symbols(&self) -> BTreeSet<String> {
        self.target.read().unwrap_or_else(|e| e.into_inner()).symbols.clone()
    }

    pub fn set_currencies(&self, base: &str, local: &str) {
        let mut target = self.target.write().unwrap_or_else(|e| e.into_inner());
        target.base = base.to_uppercase();
        target.local = local.to_uppercase();
    }

    pub fn scheduler(&self) -> &Arc<RefreshScheduler> {
        &self.scheduler
    }

    pub fn aggregator(&self) -> &Arc<PriceAggregator> {
        &self.aggregator
    }

    pub fn fx(&self) -> &Arc<FxRateClient> {
        &self.fx
    }

    /// Refresh now, unless one is already running. After shutdown nothing
    /// runs and the outcome is `Discarded`.
    pub async fn refresh(&self, trigger: RefreshTrigger) -> RefreshOutcome {
        match self.scheduler.request(trigger) {
            Some(ticket) => self.run(ticket).await,
            None if self.scheduler.is_shut_down() => RefreshOutcome::Discarded,
            None => RefreshOutcome::Coalesced,
        }
    }

    /// Run the periodic refresh if it is due. `None` when nothing was due
    /// or the tick was coalesced.
    pub async fn tick(&self) -> Option<RefreshOutcome> {
        let ticket = self.scheduler.poll_due()?;
        Some(self.run(ticket).await)
    }

    async fn run(&self, ticket: RefreshTicket) -> RefreshOutcome {
        let target = self.target.read().unwrap_or_else(|e| e.into_inner()).clone();
        debug!(
            "Refresh ({:?}) for {} symbols, {} → {}",
            ticket.trigger,
            target.symbols.len(),
            target.base,
            target.local
        );

        // Both sides settle before the scheduler goes back to Idle.
        let (fx_result, fetched) = tokio::join!(
            self.fx.resolve(&target.base, &target.local),
            self.aggregator.fetch_all(&target.symbols)
        );

        if !self.scheduler.complete(&ticket) {
            return RefreshOutcome::Discarded;
        }

        let prices = self.aggregator.publish(fetched);
        let fx = match fx_result {
            Ok(resolution) => {
                let live = resolution.is_live();
                let rate = resolution.into_rate();
                self.fx.adopt(rate.clone());
                if live {
                    FxStatus::Live(rate)
                } else {
                    FxStatus::Cached(rate)
                }
            }
            Err(e) => {
                warn!("No FX rate this refresh: {e}");
                FxStatus::Unavailable(e.to_string())
            }
        };

        let report = RefreshReport {
            trigger: ticket.trigger,
            started_at: ticket.started_at,
            finished_at: self.scheduler.now(),
            prices,
            fx,
        };
        info!(
            "Refresh ({:?}) done: {}/{} quoted",
            report.trigger, report.prices.quoted, report.prices.requested
        );
        RefreshOutcome::Completed(report)
    }

    /// Poll the scheduler every `poll_every` on a tokio task and run due
    /// refreshes. Stops when the handle is stopped or dropped; a refresh
    /// already running is allowed to finish first.
    pub fn spawn_auto_refresh(self: &Arc<Self>, poll_every: Duration) -> AutoRefreshHandle {
        let service = Arc::clone(self);
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(poll_every) => {}
                    _ = stop_rx.changed() => break,
                }
                if *stop_rx.borrow() || service.scheduler.is_shut_down() {
                    break;
                }
                if let Some(outcome) = service.tick().await {
                    debug!("Auto-refresh outcome: {outcome:?}");
                }
            }
            debug!("Auto-refresh task stopped");
        });
        AutoRefreshHandle {
            stop: stop_tx,
            task: Some(task),
        }
    }
}

/// Owns the polling task started by `spawn_auto_refresh`.
#[derive(Debug)]
pub struct AutoRefreshHandle {
    stop: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl AutoRefreshHandle {
    /// Signal the task to stop and wait for it to exit.
    pub async fn stop(mut self) {
        let _ = self.stop.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for AutoRefreshHandle {
    fn drop(&mut self) {
        // The task exits after the refresh it may be running.
        let _ = self.stop.send(true);
    }
}
