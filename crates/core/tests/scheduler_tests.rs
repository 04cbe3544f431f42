// ═══════════════════════════════════════════════════════════════════
// Scheduler Tests: RefreshScheduler state machine, RefreshService
// ═══════════════════════════════════════════════════════════════════

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Semaphore;

use coinbox_core::errors::CoreError;
use coinbox_core::models::price::PriceQuote;
use coinbox_core::providers::traits::{FxProvider, PriceSource};
use coinbox_core::services::aggregator::PriceAggregator;
use coinbox_core::services::fx_service::FxRateClient;
use coinbox_core::services::refresh_service::{FxStatus, RefreshOutcome, RefreshService};
use coinbox_core::services::scheduler::{
    ManualClock, RefreshScheduler, RefreshTrigger, SchedulerState,
};
use coinbox_core::storage::manager::StorageManager;
use coinbox_core::storage::memory::MemoryStore;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap()
}

fn scheduler(minutes: Option<u32>) -> (Arc<ManualClock>, RefreshScheduler) {
    let clock = Arc::new(ManualClock::new(start()));
    let scheduler = RefreshScheduler::new(clock.clone(), minutes);
    (clock, scheduler)
}

// ═══════════════════════════════════════════════════════════════════
// State machine
// ═══════════════════════════════════════════════════════════════════

mod state_machine {
    use super::*;

    #[test]
    fn request_moves_to_refreshing_and_complete_back_to_idle() {
        let (_, s) = scheduler(Some(5));
        assert_eq!(s.state(), SchedulerState::Idle);

        let ticket = s.request(RefreshTrigger::Initial).unwrap();
        assert_eq!(ticket.trigger, RefreshTrigger::Initial);
        assert_eq!(ticket.started_at, start());
        assert_eq!(s.state(), SchedulerState::Refreshing);

        assert!(s.complete(&ticket));
        assert_eq!(s.state(), SchedulerState::Idle);
        assert_eq!(s.last_completed(), Some(start()));
    }

    #[test]
    fn triggers_while_refreshing_are_coalesced() {
        let (_, s) = scheduler(Some(5));
        let ticket = s.request(RefreshTrigger::Manual).unwrap();
        assert!(s.request(RefreshTrigger::Manual).is_none());
        assert!(s.request(RefreshTrigger::SettingsChanged).is_none());
        assert_eq!(s.coalesced_count(), 2);

        s.complete(&ticket);
        assert!(s.request(RefreshTrigger::Manual).is_some());
    }

    #[test]
    fn cadence_change_discards_in_flight_results() {
        let (_, s) = scheduler(Some(5));
        let stale = s.request(RefreshTrigger::Timer).unwrap();
        s.set_interval(Some(10));

        // A stale refresh does not block a new one.
        let fresh = s.request(RefreshTrigger::SettingsChanged).unwrap();
        assert!(!s.complete(&stale));
        assert_eq!(s.state(), SchedulerState::Refreshing);
        assert!(s.complete(&fresh));
        assert_eq!(s.state(), SchedulerState::Idle);
    }

    #[test]
    fn target_change_discards_in_flight_but_keeps_the_timer() {
        let (_, s) = scheduler(Some(5));
        let due = s.next_due();
        let stale = s.request(RefreshTrigger::Timer).unwrap();
        s.invalidate_in_flight();

        assert_eq!(s.next_due(), due);
        let fresh = s.request(RefreshTrigger::SettingsChanged).unwrap();
        assert_eq!(s.coalesced_count(), 0);
        assert!(s.complete(&fresh));
        assert!(!s.complete(&stale));
    }

    #[test]
    fn shutdown_refuses_requests_and_discards_in_flight() {
        let (clock, s) = scheduler(Some(1));
        let ticket = s.request(RefreshTrigger::Manual).unwrap();
        s.shutdown();

        assert!(s.is_shut_down());
        assert!(s.next_due().is_none());
        assert!(s.request(RefreshTrigger::Manual).is_none());
        assert!(!s.complete(&ticket));

        clock.advance(Duration::minutes(10));
        assert!(s.poll_due().is_none());
    }
}

// ═══════════════════════════════════════════════════════════════════
// Timer cadence
// ═══════════════════════════════════════════════════════════════════

mod cadence {
    use super::*;

    #[test]
    fn fires_when_deadline_passes() {
        let (clock, s) = scheduler(Some(5));
        assert_eq!(s.next_due(), Some(start() + Duration::minutes(5)));

        clock.advance(Duration::minutes(4));
        assert!(s.poll_due().is_none());

        clock.advance(Duration::minutes(1));
        let ticket = s.poll_due().unwrap();
        assert_eq!(ticket.trigger, RefreshTrigger::Timer);
        assert_eq!(s.next_due(), Some(start() + Duration::minutes(10)));
    }

    #[test]
    fn missed_ticks_collapse_into_one() {
        let (clock, s) = scheduler(Some(5));
        clock.advance(Duration::minutes(17));

        let ticket = s.poll_due().unwrap();
        s.complete(&ticket);
        assert!(s.poll_due().is_none());
        assert_eq!(s.next_due(), Some(start() + Duration::minutes(20)));
    }

    #[test]
    fn timer_during_refresh_is_coalesced_but_rescheduled() {
        let (clock, s) = scheduler(Some(5));
        let manual = s.request(RefreshTrigger::Manual).unwrap();

        clock.advance(Duration::minutes(5));
        assert!(s.poll_due().is_none());
        assert_eq!(s.coalesced_count(), 1);
        assert_eq!(s.next_due(), Some(start() + Duration::minutes(10)));
        assert!(s.complete(&manual));
    }

    #[test]
    fn zero_or_none_disables_timer() {
        for minutes in [None, Some(0)] {
            let (clock, s) = scheduler(minutes);
            assert!(s.interval().is_none());
            assert!(s.next_due().is_none());
            clock.advance(Duration::hours(24));
            assert!(s.poll_due().is_none());
            // Manual refresh still works.
            assert!(s.request(RefreshTrigger::Manual).is_some());
        }
    }

    #[test]
    fn set_interval_restarts_the_timer_from_now() {
        let (clock, s) = scheduler(Some(5));
        clock.advance(Duration::minutes(3));
        s.set_interval(Some(15));
        assert_eq!(s.interval(), Some(Duration::minutes(15)));
        assert_eq!(s.next_due(), Some(start() + Duration::minutes(18)));

        s.set_interval(None);
        assert!(s.next_due().is_none());
    }
}

// ═══════════════════════════════════════════════════════════════════
// RefreshService
// ═══════════════════════════════════════════════════════════════════

/// Returns a fixed price once a permit is available.
struct GatedSource {
    gate: Arc<Semaphore>,
    price: f64,
}

#[async_trait]
impl PriceSource for GatedSource {
    fn id(&self) -> &str {
        "gated"
    }

    fn name(&self) -> &str {
        "Gated"
    }

    fn supports(&self, _symbol: &str) -> bool {
        true
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<PriceQuote, CoreError> {
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| CoreError::Network(e.to_string()))?;
        permit.forget();
        Ok(PriceQuote::new(symbol, self.price, "gated"))
    }
}

struct FixedFx(f64);

#[async_trait]
impl FxProvider for FixedFx {
    fn id(&self) -> &str {
        "fixed"
    }

    fn name(&self) -> &str {
        "Fixed"
    }

    async fn fetch_rate(&self, _base: &str, _target: &str) -> Result<f64, CoreError> {
        Ok(self.0)
    }
}

struct Harness {
    clock: Arc<ManualClock>,
    gate: Arc<Semaphore>,
    service: Arc<RefreshService>,
}

fn harness(minutes: Option<u32>, open_permits: usize) -> Harness {
    let clock = Arc::new(ManualClock::new(start()));
    let gate = Arc::new(Semaphore::new(open_permits));
    let scheduler = Arc::new(RefreshScheduler::new(clock.clone(), minutes));
    let aggregator = Arc::new(PriceAggregator::new(vec![Arc::new(GatedSource {
        gate: gate.clone(),
        price: 50_000.0,
    })]));
    let fx = Arc::new(FxRateClient::new(
        vec![Arc::new(FixedFx(90.0))],
        StorageManager::new(Arc::new(MemoryStore::new())),
    ));
    let service = Arc::new(RefreshService::new(scheduler, aggregator, fx, "USD", "RUB"));
    service.set_tracked_symbols(BTreeSet::from(["BTC".to_string()]));
    Harness { clock, gate, service }
}

async fn wait_until_refreshing(service: &RefreshService) {
    while service.scheduler().state() != SchedulerState::Refreshing {
        tokio::task::yield_now().await;
    }
}

mod service {
    use super::*;

    #[tokio::test]
    async fn completed_refresh_publishes_prices_and_fx() {
        let h = harness(Some(5), 10);
        let outcome = h.service.refresh(RefreshTrigger::Initial).await;

        let report = match outcome {
            RefreshOutcome::Completed(report) => report,
            other => panic!("expected completion, got {other:?}"),
        };
        assert_eq!(report.trigger, RefreshTrigger::Initial);
        assert_eq!(report.prices.quoted, 1);
        assert!(matches!(report.fx, FxStatus::Live(ref r) if r.rate == 90.0));
        assert_eq!(h.service.aggregator().snapshot().len(), 1);
        assert_eq!(h.service.fx().current().unwrap().rate, 90.0);
        assert_eq!(h.service.scheduler().state(), SchedulerState::Idle);
    }

    #[tokio::test]
    async fn overlapping_trigger_is_coalesced() {
        let h = harness(Some(5), 0);
        let running = {
            let service = h.service.clone();
            tokio::spawn(async move { service.refresh(RefreshTrigger::Manual).await })
        };
        wait_until_refreshing(&h.service).await;

        let second = h.service.refresh(RefreshTrigger::Manual).await;
        assert_eq!(second, RefreshOutcome::Coalesced);

        h.gate.add_permits(1);
        let first = running.await.unwrap();
        assert!(matches!(first, RefreshOutcome::Completed(_)));
        assert_eq!(h.service.scheduler().coalesced_count(), 1);
    }

    #[tokio::test]
    async fn results_of_stale_refresh_are_discarded() {
        let h = harness(Some(5), 0);
        let running = {
            let service = h.service.clone();
            tokio::spawn(async move { service.refresh(RefreshTrigger::Timer).await })
        };
        wait_until_refreshing(&h.service).await;

        h.service.scheduler().set_interval(Some(1));
        h.gate.add_permits(1);

        assert_eq!(running.await.unwrap(), RefreshOutcome::Discarded);
        assert!(h.service.aggregator().snapshot().is_empty());
        assert!(h.service.fx().current().is_none());
    }

    #[tokio::test]
    async fn tick_runs_only_when_due() {
        let h = harness(Some(5), 10);
        assert!(h.service.tick().await.is_none());

        h.clock.advance(Duration::minutes(5));
        let outcome = h.service.tick().await.unwrap();
        assert!(matches!(outcome, RefreshOutcome::Completed(ref r) if r.trigger == RefreshTrigger::Timer));
        assert!(h.service.tick().await.is_none());
    }

    #[tokio::test]
    async fn auto_refresh_task_runs_due_refreshes_and_stops() {
        let h = harness(Some(1), 100);
        let handle = h
            .service
            .spawn_auto_refresh(std::time::Duration::from_millis(5));
        assert!(handle.is_running());

        h.clock.advance(Duration::minutes(1));
        let mut published = false;
        for _ in 0..400 {
            if h.service.aggregator().revision() > 0 {
                published = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert!(published, "auto-refresh never ran");

        handle.stop().await;
        let revision = h.service.aggregator().revision();
        h.clock.advance(Duration::minutes(5));
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        assert_eq!(h.service.aggregator().revision(), revision);
    }

    #[tokio::test]
    async fn shutdown_stops_auto_refresh() {
        let h = harness(Some(1), 100);
        let handle = h
            .service
            .spawn_auto_refresh(std::time::Duration::from_millis(5));
        h.service.scheduler().shutdown();

        for _ in 0..400 {
            if !handle.is_running() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert!(!handle.is_running());
        assert_eq!(
            h.service.refresh(RefreshTrigger::Manual).await,
            RefreshOutcome::Discarded
        );
    }
}
