//! Monitoring cycle: catalog → fetch → decide → persist → notify.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use common::retry::random_jitter;
use common::{
    AcquisitionError, AcquisitionErrorKind, Catalog, CatalogError, Config, Notifier, Observation,
    PriceSource, PriceStore, ProductRef, QuarantineLog, QuarantineRecord,
};

use crate::detector::{decide, Outcome, PolicyConfig};

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("A monitoring cycle is already running")]
    AlreadyRunning,

    #[error("Catalog unavailable: {0}")]
    Catalog(#[from] CatalogError),
}

/// Counters for one cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Valid active entries that were fetched
    pub processed: usize,
    pub invalid_entries: usize,
    /// Decision outcomes keyed by [`Outcome::kind`]
    pub outcomes: BTreeMap<&'static str, usize>,
    pub failures: BTreeMap<AcquisitionErrorKind, usize>,
    pub alerts_sent: usize,
    pub delivery_failures: usize,
    pub quarantined: usize,
    pub store_errors: usize,
}

impl CycleReport {
    pub(crate) fn new() -> Self {
        Self {
            cycle_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            processed: 0,
            invalid_entries: 0,
            outcomes: BTreeMap::new(),
            failures: BTreeMap::new(),
            alerts_sent: 0,
            delivery_failures: 0,
            quarantined: 0,
            store_errors: 0,
        }
    }

    pub fn outcome_count(&self, kind: &str) -> usize {
        self.outcomes.get(kind).copied().unwrap_or(0)
    }

    pub fn failure_count(&self, kind: AcquisitionErrorKind) -> usize {
        self.failures.get(&kind).copied().unwrap_or(0)
    }

    pub fn total_failures(&self) -> usize {
        self.failures.values().sum()
    }
}

/// Orchestrator knobs that are not part of the alert policy.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub catalog_path: PathBuf,
    pub item_delay: Duration,
    pub item_jitter: Duration,
    pub quarantine_threshold: u32,
    pub purge_on_quarantine: bool,
}

impl MonitorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            catalog_path: config.catalog_path.clone(),
            item_delay: Duration::from_millis(config.item_delay_ms),
            item_jitter: Duration::from_millis(config.item_jitter_ms),
            quarantine_threshold: config.quarantine_threshold.max(1),
            purge_on_quarantine: config.purge_on_quarantine,
        }
    }
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub cycle_in_progress: bool,
    pub cycles_completed: u64,
    pub last_cycle_finished_at: Option<DateTime<Utc>>,
}

/// Clears the in-progress flag when a cycle ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct Monitor {
    source: Arc<dyn PriceSource>,
    store: Arc<PriceStore>,
    notifier: Arc<dyn Notifier>,
    quarantine: QuarantineLog,
    policy: PolicyConfig,
    settings: MonitorSettings,
    running: AtomicBool,
    cycles_completed: AtomicU64,
    last_cycle_finished_at: Mutex<Option<DateTime<Utc>>>,
}

impl Monitor {
    pub fn new(
        source: Arc<dyn PriceSource>,
        store: Arc<PriceStore>,
        notifier: Arc<dyn Notifier>,
        quarantine: QuarantineLog,
        policy: PolicyConfig,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            source,
            store,
            notifier,
            quarantine,
            policy,
            settings,
            running: AtomicBool::new(false),
            cycles_completed: AtomicU64::new(0),
            last_cycle_finished_at: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            status: "ok",
            cycle_in_progress: self.is_running(),
            cycles_completed: self.cycles_completed.load(Ordering::SeqCst),
            last_cycle_finished_at: self
                .last_cycle_finished_at
                .lock()
                .ok()
                .and_then(|guard| *guard),
        }
    }

    /// Process every active catalog entry once, sequentially.
    ///
    /// Per-item failures are logged and counted, never returned.
    pub async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(CycleError::AlreadyRunning);
        }
        let _guard = RunningGuard(&self.running);

        let mut report = CycleReport::new();
        let catalog = Catalog::load(&self.settings.catalog_path)?;
        let entries = catalog.active_products();
        info!(
            "[CYCLE] {} starting with {} active entries",
            report.cycle_id,
            entries.len()
        );

        for entry in entries {
            let product = match entry {
                Ok(product) => product,
                Err(e) => {
                    warn!("[CYCLE] Skipping catalog entry: {}", e);
                    report.invalid_entries += 1;
                    continue;
                }
            };

            if report.processed > 0 {
                self.pause().await;
            }
            report.processed += 1;
            self.process(&product, &mut report).await;
        }

        let finished_at = Utc::now();
        report.finished_at = Some(finished_at);
        self.cycles_completed.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_cycle_finished_at.lock() {
            *last = Some(finished_at);
        }

        info!(
            "[CYCLE] {} finished in {}s: {} processed, {} alerts, {} failures, {} quarantined",
            report.cycle_id,
            (finished_at - report.started_at).num_seconds(),
            report.processed,
            report.alerts_sent,
            report.total_failures(),
            report.quarantined
        );
        Ok(report)
    }

    async fn pause(&self) {
        let delay = self.settings.item_delay + random_jitter(self.settings.item_jitter);
        if !delay.is_zero() {
            debug!("[CYCLE] Sleeping {:?} before next item", delay);
            sleep(delay).await;
        }
    }

    async fn process(&self, product: &ProductRef, report: &mut CycleReport) {
        match self.source.fetch(product).await {
            Ok(observation) => self.handle_observation(product, observation, report).await,
            Err(e) => self.handle_failure(product, e, report),
        }
    }

    async fn handle_observation(
        &self,
        product: &ProductRef,
        observation: Observation,
        report: &mut CycleReport,
    ) {
        let id = product.external_id.as_str();

        if let Err(e) = self.store.clear_failures(id) {
            warn!("[STORE] Could not reset failures for {}: {}", product.label(), e);
            report.store_errors += 1;
        }

        let now = Utc::now();
        let outcome = match self.store.put(id, |state| {
            let decision = decide(product, &observation, state, &self.policy, now);
            (decision.next_state, decision.outcome)
        }) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("[STORE] Failed to persist {}: {}", product.label(), e);
                report.store_errors += 1;
                return;
            }
        };

        *report.outcomes.entry(outcome.kind()).or_insert(0) += 1;

        match outcome {
            Outcome::Alert(mut alert) => {
                alert.url = self.source.affiliate_link(product, &alert.url).await;
                info!("[ALERT] {} {}", product.label(), alert.summary());

                match self.notifier.notify(&alert).await {
                    Ok(()) => report.alerts_sent += 1,
                    Err(e) => {
                        warn!("[ALERT] Delivery failed for {}: {}", product.label(), e);
                        report.delivery_failures += 1;
                    }
                }
            }
            Outcome::Baseline => info!(
                "[DECISION] {} baseline at {:?} via {}",
                product.label(),
                observation.price,
                observation.method.as_str()
            ),
            Outcome::NoImprovement => debug!(
                "[DECISION] {} no improvement ({:?})",
                product.label(),
                observation.price
            ),
            Outcome::NoPrice => warn!(
                "[DECISION] {} answered via {} without a price",
                product.label(),
                observation.method.as_str()
            ),
            suppressed => info!("[DECISION] {} suppressed: {}", product.label(), suppressed),
        }
    }

    fn handle_failure(&self, product: &ProductRef, e: AcquisitionError, report: &mut CycleReport) {
        warn!(
            "[SOURCE] {} failed: kind={} {}",
            product.label(),
            e.kind,
            e.message
        );
        *report.failures.entry(e.kind).or_insert(0) += 1;

        if e.kind != AcquisitionErrorKind::NotFound {
            return;
        }

        let failures = match self.store.record_failure(&product.external_id) {
            Ok(count) => count,
            Err(e) => {
                error!("[STORE] Failed to count failure for {}: {}", product.label(), e);
                report.store_errors += 1;
                return;
            }
        };

        if failures < self.settings.quarantine_threshold {
            info!(
                "[QUARANTINE] {} not found ({}/{})",
                product.label(),
                failures,
                self.settings.quarantine_threshold
            );
            return;
        }

        if self.quarantine_product(product, failures, report) {
            report.quarantined += 1;
        }
    }

    fn quarantine_product(&self, product: &ProductRef, failures: u32, report: &mut CycleReport) -> bool {
        let id = product.external_id.as_str();
        let title = self.store.get(id).ok().flatten().and_then(|s| s.title);

        // The failure count stays, so the next cycle retries the removal
        match Catalog::remove_from_file(&self.settings.catalog_path, product) {
            Ok(0) => warn!("[QUARANTINE] {} was no longer in the catalog", product.label()),
            Ok(_) => {}
            Err(e) => {
                error!(
                    "[QUARANTINE] Could not remove {} from catalog: {}",
                    product.label(),
                    e
                );
                report.store_errors += 1;
                return false;
            }
        }

        if let Err(e) = self
            .quarantine
            .append(QuarantineRecord::not_found(product, title, failures))
        {
            error!(
                "[QUARANTINE] Removed {} from catalog but could not record it ({} failures): {}",
                product.label(),
                failures,
                e
            );
            report.store_errors += 1;
        }

        let cleanup = if self.settings.purge_on_quarantine {
            self.store.remove(id).map(|_| ())
        } else {
            self.store.clear_failures(id)
        };
        if let Err(e) = cleanup {
            error!("[STORE] Cleanup after quarantine of {} failed: {}", product.label(), e);
            report.store_errors += 1;
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::acquisition::MockPriceSource;
    use common::notifier::MockNotifier;
    use common::{AcquisitionMethod, NotifyError, Platform};
    use mockall::Sequence;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const CATALOG: &str = r#"[
        { "seq": 1, "platform": "amazon", "asin": "B0ABCDEF12", "title": "Air Fryer" }
    ]"#;

    fn observation(price: Option<Decimal>) -> Observation {
        Observation {
            title: "Air Fryer 4L".to_string(),
            price,
            image_url: None,
            canonical_url: "https://www.amazon.com.br/dp/B0ABCDEF12".to_string(),
            method: AcquisitionMethod::PartnerApi,
        }
    }

    fn settings(dir: &Path) -> MonitorSettings {
        MonitorSettings {
            catalog_path: dir.join("products.json"),
            item_delay: Duration::ZERO,
            item_jitter: Duration::ZERO,
            quarantine_threshold: 2,
            purge_on_quarantine: false,
        }
    }

    fn monitor(
        dir: &TempDir,
        catalog: &str,
        source: MockPriceSource,
        notifier: MockNotifier,
        settings: MonitorSettings,
    ) -> (Monitor, Arc<PriceStore>) {
        fs::write(dir.path().join("products.json"), catalog).unwrap();
        let store = Arc::new(PriceStore::open(dir.path().join("state.json")).unwrap());
        let monitor = Monitor::new(
            Arc::new(source),
            store.clone(),
            Arc::new(notifier),
            QuarantineLog::new(dir.path().join("quarantine.json")),
            PolicyConfig::default(),
            settings,
        );
        (monitor, store)
    }

    #[tokio::test]
    async fn test_baseline_then_alert() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = MockPriceSource::new();
        let mut seq = Sequence::new();
        source
            .expect_fetch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(observation(Some(dec!(200)))));
        source
            .expect_fetch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(observation(Some(dec!(150)))));
        source
            .expect_affiliate_link()
            .times(1)
            .returning(|_, url| format!("{}?tag=promo-20", url));

        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .times(1)
            .withf(|alert| {
                alert.drop_percent == dec!(25.0)
                    && alert.reference_price == dec!(200)
                    && alert.url == "https://www.amazon.com.br/dp/B0ABCDEF12?tag=promo-20"
            })
            .returning(|_| Ok(()));

        let (monitor, store) = monitor(&dir, CATALOG, source, notifier, settings(dir.path()));

        let first = monitor.run_cycle().await.unwrap();
        assert_eq!(first.outcome_count("baseline"), 1);
        assert_eq!(first.alerts_sent, 0);

        let second = monitor.run_cycle().await.unwrap();
        assert_eq!(second.outcome_count("alert"), 1);
        assert_eq!(second.alerts_sent, 1);

        let state = store.get("B0ABCDEF12").unwrap().unwrap();
        assert_eq!(state.last_price, Some(dec!(150)));
        assert_eq!(state.lowest_price, Some(dec!(150)));
        assert!(state.last_alert_at.is_some());

        // survives a reopen
        let reopened = PriceStore::open(dir.path().join("state.json")).unwrap();
        assert_eq!(reopened.get("B0ABCDEF12").unwrap(), Some(state));

        let health = monitor.health();
        assert_eq!(health.cycles_completed, 2);
        assert!(!health.cycle_in_progress);
        assert!(health.last_cycle_finished_at.is_some());
    }

    #[tokio::test]
    async fn test_delivery_failure_keeps_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = MockPriceSource::new();
        let mut seq = Sequence::new();
        source
            .expect_fetch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(observation(Some(dec!(1000)))));
        source
            .expect_fetch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(observation(Some(dec!(700)))));
        source
            .expect_affiliate_link()
            .returning(|_, url| url.to_string());

        let mut notifier = MockNotifier::new();
        notifier.expect_notify().times(1).returning(|_| {
            Err(NotifyError::Rejected {
                method: "sendMessage".to_string(),
                description: "Forbidden".to_string(),
            })
        });

        let (monitor, store) = monitor(&dir, CATALOG, source, notifier, settings(dir.path()));
        monitor.run_cycle().await.unwrap();
        let report = monitor.run_cycle().await.unwrap();

        assert_eq!(report.delivery_failures, 1);
        assert_eq!(report.alerts_sent, 0);
        let state = store.get("B0ABCDEF12").unwrap().unwrap();
        assert_eq!(state.lowest_price, Some(dec!(700)));
        assert!(state.last_alert_at.is_some());
    }

    #[tokio::test]
    async fn test_null_price_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = MockPriceSource::new();
        source
            .expect_fetch()
            .returning(|_| Ok(observation(None)));

        let (monitor, store) = monitor(
            &dir,
            CATALOG,
            source,
            MockNotifier::new(),
            settings(dir.path()),
        );
        let report = monitor.run_cycle().await.unwrap();

        assert_eq!(report.outcome_count("no_price"), 1);
        assert!(store.get("B0ABCDEF12").unwrap().is_none());
        assert!(!dir.path().join("state.json").exists());
    }

    #[tokio::test]
    async fn test_invalid_and_disabled_entries_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = r#"[
            { "platform": "ebay", "id": "123" },
            { "platform": "ml", "mlId": "MLB-1234567", "status": "disabled" },
            { "platform": "ml", "mlId": "MLB-7654321" }
        ]"#;

        let mut source = MockPriceSource::new();
        source
            .expect_fetch()
            .times(1)
            .withf(|p| p.platform == Platform::MercadoLivre && p.external_id == "MLB7654321")
            .returning(|_| Ok(observation(Some(dec!(99.90)))));

        let (monitor, _store) = monitor(
            &dir,
            catalog,
            source,
            MockNotifier::new(),
            settings(dir.path()),
        );
        let report = monitor.run_cycle().await.unwrap();

        assert_eq!(report.invalid_entries, 1);
        assert_eq!(report.processed, 1);
        assert_eq!(report.outcome_count("baseline"), 1);
    }

    #[tokio::test]
    async fn test_repeated_not_found_quarantines() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = r#"[
            { "platform": "ml", "mlId": "MLB111", "title": "Liquidificador" },
            { "platform": "amazon", "asin": "B0ABCDEF12" }
        ]"#;

        let mut source = MockPriceSource::new();
        source
            .expect_fetch()
            .withf(|p| p.external_id == "MLB111")
            .times(2)
            .returning(|_| Err(AcquisitionError::not_found("item gone")));
        source
            .expect_fetch()
            .withf(|p| p.external_id == "B0ABCDEF12")
            .times(3)
            .returning(|_| Ok(observation(Some(dec!(300)))));

        let (monitor, store) = monitor(
            &dir,
            catalog,
            source,
            MockNotifier::new(),
            settings(dir.path()),
        );

        let first = monitor.run_cycle().await.unwrap();
        assert_eq!(first.failure_count(AcquisitionErrorKind::NotFound), 1);
        assert_eq!(first.quarantined, 0);
        assert_eq!(store.failure_count("MLB111").unwrap(), 1);

        let second = monitor.run_cycle().await.unwrap();
        assert_eq!(second.quarantined, 1);
        assert_eq!(store.failure_count("MLB111").unwrap(), 0);

        let records = QuarantineLog::new(dir.path().join("quarantine.json"))
            .load()
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].external_id, "MLB111");
        assert_eq!(records[0].title.as_deref(), Some("Liquidificador"));
        assert_eq!(records[0].failures, 2);

        let catalog = Catalog::load(dir.path().join("products.json")).unwrap();
        assert_eq!(catalog.entries.len(), 1);

        // quarantined product is no longer fetched
        let third = monitor.run_cycle().await.unwrap();
        assert_eq!(third.processed, 1);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = MockPriceSource::new();
        let mut seq = Sequence::new();
        source
            .expect_fetch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(AcquisitionError::not_found("404")));
        source
            .expect_fetch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(observation(Some(dec!(100)))));
        source
            .expect_fetch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(AcquisitionError::blocked("captcha")));

        let (monitor, store) = monitor(
            &dir,
            CATALOG,
            source,
            MockNotifier::new(),
            settings(dir.path()),
        );

        monitor.run_cycle().await.unwrap();
        assert_eq!(store.failure_count("B0ABCDEF12").unwrap(), 1);
        monitor.run_cycle().await.unwrap();
        assert_eq!(store.failure_count("B0ABCDEF12").unwrap(), 0);

        // non-definitive failures leave the count alone
        let report = monitor.run_cycle().await.unwrap();
        assert_eq!(report.failure_count(AcquisitionErrorKind::BlockedAntibot), 1);
        assert_eq!(store.failure_count("B0ABCDEF12").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_catalog_removal_keeps_count_and_skips_record() {
        let dir = tempfile::tempdir().unwrap();
        let catalog_path = dir.path().join("products.json");

        let mut source = MockPriceSource::new();
        source.expect_fetch().times(1).returning(move |_| {
            // catalog turns unreadable mid-cycle
            fs::write(&catalog_path, "[ not json").unwrap();
            Err(AcquisitionError::not_found("404"))
        });

        let mut settings = settings(dir.path());
        settings.quarantine_threshold = 1;
        let (monitor, store) = monitor(&dir, CATALOG, source, MockNotifier::new(), settings);

        let report = monitor.run_cycle().await.unwrap();
        assert_eq!(report.quarantined, 0);
        assert_eq!(report.store_errors, 1);
        assert_eq!(store.failure_count("B0ABCDEF12").unwrap(), 1);

        let records = QuarantineLog::new(dir.path().join("quarantine.json"))
            .load()
            .unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_purge_on_quarantine_removes_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = MockPriceSource::new();
        let mut seq = Sequence::new();
        source
            .expect_fetch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(observation(Some(dec!(100)))));
        source
            .expect_fetch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(AcquisitionError::not_found("404")));

        let mut settings = settings(dir.path());
        settings.quarantine_threshold = 1;
        settings.purge_on_quarantine = true;
        let (monitor, store) = monitor(&dir, CATALOG, source, MockNotifier::new(), settings);

        monitor.run_cycle().await.unwrap();
        assert!(store.get("B0ABCDEF12").unwrap().is_some());

        let report = monitor.run_cycle().await.unwrap();
        assert_eq!(report.quarantined, 1);
        assert!(store.get("B0ABCDEF12").unwrap().is_none());

        let records = QuarantineLog::new(dir.path().join("quarantine.json"))
            .load()
            .unwrap();
        assert_eq!(records[0].title.as_deref(), Some("Air Fryer 4L"));
    }

    #[tokio::test]
    async fn test_second_cycle_rejected_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = r#"[
            { "platform": "amazon", "asin": "B0ABCDEF12" },
            { "platform": "amazon", "asin": "B0ABCDEF13" }
        ]"#;
        let mut source = MockPriceSource::new();
        source
            .expect_fetch()
            .times(2)
            .returning(|_| Ok(observation(Some(dec!(100)))));

        let mut settings = settings(dir.path());
        settings.item_delay = Duration::from_millis(50);
        let (monitor, _store) = monitor(&dir, catalog, source, MockNotifier::new(), settings);

        let (first, second) = tokio::join!(monitor.run_cycle(), async {
            sleep(Duration::from_millis(5)).await;
            monitor.run_cycle().await
        });

        assert_eq!(first.unwrap().processed, 2);
        assert!(matches!(second, Err(CycleError::AlreadyRunning)));
        assert!(!monitor.is_running());
    }

    #[tokio::test]
    async fn test_missing_catalog_releases_guard() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(PriceStore::open(dir.path().join("state.json")).unwrap());
        let monitor = Monitor::new(
            Arc::new(MockPriceSource::new()),
            store,
            Arc::new(MockNotifier::new()),
            QuarantineLog::new(dir.path().join("quarantine.json")),
            PolicyConfig::default(),
            settings(dir.path()),
        );

        assert!(matches!(
            monitor.run_cycle().await,
            Err(CycleError::Catalog(CatalogError::Io { .. }))
        ));
        assert!(!monitor.is_running());
        assert_eq!(monitor.health().cycles_completed, 0);
    }
}
