//! Metrics and logging for the price monitor.

use std::collections::BTreeMap;
use std::time::Instant;

use tracing::info;

use common::AcquisitionErrorKind;

use crate::monitor::CycleReport;

/// Running totals across cycles.
pub struct Metrics {
    start_time: Instant,
    cycles: u32,
    /// Cycles rejected because one was already running
    skipped_cycles: u32,
    /// Cycles that could not start (catalog unreadable)
    failed_cycles: u32,
    processed: usize,
    invalid_entries: usize,
    outcomes: BTreeMap<&'static str, usize>,
    failures: BTreeMap<AcquisitionErrorKind, usize>,
    alerts_sent: usize,
    delivery_failures: usize,
    quarantined: usize,
    store_errors: usize,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            cycles: 0,
            skipped_cycles: 0,
            failed_cycles: 0,
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

    /// Fold a finished cycle into the totals.
    pub fn record_cycle(&mut self, report: &CycleReport) {
        self.cycles += 1;
        self.processed += report.processed;
        self.invalid_entries += report.invalid_entries;
        for (kind, count) in &report.outcomes {
            *self.outcomes.entry(*kind).or_insert(0) += count;
        }
        for (kind, count) in &report.failures {
            *self.failures.entry(*kind).or_insert(0) += count;
        }
        self.alerts_sent += report.alerts_sent;
        self.delivery_failures += report.delivery_failures;
        self.quarantined += report.quarantined;
        self.store_errors += report.store_errors;
    }

    pub fn record_skipped(&mut self) {
        self.skipped_cycles += 1;
    }

    pub fn record_failed_cycle(&mut self) {
        self.failed_cycles += 1;
    }

    pub fn total_failures(&self) -> usize {
        self.failures.values().sum()
    }

    /// Print metrics summary.
    pub fn print_summary(&self) {
        let elapsed = self.start_time.elapsed();

        info!("╔════════════════════════════════════════════════════════════╗");
        info!("║                  PRICE MONITOR METRICS                     ║");
        info!("╠════════════════════════════════════════════════════════════╣");
        info!(
            "║  Uptime:            {:>8.1} minutes                       ║",
            elapsed.as_secs_f64() / 60.0
        );
        info!(
            "║  Cycles:            {:>8} ({} skipped, {} failed)          ║",
            self.cycles, self.skipped_cycles, self.failed_cycles
        );
        info!(
            "║  Items Processed:   {:>8}                                 ║",
            self.processed
        );
        info!(
            "║  Invalid Entries:   {:>8}                                 ║",
            self.invalid_entries
        );
        info!(
            "║  Alerts Sent:       {:>8}                                 ║",
            self.alerts_sent
        );
        info!(
            "║  Delivery Errors:   {:>8}                                 ║",
            self.delivery_failures
        );
        info!(
            "║  Quarantined:       {:>8}                                 ║",
            self.quarantined
        );
        info!(
            "║  Store Errors:      {:>8}                                 ║",
            self.store_errors
        );
        info!("╠════════════════════════════════════════════════════════════╣");
        info!("║  Outcomes:                                                 ║");
        for (kind, count) in &self.outcomes {
            info!("║    {:<24} {:>8}                         ║", kind, count);
        }
        info!(
            "║  Fetch Failures:    {:>8}                                 ║",
            self.total_failures()
        );
        for (kind, count) in &self.failures {
            info!("║    {:<24} {:>8}                         ║", kind.as_str(), count);
        }
        info!("╚════════════════════════════════════════════════════════════╝");
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
