use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{RwLock, watch};
use tracing::Instrument;
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::models::{CycleReport, Province, ProvinceOutcome};
use crate::pipeline::AppointmentPipeline;
use crate::plugins::NotifierHub;

#[derive(Debug, Clone, Default, Serialize)]
pub struct MonitorStats {
    pub cycles_run: u64,
    pub checks_run: u64,
    pub appointments_found: u64,
    pub aborted_checks: u64,
    pub consecutive_transport_failures: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub last_cycle_at: Option<DateTime<Utc>>,
}

/// Checks every configured province once per cycle, one after the other,
/// and keeps doing so until told to stop.
#[derive(Clone)]
pub struct Monitor {
    pipeline: Arc<AppointmentPipeline>,
    notifiers: NotifierHub,
    provinces: Arc<[Province]>,
    config: SchedulerConfig,
    stats: Arc<RwLock<MonitorStats>>,
}

impl Monitor {
    pub fn new(
        pipeline: AppointmentPipeline,
        notifiers: NotifierHub,
        provinces: Vec<Province>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            notifiers,
            provinces: provinces.into(),
            config,
            stats: Arc::new(RwLock::new(MonitorStats::default())),
        }
    }

    pub async fn stats(&self) -> MonitorStats {
        self.stats.read().await.clone()
    }

    /// One pass over all configured provinces.
    pub async fn run_cycle(&self) -> CycleReport {
        let provinces = Arc::clone(&self.provinces);
        self.run_provinces(&provinces).await
    }

    /// One pass over `provinces`, in order, pausing between them. A province
    /// that aborts is recorded and the cycle moves on to the next one.
    pub async fn run_provinces(&self, provinces: &[Province]) -> CycleReport {
        let cycle_id = Uuid::new_v4();
        let span = tracing::info_span!("cycle", cycle_id = %cycle_id);

        async {
            let started_at = Utc::now();
            tracing::info!("Starting appointment check cycle ({} provinces)", provinces.len());

            let mut outcomes = Vec::with_capacity(provinces.len());
            let mut transport_failures = 0;

            for (index, province) in provinces.iter().enumerate() {
                if index > 0 {
                    tokio::time::sleep(self.config.province_pause()).await;
                }

                match self.pipeline.check_province(province).await {
                    Ok(result) => {
                        let outcome = if result.available { "available" } else { "unavailable" };
                        metrics::counter!("cita_checks_total", "province" => province.to_string(), "outcome" => outcome)
                            .increment(1);

                        if result.available {
                            let deliveries = self.notifiers.notify_all(province, &result).await;
                            let delivered = deliveries.iter().filter(|d| d.result.success).count();
                            tracing::info!(
                                "Appointment alert for {} delivered by {}/{} notifiers",
                                province,
                                delivered,
                                deliveries.len()
                            );
                        }
                        outcomes.push(ProvinceOutcome::Checked { result });
                    }
                    Err(e) => {
                        metrics::counter!("cita_checks_total", "province" => province.to_string(), "outcome" => "aborted")
                            .increment(1);
                        if e.is_transport() {
                            transport_failures += 1;
                        }
                        tracing::error!("Error checking {}: {}", province, e);
                        outcomes.push(ProvinceOutcome::aborted(province.clone(), &e));
                    }
                }
            }

            let report = CycleReport {
                cycle_id,
                started_at,
                finished_at: Utc::now(),
                outcomes,
                transport_failures,
            };
            self.record(&report).await;
            report
        }
        .instrument(span)
        .await
    }

    async fn record(&self, report: &CycleReport) {
        let found = report.available().count();
        let mut stats = self.stats.write().await;
        stats.cycles_run += 1;
        stats.checks_run += report.outcomes.len() as u64;
        stats.appointments_found += found as u64;
        stats.aborted_checks += report.aborted_count() as u64;
        stats.last_cycle_at = Some(report.finished_at);

        if report.all_transport_failures() {
            stats.consecutive_transport_failures += 1;
            tracing::warn!(
                "Every province failed on the network ({} consecutive cycles)",
                stats.consecutive_transport_failures
            );
        } else {
            stats.consecutive_transport_failures = 0;
        }

        if found > 0 {
            tracing::info!("Total appointments found this cycle: {}", found);
        } else {
            tracing::info!("No appointments found in any province");
        }
    }

    /// Run cycles until `shutdown` flips to `true`.
    ///
    /// The flag is honoured between cycles and while waiting; a cycle that
    /// has started always runs to the end.
    pub async fn run_forever(&self, mut shutdown: watch::Receiver<bool>) -> MonitorStats {
        self.stats.write().await.started_at = Some(Utc::now());
        self.notifiers.broadcast_status(&self.startup_message()).await;

        let mut cycle: u64 = 0;
        loop {
            cycle += 1;
            let this = self.clone();
            let wait = match tokio::spawn(async move { this.run_cycle().await }).await {
                Ok(_report) => {
                    if self.config.status_every_cycles > 0 && cycle % self.config.status_every_cycles == 0 {
                        self.notifiers.broadcast_status(&self.heartbeat_message(cycle)).await;
                    }
                    tracing::info!("Check cycle completed. Waiting {:?} before next check", self.config.check_interval());
                    self.config.check_interval()
                }
                Err(e) => {
                    tracing::error!("Error in monitoring cycle: {}", e);
                    self.notifiers.broadcast_error(&format!("Monitoring error: {}", e)).await;
                    self.config.error_backoff()
                }
            };

            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Monitoring stopped");
        self.notifiers.broadcast_status("⏹️ Cita watcher monitoring stopped").await;
        self.stats().await
    }

    fn startup_message(&self) -> String {
        let names: Vec<&str> = self.provinces.iter().map(Province::as_str).collect();
        format!(
            "🤖 Cita watcher started monitoring!\n📍 Provinces: {}\n⏱️ Check interval: {} minutes\n🔧 Transport: {}",
            names.join(", "),
            self.config.check_interval_secs / 60,
            self.pipeline.transport().kind()
        )
    }

    fn heartbeat_message(&self, cycle: u64) -> String {
        format!(
            "✅ Watcher is active (cycle #{})\n⏱️ Last check: {}\n📊 Monitoring {} provinces",
            cycle,
            Local::now().format("%H:%M"),
            self.provinces.len()
        )
    }
}
