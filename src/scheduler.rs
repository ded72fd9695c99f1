use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::api::health::{CycleGuard, HealthState, SchedulerState};
use crate::api::latency::LatencyStats;
use crate::bootstrap::{warm_cache_if_empty, BootstrapOutcome};
use crate::config::Config;
use crate::connections::Connections;
use crate::error::Result;
use crate::fetcher::{fetch_listing, provider_client, IngestStats};
use crate::filter::{filter_listing, FilterStats};
use crate::sync::{SyncReport, SyncWriter};
use crate::types::now_ms;

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub ingest: IngestStats,
    pub filter: FilterStats,
    pub sync: SyncReport,
}

/// Drives fetch → filter → write: once at start, then on every interval tick until shutdown.
pub struct Scheduler {
    cfg: Config,
    conns: Arc<Connections>,
    client: reqwest::Client,
    health: Arc<HealthState>,
    latency: Arc<LatencyStats>,
}

impl Scheduler {
    pub fn new(
        cfg: Config,
        conns: Arc<Connections>,
        health: Arc<HealthState>,
        latency: Arc<LatencyStats>,
    ) -> Result<Self> {
        let client = provider_client()?;
        Ok(Self { cfg, conns, client, health, latency })
    }

    /// STARTING: open connections, apply the schema, warm an empty cache.
    /// Any failure closes the connections again and is fatal to the caller.
    pub async fn start(&self) -> Result<BootstrapOutcome> {
        self.health.set_state(SchedulerState::Starting);
        self.conns.initialize().await?;

        match self.prepare().await {
            Ok(outcome) => {
                self.health.set_state(SchedulerState::Idle);
                Ok(outcome)
            }
            Err(e) => {
                error!("Startup failed after connecting: {e}");
                self.conns.close().await;
                Err(e)
            }
        }
    }

    async fn prepare(&self) -> Result<BootstrapOutcome> {
        self.conns.document_store()?.ensure_schema().await?;
        info!("Document store schema ready");
        warm_cache_if_empty(&self.conns).await
    }

    /// One sync cycle. Errors abort this cycle only.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let (listing, ingest) = fetch_listing(&self.client, &self.cfg.provider_url).await?;
        info!(
            tokens = ingest.tokens_seen,
            pools = ingest.pools_seen,
            skipped_tokens = ingest.skipped_tokens,
            skipped_pools = ingest.skipped_pools,
            "Fetched {} tokens from provider",
            ingest.tokens_seen,
        );

        let (accepted, filter) = filter_listing(&listing);
        info!(
            "[FILTER] accepted={} of {} tokens | rejected: unknown_shape={} low_liquidity={} single_category={} | truncated_pools={}",
            filter.accepted_tokens,
            filter.tokens_seen,
            filter.rejected_unknown_shape,
            filter.rejected_low_liquidity,
            filter.rejected_single_category,
            filter.truncated_pools,
        );

        let writer = SyncWriter::new(self.conns.document_store()?, self.conns.cache()?);
        let sync = writer.write(&accepted, now_ms()).await?;

        Ok(CycleReport { ingest, filter, sync })
    }

    /// Run one cycle unless another is still in flight. Failures are logged, never returned.
    pub async fn tick(&self) -> Option<CycleReport> {
        let Some(_guard) = CycleGuard::acquire(&self.health) else {
            self.health.inc_ticks_skipped();
            warn!("Previous sync cycle still running, skipping this tick");
            return None;
        };

        self.health.set_state(SchedulerState::Syncing);
        info!("Sync cycle started");
        let started = Instant::now();
        let result = self.run_cycle().await;
        let elapsed = started.elapsed();
        self.latency.record(elapsed);

        let report = match result {
            Ok(report) => {
                self.health.record_success(now_ms(), report.sync.records_written);
                info!(
                    records = report.sync.records_written,
                    cache_applied = report.sync.cache.applied,
                    cache_failed = report.sync.cache.failed,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Sync cycle complete: {} records written",
                    report.sync.records_written,
                );
                Some(report)
            }
            Err(e) => {
                self.health.record_failure(now_ms());
                error!(elapsed_ms = elapsed.as_millis() as u64, "Sync cycle failed: {e}");
                None
            }
        };

        if self.health.state() != SchedulerState::Stopped {
            self.health.set_state(SchedulerState::Idle);
        }
        report
    }

    /// SYNCING ⇄ IDLE until `shutdown` resolves, then STOPPED with connections closed.
    /// The first tick fires immediately. An in-flight cycle is left to finish or fail on its own.
    pub async fn run<F>(self: Arc<Self>, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        let mut ticker = interval(self.cfg.sync_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Sync scheduled every {}s", self.cfg.sync_interval_secs);

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    let this = Arc::clone(&self);
                    tokio::spawn(async move {
                        this.tick().await;
                    });
                }
            }
        }

        info!("Shutdown requested, closing connections");
        self.health.set_state(SchedulerState::Stopped);
        self.conns.close().await;
    }
}
