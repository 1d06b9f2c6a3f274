//! Multi-account verification orchestrator.
//!
//! Round-robin rotation with per-batch failure memory bounds retries to at
//! most one attempt per pooled session per number, while still spreading
//! probe traffic and routing around sessions that go bad mid-batch.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::config::Config;
use crate::domain::{BatchEntry, ProbeOutcome, SessionRecord};
use crate::normalize::normalize_phone;
use crate::pool::SessionPool;
use crate::probe::probe_number;
use crate::report::render_line;
use crate::transport::Transport;
use crate::{Error, Result};

/// Outcome of one verification batch.
#[derive(Clone, Debug, Default)]
pub struct BatchReport {
    /// Per-number lines, in input order.
    pub lines: Vec<String>,
    /// Set when the batch aborted because every session in the snapshot was
    /// invalidated or rate limited; carries the longest reported wait.
    pub exhausted: Option<u32>,
}

pub struct Verifier {
    cfg: Arc<Config>,
    pool: SessionPool,
    transport: Arc<dyn Transport>,
}

impl Verifier {
    pub fn new(cfg: Arc<Config>, pool: SessionPool, transport: Arc<dyn Transport>) -> Self {
        Self {
            cfg,
            pool,
            transport,
        }
    }

    /// Run a batch against a pool snapshot taken at batch start.
    ///
    /// The snapshot is advisory: sessions invalidated here are reported to the
    /// pool, but concurrent reactivations are only picked up by later batches.
    pub async fn run_batch(
        &self,
        snapshot: &[SessionRecord],
        entries: &[BatchEntry],
    ) -> Result<BatchReport> {
        if snapshot.is_empty() {
            return Err(Error::NoSessionsAvailable);
        }

        let device = self.cfg.device_profile();
        let pool_size = snapshot.len();

        let mut cursor = 0usize;
        let mut failed: HashSet<usize> = HashSet::new();
        let mut flooded: HashMap<usize, u32> = HashMap::new();
        let mut report = BatchReport::default();
        let mut probed_any = false;

        for entry in entries {
            let Some(phone) = normalize_phone(&entry.phone, &self.cfg.country_prefixes) else {
                continue; // malformed input is dropped, not reported
            };

            if probed_any {
                self.pause_between_numbers().await;
            }
            probed_any = true;

            let mut outcome = None;
            for attempt in 0..pool_size {
                let idx = (cursor + attempt) % pool_size;
                if failed.contains(&idx) || flooded.contains_key(&idx) {
                    continue;
                }

                let session = &snapshot[idx];
                match probe_number(self.transport.as_ref(), &device, session, &phone).await {
                    ProbeOutcome::SessionInvalid => {
                        failed.insert(idx);
                        self.pool.invalidate(session.id).await?;
                    }
                    ProbeOutcome::RateLimited { wait_seconds } => {
                        tracing::info!(
                            session = %session.session_name,
                            wait_seconds,
                            "session rate limited, failing over"
                        );
                        flooded.insert(idx, wait_seconds);
                    }
                    other => {
                        outcome = Some(other);
                        break;
                    }
                }
            }

            // The cursor advances exactly once per processed number, whatever
            // the outcome, so first attempts stay evenly distributed.
            cursor = (cursor + 1) % pool_size;

            if let Some(outcome) = outcome {
                report.lines.push(render_line(&phone, &entry.name, &outcome));
            }

            if failed.len() + flooded.len() >= pool_size {
                let max_wait = flooded.values().copied().max().unwrap_or(0);
                tracing::warn!(
                    pool = pool_size,
                    max_wait,
                    "all sessions exhausted, aborting batch"
                );
                report.exhausted = Some(max_wait);
                break;
            }
        }

        Ok(report)
    }

    /// Randomized pause so probe traffic does not look bursty to the platform.
    async fn pause_between_numbers(&self) {
        let lo = self.cfg.probe_delay_min.min(self.cfg.probe_delay_max);
        let hi = self.cfg.probe_delay_min.max(self.cfg.probe_delay_max);
        if hi.is_zero() {
            return;
        }
        let ms = rand::thread_rng().gen_range(lo.as_millis() as u64..=hi.as_millis() as u64);
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}
