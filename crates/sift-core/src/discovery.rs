//! Background promotion of unknown outlets.
//!
//! The engine pushes canonical domains it has no directory entry for onto a
//! bounded queue. A worker drains the queue and promotes a domain to tier 3
//! once the reliability ledger shows it has earned it. The search path never
//! waits on the worker: a full queue drops the domain, and it is offered
//! again the next time a search sees it.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::models::{PaywallStatus, SourceStatus, SourceTier};
use crate::outlets::{OutletDirectory, OutletInfo};
use crate::source_tracker::SourceTracker;

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub capacity: usize,
    pub min_attempts: u64,
    /// Lifetime success rate required for promotion.
    pub min_success_rate: f64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            min_attempts: 5,
            min_success_rate: 0.7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryDecision {
    Promoted,
    AlreadyKnown,
    /// Not enough evidence yet, or the evidence is bad.
    NotEligible,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoveryStats {
    pub evaluated: u64,
    pub promoted: u64,
}

/// Sending half, held by the engine.
#[derive(Clone)]
pub struct DiscoveryQueue {
    tx: mpsc::Sender<String>,
}

impl DiscoveryQueue {
    /// Offer a domain without waiting. Returns false if it was dropped.
    pub fn offer(&self, domain: &str) -> bool {
        match self.tx.try_send(domain.to_string()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(d)) => {
                tracing::debug!(domain = %d, "Discovery queue full, dropping domain");
                false
            }
            Err(mpsc::error::TrySendError::Closed(d)) => {
                tracing::debug!(domain = %d, "Discovery worker gone, dropping domain");
                false
            }
        }
    }
}

/// Receiving half; run it with [`DiscoveryWorker::run`].
pub struct DiscoveryWorker {
    rx: mpsc::Receiver<String>,
    tracker: SourceTracker,
    outlets: Arc<OutletDirectory>,
    config: DiscoveryConfig,
}

/// Create a connected queue/worker pair.
pub fn discovery_channel(
    tracker: SourceTracker,
    outlets: Arc<OutletDirectory>,
    config: DiscoveryConfig,
) -> (DiscoveryQueue, DiscoveryWorker) {
    let (tx, rx) = mpsc::channel(config.capacity.max(1));
    (
        DiscoveryQueue { tx },
        DiscoveryWorker {
            rx,
            tracker,
            outlets,
            config,
        },
    )
}

impl DiscoveryWorker {
    pub fn evaluate(&self, domain: &str) -> DiscoveryDecision {
        if self.outlets.is_known(domain) {
            return DiscoveryDecision::AlreadyKnown;
        }
        let Some(profile) = self.tracker.profile(domain) else {
            return DiscoveryDecision::NotEligible;
        };
        let eligible = self.tracker.status(domain) == SourceStatus::Active
            && profile.total_attempts >= self.config.min_attempts
            && profile.lifetime_success_rate() >= self.config.min_success_rate;
        if !eligible {
            return DiscoveryDecision::NotEligible;
        }

        let info = OutletInfo {
            tier: SourceTier::Tier3,
            region: None,
            paywall: PaywallStatus::Free,
        };
        if self.outlets.promote(domain, info) {
            DiscoveryDecision::Promoted
        } else {
            DiscoveryDecision::AlreadyKnown
        }
    }

    /// Drain the queue until cancelled or every sender is dropped.
    pub async fn run(mut self, cancel_token: CancellationToken) -> DiscoveryStats {
        tracing::info!("Discovery worker started");
        let mut stats = DiscoveryStats::default();
        let mut settled: HashSet<String> = HashSet::new();

        loop {
            let domain = tokio::select! {
                () = cancel_token.cancelled() => break,
                msg = self.rx.recv() => match msg {
                    Some(domain) => domain,
                    None => break,
                },
            };
            if settled.contains(&domain) {
                continue;
            }
            stats.evaluated += 1;
            match self.evaluate(&domain) {
                DiscoveryDecision::Promoted => {
                    stats.promoted += 1;
                    settled.insert(domain);
                }
                DiscoveryDecision::AlreadyKnown => {
                    settled.insert(domain);
                }
                DiscoveryDecision::NotEligible => {
                    tracing::debug!(%domain, "Outlet not eligible for promotion yet");
                }
            }
        }

        tracing::info!(
            evaluated = stats.evaluated,
            promoted = stats.promoted,
            "Discovery worker stopped"
        );
        stats
    }
}
