//! Reliability ledger for content domains.
//!
//! Every search or extraction attempt against a domain is recorded as an
//! [`Outcome`]. The last ten outcomes decide the domain's status:
//!
//! ```text
//! < 5 outcomes                 -> ACTIVE
//! success rate < 10%           -> BLOCKED   (score -5, extraction skipped)
//! success rate < 30%           -> PROBATION (score -1)
//! otherwise                    -> ACTIVE
//! ```
//!
//! Blocked domains are not blocked forever. Every 28 days maintenance puts
//! the longest-blocked fifth of them on a three-attempt trial with a cleared
//! history; two successes out of three readmit the domain, anything less
//! re-blocks it.
//!
//! State lives in memory behind a mutex and is flushed with [`SourceTracker::save`].

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::{Outcome, SourceStatus};
use crate::persist::{read_document, write_document};

const LEDGER_VERSION: u32 = 1;

/// Domains known to paywall or block extraction, seeded as blocked.
pub const DEFAULT_KNOWN_BAD: &[(&str, Outcome)] = &[
    ("wsj.com", Outcome::Paywall),
    ("ft.com", Outcome::Paywall),
    ("bloomberg.com", Outcome::Paywall),
    ("economist.com", Outcome::Paywall),
    ("barrons.com", Outcome::Paywall),
    ("seekingalpha.com", Outcome::Paywall),
    ("msn.com", Outcome::NoText),
    ("news.google.com", Outcome::NoText),
    ("news.yahoo.com", Outcome::NoText),
];

/// Thresholds and schedule for status decisions.
#[derive(Debug, Clone)]
pub struct SourceTrackerConfig {
    /// Ring buffer capacity.
    pub window: usize,
    /// Fewer recorded outcomes than this is always `Active`.
    pub min_samples: usize,
    pub block_below: f64,
    pub probation_below: f64,
    pub maintenance_interval: TimeDelta,
    /// Share of blocked domains put on trial per maintenance run.
    pub trial_fraction: f64,
    pub trial_attempts: u32,
    pub trial_successes_required: usize,
}

impl Default for SourceTrackerConfig {
    fn default() -> Self {
        Self {
            window: 10,
            min_samples: 5,
            block_below: 0.10,
            probation_below: 0.30,
            maintenance_interval: TimeDelta::days(28),
            trial_fraction: 0.20,
            trial_attempts: 3,
            trial_successes_required: 2,
        }
    }
}

/// Outcome history of one content domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceProfile {
    pub domain: String,
    pub outcomes: VecDeque<Outcome>,
    pub total_attempts: u64,
    pub total_successes: u64,
    #[serde(default)]
    pub last_attempt: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_success: Option<DateTime<Utc>>,
    #[serde(default)]
    pub blocked_since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub trial_remaining: Option<u32>,
}

impl SourceProfile {
    fn new(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            outcomes: VecDeque::new(),
            total_attempts: 0,
            total_successes: 0,
            last_attempt: None,
            last_success: None,
            blocked_since: None,
            trial_remaining: None,
        }
    }

    fn push(&mut self, outcome: Outcome, window: usize) {
        self.outcomes.push_back(outcome);
        while self.outcomes.len() > window {
            self.outcomes.pop_front();
        }
    }

    /// Lifetime success rate, `0.0` before the first attempt.
    pub fn lifetime_success_rate(&self) -> f64 {
        if self.total_attempts == 0 {
            return 0.0;
        }
        self.total_successes as f64 / self.total_attempts as f64
    }
}

/// Status as a pure function of the trailing outcome window.
pub fn compute_status<'a, I>(outcomes: I, config: &SourceTrackerConfig) -> SourceStatus
where
    I: IntoIterator<Item = &'a Outcome>,
{
    let (total, successes) = outcomes
        .into_iter()
        .fold((0usize, 0usize), |(t, s), o| (t + 1, s + usize::from(o.is_success())));
    if total < config.min_samples {
        return SourceStatus::Active;
    }
    let rate = successes as f64 / total as f64;
    if rate < config.block_below {
        SourceStatus::Blocked
    } else if rate < config.probation_below {
        SourceStatus::Probation
    } else {
        SourceStatus::Active
    }
}

/// Read-only view of one domain for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub domain: String,
    pub status: SourceStatus,
    pub window_success_rate: Option<f64>,
    pub total_attempts: u64,
    pub total_successes: u64,
    pub trial_remaining: Option<u32>,
    pub blocked_since: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LedgerDocument {
    version: u32,
    #[serde(default)]
    last_maintenance: Option<DateTime<Utc>>,
    #[serde(default)]
    domains: BTreeMap<String, SourceProfile>,
}

#[derive(Debug, Default)]
struct TrackerInner {
    profiles: HashMap<String, SourceProfile>,
    last_maintenance: Option<DateTime<Utc>>,
    dirty: bool,
}

/// Thread-safe reliability ledger keyed by content domain.
///
/// Mutations are serialised by an internal mutex, so the ring buffer and
/// counters stay consistent even with concurrent writers in one process.
/// Separate processes sharing one ledger file are not coordinated: the last
/// `save` wins.
#[derive(Clone)]
pub struct SourceTracker {
    config: SourceTrackerConfig,
    path: Option<PathBuf>,
    inner: Arc<Mutex<TrackerInner>>,
}

impl SourceTracker {
    /// Ledger that is never written to disk.
    pub fn in_memory(config: SourceTrackerConfig) -> Self {
        Self {
            config,
            path: None,
            inner: Arc::new(Mutex::new(TrackerInner::default())),
        }
    }

    /// Load the ledger document at `path`.
    ///
    /// A missing, unreadable, corrupt or foreign-version document yields an
    /// empty ledger; the failure is logged and never returned.
    pub fn open(path: impl Into<PathBuf>, config: SourceTrackerConfig) -> Self {
        let path = path.into();
        let mut inner = TrackerInner::default();

        match read_document::<LedgerDocument>(&path) {
            Ok(Some(doc)) if doc.version == LEDGER_VERSION => {
                inner.last_maintenance = doc.last_maintenance;
                for (domain, mut profile) in doc.domains {
                    while profile.outcomes.len() > config.window {
                        profile.outcomes.pop_front();
                    }
                    inner.profiles.insert(domain, profile);
                }
                tracing::debug!(
                    path = %path.display(),
                    domains = inner.profiles.len(),
                    "Loaded source ledger"
                );
            }
            Ok(Some(doc)) => {
                tracing::warn!(
                    path = %path.display(),
                    version = doc.version,
                    "Unsupported source ledger version, starting fresh"
                );
            }
            Ok(None) => {
                tracing::debug!(path = %path.display(), "No source ledger yet, starting fresh");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Source ledger unreadable, starting fresh");
            }
        }

        Self {
            config,
            path: Some(path),
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn config(&self) -> &SourceTrackerConfig {
        &self.config
    }

    /// Acquires the inner mutex lock, recovering from poison if necessary.
    fn lock_inner(&self) -> std::sync::MutexGuard<'_, TrackerInner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned source ledger mutex");
            poisoned.into_inner()
        })
    }

    fn key(domain: &str) -> String {
        domain.trim().to_lowercase()
    }

    /// Record one outcome for `domain` and return its resulting status.
    pub fn record(&self, domain: &str, outcome: Outcome) -> SourceStatus {
        self.record_at(domain, outcome, Utc::now())
    }

    pub fn record_at(&self, domain: &str, outcome: Outcome, now: DateTime<Utc>) -> SourceStatus {
        let key = Self::key(domain);
        let config = &self.config;
        let mut inner = self.lock_inner();
        inner.dirty = true;

        let profile = inner
            .profiles
            .entry(key.clone())
            .or_insert_with(|| SourceProfile::new(&key));
        let before = compute_status(&profile.outcomes, config);

        profile.push(outcome, config.window);
        profile.total_attempts += 1;
        profile.last_attempt = Some(now);
        if outcome.is_success() {
            profile.total_successes += 1;
            profile.last_success = Some(now);
        }

        if let Some(remaining) = profile.trial_remaining {
            let remaining = remaining.saturating_sub(1);
            if remaining == 0 {
                Self::evaluate_trial(profile, now, config);
            } else {
                profile.trial_remaining = Some(remaining);
            }
        }

        let after = compute_status(&profile.outcomes, config);
        if profile.trial_remaining.is_none() {
            match (after, profile.blocked_since) {
                (SourceStatus::Blocked, None) => {
                    profile.blocked_since = Some(now);
                    tracing::warn!(domain = %key, %outcome, "Source blocked");
                }
                (SourceStatus::Active | SourceStatus::Probation, Some(_)) => {
                    profile.blocked_since = None;
                    tracing::info!(domain = %key, status = %after, "Source left blocked status");
                }
                _ => {}
            }
        }
        if before != after {
            tracing::debug!(domain = %key, from = %before, to = %after, "Source status changed");
        }
        after
    }

    /// Close out an exhausted trial.
    ///
    /// Passing keeps the trial sample as the domain's history; with three
    /// outcomes that is below the minimum sample, so the domain reads as
    /// `Active` until fresh evidence accumulates. Failing replaces the
    /// history with synthetic failures so the block is visible to
    /// [`compute_status`] again.
    fn evaluate_trial(profile: &mut SourceProfile, now: DateTime<Utc>, config: &SourceTrackerConfig) {
        profile.trial_remaining = None;
        let sample = config.trial_attempts as usize;
        let recent: Vec<Outcome> = profile.outcomes.iter().rev().take(sample).copied().collect();
        let successes = recent.iter().filter(|o| o.is_success()).count();

        if successes >= config.trial_successes_required {
            profile.blocked_since = None;
            tracing::info!(
                domain = %profile.domain,
                successes,
                "Source passed recovery trial"
            );
        } else {
            let filler = recent
                .iter()
                .find(|o| !o.is_success())
                .copied()
                .unwrap_or(Outcome::Timeout);
            profile.outcomes.clear();
            for _ in 0..config.window {
                profile.outcomes.push_back(filler);
            }
            profile.blocked_since = Some(now);
            tracing::warn!(
                domain = %profile.domain,
                successes,
                "Source failed recovery trial, re-blocked"
            );
        }
    }

    pub fn status(&self, domain: &str) -> SourceStatus {
        let inner = self.lock_inner();
        inner
            .profiles
            .get(&Self::key(domain))
            .map(|p| compute_status(&p.outcomes, &self.config))
            .unwrap_or(SourceStatus::Active)
    }

    /// Score adjustment: active 0, probation -1, blocked -5.
    pub fn score_penalty(&self, domain: &str) -> i32 {
        match self.status(domain) {
            SourceStatus::Active => 0,
            SourceStatus::Probation => -1,
            SourceStatus::Blocked => -5,
        }
    }

    /// True iff the domain is blocked and extraction should not be attempted.
    pub fn should_skip(&self, domain: &str) -> bool {
        self.status(domain) == SourceStatus::Blocked
    }

    pub fn profile(&self, domain: &str) -> Option<SourceProfile> {
        self.lock_inner().profiles.get(&Self::key(domain)).cloned()
    }

    pub fn last_maintenance(&self) -> Option<DateTime<Utc>> {
        self.lock_inner().last_maintenance
    }

    /// Seed domains that are known to fail with a full window of synthetic
    /// failures. Domains already in the ledger are left untouched.
    pub fn seed_known_bad(&self, entries: &[(&str, Outcome)]) -> usize {
        self.seed_known_bad_at(entries, Utc::now())
    }

    pub fn seed_known_bad_at(&self, entries: &[(&str, Outcome)], now: DateTime<Utc>) -> usize {
        let mut inner = self.lock_inner();
        let mut seeded = 0;
        for (domain, outcome) in entries {
            let key = Self::key(domain);
            if inner.profiles.contains_key(&key) {
                continue;
            }
            let mut profile = SourceProfile::new(&key);
            for _ in 0..self.config.window {
                profile.push(*outcome, self.config.window);
            }
            profile.total_attempts = self.config.window as u64;
            profile.blocked_since = Some(now);
            inner.profiles.insert(key, profile);
            seeded += 1;
        }
        if seeded > 0 {
            inner.dirty = true;
            tracing::debug!(seeded, "Seeded known-bad sources");
        }
        seeded
    }

    /// Start recovery trials if the maintenance interval has elapsed.
    /// Returns the number of trials started.
    ///
    /// A ledger that has never been maintained starts its first interval
    /// here, so freshly blocked or seeded domains serve a full interval
    /// before any of them is trialled.
    pub fn run_maintenance(&self) -> usize {
        self.run_maintenance_at(Utc::now())
    }

    pub fn run_maintenance_at(&self, now: DateTime<Utc>) -> usize {
        let config = &self.config;
        let mut inner = self.lock_inner();

        let Some(last) = inner.last_maintenance else {
            inner.last_maintenance = Some(now);
            inner.dirty = true;
            tracing::debug!(%now, "Source maintenance interval started");
            return 0;
        };
        if now - last < config.maintenance_interval {
            tracing::debug!(%last, "Source maintenance not due");
            return 0;
        }

        let mut blocked: Vec<(Option<DateTime<Utc>>, String)> = inner
            .profiles
            .values()
            .filter(|p| {
                p.trial_remaining.is_none()
                    && compute_status(&p.outcomes, config) == SourceStatus::Blocked
            })
            .map(|p| (p.blocked_since, p.domain.clone()))
            .collect();
        // Longest-blocked first; a missing stamp sorts as oldest.
        blocked.sort();

        let quota = if blocked.is_empty() {
            0
        } else {
            ((blocked.len() as f64 * config.trial_fraction).ceil() as usize).max(1)
        };

        for (_, domain) in blocked.iter().take(quota) {
            if let Some(profile) = inner.profiles.get_mut(domain) {
                profile.outcomes.clear();
                profile.trial_remaining = Some(config.trial_attempts);
                tracing::info!(
                    domain = %domain,
                    attempts = config.trial_attempts,
                    "Source placed on recovery trial"
                );
            }
        }

        inner.last_maintenance = Some(now);
        inner.dirty = true;
        tracing::info!(blocked = blocked.len(), trials = quota, "Source maintenance complete");
        quota
    }

    /// Per-domain report, sorted by domain.
    pub fn snapshot(&self) -> Vec<SourceReport> {
        let inner = self.lock_inner();
        let mut reports: Vec<SourceReport> = inner
            .profiles
            .values()
            .map(|p| {
                let window_success_rate = if p.outcomes.is_empty() {
                    None
                } else {
                    let successes = p.outcomes.iter().filter(|o| o.is_success()).count();
                    Some(successes as f64 / p.outcomes.len() as f64)
                };
                SourceReport {
                    domain: p.domain.clone(),
                    status: compute_status(&p.outcomes, &self.config),
                    window_success_rate,
                    total_attempts: p.total_attempts,
                    total_successes: p.total_successes,
                    trial_remaining: p.trial_remaining,
                    blocked_since: p.blocked_since,
                }
            })
            .collect();
        reports.sort_by(|a, b| a.domain.cmp(&b.domain));
        reports
    }

    pub fn len(&self) -> usize {
        self.lock_inner().profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_dirty(&self) -> bool {
        self.lock_inner().dirty
    }

    /// Flush to disk if anything changed since the last save.
    pub fn save(&self) -> Result<(), AppError> {
        let mut inner = self.lock_inner();
        if !inner.dirty {
            return Ok(());
        }
        let Some(path) = &self.path else {
            inner.dirty = false;
            return Ok(());
        };

        let doc = LedgerDocument {
            version: LEDGER_VERSION,
            last_maintenance: inner.last_maintenance,
            domains: inner
                .profiles
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };
        write_document(path, &doc)?;
        inner.dirty = false;
        tracing::debug!(path = %path.display(), domains = doc.domains.len(), "Saved source ledger");
        Ok(())
    }
}
