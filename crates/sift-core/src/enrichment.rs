//! Parallel enrichment executor.
//!
//! One task per candidate, all candidates concurrently. Inside a task the
//! candidate's hooks run one after another in priority order; the first
//! verified result wins. A hook that errors or exceeds the context timeout
//! counts as a failure and the task moves on. Candidates are never dropped:
//! one with no verified hook comes back unverified.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::Serialize;
use uuid::Uuid;

use crate::models::{Candidate, EnrichmentContext, EnrichmentData};
use crate::traits::EnrichmentHook;

/// Events emitted by the executor for monitoring/logging.
#[derive(Debug, Clone)]
pub enum ExecutorEvent<'a> {
    Started {
        request_id: Uuid,
        candidates: usize,
        hooks: usize,
    },
    HookFailed {
        hook: &'a str,
        candidate_id: &'a str,
        error: &'a str,
    },
    HookTimedOut {
        hook: &'a str,
        candidate_id: &'a str,
        timeout: Duration,
    },
    CandidateUnverified {
        candidate_id: &'a str,
    },
    TaskPanicked {
        candidate_id: &'a str,
    },
    Completed {
        request_id: Uuid,
        stats: &'a ExecutionStats,
    },
}

/// Trait for receiving executor events (decoupled logging).
pub trait ExecutorReporter: Send + Sync {
    fn report(&self, event: ExecutorEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingExecutorReporter;

impl ExecutorReporter for TracingExecutorReporter {
    fn report(&self, event: ExecutorEvent<'_>) {
        match event {
            ExecutorEvent::Started {
                request_id,
                candidates,
                hooks,
            } => {
                tracing::debug!(%request_id, candidates, hooks, "Enrichment started");
            }
            ExecutorEvent::HookFailed {
                hook,
                candidate_id,
                error,
            } => {
                tracing::warn!(%hook, %candidate_id, %error, "Hook failed");
            }
            ExecutorEvent::HookTimedOut {
                hook,
                candidate_id,
                timeout,
            } => {
                tracing::warn!(%hook, %candidate_id, timeout_ms = timeout.as_millis() as u64, "Hook timed out");
            }
            ExecutorEvent::CandidateUnverified { candidate_id } => {
                tracing::debug!(%candidate_id, "No hook verified candidate");
            }
            ExecutorEvent::TaskPanicked { candidate_id } => {
                tracing::error!(%candidate_id, "Enrichment task panicked");
            }
            ExecutorEvent::Completed { request_id, stats } => {
                tracing::info!(
                    %request_id,
                    total = stats.total,
                    verified = stats.verified,
                    unverified = stats.unverified,
                    duration_ms = stats.duration_ms,
                    "Enrichment complete"
                );
            }
        }
    }
}

/// Aggregate numbers for one `execute` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionStats {
    pub total: usize,
    pub verified: usize,
    pub unverified: usize,
    pub duration_ms: u64,
    /// success / (success + failure) per hook name.
    pub hook_success_rates: BTreeMap<String, f64>,
}

#[derive(Debug, Clone)]
pub struct EnrichmentOutcome {
    /// Same order as the input.
    pub enriched: Vec<Candidate>,
    pub stats: ExecutionStats,
}

#[derive(Debug, Clone)]
enum AttemptResult {
    Verified,
    Unverified,
    Empty,
    Failed(String),
    TimedOut,
}

impl AttemptResult {
    fn is_success(&self) -> bool {
        !matches!(self, AttemptResult::Failed(_) | AttemptResult::TimedOut)
    }
}

#[derive(Debug, Clone)]
struct HookAttempt {
    hook: String,
    result: AttemptResult,
}

/// Runs registered hooks over candidate lists.
pub struct EnrichmentExecutor<R: ExecutorReporter = TracingExecutorReporter> {
    hooks: Vec<Arc<dyn EnrichmentHook>>,
    reporter: R,
}

impl EnrichmentExecutor<TracingExecutorReporter> {
    pub fn new() -> Self {
        Self::with_reporter(TracingExecutorReporter)
    }
}

impl Default for EnrichmentExecutor<TracingExecutorReporter> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: ExecutorReporter> EnrichmentExecutor<R> {
    pub fn with_reporter(reporter: R) -> Self {
        Self {
            hooks: Vec::new(),
            reporter,
        }
    }

    pub fn register(&mut self, hook: Arc<dyn EnrichmentHook>) -> &mut Self {
        self.hooks.push(hook);
        self
    }

    pub fn with_hook(mut self, hook: Arc<dyn EnrichmentHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Hooks for a search domain, highest priority first. Equal priorities
    /// keep registration order.
    pub fn hooks_for(&self, domain: &str) -> Vec<Arc<dyn EnrichmentHook>> {
        let mut hooks: Vec<_> = self
            .hooks
            .iter()
            .filter(|h| h.domains().iter().any(|d| d == domain))
            .cloned()
            .collect();
        hooks.sort_by_key(|h| std::cmp::Reverse(h.priority()));
        hooks
    }

    /// Run every registered hook's health check concurrently.
    pub async fn health(&self) -> Vec<(String, bool)> {
        join_all(self.hooks.iter().map(|h| async move {
            (h.name().to_string(), h.health_check().await)
        }))
        .await
    }

    pub async fn execute(
        &self,
        candidates: Vec<Candidate>,
        context: &EnrichmentContext,
    ) -> EnrichmentOutcome {
        let started = Instant::now();
        self.reporter.report(ExecutorEvent::Started {
            request_id: context.request_id,
            candidates: candidates.len(),
            hooks: self.hooks.len(),
        });

        let ctx = Arc::new(context.clone());
        let handles: Vec<_> = candidates
            .iter()
            .cloned()
            .map(|candidate| {
                let hooks = self.hooks_for(&candidate.domain);
                let ctx = Arc::clone(&ctx);
                tokio::spawn(enrich_candidate(candidate, hooks, ctx))
            })
            .collect();
        let joined = join_all(handles).await;

        let mut enriched = Vec::with_capacity(candidates.len());
        let mut tallies: BTreeMap<String, (u32, u32)> = BTreeMap::new();
        for (original, joined) in candidates.into_iter().zip(joined) {
            match joined {
                Ok((candidate, attempts)) => {
                    for attempt in &attempts {
                        let tally = tallies.entry(attempt.hook.clone()).or_default();
                        if attempt.result.is_success() {
                            tally.0 += 1;
                        } else {
                            tally.1 += 1;
                        }
                        match &attempt.result {
                            AttemptResult::Failed(error) => {
                                self.reporter.report(ExecutorEvent::HookFailed {
                                    hook: &attempt.hook,
                                    candidate_id: &candidate.id,
                                    error,
                                });
                            }
                            AttemptResult::TimedOut => {
                                self.reporter.report(ExecutorEvent::HookTimedOut {
                                    hook: &attempt.hook,
                                    candidate_id: &candidate.id,
                                    timeout: ctx.timeout,
                                });
                            }
                            _ => {}
                        }
                    }
                    if !candidate.verified {
                        self.reporter.report(ExecutorEvent::CandidateUnverified {
                            candidate_id: &candidate.id,
                        });
                    }
                    enriched.push(candidate);
                }
                Err(_) => {
                    self.reporter.report(ExecutorEvent::TaskPanicked {
                        candidate_id: &original.id,
                    });
                    let mut candidate = original;
                    candidate.verified = false;
                    enriched.push(candidate);
                }
            }
        }

        let verified = enriched.iter().filter(|c| c.verified).count();
        let stats = ExecutionStats {
            total: enriched.len(),
            verified,
            unverified: enriched.len() - verified,
            duration_ms: started.elapsed().as_millis() as u64,
            hook_success_rates: tallies
                .into_iter()
                .map(|(hook, (ok, failed))| (hook, f64::from(ok) / f64::from(ok + failed)))
                .collect(),
        };
        self.reporter.report(ExecutorEvent::Completed {
            request_id: context.request_id,
            stats: &stats,
        });

        EnrichmentOutcome { enriched, stats }
    }
}

async fn enrich_candidate(
    mut candidate: Candidate,
    hooks: Vec<Arc<dyn EnrichmentHook>>,
    ctx: Arc<EnrichmentContext>,
) -> (Candidate, Vec<HookAttempt>) {
    let mut attempts = Vec::with_capacity(hooks.len());
    let mut fallback: Option<EnrichmentData> = None;

    for hook in &hooks {
        let result = tokio::time::timeout(ctx.timeout, hook.enrich(&candidate, &ctx)).await;
        let outcome = match result {
            Ok(Ok(Some(data))) if data.verified => {
                candidate.verified = true;
                candidate.enrichment = Some(data);
                AttemptResult::Verified
            }
            Ok(Ok(Some(data))) => {
                fallback.get_or_insert(data);
                AttemptResult::Unverified
            }
            Ok(Ok(None)) => AttemptResult::Empty,
            Ok(Err(e)) => AttemptResult::Failed(e.to_string()),
            Err(_) => AttemptResult::TimedOut,
        };
        let done = matches!(outcome, AttemptResult::Verified);
        attempts.push(HookAttempt {
            hook: hook.name().to_string(),
            result: outcome,
        });
        if done {
            return (candidate, attempts);
        }
    }

    if candidate.enrichment.is_none() {
        candidate.enrichment = fallback;
    }
    (candidate, attempts)
}
