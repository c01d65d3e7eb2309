// Fixed-point enrichment: collect -> ask -> fetch, until nothing new turns
// up, the operator declines, or the round limit is hit.

use std::collections::BTreeMap;

use tracing::{info, warn};
use tweetvault_common::ReferenceReason;

use crate::cache::RecordCache;
use crate::consent::Consent;
use crate::error::Result;
use crate::fetch::{FetchReport, LookupApi, RemoteFetcher};
use crate::references::ReferenceCollector;
use crate::store::RecordStore;

/// Why the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichmentStop {
    /// The collector found nothing left to fetch.
    Converged,
    /// The operator declined the next round.
    Declined,
    RoundLimit,
}

#[derive(Debug, Clone)]
pub struct RoundSummary {
    pub round: u32,
    pub requested: usize,
    pub counts: BTreeMap<ReferenceReason, usize>,
    pub report: FetchReport,
}

#[derive(Debug, Clone)]
pub struct EnrichmentSummary {
    pub rounds: Vec<RoundSummary>,
    pub stop: EnrichmentStop,
}

impl EnrichmentSummary {
    pub fn fetched(&self) -> usize {
        self.rounds.iter().map(|r| r.report.fetched.len()).sum()
    }

    pub fn conflicts(&self) -> usize {
        self.rounds.iter().map(|r| r.report.merge_conflicts).sum()
    }
}

pub struct EnrichmentDriver<'a, A> {
    fetcher: &'a RemoteFetcher<A>,
    consent: &'a dyn Consent,
    collector: ReferenceCollector,
    cache: Option<&'a RecordCache>,
    max_rounds: u32,
}

impl<'a, A: LookupApi> EnrichmentDriver<'a, A> {
    pub fn new(fetcher: &'a RemoteFetcher<A>, consent: &'a dyn Consent, max_rounds: u32) -> Self {
        Self {
            fetcher,
            consent,
            collector: ReferenceCollector::new(),
            cache: None,
            max_rounds,
        }
    }

    /// Persist the store to `cache` after every round.
    pub fn with_cache(mut self, cache: &'a RecordCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub async fn run(&self, store: &mut RecordStore) -> Result<EnrichmentSummary> {
        let mut rounds = Vec::new();

        let stop = loop {
            let round = rounds.len() as u32 + 1;
            if round > self.max_rounds {
                warn!(max_rounds = self.max_rounds, "Enrichment round limit reached");
                break EnrichmentStop::RoundLimit;
            }

            let plan = self.collector.collect(store);
            if plan.is_empty() {
                info!(round, "No unresolved references left");
                break EnrichmentStop::Converged;
            }

            for reason in ReferenceReason::ALL {
                let count = plan.count(reason);
                if count > 0 {
                    info!(round, %reason, count, "Unresolved references");
                }
            }

            let prompt = format!("Fetch {} tweets from the API (round {round})?", plan.len());
            if !self.consent.confirm(&prompt) {
                info!(round, "Enrichment declined");
                break EnrichmentStop::Declined;
            }

            let report = self.fetcher.fetch_plan(store, &plan).await;
            if let Some(failure) = &report.failure {
                warn!(
                    round,
                    error = %failure,
                    remaining = report.remaining.len(),
                    "Fetch round stopped early, remainder retried next round"
                );
            }
            info!(
                round,
                fetched = report.fetched.len(),
                missing = report.missing.len(),
                conflicts = report.merge_conflicts,
                "Enrichment round finished"
            );

            if let Some(cache) = self.cache {
                cache.save(store)?;
            }

            rounds.push(RoundSummary {
                round,
                requested: plan.len(),
                counts: plan.counts.clone(),
                report,
            });
        };

        Ok(EnrichmentSummary { rounds, stop })
    }

    /// Look up the accounts archive records mention or reply to. Known
    /// accounts are skipped.
    pub async fn run_users(
        &self,
        tweets: &RecordStore,
        users: &mut RecordStore,
    ) -> Option<FetchReport> {
        let ids: Vec<String> = self
            .collector
            .user_ids(tweets)
            .into_iter()
            .filter(|id| !users.contains(id))
            .collect();
        if ids.is_empty() {
            return None;
        }

        let prompt = format!("Look up {} unknown accounts from the API?", ids.len());
        if !self.consent.confirm(&prompt) {
            info!("User lookup declined");
            return None;
        }

        let report = self.fetcher.fetch_users(users, &ids).await;
        if let Some(failure) = &report.failure {
            warn!(error = %failure, remaining = report.remaining.len(), "User lookup stopped early");
        }
        info!(fetched = report.fetched.len(), missing = report.missing.len(), "User lookup finished");
        Some(report)
    }
}
