// Remote fetch client: batched lookup with guest-token refresh on 429.
//
// Every returned record is merged into the store as soon as its batch
// arrives, so an interruption loses at most the in-flight batch. Any
// non-429 failure stops the loop and hands back the unfetched remainder.

use std::collections::BTreeSet;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use tweetvault_common::{FetchConfig, Provenance, Value};
use twitter_lookup::{identity_of, LookupError, LookupKind, TwitterClient};

use crate::references::FetchPlan;
use crate::store::RecordStore;

/// The remote lookup API, as seen by the fetch loop.
#[async_trait]
pub trait LookupApi: Send + Sync {
    /// Acquire a fresh anonymous session token.
    async fn open_session(&self) -> Result<String, LookupError>;

    /// Look up one batch of identities.
    async fn lookup(
        &self,
        kind: LookupKind,
        ids: &[String],
        session: &str,
    ) -> Result<Vec<serde_json::Value>, LookupError>;
}

#[async_trait]
impl LookupApi for TwitterClient {
    async fn open_session(&self) -> Result<String, LookupError> {
        self.activate_guest_token().await
    }

    async fn lookup(
        &self,
        kind: LookupKind,
        ids: &[String],
        session: &str,
    ) -> Result<Vec<serde_json::Value>, LookupError> {
        TwitterClient::lookup(self, kind, ids, session).await
    }
}

/// Why a fetch loop stopped before the last batch.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("fetch stopped at batch {batch}: {reason}")]
pub struct FetchBatchFailure {
    /// Zero-based index of the batch that failed.
    pub batch: usize,
    pub reason: String,
    /// HTTP status when the remote answered with one.
    pub status: Option<u16>,
}

/// Partial-success result of a fetch loop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchReport {
    /// Identities returned by the remote and merged into the store.
    pub fetched: Vec<String>,
    /// Identities requested in completed batches but absent from the response.
    pub missing: Vec<String>,
    /// Identities never answered; retry them in a later round.
    pub remaining: Vec<String>,
    pub merge_conflicts: usize,
    pub token_refreshes: u32,
    pub failure: Option<FetchBatchFailure>,
}

impl FetchReport {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none() && self.remaining.is_empty()
    }
}

pub struct RemoteFetcher<A> {
    api: A,
    config: FetchConfig,
}

impl<A: LookupApi> RemoteFetcher<A> {
    pub fn new(api: A, config: FetchConfig) -> Self {
        Self { api, config }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Fetch every target in `plan` as tweets. Fetched records gain
    /// `from_api` plus the reasons they were requested for; once a batch is
    /// answered, each requesting record is marked complete for its reason.
    pub async fn fetch_plan(&self, store: &mut RecordStore, plan: &FetchPlan) -> FetchReport {
        let ids = plan.identities();
        self.fetch_batches(
            LookupKind::Tweets,
            &ids,
            store,
            |id| {
                let reasons = plan
                    .request(id)
                    .map(|r| r.reasons.clone())
                    .unwrap_or_default();
                Provenance::api().with_satisfied(reasons)
            },
            |store, batch| {
                for id in batch {
                    let Some(request) = plan.request(id) else { continue };
                    for requester in &request.requested_by {
                        store.mark(
                            &requester.record_id,
                            &Provenance::default().with_satisfied([requester.reason]),
                        );
                    }
                }
            },
        )
        .await
    }

    /// Fetch user accounts not already present in `users`.
    pub async fn fetch_users(&self, users: &mut RecordStore, ids: &[String]) -> FetchReport {
        let unknown: Vec<String> = ids
            .iter()
            .filter(|id| !users.contains(id))
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if unknown.is_empty() {
            debug!("All users already known, skipping lookup");
            return FetchReport::default();
        }
        self.fetch_batches(LookupKind::Users, &unknown, users, |_| Provenance::api(), |_, _| {})
            .await
    }

    async fn fetch_batches<P, D>(
        &self,
        kind: LookupKind,
        ids: &[String],
        store: &mut RecordStore,
        provenance_for: P,
        mut on_batch_answered: D,
    ) -> FetchReport
    where
        P: Fn(&str) -> Provenance,
        D: FnMut(&mut RecordStore, &[String]),
    {
        let mut report = FetchReport::default();
        let batch_size = self.config.batch_size.clamp(1, 100);
        let batches: Vec<&[String]> = ids.chunks(batch_size).collect();
        let total = batches.len();

        let mut session: Option<String> = None;
        let mut refreshes_this_batch = 0u32;
        let mut index = 0usize;

        while index < total {
            let batch = batches[index];

            let token = match session.clone() {
                Some(token) => token,
                None => match self.api.open_session().await {
                    Ok(token) => {
                        session = Some(token.clone());
                        token
                    }
                    Err(e) if e.is_rate_limited() && refreshes_this_batch < self.config.max_token_refreshes => {
                        refreshes_this_batch += 1;
                        report.token_refreshes += 1;
                        warn!(%kind, batch = index, "Session activation rate limited, retrying");
                        continue;
                    }
                    Err(e) => {
                        warn!(%kind, batch = index, error = %e, "Could not open lookup session");
                        report.failure = Some(failure(index, &e));
                        break;
                    }
                },
            };

            match self.api.lookup(kind, batch, &token).await {
                Ok(items) => {
                    let mut returned = BTreeSet::new();
                    for item in items {
                        let Some(id) = identity_of(&item) else {
                            debug!(%kind, "Lookup returned an item without identity, skipping");
                            continue;
                        };
                        let outcome = store.merge(&id, Value::from(item), &provenance_for(&id));
                        report.merge_conflicts += outcome.conflicts.len();
                        returned.insert(id.clone());
                        report.fetched.push(id);
                    }
                    report.missing.extend(
                        batch.iter().filter(|id| !returned.contains(*id)).cloned(),
                    );
                    on_batch_answered(store, batch);
                    info!(
                        %kind,
                        batch = index + 1,
                        of = total,
                        returned = returned.len(),
                        requested = batch.len(),
                        "Lookup batch merged"
                    );
                    refreshes_this_batch = 0;
                    index += 1;
                }
                Err(e) if e.is_rate_limited() => {
                    if refreshes_this_batch >= self.config.max_token_refreshes {
                        warn!(%kind, batch = index, "Rate limited with no token refreshes left");
                        report.failure = Some(failure(index, &e));
                        break;
                    }
                    refreshes_this_batch += 1;
                    report.token_refreshes += 1;
                    info!(%kind, batch = index, attempt = refreshes_this_batch, "Rate limited, refreshing guest token");
                    session = None;
                }
                Err(e) => {
                    warn!(%kind, batch = index, error = %e, "Lookup failed, stopping fetch loop");
                    report.failure = Some(failure(index, &e));
                    break;
                }
            }
        }

        report.remaining = batches[index.min(total)..]
            .iter()
            .flat_map(|batch| batch.iter().cloned())
            .collect();
        report
    }
}

fn failure(batch: usize, error: &LookupError) -> FetchBatchFailure {
    let status = match error {
        LookupError::Api { status, .. } => Some(*status),
        LookupError::RateLimited => Some(429),
        _ => None,
    };
    FetchBatchFailure {
        batch,
        reason: error.to_string(),
        status,
    }
}
