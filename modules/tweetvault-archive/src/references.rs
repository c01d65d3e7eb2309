// Reference collection: scans archive records for gaps that a remote lookup
// can close, and plans which identities to fetch.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use tweetvault_common::{CanonicalRecord, ReferenceReason, Value};

use crate::store::RecordStore;

/// Same-platform tweet permalink; capture 1 is the tweet id.
static PERMALINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(?:www\.|mobile\.)?(?:twitter|x)\.com/(?:[A-Za-z0-9_]+|i/web)/status(?:es)?/(\d+)")
        .expect("valid regex")
});

/// Archived reposts start with `RT @handle:` and are truncated.
static REPOST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^RT @[A-Za-z0-9_]+:?").expect("valid regex"));

/// A record that asked for an identity, and why.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Requester {
    pub record_id: String,
    pub reason: ReferenceReason,
}

/// Everything known about one identity to fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetRequest {
    pub reasons: BTreeSet<ReferenceReason>,
    pub requested_by: BTreeSet<Requester>,
}

/// Output of one collection pass: deduplicated targets plus per-reason
/// match counts for reporting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchPlan {
    pub targets: BTreeMap<String, TargetRequest>,
    pub counts: BTreeMap<ReferenceReason, usize>,
}

impl FetchPlan {
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn identities(&self) -> Vec<String> {
        self.targets.keys().cloned().collect()
    }

    pub fn count(&self, reason: ReferenceReason) -> usize {
        self.counts.get(&reason).copied().unwrap_or(0)
    }

    /// Targets requested for `reason`.
    pub fn identities_for(&self, reason: ReferenceReason) -> Vec<String> {
        self.targets
            .iter()
            .filter(|(_, request)| request.reasons.contains(&reason))
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn request(&self, id: &str) -> Option<&TargetRequest> {
        self.targets.get(id)
    }

    fn add(&mut self, target: String, requester: &str, reason: ReferenceReason) {
        let entry = self.targets.entry(target).or_default();
        entry.reasons.insert(reason);
        entry.requested_by.insert(Requester {
            record_id: requester.to_string(),
            reason,
        });
        *self.counts.entry(reason).or_insert(0) += 1;
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceCollector;

impl ReferenceCollector {
    pub fn new() -> Self {
        Self
    }

    /// Scan every archive-sourced record for unresolved references. Records
    /// already marked complete for a reason are skipped for that reason.
    /// Malformed records contribute nothing.
    pub fn collect(&self, store: &RecordStore) -> FetchPlan {
        let mut plan = FetchPlan::default();

        for record in store.iter().filter(|r| r.provenance.from_archive) {
            if record.data.as_object().is_none() {
                continue;
            }
            let provenance = &record.provenance;

            if !provenance.is_satisfied(ReferenceReason::Quote) {
                for target in quoted_ids(&record.data) {
                    if target != record.id && !store.contains(&target) {
                        plan.add(target, &record.id, ReferenceReason::Quote);
                    }
                }
            }

            if !provenance.is_satisfied(ReferenceReason::ReplyParent) {
                if let Some(parent) = reply_parent_id(&record.data) {
                    if parent != record.id && !store.contains(&parent) {
                        plan.add(parent, &record.id, ReferenceReason::ReplyParent);
                    }
                }
            }

            if !provenance.is_satisfied(ReferenceReason::Retweet) && is_repost(&record.data) {
                plan.add(record.id.clone(), &record.id, ReferenceReason::Retweet);
            }

            if !provenance.is_satisfied(ReferenceReason::MediaEnrichment) && has_media(&record.data) {
                plan.add(record.id.clone(), &record.id, ReferenceReason::MediaEnrichment);
            }
        }

        plan
    }

    /// Identities a record points at directly (quotes and reply parent),
    /// whether or not they are known.
    pub fn direct_references(&self, record: &CanonicalRecord) -> BTreeSet<String> {
        let mut refs: BTreeSet<String> = quoted_ids(&record.data).into_iter().collect();
        refs.extend(reply_parent_id(&record.data));
        refs.remove(&record.id);
        refs
    }

    /// Accounts archive records mention or reply to, for user lookup.
    pub fn user_ids(&self, store: &RecordStore) -> BTreeSet<String> {
        let mut ids = BTreeSet::new();
        for record in store.iter().filter(|r| r.provenance.from_archive) {
            ids.extend(
                ["in_reply_to_user_id_str", "in_reply_to_user_id"]
                    .iter()
                    .filter_map(|key| record.data.get(key))
                    .find_map(Value::to_identity),
            );
            if let Some(mentions) = record
                .data
                .get_path(&["entities", "user_mentions"])
                .and_then(Value::as_list)
            {
                ids.extend(mentions.iter().filter_map(|m| {
                    m.get("id_str").or_else(|| m.get("id")).and_then(Value::to_identity)
                }));
            }
        }
        // Negative ids ("-1") stand in for accounts the export could not resolve.
        ids.retain(|id| !id.starts_with('-'));
        ids
    }
}

/// Tweet ids from permalink URL entities.
fn quoted_ids(data: &Value) -> Vec<String> {
    let Some(urls) = data.get_path(&["entities", "urls"]).and_then(Value::as_list) else {
        return Vec::new();
    };
    urls.iter()
        .filter_map(|url| url.get("expanded_url").and_then(Value::as_str))
        .filter_map(|expanded| {
            PERMALINK_RE
                .captures(expanded)
                .map(|caps| caps[1].to_string())
        })
        .collect()
}

fn reply_parent_id(data: &Value) -> Option<String> {
    ["in_reply_to_status_id_str", "in_reply_to_status_id"]
        .iter()
        .filter_map(|key| data.get(key))
        .find_map(Value::to_identity)
}

fn is_repost(data: &Value) -> bool {
    ["full_text", "text"]
        .iter()
        .filter_map(|key| data.get(key).and_then(Value::as_str))
        .any(|text| REPOST_RE.is_match(text))
}

fn has_media(data: &Value) -> bool {
    [["extended_entities", "media"], ["entities", "media"]]
        .iter()
        .filter_map(|path| data.get_path(path).and_then(Value::as_list))
        .any(|media| !media.is_empty())
}
