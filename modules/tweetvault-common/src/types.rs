use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value::Value;

// --- Records ---

/// Why an identity needs to be fetched from the remote API. Also used as the
/// marker that a record has been completed for that gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReferenceReason {
    /// A same-platform permalink to a tweet not yet known.
    Quote,
    /// The tweet this one replies to is not yet known.
    ReplyParent,
    /// A repost whose archived text is truncated.
    Retweet,
    /// Attached media without extended metadata (alt text).
    MediaEnrichment,
}

impl ReferenceReason {
    pub const ALL: [ReferenceReason; 4] = [
        ReferenceReason::Quote,
        ReferenceReason::ReplyParent,
        ReferenceReason::Retweet,
        ReferenceReason::MediaEnrichment,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ReferenceReason::Quote => "quote",
            ReferenceReason::ReplyParent => "reply-parent",
            ReferenceReason::Retweet => "retweet",
            ReferenceReason::MediaEnrichment => "media-enrichment",
        }
    }
}

impl fmt::Display for ReferenceReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a record's data came from and which gaps have been closed.
/// Flags only ever accumulate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    #[serde(default)]
    pub from_archive: bool,
    #[serde(default)]
    pub from_api: bool,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub satisfied: BTreeSet<ReferenceReason>,
}

impl Provenance {
    pub fn archive() -> Self {
        Self {
            from_archive: true,
            ..Self::default()
        }
    }

    pub fn api() -> Self {
        Self {
            from_api: true,
            ..Self::default()
        }
    }

    pub fn with_satisfied(mut self, reasons: impl IntoIterator<Item = ReferenceReason>) -> Self {
        self.satisfied.extend(reasons);
        self
    }

    pub fn is_satisfied(&self, reason: ReferenceReason) -> bool {
        self.satisfied.contains(&reason)
    }

    /// Union `other` into `self`. Returns whether anything was gained.
    pub fn absorb(&mut self, other: &Provenance) -> bool {
        let before = (self.from_archive, self.from_api, self.satisfied.len());
        self.from_archive |= other.from_archive;
        self.from_api |= other.from_api;
        self.satisfied.extend(other.satisfied.iter().copied());
        before != (self.from_archive, self.from_api, self.satisfied.len())
    }
}

/// The merged, deduplicated representation of one archived entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub id: String,
    pub data: Value,
    #[serde(default)]
    pub provenance: Provenance,
}

impl CanonicalRecord {
    pub fn new(id: impl Into<String>, data: Value, provenance: Provenance) -> Self {
        Self {
            id: id.into(),
            data,
            provenance,
        }
    }
}

// --- Media ---

/// Persisted result of comparing one remote URL against its local file.
/// Serialized as `{"success": bool, "downloaded": n, ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadOutcome {
    /// The remote was compared and the local file is now the best known
    /// version. Never flips back to false.
    pub success: bool,
    /// Bytes transferred during the attempt that produced this outcome.
    pub downloaded: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provenance_only_gains() {
        let mut p = Provenance::archive();
        let gained = p.absorb(&Provenance::api().with_satisfied([ReferenceReason::Quote]));
        assert!(gained);
        assert!(p.from_archive && p.from_api);
        assert!(p.is_satisfied(ReferenceReason::Quote));

        // Absorbing an empty provenance never clears anything.
        assert!(!p.absorb(&Provenance::default()));
        assert!(p.from_archive && p.from_api);
        assert!(p.is_satisfied(ReferenceReason::Quote));
    }

    #[test]
    fn reasons_serialize_kebab_case() {
        let json = serde_json::to_string(&ReferenceReason::ReplyParent).unwrap();
        assert_eq!(json, "\"reply-parent\"");
        assert_eq!(ReferenceReason::MediaEnrichment.to_string(), "media-enrichment");
    }

    #[test]
    fn outcome_reads_minimal_cache_entry() {
        let outcome: DownloadOutcome =
            serde_json::from_str(r#"{"success": true, "downloaded": 2048}"#).unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.downloaded, 2048);
        assert!(outcome.local.is_none());
    }
}
