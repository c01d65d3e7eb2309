// Durable per-URL download outcomes. A verified entry is never downgraded,
// so a later run can skip the URL without touching the network.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::info;
use tweetvault_common::DownloadOutcome;

use super::upgrade::AttemptReport;
use crate::cache::{load_json_or_default, save_json_pretty};
use crate::error::Result;

pub struct OutcomeStore {
    path: Option<PathBuf>,
    outcomes: BTreeMap<String, DownloadOutcome>,
}

impl OutcomeStore {
    /// A store that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            outcomes: BTreeMap::new(),
        }
    }

    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let outcomes: BTreeMap<String, DownloadOutcome> = load_json_or_default(&path);
        info!(
            path = %path.display(),
            urls = outcomes.len(),
            verified = outcomes.values().filter(|o| o.success).count(),
            "Loaded download outcomes"
        );
        Self {
            path: Some(path),
            outcomes,
        }
    }

    pub fn is_verified(&self, url: &str) -> bool {
        self.outcomes.get(url).is_some_and(|o| o.success)
    }

    pub fn get(&self, url: &str) -> Option<&DownloadOutcome> {
        self.outcomes.get(url)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Record the result of an attempt. Returns `false` when the URL was
    /// already verified and the entry was left alone.
    pub fn record(&mut self, url: &str, local: &Path, report: &AttemptReport) -> bool {
        if self.is_verified(url) {
            return false;
        }
        self.outcomes.insert(
            url.to_string(),
            DownloadOutcome {
                success: report.state.is_verified(),
                downloaded: report.downloaded,
                local: Some(local.display().to_string()),
                verdict: Some(report.state.as_str().to_string()),
                checked_at: Some(Utc::now()),
            },
        );
        true
    }

    /// Write the store back if it has a path.
    pub fn save(&self) -> Result<()> {
        match &self.path {
            Some(path) => save_json_pretty(path, &self.outcomes),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::upgrade::ArtifactState;

    fn report(state: ArtifactState, downloaded: u64) -> AttemptReport {
        AttemptReport {
            state,
            downloaded,
            basis: None,
            before: None,
            after: None,
            error: None,
        }
    }

    #[test]
    fn verified_entries_are_never_downgraded() {
        let mut store = OutcomeStore::in_memory();
        let local = Path::new("media/1-a.jpg");
        assert!(store.record("u", local, &report(ArtifactState::VerifiedBetter, 10)));
        assert!(!store.record("u", local, &report(ArtifactState::Failed, 0)));
        let outcome = store.get("u").unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.downloaded, 10);
    }

    #[test]
    fn failures_and_inconclusive_stay_unverified() {
        let mut store = OutcomeStore::in_memory();
        let local = Path::new("x");
        store.record("a", local, &report(ArtifactState::Failed, 0));
        store.record("b", local, &report(ArtifactState::Inconclusive, 5));
        assert!(!store.is_verified("a"));
        assert!(!store.is_verified("b"));
        assert_eq!(store.get("b").unwrap().verdict.as_deref(), Some("inconclusive"));
    }

    #[test]
    fn persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("media_state.json");
        let mut store = OutcomeStore::load(&path);
        assert!(store.is_empty());
        store.record("u", Path::new("x"), &report(ArtifactState::VerifiedNotBetter, 0));
        store.save().unwrap();

        let reloaded = OutcomeStore::load(&path);
        assert!(reloaded.is_verified("u"));
        assert_eq!(reloaded.len(), 1);
    }
}
