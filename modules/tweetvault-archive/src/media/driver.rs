// Multi-pass media upgrade driver.
//
// Pass n+1 only sees what failed in pass n. The pause between attempts
// starts at `initial_delay` and grows by `delay_growth` after each pass;
// the first attempt of a pass is never delayed.

use std::time::{Duration, Instant};

use tracing::{error, info, warn};
use tweetvault_common::MediaConfig;

use super::artifact::MediaCandidate;
use super::outcomes::OutcomeStore;
use super::source::MediaSource;
use super::upgrade::{attempt, ArtifactState, AttemptReport};
use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassSummary {
    pub pass: u32,
    pub queued: usize,
    /// Already verified by an earlier run; no request made.
    pub skipped: usize,
    pub better: usize,
    pub not_better: usize,
    pub inconclusive: usize,
    pub failed: usize,
    pub delay: Duration,
}

impl PassSummary {
    /// Items known to hold the best available quality after this pass.
    pub fn verified(&self) -> usize {
        self.skipped + self.better + self.not_better
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpgradeSummary {
    pub total: usize,
    pub passes: Vec<PassSummary>,
    /// URLs still failing after the last pass.
    pub failed: Vec<String>,
    pub downloaded: u64,
    pub elapsed: Duration,
}

impl UpgradeSummary {
    pub fn verified(&self) -> usize {
        self.passes.iter().map(PassSummary::verified).sum()
    }

    pub fn upgraded(&self) -> usize {
        self.passes.iter().map(|p| p.better).sum()
    }

    pub fn inconclusive(&self) -> usize {
        self.passes.iter().map(|p| p.inconclusive).sum()
    }
}

pub struct MediaUpgrader<S> {
    source: S,
    config: MediaConfig,
}

impl<S: MediaSource> MediaUpgrader<S> {
    pub fn new(source: S, config: MediaConfig) -> Self {
        Self { source, config }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub async fn run(
        &self,
        candidates: &[MediaCandidate],
        outcomes: &mut OutcomeStore,
    ) -> Result<UpgradeSummary> {
        let started = Instant::now();
        let mut summary = UpgradeSummary {
            total: candidates.len(),
            ..UpgradeSummary::default()
        };
        let mut queue: Vec<&MediaCandidate> = candidates.iter().collect();
        let mut delay = self.config.initial_delay;

        for pass in 1..=self.config.max_passes {
            if queue.is_empty() {
                break;
            }
            info!(pass, queued = queue.len(), delay_ms = delay.as_millis() as u64, "Starting media pass");

            let mut stats = PassSummary {
                pass,
                queued: queue.len(),
                delay,
                ..PassSummary::default()
            };
            let mut failed = Vec::new();
            let pass_started = Instant::now();
            let mut attempted = 0usize;

            for (index, candidate) in queue.iter().enumerate() {
                if outcomes.is_verified(&candidate.url) {
                    stats.skipped += 1;
                    continue;
                }
                if attempted > 0 && !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempted += 1;

                let report = attempt(&self.source, candidate).await;
                summary.downloaded += report.downloaded;
                log_attempt(candidate, &report);

                match report.state {
                    ArtifactState::VerifiedBetter => stats.better += 1,
                    ArtifactState::VerifiedNotBetter => stats.not_better += 1,
                    ArtifactState::Inconclusive => stats.inconclusive += 1,
                    ArtifactState::Failed | ArtifactState::Pending => {
                        stats.failed += 1;
                        failed.push(*candidate);
                    }
                }
                outcomes.record(&candidate.url, &candidate.path, &report);
                outcomes.save()?;

                let done = index + 1;
                let elapsed = pass_started.elapsed();
                let remaining = elapsed.mul_f64((queue.len() - done) as f64 / done as f64);
                info!(
                    pass,
                    progress = %format!("{:.1}%", done as f64 * 100.0 / queue.len() as f64),
                    eta = %format_duration(remaining),
                    "Media progress"
                );
            }

            info!(
                pass,
                "{} of {} tested media files are known to be the best-quality available",
                stats.verified(),
                stats.queued
            );
            summary.passes.push(stats);
            queue = failed;
            delay += self.config.delay_growth;
        }

        summary.failed = queue.iter().map(|c| c.url.clone()).collect();
        summary.elapsed = started.elapsed();
        info!(
            total = summary.total,
            verified = summary.verified(),
            upgraded = summary.upgraded(),
            failed = summary.failed.len(),
            downloaded = %format_bytes(summary.downloaded),
            time_taken = %format_duration(summary.elapsed),
            "Media upgrade finished"
        );
        Ok(summary)
    }
}

fn log_attempt(candidate: &MediaCandidate, report: &AttemptReport) {
    let path = candidate.path.display();
    let deltas = describe_deltas(report);
    match report.state {
        ArtifactState::VerifiedBetter => {
            info!(url = %candidate.url, downloaded = report.downloaded, "SUCCESS {path}{deltas}")
        }
        ArtifactState::VerifiedNotBetter => {
            info!(url = %candidate.url, downloaded = report.downloaded, "SKIPPED {path}: no better version{deltas}")
        }
        ArtifactState::Inconclusive => warn!(
            url = %candidate.url,
            downloaded = report.downloaded,
            "INCONCLUSIVE {path}: dimensions readable on one side only, keeping local file"
        ),
        ArtifactState::Failed | ArtifactState::Pending => {
            let reason = report
                .error
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default();
            error!(url = %candidate.url, "FAIL {path}: {reason}")
        }
    }
}

fn describe_deltas(report: &AttemptReport) -> String {
    let mut parts = Vec::new();
    if let Some(change) = report.byte_change() {
        parts.push(format!("size {change:+.1}%"));
    }
    if let Some(change) = report.area_change() {
        parts.push(format!("pixels {change:+.1}%"));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

/// Bytes as MB, or GB past 1024 MB.
pub fn format_bytes(bytes: u64) -> String {
    let mb = bytes as f64 / (1024.0 * 1024.0);
    if mb >= 1024.0 {
        format!("{:.2} GB", mb / 1024.0)
    } else {
        format!("{mb:.2} MB")
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_sizes() {
        assert_eq!(format_bytes(0), "0.00 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.00 MB");
        assert_eq!(format_bytes(2 * 1024 * 1024 * 1024), "2.00 GB");
    }

    #[test]
    fn formats_durations() {
        assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05");
        assert_eq!(format_duration(Duration::from_millis(900)), "0:00:00");
    }
}
