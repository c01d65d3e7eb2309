// One upgrade attempt for one artifact.
//
// The body is streamed into a temporary file next to the target and only
// renamed over it once the acceptance rule holds. Every other path drops
// the temporary file, leaving the local file byte-for-byte unchanged.

use std::io::Write;
use std::path::Path;

use super::artifact::{read_dimensions, MediaArtifact, MediaCandidate, Measure};
use super::source::{DownloadError, MediaSource};
use super::verify::{judge, percent_change, Basis, Verdict};

/// Per-artifact state across a run. `Failed` goes back into the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactState {
    Pending,
    VerifiedBetter,
    VerifiedNotBetter,
    /// Dimensions readable on one side only. Terminal for this run.
    Inconclusive,
    Failed,
}

impl ArtifactState {
    pub fn is_verified(self) -> bool {
        matches!(self, ArtifactState::VerifiedBetter | ArtifactState::VerifiedNotBetter)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactState::Pending => "pending",
            ArtifactState::VerifiedBetter => "verified-better",
            ArtifactState::VerifiedNotBetter => "verified-not-better",
            ArtifactState::Inconclusive => "inconclusive",
            ArtifactState::Failed => "failed",
        }
    }
}

#[derive(Debug)]
pub struct AttemptReport {
    pub state: ArtifactState,
    /// Body bytes read from the network.
    pub downloaded: u64,
    pub basis: Option<Basis>,
    pub before: Option<Measure>,
    pub after: Option<Measure>,
    pub error: Option<DownloadError>,
}

impl AttemptReport {
    fn failed(before: Option<Measure>, downloaded: u64, error: DownloadError) -> Self {
        Self {
            state: ArtifactState::Failed,
            downloaded,
            basis: None,
            before,
            after: None,
            error: Some(error),
        }
    }

    pub fn byte_change(&self) -> Option<f64> {
        percent_change(self.before?.bytes, self.after?.bytes)
    }

    pub fn area_change(&self) -> Option<f64> {
        let before = self.before?.dimensions?.area();
        let after = self.after?.dimensions?.area();
        percent_change(before, after)
    }
}

pub async fn attempt(source: &dyn MediaSource, candidate: &MediaCandidate) -> AttemptReport {
    let artifact = match MediaArtifact::inspect(candidate) {
        Ok(artifact) => artifact,
        Err(e) => return AttemptReport::failed(None, 0, DownloadError::local(&candidate.path, e)),
    };
    let before = artifact.local;

    let mut response = match source.open(&artifact.url).await {
        Ok(response) => response,
        Err(e) => return AttemptReport::failed(before, 0, e),
    };

    let reported = response.content_length();
    if let (Some(reported), Some(local)) = (reported, artifact.byte_size()) {
        if reported == local {
            return AttemptReport {
                state: ArtifactState::VerifiedNotBetter,
                downloaded: 0,
                basis: Some(Basis::ByteSize),
                before,
                after: before,
                error: None,
            };
        }
    }

    let dir = match artifact.path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => Path::new(".").to_path_buf(),
    };
    if let Err(e) = std::fs::create_dir_all(&dir) {
        return AttemptReport::failed(before, 0, DownloadError::local(&dir, e));
    }
    let mut temp = match tempfile::Builder::new()
        .prefix(".tweetvault-")
        .suffix(".part")
        .tempfile_in(&dir)
    {
        Ok(temp) => temp,
        Err(e) => return AttemptReport::failed(before, 0, DownloadError::local(&dir, e)),
    };

    let mut received = 0u64;
    loop {
        match response.next_chunk().await {
            Ok(Some(chunk)) => {
                if let Err(e) = temp.as_file_mut().write_all(&chunk) {
                    return AttemptReport::failed(before, received, DownloadError::local(temp.path(), e));
                }
                received += chunk.len() as u64;
            }
            Ok(None) => break,
            Err(e) => return AttemptReport::failed(before, received, e),
        }
    }
    if let Some(expected) = reported {
        if expected != received {
            return AttemptReport::failed(
                before,
                received,
                DownloadError::Truncated { expected, received },
            );
        }
    }
    if let Err(e) = temp.as_file_mut().flush() {
        return AttemptReport::failed(before, received, DownloadError::local(temp.path(), e));
    }

    let after = Measure {
        bytes: received,
        dimensions: read_dimensions(temp.path()),
    };

    let (state, basis) = match judge(before.as_ref(), &after) {
        Verdict::Accept(basis) => {
            // The replacement takes over the mode of the file it replaces.
            if before.is_some() {
                let copied = std::fs::metadata(&artifact.path)
                    .and_then(|meta| temp.as_file().set_permissions(meta.permissions()));
                if let Err(e) = copied {
                    return AttemptReport::failed(before, received, DownloadError::local(&artifact.path, e));
                }
            }
            if let Err(e) = temp.persist(&artifact.path) {
                return AttemptReport::failed(before, received, DownloadError::local(&artifact.path, e.error));
            }
            (ArtifactState::VerifiedBetter, Some(basis))
        }
        Verdict::Reject(basis) => (ArtifactState::VerifiedNotBetter, Some(basis)),
        Verdict::Inconclusive => (ArtifactState::Inconclusive, None),
    };

    AttemptReport {
        state,
        downloaded: received,
        basis,
        before,
        after: Some(after),
        error: None,
    }
}
