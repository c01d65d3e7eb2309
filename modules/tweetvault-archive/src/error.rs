use std::path::PathBuf;

/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Fatal conditions. Per-record and per-artifact problems are reported as
/// values (merge conflicts, fetch failures, download failures) instead.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("No tweet files matching tweet.js, tweets.js or tweets-part*.js in {0}")]
    NoTweetFiles(PathBuf),

    #[error("No media folder (tweet_media or tweets_media) in {0}")]
    NoMediaFolder(PathBuf),

    #[error("Multiple media folders in {0}")]
    AmbiguousMediaFolder(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl ArchiveError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ArchiveError::Io {
            path: path.into(),
            source,
        }
    }
}
