// Archive export discovery and loading.
//
// Export files are JavaScript assignments (`window.YTD.tweets.part0 = [`)
// followed by JSON; the first line is swapped for a bare bracket.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, warn};
use tweetvault_common::{Provenance, Value};

use crate::error::{ArchiveError, Result};
use crate::store::RecordStore;

static TWEET_FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^tweets?(-part\d+)?\.js$").expect("valid regex"));

const MEDIA_FOLDERS: [&str; 2] = ["tweet_media", "tweets_media"];

/// Located input files of one archive export.
#[derive(Debug, Clone)]
pub struct ArchiveInput {
    pub data_dir: PathBuf,
    pub tweet_files: Vec<PathBuf>,
    pub media_dir: PathBuf,
}

impl ArchiveInput {
    /// Find tweet files and the media folder under `<root>/data`, or under
    /// `root` itself when it has no `data` directory.
    pub fn discover(root: &Path) -> Result<Self> {
        let nested = root.join("data");
        let data_dir = if nested.is_dir() { nested } else { root.to_path_buf() };

        let mut tweet_files = Vec::new();
        let mut media_dirs = Vec::new();
        let entries = std::fs::read_dir(&data_dir).map_err(|e| ArchiveError::io(&data_dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| ArchiveError::io(&data_dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let path = entry.path();
            if path.is_file() && TWEET_FILE_RE.is_match(&name) {
                tweet_files.push(path);
            } else if path.is_dir() && MEDIA_FOLDERS.contains(&name.as_str()) {
                media_dirs.push(path);
            }
        }
        tweet_files.sort();

        if tweet_files.is_empty() {
            return Err(ArchiveError::NoTweetFiles(data_dir));
        }
        let media_dir = match media_dirs.len() {
            0 => return Err(ArchiveError::NoMediaFolder(data_dir)),
            1 => media_dirs.remove(0),
            _ => return Err(ArchiveError::AmbiguousMediaFolder(data_dir)),
        };

        info!(
            data_dir = %data_dir.display(),
            tweet_files = tweet_files.len(),
            media_dir = %media_dir.display(),
            "Archive located"
        );
        Ok(Self {
            data_dir,
            tweet_files,
            media_dir,
        })
    }

    /// Merge every archived tweet into `store` as archive-sourced. Returns
    /// the number of entries read.
    pub fn load_into(&self, store: &mut RecordStore) -> Result<usize> {
        let mut loaded = 0;
        let mut conflicts = 0;
        for file in &self.tweet_files {
            let entries = read_js_file(file)?;
            debug!(file = %file.display(), entries = entries.len(), "Read archive part");
            for entry in entries {
                let record = unwrap_entry(entry);
                let Some(id) = store
                    .identity_of(&record)
                    .or_else(|| record.get("id").and_then(Value::to_identity))
                else {
                    warn!(file = %file.display(), "Archive entry without identity, skipping");
                    continue;
                };
                conflicts += store.merge(&id, record, &Provenance::archive()).conflicts.len();
                loaded += 1;
            }
        }
        info!(loaded, records = store.len(), conflicts, "Archive loaded");
        Ok(loaded)
    }
}

/// Parse one export file. A file of one line or fewer is an empty part.
pub fn read_js_file(path: &Path) -> Result<Vec<Value>> {
    let raw = std::fs::read_to_string(path).map_err(|e| ArchiveError::io(path, e))?;
    let json = repair_js(&raw);
    if json.is_empty() {
        return Ok(Vec::new());
    }
    let parsed: serde_json::Value =
        serde_json::from_str(&json).map_err(|source| ArchiveError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(match parsed {
        serde_json::Value::Array(items) => items.into_iter().map(Value::from).collect(),
        other => vec![Value::from(other)],
    })
}

fn repair_js(raw: &str) -> String {
    let mut lines = raw.lines();
    let Some(first) = lines.next() else {
        return String::new();
    };
    let rest: Vec<&str> = lines.collect();
    if rest.is_empty() {
        return String::new();
    }
    let opening = if first.contains('{') { "[ {" } else { "[" };
    let mut json = String::with_capacity(raw.len());
    json.push_str(opening);
    for line in rest {
        json.push('\n');
        json.push_str(line);
    }
    json
}

/// Export entries are wrapped as `{"tweet": {...}}`.
fn unwrap_entry(entry: Value) -> Value {
    match entry {
        Value::Object(mut map) if map.len() == 1 && map.contains_key("tweet") => {
            map.remove("tweet").unwrap_or(Value::Null)
        }
        other => other,
    }
}
