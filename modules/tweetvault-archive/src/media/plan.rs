// Media planning: mirror archived media into the output directory and pair
// each file with the remote URL of its best-quality original.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use tweetvault_common::{MediaConfig, Value};
use url::Url;

use super::artifact::MediaCandidate;
use crate::error::{ArchiveError, Result};
use crate::store::RecordStore;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaPlan {
    pub candidates: Vec<MediaCandidate>,
    /// Files copied from the archive this run.
    pub mirrored: usize,
    /// Media entries with no local file or no usable remote URL.
    pub unmatched: usize,
}

pub struct MediaPlanner<'a> {
    archive_media: &'a Path,
    output_media: &'a Path,
    original_base: &'a str,
}

impl<'a> MediaPlanner<'a> {
    pub fn new(archive_media: &'a Path, output_media: &'a Path, config: &'a MediaConfig) -> Self {
        Self {
            archive_media,
            output_media,
            original_base: config.original_media_base.trim_end_matches('/'),
        }
    }

    pub fn plan(&self, store: &RecordStore) -> Result<MediaPlan> {
        std::fs::create_dir_all(self.output_media)
            .map_err(|e| ArchiveError::io(self.output_media, e))?;
        let archived = self.archived_files()?;

        let mut plan = MediaPlan::default();
        let mut targets: BTreeMap<PathBuf, String> = BTreeMap::new();

        for record in store.iter().filter(|r| r.provenance.from_archive) {
            let Some(media) = record
                .data
                .get_path(&["extended_entities", "media"])
                .and_then(Value::as_list)
            else {
                continue;
            };
            // Files named after one of this record's media items belong to
            // that item, never to a video fallback.
            let claimed: BTreeSet<String> = media
                .iter()
                .filter_map(media_basename)
                .map(|basename| format!("{}-{}", record.id, basename))
                .collect();

            for item in media {
                let Some(basename) = media_basename(item) else {
                    plan.unmatched += 1;
                    continue;
                };
                let file_name = format!("{}-{}", record.id, basename);

                if archived.iter().any(|name| *name == file_name) {
                    let path = self.mirror(&file_name, &mut plan);
                    targets.insert(path, format!("{}/{}:orig", self.original_base, basename));
                    continue;
                }

                // Videos and GIFs are stored under their own name; the media
                // URL only points at the thumbnail.
                let Some(url) = best_variant(item) else {
                    warn!(id = %record.id, media = %basename, "No downloadable variant for media");
                    plan.unmatched += 1;
                    continue;
                };
                let prefix = format!("{}-", record.id);
                let mut found = false;
                let unclaimed: Vec<&String> = archived
                    .iter()
                    .filter(|name| {
                        name.starts_with(&prefix)
                            && !claimed.contains(*name)
                            && !targets.contains_key(&self.output_media.join(name))
                    })
                    .collect();
                for name in unclaimed {
                    let path = self.mirror(name, &mut plan);
                    targets.insert(path, url.clone());
                    found = true;
                }
                if !found {
                    debug!(id = %record.id, media = %basename, "Media file missing from archive");
                    plan.unmatched += 1;
                }
            }
        }

        plan.candidates = targets
            .into_iter()
            .map(|(path, url)| MediaCandidate::new(path, url))
            .collect();
        info!(
            candidates = plan.candidates.len(),
            mirrored = plan.mirrored,
            unmatched = plan.unmatched,
            "Media planned"
        );
        Ok(plan)
    }

    fn archived_files(&self) -> Result<Vec<String>> {
        let entries = std::fs::read_dir(self.archive_media)
            .map_err(|e| ArchiveError::io(self.archive_media, e))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ArchiveError::io(self.archive_media, e))?;
            if entry.path().is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Copy `name` into the output directory unless it is already there.
    /// Copy failures are logged; the target path is returned either way.
    fn mirror(&self, name: &str, plan: &mut MediaPlan) -> PathBuf {
        let target = self.output_media.join(name);
        if !target.exists() {
            match std::fs::copy(self.archive_media.join(name), &target) {
                Ok(_) => plan.mirrored += 1,
                Err(e) => warn!(file = name, error = %e, "Could not mirror archived media"),
            }
        }
        target
    }
}

/// Last path segment of the media URL.
fn media_basename(item: &Value) -> Option<String> {
    let raw = item
        .get("media_url_https")
        .or_else(|| item.get("media_url"))
        .and_then(Value::as_str)?;
    let url = Url::parse(raw).ok()?;
    url.path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()
        .map(str::to_string)
}

/// Highest-bitrate video variant. A bitrate of 0 still counts.
fn best_variant(item: &Value) -> Option<String> {
    let variants = item
        .get_path(&["video_info", "variants"])
        .and_then(Value::as_list)?;
    variants
        .iter()
        .filter_map(|variant| {
            let bitrate = variant.get("bitrate")?.to_number()?.as_f64()?;
            let url = variant.get("url").and_then(Value::as_str)?;
            Some((bitrate, url))
        })
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, url)| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tweetvault_common::{MergePolicy, Provenance};

    #[test]
    fn best_variant_prefers_highest_bitrate_and_accepts_zero() {
        let item = Value::from(json!({"video_info": {"variants": [
            {"content_type": "application/x-mpegURL", "url": "https://v/pl.m3u8"},
            {"bitrate": 0, "url": "https://v/gif.mp4"}
        ]}}));
        assert_eq!(best_variant(&item).as_deref(), Some("https://v/gif.mp4"));

        let item = Value::from(json!({"video_info": {"variants": [
            {"bitrate": 832000, "url": "https://v/low.mp4"},
            {"bitrate": 2176000, "url": "https://v/high.mp4"}
        ]}}));
        assert_eq!(best_variant(&item).as_deref(), Some("https://v/high.mp4"));

        let item = Value::from(json!({"video_info": {"variants": [{"url": "https://v/pl.m3u8"}]}}));
        assert_eq!(best_variant(&item), None);
    }

    #[test]
    fn plans_photos_and_videos() {
        let archive = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let out_media = output.path().join("media");
        std::fs::write(archive.path().join("1-abc.jpg"), b"photo").unwrap();
        std::fs::write(archive.path().join("2-clip.mp4"), b"video").unwrap();

        let mut store = RecordStore::new(MergePolicy::default());
        store.merge(
            "1",
            Value::from(json!({"id_str": "1", "extended_entities": {"media": [
                {"media_url_https": "https://pbs.twimg.com/media/abc.jpg", "type": "photo"}
            ]}})),
            &Provenance::archive(),
        );
        store.merge(
            "2",
            Value::from(json!({"id_str": "2", "extended_entities": {"media": [{
                "media_url_https": "https://pbs.twimg.com/ext_tw_video_thumb/9/pu/img/thumb.jpg",
                "type": "video",
                "video_info": {"variants": [{"bitrate": 256000, "url": "https://video.twimg.com/clip.mp4"}]}
            }]}})),
            &Provenance::archive(),
        );

        let config = MediaConfig::default();
        let plan = MediaPlanner::new(archive.path(), &out_media, &config)
            .plan(&store)
            .unwrap();

        assert_eq!(plan.mirrored, 2);
        assert_eq!(
            plan.candidates,
            vec![
                MediaCandidate::new(out_media.join("1-abc.jpg"), "https://pbs.twimg.com/media/abc.jpg:orig"),
                MediaCandidate::new(out_media.join("2-clip.mp4"), "https://video.twimg.com/clip.mp4"),
            ]
        );
        assert_eq!(std::fs::read(out_media.join("1-abc.jpg")).unwrap(), b"photo");

        // Second plan finds the mirror in place and copies nothing.
        let again = MediaPlanner::new(archive.path(), &out_media, &config)
            .plan(&store)
            .unwrap();
        assert_eq!(again.mirrored, 0);
    }

    #[test]
    fn video_fallback_leaves_photo_of_same_record_alone() {
        let archive = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let out_media = output.path().join("media");
        std::fs::write(archive.path().join("5-a.jpg"), b"photo").unwrap();
        std::fs::write(archive.path().join("5-vid.mp4"), b"video").unwrap();

        let mut store = RecordStore::new(MergePolicy::default());
        store.merge(
            "5",
            Value::from(json!({"id_str": "5", "extended_entities": {"media": [
                {"media_url_https": "https://pbs.twimg.com/media/a.jpg", "type": "photo"},
                {
                    "media_url_https": "https://pbs.twimg.com/ext_tw_video_thumb/9/pu/img/b.jpg",
                    "type": "video",
                    "video_info": {"variants": [{"bitrate": 256000, "url": "https://video.twimg.com/vid.mp4"}]}
                }
            ]}})),
            &Provenance::archive(),
        );

        let config = MediaConfig::default();
        let plan = MediaPlanner::new(archive.path(), &out_media, &config)
            .plan(&store)
            .unwrap();

        assert_eq!(
            plan.candidates,
            vec![
                MediaCandidate::new(out_media.join("5-a.jpg"), "https://pbs.twimg.com/media/a.jpg:orig"),
                MediaCandidate::new(out_media.join("5-vid.mp4"), "https://video.twimg.com/vid.mp4"),
            ]
        );
        assert_eq!(plan.unmatched, 0);
    }
}
