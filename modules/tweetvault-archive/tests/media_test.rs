//! Integration tests for the media upgrade engine against MockMediaSource.
//! Images are generated on the fly with the `image` crate.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tweetvault_archive::media::{attempt, DownloadError};
use tweetvault_archive::testing::MockMediaSource;
use tweetvault_archive::{ArtifactState, MediaCandidate, MediaUpgrader, OutcomeStore};
use tweetvault_common::MediaConfig;

const URL: &str = "https://pbs.twimg.com/media/abc.jpg:orig";

fn fast_config(max_passes: u32) -> MediaConfig {
    MediaConfig {
        max_passes,
        initial_delay: Duration::ZERO,
        delay_growth: Duration::ZERO,
        ..MediaConfig::default()
    }
}

/// Single-colour PNG; compresses to a few hundred bytes.
fn solid_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([40, 90, 160]));
    encode_png(img)
}

/// Pseudo-random PNG; barely compresses.
fn noise_png(width: u32, height: u32) -> Vec<u8> {
    let mut state: u32 = 0x9e37_79b9;
    let img = image::RgbImage::from_fn(width, height, |_, _| {
        let mut next = || {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 24) as u8
        };
        image::Rgb([next(), next(), next()])
    });
    encode_png(img)
}

fn encode_png(img: image::RgbImage) -> Vec<u8> {
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

fn local_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

fn leftover_temp_files(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().ends_with(".part"))
        .count()
}

// =========================================================================
// Single attempt
// =========================================================================

#[tokio::test]
async fn pixel_area_outranks_byte_size() {
    let dir = tempfile::tempdir().unwrap();
    let local_bytes = solid_png(100, 100);
    let candidate_bytes = noise_png(80, 80);
    assert!(candidate_bytes.len() > local_bytes.len());

    let path = local_file(dir.path(), "1-abc.png", &local_bytes);
    let source = MockMediaSource::new().on_body(URL, candidate_bytes.clone());
    let report = attempt(&source, &MediaCandidate::new(&path, URL)).await;

    assert_eq!(report.state, ArtifactState::VerifiedNotBetter);
    assert_eq!(report.downloaded, candidate_bytes.len() as u64);
    assert_eq!(report.area_change(), Some(-36.0));
    assert_eq!(std::fs::read(&path).unwrap(), local_bytes);
    assert_eq!(leftover_temp_files(dir.path()), 0);
}

#[tokio::test]
async fn larger_image_replaces_local_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = local_file(dir.path(), "1-abc.png", &noise_png(80, 80));
    let better = solid_png(200, 200);
    let source = MockMediaSource::new().on_body(URL, better.clone());

    let report = attempt(&source, &MediaCandidate::new(&path, URL)).await;

    assert_eq!(report.state, ArtifactState::VerifiedBetter);
    assert_eq!(std::fs::read(&path).unwrap(), better);
    assert_eq!(leftover_temp_files(dir.path()), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn replacement_keeps_the_local_file_mode() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let path = local_file(dir.path(), "1-clip.mp4", &[1u8; 100]);
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
    let source = MockMediaSource::new().on_body(URL, vec![2u8; 300]);

    let report = attempt(&source, &MediaCandidate::new(&path, URL)).await;

    assert_eq!(report.state, ArtifactState::VerifiedBetter);
    assert_eq!(std::fs::read(&path).unwrap().len(), 300);
    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o644);
}

#[tokio::test]
async fn same_reported_length_transfers_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = local_file(dir.path(), "1-clip.mp4", &[1u8; 512]);
    let source = MockMediaSource::new().on_body(URL, vec![2u8; 512]);

    let report = attempt(&source, &MediaCandidate::new(&path, URL)).await;

    assert_eq!(report.state, ArtifactState::VerifiedNotBetter);
    assert_eq!(report.downloaded, 0);
    assert_eq!(std::fs::read(&path).unwrap(), vec![1u8; 512]);
}

#[tokio::test]
async fn truncated_transfer_fails_and_keeps_local() {
    let dir = tempfile::tempdir().unwrap();
    let path = local_file(dir.path(), "1-clip.mp4", &[1u8; 64]);
    let source = MockMediaSource::new().on_truncated(URL, vec![2u8; 100], 200);

    let report = attempt(&source, &MediaCandidate::new(&path, URL)).await;

    assert_eq!(report.state, ArtifactState::Failed);
    assert!(matches!(
        report.error,
        Some(DownloadError::Truncated {
            expected: 200,
            received: 100
        })
    ));
    assert_eq!(std::fs::read(&path).unwrap(), vec![1u8; 64]);
    assert_eq!(leftover_temp_files(dir.path()), 0);
}

#[tokio::test]
async fn dimensions_on_one_side_only_is_inconclusive() {
    let dir = tempfile::tempdir().unwrap();
    let local_bytes = solid_png(50, 50);
    let path = local_file(dir.path(), "1-abc.png", &local_bytes);
    let source = MockMediaSource::new().on_body(URL, vec![0u8; 4000]);

    let report = attempt(&source, &MediaCandidate::new(&path, URL)).await;

    assert_eq!(report.state, ArtifactState::Inconclusive);
    assert_eq!(std::fs::read(&path).unwrap(), local_bytes);
}

#[tokio::test]
async fn http_error_is_a_failure() {
    let dir = tempfile::tempdir().unwrap();
    let path = local_file(dir.path(), "1-abc.jpg", b"local");
    let source = MockMediaSource::new().on_status(URL, 403);

    let report = attempt(&source, &MediaCandidate::new(&path, URL)).await;

    assert_eq!(report.state, ArtifactState::Failed);
    assert!(matches!(report.error, Some(DownloadError::Status(403))));
    assert_eq!(std::fs::read(&path).unwrap(), b"local");
}

// =========================================================================
// Driver
// =========================================================================

#[tokio::test]
async fn verified_url_is_skipped_on_next_run() {
    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join("media_state.json");
    let path = local_file(dir.path(), "1-clip.mp4", &[1u8; 100]);
    let candidates = vec![MediaCandidate::new(&path, URL)];

    let first = MediaUpgrader::new(MockMediaSource::new().on_body(URL, vec![2u8; 300]), fast_config(5));
    let mut outcomes = OutcomeStore::load(&state);
    let summary = first.run(&candidates, &mut outcomes).await.unwrap();
    assert_eq!(summary.upgraded(), 1);
    assert_eq!(std::fs::read(&path).unwrap().len(), 300);

    let second = MediaUpgrader::new(MockMediaSource::new(), fast_config(5));
    let mut outcomes = OutcomeStore::load(&state);
    let summary = second.run(&candidates, &mut outcomes).await.unwrap();

    assert!(second.source().requests().is_empty());
    assert_eq!(summary.passes[0].skipped, 1);
    assert_eq!(summary.verified(), 1);
}

#[tokio::test]
async fn failed_items_are_retried_in_the_next_pass() {
    let dir = tempfile::tempdir().unwrap();
    let path = local_file(dir.path(), "1-clip.mp4", &[1u8; 100]);
    let other_url = "https://video.twimg.com/other.mp4";
    let other = local_file(dir.path(), "2-other.mp4", &[1u8; 10]);
    let source = MockMediaSource::new()
        .on_body(URL, vec![2u8; 150])
        .fail_first(URL, 1)
        .on_body(other_url, vec![3u8; 10]);
    let upgrader = MediaUpgrader::new(source, fast_config(5));
    let mut outcomes = OutcomeStore::in_memory();

    let summary = upgrader
        .run(
            &[MediaCandidate::new(&path, URL), MediaCandidate::new(&other, other_url)],
            &mut outcomes,
        )
        .await
        .unwrap();

    assert_eq!(summary.passes.len(), 2);
    assert_eq!(summary.passes[0].failed, 1);
    assert_eq!(summary.passes[1].queued, 1);
    assert_eq!(summary.passes[1].better, 1);
    assert!(summary.failed.is_empty());
    assert_eq!(upgrader.source().request_count(URL), 2);
    assert_eq!(upgrader.source().request_count(other_url), 1);
    assert!(outcomes.is_verified(URL));
}

#[tokio::test]
async fn persistent_failure_exhausts_the_pass_budget() {
    let dir = tempfile::tempdir().unwrap();
    let path = local_file(dir.path(), "1-abc.jpg", b"local");
    let upgrader = MediaUpgrader::new(MockMediaSource::new().on_status(URL, 500), fast_config(3));
    let mut outcomes = OutcomeStore::in_memory();

    let summary = upgrader
        .run(&[MediaCandidate::new(&path, URL)], &mut outcomes)
        .await
        .unwrap();

    assert_eq!(summary.passes.len(), 3);
    assert_eq!(summary.failed, vec![URL.to_string()]);
    assert_eq!(upgrader.source().request_count(URL), 3);
    assert_eq!(std::fs::read(&path).unwrap(), b"local");
    assert!(!outcomes.is_verified(URL));
}

#[tokio::test]
async fn inconclusive_items_are_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    let path = local_file(dir.path(), "1-abc.png", &solid_png(20, 20));
    let upgrader = MediaUpgrader::new(MockMediaSource::new().on_body(URL, vec![9u8; 2048]), fast_config(5));
    let mut outcomes = OutcomeStore::in_memory();

    let summary = upgrader
        .run(&[MediaCandidate::new(&path, URL)], &mut outcomes)
        .await
        .unwrap();

    assert_eq!(summary.passes.len(), 1);
    assert_eq!(summary.inconclusive(), 1);
    assert_eq!(upgrader.source().request_count(URL), 1);
    assert!(!outcomes.is_verified(URL));
}

// =========================================================================
// Backoff
// =========================================================================

#[tokio::test(start_paused = true)]
async fn delay_separates_items_and_grows_per_pass() {
    let dir = tempfile::tempdir().unwrap();
    let other_url = "https://video.twimg.com/other.mp4";
    let first = local_file(dir.path(), "1-clip.mp4", &[1u8; 100]);
    let second = local_file(dir.path(), "2-other.mp4", &[1u8; 100]);
    let source = MockMediaSource::new()
        .on_body(URL, vec![2u8; 150])
        .fail_first(URL, 1)
        .on_body(other_url, vec![3u8; 150]);
    let upgrader = MediaUpgrader::new(source, MediaConfig::default());
    let mut outcomes = OutcomeStore::in_memory();

    let started = tokio::time::Instant::now();
    let summary = upgrader
        .run(
            &[MediaCandidate::new(&first, URL), MediaCandidate::new(&second, other_url)],
            &mut outcomes,
        )
        .await
        .unwrap();
    let waited = started.elapsed();

    assert_eq!(summary.passes.len(), 2);
    assert_eq!(summary.passes[0].delay, Duration::from_millis(250));
    assert_eq!(summary.passes[1].delay, Duration::from_millis(2250));
    assert_eq!(summary.passes[1].queued, 1);
    // One wait between the two items of the first pass; the lone retry
    // in the second pass starts immediately.
    assert!(waited >= Duration::from_millis(250), "waited {waited:?}");
    assert!(waited < Duration::from_millis(2250), "waited {waited:?}");
    assert!(summary.failed.is_empty());
}

#[tokio::test(start_paused = true)]
async fn retry_pass_waits_the_grown_delay_between_items() {
    let dir = tempfile::tempdir().unwrap();
    let other_url = "https://video.twimg.com/other.mp4";
    let first = local_file(dir.path(), "1-clip.mp4", &[1u8; 100]);
    let second = local_file(dir.path(), "2-other.mp4", &[1u8; 100]);
    let source = MockMediaSource::new()
        .on_body(URL, vec![2u8; 150])
        .fail_first(URL, 1)
        .on_body(other_url, vec![3u8; 150])
        .fail_first(other_url, 1);
    let upgrader = MediaUpgrader::new(source, MediaConfig::default());
    let mut outcomes = OutcomeStore::in_memory();

    let started = tokio::time::Instant::now();
    let summary = upgrader
        .run(
            &[MediaCandidate::new(&first, URL), MediaCandidate::new(&second, other_url)],
            &mut outcomes,
        )
        .await
        .unwrap();
    let waited = started.elapsed();

    assert_eq!(summary.passes.len(), 2);
    assert_eq!(summary.passes[1].queued, 2);
    assert_eq!(summary.passes[1].better, 2);
    assert!(waited >= Duration::from_millis(2500), "waited {waited:?}");
    assert!(waited < Duration::from_millis(4750), "waited {waited:?}");
}
