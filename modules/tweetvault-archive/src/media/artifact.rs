use std::io;
use std::path::{Path, PathBuf};

/// Pixel size of a decodable image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// A local media file paired with the remote URL that may hold a better copy.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct MediaCandidate {
    pub path: PathBuf,
    pub url: String,
}

impl MediaCandidate {
    pub fn new(path: impl Into<PathBuf>, url: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            url: url.into(),
        }
    }
}

/// Size measurements of one file, local or downloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Measure {
    pub bytes: u64,
    pub dimensions: Option<Dimensions>,
}

impl Measure {
    pub fn of_file(path: &Path) -> io::Result<Self> {
        let bytes = std::fs::metadata(path)?.len();
        Ok(Self {
            bytes,
            dimensions: read_dimensions(path),
        })
    }
}

/// A candidate with its local file measured. `local` is `None` when the
/// file does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaArtifact {
    pub path: PathBuf,
    pub url: String,
    pub local: Option<Measure>,
}

impl MediaArtifact {
    pub fn inspect(candidate: &MediaCandidate) -> io::Result<Self> {
        let local = match Measure::of_file(&candidate.path) {
            Ok(measure) => Some(measure),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e),
        };
        Ok(Self {
            path: candidate.path.clone(),
            url: candidate.url.clone(),
            local,
        })
    }

    pub fn byte_size(&self) -> Option<u64> {
        self.local.map(|m| m.bytes)
    }
}

/// Header-only image decode; `None` for video, unsupported formats or
/// damaged files.
pub fn read_dimensions(path: &Path) -> Option<Dimensions> {
    let (width, height) = image::ImageReader::open(path)
        .ok()?
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()?;
    Some(Dimensions { width, height })
}
