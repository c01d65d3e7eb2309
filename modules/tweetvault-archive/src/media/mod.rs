// Media upgrade engine: verified, resumable replacement of archived media
// with best-quality remote originals.

pub mod artifact;
pub mod driver;
pub mod outcomes;
pub mod plan;
pub mod source;
pub mod upgrade;
pub mod verify;

pub use artifact::{read_dimensions, Dimensions, MediaArtifact, MediaCandidate, Measure};
pub use driver::{format_bytes, format_duration, MediaUpgrader, PassSummary, UpgradeSummary};
pub use outcomes::OutcomeStore;
pub use plan::{MediaPlan, MediaPlanner};
pub use source::{DownloadError, HttpMediaSource, MediaResponse, MediaSource};
pub use upgrade::{attempt, ArtifactState, AttemptReport};
pub use verify::{judge, Basis, Verdict};
