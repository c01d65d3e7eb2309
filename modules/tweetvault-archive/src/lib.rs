// Reconciliation and verification pipeline for a social-media archive
// export.
//
// Flow: ArchiveInput loads records into a RecordStore; EnrichmentDriver
// alternates ReferenceCollector and RemoteFetcher until nothing is left to
// fetch; MediaPlanner pairs archived files with remote originals and
// MediaUpgrader replaces them when the download is verifiably better.

pub mod archive_input;
pub mod cache;
pub mod consent;
pub mod enrichment;
pub mod error;
pub mod fetch;
pub mod media;
pub mod merge;
pub mod references;
pub mod store;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use archive_input::ArchiveInput;
pub use cache::RecordCache;
pub use consent::{AutoApprove, Consent};
pub use enrichment::{EnrichmentDriver, EnrichmentStop, EnrichmentSummary, RoundSummary};
pub use error::{ArchiveError, Result};
pub use fetch::{FetchBatchFailure, FetchReport, LookupApi, RemoteFetcher};
pub use media::{
    ArtifactState, HttpMediaSource, MediaCandidate, MediaPlanner, MediaUpgrader, OutcomeStore,
    UpgradeSummary,
};
pub use merge::{MergeConflict, MergeEngine};
pub use references::{FetchPlan, ReferenceCollector, Requester, TargetRequest};
pub use store::{MergeOutcome, RecordStore};
