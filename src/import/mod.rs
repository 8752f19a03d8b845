//! Playlist import: persisted job/track state and the orchestrator driving it.

mod models;
mod orchestrator;
mod store;

pub use models::{
    ImportJob, ImportJobStatus, ImportJobView, ImportTrack, ImportTrackStatus, NewImportTrack,
};
pub use orchestrator::{ImportOrchestrator, ImportSettings};
pub use store::{ImportStore, SqliteImportStore};

#[cfg(feature = "mock")]
pub use store::MockImportStore;
