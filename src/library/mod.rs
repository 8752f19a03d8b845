//! Local track library: persisted records and duplicate detection.

mod duplicate_index;
mod models;
mod store;

pub use duplicate_index::{
    DuplicateHit, DuplicateIndex, DuplicateQuery, DURATION_TOLERANCE_SECS,
};
pub use models::{LibraryTrackRecord, NewLibraryTrack, LOCAL_ID_PREFIX};
pub use store::{LibraryStore, SqliteLibraryStore};

#[cfg(feature = "mock")]
pub use store::MockLibraryStore;
