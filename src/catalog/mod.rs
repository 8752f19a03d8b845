//! External catalog collaborators.
//!
//! Two catalogs feed this system: the match-target catalog (searched when
//! resolving loosely described tracks) and the playlist source catalog
//! (fetched when importing a playlist). Both are in-process traits with
//! HTTP-backed implementations.

mod playlist;
mod search;
mod urls;

pub use playlist::{
    is_playlist_source_url, FetchedPlaylist, PlaylistSource, PlaylistTrack, SpotifyEmbedClient,
};
pub use search::{HttpSearchClient, SearchKind, SearchProvider};
pub use urls::{extract_video_id, is_playlist_url, is_supported_url};

#[cfg(feature = "mock")]
pub use playlist::MockPlaylistSource;
#[cfg(feature = "mock")]
pub use search::MockSearchProvider;
