pub mod config;
pub mod core;
pub mod error;
pub mod models;
pub mod sources;

pub use error::{Result, SourceError};
pub use models::{AudioItem, LookupRequest, Playlist, SearchResult, SearchType, TrackMetadata};
pub use sources::mcdn::{McdnSource, McdnTrack};
pub use sources::MusicSource;
