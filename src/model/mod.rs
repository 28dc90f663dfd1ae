//! Core data models for library items as seen by the rule engine.
//!
//! Defines the identifiers ([`ItemId`], [`UserId`], [`TargetId`]), the
//! read-only [`MediaItem`] snapshot the host library hands us, and the
//! per-user [`UserData`] overlay.
//!
//! Items are plain data. Nothing in here talks to the host; see
//! [`crate::host`] for the ports that produce these values.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random id.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map(Self)
            }
        }
    };
}

id_type!(
    /// Host library item id.
    ItemId
);
id_type!(
    /// Host user id.
    UserId
);
id_type!(
    /// Id of the collection/playlist a definition materializes to.
    TargetId
);
id_type!(
    /// Id of a single ignore-list entry.
    EntryId
);
id_type!(
    /// Id of one refresh job.
    JobId
);

/// Kind of library item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MediaKind {
    Audio,
    AudioBook,
    Book,
    Movie,
    Episode,
    Series,
    MusicVideo,
    Video,
    Photo,
    /// A collection (box set) item
    Collection,
}

impl MediaKind {
    /// Name used for string comparisons by the `ItemType` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "Audio",
            MediaKind::AudioBook => "AudioBook",
            MediaKind::Book => "Book",
            MediaKind::Movie => "Movie",
            MediaKind::Episode => "Episode",
            MediaKind::Series => "Series",
            MediaKind::MusicVideo => "MusicVideo",
            MediaKind::Video => "Video",
            MediaKind::Photo => "Photo",
            MediaKind::Collection => "Collection",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credit role of a person attached to an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PersonRole {
    Actor,
    Director,
    Writer,
    Producer,
    Composer,
    GuestStar,
    Other,
}

/// A credited person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub name: String,
    pub role: PersonRole,
}

/// One audio stream of an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioStream {
    /// ISO language code or name (e.g. "eng")
    pub language: Option<String>,
    /// Whether this is the stream a player picks by default
    #[serde(default)]
    pub is_default: bool,
}

/// A library item snapshot.
///
/// Attributes that don't apply to an item's kind are simply left empty;
/// the evaluator treats absence as "no match".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaItem {
    pub id: ItemId,
    pub kind: Option<MediaKind>,
    pub name: String,
    /// Host-provided sort name (falls back to `name`)
    pub sort_name: Option<String>,
    pub album: Option<String>,
    pub series_name: Option<String>,
    /// Parent series for episodes
    pub series_id: Option<ItemId>,
    pub season_number: Option<u32>,
    pub episode_number: Option<u32>,
    pub disc_number: Option<u32>,
    pub track_number: Option<u32>,
    pub official_rating: Option<String>,
    pub overview: Option<String>,
    pub path: Option<String>,
    pub genres: Vec<String>,
    pub tags: Vec<String>,
    pub studios: Vec<String>,
    pub artists: Vec<String>,
    pub album_artists: Vec<String>,
    /// Names of the collections this item belongs to
    pub collections: Vec<String>,
    pub people: Vec<Person>,
    pub audio_streams: Vec<AudioStream>,
    pub production_year: Option<i32>,
    pub community_rating: Option<f64>,
    pub critic_rating: Option<f64>,
    /// Runtime in seconds
    pub runtime_secs: Option<u64>,
    pub audio_bitrate: Option<u32>,
    pub audio_channels: Option<u32>,
    pub framerate: Option<f64>,
    /// Height of the primary video stream in pixels
    pub video_height: Option<u32>,
    pub release_date: Option<DateTime<Utc>>,
    pub date_created: Option<DateTime<Utc>>,
    pub date_modified: Option<DateTime<Utc>>,
}

impl MediaItem {
    /// Create an item with just an id, kind and name.
    pub fn new(kind: MediaKind, name: impl Into<String>) -> Self {
        Self {
            id: ItemId::new(),
            kind: Some(kind),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Whether this item is an episode.
    pub fn is_episode(&self) -> bool {
        self.kind == Some(MediaKind::Episode)
    }

    /// Runtime in whole minutes, rounded down.
    pub fn runtime_minutes(&self) -> Option<u64> {
        self.runtime_secs.map(|s| s / 60)
    }

    /// Sort name, or the display name when the host didn't provide one.
    pub fn effective_sort_name(&self) -> &str {
        self.sort_name.as_deref().unwrap_or(&self.name)
    }

    /// Language of the default audio stream, falling back to the first stream.
    pub fn default_audio_language(&self) -> Option<&str> {
        self.audio_streams
            .iter()
            .find(|s| s.is_default)
            .or_else(|| self.audio_streams.first())
            .and_then(|s| s.language.as_deref())
    }
}

/// Per-user playback state for one item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserData {
    pub played: bool,
    pub favorite: bool,
    pub play_count: u32,
    pub last_played: Option<DateTime<Utc>>,
}
