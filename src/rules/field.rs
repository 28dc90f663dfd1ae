//! Field catalogue and the read-only schema registry.
//!
//! Every rule field is a variant of the closed [`Field`] enum and carries a
//! fixed [`FieldType`]. The operators a type accepts live in one table
//! ([`FieldType::allowed_operators`]), so a new field or operator cannot
//! slip through without the exhaustive matches below failing to compile.

use serde::{Deserialize, Serialize};

use super::operator::Operator;
use crate::model::PersonRole;

/// Value type of a field. Decides which operators are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    String,
    StringList,
    Numeric,
    DateAbsolute,
    Boolean,
    PersonRole,
    Resolution,
    Similarity,
}

impl FieldType {
    pub const ALL: [FieldType; 8] = [
        FieldType::String,
        FieldType::StringList,
        FieldType::Numeric,
        FieldType::DateAbsolute,
        FieldType::Boolean,
        FieldType::PersonRole,
        FieldType::Resolution,
        FieldType::Similarity,
    ];

    /// Operators accepted by fields of this type.
    pub fn allowed_operators(self) -> &'static [Operator] {
        use Operator::*;
        match self {
            FieldType::String => &[
                Equal,
                NotEqual,
                Contains,
                NotContains,
                IsIn,
                IsNotIn,
                MatchRegex,
            ],
            FieldType::StringList | FieldType::PersonRole => {
                &[Contains, NotContains, IsIn, IsNotIn, MatchRegex]
            }
            FieldType::Numeric | FieldType::Resolution => &[
                Equal,
                NotEqual,
                GreaterThan,
                LessThan,
                GreaterThanOrEqual,
                LessThanOrEqual,
            ],
            FieldType::DateAbsolute => &[
                Equal, NotEqual, After, Before, NewerThan, OlderThan, Weekday,
            ],
            FieldType::Boolean => &[Equal, NotEqual],
            FieldType::Similarity => &[Equal, Contains],
        }
    }

    /// Whether `op` may be used with this type.
    pub fn allows(self, op: Operator) -> bool {
        self.allowed_operators().contains(&op)
    }
}

/// Every field a rule can test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    // Strings
    Name,
    Album,
    SeriesName,
    OfficialRating,
    Overview,
    FolderPath,
    ItemType,
    // String lists
    Genres,
    Tags,
    Studios,
    Artists,
    AlbumArtists,
    AudioLanguages,
    Collections,
    // Numbers
    ProductionYear,
    CommunityRating,
    CriticRating,
    RuntimeMinutes,
    PlayCount,
    SeasonNumber,
    EpisodeNumber,
    AudioBitrate,
    AudioChannels,
    Framerate,
    // Dates
    ReleaseDate,
    DateCreated,
    DateModified,
    LastPlayed,
    // Flags
    IsPlayed,
    IsFavorite,
    NextUnwatched,
    // People
    People,
    Actors,
    Directors,
    Writers,
    Producers,
    Composers,
    GuestStars,
    // Video
    Resolution,
    // Similarity
    SimilarTo,
}

impl Field {
    pub const ALL: [Field; 40] = [
        Field::Name,
        Field::Album,
        Field::SeriesName,
        Field::OfficialRating,
        Field::Overview,
        Field::FolderPath,
        Field::ItemType,
        Field::Genres,
        Field::Tags,
        Field::Studios,
        Field::Artists,
        Field::AlbumArtists,
        Field::AudioLanguages,
        Field::Collections,
        Field::ProductionYear,
        Field::CommunityRating,
        Field::CriticRating,
        Field::RuntimeMinutes,
        Field::PlayCount,
        Field::SeasonNumber,
        Field::EpisodeNumber,
        Field::AudioBitrate,
        Field::AudioChannels,
        Field::Framerate,
        Field::ReleaseDate,
        Field::DateCreated,
        Field::DateModified,
        Field::LastPlayed,
        Field::IsPlayed,
        Field::IsFavorite,
        Field::NextUnwatched,
        Field::People,
        Field::Actors,
        Field::Directors,
        Field::Writers,
        Field::Producers,
        Field::Composers,
        Field::GuestStars,
        Field::Resolution,
        Field::SimilarTo,
    ];

    pub fn field_type(self) -> FieldType {
        match self {
            Field::Name
            | Field::Album
            | Field::SeriesName
            | Field::OfficialRating
            | Field::Overview
            | Field::FolderPath
            | Field::ItemType => FieldType::String,
            Field::Genres
            | Field::Tags
            | Field::Studios
            | Field::Artists
            | Field::AlbumArtists
            | Field::AudioLanguages
            | Field::Collections => FieldType::StringList,
            Field::ProductionYear
            | Field::CommunityRating
            | Field::CriticRating
            | Field::RuntimeMinutes
            | Field::PlayCount
            | Field::SeasonNumber
            | Field::EpisodeNumber
            | Field::AudioBitrate
            | Field::AudioChannels
            | Field::Framerate => FieldType::Numeric,
            Field::ReleaseDate | Field::DateCreated | Field::DateModified | Field::LastPlayed => {
                FieldType::DateAbsolute
            }
            Field::IsPlayed | Field::IsFavorite | Field::NextUnwatched => FieldType::Boolean,
            Field::People
            | Field::Actors
            | Field::Directors
            | Field::Writers
            | Field::Producers
            | Field::Composers
            | Field::GuestStars => FieldType::PersonRole,
            Field::Resolution => FieldType::Resolution,
            Field::SimilarTo => FieldType::Similarity,
        }
    }

    /// Fields read from per-user data rather than the item itself.
    pub fn is_user_scoped(self) -> bool {
        matches!(
            self,
            Field::IsPlayed
                | Field::IsFavorite
                | Field::PlayCount
                | Field::LastPlayed
                | Field::NextUnwatched
        )
    }

    /// Role a person field is restricted to. `None` means any role.
    pub fn person_role(self) -> Option<PersonRole> {
        match self {
            Field::Actors => Some(PersonRole::Actor),
            Field::Directors => Some(PersonRole::Director),
            Field::Writers => Some(PersonRole::Writer),
            Field::Producers => Some(PersonRole::Producer),
            Field::Composers => Some(PersonRole::Composer),
            Field::GuestStars => Some(PersonRole::GuestStar),
            _ => None,
        }
    }
}

/// One row of the schema listing.
#[derive(Debug, Clone, Serialize)]
pub struct FieldDescriptor {
    pub field: Field,
    pub field_type: FieldType,
    pub operators: Vec<Operator>,
    pub user_scoped: bool,
}

/// Read-only registry of the fields the engine understands.
///
/// Built once and handed to whoever needs to list fields (the CLI, a
/// configuration UI). It never changes after construction.
#[derive(Debug, Clone)]
pub struct FieldSchema {
    fields: Vec<FieldDescriptor>,
}

impl FieldSchema {
    /// Build the registry from the static field table.
    pub fn new() -> Self {
        let fields = Field::ALL
            .iter()
            .map(|&field| {
                let field_type = field.field_type();
                FieldDescriptor {
                    field,
                    field_type,
                    operators: field_type.allowed_operators().to_vec(),
                    user_scoped: field.is_user_scoped(),
                }
            })
            .collect();
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn get(&self, field: Field) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|d| d.field == field)
    }

    /// Fields of a given type, in catalogue order.
    pub fn of_type(&self, field_type: FieldType) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields
            .iter()
            .filter(move |d| d.field_type == field_type)
    }
}

impl Default for FieldSchema {
    fn default() -> Self {
        Self::new()
    }
}
