//! Sorting and size limits for matched items.
//!
//! Up to three [`SortKey`]s are applied in priority order. Each key is
//! computed once per item (decorate, sort, undecorate) and the sort is
//! stable, so items that tie on every key keep the evaluator's order.
//!
//! After sorting, [`limit`] truncates by item count and then by
//! cumulative runtime.

use std::cmp::Ordering;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::definition::CompiledDefinition;
use crate::rules::{Matched, ValidationError};

/// Maximum number of sort keys in a spec.
pub const MAX_SORT_KEYS: usize = 3;

/// Leading words dropped by "ignore articles".
const ARTICLES: [&str; 3] = ["the ", "a ", "an "];

/// What a sort key orders by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortField {
    Name,
    SortName,
    SeriesName,
    Album,
    Artist,
    ReleaseDate,
    ProductionYear,
    CommunityRating,
    DateCreated,
    Runtime,
    PlayCount,
    LastPlayed,
    /// Season/episode or disc/track order
    TrackNumber,
    /// Score against `SimilarTo` anchors
    Similarity,
    /// Fresh shuffle on every run; other keys are ignored
    Random,
    /// Keep evaluation order
    NoOrder,
}

impl SortField {
    fn is_textual(self) -> bool {
        matches!(
            self,
            SortField::Name
                | SortField::SortName
                | SortField::SeriesName
                | SortField::Album
                | SortField::Artist
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortKey {
    pub field: SortField,
    #[serde(default)]
    pub direction: SortDirection,
    /// Strip a leading "The"/"A"/"An" before comparing (text keys only)
    #[serde(default)]
    pub ignore_articles: bool,
}

impl SortKey {
    pub fn ascending(field: SortField) -> Self {
        Self {
            field,
            direction: SortDirection::Ascending,
            ignore_articles: false,
        }
    }

    pub fn descending(field: SortField) -> Self {
        Self {
            direction: SortDirection::Descending,
            ..Self::ascending(field)
        }
    }

    pub fn ignoring_articles(mut self) -> Self {
        self.ignore_articles = true;
        self
    }
}

/// Ordered sort keys, primary first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SortSpec {
    keys: SmallVec<[SortKey; MAX_SORT_KEYS]>,
}

impl SortSpec {
    pub fn new(keys: Vec<SortKey>) -> Self {
        Self {
            keys: SmallVec::from_vec(keys),
        }
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.keys.len() > MAX_SORT_KEYS {
            return Err(ValidationError::TooManySortKeys(self.keys.len()));
        }
        Ok(())
    }

    /// Keys actually applied: Name ascending when empty, similarity keys
    /// dropped when there is nothing to be similar to.
    fn effective_keys(&self, has_similarity: bool) -> Vec<SortKey> {
        if self.keys.is_empty() {
            return vec![SortKey::ascending(SortField::Name)];
        }
        self.keys
            .iter()
            .filter(|k| has_similarity || k.field != SortField::Similarity)
            .copied()
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum SortValue {
    Text(String),
    Number(f64),
    Missing,
}

impl SortValue {
    /// Missing values sort after present ones.
    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortValue::Text(a), SortValue::Text(b)) => a.cmp(b),
            (SortValue::Number(a), SortValue::Number(b)) => a.total_cmp(b),
            (SortValue::Missing, SortValue::Missing) => Ordering::Equal,
            (SortValue::Missing, _) => Ordering::Greater,
            (_, SortValue::Missing) => Ordering::Less,
            // Keys of one field always produce the same variant
            _ => Ordering::Equal,
        }
    }
}

/// Lowercase and optionally strip one leading article.
fn normalize_text(text: &str, ignore_articles: bool) -> String {
    let lower = text.trim().to_lowercase();
    if ignore_articles {
        for article in ARTICLES {
            if let Some(rest) = lower.strip_prefix(article) {
                let rest = rest.trim_start();
                if !rest.is_empty() {
                    return rest.to_string();
                }
            }
        }
    }
    lower
}

fn sort_value(key: &SortKey, m: &Matched<'_>) -> SortValue {
    let item = m.item;
    let number = |v: Option<f64>| v.map_or(SortValue::Missing, SortValue::Number);
    let text = |v: Option<&str>| {
        v.map_or(SortValue::Missing, |s| {
            SortValue::Text(normalize_text(s, key.ignore_articles && key.field.is_textual()))
        })
    };

    match key.field {
        SortField::Name => text(Some(&item.name)),
        SortField::SortName => text(Some(item.effective_sort_name())),
        SortField::SeriesName => text(item.series_name.as_deref()),
        SortField::Album => text(item.album.as_deref()),
        SortField::Artist => text(
            item.album_artists
                .first()
                .or_else(|| item.artists.first())
                .map(String::as_str),
        ),
        SortField::ReleaseDate => number(item.release_date.map(|d| d.timestamp() as f64)),
        SortField::ProductionYear => number(item.production_year.map(f64::from)),
        SortField::CommunityRating => number(item.community_rating),
        SortField::DateCreated => number(item.date_created.map(|d| d.timestamp() as f64)),
        SortField::Runtime => number(item.runtime_secs.map(|s| s as f64)),
        SortField::PlayCount => SortValue::Number(f64::from(m.user_data.play_count)),
        SortField::LastPlayed => number(m.user_data.last_played.map(|d| d.timestamp() as f64)),
        SortField::TrackNumber => {
            let major = item.season_number.or(item.disc_number);
            let minor = item.episode_number.or(item.track_number);
            match (major, minor) {
                (None, None) => SortValue::Missing,
                (major, minor) => SortValue::Number(
                    f64::from(major.unwrap_or(0)) * 100_000.0 + f64::from(minor.unwrap_or(0)),
                ),
            }
        }
        SortField::Similarity => number(m.similarity),
        SortField::Random | SortField::NoOrder => SortValue::Missing,
    }
}

/// Sort matched items in place according to `spec`.
pub fn sort(items: &mut Vec<Matched<'_>>, spec: &SortSpec, has_similarity: bool) {
    let keys = spec.effective_keys(has_similarity);

    if keys.iter().any(|k| k.field == SortField::Random) {
        items.shuffle(&mut rand::rng());
        return;
    }
    if keys.iter().all(|k| k.field == SortField::NoOrder) {
        return;
    }

    let mut decorated: Vec<(Vec<SortValue>, Matched<'_>)> = items
        .drain(..)
        .map(|m| (keys.iter().map(|k| sort_value(k, &m)).collect(), m))
        .collect();

    decorated.sort_by(|(va, ma), (vb, mb)| {
        for (i, key) in keys.iter().enumerate() {
            let mut ord = va[i].compare(&vb[i]);
            if key.direction == SortDirection::Descending {
                ord = ord.reverse();
            }
            if key.field == SortField::Similarity {
                ord = ord.then_with(|| ma.item.id.cmp(&mb.item.id));
            }
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });

    items.extend(decorated.into_iter().map(|(_, m)| m));
}

/// Apply `max_items`, then the play time cap.
///
/// The play time cap keeps leading items until the next one would push
/// the total runtime over the cap. Items without a runtime count as zero.
pub fn limit<'a>(
    mut items: Vec<Matched<'a>>,
    max_items: Option<usize>,
    max_play_secs: Option<u64>,
) -> Vec<Matched<'a>> {
    if let Some(n) = max_items {
        items.truncate(n);
    }
    if let Some(cap) = max_play_secs {
        let mut total = 0u64;
        let keep = items
            .iter()
            .take_while(|m| {
                let next = total + m.item.runtime_secs.unwrap_or(0);
                if next > cap {
                    false
                } else {
                    total = next;
                    true
                }
            })
            .count();
        items.truncate(keep);
    }
    items
}

/// Sort and limit per a definition's settings.
pub fn finalize<'a>(definition: &CompiledDefinition, mut items: Vec<Matched<'a>>) -> Vec<Matched<'a>> {
    sort(&mut items, &definition.definition().sort, definition.has_similarity());
    limit(
        items,
        definition.item_limit(),
        definition.play_time_limit_secs(),
    )
}
