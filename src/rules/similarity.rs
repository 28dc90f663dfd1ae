//! Attribute-overlap similarity between two items.
//!
//! The score is the mean Jaccard index over the compared attribute sets,
//! skipping sets that are empty on both sides. It lies in `0.0..=1.0`.

use std::collections::HashSet;

use super::expression::SimilarityField;
use crate::model::{MediaItem, PersonRole};

/// An item is "similar" when its score is strictly above this.
pub const SIMILARITY_THRESHOLD: f64 = 0.25;

fn values(item: &MediaItem, field: SimilarityField) -> HashSet<String> {
    let lower = |v: &[String]| -> HashSet<String> { v.iter().map(|s| s.to_lowercase()).collect() };
    let people = |role: PersonRole| -> HashSet<String> {
        item.people
            .iter()
            .filter(|p| p.role == role)
            .map(|p| p.name.to_lowercase())
            .collect()
    };
    match field {
        SimilarityField::Genre => lower(&item.genres),
        SimilarityField::Tags => lower(&item.tags),
        SimilarityField::Studios => lower(&item.studios),
        SimilarityField::Artists => lower(&item.artists),
        SimilarityField::AlbumArtists => lower(&item.album_artists),
        SimilarityField::Actors => people(PersonRole::Actor),
        SimilarityField::Directors => people(PersonRole::Director),
    }
}

/// Similarity of `item` to `anchor` over `fields`.
pub fn score(item: &MediaItem, anchor: &MediaItem, fields: &[SimilarityField]) -> f64 {
    let mut total = 0.0;
    let mut compared = 0usize;

    for &field in fields {
        let a = values(item, field);
        let b = values(anchor, field);
        let union = a.union(&b).count();
        if union == 0 {
            continue;
        }
        let shared = a.intersection(&b).count();
        total += shared as f64 / union as f64;
        compared += 1;
    }

    if compared == 0 {
        0.0
    } else {
        total / compared as f64
    }
}
