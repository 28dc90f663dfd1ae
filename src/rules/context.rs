//! The library snapshot one refresh evaluates against.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use super::field::Field;
use super::operator::Operator;
use super::value::Value;
use crate::definition::CompiledDefinition;
use crate::model::{ItemId, MediaItem, UserData, UserId};

/// Items and per-user data fetched from the host for one run.
///
/// `candidates` are the items a definition may select. `related` holds
/// items that are only consulted, such as the parent series of episodes.
#[derive(Debug, Default)]
pub struct LibraryView {
    candidates: Vec<MediaItem>,
    related: Vec<MediaItem>,
    user_data: HashMap<UserId, HashMap<ItemId, UserData>>,
}

impl LibraryView {
    pub fn new(candidates: Vec<MediaItem>) -> Self {
        Self {
            candidates,
            ..Default::default()
        }
    }

    pub fn with_related(mut self, related: Vec<MediaItem>) -> Self {
        self.related = related;
        self
    }

    /// Merge per-user data for a batch of items.
    pub fn add_user_data(&mut self, user: UserId, data: HashMap<ItemId, UserData>) {
        self.user_data.entry(user).or_default().extend(data);
    }

    pub fn candidates(&self) -> &[MediaItem] {
        &self.candidates
    }

    pub fn related(&self) -> &[MediaItem] {
        &self.related
    }

    /// A user's data for an item; unknown means never played, not a favorite.
    pub fn user_data(&self, user: UserId, item: ItemId) -> UserData {
        self.user_data
            .get(&user)
            .and_then(|m| m.get(&item))
            .copied()
            .unwrap_or_default()
    }

    fn all_items(&self) -> impl Iterator<Item = &MediaItem> {
        self.candidates.iter().chain(self.related.iter())
    }
}

/// Watch progress of one series for one user.
#[derive(Debug, Clone, Copy, Default)]
struct SeriesProgress {
    first_unwatched: Option<ItemId>,
    any_watched: bool,
}

/// Indexes derived from a [`LibraryView`] for a specific definition.
///
/// Built once per run; every lookup the evaluator does per item is a hash
/// lookup afterwards.
pub struct EvalContext<'a> {
    view: &'a LibraryView,
    now: DateTime<Utc>,
    user: UserId,
    by_id: HashMap<ItemId, &'a MediaItem>,
    progress: HashMap<(UserId, ItemId), SeriesProgress>,
    progress_users: HashSet<UserId>,
    anchors: HashMap<(bool, String), Vec<&'a MediaItem>>,
}

impl<'a> EvalContext<'a> {
    /// Prepare a context evaluating on behalf of `user`.
    pub fn new(
        definition: &CompiledDefinition,
        view: &'a LibraryView,
        user: UserId,
        now: DateTime<Utc>,
    ) -> Self {
        let by_id: HashMap<ItemId, &'a MediaItem> =
            view.all_items().map(|item| (item.id, item)).collect();

        let mut ctx = Self {
            view,
            now,
            user,
            by_id,
            progress: HashMap::new(),
            progress_users: HashSet::new(),
            anchors: HashMap::new(),
        };

        for expr in definition.expressions() {
            match (expr.field, &expr.value) {
                (Field::NextUnwatched, _) => {
                    let user = expr.user_id.unwrap_or(user);
                    if ctx.progress_users.insert(user) {
                        ctx.build_progress(user);
                    }
                }
                (Field::SimilarTo, Value::Anchor(name)) => {
                    let exact = expr.operator == Operator::Equal;
                    let key = (exact, name.clone());
                    if !ctx.anchors.contains_key(&key) {
                        let found = view
                            .all_items()
                            .filter(|item| {
                                let candidate = item.name.to_lowercase();
                                if exact {
                                    candidate == *name
                                } else {
                                    candidate.contains(name.as_str())
                                }
                            })
                            .collect();
                        ctx.anchors.insert(key, found);
                    }
                }
                _ => {}
            }
        }

        ctx
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// User whose data is read when an expression doesn't name one.
    pub fn user(&self) -> UserId {
        self.user
    }

    pub fn view(&self) -> &'a LibraryView {
        self.view
    }

    pub fn item(&self, id: ItemId) -> Option<&'a MediaItem> {
        self.by_id.get(&id).copied()
    }

    /// Parent series of an episode, when it is part of the snapshot.
    pub fn parent_series(&self, item: &MediaItem) -> Option<&'a MediaItem> {
        if !item.is_episode() {
            return None;
        }
        item.series_id.and_then(|id| self.item(id))
    }

    pub fn user_data(&self, user: UserId, item: ItemId) -> UserData {
        self.view.user_data(user, item)
    }

    /// Anchors selected by a `SimilarTo` operand.
    pub fn anchors(&self, exact: bool, name: &str) -> &[&'a MediaItem] {
        self.anchors
            .get(&(exact, name.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether `item` is the next episode `user` should watch in its series.
    pub fn is_next_unwatched(
        &self,
        user: UserId,
        item: &MediaItem,
        include_unwatched_series: bool,
    ) -> bool {
        if !item.is_episode() {
            return false;
        }
        let Some(series) = item.series_id else {
            return false;
        };
        let Some(progress) = self.progress.get(&(user, series)) else {
            return false;
        };
        progress.first_unwatched == Some(item.id)
            && (include_unwatched_series || progress.any_watched)
    }

    fn build_progress(&mut self, user: UserId) {
        let view = self.view;
        let mut by_series: HashMap<ItemId, Vec<&MediaItem>> = HashMap::new();
        for item in view.all_items().filter(|i| i.is_episode()) {
            if let Some(series) = item.series_id {
                by_series.entry(series).or_default().push(item);
            }
        }

        for (series, mut episodes) in by_series {
            // Watch order: season, then episode; unnumbered episodes last
            episodes.sort_by(|a, b| {
                let key = |e: &MediaItem| {
                    (
                        e.season_number.unwrap_or(u32::MAX),
                        e.episode_number.unwrap_or(u32::MAX),
                    )
                };
                key(a).cmp(&key(b)).then_with(|| a.name.cmp(&b.name))
            });

            let mut progress = SeriesProgress::default();
            for episode in episodes {
                if view.user_data(user, episode.id).played {
                    progress.any_watched = true;
                } else if progress.first_unwatched.is_none() {
                    progress.first_unwatched = Some(episode.id);
                }
            }
            self.progress.insert((user, series), progress);
        }
    }
}
