//! OR-of-AND membership test over a library snapshot.
//!
//! An item belongs to a definition when every expression of at least one
//! group holds for it. A definition with no groups matches nothing;
//! only its pinned items are selected.
//!
//! # Example
//!
//! ```ignore
//! let compiled = definition.compile()?;
//! let evaluator = Evaluator::new(&compiled, &view, Utc::now());
//! let matched = evaluator.evaluate(500);
//! ```

use chrono::{DateTime, Datelike, Utc};
use rayon::prelude::*;

use super::context::{EvalContext, LibraryView};
use super::expression::{CompiledExpression, ExpressionOptions};
use super::field::{Field, FieldType};
use super::operator::Operator;
use super::similarity::{self, SIMILARITY_THRESHOLD};
use super::value::{ResolutionClass, Value};
use crate::definition::CompiledDefinition;
use crate::model::{MediaItem, MediaKind, UserData, UserId};

const EPSILON: f64 = 1e-9;

/// An item that passed evaluation, with what sorting needs to know.
#[derive(Debug, Clone)]
pub struct Matched<'a> {
    pub item: &'a MediaItem,
    /// The primary owner's data for the item
    pub user_data: UserData,
    /// Best `SimilarTo` score, when the definition has such a rule
    pub similarity: Option<f64>,
}

/// Evaluates one compiled definition against one snapshot.
pub struct Evaluator<'a> {
    definition: &'a CompiledDefinition,
    ctx: EvalContext<'a>,
}

impl<'a> Evaluator<'a> {
    /// Evaluate on behalf of the definition's primary owner.
    pub fn new(definition: &'a CompiledDefinition, view: &'a LibraryView, now: DateTime<Utc>) -> Self {
        Self::for_user(definition, view, definition.primary_owner(), now)
    }

    /// Evaluate with `user` as the default for user-scoped fields.
    pub fn for_user(
        definition: &'a CompiledDefinition,
        view: &'a LibraryView,
        user: UserId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            definition,
            ctx: EvalContext::new(definition, view, user, now),
        }
    }

    pub fn context(&self) -> &EvalContext<'a> {
        &self.ctx
    }

    /// Whether `item` satisfies the definition's rules.
    pub fn matches(&self, item: &MediaItem) -> bool {
        self.definition
            .sets()
            .iter()
            .any(|group| group.iter().all(|expr| self.test(expr, item)))
    }

    /// Highest score against any `SimilarTo` anchor.
    pub fn similarity(&self, item: &MediaItem) -> Option<f64> {
        self.definition
            .expressions()
            .filter(|e| e.field == Field::SimilarTo)
            .filter_map(|e| self.similar_to(e, item))
            .reduce(f64::max)
    }

    /// Evaluate every candidate, `batch_size` items at a time.
    ///
    /// Each batch is tested in parallel; output keeps candidate order.
    /// Pinned items skip the rules but must still be of an accepted kind.
    pub fn evaluate(&self, batch_size: usize) -> Vec<Matched<'a>> {
        let candidates = self.ctx.view().candidates();
        let with_similarity = self.definition.has_similarity();
        let mut out = Vec::new();

        for chunk in candidates.chunks(batch_size.max(1)) {
            let batch: Vec<Matched<'a>> = chunk
                .par_iter()
                .filter(|item| self.accepts_kind(item))
                .filter(|item| self.definition.is_pinned(item.id) || self.matches(item))
                .map(|item| Matched {
                    item,
                    user_data: self.ctx.user_data(self.ctx.user(), item.id),
                    similarity: if with_similarity {
                        self.similarity(item)
                    } else {
                        None
                    },
                })
                .collect();
            out.extend(batch);
        }

        tracing::debug!(
            target: "evaluator",
            "{}: {} of {} candidates matched",
            self.definition.name(),
            out.len(),
            candidates.len()
        );
        out
    }

    fn accepts_kind(&self, item: &MediaItem) -> bool {
        item.kind
            .is_some_and(|kind| self.definition.definition().media_types.contains(&kind))
    }

    fn test(&self, expr: &CompiledExpression, item: &MediaItem) -> bool {
        let user = expr.user_id.unwrap_or(self.ctx.user());
        let op = expr.operator;
        let value = &expr.value;

        match expr.field.field_type() {
            FieldType::String => test_text(op, value, text_of(expr.field, item)),
            FieldType::StringList | FieldType::PersonRole => {
                test_list(op, value, &self.list_of(expr, item))
            }
            FieldType::Numeric => test_number(op, value, self.number_of(expr.field, item, user)),
            FieldType::DateAbsolute => test_date(
                op,
                value,
                self.date_of(expr.field, item, user),
                self.ctx.now(),
            ),
            FieldType::Boolean => test_bool(op, value, self.flag_of(expr, item, user)),
            FieldType::Resolution => test_resolution(
                op,
                value,
                item.video_height.map(ResolutionClass::from_height),
            ),
            FieldType::Similarity => self
                .similar_to(expr, item)
                .is_some_and(|score| score > SIMILARITY_THRESHOLD),
        }
    }

    /// Score of `item` against the anchors of one `SimilarTo` rule. An item
    /// is never its own anchor.
    fn similar_to(&self, expr: &CompiledExpression, item: &MediaItem) -> Option<f64> {
        let Value::Anchor(name) = &expr.value else {
            return None;
        };
        let exact = expr.operator == Operator::Equal;
        self.ctx
            .anchors(exact, name)
            .iter()
            .filter(|anchor| anchor.id != item.id)
            .map(|anchor| similarity::score(item, anchor, &expr.similarity_fields))
            .reduce(f64::max)
    }

    fn list_of<'s>(&'s self, expr: &CompiledExpression, item: &'s MediaItem) -> Vec<&'s str> {
        let opts = expr.options;
        let parent = |flag: ExpressionOptions| {
            self.ctx.parent_series(item).filter(|_| opts.contains(flag))
        };

        match expr.field {
            Field::Genres => with_parent(
                &item.genres,
                parent(ExpressionOptions::INCLUDE_PARENT_SERIES_GENRES),
                |s| &s.genres,
            ),
            Field::Tags => with_parent(
                &item.tags,
                parent(ExpressionOptions::INCLUDE_PARENT_SERIES_TAGS),
                |s| &s.tags,
            ),
            Field::Studios => with_parent(
                &item.studios,
                parent(ExpressionOptions::INCLUDE_PARENT_SERIES_STUDIOS),
                |s| &s.studios,
            ),
            Field::Artists => item.artists.iter().map(String::as_str).collect(),
            Field::AlbumArtists => item.album_artists.iter().map(String::as_str).collect(),
            Field::AudioLanguages => {
                if opts.contains(ExpressionOptions::ONLY_DEFAULT_AUDIO_LANGUAGE) {
                    item.default_audio_language().into_iter().collect()
                } else {
                    item.audio_streams
                        .iter()
                        .filter_map(|s| s.language.as_deref())
                        .collect()
                }
            }
            Field::Collections => {
                if opts.contains(ExpressionOptions::INCLUDE_COLLECTION_ONLY) {
                    if item.kind == Some(MediaKind::Collection) {
                        vec![item.name.as_str()]
                    } else {
                        Vec::new()
                    }
                } else {
                    with_parent(
                        &item.collections,
                        parent(ExpressionOptions::INCLUDE_EPISODES_WITHIN_SERIES),
                        |s| &s.collections,
                    )
                }
            }
            field => {
                let role = field.person_role();
                item.people
                    .iter()
                    .filter(|p| role.is_none_or(|r| p.role == r))
                    .map(|p| p.name.as_str())
                    .collect()
            }
        }
    }

    fn number_of(&self, field: Field, item: &MediaItem, user: UserId) -> Option<f64> {
        match field {
            Field::ProductionYear => item.production_year.map(f64::from),
            Field::CommunityRating => item.community_rating,
            Field::CriticRating => item.critic_rating,
            Field::RuntimeMinutes => item.runtime_minutes().map(|m| m as f64),
            Field::PlayCount => Some(f64::from(self.ctx.user_data(user, item.id).play_count)),
            Field::SeasonNumber => item.season_number.map(f64::from),
            Field::EpisodeNumber => item.episode_number.map(f64::from),
            Field::AudioBitrate => item.audio_bitrate.map(f64::from),
            Field::AudioChannels => item.audio_channels.map(f64::from),
            Field::Framerate => item.framerate,
            _ => None,
        }
    }

    fn date_of(&self, field: Field, item: &MediaItem, user: UserId) -> Option<DateTime<Utc>> {
        match field {
            Field::ReleaseDate => item.release_date,
            Field::DateCreated => item.date_created,
            Field::DateModified => item.date_modified,
            Field::LastPlayed => self.ctx.user_data(user, item.id).last_played,
            _ => None,
        }
    }

    fn flag_of(&self, expr: &CompiledExpression, item: &MediaItem, user: UserId) -> bool {
        match expr.field {
            Field::IsPlayed => self.ctx.user_data(user, item.id).played,
            Field::IsFavorite => self.ctx.user_data(user, item.id).favorite,
            Field::NextUnwatched => self.ctx.is_next_unwatched(
                user,
                item,
                expr.options
                    .contains(ExpressionOptions::INCLUDE_UNWATCHED_SERIES),
            ),
            _ => false,
        }
    }
}

/// An item's own values plus, when given, its parent series' values.
fn with_parent<'s>(
    own: &'s [String],
    parent: Option<&'s MediaItem>,
    pick: fn(&MediaItem) -> &[String],
) -> Vec<&'s str> {
    let mut out: Vec<&'s str> = own.iter().map(String::as_str).collect();
    if let Some(series) = parent {
        out.extend(pick(series).iter().map(String::as_str));
    }
    out
}

fn text_of(field: Field, item: &MediaItem) -> Option<&str> {
    match field {
        Field::Name => Some(item.name.as_str()),
        Field::Album => item.album.as_deref(),
        Field::SeriesName => item.series_name.as_deref(),
        Field::OfficialRating => item.official_rating.as_deref(),
        Field::Overview => item.overview.as_deref(),
        Field::FolderPath => item.path.as_deref(),
        Field::ItemType => item.kind.map(|k| k.as_str()),
        _ => None,
    }
}

// ============================================================================
// Per-type tests
// ============================================================================
//
// Each returns the raw test result with negated operators already applied.
// An absent attribute fails every positive test, so its negation holds.

fn negate(op: Operator, hit: bool) -> bool {
    if op.is_negated() { !hit } else { hit }
}

fn test_text(op: Operator, value: &Value, actual: Option<&str>) -> bool {
    let hit = match value {
        // Equality treats an absent string as empty
        Value::Text(v) if matches!(op, Operator::Equal | Operator::NotEqual) => {
            actual.unwrap_or("").to_lowercase() == *v
        }
        Value::Text(v) => actual.is_some_and(|a| a.to_lowercase().contains(v.as_str())),
        Value::List(set) => actual.is_some_and(|a| set.contains(&a.to_lowercase())),
        Value::Pattern(re) => actual.is_some_and(|a| re.is_match(a)),
        _ => false,
    };
    negate(op, hit)
}

fn test_list(op: Operator, value: &Value, actual: &[&str]) -> bool {
    let hit = match value {
        Value::Text(v) => actual
            .iter()
            .any(|a| a.to_lowercase().contains(v.as_str())),
        Value::List(set) => actual.iter().any(|a| set.contains(&a.to_lowercase())),
        Value::Pattern(re) => actual.iter().any(|a| re.is_match(a)),
        _ => false,
    };
    negate(op, hit)
}

fn test_number(op: Operator, value: &Value, actual: Option<f64>) -> bool {
    let (Value::Number(v), Some(a)) = (value, actual) else {
        return op == Operator::NotEqual;
    };
    let (a, v) = (a, *v);
    match op {
        Operator::Equal => (a - v).abs() < EPSILON,
        Operator::NotEqual => (a - v).abs() >= EPSILON,
        Operator::GreaterThan => a > v,
        Operator::LessThan => a < v,
        Operator::GreaterThanOrEqual => a >= v,
        Operator::LessThanOrEqual => a <= v,
        _ => false,
    }
}

fn test_date(op: Operator, value: &Value, actual: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    let Some(actual) = actual else {
        return op == Operator::NotEqual;
    };
    match (op, value) {
        (Operator::Equal, Value::Date(d)) => actual.date_naive() == *d,
        (Operator::NotEqual, Value::Date(d)) => actual.date_naive() != *d,
        (Operator::After, Value::Date(d)) => actual.date_naive() > *d,
        (Operator::Before, Value::Date(d)) => actual.date_naive() < *d,
        (Operator::NewerThan, Value::Relative(span)) => actual >= span.before(now),
        (Operator::OlderThan, Value::Relative(span)) => actual < span.before(now),
        (Operator::Weekday, Value::Weekday(day)) => actual.weekday() == *day,
        _ => false,
    }
}

fn test_bool(op: Operator, value: &Value, actual: bool) -> bool {
    let Value::Bool(v) = value else {
        return false;
    };
    match op {
        Operator::Equal => actual == *v,
        Operator::NotEqual => actual != *v,
        _ => false,
    }
}

fn test_resolution(op: Operator, value: &Value, actual: Option<ResolutionClass>) -> bool {
    let (Value::Resolution(v), Some(a)) = (value, actual) else {
        return op == Operator::NotEqual;
    };
    match op {
        Operator::Equal => a == *v,
        Operator::NotEqual => a != *v,
        Operator::GreaterThan => a > *v,
        Operator::LessThan => a < *v,
        Operator::GreaterThanOrEqual => a >= *v,
        Operator::LessThanOrEqual => a <= *v,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::Definition;
    use crate::model::{AudioStream, ItemId, Person, PersonRole};
    use crate::rules::{Expression, ExpressionSet};
    use chrono::{Months, TimeZone};
    use std::collections::HashMap;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn definition(kinds: Vec<MediaKind>, sets: Vec<Vec<Expression>>) -> CompiledDefinition {
        let mut def = Definition::new("test", UserId::new(), kinds);
        def.expression_sets = sets.into_iter().map(ExpressionSet::new).collect();
        def.compile().unwrap()
    }

    fn one(field: Field, op: Operator, value: &str) -> Vec<Vec<Expression>> {
        vec![vec![Expression::new(field, op, value)]]
    }

    fn matched_names(def: &CompiledDefinition, view: &LibraryView) -> Vec<String> {
        Evaluator::new(def, view, now())
            .evaluate(2)
            .into_iter()
            .map(|m| m.item.name.clone())
            .collect()
    }

    fn movie(name: &str) -> MediaItem {
        MediaItem::new(MediaKind::Movie, name)
    }

    #[test]
    fn test_newer_than_three_months() {
        let mut recent = movie("recent");
        recent.release_date = now().checked_sub_months(Months::new(2));
        let mut old = movie("old");
        old.release_date = now().checked_sub_months(Months::new(4));
        let undated = movie("undated");

        let view = LibraryView::new(vec![recent, old, undated]);
        let def = definition(
            vec![MediaKind::Movie],
            one(Field::ReleaseDate, Operator::NewerThan, "3:months"),
        );
        assert_eq!(matched_names(&def, &view), vec!["recent"]);

        let def = definition(
            vec![MediaKind::Movie],
            one(Field::ReleaseDate, Operator::OlderThan, "3:months"),
        );
        assert_eq!(matched_names(&def, &view), vec!["old"]);
    }

    #[test]
    fn test_weekday_one_is_monday_any_year() {
        let mut a = movie("monday-2001");
        a.date_created = Some(Utc.with_ymd_and_hms(2001, 1, 1, 23, 59, 0).unwrap());
        let mut b = movie("monday-2024");
        b.date_created = Some(Utc.with_ymd_and_hms(2024, 6, 10, 0, 0, 1).unwrap());
        let mut c = movie("tuesday");
        c.date_created = Some(Utc.with_ymd_and_hms(2024, 6, 11, 8, 0, 0).unwrap());

        let view = LibraryView::new(vec![a, b, c]);
        let def = definition(
            vec![MediaKind::Movie],
            one(Field::DateCreated, Operator::Weekday, "1"),
        );
        assert_eq!(matched_names(&def, &view), vec!["monday-2001", "monday-2024"]);
    }

    #[test]
    fn test_absolute_dates_compare_calendar_days() {
        let mut a = movie("same-day");
        a.release_date = Some(Utc.with_ymd_and_hms(2020, 5, 1, 22, 0, 0).unwrap());
        let mut b = movie("later");
        b.release_date = Some(Utc.with_ymd_and_hms(2020, 5, 2, 0, 0, 0).unwrap());
        let view = LibraryView::new(vec![a, b]);

        let def = definition(
            vec![MediaKind::Movie],
            one(Field::ReleaseDate, Operator::Equal, "2020-05-01"),
        );
        assert_eq!(matched_names(&def, &view), vec!["same-day"]);

        let def = definition(
            vec![MediaKind::Movie],
            one(Field::ReleaseDate, Operator::After, "2020-05-01"),
        );
        assert_eq!(matched_names(&def, &view), vec!["later"]);
    }

    #[test]
    fn test_string_operators_are_case_insensitive() {
        let mut a = movie("The Dark Knight");
        a.official_rating = Some("PG-13".into());
        let b = movie("Heat");
        let view = LibraryView::new(vec![a, b]);

        let cases = [
            (Field::Name, Operator::Contains, "dark", vec!["The Dark Knight"]),
            (Field::Name, Operator::NotContains, "DARK", vec!["Heat"]),
            (Field::Name, Operator::IsIn, "heat;alien", vec!["Heat"]),
            (Field::Name, Operator::MatchRegex, "^the\\s", vec!["The Dark Knight"]),
            (Field::OfficialRating, Operator::Equal, "pg-13", vec!["The Dark Knight"]),
            // Absent rating is treated as empty
            (Field::OfficialRating, Operator::Equal, "", vec!["Heat"]),
            (Field::OfficialRating, Operator::NotContains, "r", vec!["The Dark Knight", "Heat"]),
            (Field::ItemType, Operator::Equal, "movie", vec!["The Dark Knight", "Heat"]),
        ];
        for (field, op, value, expected) in cases {
            let def = definition(vec![MediaKind::Movie], one(field, op, value));
            assert_eq!(
                matched_names(&def, &view),
                expected,
                "{:?} {:?} {:?}",
                field,
                op,
                value
            );
        }
    }

    #[test]
    fn test_numeric_absent_only_matches_not_equal() {
        let mut rated = movie("rated");
        rated.community_rating = Some(8.0);
        let unrated = movie("unrated");
        let view = LibraryView::new(vec![rated, unrated]);

        for (op, value, expected) in [
            (Operator::GreaterThanOrEqual, "8", vec!["rated"]),
            (Operator::LessThan, "8", vec![]),
            (Operator::Equal, "8", vec!["rated"]),
            (Operator::NotEqual, "5", vec!["rated", "unrated"]),
        ] {
            let def = definition(
                vec![MediaKind::Movie],
                one(Field::CommunityRating, op, value),
            );
            let expected: Vec<String> = expected.into_iter().map(String::from).collect();
            assert_eq!(matched_names(&def, &view), expected, "{:?}", op);
        }
    }

    #[test]
    fn test_user_scoped_fields_use_override_user() {
        let song = MediaItem::new(MediaKind::Audio, "song");
        let id = song.id;
        let mut def = Definition::new("favs", UserId::new(), vec![MediaKind::Audio]);
        let other = UserId::new();
        def.expression_sets = vec![ExpressionSet::new(vec![
            Expression::new(Field::IsFavorite, Operator::Equal, "true").for_user(other),
        ])];
        let def = def.compile().unwrap();

        let mut view = LibraryView::new(vec![song]);
        assert!(matched_names(&def, &view).is_empty());

        view.add_user_data(
            other,
            HashMap::from([(id, UserData { favorite: true, ..Default::default() })]),
        );
        assert_eq!(matched_names(&def, &view), vec!["song"]);
    }

    #[test]
    fn test_play_count_defaults_to_zero() {
        let song = MediaItem::new(MediaKind::Audio, "never played");
        let view = LibraryView::new(vec![song]);
        let def = definition(
            vec![MediaKind::Audio],
            one(Field::PlayCount, Operator::Equal, "0"),
        );
        assert_eq!(matched_names(&def, &view), vec!["never played"]);
    }

    fn series_with_episodes(n: u32) -> (MediaItem, Vec<MediaItem>) {
        let mut series = MediaItem::new(MediaKind::Series, "Show");
        series.tags = vec!["Anime".into()];
        series.collections = vec!["Favorites".into()];
        let episodes = (1..=n)
            .map(|i| {
                let mut ep = MediaItem::new(MediaKind::Episode, format!("Ep {}", i));
                ep.series_id = Some(series.id);
                ep.series_name = Some("Show".into());
                ep.season_number = Some(1);
                ep.episode_number = Some(i);
                ep
            })
            .collect();
        (series, episodes)
    }

    #[test]
    fn test_parent_series_tag_inheritance() {
        let (series, episodes) = series_with_episodes(2);
        let view = LibraryView::new(episodes).with_related(vec![series]);

        let plain = definition(
            vec![MediaKind::Episode],
            one(Field::Tags, Operator::Contains, "anime"),
        );
        assert!(matched_names(&plain, &view).is_empty());

        let inherit = definition(
            vec![MediaKind::Episode],
            vec![vec![
                Expression::new(Field::Tags, Operator::Contains, "anime")
                    .with_options(ExpressionOptions::INCLUDE_PARENT_SERIES_TAGS),
            ]],
        );
        assert_eq!(matched_names(&inherit, &view), vec!["Ep 1", "Ep 2"]);
    }

    #[test]
    fn test_collections_flags() {
        let (series, episodes) = series_with_episodes(1);
        let mut boxed = MediaItem::new(MediaKind::Collection, "Favorites");
        boxed.collections.clear();
        let mut member = movie("member");
        member.collections = vec!["Favorites".into()];

        let kinds = vec![MediaKind::Movie, MediaKind::Episode, MediaKind::Collection];
        let view = LibraryView::new(
            episodes
                .into_iter()
                .chain([boxed, member])
                .collect(),
        )
        .with_related(vec![series]);

        let members = definition(
            kinds.clone(),
            one(Field::Collections, Operator::IsIn, "favorites"),
        );
        assert_eq!(matched_names(&members, &view), vec!["member"]);

        let with_episodes = definition(
            kinds.clone(),
            vec![vec![
                Expression::new(Field::Collections, Operator::IsIn, "favorites")
                    .with_options(ExpressionOptions::INCLUDE_EPISODES_WITHIN_SERIES),
            ]],
        );
        assert_eq!(matched_names(&with_episodes, &view), vec!["Ep 1", "member"]);

        let only = definition(
            kinds,
            vec![vec![
                Expression::new(Field::Collections, Operator::IsIn, "favorites")
                    .with_options(ExpressionOptions::INCLUDE_COLLECTION_ONLY),
            ]],
        );
        assert_eq!(matched_names(&only, &view), vec!["Favorites"]);
    }

    #[test]
    fn test_next_unwatched() {
        let (series, episodes) = series_with_episodes(3);
        let (fresh_series, fresh_eps) = series_with_episodes(2);
        let owner = UserId::new();

        let mut def = Definition::new("next", owner, vec![MediaKind::Episode]);
        def.expression_sets = vec![ExpressionSet::new(vec![Expression::new(
            Field::NextUnwatched,
            Operator::Equal,
            "true",
        )])];
        let strict = def.compile().unwrap();
        def.expression_sets[0].expressions[0].options = ExpressionOptions::INCLUDE_UNWATCHED_SERIES;
        let lenient = def.compile().unwrap();

        let watched = episodes[0].id;
        let ids: Vec<ItemId> = episodes.iter().map(|e| e.id).collect();
        let mut view = LibraryView::new(episodes.into_iter().chain(fresh_eps).collect())
            .with_related(vec![series, fresh_series]);
        view.add_user_data(
            owner,
            HashMap::from([(watched, UserData { played: true, play_count: 1, ..Default::default() })]),
        );

        let got: Vec<ItemId> = Evaluator::new(&strict, &view, now())
            .evaluate(10)
            .iter()
            .map(|m| m.item.id)
            .collect();
        assert_eq!(got, vec![ids[1]]);

        // The untouched series now offers its first episode too
        assert_eq!(Evaluator::new(&lenient, &view, now()).evaluate(10).len(), 2);
    }

    #[test]
    fn test_audio_language_default_only() {
        let mut song = MediaItem::new(MediaKind::Audio, "dual");
        song.audio_streams = vec![
            AudioStream { language: Some("jpn".into()), is_default: true },
            AudioStream { language: Some("eng".into()), is_default: false },
        ];
        let view = LibraryView::new(vec![song]);

        let any = definition(
            vec![MediaKind::Audio],
            one(Field::AudioLanguages, Operator::IsIn, "eng"),
        );
        assert_eq!(matched_names(&any, &view), vec!["dual"]);

        let default_only = definition(
            vec![MediaKind::Audio],
            vec![vec![
                Expression::new(Field::AudioLanguages, Operator::IsIn, "eng")
                    .with_options(ExpressionOptions::ONLY_DEFAULT_AUDIO_LANGUAGE),
            ]],
        );
        assert!(matched_names(&default_only, &view).is_empty());
    }

    #[test]
    fn test_people_roles() {
        let mut m = movie("Heat");
        m.people = vec![
            Person { name: "Michael Mann".into(), role: PersonRole::Director },
            Person { name: "Al Pacino".into(), role: PersonRole::Actor },
        ];
        let view = LibraryView::new(vec![m]);

        let any = definition(
            vec![MediaKind::Movie],
            one(Field::People, Operator::Contains, "mann"),
        );
        assert_eq!(matched_names(&any, &view).len(), 1);

        let actors = definition(
            vec![MediaKind::Movie],
            one(Field::Actors, Operator::Contains, "mann"),
        );
        assert!(matched_names(&actors, &view).is_empty());

        let directors = definition(
            vec![MediaKind::Movie],
            one(Field::Directors, Operator::IsIn, "michael mann"),
        );
        assert_eq!(matched_names(&directors, &view).len(), 1);
    }

    #[test]
    fn test_resolution_comparisons() {
        let mut uhd = movie("uhd");
        uhd.video_height = Some(2160);
        let mut hd = movie("hd");
        hd.video_height = Some(720);
        let audio_only = movie("none");
        let view = LibraryView::new(vec![uhd, hd, audio_only]);

        let def = definition(
            vec![MediaKind::Movie],
            one(Field::Resolution, Operator::GreaterThanOrEqual, "1080p"),
        );
        assert_eq!(matched_names(&def, &view), vec!["uhd"]);
    }

    #[test]
    fn test_similar_to_excludes_anchor_and_scores() {
        let mut anchor = movie("Heat");
        anchor.genres = vec!["Crime".into(), "Thriller".into()];
        let mut close = movie("Ronin");
        close.genres = vec!["Crime".into(), "Thriller".into(), "Action".into()];
        let mut far = movie("Up");
        far.genres = vec!["Animation".into()];

        let view = LibraryView::new(vec![anchor, close, far]);
        let def = definition(
            vec![MediaKind::Movie],
            one(Field::SimilarTo, Operator::Equal, "heat"),
        );
        let evaluator = Evaluator::new(&def, &view, now());
        let matched = evaluator.evaluate(100);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].item.name, "Ronin");
        let score = matched[0].similarity.unwrap();
        assert!((score - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_pinned_items_bypass_rules_not_kinds() {
        let a = movie("pinned");
        let b = movie("other");
        let song = MediaItem::new(MediaKind::Audio, "wrong kind");
        let mut def = Definition::new("pins", UserId::new(), vec![MediaKind::Movie]);
        def.expression_sets = vec![ExpressionSet::new(vec![Expression::new(
            Field::Name,
            Operator::Equal,
            "nothing",
        )])];
        def.pinned = vec![a.id, song.id];
        let def = def.compile().unwrap();

        let view = LibraryView::new(vec![a, b, song]);
        assert_eq!(matched_names(&def, &view), vec!["pinned"]);
    }

    #[test]
    fn test_no_rule_groups_selects_only_pinned() {
        let a = movie("unpinned");
        let b = movie("pinned");
        let mut def = Definition::new("empty", UserId::new(), vec![MediaKind::Movie]);
        def.pinned = vec![b.id];
        let def = def.compile().unwrap();

        let view = LibraryView::new(vec![a, b]);
        assert_eq!(matched_names(&def, &view), vec!["pinned"]);

        let unpinned = definition(vec![MediaKind::Movie], vec![]);
        assert!(matched_names(&unpinned, &view).is_empty());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        /// Predicates whose truth on the fixed item below is known up front.
        fn pool() -> Vec<(Expression, bool)> {
            vec![
                (Expression::new(Field::Name, Operator::Contains, "prop"), true),
                (Expression::new(Field::Name, Operator::Equal, "nope"), false),
                (Expression::new(Field::Genres, Operator::IsIn, "rock;pop"), true),
                (Expression::new(Field::Genres, Operator::Contains, "jazz"), false),
                (Expression::new(Field::ProductionYear, Operator::GreaterThan, "1990"), true),
                (Expression::new(Field::ProductionYear, Operator::LessThan, "1990"), false),
                (Expression::new(Field::IsFavorite, Operator::Equal, "false"), true),
                (Expression::new(Field::IsPlayed, Operator::Equal, "true"), false),
            ]
        }

        fn item() -> MediaItem {
            let mut item = MediaItem::new(MediaKind::Audio, "Prop Song");
            item.genres = vec!["Rock".into()];
            item.production_year = Some(2001);
            item
        }

        proptest! {
            #[test]
            fn matches_is_or_of_and(
                groups in prop::collection::vec(prop::collection::vec(0usize..8, 0..4), 0..4)
            ) {
                let pool = pool();
                let mut def = Definition::new("p", UserId::new(), vec![MediaKind::Audio]);
                def.expression_sets = groups
                    .iter()
                    .map(|g| ExpressionSet::new(g.iter().map(|&i| pool[i].0.clone()).collect()))
                    .collect();
                let def = def.compile().unwrap();

                let expected = groups.iter().any(|g| g.iter().all(|&i| pool[i].1));

                let view = LibraryView::new(vec![item()]);
                let evaluator = Evaluator::new(&def, &view, now());
                prop_assert_eq!(evaluator.matches(&view.candidates()[0]), expected);
            }
        }
    }
}
