//! Smart list definitions.
//!
//! A [`Definition`] is what users author and what gets persisted: rule
//! groups with raw string values, sort order, limits and a schedule.
//! [`Definition::compile`] validates it and parses every value, producing
//! a [`CompiledDefinition`] that the evaluator and the refresh pipeline
//! work from. Definitions that don't compile are never stored.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::model::{ItemId, MediaKind, TargetId, UserId};
use crate::ordering::SortSpec;
use crate::rules::{CompiledExpression, ExpressionSet, Field, ValidationError};
use crate::schedule::ScheduleSpec;

fn default_enabled() -> bool {
    true
}

/// A smart list as authored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    /// Target collection this definition materializes to
    pub id: TargetId,
    pub name: String,
    pub media_types: Vec<MediaKind>,
    /// OR of AND-groups
    #[serde(default)]
    pub expression_sets: Vec<ExpressionSet>,
    #[serde(default)]
    pub sort: SortSpec,
    /// `None` or `0` means unlimited
    #[serde(default)]
    pub max_items: Option<u32>,
    /// `None` or `0` means unlimited
    #[serde(default)]
    pub max_play_time_minutes: Option<u32>,
    /// The first owner is the primary user
    pub owners: Vec<UserId>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub schedule: ScheduleSpec,
    /// Default duration for new ignore entries; `None` is permanent
    #[serde(default)]
    pub default_ignore_days: Option<i32>,
    /// Items that are always members
    #[serde(default)]
    pub pinned: Vec<ItemId>,
}

impl Definition {
    /// A new enabled definition with no rules.
    pub fn new(name: impl Into<String>, owner: UserId, media_types: Vec<MediaKind>) -> Self {
        Self {
            id: TargetId::new(),
            name: name.into(),
            media_types,
            expression_sets: Vec::new(),
            sort: SortSpec::default(),
            max_items: None,
            max_play_time_minutes: None,
            owners: vec![owner],
            enabled: true,
            schedule: ScheduleSpec::None,
            default_ignore_days: None,
            pinned: Vec::new(),
        }
    }

    /// Validate and parse every rule value.
    pub fn compile(&self) -> Result<CompiledDefinition, ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        let Some(&owner) = self.owners.first() else {
            return Err(ValidationError::NoOwners);
        };
        if self.media_types.is_empty() {
            return Err(ValidationError::NoMediaTypes);
        }
        self.sort.validate()?;
        self.schedule.validate()?;

        let sets = self
            .expression_sets
            .iter()
            .enumerate()
            .map(|(set, group)| {
                group
                    .expressions
                    .iter()
                    .enumerate()
                    .map(|(index, expr)| {
                        expr.compile().map_err(|e| ValidationError::InExpression {
                            set,
                            index,
                            source: Box::new(e),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CompiledDefinition {
            pinned: self.pinned.iter().copied().collect(),
            definition: self.clone(),
            owner,
            sets,
        })
    }
}

/// A validated definition with parsed rule values.
#[derive(Debug, Clone)]
pub struct CompiledDefinition {
    definition: Definition,
    owner: UserId,
    sets: Vec<Vec<CompiledExpression>>,
    pinned: HashSet<ItemId>,
}

impl CompiledDefinition {
    pub fn definition(&self) -> &Definition {
        &self.definition
    }

    pub fn id(&self) -> TargetId {
        self.definition.id
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// User whose data drives user-scoped rules by default.
    pub fn primary_owner(&self) -> UserId {
        self.owner
    }

    pub fn owners(&self) -> &[UserId] {
        &self.definition.owners
    }

    pub fn sets(&self) -> &[Vec<CompiledExpression>] {
        &self.sets
    }

    /// Every expression across all groups.
    pub fn expressions(&self) -> impl Iterator<Item = &CompiledExpression> {
        self.sets.iter().flatten()
    }

    pub fn is_pinned(&self, item: ItemId) -> bool {
        self.pinned.contains(&item)
    }

    pub fn has_similarity(&self) -> bool {
        self.expressions().any(|e| e.field == Field::SimilarTo)
    }

    /// Whether evaluation needs episodes' parent series in the snapshot.
    pub fn needs_series(&self) -> bool {
        use crate::rules::ExpressionOptions as O;
        let inherit = O::INCLUDE_PARENT_SERIES_TAGS
            | O::INCLUDE_PARENT_SERIES_STUDIOS
            | O::INCLUDE_PARENT_SERIES_GENRES
            | O::INCLUDE_EPISODES_WITHIN_SERIES;
        self.definition.media_types.contains(&MediaKind::Episode)
            && self.expressions().any(|e| {
                e.options.intersects(inherit) || e.field == Field::SeriesName
            })
    }

    /// Every user whose per-user data the rules or sort keys read.
    pub fn users(&self) -> Vec<UserId> {
        let mut users = vec![self.owner];
        for expr in self.expressions() {
            if let Some(user) = expr.user_id
                && !users.contains(&user)
            {
                users.push(user);
            }
        }
        users
    }

    pub fn item_limit(&self) -> Option<usize> {
        self.definition
            .max_items
            .filter(|&n| n > 0)
            .map(|n| n as usize)
    }

    /// Play time cap in seconds.
    pub fn play_time_limit_secs(&self) -> Option<u64> {
        self.definition
            .max_play_time_minutes
            .filter(|&n| n > 0)
            .map(|n| u64::from(n) * 60)
    }
}

/// Compiled definitions by target, shared between the service and workers.
#[derive(Debug, Default)]
pub struct DefinitionRegistry {
    definitions: RwLock<HashMap<TargetId, Arc<CompiledDefinition>>>,
}

impl DefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace; returns the previous version.
    pub fn insert(&self, definition: CompiledDefinition) -> Option<Arc<CompiledDefinition>> {
        self.definitions
            .write()
            .insert(definition.id(), Arc::new(definition))
    }

    pub fn remove(&self, target: TargetId) -> Option<Arc<CompiledDefinition>> {
        self.definitions.write().remove(&target)
    }

    pub fn get(&self, target: TargetId) -> Option<Arc<CompiledDefinition>> {
        self.definitions.read().get(&target).cloned()
    }

    pub fn contains(&self, target: TargetId) -> bool {
        self.definitions.read().contains_key(&target)
    }

    /// Every definition, ordered by name.
    pub fn list(&self) -> Vec<Arc<CompiledDefinition>> {
        let mut all: Vec<_> = self.definitions.read().values().cloned().collect();
        all.sort_by(|a, b| a.name().cmp(b.name()).then(a.id().cmp(&b.id())));
        all
    }

    pub fn len(&self) -> usize {
        self.definitions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
