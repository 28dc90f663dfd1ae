//! Rule expressions as stored, and their compiled form.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use super::ValidationError;
use super::field::Field;
use super::operator::Operator;
use super::value::Value;
use crate::model::UserId;

bitflags! {
    /// Field-specific switches carried by an expression.
    ///
    /// Flags that don't apply to the expression's field are ignored.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ExpressionOptions: u16 {
        /// Episodes also match on their series' tags
        const INCLUDE_PARENT_SERIES_TAGS = 1 << 0;
        /// Episodes also match on their series' studios
        const INCLUDE_PARENT_SERIES_STUDIOS = 1 << 1;
        /// Episodes also match on their series' genres
        const INCLUDE_PARENT_SERIES_GENRES = 1 << 2;
        /// `Collections`: match the collection item, not its members
        const INCLUDE_COLLECTION_ONLY = 1 << 3;
        /// `Collections`: episodes match when their series is in the collection
        const INCLUDE_EPISODES_WITHIN_SERIES = 1 << 4;
        /// `NextUnwatched`: series nobody has started still offer their first episode
        const INCLUDE_UNWATCHED_SERIES = 1 << 5;
        /// `AudioLanguages`: only consider the default audio stream
        const ONLY_DEFAULT_AUDIO_LANGUAGE = 1 << 6;
    }
}

impl Default for ExpressionOptions {
    fn default() -> Self {
        Self::empty()
    }
}

/// Attribute sets compared by `SimilarTo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SimilarityField {
    Genre,
    Tags,
    Studios,
    Artists,
    AlbumArtists,
    Actors,
    Directors,
}

/// Comparison set used when an expression doesn't name one.
pub const DEFAULT_SIMILARITY_FIELDS: [SimilarityField; 2] =
    [SimilarityField::Genre, SimilarityField::Tags];

/// A single predicate as authored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    pub field: Field,
    pub operator: Operator,
    /// String-encoded operand, parsed when the definition is saved
    pub value: String,
    /// Evaluate user-scoped fields against this user instead of the owner
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "ExpressionOptions::is_empty")]
    pub options: ExpressionOptions,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub similarity_fields: Vec<SimilarityField>,
}

impl Expression {
    pub fn new(field: Field, operator: Operator, value: impl Into<String>) -> Self {
        Self {
            field,
            operator,
            value: value.into(),
            user_id: None,
            options: ExpressionOptions::empty(),
            similarity_fields: Vec::new(),
        }
    }

    pub fn with_options(mut self, options: ExpressionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn for_user(mut self, user: UserId) -> Self {
        self.user_id = Some(user);
        self
    }

    /// Check the operator against the field type and parse the value.
    pub fn compile(&self) -> Result<CompiledExpression, ValidationError> {
        let field_type = self.field.field_type();
        if !field_type.allows(self.operator) {
            return Err(ValidationError::InvalidOperator {
                field: self.field,
                operator: self.operator,
                field_type,
            });
        }

        let value = Value::parse(field_type, self.operator, &self.value).map_err(|reason| {
            ValidationError::InvalidValue {
                field: self.field,
                operator: self.operator,
                value: self.value.clone(),
                reason,
            }
        })?;

        let similarity_fields = if self.similarity_fields.is_empty() {
            DEFAULT_SIMILARITY_FIELDS.to_vec()
        } else {
            self.similarity_fields.clone()
        };

        Ok(CompiledExpression {
            field: self.field,
            operator: self.operator,
            value,
            user_id: self.user_id,
            options: self.options,
            similarity_fields,
        })
    }
}

/// An AND-group of expressions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpressionSet {
    pub expressions: Vec<Expression>,
}

impl ExpressionSet {
    pub fn new(expressions: Vec<Expression>) -> Self {
        Self { expressions }
    }
}

/// An expression with its operand already parsed.
#[derive(Debug, Clone)]
pub struct CompiledExpression {
    pub field: Field,
    pub operator: Operator,
    pub value: Value,
    pub user_id: Option<UserId>,
    pub options: ExpressionOptions,
    pub similarity_fields: Vec<SimilarityField>,
}
