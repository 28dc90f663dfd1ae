//! Rule model and evaluation.
//!
//! # Architecture
//!
//! - **Field catalogue** (`field.rs`) - closed set of fields, their types and
//!   the legal operators per type, plus the read-only [`FieldSchema`]
//! - **Operators** (`operator.rs`)
//! - **Values** (`value.rs`) - raw strings parsed once into typed operands
//! - **Expressions** (`expression.rs`) - authored predicates and their
//!   compiled form
//! - **Context** (`context.rs`) - the library snapshot a run evaluates
//!   against, plus indexes derived from it
//! - **Evaluator** (`evaluator.rs`) - OR-of-AND membership test
//! - **Similarity** (`similarity.rs`) - attribute overlap scoring
//!
//! Validation happens when a definition is compiled. A compiled definition
//! can't contain an operator its field doesn't support or a value that
//! failed to parse, so evaluation itself never errors.

mod context;
mod evaluator;
mod expression;
mod field;
mod operator;
pub mod similarity;
mod value;

pub use context::{EvalContext, LibraryView};
pub use evaluator::{Evaluator, Matched};
pub use expression::{
    CompiledExpression, DEFAULT_SIMILARITY_FIELDS, Expression, ExpressionOptions, ExpressionSet,
    SimilarityField,
};
pub use field::{Field, FieldDescriptor, FieldSchema, FieldType};
pub use operator::Operator;
pub use value::{LIST_DELIMITER, RelativeSpan, ResolutionClass, TimeUnit, Value};

/// A definition or expression that can't be saved.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("operator {operator:?} is not valid for field {field:?} ({field_type:?})")]
    InvalidOperator {
        field: Field,
        operator: Operator,
        field_type: FieldType,
    },

    #[error("invalid value {value:?} for {field:?} {operator:?}: {reason}")]
    InvalidValue {
        field: Field,
        operator: Operator,
        value: String,
        reason: String,
    },

    #[error("rule group {set}, rule {index}: {source}")]
    InExpression {
        set: usize,
        index: usize,
        #[source]
        source: Box<ValidationError>,
    },

    #[error("definition name is empty")]
    EmptyName,

    #[error("definition has no owners")]
    NoOwners,

    #[error("definition has no media types")]
    NoMediaTypes,

    #[error("too many sort keys: {0} (at most 3)")]
    TooManySortKeys(usize),

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),
}
