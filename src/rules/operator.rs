//! Rule operators.

use serde::{Deserialize, Serialize};

/// Comparison applied between an item attribute and a rule value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Equal,
    NotEqual,
    Contains,
    NotContains,
    IsIn,
    IsNotIn,
    MatchRegex,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
    /// Calendar date strictly after the value
    After,
    /// Calendar date strictly before the value
    Before,
    /// Date within the trailing relative window (`3:months`)
    NewerThan,
    /// Date older than the trailing relative window
    OlderThan,
    /// Day-of-week equality, `0` = Sunday
    Weekday,
}

impl Operator {
    pub const ALL: [Operator; 16] = [
        Operator::Equal,
        Operator::NotEqual,
        Operator::Contains,
        Operator::NotContains,
        Operator::IsIn,
        Operator::IsNotIn,
        Operator::MatchRegex,
        Operator::GreaterThan,
        Operator::LessThan,
        Operator::GreaterThanOrEqual,
        Operator::LessThanOrEqual,
        Operator::After,
        Operator::Before,
        Operator::NewerThan,
        Operator::OlderThan,
        Operator::Weekday,
    ];

    /// Negated operators match when the underlying test fails.
    pub fn is_negated(self) -> bool {
        matches!(
            self,
            Operator::NotEqual | Operator::NotContains | Operator::IsNotIn
        )
    }
}
