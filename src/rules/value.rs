//! Typed rule operands.
//!
//! Raw rule values are strings (`"3:months"`, `"Rock;Jazz"`, `"1080p"`).
//! They are parsed exactly once, when a definition is saved, into a
//! [`Value`]. The evaluator only ever sees the typed form.

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Duration, Months, NaiveDate, Utc, Weekday};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use super::field::FieldType;
use super::operator::Operator;

/// Separator for list values (`IsIn`/`IsNotIn`).
pub const LIST_DELIMITER: char = ';';

/// Unit of a relative date window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeUnit {
    Hours,
    Days,
    Weeks,
    Months,
    Years,
}

impl FromStr for TimeUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hour" | "hours" => Ok(TimeUnit::Hours),
            "day" | "days" => Ok(TimeUnit::Days),
            "week" | "weeks" => Ok(TimeUnit::Weeks),
            "month" | "months" => Ok(TimeUnit::Months),
            "year" | "years" => Ok(TimeUnit::Years),
            other => Err(format!("unknown time unit '{}'", other)),
        }
    }
}

/// A trailing window such as "3 months".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelativeSpan {
    pub count: u32,
    pub unit: TimeUnit,
}

impl RelativeSpan {
    /// The instant `count units` before `now`.
    ///
    /// Month and year arithmetic is calendar-aware and clamps to the end
    /// of shorter months.
    pub fn before(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let count = self.count;
        let shifted = match self.unit {
            TimeUnit::Hours => now.checked_sub_signed(Duration::hours(count as i64)),
            TimeUnit::Days => now.checked_sub_signed(Duration::days(count as i64)),
            TimeUnit::Weeks => now.checked_sub_signed(Duration::weeks(count as i64)),
            TimeUnit::Months => now.checked_sub_months(Months::new(count)),
            TimeUnit::Years => count
                .checked_mul(12)
                .and_then(|m| now.checked_sub_months(Months::new(m))),
        };
        shifted.unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl FromStr for RelativeSpan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (count, unit) = s
            .split_once(':')
            .ok_or_else(|| "expected 'count:unit'".to_string())?;
        let count = count
            .trim()
            .parse::<u32>()
            .map_err(|_| format!("'{}' is not a non-negative integer", count.trim()))?;
        Ok(Self {
            count,
            unit: unit.parse()?,
        })
    }
}

/// Vertical resolution class, ordered from lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResolutionClass {
    Sd,
    Hd720,
    Hd1080,
    Qhd1440,
    Uhd4k,
    Uhd8k,
}

impl ResolutionClass {
    /// Classify a video stream by its pixel height.
    pub fn from_height(height: u32) -> Self {
        match height {
            h if h >= 4320 => ResolutionClass::Uhd8k,
            h if h >= 2160 => ResolutionClass::Uhd4k,
            h if h >= 1440 => ResolutionClass::Qhd1440,
            h if h >= 1080 => ResolutionClass::Hd1080,
            h if h >= 720 => ResolutionClass::Hd720,
            _ => ResolutionClass::Sd,
        }
    }
}

impl FromStr for ResolutionClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sd" | "480p" | "576p" => Ok(ResolutionClass::Sd),
            "720p" | "hd" => Ok(ResolutionClass::Hd720),
            "1080p" | "fhd" => Ok(ResolutionClass::Hd1080),
            "1440p" | "qhd" => Ok(ResolutionClass::Qhd1440),
            "4k" | "2160p" | "uhd" => Ok(ResolutionClass::Uhd4k),
            "8k" | "4320p" => Ok(ResolutionClass::Uhd8k),
            other => Err(format!("unknown resolution '{}'", other)),
        }
    }
}

/// A parsed rule operand.
#[derive(Debug, Clone)]
pub enum Value {
    /// Lowercased text for case-insensitive comparison
    Text(String),
    /// Lowercased set of alternatives
    List(BTreeSet<String>),
    Pattern(Regex),
    Number(f64),
    Date(NaiveDate),
    Relative(RelativeSpan),
    Weekday(Weekday),
    Bool(bool),
    Resolution(ResolutionClass),
    /// Lowercased name used to pick similarity anchors
    Anchor(String),
}

impl Value {
    /// Parse a raw string for a (type, operator) pair.
    ///
    /// The caller must already have checked that the operator is legal
    /// for the type. The error string is a human-readable reason.
    pub fn parse(field_type: FieldType, op: Operator, raw: &str) -> Result<Value, String> {
        let raw = raw.trim();
        let allows_empty = field_type == FieldType::String
            && matches!(op, Operator::Equal | Operator::NotEqual);
        if raw.is_empty() && !allows_empty {
            return Err("value is empty".to_string());
        }

        match field_type {
            FieldType::String | FieldType::StringList | FieldType::PersonRole => match op {
                Operator::IsIn | Operator::IsNotIn => parse_list(raw),
                Operator::MatchRegex => parse_pattern(raw),
                _ => Ok(Value::Text(raw.to_lowercase())),
            },
            FieldType::Numeric => {
                let n: f64 = raw
                    .parse()
                    .map_err(|_| format!("'{}' is not a number", raw))?;
                if !n.is_finite() {
                    return Err(format!("'{}' is not a finite number", raw));
                }
                Ok(Value::Number(n))
            }
            FieldType::DateAbsolute => match op {
                Operator::NewerThan | Operator::OlderThan => raw.parse().map(Value::Relative),
                Operator::Weekday => parse_weekday(raw),
                _ => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .map(Value::Date)
                    .map_err(|e| format!("'{}' is not a YYYY-MM-DD date: {}", raw, e)),
            },
            FieldType::Boolean => match raw.to_ascii_lowercase().as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(format!("'{}' is not true/false", raw)),
            },
            FieldType::Resolution => raw.parse().map(Value::Resolution),
            FieldType::Similarity => Ok(Value::Anchor(raw.to_lowercase())),
        }
    }
}

fn parse_list(raw: &str) -> Result<Value, String> {
    let set: BTreeSet<String> = raw
        .split(LIST_DELIMITER)
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();
    if set.is_empty() {
        return Err("list has no entries".to_string());
    }
    Ok(Value::List(set))
}

/// Patterns are case-insensitive unless they open with their own inline
/// flag group such as `(?-i)` or `(?s)`.
fn parse_pattern(raw: &str) -> Result<Value, String> {
    let case_insensitive = !raw.starts_with("(?");
    RegexBuilder::new(raw)
        .case_insensitive(case_insensitive)
        .build()
        .map(Value::Pattern)
        .map_err(|e| format!("invalid regular expression: {}", e))
}

fn parse_weekday(raw: &str) -> Result<Value, String> {
    let day = match raw.parse::<u8>() {
        Ok(0) => Weekday::Sun,
        Ok(1) => Weekday::Mon,
        Ok(2) => Weekday::Tue,
        Ok(3) => Weekday::Wed,
        Ok(4) => Weekday::Thu,
        Ok(5) => Weekday::Fri,
        Ok(6) => Weekday::Sat,
        _ => return Err(format!("'{}' is not a weekday number 0-6", raw)),
    };
    Ok(Value::Weekday(day))
}
