//! # Key-format rules for keyed events.
//!
//! A [`KeyRule`] decides whether an [`EventKey`] is acceptable for an event type.
//! The bus resolves the rule of a type once (from the first instance it validates)
//! and checks every later key against that cached rule.
//!
//! ## Rules
//! - Integer rules never accept string keys and vice versa.
//! - [`KeyRule::Pattern`] must match the **whole** key, not a substring.
//! - [`KeyRule::RangeWithStep`] with a non-positive step accepts only `min`.

use std::fmt;

use regex::Regex;

use super::event::EventKey;

/// Validation rule for the key of a keyed event.
#[derive(Clone)]
pub enum KeyRule {
    /// Integer key in `min..=max`.
    ItemsRange {
        /// Lowest accepted key.
        min: i64,
        /// Highest accepted key.
        max: i64,
    },
    /// Integer key in `min..=max` reachable from `min` in whole steps.
    ///
    /// `RangeWithStep { min: 25, max: 45, step: 10 }` accepts 25, 35 and 45.
    RangeWithStep {
        /// Lowest accepted key.
        min: i64,
        /// Highest accepted key.
        max: i64,
        /// Distance between two accepted keys.
        step: i64,
    },
    /// String key fully matching the pattern.
    Pattern(Regex),
    /// Key equal to one of the listed values.
    ExactValue(Vec<EventKey>),
}

impl KeyRule {
    /// Builds a [`KeyRule::Pattern`] from a regular expression source.
    ///
    /// The expression is anchored on both ends so that only full matches pass.
    pub fn pattern(source: &str) -> Result<Self, regex::Error> {
        Regex::new(&format!("^(?:{source})$")).map(KeyRule::Pattern)
    }

    /// Builds a [`KeyRule::ExactValue`] from anything convertible into keys.
    pub fn exact<I, K>(values: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<EventKey>,
    {
        KeyRule::ExactValue(values.into_iter().map(Into::into).collect())
    }

    /// Returns `true` if `key` satisfies this rule.
    pub fn is_valid(&self, key: &EventKey) -> bool {
        match (self, key) {
            (KeyRule::ItemsRange { min, max }, EventKey::Int(v)) => (*min..=*max).contains(v),
            (KeyRule::RangeWithStep { min, max, step }, EventKey::Int(v)) => {
                if !(*min..=*max).contains(v) {
                    return false;
                }
                if *step <= 0 {
                    return v == min;
                }
                v.abs_diff(*min) % step.unsigned_abs() == 0
            }
            (KeyRule::Pattern(re), EventKey::Str(s)) => re.is_match(s),
            (KeyRule::ExactValue(values), key) => values.contains(key),
            _ => false,
        }
    }
}

impl fmt::Debug for KeyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyRule::ItemsRange { min, max } => write!(f, "ItemsRange({min}..={max})"),
            KeyRule::RangeWithStep { min, max, step } => {
                write!(f, "RangeWithStep({min}..={max} step {step})")
            }
            KeyRule::Pattern(re) => write!(f, "Pattern({})", re.as_str()),
            KeyRule::ExactValue(values) => f.debug_tuple("ExactValue").field(values).finish(),
        }
    }
}

impl fmt::Display for KeyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
