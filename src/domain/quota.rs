//! Per-position seat quotas and their resolution into capacities.
//!
//! A match declares its quotas as a small JSON object mapping position
//! codes to integer capacities, e.g. `{"gk":2,"player_front":12}`. The raw
//! text is converted into [`PositionQuotas`] once, where the match record
//! is loaded; [`QuotaResolver`] then answers "how many confirmed seats does
//! this position have" without ever touching JSON again.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::Position;

/// Typed quota configuration: position code → capacity.
///
/// Keys are kept as strings because the configuration may carry keys that
/// are not positions themselves, such as the generic `"player"` fallback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionQuotas(BTreeMap<String, u32>);

impl PositionQuotas {
    /// Creates an empty quota table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the table with `key` set to `capacity`.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, capacity: u32) -> Self {
        self.0.insert(key.into(), capacity);
        self
    }

    /// Declared capacity for `key`, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<u32> {
        self.0.get(key).copied()
    }

    /// Number of declared keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no key is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parses the stored JSON text.
    ///
    /// Blank text means "no configuration" and yields `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if the text is not an object of
    /// non-negative integers.
    pub fn parse(raw: &str) -> Result<Option<Self>, serde_json::Error> {
        if raw.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(raw).map(Some)
    }

    /// Lenient conversion used at the record-loading boundary.
    ///
    /// Absent, blank or malformed text all become `None` so that the
    /// resolver falls back to its defaults instead of failing a join.
    #[must_use]
    pub fn from_stored(raw: Option<&str>) -> Option<Self> {
        let raw = raw?;
        match Self::parse(raw) {
            Ok(quotas) => quotas,
            Err(err) => {
                tracing::warn!(error = %err, raw, "ignoring malformed position quotas");
                None
            }
        }
    }

    /// Serializes the table back to its stored JSON form.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Resolved number of confirmed seats for one (match, position).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capacity {
    /// At most this many confirmed bookings.
    Limited(u32),
    /// No limit is enforced.
    Unlimited,
}

impl Capacity {
    /// Returns `true` if one more booking fits next to `confirmed` ones.
    #[must_use]
    pub fn admits(self, confirmed: usize) -> bool {
        match self {
            Self::Limited(limit) => {
                usize::try_from(limit).map_or(true, |limit| confirmed < limit)
            }
            Self::Unlimited => true,
        }
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Limited(limit) => write!(f, "{limit}"),
            Self::Unlimited => f.write_str("unlimited"),
        }
    }
}

/// What to do when neither the position nor the generic key is declared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPositionPolicy {
    /// Never block: the position has no limit.
    #[default]
    Unlimited,
    /// Zero capacity: every join for the position is waitlisted.
    Blocked,
}

impl FromStr for MissingPositionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unlimited" => Ok(Self::Unlimited),
            "blocked" => Ok(Self::Blocked),
            other => Err(format!("unknown missing-position policy: {other}")),
        }
    }
}

/// Tunable fallbacks applied by [`QuotaResolver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaPolicy {
    /// Goalkeeper capacity when the match has no usable configuration.
    pub default_goalkeeper: u32,
    /// Capacity for every other position when there is no configuration.
    pub default_outfield: u32,
    /// Key consulted when the requested position is not declared.
    pub generic_key: String,
    /// Result when neither the position nor `generic_key` is declared.
    pub missing_position: MissingPositionPolicy,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            default_goalkeeper: 2,
            default_outfield: 15,
            generic_key: "player".to_string(),
            missing_position: MissingPositionPolicy::Unlimited,
        }
    }
}

/// Turns a match's quota configuration into a capacity per position.
///
/// Pure: the result depends only on the policy, the configuration and
/// the requested position.
#[derive(Debug, Clone, Default)]
pub struct QuotaResolver {
    policy: QuotaPolicy,
}

impl QuotaResolver {
    /// Creates a resolver applying `policy`.
    #[must_use]
    pub fn new(policy: QuotaPolicy) -> Self {
        Self { policy }
    }

    /// Returns the active policy.
    #[must_use]
    pub fn policy(&self) -> &QuotaPolicy {
        &self.policy
    }

    /// Resolves the capacity of `position` under `quotas`.
    #[must_use]
    pub fn capacity(&self, quotas: Option<&PositionQuotas>, position: Position) -> Capacity {
        let Some(quotas) = quotas else {
            return Capacity::Limited(if position.is_goalkeeper() {
                self.policy.default_goalkeeper
            } else {
                self.policy.default_outfield
            });
        };

        if let Some(declared) = quotas.get(position.code()) {
            return Capacity::Limited(declared);
        }
        if let Some(generic) = quotas.get(&self.policy.generic_key) {
            return Capacity::Limited(generic);
        }
        match self.policy.missing_position {
            MissingPositionPolicy::Unlimited => Capacity::Unlimited,
            MissingPositionPolicy::Blocked => Capacity::Limited(0),
        }
    }
}
