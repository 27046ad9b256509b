//! Threshold rules and the cached projection of user preferences.
//!
//! A [`ThresholdCache`] is an immutable snapshot built from the preference
//! store. The only state that changes inside a snapshot is each rule's
//! last trigger time, which implements debounce. It is never written back
//! to the store, and a new snapshot starts with every timer cleared.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use thingy_core::{ThresholdRule, ViolationKind};
//! use time::OffsetDateTime;
//!
//! let rule = ThresholdRule::new(Some(50.0), None, Duration::from_secs(60));
//! let now = OffsetDateTime::now_utc();
//!
//! let violation = rule.try_trigger(60.0, now).unwrap();
//! assert_eq!(violation.kind, ViolationKind::Exceeded);
//!
//! // Debounced for the next 60 seconds
//! assert!(rule.try_trigger(60.0, now).is_none());
//! ```

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use time::OffsetDateTime;

use thingy_types::{ContactInfo, MetricName, ThresholdSetting, UserPreferences};

/// Which bound a value violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    /// The value is above `max`.
    Exceeded,
    /// The value is below `min`.
    NotMet,
}

impl ViolationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::Exceeded => "exceeded",
            ViolationKind::NotMet => "not met",
        }
    }
}

/// A violated bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Violation {
    pub kind: ViolationKind,
    /// The bound that was violated.
    pub limit: f64,
}

/// A min/max bound on one metric plus its debounce window.
#[derive(Debug)]
pub struct ThresholdRule {
    pub max: Option<f64>,
    pub min: Option<f64>,
    /// Minimum time between two notifications for this rule.
    pub timeout: Duration,
    last_triggered: Mutex<Option<OffsetDateTime>>,
}

impl ThresholdRule {
    pub fn new(max: Option<f64>, min: Option<f64>, timeout: Duration) -> Self {
        Self {
            max,
            min,
            timeout,
            last_triggered: Mutex::new(None),
        }
    }

    pub fn from_setting(setting: &ThresholdSetting) -> Self {
        Self::new(
            setting.max,
            setting.min,
            Duration::from_secs(setting.timeout_seconds),
        )
    }

    /// When this rule last produced a notification.
    pub fn last_triggered(&self) -> Option<OffsetDateTime> {
        *self
            .last_triggered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Overwrite the last trigger time.
    pub fn set_last_triggered(&self, at: Option<OffsetDateTime>) {
        *self
            .last_triggered
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = at;
    }

    /// Compare `value` against the bounds, `max` first.
    pub fn check(&self, value: f64) -> Option<Violation> {
        if let Some(max) = self.max
            && value > max
        {
            return Some(Violation {
                kind: ViolationKind::Exceeded,
                limit: max,
            });
        }
        if let Some(min) = self.min
            && value < min
        {
            return Some(Violation {
                kind: ViolationKind::NotMet,
                limit: min,
            });
        }
        None
    }

    /// Whether the rule is inside its debounce window at `now`.
    pub fn is_debounced(&self, now: OffsetDateTime) -> bool {
        debounced(self.last_triggered(), self.timeout, now)
    }

    /// Check `value` and record a trigger at `now` if it violates a bound.
    ///
    /// Returns `None` without checking the value while the rule is
    /// debounced. The debounce check, the bound check and the update of the
    /// trigger time happen under one lock, so concurrent callers trigger the
    /// rule at most once per window.
    pub fn try_trigger(&self, value: f64, now: OffsetDateTime) -> Option<Violation> {
        let mut last = self
            .last_triggered
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if debounced(*last, self.timeout, now) {
            return None;
        }
        let violation = self.check(value)?;
        *last = Some(now);
        Some(violation)
    }
}

fn debounced(last: Option<OffsetDateTime>, timeout: Duration, now: OffsetDateTime) -> bool {
    match last {
        Some(last) => now - last < timeout,
        None => false,
    }
}

/// Rules compare by their bounds only; trigger times are ignored.
impl PartialEq for ThresholdRule {
    fn eq(&self, other: &Self) -> bool {
        self.max == other.max && self.min == other.min && self.timeout == other.timeout
    }
}

/// One user's thresholds as held in the cache.
#[derive(Debug, PartialEq)]
pub struct UserThresholds {
    pub name: String,
    pub contact: ContactInfo,
    rules: HashMap<String, ThresholdRule>,
}

impl UserThresholds {
    /// Project a store record. Returns `None` for users without thresholds.
    pub fn from_preferences(user: UserPreferences) -> Option<Self> {
        if !user.has_thresholds() {
            return None;
        }
        let rules = user
            .thresholds
            .iter()
            .map(|(metric, setting)| (metric.clone(), ThresholdRule::from_setting(setting)))
            .collect();
        Some(Self {
            name: user.name,
            contact: user.contact_data,
            rules,
        })
    }

    pub fn rule(&self, metric: MetricName) -> Option<&ThresholdRule> {
        self.rules.get(metric.as_str())
    }

    /// Number of configured rules, including ones for unknown metrics.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

/// A point-in-time snapshot of every user with at least one threshold.
///
/// Users keep the order the store returned them in.
#[derive(Debug, Default, PartialEq)]
pub struct ThresholdCache {
    users: Vec<UserThresholds>,
}

impl ThresholdCache {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a snapshot, skipping users without thresholds.
    pub fn from_users(users: Vec<UserPreferences>) -> Self {
        Self {
            users: users
                .into_iter()
                .filter_map(UserThresholds::from_preferences)
                .collect(),
        }
    }

    pub fn users(&self) -> &[UserThresholds] {
        &self.users
    }

    /// Users that have a rule for `metric`, in cache order.
    pub fn rules_for(
        &self,
        metric: MetricName,
    ) -> impl Iterator<Item = (&UserThresholds, &ThresholdRule)> {
        self.users
            .iter()
            .filter_map(move |user| user.rule(metric).map(|rule| (user, rule)))
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
