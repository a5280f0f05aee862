//! Spend data models
//!
//! Amounts are carried as integer cents so that summing several sources never
//! accumulates floating point error; dollars only appear at the edges
//! (provider payloads, thresholds, messages).

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Convert a dollar amount to cents, rounding half away from zero
pub fn dollars_to_cents(dollars: f64) -> i64 {
    cents_from_fractional(dollars * 100.0)
}

/// Round a fractional cent amount to whole cents
pub fn cents_from_fractional(cents: f64) -> i64 {
    if cents.is_finite() {
        cents.round() as i64
    } else {
        0
    }
}

/// Convert cents to dollars
pub fn cents_to_dollars(cents: i64) -> f64 {
    cents as f64 / 100.0
}

/// Cost totals per provider-local calendar date, as returned by one source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostReport {
    days: BTreeMap<NaiveDate, i64>,
}

impl CostReport {
    /// Create an empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Add cents to a date, summing with any amount already present
    pub fn add(&mut self, date: NaiveDate, cents: i64) {
        let total = self.days.entry(date).or_insert(0);
        *total = total.saturating_add(cents);
    }

    /// Builder-style [`CostReport::add`]
    #[must_use]
    pub fn with_day(mut self, date: NaiveDate, cents: i64) -> Self {
        self.add(date, cents);
        self
    }

    /// Cost for a date, `None` when the provider has no entry for it yet
    pub fn cost_for(&self, date: NaiveDate) -> Option<i64> {
        self.days.get(&date).copied()
    }

    /// Number of dates in the report
    pub fn len(&self) -> usize {
        self.days.len()
    }

    /// Whether the report has no dates at all
    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Most recent date present
    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.days.keys().next_back().copied()
    }
}

/// One source's cost for one date, read fresh every cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostSample {
    /// Source that reported the amount
    pub source_id: String,
    /// Date of the bucket the amount was read from
    pub date: NaiveDate,
    /// Cost in cents
    pub amount_cents: i64,
}

/// Why a source contributed nothing to an aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapReason {
    /// The source answered but had no entry for the date yet
    NoEntryForDate,
    /// The call to the source failed
    FetchFailed,
}

/// A source that did not contribute to an aggregate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceGap {
    /// Source that contributed nothing
    pub source_id: String,
    /// Why it contributed nothing
    pub reason: GapReason,
}

/// Sum of today's spend across all sources of a guard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedSpend {
    /// The guard's "today"
    pub as_of_date: NaiveDate,
    /// Sum of every sample, in cents
    pub total_cents: i64,
    /// At least one source did not report for `as_of_date`
    pub degraded: bool,
    /// Successful per-source amounts
    pub samples: Vec<CostSample>,
    /// Sources that contributed nothing
    pub gaps: Vec<SourceGap>,
}

impl AggregatedSpend {
    /// Empty aggregate for a date
    pub fn empty(as_of_date: NaiveDate) -> Self {
        Self {
            as_of_date,
            total_cents: 0,
            degraded: false,
            samples: Vec::new(),
            gaps: Vec::new(),
        }
    }

    /// Record a successful sample
    pub fn push_sample(&mut self, sample: CostSample) {
        self.total_cents = self.total_cents.saturating_add(sample.amount_cents);
        self.samples.push(sample);
    }

    /// Record a source that contributed nothing
    pub fn push_gap(&mut self, source_id: impl Into<String>, reason: GapReason) {
        self.degraded = true;
        self.gaps.push(SourceGap {
            source_id: source_id.into(),
            reason,
        });
    }

    /// Total in dollars
    pub fn total_dollars(&self) -> f64 {
        cents_to_dollars(self.total_cents)
    }
}
