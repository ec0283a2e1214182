//! Splitting a base query into sub-queries that each fit the search window.
//!
//! The search endpoint never returns more than 1000 hits for one query, no
//! matter how many match. A [`PartitionQueue`] probes the unsliced query
//! first and, when it overflows, replaces it with creation-date slices that
//! get finer (month, week, day) wherever a slice still overflows. Secondary
//! slices on size, stars and language run afterwards as a net for
//! repositories the date slices missed.

use std::collections::VecDeque;
use std::fmt;

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

/// How coarse a creation-date slice is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Month,
    Week,
    Day,
}

/// One restriction applied on top of a base query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Slice {
    /// The base query as-is.
    Root,
    /// Repositories created in `from..=to`.
    Created {
        from: NaiveDate,
        to: NaiveDate,
        granularity: Granularity,
    },
    /// A `size:` bucket in KB, e.g. `10..50`.
    Size(String),
    /// A `stars:` bucket, e.g. `>=100`.
    Stars(String),
    Language(String),
}

impl Slice {
    /// The qualifier appended to the base query, `None` for the root.
    pub fn qualifier(&self) -> Option<String> {
        match self {
            Slice::Root => None,
            Slice::Created { from, to, .. } if from == to => Some(format!("created:{}", from)),
            Slice::Created { from, to, .. } => Some(format!("created:{}..{}", from, to)),
            Slice::Size(bucket) => Some(format!("size:{}", bucket)),
            Slice::Stars(bucket) => Some(format!("stars:{}", bucket)),
            Slice::Language(lang) => Some(format!("language:{}", lang)),
        }
    }

    /// Size, stars and language slices.
    pub fn is_secondary(&self) -> bool {
        matches!(self, Slice::Size(_) | Slice::Stars(_) | Slice::Language(_))
    }
}

/// A base query restricted to one slice.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SearchPartition {
    pub base: String,
    pub slice: Slice,
}

impl SearchPartition {
    pub fn root(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            slice: Slice::Root,
        }
    }

    fn with_slice(&self, slice: Slice) -> Self {
        Self {
            base: self.base.clone(),
            slice,
        }
    }

    /// The query string sent to the search endpoint.
    pub fn query(&self) -> String {
        match self.slice.qualifier() {
            Some(q) => format!("{} {}", self.base, q),
            None => self.base.clone(),
        }
    }
}

impl fmt::Display for SearchPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.query())
    }
}

/// Tunables for partitioning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    /// Earliest creation date considered.
    pub epoch: NaiveDate,
    /// Hard result cap of one query.
    pub window_cap: u64,
    /// Fraction of the cap at which a slice is split.
    pub split_ratio: f64,
    pub size_buckets: Vec<String>,
    pub star_buckets: Vec<String>,
    pub languages: Vec<String>,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            epoch: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or(NaiveDate::MIN),
            window_cap: 1000,
            split_ratio: 0.9,
            size_buckets: [
                "<10",
                "10..50",
                "50..100",
                "100..200",
                "200..500",
                "500..1000",
                "1000..2000",
                "2000..5000",
                "5000..10000",
                "10000..20000",
                "20000..50000",
                ">50000",
            ]
            .map(String::from)
            .to_vec(),
            star_buckets: ["0", "1..4", "5..19", "20..99", ">=100"]
                .map(String::from)
                .to_vec(),
            languages: ["C", "Python", "Rust", "C++", "JavaScript"]
                .map(String::from)
                .to_vec(),
        }
    }
}

impl PartitionConfig {
    /// `total_count` at or above which a slice counts as overflowing.
    pub fn split_threshold(&self) -> u64 {
        let ratio = self.split_ratio.clamp(0.0, 1.0);
        ((self.window_cap as f64) * ratio).floor().max(1.0) as u64
    }
}

/// What to do with a partition after seeing its `total_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceVerdict {
    /// Below the threshold; drain it fully.
    Fits,
    /// Over the threshold and can be cut finer.
    Split,
    /// Over the threshold but already as fine as it gets; drain what the
    /// window allows.
    Overflow,
}

/// Lazy work queue of partitions for one base query.
///
/// Children are appended to the back, so partitions come out coarse to
/// fine. Secondary slices come out only after every date slice.
#[derive(Debug)]
pub struct PartitionQueue {
    config: PartitionConfig,
    today: NaiveDate,
    base: String,
    pending: VecDeque<SearchPartition>,
    secondary: VecDeque<SearchPartition>,
}

impl PartitionQueue {
    pub fn new(base: impl Into<String>, config: PartitionConfig, today: NaiveDate) -> Self {
        let base = base.into();
        let mut pending = VecDeque::new();
        pending.push_back(SearchPartition::root(base.clone()));
        Self {
            config,
            today,
            base,
            pending,
            secondary: VecDeque::new(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn config(&self) -> &PartitionConfig {
        &self.config
    }

    /// Partitions not yet handed out.
    pub fn remaining(&self) -> usize {
        self.pending.len() + self.secondary.len()
    }

    /// Classify a partition by its reported total.
    pub fn assess(&self, partition: &SearchPartition, total_count: u64) -> SliceVerdict {
        if total_count < self.config.split_threshold() {
            return SliceVerdict::Fits;
        }
        match &partition.slice {
            Slice::Root => SliceVerdict::Split,
            Slice::Created { granularity, .. } if *granularity != Granularity::Day => {
                SliceVerdict::Split
            }
            _ => SliceVerdict::Overflow,
        }
    }

    /// Replace an overflowing partition with its children.
    ///
    /// Returns how many partitions were queued. Splitting the root also
    /// queues the secondary slices.
    pub fn split(&mut self, partition: &SearchPartition) -> usize {
        match &partition.slice {
            Slice::Root => {
                let months = month_slices(self.config.epoch, self.today);
                let count = months.len();
                self.pending
                    .extend(months.into_iter().map(|s| partition.with_slice(s)));
                let secondary = self.secondary_slices();
                let extra = secondary.len();
                self.secondary
                    .extend(secondary.into_iter().map(|s| partition.with_slice(s)));
                count + extra
            }
            Slice::Created {
                from,
                to,
                granularity,
            } => {
                let children = match granularity {
                    Granularity::Month => week_slices(*from, *to),
                    Granularity::Week => day_slices(*from, *to),
                    Granularity::Day => Vec::new(),
                };
                let count = children.len();
                self.pending
                    .extend(children.into_iter().map(|s| partition.with_slice(s)));
                count
            }
            _ => 0,
        }
    }

    /// Secondary dimensions the base query does not already constrain.
    fn secondary_slices(&self) -> Vec<Slice> {
        let mut slices = Vec::new();
        if !self.base.contains("size:") {
            slices.extend(self.config.size_buckets.iter().cloned().map(Slice::Size));
        }
        if !self.base.contains("stars:") {
            slices.extend(self.config.star_buckets.iter().cloned().map(Slice::Stars));
        }
        if !self.base.contains("language:") {
            slices.extend(self.config.languages.iter().cloned().map(Slice::Language));
        }
        slices
    }
}

impl Iterator for PartitionQueue {
    type Item = SearchPartition;

    fn next(&mut self) -> Option<SearchPartition> {
        self.pending
            .pop_front()
            .or_else(|| self.secondary.pop_front())
    }
}

/// Calendar month slices covering `epoch..=today`, clipped at both ends.
pub fn month_slices(epoch: NaiveDate, today: NaiveDate) -> Vec<Slice> {
    let mut slices = Vec::new();
    if today < epoch {
        return slices;
    }
    let mut month_start = first_of_month(epoch);
    while month_start <= today {
        let next_month = month_start
            .checked_add_months(Months::new(1))
            .unwrap_or(NaiveDate::MAX);
        let month_end = next_month.pred_opt().unwrap_or(next_month);
        slices.push(Slice::Created {
            from: month_start.max(epoch),
            to: month_end.min(today),
            granularity: Granularity::Month,
        });
        if next_month == NaiveDate::MAX {
            break;
        }
        month_start = next_month;
    }
    slices
}

/// Week slices of a month slice: days 1-7, 8-14, 15-21, 22-28, 29-end,
/// clipped to `from..=to`.
pub fn week_slices(from: NaiveDate, to: NaiveDate) -> Vec<Slice> {
    let month_start = first_of_month(from);
    let mut slices = Vec::new();
    for start_day in [1u32, 8, 15, 22, 29] {
        let Some(start) = month_start.with_day(start_day) else {
            continue;
        };
        if start.month() != from.month() {
            continue;
        }
        let end = if start_day == 29 {
            last_of_month(start)
        } else {
            start.checked_add_days(Days::new(6)).unwrap_or(start)
        };
        let (lo, hi) = (start.max(from), end.min(to));
        if lo <= hi {
            slices.push(Slice::Created {
                from: lo,
                to: hi,
                granularity: Granularity::Week,
            });
        }
    }
    slices
}

/// One slice per day in `from..=to`.
pub fn day_slices(from: NaiveDate, to: NaiveDate) -> Vec<Slice> {
    from.iter_days()
        .take_while(|d| *d <= to)
        .map(|day| Slice::Created {
            from: day,
            to: day,
            granularity: Granularity::Day,
        })
        .collect()
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn last_of_month(date: NaiveDate) -> NaiveDate {
    first_of_month(date)
        .checked_add_months(Months::new(1))
        .and_then(|d| d.pred_opt())
        .unwrap_or(date)
}
