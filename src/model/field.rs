//! Fields: dimensions, dimension_groups, and measures (§3, §4.1).

use serde::{Deserialize, Serialize};

use crate::model::types::DataType;

/// Coarse field classification (§3 Field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    Dimension,
    DimensionGroup,
    Measure,
}

/// Dimension value type (`type` on a plain dimension).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DimensionType {
    String,
    Number,
    Yesno,
    Tier,
}

/// A timeframe produced by a `time`-typed dimension_group. Each timeframe
/// produces a derived field named `<group>_<timeframe>` (§3 Invariants).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    Raw,
    Time,
    Date,
    Week,
    Month,
    Quarter,
    Year,
    DayOfWeek,
    DayOfMonth,
    HourOfDay,
}

impl Timeframe {
    pub fn name(self) -> &'static str {
        match self {
            Timeframe::Raw => "raw",
            Timeframe::Time => "time",
            Timeframe::Date => "date",
            Timeframe::Week => "week",
            Timeframe::Month => "month",
            Timeframe::Quarter => "quarter",
            Timeframe::Year => "year",
            Timeframe::DayOfWeek => "day_of_week",
            Timeframe::DayOfMonth => "day_of_month",
            Timeframe::HourOfDay => "hour_of_day",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "raw" => Timeframe::Raw,
            "time" => Timeframe::Time,
            "date" => Timeframe::Date,
            "week" => Timeframe::Week,
            "month" => Timeframe::Month,
            "quarter" => Timeframe::Quarter,
            "year" => Timeframe::Year,
            "day_of_week" => Timeframe::DayOfWeek,
            "day_of_month" => Timeframe::DayOfMonth,
            "hour_of_day" => Timeframe::HourOfDay,
            _ => return None,
        })
    }

    /// `DATE_TRUNC`-style truncation unit for this timeframe, if any.
    pub fn trunc_unit(self) -> Option<&'static str> {
        match self {
            Timeframe::Date => Some("DAY"),
            Timeframe::Week => Some("WEEK"),
            Timeframe::Month => Some("MONTH"),
            Timeframe::Quarter => Some("QUARTER"),
            Timeframe::Year => Some("YEAR"),
            _ => None,
        }
    }
}

/// Interval unit for a `duration`-typed dimension_group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DurationUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl DurationUnit {
    pub fn name(self) -> &'static str {
        match self {
            DurationUnit::Second => "second",
            DurationUnit::Minute => "minute",
            DurationUnit::Hour => "hour",
            DurationUnit::Day => "day",
            DurationUnit::Week => "week",
            DurationUnit::Month => "month",
            DurationUnit::Quarter => "quarter",
            DurationUnit::Year => "year",
        }
    }

    /// Parse an interval name, rejecting units the spec names as
    /// unsupported (e.g. `millisecond`) with `None` so the caller can raise
    /// `CompileError::AccessDenied` (§4.1).
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "second" => DurationUnit::Second,
            "minute" => DurationUnit::Minute,
            "hour" => DurationUnit::Hour,
            "day" => DurationUnit::Day,
            "week" => DurationUnit::Week,
            "month" => DurationUnit::Month,
            "quarter" => DurationUnit::Quarter,
            "year" => DurationUnit::Year,
            _ => return None,
        })
    }
}

/// Underlying storage type for a time dimension_group's raw column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeDatatype {
    Timestamp,
    Datetime,
    Date,
}

impl Default for TimeDatatype {
    fn default() -> Self {
        TimeDatatype::Timestamp
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeDimensionGroup {
    pub sql: String,
    pub timeframes: Vec<Timeframe>,
    pub datatype: TimeDatatype,
    /// Default true (§4.1).
    pub convert_timezone: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurationDimensionGroup {
    pub sql_start: String,
    pub sql_end: String,
    pub intervals: Vec<DurationUnit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DimensionGroupKind {
    Time(TimeDimensionGroup),
    Duration(DurationDimensionGroup),
}

/// Measure aggregation type (§3 Field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeasureType {
    Count,
    CountDistinct,
    Sum,
    Average,
    Median,
    Max,
    Min,
    Number,
    Cumulative,
}

impl MeasureType {
    pub fn is_cumulative(self) -> bool {
        matches!(self, MeasureType::Cumulative)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureSpec {
    pub measure_type: MeasureType,
    /// `sql` for simple aggregates; for `number`/`cumulative` this is the
    /// expression referencing other measures via `${...}`.
    pub sql: Option<String>,
    /// For `cumulative`/`number` measures that wrap another measure: the
    /// referenced measure's bare name on the same view.
    pub measure_ref: Option<String>,
    /// Canonical date used when aligning metrics across merged buckets
    /// (§3, §4.7). `None` defaults to the home view's `default_date`.
    pub canon_date: Option<String>,
    /// Marks a measure as a merged-result (author-defined cross-component
    /// combination), decomposed into atomic measures before bucketing
    /// (§4.7 step 1).
    pub is_merged_result: bool,
    /// For `cumulative` measures: optionally bound the date spine join to a
    /// trailing window instead of an unbounded `<=` (§4.6 step 3, "optionally
    /// windowed (e.g., last-N-days)").
    pub cumulative_window_days: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldType {
    Dimension {
        sql: String,
        dimension_type: DimensionType,
    },
    DimensionGroup {
        kind: DimensionGroupKind,
    },
    Measure(MeasureSpec),
}

impl FieldType {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldType::Dimension { .. } => FieldKind::Dimension,
            FieldType::DimensionGroup { .. } => FieldKind::DimensionGroup,
            FieldType::Measure(_) => FieldKind::Measure,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub view: String,
    pub field_type: FieldType,
    /// Required access grants to select this field (§3 View / access).
    pub required_access_grants: Vec<String>,
}

impl Field {
    pub fn id(&self) -> String {
        format!("{}.{}", self.view, self.name)
    }

    pub fn is_measure(&self) -> bool {
        matches!(self.field_type, FieldType::Measure(_))
    }

    pub fn is_dimension_group(&self) -> bool {
        matches!(self.field_type, FieldType::DimensionGroup { .. })
    }

    /// For a `time` dimension_group field, the derived field names it
    /// expands to: `<name>_<timeframe>` for each declared timeframe.
    pub fn expand_timeframes(&self) -> Vec<String> {
        match &self.field_type {
            FieldType::DimensionGroup {
                kind: DimensionGroupKind::Time(t),
            } => t
                .timeframes
                .iter()
                .map(|tf| format!("{}_{}", self.name, tf.name()))
                .collect(),
            FieldType::DimensionGroup {
                kind: DimensionGroupKind::Duration(d),
            } => d
                .intervals
                .iter()
                .map(|u| format!("{}_{}", self.name, u.name()))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// The measure this field's type resolves to, if it is one.
    pub fn measure_spec(&self) -> Option<&MeasureSpec> {
        match &self.field_type {
            FieldType::Measure(m) => Some(m),
            _ => None,
        }
    }
}
