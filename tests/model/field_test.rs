use semantic_sql::model::field::{
    DimensionGroupKind, DimensionType, DurationDimensionGroup, DurationUnit, Field, FieldType,
    MeasureSpec, MeasureType, TimeDatatype, TimeDimensionGroup, Timeframe,
};

fn dimension(name: &str) -> Field {
    Field {
        name: name.to_string(),
        view: "orders".to_string(),
        field_type: FieldType::Dimension {
            sql: "${TABLE}.sales_channel".to_string(),
            dimension_type: DimensionType::String,
        },
        required_access_grants: vec![],
    }
}

fn time_group(name: &str, timeframes: Vec<Timeframe>) -> Field {
    Field {
        name: name.to_string(),
        view: "orders".to_string(),
        field_type: FieldType::DimensionGroup {
            kind: DimensionGroupKind::Time(TimeDimensionGroup {
                sql: "${TABLE}.created_at".to_string(),
                timeframes,
                datatype: TimeDatatype::Timestamp,
                convert_timezone: true,
            }),
        },
        required_access_grants: vec![],
    }
}

fn duration_group(name: &str, intervals: Vec<DurationUnit>) -> Field {
    Field {
        name: name.to_string(),
        view: "orders".to_string(),
        field_type: FieldType::DimensionGroup {
            kind: DimensionGroupKind::Duration(DurationDimensionGroup {
                sql_start: "${TABLE}.view_date".to_string(),
                sql_end: "${TABLE}.order_date".to_string(),
                intervals,
            }),
        },
        required_access_grants: vec![],
    }
}

#[test]
fn field_id_is_view_dot_name() {
    let f = dimension("channel");
    assert_eq!(f.id(), "orders.channel");
}

#[test]
fn dimension_is_not_a_measure_or_group() {
    let f = dimension("channel");
    assert!(!f.is_measure());
    assert!(!f.is_dimension_group());
    assert!(f.expand_timeframes().is_empty());
}

#[test]
fn time_group_expands_one_name_per_timeframe() {
    let f = time_group("created", vec![Timeframe::Raw, Timeframe::Date, Timeframe::Week]);
    assert!(f.is_dimension_group());
    assert_eq!(
        f.expand_timeframes(),
        vec!["created_raw", "created_date", "created_week"]
    );
}

#[test]
fn duration_group_expands_one_name_per_interval() {
    let f = duration_group("days_waiting", vec![DurationUnit::Day, DurationUnit::Hour]);
    assert_eq!(f.expand_timeframes(), vec!["days_waiting_day", "days_waiting_hour"]);
}

#[test]
fn duration_unit_parse_rejects_millisecond() {
    // §4.1: an unsupported interval unit must not parse, so the caller can
    // surface AccessDeniedOrDoesNotExist instead of silently accepting it.
    assert!(DurationUnit::parse("millisecond").is_none());
    assert!(DurationUnit::parse("day").is_some());
}

#[test]
fn timeframe_round_trips_through_name_and_parse() {
    for tf in [
        Timeframe::Raw,
        Timeframe::Time,
        Timeframe::Date,
        Timeframe::Week,
        Timeframe::Month,
        Timeframe::Quarter,
        Timeframe::Year,
        Timeframe::DayOfWeek,
        Timeframe::DayOfMonth,
        Timeframe::HourOfDay,
    ] {
        assert_eq!(Timeframe::parse(tf.name()), Some(tf));
    }
}

#[test]
fn measure_spec_reports_as_measure() {
    let f = Field {
        name: "total_revenue".to_string(),
        view: "orders".to_string(),
        field_type: FieldType::Measure(MeasureSpec {
            measure_type: MeasureType::Sum,
            sql: Some("${TABLE}.revenue".to_string()),
            measure_ref: None,
            canon_date: None,
            is_merged_result: false,
            cumulative_window_days: None,
        }),
        required_access_grants: vec![],
    };
    assert!(f.is_measure());
    assert_eq!(f.measure_spec().unwrap().measure_type, MeasureType::Sum);
}
