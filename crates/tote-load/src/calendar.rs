//! Calendar dimension (`dim_date`) generation.

use std::sync::Arc;

use chrono::{Datelike, NaiveDate};

use tote_core::arrow::array::{ArrayRef, Date32Array, Int32Array, RecordBatch, StringArray};
use tote_core::arrow::datatypes::{DataType, Field, Schema};
use tote_core::timestamp::date_to_days;

use crate::error::LoadError;

pub const DEFAULT_START: NaiveDate = NaiveDate::from_ymd_opt(2010, 1, 1).expect("valid date");
pub const DEFAULT_END: NaiveDate = NaiveDate::from_ymd_opt(2050, 12, 31).expect("valid date");

/// One row per day from `start` to `end`, both inclusive.
///
/// Columns: `date_id` (Date32), `year`, `month`, `day`, `day_of_week`
/// (ISO, Monday = 1), `day_name`, `month_name`, `quarter`.
pub fn dim_date(start: NaiveDate, end: NaiveDate) -> Result<RecordBatch, LoadError> {
    if start > end {
        return Err(LoadError::DateRange { start, end });
    }

    let dates: Vec<NaiveDate> = start.iter_days().take_while(|date| *date <= end).collect();
    let int_column = |f: fn(&NaiveDate) -> i32| -> ArrayRef {
        Arc::new(dates.iter().map(f).collect::<Int32Array>())
    };

    let schema = Arc::new(Schema::new(vec![
        Field::new("date_id", DataType::Date32, false),
        Field::new("year", DataType::Int32, false),
        Field::new("month", DataType::Int32, false),
        Field::new("day", DataType::Int32, false),
        Field::new("day_of_week", DataType::Int32, false),
        Field::new("day_name", DataType::Utf8, false),
        Field::new("month_name", DataType::Utf8, false),
        Field::new("quarter", DataType::Int32, false),
    ]));

    let columns: Vec<ArrayRef> = vec![
        Arc::new(Date32Array::from_iter_values(dates.iter().map(date_to_days))),
        int_column(|d| d.year()),
        int_column(|d| d.month() as i32),
        int_column(|d| d.day() as i32),
        int_column(|d| d.weekday().number_from_monday() as i32),
        Arc::new(StringArray::from_iter_values(
            dates.iter().map(|d| d.format("%A").to_string()),
        )),
        Arc::new(StringArray::from_iter_values(
            dates.iter().map(|d| d.format("%B").to_string()),
        )),
        int_column(|d| d.month0() as i32 / 3 + 1),
    ];

    Ok(RecordBatch::try_new(schema, columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tote_core::arrow::array::AsArray;
    use tote_core::arrow::datatypes::{Date32Type, Int32Type};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_range_is_inclusive() {
        let batch = dim_date(date(2024, 2, 27), date(2024, 3, 1)).unwrap();
        // 2024 is a leap year
        assert_eq!(batch.num_rows(), 4);

        let days = batch.column_by_name("day").unwrap().as_primitive::<Int32Type>();
        assert_eq!(days.values().to_vec(), vec![27, 28, 29, 1]);
    }

    #[test]
    fn test_single_day() {
        let batch = dim_date(date(2022, 11, 3), date(2022, 11, 3)).unwrap();
        assert_eq!(batch.num_rows(), 1);

        let ints = |name: &str| {
            batch
                .column_by_name(name)
                .unwrap()
                .as_primitive::<Int32Type>()
                .value(0)
        };
        let strings = |name: &str| {
            batch
                .column_by_name(name)
                .unwrap()
                .as_string::<i32>()
                .value(0)
                .to_string()
        };
        assert_eq!(ints("year"), 2022);
        assert_eq!(ints("month"), 11);
        assert_eq!(ints("day"), 3);
        assert_eq!(ints("day_of_week"), 4);
        assert_eq!(strings("day_name"), "Thursday");
        assert_eq!(strings("month_name"), "November");
        assert_eq!(ints("quarter"), 4);

        let date_id = batch
            .column_by_name("date_id")
            .unwrap()
            .as_primitive::<Date32Type>()
            .value(0);
        assert_eq!(date_id, date_to_days(&date(2022, 11, 3)));
    }

    #[test]
    fn test_quarters() {
        let batch = dim_date(date(2023, 1, 1), date(2023, 12, 31)).unwrap();
        let quarters = batch
            .column_by_name("quarter")
            .unwrap()
            .as_primitive::<Int32Type>();
        let months = batch.column_by_name("month").unwrap().as_primitive::<Int32Type>();
        for row in 0..batch.num_rows() {
            assert_eq!(quarters.value(row), (months.value(row) - 1) / 3 + 1);
        }
        assert_eq!(quarters.value(0), 1);
        assert_eq!(quarters.value(batch.num_rows() - 1), 4);
    }

    #[test]
    fn test_monday_is_one_and_sunday_is_seven() {
        // 2024-01-01 was a Monday
        let batch = dim_date(date(2024, 1, 1), date(2024, 1, 7)).unwrap();
        let weekdays = batch
            .column_by_name("day_of_week")
            .unwrap()
            .as_primitive::<Int32Type>();
        assert_eq!(weekdays.values().to_vec(), vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_default_range() {
        let batch = dim_date(DEFAULT_START, DEFAULT_END).unwrap();
        assert_eq!(batch.num_rows(), 14975);
    }

    #[test]
    fn test_inverted_range_is_rejected() {
        assert!(matches!(
            dim_date(date(2024, 1, 2), date(2024, 1, 1)),
            Err(LoadError::DateRange { .. })
        ));
    }
}
