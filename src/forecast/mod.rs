//! Forecast engine
//!
//! Rows → monthly buckets → contiguous monthly series → ARIMA → forecast.
//! Deterministic and free of I/O; every failure is a `ForecastError` value.

use crate::models::Row;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

pub mod arima;
pub use arima::{ArimaOrder, FittedArima};

/// Number of trailing historical points returned with a forecast
pub const HISTORY_POINTS: usize = 6;

/// Longest forecast, in months, the engine will produce
pub const MAX_FORECAST_HORIZON: usize = 120;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForecastError {
    #[error("No data returned for forecast")]
    NoData,

    #[error("Could not parse date {value} in row {row}")]
    InvalidDate { row: usize, value: String },

    #[error("Target column '{0}' not found in data")]
    ColumnNotFound(String),

    #[error("Forecast horizon must be between 1 and {max} months", max = MAX_FORECAST_HORIZON)]
    InvalidHorizon,

    #[error("ARIMA failed: {0}")]
    FitFailed(String),
}

/// Contiguous month-end indexed frame of summed numeric columns
#[derive(Debug, Clone)]
pub struct MonthlyFrame {
    months: Vec<NaiveDate>,
    columns: BTreeMap<String, Vec<f64>>,
}

impl MonthlyFrame {
    pub fn months(&self) -> &[NaiveDate] {
        &self.months
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }
}

/// Forecast output: trailing history plus relative-offset predictions
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastResult {
    pub history: Vec<(NaiveDate, f64)>,
    pub forecast: Vec<f64>,
}

impl ForecastResult {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl Serialize for ForecastResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        struct History<'a>(&'a [(NaiveDate, f64)]);
        struct Horizon<'a>(&'a [f64]);

        impl Serialize for History<'_> {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                let mut map = serializer.serialize_map(Some(self.0.len()))?;
                for (date, value) in self.0 {
                    map.serialize_entry(&date.format("%Y-%m-%d").to_string(), value)?;
                }
                map.end()
            }
        }

        impl Serialize for Horizon<'_> {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                let mut map = serializer.serialize_map(Some(self.0.len()))?;
                for (i, value) in self.0.iter().enumerate() {
                    map.serialize_entry(&format!("t+{}", i + 1), value)?;
                }
                map.end()
            }
        }

        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("history", &History(&self.history))?;
        map.serialize_entry("forecast", &Horizon(&self.forecast))?;
        map.end()
    }
}

/// Fixed-order forecasting over monthly buckets
#[derive(Debug, Clone, Copy, Default)]
pub struct ForecastEngine {
    order: ArimaOrder,
}

impl ForecastEngine {
    pub fn new(order: ArimaOrder) -> Self {
        Self { order }
    }

    pub fn order(&self) -> ArimaOrder {
        self.order
    }

    /// Forecast `horizon` months of `target` from rows whose first column is a date
    pub fn forecast(
        &self,
        rows: &[Row],
        target: &str,
        horizon: usize,
    ) -> Result<ForecastResult, ForecastError> {
        if horizon == 0 || horizon > MAX_FORECAST_HORIZON {
            return Err(ForecastError::InvalidHorizon);
        }

        let frame = monthly_frame(rows)?;

        let series = frame
            .column(target)
            .ok_or_else(|| ForecastError::ColumnNotFound(target.to_string()))?;

        let fitted = arima::fit(series, self.order)?;
        let forecast = fitted.forecast(horizon)?;

        let skip = frame.months.len().saturating_sub(HISTORY_POINTS);
        let history = frame
            .months
            .iter()
            .copied()
            .zip(series.iter().copied())
            .skip(skip)
            .collect();

        Ok(ForecastResult { history, forecast })
    }
}

/// Bucket rows by calendar month (summing numeric columns) and fill gaps with zero
pub fn monthly_frame(rows: &[Row]) -> Result<MonthlyFrame, ForecastError> {
    if rows.is_empty() {
        return Err(ForecastError::NoData);
    }

    let mut buckets: BTreeMap<(i32, u32), BTreeMap<String, f64>> = BTreeMap::new();
    let mut numeric_columns: BTreeSet<String> = BTreeSet::new();

    for (index, row) in rows.iter().enumerate() {
        let mut columns = row.iter();
        let Some((_, date_value)) = columns.next() else {
            return Err(ForecastError::InvalidDate {
                row: index,
                value: "<empty row>".to_string(),
            });
        };

        let date = parse_date(date_value).ok_or_else(|| ForecastError::InvalidDate {
            row: index,
            value: date_value.to_string(),
        })?;

        let bucket = buckets.entry((date.year(), date.month())).or_default();

        for (name, value) in columns {
            if let Some(number) = value.as_f64() {
                numeric_columns.insert(name.clone());
                *bucket.entry(name.clone()).or_insert(0.0) += number;
            }
        }
    }

    let (Some(&first), Some(&last)) = (buckets.keys().next(), buckets.keys().next_back()) else {
        return Err(ForecastError::NoData);
    };

    let mut months = Vec::new();
    let mut columns: BTreeMap<String, Vec<f64>> = numeric_columns
        .iter()
        .map(|name| (name.clone(), Vec::new()))
        .collect();

    let mut cursor = first;
    loop {
        let month_end = month_end(cursor.0, cursor.1).ok_or_else(|| ForecastError::InvalidDate {
            row: 0,
            value: format!("{}-{:02}", cursor.0, cursor.1),
        })?;
        months.push(month_end);

        let bucket = buckets.get(&cursor);
        for (name, values) in columns.iter_mut() {
            let value = bucket.and_then(|b| b.get(name)).copied().unwrap_or(0.0);
            values.push(value);
        }

        if cursor == last {
            break;
        }
        cursor = next_month(cursor);
    }

    Ok(MonthlyFrame { months, columns })
}

fn next_month((year, month): (i32, u32)) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

fn month_end(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = next_month((year, month));
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
}

/// Accepts ISO dates, datetimes (space or `T` separated), RFC 3339 and `YYYY-MM`
pub fn parse_date(value: &Value) -> Option<NaiveDate> {
    let text = value.as_str()?.trim();

    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.date_naive());
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt.date());
        }
    }
    NaiveDate::parse_from_str(&format!("{}-01", text), "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(date: &str, amount: f64) -> Row {
        let mut row = Row::new();
        row.insert("date".to_string(), json!(date));
        row.insert("amount".to_string(), json!(amount));
        row
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_empty_input_is_no_data() {
        let engine = ForecastEngine::default();
        assert_eq!(engine.forecast(&[], "amount", 3), Err(ForecastError::NoData));
    }

    #[test]
    fn test_same_month_entries_are_summed() {
        let rows = vec![
            row("2024-03-02", 100.0),
            row("2024-03-15", 50.0),
            row("2024-03-30", 25.0),
        ];
        let frame = monthly_frame(&rows).unwrap();
        assert_eq!(frame.months(), &[ymd(2024, 3, 31)]);
        assert_eq!(frame.column("amount").unwrap(), &[175.0]);
    }

    #[test]
    fn test_gaps_are_filled_with_zero() {
        let rows = vec![row("2023-11-05", 10.0), row("2024-02-20", 40.0)];
        let frame = monthly_frame(&rows).unwrap();
        assert_eq!(
            frame.months(),
            &[
                ymd(2023, 11, 30),
                ymd(2023, 12, 31),
                ymd(2024, 1, 31),
                ymd(2024, 2, 29)
            ]
        );
        assert_eq!(frame.column("amount").unwrap(), &[10.0, 0.0, 0.0, 40.0]);
    }

    #[test]
    fn test_unparseable_date_is_rejected() {
        let rows = vec![row("2024-01-01", 1.0), row("last tuesday", 2.0)];
        let err = monthly_frame(&rows).unwrap_err();
        assert!(matches!(err, ForecastError::InvalidDate { row: 1, .. }));
    }

    #[test]
    fn test_missing_target_column() {
        let rows = vec![
            row("2024-01-15", 1000.0),
            row("2024-02-10", 1200.0),
            row("2024-03-05", 900.0),
        ];
        let err = ForecastEngine::default()
            .forecast(&rows, "revenue", 2)
            .unwrap_err();
        assert_eq!(err, ForecastError::ColumnNotFound("revenue".to_string()));
        assert!(err.to_string().contains("'revenue'"));
    }

    #[test]
    fn test_three_month_scenario() {
        let rows = vec![
            row("2024-01-15", 1000.0),
            row("2024-02-10", 1200.0),
            row("2024-03-05", 900.0),
        ];
        let result = ForecastEngine::default().forecast(&rows, "amount", 2).unwrap();

        assert_eq!(
            result.history,
            vec![
                (ymd(2024, 1, 31), 1000.0),
                (ymd(2024, 2, 29), 1200.0),
                (ymd(2024, 3, 31), 900.0)
            ]
        );
        assert_eq!(result.forecast.len(), 2);
        assert!(result.forecast.iter().all(|v| v.is_finite()));

        let value = result.to_value();
        let history: Vec<&String> = value["history"].as_object().unwrap().keys().collect();
        assert_eq!(history, vec!["2024-01-31", "2024-02-29", "2024-03-31"]);
        let forecast: Vec<&String> = value["forecast"].as_object().unwrap().keys().collect();
        assert_eq!(forecast, vec!["t+1", "t+2"]);
    }

    #[test]
    fn test_horizon_and_history_bounds() {
        let rows: Vec<Row> = (1..=12)
            .map(|m| row(&format!("2023-{:02}-10", m), 100.0 + (m * m) as f64))
            .collect();
        let engine = ForecastEngine::default();

        for horizon in [1, 4, 12] {
            let result = engine.forecast(&rows, "amount", horizon).unwrap();
            assert_eq!(result.forecast.len(), horizon);
            assert_eq!(result.history.len(), HISTORY_POINTS);
            assert_eq!(result.history.last().unwrap().0, ymd(2023, 12, 31));

            let value = result.to_value();
            let keys: Vec<String> = value["forecast"].as_object().unwrap().keys().cloned().collect();
            let expected: Vec<String> = (1..=horizon).map(|i| format!("t+{}", i)).collect();
            assert_eq!(keys, expected);
        }
    }

    #[test]
    fn test_single_point_reports_fit_failure() {
        let rows = vec![row("2024-05-01", 300.0)];
        let err = ForecastEngine::default().forecast(&rows, "amount", 3).unwrap_err();
        assert!(matches!(err, ForecastError::FitFailed(_)));
    }

    #[test]
    fn test_zero_horizon_rejected() {
        let rows = vec![row("2024-05-01", 300.0)];
        assert_eq!(
            ForecastEngine::default().forecast(&rows, "amount", 0),
            Err(ForecastError::InvalidHorizon)
        );
    }

    #[test]
    fn test_oversized_horizon_rejected() {
        let rows = vec![
            row("2024-01-15", 1000.0),
            row("2024-02-10", 1200.0),
            row("2024-03-05", 900.0),
        ];
        let engine = ForecastEngine::default();

        assert_eq!(
            engine.forecast(&rows, "amount", MAX_FORECAST_HORIZON + 1),
            Err(ForecastError::InvalidHorizon)
        );
        assert_eq!(
            engine.forecast(&rows, "amount", usize::MAX),
            Err(ForecastError::InvalidHorizon)
        );
        assert_eq!(
            engine
                .forecast(&rows, "amount", MAX_FORECAST_HORIZON)
                .unwrap()
                .forecast
                .len(),
            MAX_FORECAST_HORIZON
        );
    }

    #[test]
    fn test_negative_amounts_do_not_crash() {
        let rows = vec![
            row("2024-01-15", -50.0),
            row("2024-02-10", 20.0),
            row("2024-03-05", -10.0),
            row("2024-04-05", 5.0),
        ];
        let result = ForecastEngine::default().forecast(&rows, "amount", 1).unwrap();
        assert_eq!(result.forecast.len(), 1);
    }

    #[test]
    fn test_date_formats() {
        assert_eq!(parse_date(&json!("2024-02-03")), Some(ymd(2024, 2, 3)));
        assert_eq!(parse_date(&json!("2024-02-03 10:11:12")), Some(ymd(2024, 2, 3)));
        assert_eq!(parse_date(&json!("2024-02-03T10:11:12")), Some(ymd(2024, 2, 3)));
        assert_eq!(parse_date(&json!("2024-02-03T10:11:12Z")), Some(ymd(2024, 2, 3)));
        assert_eq!(parse_date(&json!("2024-02")), Some(ymd(2024, 2, 1)));
        assert_eq!(parse_date(&json!(20240203)), None);
    }
}
