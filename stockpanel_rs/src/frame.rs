//! Typed accessors between polars columns and plain Rust vectors.

use anyhow::{Context, Result, anyhow};
use chrono::{Datelike, NaiveDate};
use polars::prelude::*;

/// `NaiveDate::num_days_from_ce` of 1970-01-01; polars stores dates as days
/// since the Unix epoch.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

pub fn date_series(name: &str, dates: &[NaiveDate]) -> Result<Series> {
    let days: Vec<i32> = dates
        .iter()
        .map(|date| date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE)
        .collect();
    Series::new(name, days)
        .cast(&DataType::Date)
        .with_context(|| format!("Failed to build date column {name}"))
}

pub fn date_column(frame: &DataFrame, name: &str) -> Result<Vec<NaiveDate>> {
    let series = frame
        .column(name)
        .with_context(|| format!("Missing required column {name}"))?;
    if !matches!(series.dtype(), DataType::Date) {
        return Err(anyhow!(
            "Column {name} must be a date (got {:?})",
            series.dtype()
        ));
    }
    let days = series
        .cast(&DataType::Int32)
        .with_context(|| format!("Failed to read column {name} as day numbers"))?;
    let chunk = days
        .i32()
        .with_context(|| format!("Column {name} must be a date"))?;
    chunk
        .into_iter()
        .map(|opt| {
            let day = opt.ok_or_else(|| anyhow!("Column {name} contains nulls"))?;
            NaiveDate::from_num_days_from_ce_opt(day + UNIX_EPOCH_DAYS_FROM_CE)
                .ok_or_else(|| anyhow!("Column {name} holds out-of-range day {day}"))
        })
        .collect()
}

pub fn string_column(frame: &DataFrame, name: &str) -> Result<Vec<String>> {
    let series = frame
        .column(name)
        .with_context(|| format!("Missing required column {name}"))?;
    series
        .str()
        .with_context(|| format!("Column {name} must be text"))?
        .into_iter()
        .map(|opt| {
            opt.map(str::to_string)
                .ok_or_else(|| anyhow!("Column {name} contains nulls"))
        })
        .collect()
}

pub fn f64_column(frame: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let series = frame
        .column(name)
        .with_context(|| format!("Missing required column {name}"))?;
    series
        .f64()
        .with_context(|| format!("Column {name} must be float"))?
        .into_iter()
        .map(|opt| opt.ok_or_else(|| anyhow!("Column {name} contains nulls")))
        .collect()
}

pub fn optional_f64_column(frame: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let series = frame
        .column(name)
        .with_context(|| format!("Missing required column {name}"))?;
    Ok(series
        .f64()
        .with_context(|| format!("Column {name} must be float"))?
        .into_iter()
        .collect())
}

pub fn u64_column(frame: &DataFrame, name: &str) -> Result<Vec<u64>> {
    let series = frame
        .column(name)
        .with_context(|| format!("Missing required column {name}"))?;
    series
        .u64()
        .with_context(|| format!("Column {name} must be an unsigned integer"))?
        .into_iter()
        .map(|opt| opt.ok_or_else(|| anyhow!("Column {name} contains nulls")))
        .collect()
}

/// Read any numeric column as floats, keeping nulls. CSV inference may
/// hand back integers for whole-number prices or volumes.
pub fn numeric_values(series: &Series) -> Result<Vec<Option<f64>>> {
    match series.dtype() {
        DataType::Float64 => Ok(series
            .f64()
            .context("Failed to interpret as f64")?
            .into_iter()
            .collect()),
        DataType::Float32 => Ok(series
            .f32()
            .context("Failed to interpret as f32")?
            .into_iter()
            .map(|v| v.map(f64::from))
            .collect()),
        DataType::Int64 => Ok(series
            .i64()
            .context("Failed to interpret as i64")?
            .into_iter()
            .map(|v| v.map(|x| x as f64))
            .collect()),
        DataType::Int32 => Ok(series
            .i32()
            .context("Failed to interpret as i32")?
            .into_iter()
            .map(|v| v.map(f64::from))
            .collect()),
        DataType::UInt64 => Ok(series
            .u64()
            .context("Failed to interpret as u64")?
            .into_iter()
            .map(|v| v.map(|x| x as f64))
            .collect()),
        DataType::UInt32 => Ok(series
            .u32()
            .context("Failed to interpret as u32")?
            .into_iter()
            .map(|v| v.map(f64::from))
            .collect()),
        other => Err(anyhow!(
            "Unsupported numeric dtype for {}: {other:?}",
            series.name()
        )),
    }
}
