//! Column encodings shared by the SQL repositories.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use claimdesk_core::domain::booking::clock_time;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::RepositoryError;

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

pub(crate) fn get<'r, T>(row: &'r SqliteRow, column: &str) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(column).map_err(|error| RepositoryError::Decode(format!("{column}: {error}")))
}

pub(crate) fn enum_column<T>(
    row: &SqliteRow,
    column: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, RepositoryError> {
    let raw: String = get(row, column)?;
    parse(&raw).ok_or_else(|| RepositoryError::Decode(format!("{column}: unknown value `{raw}`")))
}

pub(crate) fn optional_enum_column<T>(
    row: &SqliteRow,
    column: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Option<T>, RepositoryError> {
    let raw: Option<String> = get(row, column)?;
    raw.map(|value| {
        parse(&value)
            .ok_or_else(|| RepositoryError::Decode(format!("{column}: unknown value `{value}`")))
    })
    .transpose()
}

pub(crate) fn timestamp(raw: &str, column: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("{column}: {error}")))
}

pub(crate) fn timestamp_column(
    row: &SqliteRow,
    column: &str,
) -> Result<DateTime<Utc>, RepositoryError> {
    let raw: String = get(row, column)?;
    timestamp(&raw, column)
}

pub(crate) fn optional_timestamp_column(
    row: &SqliteRow,
    column: &str,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    let raw: Option<String> = get(row, column)?;
    raw.map(|value| timestamp(&value, column)).transpose()
}

pub(crate) fn date(raw: &str, column: &str) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|error| RepositoryError::Decode(format!("{column}: {error}")))
}

pub(crate) fn date_column(row: &SqliteRow, column: &str) -> Result<NaiveDate, RepositoryError> {
    let raw: String = get(row, column)?;
    date(&raw, column)
}

pub(crate) fn optional_date_column(
    row: &SqliteRow,
    column: &str,
) -> Result<Option<NaiveDate>, RepositoryError> {
    let raw: Option<String> = get(row, column)?;
    raw.map(|value| date(&value, column)).transpose()
}

pub(crate) fn encode_date(value: NaiveDate) -> String {
    value.format(DATE_FORMAT).to_string()
}

pub(crate) fn time_column(row: &SqliteRow, column: &str) -> Result<NaiveTime, RepositoryError> {
    let raw: String = get(row, column)?;
    clock_time::parse(&raw)
        .ok_or_else(|| RepositoryError::Decode(format!("{column}: invalid time `{raw}`")))
}

pub(crate) fn decimal(raw: &str, column: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(raw).map_err(|error| RepositoryError::Decode(format!("{column}: {error}")))
}

pub(crate) fn decimal_column(row: &SqliteRow, column: &str) -> Result<Decimal, RepositoryError> {
    let raw: String = get(row, column)?;
    decimal(&raw, column)
}

pub(crate) fn optional_decimal_column(
    row: &SqliteRow,
    column: &str,
) -> Result<Option<Decimal>, RepositoryError> {
    let raw: Option<String> = get(row, column)?;
    raw.map(|value| decimal(&value, column)).transpose()
}

pub(crate) fn bool_column(row: &SqliteRow, column: &str) -> Result<bool, RepositoryError> {
    let raw: i64 = get(row, column)?;
    Ok(raw != 0)
}

pub(crate) fn u32_column(row: &SqliteRow, column: &str) -> Result<u32, RepositoryError> {
    let raw: i64 = get(row, column)?;
    u32::try_from(raw).map_err(|_| RepositoryError::Decode(format!("{column}: out of range {raw}")))
}

pub(crate) fn json_column<T: DeserializeOwned>(
    row: &SqliteRow,
    column: &str,
) -> Result<T, RepositoryError> {
    let raw: String = get(row, column)?;
    serde_json::from_str(&raw).map_err(|error| RepositoryError::Decode(format!("{column}: {error}")))
}

pub(crate) fn encode_json<T: Serialize>(value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|error| RepositoryError::Decode(error.to_string()))
}
