use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::info;

use super::columns::{CANCELLED, NAME, SPEND, USAGE};
use crate::core::{CompanyRecord, RecordSet};
use crate::error::ValidationError;

const NAME_ALIASES: &[&str] = &[NAME, "name"];
const SPEND_ALIASES: &[&str] = &[SPEND, "spend"];
const USAGE_ALIASES: &[&str] = &[USAGE, "usage"];
const CANCELLED_ALIASES: &[&str] = &[CANCELLED, "cancelled"];

pub fn read_records_from_path(path: &Path) -> Result<RecordSet, ValidationError> {
    let file = std::fs::File::open(path).map_err(csv::Error::from)?;
    let records = read_records(file)?;
    info!(path = %path.display(), rows = records.len(), "imported records");
    Ok(records)
}

pub fn read_records<R: Read>(input: R) -> Result<RecordSet, ValidationError> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(input);
    let headers = reader.headers()?.clone();

    let name_idx = require_column(&headers, NAME_ALIASES, NAME)?;
    let spend_idx = require_column(&headers, SPEND_ALIASES, SPEND)?;
    let usage_idx = require_column(&headers, USAGE_ALIASES, USAGE)?;
    let cancelled_idx = find_column(&headers, CANCELLED_ALIASES);

    let mut records = Vec::new();
    for (index, row) in reader.records().enumerate() {
        let row = row?;
        let row_number = index + 1;
        let name = required_field(&row, name_idx, row_number, NAME)?;
        let spend = parse_number(&row, spend_idx, row_number, SPEND)?;
        let usage = parse_number(&row, usage_idx, row_number, USAGE)?;
        let cancelled = match cancelled_idx {
            Some(idx) => parse_flag(&row, idx, row_number)?,
            None => false,
        };
        records.push(CompanyRecord {
            cancelled,
            ..CompanyRecord::new(name, spend, usage)
        });
    }

    RecordSet::new(records)
}

fn find_column(headers: &StringRecord, aliases: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| aliases.iter().any(|alias| h.trim().eq_ignore_ascii_case(alias)))
}

fn require_column(
    headers: &StringRecord,
    aliases: &[&str],
    column: &'static str,
) -> Result<usize, ValidationError> {
    find_column(headers, aliases).ok_or(ValidationError::MissingColumn { column })
}

fn required_field<'a>(
    row: &'a StringRecord,
    idx: usize,
    row_number: usize,
    column: &'static str,
) -> Result<&'a str, ValidationError> {
    match row.get(idx) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ValidationError::MissingField {
            row: row_number,
            column,
        }),
    }
}

fn parse_number(
    row: &StringRecord,
    idx: usize,
    row_number: usize,
    column: &'static str,
) -> Result<f64, ValidationError> {
    let raw = required_field(row, idx, row_number, column)?;
    let value = raw
        .parse::<f64>()
        .map_err(|_| ValidationError::Malformed {
            row: row_number,
            column,
            value: raw.to_string(),
            expected: "number",
        })?;
    if !value.is_finite() {
        return Err(ValidationError::NonFinite {
            row: row_number,
            column,
        });
    }
    Ok(value)
}

fn parse_flag(row: &StringRecord, idx: usize, row_number: usize) -> Result<bool, ValidationError> {
    let raw = row.get(idx).unwrap_or_default();
    match raw.to_ascii_lowercase().as_str() {
        "" | "false" | "no" | "n" | "0" => Ok(false),
        "true" | "yes" | "y" | "1" => Ok(true),
        _ => Err(ValidationError::Malformed {
            row: row_number,
            column: CANCELLED,
            value: raw.to_string(),
            expected: "boolean",
        }),
    }
}
