//! Header-addressed CSV tables with row-level validation.
//!
//! Source exports disagree on column casing (`BeginMp`, `RouteID`,
//! `2015_Tot_Flow_24h`), so every header is normalized to lower underscore
//! form before lookup. Values are pulled out per row with typed accessors
//! that report the dataset, row and column of anything malformed.

use csv::{ReaderBuilder, StringRecord, Trim};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

use crate::error::{PipelineError, Result};

/// Converts a column name to lower underscore form.
///
/// `RouteID` → `route_id`, `BeginMp` → `begin_mp`, `GEOID10` → `geoid10`.
pub fn normalize_column(name: &str) -> String {
    let chars: Vec<char> = name.trim().chars().collect();
    let mut out = String::with_capacity(chars.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next = chars.get(i + 1).copied();
            let acronym_end =
                prev.is_ascii_uppercase() && next.is_some_and(|n| n.is_ascii_lowercase());
            let word_start = prev.is_ascii_lowercase() || prev.is_ascii_digit();
            if acronym_end || word_start {
                out.push('_');
            }
        }
        match c {
            '-' | ' ' => out.push('_'),
            _ => out.push(c.to_ascii_lowercase()),
        }
    }
    out
}

/// A resolved column position.
#[derive(Debug, Clone)]
pub struct Column {
    name: String,
    index: usize,
}

/// An in-memory CSV table with normalized headers.
#[derive(Debug)]
pub struct Table {
    dataset: String,
    headers: HashMap<String, usize>,
    records: Vec<StringRecord>,
}

impl Table {
    pub fn from_path(dataset: &str, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(dataset, path = %path.display(), "Reading table");
        let file = File::open(path)?;
        Self::from_reader(dataset, file)
    }

    pub fn from_reader<R: Read>(dataset: &str, reader: R) -> Result<Self> {
        let mut rdr = ReaderBuilder::new().trim(Trim::All).from_reader(reader);

        let headers = rdr
            .headers()?
            .iter()
            .enumerate()
            .map(|(i, h)| (normalize_column(h), i))
            .collect();

        let mut records = Vec::new();
        for result in rdr.records() {
            records.push(result?);
        }

        debug!(dataset, rows = records.len(), "Table loaded");
        Ok(Self {
            dataset: dataset.to_string(),
            headers,
            records,
        })
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Resolves a column that must be present in the header.
    pub fn column(&self, name: &str) -> Result<Column> {
        self.optional_column(name)
            .ok_or_else(|| PipelineError::MissingColumn {
                dataset: self.dataset.clone(),
                column: normalize_column(name),
            })
    }

    pub fn optional_column(&self, name: &str) -> Option<Column> {
        let name = normalize_column(name);
        self.headers
            .get(&name)
            .map(|&index| Column { name, index })
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.records.iter().enumerate().map(|(i, record)| Row {
            dataset: &self.dataset,
            number: i + 1,
            record,
        })
    }
}

/// One data row; `number` is 1-based and excludes the header.
pub struct Row<'a> {
    dataset: &'a str,
    number: usize,
    record: &'a StringRecord,
}

impl<'a> Row<'a> {
    /// Returns the raw value, or `None` when the cell is empty.
    pub fn get(&self, column: &Column) -> Option<&'a str> {
        self.record
            .get(column.index)
            .filter(|v| !v.is_empty())
    }

    pub fn get_opt(&self, column: Option<&Column>) -> Option<&'a str> {
        column.and_then(|c| self.get(c))
    }

    pub fn required_str(&self, column: &Column) -> Result<&'a str> {
        self.get(column)
            .ok_or_else(|| self.invalid(column, "required value is missing"))
    }

    pub fn required_f64(&self, column: &Column) -> Result<f64> {
        let raw = self.required_str(column)?;
        self.parse_f64(column, raw)
    }

    /// Empty cells become `None`; anything present must be numeric.
    pub fn optional_f64(&self, column: Option<&Column>) -> Result<Option<f64>> {
        match column {
            Some(c) => self.get(c).map(|raw| self.parse_f64(c, raw)).transpose(),
            None => Ok(None),
        }
    }

    pub fn required_u32(&self, column: &Column) -> Result<u32> {
        let value = self.required_f64(column)?;
        if value < 0.0 || value.fract() != 0.0 || value > u32::MAX as f64 {
            return Err(self.invalid(column, format!("expected a whole number, got {value}")));
        }
        Ok(value as u32)
    }

    pub fn optional_u32(&self, column: Option<&Column>) -> Result<Option<u32>> {
        match column {
            Some(c) if self.get(c).is_some() => self.required_u32(c).map(Some),
            _ => Ok(None),
        }
    }

    fn parse_f64(&self, column: &Column, raw: &str) -> Result<f64> {
        match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(self.invalid(column, format!("expected a number, got '{raw}'"))),
        }
    }

    pub fn invalid(&self, column: &Column, message: impl Into<String>) -> PipelineError {
        PipelineError::validation(self.dataset, self.number, &column.name, message)
    }
}
