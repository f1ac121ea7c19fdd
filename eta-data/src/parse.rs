//! CSV decoding of speed tables.
//!
//! Rows carry four header-less columns: region, day of week (Sunday = 0),
//! minute of day and speed in miles per hour. Any malformed row rejects the
//! whole table so that a partial upload never replaces a good one.

use std::io::Read;

use csv::{ReaderBuilder, StringRecord, Trim};
use eta_core::{RegionId, SpeedTable, SpeedTableError};
use thiserror::Error;

const COLUMNS: usize = 4;

/// Errors raised while decoding a CSV speed table.
#[derive(Debug, Error)]
pub enum SpeedTableParseError {
    /// The CSV reader itself failed, e.g. on invalid UTF-8 or I/O.
    #[error("line {line}: unreadable CSV record: {source}")]
    Csv {
        /// 1-based line number, or 0 when unknown.
        line: u64,
        /// Underlying reader error.
        #[source]
        source: csv::Error,
    },
    /// A row did not have exactly four columns.
    #[error("line {line}: expected 4 columns, found {found}")]
    ColumnCount {
        /// 1-based line number.
        line: u64,
        /// Number of columns present.
        found: usize,
    },
    /// A field could not be parsed as a number of the expected kind.
    #[error("line {line}: invalid {column} value {value:?}")]
    InvalidField {
        /// 1-based line number.
        line: u64,
        /// Column name.
        column: &'static str,
        /// Raw field text.
        value: String,
    },
    /// A field parsed but lies outside its permitted range.
    #[error("line {line}: {source}")]
    OutOfRange {
        /// 1-based line number.
        line: u64,
        /// Range violation reported by the table builder.
        #[source]
        source: SpeedTableError,
    },
}

impl SpeedTableParseError {
    /// 1-based line number the error refers to.
    #[must_use]
    pub fn line(&self) -> u64 {
        match self {
            Self::Csv { line, .. }
            | Self::ColumnCount { line, .. }
            | Self::InvalidField { line, .. }
            | Self::OutOfRange { line, .. } => *line,
        }
    }
}

/// Decode a speed table from CSV bytes.
///
/// # Examples
/// ```
/// use eta_core::TimeOfWeek;
/// use eta_data::parse_speed_table;
///
/// let table = parse_speed_table("1,2,480,20\n1, 2, 600, 25.5\n".as_bytes())?;
/// assert_eq!(table.speed_at(1, TimeOfWeek { day: 2, minute: 700 }), Some(25.5));
/// # Ok::<(), eta_data::SpeedTableParseError>(())
/// ```
///
/// # Errors
///
/// Returns [`SpeedTableParseError`] for the first malformed row.
pub fn parse_speed_table<R: Read>(reader: R) -> Result<SpeedTable, SpeedTableParseError> {
    let mut csv = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);
    let mut builder = SpeedTable::builder();
    let mut record = StringRecord::new();
    loop {
        match csv.read_record(&mut record) {
            Ok(true) => {}
            Ok(false) => break,
            Err(source) => {
                let line = source.position().map_or(0, csv::Position::line);
                return Err(SpeedTableParseError::Csv { line, source });
            }
        }
        let line = record.position().map_or(0, csv::Position::line);
        let row = Row::from_record(&record, line)?;
        builder
            .insert(row.region, row.day, row.minute, row.speed)
            .map_err(|source| SpeedTableParseError::OutOfRange { line, source })?;
    }
    Ok(builder.build())
}

struct Row {
    region: RegionId,
    day: u32,
    minute: u32,
    speed: f64,
}

impl Row {
    fn from_record(record: &StringRecord, line: u64) -> Result<Self, SpeedTableParseError> {
        if record.len() != COLUMNS {
            return Err(SpeedTableParseError::ColumnCount {
                line,
                found: record.len(),
            });
        }
        Ok(Self {
            region: field(record, 0, "region", line)?,
            day: field(record, 1, "day", line)?,
            minute: field(record, 2, "minute", line)?,
            speed: field(record, 3, "speed", line)?,
        })
    }
}

fn field<T: std::str::FromStr>(
    record: &StringRecord,
    index: usize,
    column: &'static str,
    line: u64,
) -> Result<T, SpeedTableParseError> {
    let raw = record.get(index).unwrap_or_default();
    raw.parse().map_err(|_| SpeedTableParseError::InvalidField {
        line,
        column,
        value: raw.to_owned(),
    })
}
