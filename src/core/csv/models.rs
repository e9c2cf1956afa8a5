use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the CSV engine. These are always client-input
/// problems, never remote-service failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("no data rows found in the supplied content")]
    NoData,
    #[error("invalid parse configuration: {0}")]
    InvalidConfig(String),
}

/// Field separator selection. `Auto` is resolved against the content
/// before tokenizing; the tokenizer only ever sees a concrete character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Delimiter {
    #[default]
    Auto,
    Comma,
    Semicolon,
    Tab,
    Pipe,
}

impl Delimiter {
    /// The concrete separator character, or `None` for `Auto`.
    pub fn as_char(self) -> Option<char> {
        match self {
            Delimiter::Auto => None,
            Delimiter::Comma => Some(','),
            Delimiter::Semicolon => Some(';'),
            Delimiter::Tab => Some('\t'),
            Delimiter::Pipe => Some('|'),
        }
    }
}

impl FromStr for Delimiter {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Delimiter::Auto),
            "," => Ok(Delimiter::Comma),
            ";" => Ok(Delimiter::Semicolon),
            "\t" | "tab" => Ok(Delimiter::Tab),
            "|" => Ok(Delimiter::Pipe),
            other => Err(ParseError::InvalidConfig(format!(
                "unsupported delimiter: {:?}",
                other
            ))),
        }
    }
}

/// How the first parsed row is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HeaderMode {
    /// First row becomes the header row and is written ahead of the data.
    #[default]
    Use,
    /// First row is discarded entirely.
    Skip,
    /// Every row is a data row.
    None,
}

/// Per-request parsing options. Requests never share one of these;
/// each call builds its own value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseConfig {
    pub delimiter: Delimiter,
    pub header_mode: HeaderMode,
    pub trim_whitespace: bool,
    pub skip_empty_rows: bool,
    pub preview_only: bool,
    pub preview_row_limit: usize,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            delimiter: Delimiter::Auto,
            header_mode: HeaderMode::Use,
            trim_whitespace: true,
            skip_empty_rows: true,
            preview_only: false,
            preview_row_limit: 10,
        }
    }
}

/// Structured result of parsing one CSV payload.
///
/// Ragged rows are kept at their own length; nothing is padded.
/// `sheet_data` is exactly what gets written to the destination grid:
/// the header row (when present) followed by the data rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTable {
    pub headers: Option<Vec<String>>,
    pub data_rows: Vec<Vec<String>>,
    pub sheet_data: Vec<Vec<String>>,
    pub delimiter_used: char,
    /// Total retained line count of the full input, even in preview mode.
    pub row_count_original: usize,
    /// Total data-row count of the full input, even in preview mode.
    pub row_count_data: usize,
    pub column_count: usize,
}
