use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::{CellError, CellResult};

/// Number of addressable columns (A through Z).
pub const MAX_COLUMNS: usize = 26;

/// Address of a single cell: one column letter plus a 1-based row number.
///
/// Ordering is row-major (`A1 < B1 < A2`), which is also the order in which
/// the store scans records.
///
/// # Examples
///
/// ```
/// use gridcalc::domain::CellId;
///
/// let id: CellId = "B12".parse().unwrap();
/// assert_eq!(id.row_index(), 11);
/// assert_eq!(id.col_index(), 1);
/// assert_eq!(id.to_string(), "B12");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CellId {
    // Field order drives the derived row-major ordering.
    row: u32,
    col: u8,
}

impl CellId {
    /// Builds an identifier from zero-based grid coordinates.
    pub fn new(row: usize, col: usize) -> CellResult<Self> {
        if col >= MAX_COLUMNS {
            return Err(CellError::InvalidCellId(format!("column {} out of range", col + 1)));
        }
        let row = u32::try_from(row)
            .ok()
            .and_then(|r| r.checked_add(1))
            .ok_or_else(|| CellError::InvalidCellId(format!("row {row} out of range")))?;
        Ok(Self { row, col: col as u8 })
    }

    /// Zero-based row index.
    pub fn row_index(&self) -> usize {
        (self.row - 1) as usize
    }

    /// Zero-based column index.
    pub fn col_index(&self) -> usize {
        self.col as usize
    }

    /// Column header text for a zero-based column index, or `None` past
    /// the last addressable column.
    pub fn column_label(col: usize) -> Option<String> {
        (col < MAX_COLUMNS).then(|| char::from(b'A' + col as u8).to_string())
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", char::from(b'A' + self.col), self.row)
    }
}

impl FromStr for CellId {
    type Err = CellError;

    /// Strict parse: exactly one uppercase letter followed by a row number
    /// without sign or leading zeros.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CellError::InvalidCellId(s.to_string());

        let mut chars = s.chars();
        let letter = chars.next().filter(char::is_ascii_uppercase).ok_or_else(invalid)?;
        let digits = chars.as_str();

        if digits.is_empty() || digits.starts_with('0') || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let row = digits.parse::<u32>().map_err(|_| invalid())?;
        Ok(Self {
            row,
            col: letter as u8 - b'A',
        })
    }
}

impl TryFrom<String> for CellId {
    type Error = CellError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CellId> for String {
    fn from(id: CellId) -> Self {
        id.to_string()
    }
}

/// Horizontal text alignment of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

impl TextAlign {
    /// Next alignment in the left → center → right cycle.
    pub fn next(self) -> Self {
        match self {
            TextAlign::Left => TextAlign::Center,
            TextAlign::Center => TextAlign::Right,
            TextAlign::Right => TextAlign::Left,
        }
    }
}

/// Tag describing what kind of value a cell holds. Presentation only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Number,
    Text,
}

impl ValueKind {
    /// Classifies plain text: an optionally negative decimal is a number.
    pub fn classify(text: &str) -> Self {
        let body = text.strip_prefix('-').unwrap_or(text);
        let (int_part, frac_part) = match body.split_once('.') {
            Some((i, f)) => (i, Some(f)),
            None => (body, None),
        };
        let digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());

        let numeric = match frac_part {
            Some(frac) => !frac.is_empty() && digits(frac) && digits(int_part),
            None => !int_part.is_empty() && digits(int_part),
        };

        if numeric { ValueKind::Number } else { ValueKind::Text }
    }
}

/// Presentation attributes of a cell. Never affects evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CellFormat {
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub bold: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub italic: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub underline: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub align: Option<TextAlign>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<ValueKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
}

/// A single attribute change applied through [`CellFormat::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatChange {
    Bold(bool),
    Italic(bool),
    Underline(bool),
    Align(TextAlign),
    Kind(ValueKind),
    BackgroundColor(Option<String>),
    TextColor(Option<String>),
}

impl CellFormat {
    pub fn apply(&mut self, change: FormatChange) {
        match change {
            FormatChange::Bold(on) => self.bold = on,
            FormatChange::Italic(on) => self.italic = on,
            FormatChange::Underline(on) => self.underline = on,
            FormatChange::Align(align) => self.align = Some(align),
            FormatChange::Kind(kind) => self.kind = Some(kind),
            FormatChange::BackgroundColor(color) => self.background_color = color,
            FormatChange::TextColor(color) => self.text_color = color,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Stored state of a non-empty cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellRecord {
    /// Text exactly as entered, including a leading `=` for formulas.
    pub raw_input: String,
    /// Expression text without the leading `=`; present iff `raw_input` starts with `=`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    /// Evaluation result, or `raw_input` for literals.
    #[serde(default)]
    pub computed_value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<CellFormat>,
}

impl CellRecord {
    /// A literal (non-formula) record.
    pub fn literal(raw_input: impl Into<String>) -> Self {
        let raw_input = raw_input.into();
        Self {
            computed_value: raw_input.clone(),
            raw_input,
            formula: None,
            format: None,
        }
    }

    pub fn is_formula(&self) -> bool {
        self.formula.is_some()
    }

    pub fn display_value(&self) -> &str {
        &self.computed_value
    }
}
