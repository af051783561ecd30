use thiserror::Error;

use super::models::CellId;

/// Errors raised while parsing identifiers or evaluating formulas.
///
/// Evaluation-time variants never leave [`CellStore::set_cell`](super::CellStore::set_cell);
/// the store turns them into the [`ERROR_SENTINEL`](super::ERROR_SENTINEL) value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CellError {
    #[error("Invalid cell reference: {0}")]
    InvalidCellId(String),

    #[error("Circular reference detected")]
    CircularReference,

    #[error("Formula evaluation error: {0}")]
    Evaluation(String),

    #[error("Invalid formula: {0}")]
    Parse(String),

    #[error("Cell {0} is empty")]
    EmptyCell(CellId),
}

pub type CellResult<T> = Result<T, CellError>;
