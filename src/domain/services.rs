//! Formula evaluation against the current cell records.
//!
//! The evaluator resolves each cell reference to the referenced record's
//! computed value and reduces the formula with the arithmetic parser. All
//! failures collapse to [`ERROR_SENTINEL`] at the string boundary.

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use super::errors::{CellError, CellResult};
use super::models::{CellId, CellRecord};
use super::parser::{parse_number_literal, Expr, ExpressionEvaluator, Parser, ReferenceResolver};

/// Computed value stored for any formula that fails to evaluate.
pub const ERROR_SENTINEL: &str = "#ERROR";

/// Evaluates formulas against a borrowed set of cell records.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeMap;
/// use gridcalc::domain::{CellId, CellRecord, FormulaEvaluator};
///
/// let mut cells = BTreeMap::new();
/// cells.insert("A1".parse::<CellId>().unwrap(), CellRecord::literal("2"));
///
/// let evaluator = FormulaEvaluator::new(&cells);
/// let c1: CellId = "C1".parse().unwrap();
/// assert_eq!(evaluator.evaluate("A1+3", c1), "5");
/// assert_eq!(evaluator.evaluate("C1+1", c1), "#ERROR");
/// ```
pub struct FormulaEvaluator<'a> {
    cells: &'a BTreeMap<CellId, CellRecord>,
}

impl<'a> FormulaEvaluator<'a> {
    pub fn new(cells: &'a BTreeMap<CellId, CellRecord>) -> Self {
        Self { cells }
    }

    /// Evaluates `formula` (without the leading `=`) on behalf of `self_id`.
    ///
    /// Returns the stringified number, or [`ERROR_SENTINEL`] when the formula
    /// references `self_id`, fails to parse, touches non-numeric text, or
    /// does not produce a finite number.
    pub fn evaluate(&self, formula: &str, self_id: CellId) -> String {
        match self.try_evaluate(formula, self_id) {
            Ok(value) => format_number(value),
            Err(err) => {
                debug!(cell = %self_id, formula, error = %err, "formula evaluation failed");
                ERROR_SENTINEL.to_string()
            }
        }
    }

    /// Like [`evaluate`](Self::evaluate) but keeps the failure reason.
    pub fn try_evaluate(&self, formula: &str, self_id: CellId) -> CellResult<f64> {
        let ast = parse_formula(formula)?;

        let self_ref = self_id.to_string();
        if ast.references().contains(&self_ref.as_str()) {
            return Err(CellError::CircularReference);
        }

        let value = ExpressionEvaluator::new(self).evaluate(&ast)?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(CellError::Evaluation(format!("result {value} is not a finite number")))
        }
    }

    /// Checks whether `formula`, placed in `current_cell`, would reach
    /// `current_cell` again by following the formulas of the cells it
    /// references.
    ///
    /// ```
    /// use std::collections::BTreeMap;
    /// use gridcalc::domain::{CellId, CellRecord, FormulaEvaluator};
    ///
    /// let a1: CellId = "A1".parse().unwrap();
    /// let b1: CellId = "B1".parse().unwrap();
    /// let mut cells = BTreeMap::new();
    /// cells.insert(a1, CellRecord {
    ///     raw_input: "=B1+1".to_string(),
    ///     formula: Some("B1+1".to_string()),
    ///     computed_value: "1".to_string(),
    ///     format: None,
    /// });
    ///
    /// let evaluator = FormulaEvaluator::new(&cells);
    /// assert!(evaluator.would_create_circular_reference("A1*2", b1));
    /// assert!(!evaluator.would_create_circular_reference("5", b1));
    /// ```
    pub fn would_create_circular_reference(&self, formula: &str, current_cell: CellId) -> bool {
        match parse_formula(formula) {
            Ok(ast) => self.check_circular_reference_in_ast(&ast, current_cell, &mut HashSet::new()),
            // Unparsable formulas evaluate to the sentinel anyway.
            Err(_) => false,
        }
    }

    fn check_circular_reference_in_ast(
        &self,
        expr: &Expr,
        target_cell: CellId,
        visited: &mut HashSet<CellId>,
    ) -> bool {
        for reference in expr.references() {
            let Ok(id) = reference.parse::<CellId>() else {
                continue;
            };
            if id == target_cell {
                return true;
            }
            // A cell explored once without reaching the target never will.
            if !visited.insert(id) {
                continue;
            }

            let nested = self
                .cells
                .get(&id)
                .and_then(|record| record.formula.as_deref())
                .and_then(|formula| parse_formula(formula).ok());

            if let Some(ast) = nested {
                if self.check_circular_reference_in_ast(&ast, target_cell, visited) {
                    return true;
                }
            }
        }
        false
    }
}

impl ReferenceResolver for FormulaEvaluator<'_> {
    /// Absent cells, empty values and references outside the grid count as 0.
    fn resolve(&self, reference: &str) -> CellResult<f64> {
        let Ok(id) = reference.parse::<CellId>() else {
            return Ok(0.0);
        };

        let value = match self.cells.get(&id) {
            Some(record) => record.computed_value.trim(),
            None => return Ok(0.0),
        };

        if value.is_empty() {
            return Ok(0.0);
        }

        parse_number_literal(value)
            .ok_or_else(|| CellError::Evaluation(format!("{reference} holds non-numeric value '{value}'")))
    }
}

/// Parses formula text (without the leading `=`).
pub fn parse_formula(formula: &str) -> CellResult<Expr> {
    Parser::new(formula)?.parse()
}

/// Renders a finite result the way the cell displays it.
///
/// Uses Rust's shortest round-trip decimal notation, which never switches to
/// exponent form: `1e21` renders as `1000000000000000000000` and `1e-7` as
/// `0.0000001`.
pub fn format_number(value: f64) -> String {
    if value == 0.0 {
        // Folds -0 into 0.
        return "0".to_string();
    }
    value.to_string()
}
