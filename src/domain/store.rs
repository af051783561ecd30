//! In-memory cell store with synchronous dependency propagation.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::errors::{CellError, CellResult};
use super::models::{CellFormat, CellId, CellRecord, FormatChange};
use super::services::{parse_formula, FormulaEvaluator, ERROR_SENTINEL};

/// Serialized form of a store: identifier → record, in identifier order.
pub type SheetSnapshot = BTreeMap<CellId, CellRecord>;

/// Behavioural switches for a [`CellStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// When `true`, a formula whose references lead back to its own cell
    /// through other formulas evaluates to [`ERROR_SENTINEL`].
    ///
    /// When `false` only direct self-reference is detected. Propagation still
    /// terminates because each affected cell is recomputed once per edit, so
    /// members of a longer cycle keep the last value computed for them.
    pub detect_indirect_cycles: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            detect_indirect_cycles: true,
        }
    }
}

/// Holds every non-empty cell and keeps formula results consistent after
/// each single-cell mutation.
///
/// # Examples
///
/// ```
/// use gridcalc::domain::{CellId, CellStore};
///
/// let a1: CellId = "A1".parse().unwrap();
/// let b1: CellId = "B1".parse().unwrap();
/// let c1: CellId = "C1".parse().unwrap();
///
/// let mut store = CellStore::new();
/// store.set_cell(a1, "2");
/// store.set_cell(b1, "=A1*2");
/// store.set_cell(c1, "=B1+1");
/// assert_eq!(store.display_value(c1), "5");
///
/// store.set_cell(a1, "3");
/// assert_eq!(store.display_value(b1), "6");
/// assert_eq!(store.display_value(c1), "7");
/// ```
#[derive(Debug, Clone, Default)]
pub struct CellStore {
    cells: BTreeMap<CellId, CellRecord>,
    config: StoreConfig,
}

impl CellStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            cells: BTreeMap::new(),
            config,
        }
    }

    pub fn config(&self) -> StoreConfig {
        self.config
    }

    /// Rebuilds a store from a snapshot and recomputes every formula.
    ///
    /// Records without content are dropped and each record's `formula` is
    /// re-derived from its raw input, so a hand-edited snapshot cannot break
    /// the store's invariants.
    pub fn from_snapshot(snapshot: SheetSnapshot, config: StoreConfig) -> Self {
        let cells = snapshot
            .into_iter()
            .filter(|(_, record)| !record.raw_input.trim().is_empty())
            .map(|(id, mut record)| {
                record.formula = record.raw_input.strip_prefix('=').map(str::to_string);
                if record.formula.is_none() {
                    record.computed_value = record.raw_input.clone();
                }
                (id, record)
            })
            .collect();

        let mut store = Self { cells, config };
        store.recalculate_all();
        store
    }

    pub fn to_snapshot(&self) -> SheetSnapshot {
        self.cells.clone()
    }

    pub fn get(&self, id: CellId) -> Option<&CellRecord> {
        self.cells.get(&id)
    }

    pub fn contains(&self, id: CellId) -> bool {
        self.cells.contains_key(&id)
    }

    /// Text shown for a cell; empty when the cell has no record.
    pub fn display_value(&self, id: CellId) -> &str {
        self.cells.get(&id).map(CellRecord::display_value).unwrap_or("")
    }

    pub fn format(&self, id: CellId) -> Option<&CellFormat> {
        self.cells.get(&id).and_then(|record| record.format.as_ref())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Records in row-major identifier order.
    pub fn iter(&self) -> impl Iterator<Item = (&CellId, &CellRecord)> {
        self.cells.iter()
    }

    pub fn clear(&mut self) {
        self.cells.clear();
    }

    /// Applies an edit to `id` and propagates it to every dependent formula.
    ///
    /// Blank input removes the record. Input starting with `=` is stored as a
    /// formula and evaluated; anything else is stored verbatim. Evaluation
    /// failures store [`ERROR_SENTINEL`] and are never returned. An existing
    /// format survives the edit.
    ///
    /// Returns the stored record, or `None` when the cell was cleared.
    pub fn set_cell(&mut self, id: CellId, raw_input: &str) -> Option<&CellRecord> {
        if raw_input.trim().is_empty() {
            if self.cells.remove(&id).is_some() {
                debug!(cell = %id, "cleared cell");
            }
            self.propagate(id);
            return None;
        }

        let format = self.cells.get(&id).and_then(|record| record.format.clone());
        let record = match raw_input.strip_prefix('=') {
            Some(formula) => CellRecord {
                raw_input: raw_input.to_string(),
                formula: Some(formula.to_string()),
                computed_value: self.evaluate_cell(formula, id),
                format,
            },
            None => CellRecord {
                format,
                ..CellRecord::literal(raw_input)
            },
        };

        debug!(cell = %id, raw = raw_input, value = %record.computed_value, "set cell");
        self.cells.insert(id, record);
        self.propagate(id);
        self.cells.get(&id)
    }

    /// Evaluates formula text on behalf of `self_id` against the current
    /// records. Only direct self-reference is treated as circular here.
    pub fn evaluate(&self, formula: &str, self_id: CellId) -> String {
        FormulaEvaluator::new(&self.cells).evaluate(formula, self_id)
    }

    /// Changes one presentation attribute of an existing cell.
    pub fn set_format(&mut self, id: CellId, change: FormatChange) -> CellResult<()> {
        let record = self.cells.get_mut(&id).ok_or(CellError::EmptyCell(id))?;
        record.format.get_or_insert_with(CellFormat::default).apply(change);
        Ok(())
    }

    /// Puts a previously captured record (or its absence) back at `id`.
    ///
    /// The raw input goes through [`set_cell`](Self::set_cell) so the value is
    /// re-evaluated in place and dependents are updated; the captured format
    /// then replaces whatever format the cell had.
    pub fn restore(&mut self, id: CellId, snapshot: Option<CellRecord>) {
        match snapshot {
            Some(record) => {
                self.set_cell(id, &record.raw_input);
                if let Some(current) = self.cells.get_mut(&id) {
                    current.format = record.format;
                }
            }
            None => {
                self.set_cell(id, "");
            }
        }
    }

    /// Recomputes every formula, dependencies first.
    pub fn recalculate_all(&mut self) {
        let formula_cells: Vec<CellId> = self
            .cells
            .iter()
            .filter(|(_, record)| record.is_formula())
            .map(|(id, _)| *id)
            .collect();

        let mut done = BTreeSet::new();
        let mut in_progress = BTreeSet::new();
        for id in formula_cells {
            self.recalculate_cell(id, &mut done, &mut in_progress);
        }
        debug!(cells = done.len(), "recalculated all formulas");
    }

    fn recalculate_cell(&mut self, id: CellId, done: &mut BTreeSet<CellId>, in_progress: &mut BTreeSet<CellId>) {
        if done.contains(&id) || in_progress.contains(&id) {
            return;
        }
        let Some(formula) = self.cells.get(&id).and_then(|record| record.formula.clone()) else {
            done.insert(id);
            return;
        };

        in_progress.insert(id);
        if let Ok(ast) = parse_formula(&formula) {
            for reference in ast.references() {
                if let Ok(dependency) = reference.parse::<CellId>() {
                    self.recalculate_cell(dependency, done, in_progress);
                }
            }
        }

        let computed = self.evaluate_cell(&formula, id);
        if let Some(record) = self.cells.get_mut(&id) {
            record.computed_value = computed;
        }
        in_progress.remove(&id);
        done.insert(id);
    }

    /// Evaluation as performed for a stored cell, honouring the cycle policy.
    fn evaluate_cell(&self, formula: &str, id: CellId) -> String {
        let evaluator = FormulaEvaluator::new(&self.cells);
        if self.config.detect_indirect_cycles && evaluator.would_create_circular_reference(formula, id) {
            debug!(cell = %id, formula, "circular reference");
            return ERROR_SENTINEL.to_string();
        }
        evaluator.evaluate(formula, id)
    }

    /// Recomputes every formula that depends on `changed`, directly or
    /// through other formulas. Each affected cell is evaluated once, after
    /// the affected cells it reads from.
    fn propagate(&mut self, changed: CellId) {
        let affected = self.dependents_of(changed);
        if affected.is_empty() {
            return;
        }

        let mut done: BTreeSet<CellId> = self
            .cells
            .keys()
            .filter(|id| !affected.contains(*id))
            .copied()
            .collect();
        let mut in_progress = BTreeSet::new();
        for id in &affected {
            self.recalculate_cell(*id, &mut done, &mut in_progress);
        }
        debug!(cell = %changed, dependents = affected.len(), "propagated change");
    }

    /// Every formula cell that reaches `changed` through its references,
    /// excluding `changed` itself.
    fn dependents_of(&self, changed: CellId) -> BTreeSet<CellId> {
        let mut readers: BTreeMap<CellId, Vec<CellId>> = BTreeMap::new();
        for (id, record) in &self.cells {
            let Some(formula) = &record.formula else {
                continue;
            };
            let Ok(ast) = parse_formula(formula) else {
                continue;
            };
            for reference in ast.references() {
                if let Ok(dependency) = reference.parse::<CellId>() {
                    readers.entry(dependency).or_default().push(*id);
                }
            }
        }

        let mut affected = BTreeSet::new();
        let mut pending = vec![changed];
        while let Some(cell) = pending.pop() {
            for reader in readers.get(&cell).into_iter().flatten() {
                if *reader != changed && affected.insert(*reader) {
                    pending.push(*reader);
                }
            }
        }
        affected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::services::format_number;
    use crate::domain::{TextAlign, ValueKind};
    use pretty_assertions::assert_eq;

    fn id(text: &str) -> CellId {
        text.parse().unwrap()
    }

    fn value(store: &CellStore, cell: &str) -> String {
        store.display_value(id(cell)).to_string()
    }

    #[test]
    fn test_literal_is_stored_verbatim() {
        let mut store = CellStore::new();
        let record = store.set_cell(id("A1"), "  hello world ").unwrap();

        assert_eq!(record.raw_input, "  hello world ");
        assert_eq!(record.computed_value, "  hello world ");
        assert!(record.formula.is_none());
    }

    #[test]
    fn test_formula_is_evaluated() {
        let mut store = CellStore::new();
        store.set_cell(id("A1"), "2");
        store.set_cell(id("B1"), "3");
        let record = store.set_cell(id("C1"), "=A1+B1").unwrap();

        assert_eq!(record.raw_input, "=A1+B1");
        assert_eq!(record.formula.as_deref(), Some("A1+B1"));
        assert_eq!(record.computed_value, "5");
    }

    #[test]
    fn test_clear_removes_record() {
        let mut store = CellStore::new();
        store.set_cell(id("A1"), "2");

        assert!(store.set_cell(id("A1"), "   ").is_none());
        assert!(store.get(id("A1")).is_none());
        assert_eq!(store.display_value(id("A1")), "");
        assert!(store.is_empty());
    }

    #[test]
    fn test_missing_reference_counts_as_zero() {
        let mut store = CellStore::new();
        store.set_cell(id("B1"), "=A1+5");
        assert_eq!(value(&store, "B1"), "5");
    }

    #[test]
    fn test_self_reference_is_error_and_isolated() {
        let mut store = CellStore::new();
        store.set_cell(id("A1"), "7");
        store.set_cell(id("B1"), "=A1*2");

        store.set_cell(id("C1"), "=C1+1");

        assert_eq!(value(&store, "C1"), ERROR_SENTINEL);
        assert_eq!(value(&store, "A1"), "7");
        assert_eq!(value(&store, "B1"), "14");
    }

    #[test]
    fn test_transitive_propagation() {
        let mut store = CellStore::new();
        store.set_cell(id("A1"), "2");
        store.set_cell(id("B1"), "=A1*2");
        store.set_cell(id("C1"), "=B1+1");
        assert_eq!(value(&store, "B1"), "4");
        assert_eq!(value(&store, "C1"), "5");

        store.set_cell(id("A1"), "3");

        assert_eq!(value(&store, "B1"), "6");
        assert_eq!(value(&store, "C1"), "7");
    }

    #[test]
    fn test_clearing_propagates_zero() {
        let mut store = CellStore::new();
        store.set_cell(id("A1"), "4");
        store.set_cell(id("B1"), "=A1+1");

        store.set_cell(id("A1"), "");

        assert_eq!(value(&store, "B1"), "1");
    }

    #[test]
    fn test_error_sentinel_propagates_to_dependents() {
        let mut store = CellStore::new();
        store.set_cell(id("A1"), "1");
        store.set_cell(id("B1"), "=A1*10");
        store.set_cell(id("C1"), "=B1+1");

        store.set_cell(id("A1"), "oops");

        assert_eq!(value(&store, "B1"), ERROR_SENTINEL);
        assert_eq!(value(&store, "C1"), ERROR_SENTINEL);

        store.set_cell(id("A1"), "2");
        assert_eq!(value(&store, "C1"), "21");
    }

    #[test]
    fn test_token_match_does_not_confuse_prefixes() {
        let mut store = CellStore::new();
        store.set_cell(id("A10"), "5");
        store.set_cell(id("B1"), "=A10*2");
        assert_eq!(value(&store, "B1"), "10");

        store.set_cell(id("A1"), "100");
        assert_eq!(value(&store, "B1"), "10");
    }

    #[test]
    fn test_diamond_dependencies_end_consistent() {
        let mut store = CellStore::new();
        store.set_cell(id("A1"), "1");
        store.set_cell(id("B1"), "=A1+1");
        store.set_cell(id("C1"), "=A1*10");
        store.set_cell(id("D1"), "=B1+C1");
        assert_eq!(value(&store, "D1"), "12");

        store.set_cell(id("A1"), "2");

        assert_eq!(value(&store, "B1"), "3");
        assert_eq!(value(&store, "C1"), "20");
        assert_eq!(value(&store, "D1"), "23");
    }

    #[test]
    fn test_shared_dependencies_recompute_each_cell_once() {
        let mut store = CellStore::new();
        store.set_cell(id("A1"), "1");
        store.set_cell(id("A2"), "1");
        for row in 3..=40 {
            store.set_cell(id(&format!("A{row}")), &format!("=A{}+A{}", row - 2, row - 1));
        }

        let started = std::time::Instant::now();
        store.set_cell(id("A1"), "2");
        assert!(started.elapsed() < std::time::Duration::from_secs(2));

        let (mut previous, mut current) = (2.0_f64, 1.0_f64);
        for row in 3..=40 {
            (previous, current) = (current, previous + current);
            assert_eq!(value(&store, &format!("A{row}")), format_number(current), "A{row}");
        }
    }

    #[test]
    fn test_deeply_nested_formula_is_error() {
        let mut store = CellStore::new();
        let deep = format!("={}1{}", "(".repeat(100_000), ")".repeat(100_000));
        store.set_cell(id("A1"), &deep);
        assert_eq!(value(&store, "A1"), ERROR_SENTINEL);

        store.set_cell(id("B1"), &format!("={}", vec!["2"; 100_000].join("*")));
        assert_eq!(value(&store, "B1"), ERROR_SENTINEL);
    }

    #[test]
    fn test_infinity_text_is_not_numeric() {
        let mut store = CellStore::new();
        store.set_cell(id("A1"), "inf");
        store.set_cell(id("B1"), "=1/A1");
        assert_eq!(value(&store, "B1"), ERROR_SENTINEL);

        store.set_cell(id("A2"), "Infinity");
        store.set_cell(id("B2"), "=5-1/A2");
        assert_eq!(value(&store, "B2"), ERROR_SENTINEL);

        store.set_cell(id("A1"), "4");
        assert_eq!(value(&store, "B1"), "0.25");
    }

    #[test]
    fn test_two_cell_cycle_terminates_with_error() {
        let mut store = CellStore::new();
        store.set_cell(id("A1"), "=B1+1");
        assert_eq!(value(&store, "A1"), "1");

        store.set_cell(id("B1"), "=A1+1");
        assert_eq!(value(&store, "A1"), ERROR_SENTINEL);
        assert_eq!(value(&store, "B1"), ERROR_SENTINEL);

        store.set_cell(id("C1"), "=A1*2");
        assert_eq!(value(&store, "C1"), ERROR_SENTINEL);

        // Breaking the cycle recovers every member.
        store.set_cell(id("A1"), "5");
        assert_eq!(value(&store, "B1"), "6");
        assert_eq!(value(&store, "C1"), "10");
    }

    #[test]
    fn test_three_cell_cycle_terminates_with_error() {
        let mut store = CellStore::new();
        store.set_cell(id("A1"), "=C1+1");
        store.set_cell(id("B1"), "=A1+1");
        store.set_cell(id("C1"), "=B1+1");

        for cell in ["A1", "B1", "C1"] {
            assert_eq!(value(&store, cell), ERROR_SENTINEL, "{cell}");
        }
    }

    #[test]
    fn test_direct_only_policy_still_terminates() {
        let mut store = CellStore::with_config(StoreConfig {
            detect_indirect_cycles: false,
        });
        store.set_cell(id("A1"), "=B1+1");
        store.set_cell(id("B1"), "=A1+1");

        // B1 saw A1 = 1, then A1 was recomputed once from B1 = 2.
        assert_eq!(value(&store, "B1"), "2");
        assert_eq!(value(&store, "A1"), "3");

        store.set_cell(id("C1"), "=C1");
        assert_eq!(value(&store, "C1"), ERROR_SENTINEL);
    }

    #[test]
    fn test_format_survives_edit_and_is_dropped_on_clear() {
        let mut store = CellStore::new();
        store.set_cell(id("A1"), "1");
        store.set_format(id("A1"), FormatChange::Bold(true)).unwrap();
        store.set_format(id("A1"), FormatChange::Align(TextAlign::Right)).unwrap();

        store.set_cell(id("A1"), "=2*3");
        let format = store.format(id("A1")).unwrap();
        assert!(format.bold);
        assert_eq!(format.align, Some(TextAlign::Right));

        store.set_cell(id("A1"), "");
        store.set_cell(id("A1"), "1");
        assert!(store.format(id("A1")).is_none());
    }

    #[test]
    fn test_format_on_empty_cell_is_rejected() {
        let mut store = CellStore::new();
        let err = store.set_format(id("B2"), FormatChange::Italic(true)).unwrap_err();
        assert_eq!(err, CellError::EmptyCell(id("B2")));
        assert!(store.is_empty());
    }

    #[test]
    fn test_restore_snapshot() {
        let mut store = CellStore::new();
        store.set_cell(id("A1"), "1");
        store.set_cell(id("B1"), "=A1+1");
        store.set_format(id("A1"), FormatChange::Kind(ValueKind::Number)).unwrap();
        let before = store.get(id("A1")).cloned();

        store.set_cell(id("A1"), "10");
        assert_eq!(value(&store, "B1"), "11");

        store.restore(id("A1"), before.clone());
        assert_eq!(store.get(id("A1")).cloned(), before);
        assert_eq!(value(&store, "B1"), "2");

        store.restore(id("A1"), None);
        assert!(!store.contains(id("A1")));
        assert_eq!(value(&store, "B1"), "1");
    }

    #[test]
    fn test_snapshot_round_trip_recomputes() {
        let mut store = CellStore::new();
        store.set_cell(id("A1"), "2");
        store.set_cell(id("B1"), "=A1*2");
        store.set_cell(id("C1"), "=B1+1");
        store.set_format(id("C1"), FormatChange::TextColor(Some("green".into()))).unwrap();

        let json = serde_json::to_string(&store.to_snapshot()).unwrap();
        let mut snapshot: SheetSnapshot = serde_json::from_str(&json).unwrap();
        // Stale computed values are recomputed on load.
        snapshot.get_mut(&id("C1")).unwrap().computed_value = "stale".into();

        let restored = CellStore::from_snapshot(snapshot, StoreConfig::default());
        assert_eq!(restored.to_snapshot(), store.to_snapshot());
    }

    #[test]
    fn test_from_snapshot_orders_dependencies() {
        let mut snapshot = SheetSnapshot::new();
        // Dependent sorts before its dependency and carries no computed value.
        snapshot.insert(id("A1"), CellRecord {
            raw_input: "=B2*2".into(),
            formula: None,
            computed_value: String::new(),
            format: None,
        });
        snapshot.insert(id("B2"), CellRecord {
            raw_input: "=C3+1".into(),
            formula: None,
            computed_value: String::new(),
            format: None,
        });
        snapshot.insert(id("C3"), CellRecord::literal("4"));
        snapshot.insert(id("D4"), CellRecord::literal("  "));

        let store = CellStore::from_snapshot(snapshot, StoreConfig::default());
        assert_eq!(value(&store, "A1"), "10");
        assert_eq!(store.get(id("A1")).unwrap().formula.as_deref(), Some("B2*2"));
        assert!(!store.contains(id("D4")));
    }

    #[test]
    fn test_iteration_is_row_major() {
        let mut store = CellStore::new();
        for cell in ["B2", "A2", "C1", "A1"] {
            store.set_cell(id(cell), "x");
        }
        let order: Vec<String> = store.iter().map(|(id, _)| id.to_string()).collect();
        assert_eq!(order, vec!["A1", "C1", "A2", "B2"]);
    }
}
