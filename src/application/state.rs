//! Application state management for the terminal spreadsheet.
//!
//! [`App`] owns the [`CellStore`] and everything the terminal needs around
//! it: cursor, viewport, editing buffer, clipboard, undo history and the
//! identity of the current document.

use std::collections::VecDeque;
use std::path::Path;

use chrono::Local;
use tracing::{info, warn};

use crate::domain::{CellFormat, CellId, CellRecord, CellStore, FormatChange, MAX_COLUMNS};
use crate::infrastructure::{
    export_csv_file, import_csv_file, CsvImport, DocumentKind, Settings, SheetDocument, SheetRepository, SheetSummary,
    StorageResult,
};

/// Title given to sheets that were never named.
pub const DEFAULT_TITLE: &str = "Untitled spreadsheet";

const DEFAULT_CSV_FILE: &str = "spreadsheet.csv";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Represents the current mode of the application.
///
/// The mode decides how key presses are interpreted and which popup is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    /// Arrow keys move the selection, shortcuts are active
    Normal,
    /// The user is typing into the selected cell
    Editing,
    /// Help screen is displayed
    Help,
    /// Prompting for the title to save under
    SaveAs,
    /// Choosing a saved sheet to open
    OpenSheet,
    /// Prompting for a CSV export path
    ExportCsv,
    /// Prompting for a CSV import path
    ImportCsv,
}

/// Represents an action that can be undone/redone.
#[derive(Debug, Clone, PartialEq)]
pub enum UndoAction {
    /// One cell changed from `old_cell` to `new_cell`; `None` means empty.
    CellModified {
        id: CellId,
        old_cell: Option<CellRecord>,
        new_cell: Option<CellRecord>,
    },
}

/// Main application state containing the store and UI state.
///
/// # Examples
///
/// ```
/// use gridcalc::application::App;
///
/// let mut app = App::default();
/// app.start_editing();
/// app.input = "=6*7".to_string();
/// app.finish_editing();
///
/// assert_eq!(app.store.display_value("A1".parse().unwrap()), "42");
/// assert_eq!(app.selected_row, 1);
/// ```
#[derive(Debug)]
pub struct App {
    /// Cell data and formula results
    pub store: CellStore,
    repository: SheetRepository,
    /// Number of rows in the grid
    pub rows: usize,
    /// Number of columns in the grid
    pub cols: usize,
    /// Currently selected row (zero-based)
    pub selected_row: usize,
    /// Currently selected column (zero-based)
    pub selected_col: usize,
    /// Top-left row visible in the viewport
    pub scroll_row: usize,
    /// Left-most column visible in the viewport
    pub scroll_col: usize,
    /// Viewport height in rows
    pub viewport_rows: usize,
    /// Viewport width in columns
    pub viewport_cols: usize,
    pub mode: AppMode,
    /// Editing buffer for the selected cell
    pub input: String,
    /// Cursor position, in characters, within the active buffer
    pub cursor_position: usize,
    /// Buffer for titles, sheet ids and file paths typed into prompts
    pub filename_input: String,
    pub help_scroll: usize,
    /// Temporary status message to display
    pub status_message: Option<String>,
    pub undo_stack: VecDeque<UndoAction>,
    pub redo_stack: VecDeque<UndoAction>,
    undo_limit: usize,
    /// Record captured by the last copy or cut
    pub clipboard: Option<CellRecord>,
    /// Saved sheets shown while in [`AppMode::OpenSheet`]
    pub saved_sheets: Vec<SheetSummary>,
    /// Highlighted entry of `saved_sheets`
    pub sheet_list_index: usize,
    /// Id of the current document, assigned on first save
    pub document_id: Option<String>,
    pub title: String,
    pub last_modified: Option<String>,
    /// Whether there are edits since the last save or load
    pub modified: bool,
}

impl Default for App {
    fn default() -> Self {
        Self::new(&Settings::default(), SheetRepository::in_memory())
    }
}

impl App {
    pub fn new(settings: &Settings, repository: SheetRepository) -> Self {
        Self {
            store: CellStore::with_config(settings.store_config()),
            repository,
            rows: settings.rows.max(1),
            cols: settings.columns.clamp(1, MAX_COLUMNS),
            selected_row: 0,
            selected_col: 0,
            scroll_row: 0,
            scroll_col: 0,
            viewport_rows: 20,
            viewport_cols: 8,
            mode: AppMode::Normal,
            input: String::new(),
            cursor_position: 0,
            filename_input: String::new(),
            help_scroll: 0,
            status_message: None,
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            undo_limit: settings.undo_limit,
            clipboard: None,
            saved_sheets: Vec::new(),
            sheet_list_index: 0,
            document_id: None,
            title: DEFAULT_TITLE.to_string(),
            last_modified: None,
            modified: false,
        }
    }

    /// Identifier of the selected cell.
    pub fn selected_id(&self) -> Option<CellId> {
        CellId::new(self.selected_row, self.selected_col).ok()
    }

    /// Switches to editing mode for the currently selected cell.
    ///
    /// Loads the cell's raw input (formula text included) into the buffer
    /// and places the cursor at the end.
    pub fn start_editing(&mut self) {
        self.mode = AppMode::Editing;
        self.input = self
            .selected_id()
            .and_then(|id| self.store.get(id))
            .map(|record| record.raw_input.clone())
            .unwrap_or_default();
        self.cursor_position = self.input.chars().count();
        self.status_message = None;
    }

    /// Commits the trimmed buffer to the selected cell and moves down a row.
    pub fn finish_editing(&mut self) {
        if let Some(id) = self.selected_id() {
            let text = self.input.trim().to_string();
            self.apply_edit(id, |store| {
                store.set_cell(id, &text);
            });
        }

        if self.selected_row + 1 < self.rows {
            self.selected_row += 1;
            self.ensure_cursor_visible();
        }

        self.mode = AppMode::Normal;
        self.input.clear();
        self.cursor_position = 0;
    }

    /// Leaves editing mode without touching the cell.
    pub fn cancel_editing(&mut self) {
        self.mode = AppMode::Normal;
        self.input.clear();
        self.cursor_position = 0;
    }

    /// Empties the selected cell.
    pub fn clear_selected(&mut self) {
        if let Some(id) = self.selected_id().filter(|id| self.store.contains(*id)) {
            self.apply_edit(id, |store| {
                store.set_cell(id, "");
            });
        }
    }

    /// Copies the selected cell to the clipboard and returns its display
    /// value for the system clipboard.
    pub fn copy_selected(&mut self) -> Option<String> {
        let id = self.selected_id()?;
        match self.store.get(id).cloned() {
            Some(record) => {
                let text = record.display_value().to_string();
                self.clipboard = Some(record);
                self.status_message = Some(format!("Copied {id}"));
                Some(text)
            }
            None => {
                self.status_message = Some(format!("Cell {id} is empty"));
                None
            }
        }
    }

    /// Copies then clears the selected cell.
    pub fn cut_selected(&mut self) -> Option<String> {
        let text = self.copy_selected()?;
        self.clear_selected();
        if let Some(id) = self.selected_id() {
            self.status_message = Some(format!("Cut {id}"));
        }
        Some(text)
    }

    /// Writes the clipboard record into the selected cell. Formulas are
    /// re-evaluated in their new position.
    pub fn paste(&mut self) {
        let Some(record) = self.clipboard.clone() else {
            self.status_message = Some("Clipboard is empty".to_string());
            return;
        };
        if let Some(id) = self.selected_id() {
            self.apply_edit(id, |store| store.restore(id, Some(record)));
            self.status_message = Some(format!("Pasted into {id}"));
        }
    }

    pub fn toggle_bold(&mut self) {
        self.change_format(|format| FormatChange::Bold(!format.bold));
    }

    pub fn toggle_italic(&mut self) {
        self.change_format(|format| FormatChange::Italic(!format.italic));
    }

    pub fn toggle_underline(&mut self) {
        self.change_format(|format| FormatChange::Underline(!format.underline));
    }

    /// Moves the selected cell to the next alignment.
    pub fn cycle_alignment(&mut self) {
        self.change_format(|format| FormatChange::Align(format.align.unwrap_or_default().next()));
    }

    fn change_format(&mut self, change: impl FnOnce(&CellFormat) -> FormatChange) {
        let Some(id) = self.selected_id() else {
            return;
        };
        let current = self.store.format(id).cloned().unwrap_or_default();
        let change = change(&current);

        let mut result = Ok(());
        self.apply_edit(id, |store| result = store.set_format(id, change));
        if let Err(err) = result {
            self.status_message = Some(err.to_string());
        }
    }

    /// Runs `edit` against the store and records the change at `id` for undo.
    fn apply_edit(&mut self, id: CellId, edit: impl FnOnce(&mut CellStore)) {
        let old_cell = self.store.get(id).cloned();
        edit(&mut self.store);
        let new_cell = self.store.get(id).cloned();

        if old_cell != new_cell {
            self.record_action(UndoAction::CellModified { id, old_cell, new_cell });
            self.modified = true;
        }
    }

    /// Adds the action to the undo stack, drops the oldest entry past the
    /// limit and clears the redo stack.
    fn record_action(&mut self, action: UndoAction) {
        self.undo_stack.push_back(action);
        while self.undo_stack.len() > self.undo_limit {
            self.undo_stack.pop_front();
        }
        self.redo_stack.clear();
    }

    /// Reverts the last action and moves it to the redo stack.
    pub fn undo(&mut self) {
        let Some(action) = self.undo_stack.pop_back() else {
            self.status_message = Some("Nothing to undo".to_string());
            return;
        };
        match &action {
            UndoAction::CellModified { id, old_cell, .. } => {
                self.store.restore(*id, old_cell.clone());
                self.select(*id);
            }
        }
        self.redo_stack.push_back(action);
        self.modified = true;
    }

    /// Reapplies the last undone action and moves it back to the undo stack.
    pub fn redo(&mut self) {
        let Some(action) = self.redo_stack.pop_back() else {
            self.status_message = Some("Nothing to redo".to_string());
            return;
        };
        match &action {
            UndoAction::CellModified { id, new_cell, .. } => {
                self.store.restore(*id, new_cell.clone());
                self.select(*id);
            }
        }
        self.undo_stack.push_back(action);
        self.modified = true;
    }

    fn select(&mut self, id: CellId) {
        self.selected_row = id.row_index().min(self.rows - 1);
        self.selected_col = id.col_index().min(self.cols - 1);
        self.ensure_cursor_visible();
    }

    fn reset_view(&mut self) {
        self.selected_row = 0;
        self.selected_col = 0;
        self.scroll_row = 0;
        self.scroll_col = 0;
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    /// Replaces the current sheet with an empty, untitled one.
    pub fn new_sheet(&mut self) {
        self.store = CellStore::with_config(self.store.config());
        self.document_id = None;
        self.title = DEFAULT_TITLE.to_string();
        self.last_modified = None;
        self.modified = false;
        self.reset_view();
        self.status_message = Some("New spreadsheet".to_string());
    }

    /// Saves the current sheet, assigning an id on first save.
    pub fn save(&mut self) -> StorageResult<String> {
        let now = Local::now();
        let id = self
            .document_id
            .clone()
            .unwrap_or_else(|| now.timestamp_millis().to_string());
        let last_modified = now.format(TIMESTAMP_FORMAT).to_string();

        let doc = SheetDocument {
            id: id.clone(),
            title: self.title.clone(),
            data: self.store.to_snapshot(),
            row_count: self.rows,
            column_count: self.cols,
            last_modified: last_modified.clone(),
            kind: DocumentKind::Spreadsheet,
        };
        self.repository.save(&doc)?;

        self.document_id = Some(id.clone());
        self.last_modified = Some(last_modified);
        self.modified = false;
        Ok(id)
    }

    /// Loads a saved sheet by id, replacing the current one.
    pub fn open(&mut self, id: &str) -> StorageResult<()> {
        let doc = self.repository.load(id)?;
        self.store = CellStore::from_snapshot(doc.data, self.store.config());
        self.rows = doc.row_count.max(1);
        self.cols = doc.column_count.clamp(1, MAX_COLUMNS);
        self.document_id = Some(doc.id);
        self.title = doc.title;
        self.last_modified = Some(doc.last_modified);
        self.modified = false;
        self.reset_view();
        Ok(())
    }

    /// Replaces the sheet's data with the contents of a CSV file and grows
    /// the grid to fit.
    pub fn import_csv(&mut self, path: &Path) -> StorageResult<CsvImport> {
        let import = import_csv_file(path, &mut self.store)?;
        self.rows = self.rows.max(import.rows);
        self.cols = self.cols.max(import.columns);
        self.modified = true;
        self.reset_view();
        Ok(import)
    }

    pub fn export_csv(&self, path: &Path) -> StorageResult<()> {
        export_csv_file(&self.store, self.rows, self.cols, path)
    }

    /// Opens the title prompt used by save.
    pub fn start_save_as(&mut self) {
        self.start_prompt(AppMode::SaveAs, self.title.clone());
    }

    /// Saves under the title typed into the prompt.
    pub fn finish_save_as(&mut self) {
        let title = self.filename_input.trim();
        if !title.is_empty() {
            self.title = title.to_string();
        }
        let message = match self.save() {
            Ok(id) => format!("Saved \"{}\" ({id})", self.title),
            Err(err) => {
                warn!(error = %err, "save failed");
                format!("Save failed: {err}")
            }
        };
        self.finish_prompt(message);
    }

    /// Lists saved sheets and opens the chooser.
    pub fn start_open_sheet(&mut self) {
        self.saved_sheets = match self.repository.list() {
            Ok(sheets) => sheets,
            Err(err) => {
                self.status_message = Some(format!("Could not list sheets: {err}"));
                return;
            }
        };
        self.sheet_list_index = self.saved_sheets.len().saturating_sub(1);
        let id = self
            .saved_sheets
            .get(self.sheet_list_index)
            .map(|sheet| sheet.id.clone())
            .unwrap_or_default();
        self.start_prompt(AppMode::OpenSheet, id);
    }

    /// Moves the chooser highlight by `delta` and copies its id into the prompt.
    pub fn move_sheet_selection(&mut self, delta: isize) {
        if self.saved_sheets.is_empty() {
            return;
        }
        let last = self.saved_sheets.len() - 1;
        self.sheet_list_index = self.sheet_list_index.saturating_add_signed(delta).min(last);
        self.filename_input = self.saved_sheets[self.sheet_list_index].id.clone();
        self.cursor_position = self.filename_input.chars().count();
    }

    /// Opens the sheet whose id is in the prompt.
    pub fn finish_open_sheet(&mut self) {
        let id = self.filename_input.trim().to_string();
        let message = match self.open(&id) {
            Ok(()) => format!("Opened \"{}\"", self.title),
            Err(err) => {
                warn!(id, error = %err, "open failed");
                format!("Open failed: {err}")
            }
        };
        self.finish_prompt(message);
    }

    pub fn start_csv_export(&mut self) {
        self.start_prompt(AppMode::ExportCsv, DEFAULT_CSV_FILE.to_string());
    }

    pub fn finish_csv_export(&mut self) {
        let path = self.prompt_path();
        let message = match self.export_csv(Path::new(&path)) {
            Ok(()) => format!("Exported to {path}"),
            Err(err) => format!("Export failed: {err}"),
        };
        self.finish_prompt(message);
    }

    pub fn start_csv_import(&mut self) {
        self.start_prompt(AppMode::ImportCsv, DEFAULT_CSV_FILE.to_string());
    }

    pub fn finish_csv_import(&mut self) {
        let path = self.prompt_path();
        let message = match self.import_csv(Path::new(&path)) {
            Ok(import) => {
                info!(path, cells = import.cells, "CSV import finished");
                format!("Imported {} cells from {path}", import.cells)
            }
            Err(err) => format!("Import failed: {err}"),
        };
        self.finish_prompt(message);
    }

    /// Leaves any prompt without acting on it.
    pub fn cancel_prompt(&mut self) {
        self.mode = AppMode::Normal;
        self.filename_input.clear();
        self.cursor_position = 0;
    }

    fn prompt_path(&self) -> String {
        match self.filename_input.trim() {
            "" => DEFAULT_CSV_FILE.to_string(),
            path => path.to_string(),
        }
    }

    fn start_prompt(&mut self, mode: AppMode, initial: String) {
        self.mode = mode;
        self.cursor_position = initial.chars().count();
        self.filename_input = initial;
        self.status_message = None;
    }

    fn finish_prompt(&mut self, message: String) {
        self.status_message = Some(message);
        self.cancel_prompt();
    }

    /// Buffer the current mode types into, if any.
    fn active_buffer(&mut self) -> Option<&mut String> {
        match self.mode {
            AppMode::Editing => Some(&mut self.input),
            AppMode::SaveAs | AppMode::OpenSheet | AppMode::ExportCsv | AppMode::ImportCsv => {
                Some(&mut self.filename_input)
            }
            AppMode::Normal | AppMode::Help => None,
        }
    }

    pub fn insert_char(&mut self, ch: char) {
        let cursor = self.cursor_position;
        if let Some(buffer) = self.active_buffer() {
            let at = byte_offset(buffer, cursor);
            buffer.insert(at, ch);
            self.cursor_position += 1;
        }
    }

    /// Removes the character before the cursor.
    pub fn delete_char_before(&mut self) {
        let cursor = self.cursor_position;
        if cursor == 0 {
            return;
        }
        if let Some(buffer) = self.active_buffer() {
            let at = byte_offset(buffer, cursor - 1);
            buffer.remove(at);
            self.cursor_position -= 1;
        }
    }

    /// Removes the character under the cursor.
    pub fn delete_char_at(&mut self) {
        let cursor = self.cursor_position;
        if let Some(buffer) = self.active_buffer() {
            if cursor < buffer.chars().count() {
                let at = byte_offset(buffer, cursor);
                buffer.remove(at);
            }
        }
    }

    pub fn move_cursor_left(&mut self) {
        self.cursor_position = self.cursor_position.saturating_sub(1);
    }

    pub fn move_cursor_right(&mut self) {
        let len = self.active_buffer().map_or(0, |buffer| buffer.chars().count());
        self.cursor_position = (self.cursor_position + 1).min(len);
    }

    pub fn move_cursor_home(&mut self) {
        self.cursor_position = 0;
    }

    pub fn move_cursor_end(&mut self) {
        self.cursor_position = self.active_buffer().map_or(0, |buffer| buffer.chars().count());
    }

    pub fn move_up(&mut self) {
        self.selected_row = self.selected_row.saturating_sub(1);
        self.ensure_cursor_visible();
    }

    pub fn move_down(&mut self) {
        if self.selected_row + 1 < self.rows {
            self.selected_row += 1;
        }
        self.ensure_cursor_visible();
    }

    pub fn move_left(&mut self) {
        self.selected_col = self.selected_col.saturating_sub(1);
        self.ensure_cursor_visible();
    }

    pub fn move_right(&mut self) {
        if self.selected_col + 1 < self.cols {
            self.selected_col += 1;
        }
        self.ensure_cursor_visible();
    }

    /// Updates the viewport size for scrolling calculations.
    pub fn update_viewport_size(&mut self, rows: usize, cols: usize) {
        self.viewport_rows = rows.max(1);
        self.viewport_cols = cols.max(1);
        self.ensure_cursor_visible();
    }

    /// Ensures the selected cell is visible by adjusting scroll position.
    pub fn ensure_cursor_visible(&mut self) {
        if self.selected_row < self.scroll_row {
            self.scroll_row = self.selected_row;
        } else if self.selected_row >= self.scroll_row + self.viewport_rows {
            self.scroll_row = self.selected_row + 1 - self.viewport_rows;
        }

        if self.selected_col < self.scroll_col {
            self.scroll_col = self.selected_col;
        } else if self.selected_col >= self.scroll_col + self.viewport_cols {
            self.scroll_col = self.selected_col + 1 - self.viewport_cols;
        }
    }

    pub fn show_help(&mut self) {
        self.mode = AppMode::Help;
        self.help_scroll = 0;
    }

    pub fn close_help(&mut self) {
        self.mode = AppMode::Normal;
    }
}

fn byte_offset(text: &str, chars: usize) -> usize {
    text.char_indices().nth(chars).map_or(text.len(), |(index, _)| index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TextAlign, ERROR_SENTINEL};
    use crate::infrastructure::{FileKeyValueStore, StorageError};
    use pretty_assertions::assert_eq;

    fn id(text: &str) -> CellId {
        text.parse().unwrap()
    }

    fn enter(app: &mut App, text: &str) {
        app.start_editing();
        app.input = text.to_string();
        app.finish_editing();
    }

    #[test]
    fn test_app_default() {
        let app = App::default();
        assert_eq!((app.rows, app.cols), (20, 8));
        assert_eq!((app.selected_row, app.selected_col), (0, 0));
        assert_eq!(app.mode, AppMode::Normal);
        assert!(app.input.is_empty());
        assert_eq!(app.title, DEFAULT_TITLE);
        assert!(app.document_id.is_none());
        assert!(!app.modified);
    }

    #[test]
    fn test_start_editing_loads_raw_input() {
        let mut app = App::default();
        app.store.set_cell(id("A1"), "=6*7");

        app.start_editing();

        assert_eq!(app.mode, AppMode::Editing);
        assert_eq!(app.input, "=6*7");
        assert_eq!(app.cursor_position, 4);
    }

    #[test]
    fn test_finish_editing_trims_and_moves_down() {
        let mut app = App::default();
        enter(&mut app, "  =2+3  ");

        assert_eq!(app.mode, AppMode::Normal);
        assert!(app.input.is_empty());
        assert_eq!(app.selected_row, 1);
        assert!(app.modified);

        let cell = app.store.get(id("A1")).unwrap();
        assert_eq!(cell.raw_input, "=2+3");
        assert_eq!(cell.computed_value, "5");
        assert_eq!(app.undo_stack.len(), 1);
    }

    #[test]
    fn test_finish_editing_on_last_row_stays() {
        let mut app = App::default();
        app.selected_row = app.rows - 1;
        enter(&mut app, "x");
        assert_eq!(app.selected_row, app.rows - 1);
    }

    #[test]
    fn test_self_reference_is_stored_as_error() {
        let mut app = App::default();
        enter(&mut app, "=A1+1");
        assert_eq!(app.store.display_value(id("A1")), ERROR_SENTINEL);
    }

    #[test]
    fn test_cancel_editing_leaves_cell() {
        let mut app = App::default();
        app.start_editing();
        app.input = "Some input".to_string();
        app.cancel_editing();

        assert_eq!(app.mode, AppMode::Normal);
        assert!(!app.store.contains(id("A1")));
        assert!(app.undo_stack.is_empty());
    }

    #[test]
    fn test_undo_redo_restores_dependents() {
        let mut app = App::default();
        enter(&mut app, "2");
        enter(&mut app, "=A1*10");
        app.selected_row = 0;
        enter(&mut app, "5");
        assert_eq!(app.store.display_value(id("A2")), "50");

        app.undo();
        assert_eq!(app.store.display_value(id("A1")), "2");
        assert_eq!(app.store.display_value(id("A2")), "20");
        assert_eq!(app.selected_row, 0);

        app.redo();
        assert_eq!(app.store.display_value(id("A2")), "50");
    }

    #[test]
    fn test_undo_of_first_edit_clears_cell() {
        let mut app = App::default();
        enter(&mut app, "hello");
        app.undo();
        assert!(!app.store.contains(id("A1")));
        assert_eq!(app.redo_stack.len(), 1);
    }

    #[test]
    fn test_new_edit_clears_redo() {
        let mut app = App::default();
        enter(&mut app, "1");
        app.undo();
        enter(&mut app, "2");
        assert!(app.redo_stack.is_empty());
    }

    #[test]
    fn test_undo_limit() {
        let settings = Settings {
            undo_limit: 3,
            ..Settings::default()
        };
        let mut app = App::new(&settings, SheetRepository::in_memory());
        for n in 0..5 {
            app.selected_row = 0;
            enter(&mut app, &n.to_string());
        }
        assert_eq!(app.undo_stack.len(), 3);
    }

    #[test]
    fn test_empty_undo_sets_status() {
        let mut app = App::default();
        app.undo();
        assert_eq!(app.status_message.as_deref(), Some("Nothing to undo"));
    }

    #[test]
    fn test_clear_selected() {
        let mut app = App::default();
        app.store.set_cell(id("A1"), "4");
        app.store.set_cell(id("B1"), "=A1+1");

        app.clear_selected();

        assert!(!app.store.contains(id("A1")));
        assert_eq!(app.store.display_value(id("B1")), "1");
        assert_eq!(app.undo_stack.len(), 1);

        // Clearing an empty cell records nothing.
        app.clear_selected();
        assert_eq!(app.undo_stack.len(), 1);
    }

    #[test]
    fn test_copy_paste_re_evaluates_formula() {
        let mut app = App::default();
        app.store.set_cell(id("A1"), "3");
        app.store.set_cell(id("B1"), "=A1*2");
        app.store.set_format(id("B1"), FormatChange::Bold(true)).unwrap();

        app.selected_col = 1;
        assert_eq!(app.copy_selected().as_deref(), Some("6"));

        app.selected_row = 2;
        app.paste();

        let pasted = app.store.get(id("B3")).unwrap();
        assert_eq!(pasted.raw_input, "=A1*2");
        assert_eq!(pasted.computed_value, "6");
        assert!(pasted.format.as_ref().unwrap().bold);

        app.store.set_cell(id("A1"), "4");
        assert_eq!(app.store.display_value(id("B3")), "8");
    }

    #[test]
    fn test_cut_then_paste_moves_cell() {
        let mut app = App::default();
        app.store.set_cell(id("A1"), "moved");

        assert_eq!(app.cut_selected().as_deref(), Some("moved"));
        assert!(!app.store.contains(id("A1")));

        app.selected_col = 3;
        app.paste();
        assert_eq!(app.store.display_value(id("D1")), "moved");
        assert_eq!(app.undo_stack.len(), 2);
    }

    #[test]
    fn test_paste_without_clipboard() {
        let mut app = App::default();
        app.paste();
        assert_eq!(app.status_message.as_deref(), Some("Clipboard is empty"));
        assert!(app.undo_stack.is_empty());
    }

    #[test]
    fn test_format_toggles() {
        let mut app = App::default();
        app.store.set_cell(id("A1"), "x");

        app.toggle_bold();
        app.toggle_italic();
        app.cycle_alignment();
        app.cycle_alignment();

        let format = app.store.format(id("A1")).unwrap();
        assert!(format.bold);
        assert!(format.italic);
        assert!(!format.underline);
        assert_eq!(format.align, Some(TextAlign::Right));

        app.toggle_bold();
        assert!(!app.store.format(id("A1")).unwrap().bold);

        app.undo();
        assert!(app.store.format(id("A1")).unwrap().bold);
    }

    #[test]
    fn test_format_empty_cell_reports_error() {
        let mut app = App::default();
        app.toggle_underline();
        assert_eq!(app.status_message.as_deref(), Some("Cell A1 is empty"));
        assert!(app.undo_stack.is_empty());
    }

    #[test]
    fn test_save_and_open() {
        let mut app = App::default();
        enter(&mut app, "7");
        enter(&mut app, "=A1*6");

        app.start_save_as();
        assert_eq!(app.mode, AppMode::SaveAs);
        assert_eq!(app.filename_input, DEFAULT_TITLE);
        app.filename_input = "Answers".to_string();
        app.finish_save_as();

        assert_eq!(app.mode, AppMode::Normal);
        assert!(!app.modified);
        let saved_id = app.document_id.clone().unwrap();
        assert!(saved_id.chars().all(|ch| ch.is_ascii_digit()));
        assert_eq!(app.last_modified.as_ref().unwrap().len(), "2024-01-01 00:00".len());

        app.new_sheet();
        assert!(app.store.is_empty());
        assert_eq!(app.title, DEFAULT_TITLE);

        app.start_open_sheet();
        assert_eq!(app.mode, AppMode::OpenSheet);
        assert_eq!(app.saved_sheets.len(), 1);
        assert_eq!(app.filename_input, saved_id);
        app.finish_open_sheet();

        assert_eq!(app.title, "Answers");
        assert_eq!(app.document_id.as_deref(), Some(saved_id.as_str()));
        assert_eq!(app.store.display_value(id("A2")), "42");
    }

    #[test]
    fn test_resave_keeps_id() {
        let mut app = App::default();
        enter(&mut app, "1");
        let first = app.save().unwrap();
        enter(&mut app, "2");
        let second = app.save().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_open_unknown_sheet() {
        let mut app = App::default();
        assert!(matches!(app.open("404"), Err(StorageError::NotFound(_))));

        app.start_open_sheet();
        app.filename_input = "404".to_string();
        app.finish_open_sheet();
        assert!(app.status_message.unwrap().starts_with("Open failed"));
    }

    #[test]
    fn test_save_to_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let repository = SheetRepository::new(FileKeyValueStore::new(dir.path()), "t_");
        let mut app = App::new(&Settings::default(), repository);
        enter(&mut app, "on disk");

        let saved = app.save().unwrap();
        assert!(dir.path().join(format!("t_spreadsheet_{saved}.json")).exists());
    }

    #[test]
    fn test_csv_import_grows_grid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wide.csv");
        let line: Vec<String> = (1..=12).map(|n| n.to_string()).collect();
        let mut data = String::new();
        for _ in 0..25 {
            data.push_str(&line.join(","));
            data.push('\n');
        }
        std::fs::write(&path, data).unwrap();

        let mut app = App::default();
        enter(&mut app, "old");
        app.start_csv_import();
        app.filename_input = path.display().to_string();
        app.finish_csv_import();

        assert_eq!((app.rows, app.cols), (25, 12));
        assert_eq!(app.store.display_value(id("A1")), "1");
        assert_eq!(app.store.display_value(id("L25")), "12");
        assert!(app.undo_stack.is_empty());
        assert!(app.status_message.unwrap().starts_with("Imported 300 cells"));
    }

    #[test]
    fn test_csv_import_missing_file_keeps_data() {
        let mut app = App::default();
        enter(&mut app, "keep");
        app.start_csv_import();
        app.filename_input = "/nonexistent/data.csv".to_string();
        app.finish_csv_import();

        assert_eq!(app.store.display_value(id("A1")), "keep");
        assert!(app.status_message.unwrap().starts_with("Import failed"));
    }

    #[test]
    fn test_csv_import_malformed_file_keeps_sheet_and_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.csv");
        std::fs::write(&path, b"1,2\n\xff,3\n").unwrap();

        let mut app = App::default();
        enter(&mut app, "keep");
        app.modified = false;
        app.start_csv_import();
        app.filename_input = path.display().to_string();
        app.finish_csv_import();

        assert!(app.status_message.as_ref().unwrap().starts_with("Import failed"));
        assert_eq!(app.store.len(), 1);
        assert_eq!(app.store.display_value(id("A1")), "keep");
        assert!(!app.modified);
        assert_eq!(app.undo_stack.len(), 1);
        assert_eq!(app.selected_row, 1);

        app.undo();
        assert!(app.store.is_empty());
    }

    #[test]
    fn test_csv_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut app = App::default();
        app.cols = 2;
        app.rows = 1;
        enter(&mut app, "=1+1");

        app.start_csv_export();
        app.filename_input = path.display().to_string();
        app.finish_csv_export();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), ",A,B\n1,2,\n");
    }

    #[test]
    fn test_navigation_clamps() {
        let mut app = App::default();
        app.move_up();
        app.move_left();
        assert_eq!((app.selected_row, app.selected_col), (0, 0));

        for _ in 0..50 {
            app.move_down();
            app.move_right();
        }
        assert_eq!((app.selected_row, app.selected_col), (19, 7));
    }

    #[test]
    fn test_viewport_and_scrolling() {
        let mut app = App::default();
        app.update_viewport_size(5, 3);

        for _ in 0..7 {
            app.move_down();
        }
        assert_eq!(app.scroll_row, 3);

        for _ in 0..4 {
            app.move_right();
        }
        assert_eq!(app.scroll_col, 2);

        for _ in 0..7 {
            app.move_up();
        }
        assert_eq!(app.scroll_row, 0);
    }

    #[test]
    fn test_buffer_editing_is_char_aware() {
        let mut app = App::default();
        app.start_editing();
        for ch in "héllo".chars() {
            app.insert_char(ch);
        }
        app.move_cursor_left();
        app.move_cursor_left();
        app.move_cursor_left();
        app.delete_char_before();
        assert_eq!(app.input, "hllo");

        app.move_cursor_home();
        app.delete_char_at();
        assert_eq!(app.input, "llo");

        app.move_cursor_end();
        app.insert_char('!');
        assert_eq!(app.input, "llo!");
    }
}
