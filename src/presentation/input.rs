use crate::application::{App, AppMode};
use crossterm::event::{KeyCode, KeyModifiers};
use tracing::warn;

pub struct InputHandler;

impl InputHandler {
    pub fn handle_key_event(app: &mut App, key: KeyCode, modifiers: KeyModifiers) {
        match app.mode {
            AppMode::Normal => Self::handle_normal_mode(app, key, modifiers),
            AppMode::Editing => Self::handle_editing_mode(app, key),
            AppMode::Help => Self::handle_help_mode(app, key),
            AppMode::SaveAs | AppMode::OpenSheet | AppMode::ExportCsv | AppMode::ImportCsv => {
                Self::handle_prompt_mode(app, key)
            }
        }
    }

    fn handle_normal_mode(app: &mut App, key: KeyCode, modifiers: KeyModifiers) {
        if modifiers.contains(KeyModifiers::CONTROL) {
            match key {
                KeyCode::Char('s') => app.start_save_as(),
                KeyCode::Char('o') => app.start_open_sheet(),
                KeyCode::Char('n') => app.new_sheet(),
                KeyCode::Char('e') => app.start_csv_export(),
                KeyCode::Char('l') => app.start_csv_import(),
                KeyCode::Char('z') => app.undo(),
                KeyCode::Char('y') => app.redo(),
                KeyCode::Char('c') => {
                    if let Some(text) = app.copy_selected() {
                        copy_to_system_clipboard(text);
                    }
                }
                KeyCode::Char('x') => {
                    if let Some(text) = app.cut_selected() {
                        copy_to_system_clipboard(text);
                    }
                }
                KeyCode::Char('v') => app.paste(),
                KeyCode::Char('b') => app.toggle_bold(),
                KeyCode::Char('t') => app.toggle_italic(),
                KeyCode::Char('u') => app.toggle_underline(),
                KeyCode::Char('a') => app.cycle_alignment(),
                _ => {}
            }
            return;
        }

        app.status_message = None;

        match key {
            KeyCode::Up | KeyCode::Char('k') => app.move_up(),
            KeyCode::Down | KeyCode::Char('j') => app.move_down(),
            KeyCode::Left | KeyCode::Char('h') => app.move_left(),
            KeyCode::Right | KeyCode::Char('l') | KeyCode::Tab => app.move_right(),
            KeyCode::Enter | KeyCode::F(2) => app.start_editing(),
            KeyCode::F(1) | KeyCode::Char('?') => app.show_help(),
            KeyCode::Delete | KeyCode::Backspace => app.clear_selected(),
            // Handled by the main loop.
            KeyCode::Char('q') => {}
            _ => {}
        }
    }

    fn handle_editing_mode(app: &mut App, key: KeyCode) {
        match key {
            KeyCode::Enter => app.finish_editing(),
            KeyCode::Esc => app.cancel_editing(),
            _ => Self::handle_text_key(app, key),
        }
    }

    fn handle_help_mode(app: &mut App, key: KeyCode) {
        match key {
            KeyCode::Esc | KeyCode::F(1) | KeyCode::Char('?') | KeyCode::Char('q') => app.close_help(),
            KeyCode::Up | KeyCode::Char('k') => {
                app.help_scroll = app.help_scroll.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                app.help_scroll += 1;
            }
            KeyCode::PageUp => {
                app.help_scroll = app.help_scroll.saturating_sub(5);
            }
            KeyCode::PageDown => {
                app.help_scroll += 5;
            }
            KeyCode::Home => {
                app.help_scroll = 0;
            }
            _ => {}
        }
    }

    fn handle_prompt_mode(app: &mut App, key: KeyCode) {
        match (app.mode, key) {
            (AppMode::SaveAs, KeyCode::Enter) => app.finish_save_as(),
            (AppMode::OpenSheet, KeyCode::Enter) => app.finish_open_sheet(),
            (AppMode::ExportCsv, KeyCode::Enter) => app.finish_csv_export(),
            (AppMode::ImportCsv, KeyCode::Enter) => app.finish_csv_import(),
            (AppMode::OpenSheet, KeyCode::Up) => app.move_sheet_selection(-1),
            (AppMode::OpenSheet, KeyCode::Down) => app.move_sheet_selection(1),
            (_, KeyCode::Esc) => app.cancel_prompt(),
            _ => Self::handle_text_key(app, key),
        }
    }

    fn handle_text_key(app: &mut App, key: KeyCode) {
        match key {
            KeyCode::Backspace => app.delete_char_before(),
            KeyCode::Delete => app.delete_char_at(),
            KeyCode::Left => app.move_cursor_left(),
            KeyCode::Right => app.move_cursor_right(),
            KeyCode::Home => app.move_cursor_home(),
            KeyCode::End => app.move_cursor_end(),
            KeyCode::Char(c) => app.insert_char(c),
            _ => {}
        }
    }
}

/// Offers text to the system clipboard. Failure only loses the system copy.
fn copy_to_system_clipboard(text: String) {
    let result = arboard::Clipboard::new().and_then(|mut clipboard| clipboard.set_text(text));
    if let Err(err) = result {
        warn!(error = %err, "system clipboard unavailable");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::{App, AppMode};
    use pretty_assertions::assert_eq;

    fn press(app: &mut App, key: KeyCode) {
        InputHandler::handle_key_event(app, key, KeyModifiers::NONE);
    }

    fn type_text(app: &mut App, text: &str) {
        for ch in text.chars() {
            press(app, KeyCode::Char(ch));
        }
    }

    #[test]
    fn test_edit_commit_through_keys() {
        let mut app = App::default();
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.mode, AppMode::Editing);

        type_text(&mut app, "=2*(3+4)");
        press(&mut app, KeyCode::Enter);

        assert_eq!(app.mode, AppMode::Normal);
        assert_eq!(app.store.display_value("A1".parse().unwrap()), "14");
        assert_eq!(app.selected_row, 1);
    }

    #[test]
    fn test_q_while_editing_is_text() {
        let mut app = App::default();
        press(&mut app, KeyCode::Enter);
        type_text(&mut app, "quit");
        press(&mut app, KeyCode::Esc);

        assert_eq!(app.mode, AppMode::Normal);
        assert!(app.store.is_empty());
    }

    #[test]
    fn test_navigation_keys() {
        let mut app = App::default();
        press(&mut app, KeyCode::Char('j'));
        press(&mut app, KeyCode::Right);
        press(&mut app, KeyCode::Char('l'));
        press(&mut app, KeyCode::Char('h'));
        assert_eq!((app.selected_row, app.selected_col), (1, 1));
    }

    #[test]
    fn test_delete_clears_cell() {
        let mut app = App::default();
        app.store.set_cell("A1".parse().unwrap(), "gone");
        press(&mut app, KeyCode::Delete);
        assert!(app.store.is_empty());
    }

    #[test]
    fn test_format_shortcuts() {
        let mut app = App::default();
        app.store.set_cell("A1".parse().unwrap(), "x");

        InputHandler::handle_key_event(&mut app, KeyCode::Char('b'), KeyModifiers::CONTROL);
        InputHandler::handle_key_event(&mut app, KeyCode::Char('u'), KeyModifiers::CONTROL);

        let format = app.store.format("A1".parse().unwrap()).unwrap();
        assert!(format.bold);
        assert!(format.underline);

        InputHandler::handle_key_event(&mut app, KeyCode::Char('z'), KeyModifiers::CONTROL);
        assert!(!app.store.format("A1".parse().unwrap()).unwrap().underline);
    }

    #[test]
    fn test_paste_shortcut() {
        let mut app = App::default();
        app.store.set_cell("A1".parse().unwrap(), "5");
        app.clipboard = app.store.get("A1".parse().unwrap()).cloned();

        press(&mut app, KeyCode::Down);
        InputHandler::handle_key_event(&mut app, KeyCode::Char('v'), KeyModifiers::CONTROL);
        assert_eq!(app.store.display_value("A2".parse().unwrap()), "5");
    }

    #[test]
    fn test_csv_export_prompt() {
        let mut app = App::default();
        InputHandler::handle_key_event(&mut app, KeyCode::Char('e'), KeyModifiers::CONTROL);

        assert_eq!(app.mode, AppMode::ExportCsv);
        assert_eq!(app.filename_input, "spreadsheet.csv");

        press(&mut app, KeyCode::Char('x'));
        assert_eq!(app.filename_input, "spreadsheet.csvx");
        press(&mut app, KeyCode::Backspace);
        assert_eq!(app.filename_input, "spreadsheet.csv");

        press(&mut app, KeyCode::Esc);
        assert_eq!(app.mode, AppMode::Normal);
        assert!(app.filename_input.is_empty());
    }

    #[test]
    fn test_save_prompt_names_sheet() {
        let mut app = App::default();
        app.store.set_cell("A1".parse().unwrap(), "1");

        InputHandler::handle_key_event(&mut app, KeyCode::Char('s'), KeyModifiers::CONTROL);
        assert_eq!(app.mode, AppMode::SaveAs);
        press(&mut app, KeyCode::Home);
        for _ in 0.."Untitled ".len() {
            press(&mut app, KeyCode::Delete);
        }
        press(&mut app, KeyCode::Enter);

        assert_eq!(app.mode, AppMode::Normal);
        assert_eq!(app.title, "spreadsheet");
        assert!(app.document_id.is_some());
    }

    #[test]
    fn test_open_prompt_navigation() {
        let mut app = App::default();
        app.title = "First".to_string();
        let first = app.save().unwrap();
        app.document_id = Some(format!("{first}0"));
        app.title = "Second".to_string();
        let second = app.save().unwrap();

        InputHandler::handle_key_event(&mut app, KeyCode::Char('o'), KeyModifiers::CONTROL);
        assert_eq!(app.mode, AppMode::OpenSheet);
        assert_eq!(app.filename_input, second);

        press(&mut app, KeyCode::Up);
        assert_eq!(app.filename_input, first);
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.title, "First");
    }

    #[test]
    fn test_help_mode() {
        let mut app = App::default();
        press(&mut app, KeyCode::Char('?'));
        assert_eq!(app.mode, AppMode::Help);

        press(&mut app, KeyCode::PageDown);
        press(&mut app, KeyCode::Up);
        assert_eq!(app.help_scroll, 4);

        press(&mut app, KeyCode::Char('q'));
        assert_eq!(app.mode, AppMode::Normal);
    }
}
