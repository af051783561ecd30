use std::str::FromStr;

use crate::application::{App, AppMode};
use crate::domain::{CellFormat, CellId, TextAlign};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table},
    Frame,
};

/// Display width of every data column.
pub const COLUMN_WIDTH: usize = 12;
const ROW_LABEL_WIDTH: usize = 4;

/// Rows and columns of cells that fit in a terminal of the given size.
pub fn grid_viewport(width: u16, height: u16) -> (usize, usize) {
    // Header line, status block and table borders plus the column header row.
    let rows = (height as usize).saturating_sub(1 + 3 + 2 + 1);
    let inner_width = (width as usize).saturating_sub(2 + ROW_LABEL_WIDTH);
    let cols = inner_width / (COLUMN_WIDTH + 1);
    (rows.max(1), cols.max(1))
}

pub fn render_ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0), Constraint::Length(3)])
        .split(f.area());

    render_header(f, app, chunks[0]);
    render_spreadsheet(f, app, chunks[1]);
    render_status_bar(f, app, chunks[2]);

    match app.mode {
        AppMode::Help => render_help_popup(f, app.help_scroll),
        AppMode::OpenSheet => render_sheet_list(f, app),
        _ => {}
    }
}

fn render_header(f: &mut Frame, app: &App, area: Rect) {
    let cell = app
        .selected_id()
        .map(|id| {
            let raw = app.store.get(id).map(|record| record.raw_input.as_str()).unwrap_or("");
            format!("{id}: {raw}")
        })
        .unwrap_or_default();
    let marker = if app.modified { " *" } else { "" };

    let header = Paragraph::new(format!("gridcalc | {}{} | {}", app.title, marker, cell))
        .style(Style::default().fg(Color::Cyan));
    f.render_widget(header, area);
}

/// Style for a cell's presentation attributes.
pub fn format_style(format: &CellFormat) -> Style {
    let mut style = Style::default();
    if format.bold {
        style = style.add_modifier(Modifier::BOLD);
    }
    if format.italic {
        style = style.add_modifier(Modifier::ITALIC);
    }
    if format.underline {
        style = style.add_modifier(Modifier::UNDERLINED);
    }
    if let Some(color) = format.text_color.as_deref().and_then(|c| Color::from_str(c).ok()) {
        style = style.fg(color);
    }
    if let Some(color) = format.background_color.as_deref().and_then(|c| Color::from_str(c).ok()) {
        style = style.bg(color);
    }
    style
}

fn alignment(format: Option<&CellFormat>) -> Alignment {
    match format.and_then(|format| format.align) {
        Some(TextAlign::Center) => Alignment::Center,
        Some(TextAlign::Right) => Alignment::Right,
        Some(TextAlign::Left) | None => Alignment::Left,
    }
}

fn render_spreadsheet(f: &mut Frame, app: &App, area: Rect) {
    let last_row = (app.scroll_row + app.viewport_rows).min(app.rows);
    let last_col = (app.scroll_col + app.viewport_cols).min(app.cols);

    let mut headers = vec![Cell::from("")];
    for col in app.scroll_col..last_col {
        let Some(label) = CellId::column_label(col) else {
            break;
        };
        let header_style = if col == app.selected_col {
            Style::default().bg(Color::LightBlue).fg(Color::Black)
        } else {
            Style::default().fg(Color::Yellow)
        };
        headers.push(Cell::from(label).style(header_style));
    }

    let mut rows = vec![Row::new(headers).height(1)];

    for row in app.scroll_row..last_row {
        let row_number_style = if row == app.selected_row {
            Style::default().bg(Color::LightBlue).fg(Color::Black)
        } else {
            Style::default().fg(Color::Yellow)
        };
        let mut cells = vec![Cell::from(format!("{}", row + 1)).style(row_number_style)];

        for col in app.scroll_col..last_col {
            let (text, format) = match CellId::new(row, col).ok().and_then(|id| app.store.get(id)) {
                Some(record) => (record.display_value().to_string(), record.format.as_ref()),
                None => (String::new(), None),
            };

            let mut style = format.map(format_style).unwrap_or_default();
            if row == app.selected_row && col == app.selected_col {
                style = style.bg(Color::Blue).fg(Color::White);
            }

            let line = Line::from(text).alignment(alignment(format));
            cells.push(Cell::from(line).style(style));
        }

        rows.push(Row::new(cells).height(1));
    }

    let mut widths = vec![Constraint::Length(ROW_LABEL_WIDTH as u16)];
    widths.extend((app.scroll_col..last_col).map(|_| Constraint::Length(COLUMN_WIDTH as u16)));

    let table = Table::new(rows, widths)
        .block(Block::default().borders(Borders::ALL).title("Sheet"))
        .column_spacing(1);

    f.render_widget(table, area);
}

fn render_status_bar(f: &mut Frame, app: &App, area: Rect) {
    let input_text = match app.mode {
        AppMode::Normal => match &app.status_message {
            Some(status) => status.clone(),
            None => {
                let saved = app.last_modified.as_deref().unwrap_or("never");
                format!(
                    "Saved: {saved} | Ctrl+S: save | Ctrl+O: open | Ctrl+N: new | Ctrl+E: export CSV | Ctrl+L: import CSV | ?: help | q: quit"
                )
            }
        },
        AppMode::Editing => format!("Editing: {} (Enter to commit, Esc to cancel)", app.input),
        AppMode::Help => "↑↓/jk: scroll | PgUp/PgDn: fast scroll | Home: top | Esc/q: close help".to_string(),
        AppMode::SaveAs => format!("Save as: {} (Enter to save, Esc to cancel)", app.filename_input),
        AppMode::OpenSheet => format!("Open sheet id: {} (↑↓ to choose, Enter to open, Esc to cancel)", app.filename_input),
        AppMode::ExportCsv => format!("Export CSV as: {} (Enter to export, Esc to cancel)", app.filename_input),
        AppMode::ImportCsv => format!("Import CSV from: {} (Enter to import, Esc to cancel)", app.filename_input),
    };

    let input = Paragraph::new(input_text)
        .block(Block::default().borders(Borders::ALL).title("Status"))
        .style(match app.mode {
            AppMode::Normal => Style::default(),
            AppMode::Editing | AppMode::ImportCsv => Style::default().fg(Color::Green),
            AppMode::Help => Style::default().fg(Color::Cyan),
            AppMode::SaveAs | AppMode::OpenSheet => Style::default().fg(Color::Yellow),
            AppMode::ExportCsv => Style::default().fg(Color::Magenta),
        });
    f.render_widget(input, area);
}

fn popup_area(area: Rect) -> Rect {
    Rect {
        x: area.width / 10,
        y: area.height / 10,
        width: area.width * 4 / 5,
        height: area.height * 4 / 5,
    }
}

fn render_sheet_list(f: &mut Frame, app: &App) {
    let area = popup_area(f.area());
    f.render_widget(Clear, area);

    let lines: Vec<Line> = if app.saved_sheets.is_empty() {
        vec![Line::from("No saved spreadsheets")]
    } else {
        app.saved_sheets
            .iter()
            .enumerate()
            .map(|(index, sheet)| {
                let style = if index == app.sheet_list_index {
                    Style::default().bg(Color::Blue).fg(Color::White)
                } else {
                    Style::default()
                };
                Line::from(vec![
                    Span::styled(format!("{:<16}", sheet.id), style.fg(Color::Yellow)),
                    Span::styled(format!("{:<18}", sheet.last_modified), style),
                    Span::styled(sheet.title.clone(), style),
                ])
            })
            .collect()
    };

    let list = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Saved spreadsheets")
            .style(Style::default().fg(Color::Cyan)),
    );
    f.render_widget(list, area);
}

fn render_help_popup(f: &mut Frame, scroll: usize) {
    let popup_area = popup_area(f.area());
    f.render_widget(Clear, popup_area);

    let help_lines: Vec<&str> = HELP_TEXT.lines().collect();
    let visible_height = popup_area.height.saturating_sub(2) as usize;

    let start_line = scroll.min(help_lines.len().saturating_sub(visible_height));
    let end_line = (start_line + visible_height).min(help_lines.len());

    let visible_text = help_lines[start_line..end_line].join("\n");

    let help_widget = Paragraph::new(visible_text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("gridcalc help (Line {}/{})", start_line + 1, help_lines.len()))
                .style(Style::default().fg(Color::Cyan)),
        )
        .style(Style::default().fg(Color::White));

    f.render_widget(help_widget, popup_area);
}

const HELP_TEXT: &str = r#"GRIDCALC FORMULAS

=== BASICS ===
• Formulas start with = (equals sign)
• Cell references are one uppercase column letter and a row number (A1, B2, Z99)
• Numbers can be integers or decimals (42, 3.14, .5)
• Empty cells count as 0; text in a referenced cell is an error

=== OPERATORS ===
+       Addition                    =5+3 → 8, =A1+B1
-       Subtraction / negation      =10-3 → 7, =-A1
*       Multiplication              =4*3 → 12
/       Division                    =15/3 → 5
( )     Grouping                    =(A1+B1)*2

=== ERRORS ===
#ERROR  Shown when a formula cannot be evaluated:
        syntax errors, division by zero, text operands,
        or a reference that leads back to the cell itself

=== EDITING ===
Enter/F2        Edit selected cell (Enter again commits)
Esc             Cancel edit
Delete/Bksp     Clear selected cell
Ctrl+C / Ctrl+X Copy / cut selected cell
Ctrl+V          Paste (formulas are re-evaluated in place)
Ctrl+Z / Ctrl+Y Undo / redo

=== FORMAT ===
Ctrl+B          Toggle bold
Ctrl+T          Toggle italic
Ctrl+U          Toggle underline
Ctrl+A          Cycle alignment (left, center, right)

=== FILES ===
Ctrl+S          Save (prompts for a title)
Ctrl+O          Open a saved spreadsheet
Ctrl+N          New spreadsheet
Ctrl+E          Export display values to CSV
Ctrl+L          Import CSV (replaces current data)

=== NAVIGATION ===
Arrow keys      Move selection (hjkl also work)
F1 or ?         Show this help
q               Quit

=== HELP NAVIGATION ===
↑↓ or j/k       Scroll help text up/down one line
Page Up/Down    Scroll help text up/down 5 lines
Home            Jump to top of help text
Esc/F1/?/q      Close this help window"#;
