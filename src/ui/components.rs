use ratatui::{
    layout::{Alignment, Constraint, Direction, Flex, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, Wrap},
    Frame,
};
use unicode_width::UnicodeWidthStr;

use crate::ui::table::COLUMN_SPACING;
use crate::ui::{Focus, ResultView, StatusType, FRAME_TITLE};

const SEND_BUTTON_WIDTH: u16 = 10;

pub fn draw(frame: &mut Frame, view: &ResultView) {
    let mut constraints = vec![Constraint::Length(1)];
    if view.has_query_box {
        constraints.push(match view.divider() {
            Some(height) => Constraint::Length(height),
            None => Constraint::Percentage(50),
        });
        constraints.push(Constraint::Min(0));
    } else {
        constraints.push(Constraint::Min(0));
    }
    constraints.push(Constraint::Length(1));

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(frame.area());

    draw_header(frame, view, chunks[0]);
    draw_result_table(frame, view, chunks[1]);
    if view.has_query_box {
        draw_query_pane(frame, view, chunks[2]);
    }
    draw_status_bar(frame, view, chunks[chunks.len() - 1]);

    if view.dialog().is_some() {
        draw_error_dialog(frame, view);
    }
}

fn draw_header(frame: &mut Frame, view: &ResultView, area: Rect) {
    let text = if view.connection_label.is_empty() {
        format!(" {}", FRAME_TITLE)
    } else {
        format!(" {} | {}", FRAME_TITLE, view.connection_label)
    };
    frame.render_widget(Paragraph::new(text).style(view.theme.header()), area);
}

fn draw_result_table(frame: &mut Frame, view: &ResultView, area: Rect) {
    let theme = &view.theme;
    let table = &view.table;
    let model = table.model();
    let focused = view.focus == Focus::Table;

    let mut title = format!(" {} rows x {} columns ", model.row_count(), model.column_count());
    if table.is_column_selection() {
        title.push_str("[column] ");
    }
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(theme.border_style(focused))
        .title(title)
        .title_style(if focused {
            Style::default().fg(theme.text_accent)
        } else {
            Style::default().fg(theme.text_secondary)
        });
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if model.column_count() == 0 {
        let empty = Paragraph::new("No results").style(theme.muted());
        frame.render_widget(empty, inner);
        return;
    }

    // One line goes to the header.
    table.set_viewport(inner.height.saturating_sub(1) as usize, inner.width as usize);
    let columns = table.visible_columns();
    let selection = table.selection();
    let pad = " ".repeat(table.margin());

    let header_cells: Vec<Cell> = columns
        .clone()
        .map(|c| {
            let style = match selection {
                Some((_, col)) if col == c && table.is_column_selection() => {
                    theme.header().fg(theme.text_accent)
                }
                _ => theme.header(),
            };
            Cell::from(format!("{}{}", pad, model.column_name(c))).style(style)
        })
        .collect();
    let header = Row::new(header_cells).height(1);

    let rows: Vec<Row> = table
        .visible_rows()
        .map(|r| {
            let cells: Vec<Cell> = columns
                .clone()
                .map(|c| {
                    let value = model.value_at(r, c);
                    let base = if value.is_error() {
                        theme.error_cell()
                    } else if value.is_null() {
                        theme.null_cell()
                    } else {
                        Style::default().fg(theme.text_primary)
                    };
                    let style = match selection {
                        Some((_, col)) if table.is_column_selection() && col == c => {
                            base.patch(theme.column_highlight())
                        }
                        Some((row, col)) if row == r && col == c => {
                            base.patch(theme.selected()).add_modifier(Modifier::BOLD)
                        }
                        Some((row, _)) if row == r && !table.is_column_selection() => {
                            base.bg(theme.bg_secondary)
                        }
                        _ => base,
                    };
                    Cell::from(format!("{}{}", pad, value.cell_text())).style(style)
                })
                .collect();
            Row::new(cells).height(1)
        })
        .collect();

    let widths: Vec<Constraint> = columns
        .map(|c| Constraint::Length(table.column_width(c) as u16))
        .collect();

    let widget = Table::new(rows, widths)
        .header(header)
        .column_spacing(COLUMN_SPACING as u16)
        .flex(Flex::Start);
    frame.render_widget(widget, inner);
}

fn draw_query_pane(frame: &mut Frame, view: &ResultView, area: Rect) {
    let theme = &view.theme;
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(SEND_BUTTON_WIDTH), Constraint::Min(0)])
        .split(area);

    let button_area = Rect::new(chunks[0].x, chunks[0].y, chunks[0].width, 3.min(chunks[0].height));
    let button = Paragraph::new("Send")
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL))
        .style(theme.button(view.focus == Focus::SendButton));
    frame.render_widget(button, button_area);

    let focused = view.focus == Focus::QueryBox;
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(theme.border_style(focused))
        .title(" Query (F5 to send) ")
        .title_style(if focused {
            Style::default().fg(theme.text_accent)
        } else {
            Style::default().fg(theme.text_secondary)
        });
    let inner = block.inner(chunks[1]);
    frame.render_widget(block, chunks[1]);

    let buf = &view.query_box;
    let height = inner.height as usize;
    if height == 0 {
        return;
    }
    // Keep the cursor line on screen even if the stored offset lags behind.
    let offset = buf
        .scroll_offset
        .max((buf.cursor_y + 1).saturating_sub(height))
        .min(buf.cursor_y);

    let selection = if buf.has_selection() { buf.selection() } else { None };
    let lines: Vec<Line> = buf
        .lines
        .iter()
        .enumerate()
        .skip(offset)
        .take(height)
        .map(|(y, text)| match selection {
            Some(((sx, sy), (ex, ey))) if y >= sy && y <= ey => {
                let from = if y == sy { sx } else { 0 };
                let to = if y == ey { ex } else { text.chars().count() };
                let before: String = text.chars().take(from).collect();
                let chosen: String = text.chars().skip(from).take(to - from).collect();
                let after: String = text.chars().skip(to).collect();
                Line::from(vec![
                    Span::raw(before),
                    Span::styled(chosen, theme.selected()),
                    Span::raw(after),
                ])
            }
            _ => Line::from(text.as_str()),
        })
        .collect();
    frame.render_widget(
        Paragraph::new(lines).style(Style::default().fg(theme.text_primary)),
        inner,
    );

    if focused {
        let prefix: String = buf.current_line().chars().take(buf.cursor_x).collect();
        let x = inner.x + (UnicodeWidthStr::width(prefix.as_str()) as u16).min(inner.width.saturating_sub(1));
        let y = inner.y + (buf.cursor_y - offset) as u16;
        frame.set_cursor_position((x, y));
    }
}

fn draw_status_bar(frame: &mut Frame, view: &ResultView, area: Rect) {
    let theme = &view.theme;

    let (left_text, left_style) = if view.busy {
        (" Running query...".to_string(), Style::default().fg(theme.text_accent))
    } else if let Some((message, status_type)) = &view.status {
        let style = match status_type {
            StatusType::Info => Style::default().fg(theme.text_secondary),
            StatusType::Success => theme.status_success(),
            StatusType::Warning => theme.status_warning(),
            StatusType::Error => theme.status_error(),
        };
        (format!(" {}", message.lines().next().unwrap_or_default()), style)
    } else {
        (" Ready".to_string(), theme.muted())
    };

    let layout = if view.best_layout { "best" } else { "table" };
    let send_keys = if view.has_query_box { " | F5 Send | Tab Focus" } else { "" };
    let right_text = format!(
        "Layout: {}{} | c Column | Ctrl+C Copy | Ctrl+P Layout | Ctrl+Q Quit ",
        layout, send_keys
    );

    let left_len = UnicodeWidthStr::width(left_text.as_str()) as u16;
    let right_len = right_text.len() as u16;
    let padding = area.width.saturating_sub(left_len + right_len);

    let status_line = Line::from(vec![
        Span::styled(left_text, left_style.bg(theme.bg_secondary)),
        Span::styled(" ".repeat(padding as usize), Style::default().bg(theme.bg_secondary)),
        Span::styled(right_text, theme.muted().bg(theme.bg_secondary)),
    ]);
    frame.render_widget(Paragraph::new(status_line), area);
}

fn draw_error_dialog(frame: &mut Frame, view: &ResultView) {
    let Some(dialog) = view.dialog() else {
        return;
    };
    let theme = &view.theme;
    let area = frame.area();

    let width = 70.min(area.width.saturating_sub(4));
    let text_width = width.saturating_sub(2).max(1) as usize;
    let wrapped: usize = dialog
        .message
        .lines()
        .map(|l| UnicodeWidthStr::width(l).max(1).div_ceil(text_width))
        .sum();
    let height = (wrapped as u16 + 4).min(area.height.saturating_sub(2));

    let x = (area.width - width) / 2;
    let y = (area.height.saturating_sub(height)) / 2;
    let dialog_area = Rect::new(x, y, width, height);
    frame.render_widget(Clear, dialog_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.error))
        .title(format!(" {} ", dialog.title))
        .title_style(Style::default().fg(theme.error).add_modifier(Modifier::BOLD))
        .style(Style::default().bg(theme.bg_primary));
    let inner = block.inner(dialog_area);
    frame.render_widget(block, dialog_area);

    if inner.height < 2 {
        return;
    }
    let message_area = Rect::new(inner.x, inner.y, inner.width, inner.height - 1);
    frame.render_widget(
        Paragraph::new(dialog.message.as_str())
            .style(Style::default().fg(theme.text_primary))
            .wrap(Wrap { trim: false }),
        message_area,
    );

    let hint_area = Rect::new(inner.x, inner.y + inner.height - 1, inner.width, 1);
    frame.render_widget(
        Paragraph::new("Enter: OK").alignment(Alignment::Center).style(theme.muted()),
        hint_area,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CellValue, DataAccessError};
    use crate::model::{RowStoreTableModel, TableModel};
    use crate::ui::PackedTable;
    use ratatui::{backend::TestBackend, Terminal};

    fn render(view: &ResultView, width: u16, height: u16) -> Vec<String> {
        let mut terminal = Terminal::new(TestBackend::new(width, height)).unwrap();
        terminal.draw(|f| draw(f, view)).unwrap();
        let buffer = terminal.backend().buffer();
        buffer
            .content
            .chunks(width as usize)
            .map(|row| row.iter().map(|cell| cell.symbol()).collect())
            .collect()
    }

    fn model() -> Box<dyn TableModel> {
        Box::new(RowStoreTableModel::new(
            vec!["id".into(), "email".into()],
            vec![
                vec![1.into(), "alice@example.com".into()],
                vec![2.into(), CellValue::Null],
                vec![3.into(), DataAccessError::from_string("bad bytes").into()],
            ],
        ))
    }

    fn view(query_box: bool) -> ResultView {
        let mut view = ResultView::new(PackedTable::with_margin(1), query_box);
        view.resize(24);
        view.install_model(model());
        view
    }

    #[test]
    fn test_draws_title_header_and_rows() {
        let screen = render(&view(true), 100, 24).join("\n");
        assert!(screen.contains(FRAME_TITLE));
        assert!(screen.contains("3 rows x 2 columns"));
        assert!(screen.contains(" id"));
        assert!(screen.contains("alice@example.com"));
        assert!(screen.contains("NULL"));
        assert!(screen.contains("ERROR: bad bytes"));
        assert!(screen.contains("Send"));
    }

    #[test]
    fn test_divider_places_query_pane_below_table() {
        let v = view(true);
        let lines = render(&v, 100, 24);
        // title line + table pane, then the query pane border.
        let query_row = 1 + v.divider().unwrap() as usize;
        assert!(lines[query_row].contains("Query"));
    }

    #[test]
    fn test_without_query_box() {
        let screen = render(&view(false), 100, 24).join("\n");
        assert!(!screen.contains("Send"));
        assert!(!screen.contains("Tab Focus"));
        assert!(!screen.contains("Query"));
        assert!(screen.contains("alice@example.com"));
        assert!(screen.contains("Ctrl+Q Quit"));
    }

    #[test]
    fn test_empty_model() {
        let mut v = view(true);
        v.install_model(Box::new(crate::model::EmptyTableModel::new()));
        let screen = render(&v, 100, 24).join("\n");
        assert!(screen.contains("0 rows x 0 columns"));
        assert!(screen.contains("No results"));
    }

    #[test]
    fn test_error_dialog_overlay() {
        let mut v = view(true);
        v.show_dialog("Database Error", "syntax error at or near \"selec\"", None);
        let screen = render(&v, 100, 24).join("\n");
        assert!(screen.contains("Database Error"));
        assert!(screen.contains("syntax error at or near"));
        assert!(screen.contains("Enter: OK"));
    }

    #[test]
    fn test_tiny_terminal_does_not_panic() {
        let mut v = view(true);
        v.resize(4);
        v.show_dialog("Database Error", "x", None);
        render(&v, 8, 4);
    }
}
