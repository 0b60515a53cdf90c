//! State owned by the UI thread: the result table, the query box, focus,
//! the split between them and the modal error dialog.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tokio::sync::oneshot;

use crate::editor::TextBuffer;
use crate::model::TableModel;

use super::table::PackedTable;
use super::theme::Theme;

/// Rows reserved for the query pane below the divider.
pub const QUERY_PANEL_HEIGHT: u16 = 7;
/// Title and status bars.
pub const SCREEN_HEIGHT_FUDGE: u16 = 2;
/// Top and bottom border of the table pane.
const TABLE_CHROME: usize = 2;

/// Height of the table pane: tall enough for the whole table, but never
/// crowding out the query pane.
pub fn divider_height(table_rows: usize, screen_height: u16) -> u16 {
    let available = screen_height.saturating_sub(QUERY_PANEL_HEIGHT + SCREEN_HEIGHT_FUDGE);
    let wanted = u16::try_from(table_rows + TABLE_CHROME).unwrap_or(u16::MAX);
    available.min(wanted)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Table,
    QueryBox,
    SendButton,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusType {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewAction {
    None,
    Send,
    Quit,
}

/// Modal message; whoever raised it may wait for the acknowledgement.
pub struct ErrorDialog {
    pub title: String,
    pub message: String,
    ack: Option<oneshot::Sender<()>>,
}

impl ErrorDialog {
    fn acknowledge(mut self) {
        if let Some(ack) = self.ack.take() {
            let _ = ack.send(());
        }
    }
}

pub struct ResultView {
    pub theme: Theme,
    pub table: PackedTable,
    pub query_box: TextBuffer,
    pub has_query_box: bool,
    pub focus: Focus,
    pub best_layout: bool,
    pub connection_label: String,
    pub status: Option<(String, StatusType)>,
    pub busy: bool,
    dialog: Option<ErrorDialog>,
    screen_height: u16,
    divider: Option<u16>,
}

impl ResultView {
    pub fn new(table: PackedTable, has_query_box: bool) -> Self {
        Self {
            theme: Theme::default(),
            table,
            query_box: TextBuffer::new(),
            has_query_box,
            focus: if has_query_box { Focus::QueryBox } else { Focus::Table },
            best_layout: false,
            connection_label: String::new(),
            status: None,
            busy: false,
            dialog: None,
            screen_height: 0,
            divider: None,
        }
    }

    pub fn install_model(&mut self, model: Box<dyn TableModel>) {
        self.table.set_model(model);
        self.update_divider();
    }

    pub fn set_query_text(&mut self, text: &str) {
        self.query_box.set_text(text);
    }

    pub fn query_text(&self) -> String {
        self.query_box.text()
    }

    pub fn resize(&mut self, height: u16) {
        self.screen_height = height;
        self.update_divider();
    }

    /// Table pane height, once a model has been laid out against a known
    /// screen size. `None` means split evenly.
    pub fn divider(&self) -> Option<u16> {
        self.divider
    }

    fn update_divider(&mut self) {
        self.divider = (self.has_query_box && self.screen_height > 0)
            .then(|| divider_height(self.table.preferred_height(), self.screen_height));
    }

    pub fn set_status(&mut self, message: impl Into<String>, status_type: StatusType) {
        self.status = Some((message.into(), status_type));
    }

    // --- dialog ---

    pub fn show_dialog(&mut self, title: &str, message: &str, ack: Option<oneshot::Sender<()>>) {
        if let Some(previous) = self.dialog.take() {
            previous.acknowledge();
        }
        self.dialog = Some(ErrorDialog {
            title: title.to_string(),
            message: message.to_string(),
            ack,
        });
    }

    pub fn dialog(&self) -> Option<&ErrorDialog> {
        self.dialog.as_ref()
    }

    pub fn dismiss_dialog(&mut self) {
        if let Some(dialog) = self.dialog.take() {
            dialog.acknowledge();
        }
    }

    // --- keys ---

    pub fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
        if self.dialog.is_some() {
            if matches!(key.code, KeyCode::Enter | KeyCode::Esc | KeyCode::Char(' ')) {
                self.dismiss_dialog();
            }
            return ViewAction::None;
        }

        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('q') if ctrl => return ViewAction::Quit,
            KeyCode::F(5) => return ViewAction::Send,
            KeyCode::Enter if ctrl => return ViewAction::Send,
            KeyCode::Char('p') if ctrl => {
                self.best_layout = !self.best_layout;
                let state = if self.best_layout { "on" } else { "off" };
                self.set_status(format!("Best layout {} (next query)", state), StatusType::Info);
                return ViewAction::None;
            }
            KeyCode::Tab => {
                self.cycle_focus(true);
                return ViewAction::None;
            }
            KeyCode::BackTab => {
                self.cycle_focus(false);
                return ViewAction::None;
            }
            _ => {}
        }

        match self.focus {
            Focus::Table => {
                self.handle_table_key(key);
                ViewAction::None
            }
            Focus::QueryBox => {
                self.handle_query_key(key);
                ViewAction::None
            }
            Focus::SendButton => match key.code {
                KeyCode::Enter | KeyCode::Char(' ') => ViewAction::Send,
                _ => ViewAction::None,
            },
        }
    }

    fn cycle_focus(&mut self, forward: bool) {
        if !self.has_query_box {
            self.focus = Focus::Table;
            return;
        }
        let order = [Focus::Table, Focus::QueryBox, Focus::SendButton];
        let at = order.iter().position(|f| *f == self.focus).unwrap_or(0);
        let next = if forward { at + 1 } else { at + order.len() - 1 };
        self.focus = order[next % order.len()];
    }

    fn handle_table_key(&mut self, key: KeyEvent) {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let table = &mut self.table;
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => table.select_previous_row(),
            KeyCode::Down | KeyCode::Char('j') => table.select_next_row(),
            KeyCode::Left | KeyCode::Char('h') => table.select_previous_column(),
            KeyCode::Right | KeyCode::Char('l') => table.select_next_column(),
            KeyCode::PageUp => table.page_up(),
            KeyCode::PageDown => table.page_down(),
            KeyCode::Home | KeyCode::Char('g') => table.select_first_row(),
            KeyCode::End | KeyCode::Char('G') => table.select_last_row(),
            KeyCode::Char('c') if ctrl => self.copy_selection(),
            KeyCode::Char('y') => self.copy_selection(),
            KeyCode::Char('c') => {
                table.toggle_column_selection();
                let mode = if table.is_column_selection() { "Column" } else { "Cell" };
                self.set_status(format!("{} selection", mode), StatusType::Info);
            }
            _ => {}
        }
    }

    fn copy_selection(&mut self) {
        let Some(text) = self.table.selection_text() else {
            return;
        };
        let what = if self.table.is_column_selection() { "Column" } else { "Cell" };
        match arboard::Clipboard::new().and_then(|mut clipboard| clipboard.set_text(text)) {
            Ok(()) => self.set_status(format!("{} copied to clipboard", what), StatusType::Success),
            Err(e) => {
                tracing::warn!("clipboard unavailable: {}", e);
                self.set_status(format!("Copy failed: {}", e), StatusType::Error);
            }
        }
    }

    fn handle_query_key(&mut self, key: KeyEvent) {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let shift = key.modifiers.contains(KeyModifiers::SHIFT);
        let buf = &mut self.query_box;

        let is_motion = matches!(
            key.code,
            KeyCode::Left
                | KeyCode::Right
                | KeyCode::Up
                | KeyCode::Down
                | KeyCode::Home
                | KeyCode::End
        );
        if is_motion {
            if shift {
                buf.start_selection();
            } else {
                buf.clear_selection();
            }
        }

        match key.code {
            KeyCode::Char('a') if ctrl => buf.select_all(),
            KeyCode::Char('c') if ctrl => {
                buf.copy();
            }
            KeyCode::Char('x') if ctrl => {
                buf.cut();
            }
            KeyCode::Char('v') if ctrl => buf.paste(),
            KeyCode::Left if ctrl => buf.move_word_left(),
            KeyCode::Right if ctrl => buf.move_word_right(),
            KeyCode::Home if ctrl => buf.move_to_start(),
            KeyCode::End if ctrl => buf.move_to_end(),
            KeyCode::Left => buf.move_left(),
            KeyCode::Right => buf.move_right(),
            KeyCode::Up => buf.move_up(),
            KeyCode::Down => buf.move_down(),
            KeyCode::Home => buf.move_to_line_start(),
            KeyCode::End => buf.move_to_line_end(),
            KeyCode::Enter => buf.insert_newline(),
            KeyCode::Backspace => buf.backspace(),
            KeyCode::Delete => buf.delete(),
            KeyCode::Char(c) if !ctrl => buf.insert_char(c),
            _ => {}
        }
    }
}
