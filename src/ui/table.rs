//! Result table that sizes every column to its content.
//!
//! Widths are measured in terminal cells. A column is as wide as its widest
//! value or its header, whichever is larger, plus a margin on both sides,
//! never exceeding [`WIDTH_MAX`]. Widths are recomputed whenever a new model
//! is installed or the installed model reports a change.

use std::cell::Cell;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use unicode_width::UnicodeWidthStr;

use crate::db::CellValue;
use crate::model::{EmptyTableModel, ListenerId, TableModel, TableModelEvent};

pub const DEFAULT_MARGIN: usize = 5;
pub const WIDTH_MAX: usize = 500;
/// Gap drawn between adjacent columns.
pub const COLUMN_SPACING: usize = 1;

/// Measures rendered text width.
pub trait TextMeasure: Send {
    fn width(&self, text: &str) -> usize;
}

/// Display width in terminal cells; wide CJK glyphs count as two.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisplayWidth;

impl TextMeasure for DisplayWidth {
    fn width(&self, text: &str) -> usize {
        UnicodeWidthStr::width(text)
    }
}

pub struct PackedTable {
    model: Box<dyn TableModel>,
    listener: Option<ListenerId>,
    stale: Arc<AtomicBool>,
    measure: Box<dyn TextMeasure>,
    margin: usize,
    widths: Vec<usize>,
    row: usize,
    column: usize,
    column_selection: bool,
    first_row: usize,
    first_column: usize,
    // Last drawn viewport, written during rendering.
    viewport_rows: Cell<usize>,
    viewport_width: Cell<usize>,
}

impl Default for PackedTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PackedTable {
    pub fn new() -> Self {
        Self::with_margin(DEFAULT_MARGIN)
    }

    pub fn with_margin(margin: usize) -> Self {
        let mut table = Self {
            model: Box::new(EmptyTableModel::new()),
            listener: None,
            stale: Arc::new(AtomicBool::new(false)),
            measure: Box::new(DisplayWidth),
            margin,
            widths: Vec::new(),
            row: 0,
            column: 0,
            column_selection: false,
            first_row: 0,
            first_column: 0,
            viewport_rows: Cell::new(0),
            viewport_width: Cell::new(0),
        };
        table.set_model(Box::new(EmptyTableModel::new()));
        table
    }

    pub fn with_measure(mut self, measure: Box<dyn TextMeasure>) -> Self {
        self.measure = measure;
        self.pack_columns();
        self
    }

    pub fn margin(&self) -> usize {
        self.margin
    }

    pub fn model(&self) -> &dyn TableModel {
        self.model.as_ref()
    }

    /// Install a model, subscribe to its changes and pack its columns.
    pub fn set_model(&mut self, mut model: Box<dyn TableModel>) {
        if let Some(id) = self.listener.take() {
            self.model.remove_listener(id);
        }
        let stale = Arc::clone(&self.stale);
        let id = model.add_listener(Box::new(move |_: &TableModelEvent| {
            stale.store(true, Ordering::Release);
        }));
        self.listener = Some(id);
        self.model = model;

        self.row = 0;
        self.column = 0;
        self.column_selection = false;
        self.first_row = 0;
        self.first_column = 0;
        self.pack_columns();
    }

    /// Write a cell if the model allows it.
    pub fn set_value_at(&mut self, value: CellValue, row: usize, column: usize) -> bool {
        if !self.model.is_cell_editable(row, column) {
            return false;
        }
        self.model.set_value_at(value, row, column);
        true
    }

    pub fn pack_columns(&mut self) {
        self.widths = (0..self.model.column_count())
            .map(|c| self.pack_width(c))
            .collect();
        self.stale.store(false, Ordering::Release);
        tracing::debug!("packed {} columns", self.widths.len());
    }

    /// Repack if the model changed since the last pack. Returns whether it did.
    pub fn repack_if_stale(&mut self) -> bool {
        if self.stale.swap(false, Ordering::AcqRel) {
            self.pack_columns();
            self.clamp_selection();
            true
        } else {
            false
        }
    }

    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }

    fn pack_width(&self, column: usize) -> usize {
        let header = self.measure.width(&self.model.column_name(column));
        let widest = (0..self.model.row_count())
            .map(|row| self.measure.width(&self.model.value_at(row, column).cell_text()))
            .max()
            .unwrap_or(0);
        (header.max(widest) + 2 * self.margin).min(WIDTH_MAX)
    }

    pub fn column_widths(&self) -> &[usize] {
        &self.widths
    }

    pub fn column_width(&self, column: usize) -> usize {
        self.widths.get(column).copied().unwrap_or(0)
    }

    /// Rows needed to show everything, header included.
    pub fn preferred_height(&self) -> usize {
        self.model.row_count() + 1
    }

    pub fn preferred_width(&self) -> usize {
        let spacing = self.widths.len().saturating_sub(1) * COLUMN_SPACING;
        self.widths.iter().sum::<usize>() + spacing
    }

    // --- selection ---

    pub fn selection(&self) -> Option<(usize, usize)> {
        if self.model.row_count() == 0 || self.model.column_count() == 0 {
            None
        } else {
            Some((self.row, self.column))
        }
    }

    pub fn is_column_selection(&self) -> bool {
        self.column_selection
    }

    pub fn toggle_column_selection(&mut self) {
        self.column_selection = !self.column_selection;
    }

    pub fn select(&mut self, row: usize, column: usize) {
        // Scrolling reads the widths, which must cover every model column.
        self.repack_if_stale();
        self.row = row;
        self.column = column;
        self.clamp_selection();
    }

    pub fn select_next_row(&mut self) {
        self.select(self.row.saturating_add(1), self.column);
    }

    pub fn select_previous_row(&mut self) {
        self.select(self.row.saturating_sub(1), self.column);
    }

    pub fn select_next_column(&mut self) {
        self.select(self.row, self.column.saturating_add(1));
    }

    pub fn select_previous_column(&mut self) {
        self.select(self.row, self.column.saturating_sub(1));
    }

    pub fn page_down(&mut self) {
        let page = self.viewport_rows.get().max(1);
        self.select(self.row.saturating_add(page), self.column);
    }

    pub fn page_up(&mut self) {
        let page = self.viewport_rows.get().max(1);
        self.select(self.row.saturating_sub(page), self.column);
    }

    pub fn select_first_row(&mut self) {
        self.select(0, self.column);
    }

    pub fn select_last_row(&mut self) {
        self.select(usize::MAX, self.column);
    }

    fn clamp_selection(&mut self) {
        self.row = self.row.min(self.model.row_count().saturating_sub(1));
        self.column = self.column.min(self.model.column_count().saturating_sub(1));
        self.scroll_to_selection();
    }

    fn scroll_to_selection(&mut self) {
        let rows = self.viewport_rows.get().max(1);
        if self.row < self.first_row {
            self.first_row = self.row;
        } else if self.row >= self.first_row + rows {
            self.first_row = self.row + 1 - rows;
        }

        if self.column < self.first_column {
            self.first_column = self.column;
        } else {
            let width = self.viewport_width.get();
            while self.first_column < self.column && self.span_width(self.first_column..self.column + 1) > width {
                self.first_column += 1;
            }
        }
    }

    fn span_width(&self, columns: Range<usize>) -> usize {
        let count = columns.len();
        self.widths[columns].iter().sum::<usize>() + count.saturating_sub(1) * COLUMN_SPACING
    }

    /// Text for the clipboard: the selected cell, or the whole selected
    /// column (header first, one value per line) in column selection mode.
    pub fn selection_text(&self) -> Option<String> {
        let (row, column) = self.selection()?;
        if self.column_selection {
            let mut lines = vec![self.model.column_name(column)];
            lines.extend((0..self.model.row_count()).map(|r| self.model.value_at(r, column).display()));
            Some(lines.join("\n"))
        } else {
            Some(self.model.value_at(row, column).display())
        }
    }

    // --- viewport ---

    /// Record the body size of the area the table is drawn into.
    pub fn set_viewport(&self, rows: usize, width: usize) {
        self.viewport_rows.set(rows);
        self.viewport_width.set(width);
    }

    pub fn visible_rows(&self) -> Range<usize> {
        let end = (self.first_row + self.viewport_rows.get()).min(self.model.row_count());
        self.first_row.min(end)..end
    }

    /// Columns that start inside the viewport; the last may be cut off.
    pub fn visible_columns(&self) -> Range<usize> {
        let width = self.viewport_width.get();
        let start = self.first_column.min(self.widths.len());
        let mut used = 0;
        let mut end = start;
        while end < self.widths.len() && used < width {
            used += self.widths[end] + COLUMN_SPACING;
            end += 1;
        }
        start..end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::testing::GridModel;
    use crate::model::RowStoreTableModel;

    fn store(columns: &[&str], rows: Vec<Vec<CellValue>>) -> Box<dyn TableModel> {
        Box::new(RowStoreTableModel::new(
            columns.iter().map(|c| c.to_string()).collect(),
            rows,
        ))
    }

    /// Counts characters, so tests don't depend on the width tables.
    struct CharCount;

    impl TextMeasure for CharCount {
        fn width(&self, text: &str) -> usize {
            text.chars().count()
        }
    }

    // --- packing ---

    #[test]
    fn test_width_is_widest_cell_plus_margins() {
        let mut table = PackedTable::new();
        table.set_model(store(
            &["id", "name"],
            vec![vec![1.into(), "al".into()], vec![22222.into(), "alexandra".into()]],
        ));
        assert_eq!(table.column_widths(), &[5 + 10, 9 + 10]);
    }

    #[test]
    fn test_header_wider_than_cells() {
        let mut table = PackedTable::with_margin(1);
        table.set_model(store(&["a_long_header"], vec![vec![1.into()]]));
        assert_eq!(table.column_width(0), 13 + 2);
    }

    #[test]
    fn test_width_is_capped() {
        let mut table = PackedTable::new();
        table.set_model(store(&["blob"], vec![vec!["x".repeat(1000).into()]]));
        assert_eq!(table.column_width(0), WIDTH_MAX);
    }

    #[test]
    fn test_empty_model_has_no_columns() {
        let table = PackedTable::new();
        assert!(table.column_widths().is_empty());
        assert_eq!(table.preferred_height(), 1);
        assert_eq!(table.preferred_width(), 0);
        assert!(table.selection().is_none());
        assert!(table.selection_text().is_none());
    }

    #[test]
    fn test_wide_glyphs_count_double() {
        let mut table = PackedTable::with_margin(0);
        table.set_model(store(&["k"], vec![vec!["日本".into()]]));
        assert_eq!(table.column_width(0), 4);
    }

    #[test]
    fn test_custom_measure() {
        let mut table = PackedTable::with_margin(0).with_measure(Box::new(CharCount));
        table.set_model(store(&["k"], vec![vec!["日本".into()]]));
        assert_eq!(table.column_width(0), 2);
    }

    #[test]
    fn test_null_and_error_cells_are_measured_by_their_text() {
        let mut table = PackedTable::with_margin(0);
        table.set_model(store(
            &["v"],
            vec![
                vec![CellValue::Null],
                vec![crate::db::DataAccessError::from_string("boom").into()],
            ],
        ));
        assert_eq!(table.column_width(0), "ERROR: boom".len());
    }

    #[test]
    fn test_change_event_triggers_repack() {
        let mut table = PackedTable::with_margin(0);
        table.set_model(Box::new(GridModel::new(&["c"], vec![vec!["ab".into()]])));
        assert_eq!(table.column_width(0), 2);
        assert!(!table.is_stale());

        assert!(table.set_value_at("abcdefgh".into(), 0, 0));
        assert!(table.is_stale());
        assert!(table.repack_if_stale());
        assert_eq!(table.column_width(0), 8);
        assert!(!table.repack_if_stale());
    }

    /// Gains a column whenever a cell is written.
    struct GrowingModel(GridModel);

    impl TableModel for GrowingModel {
        fn row_count(&self) -> usize {
            self.0.row_count()
        }

        fn column_count(&self) -> usize {
            self.0.column_count()
        }

        fn column_name(&self, column: usize) -> String {
            self.0.column_name(column)
        }

        fn value_at(&self, row: usize, column: usize) -> CellValue {
            self.0.value_at(row, column)
        }

        fn is_cell_editable(&self, _row: usize, _column: usize) -> bool {
            true
        }

        fn set_value_at(&mut self, value: CellValue, row: usize, _column: usize) {
            self.0.columns.push(format!("c{}", self.0.columns.len()));
            for (r, cells) in self.0.rows.iter_mut().enumerate() {
                cells.push(if r == row { value.clone() } else { CellValue::Null });
            }
            self.0.listeners.fire(&TableModelEvent::StructureChanged);
        }

        fn add_listener(&mut self, listener: crate::model::TableModelListener) -> ListenerId {
            self.0.add_listener(listener)
        }

        fn remove_listener(&mut self, id: ListenerId) -> bool {
            self.0.remove_listener(id)
        }
    }

    #[test]
    fn test_select_after_structure_change() {
        let mut table = PackedTable::with_margin(0);
        table.set_model(Box::new(GrowingModel(GridModel::new(&["c"], vec![vec!["ab".into()]]))));
        table.set_viewport(5, 3);
        assert!(table.set_value_at("wide".into(), 0, 0));
        assert!(table.is_stale());

        table.select(0, 1);
        assert_eq!(table.selection(), Some((0, 1)));
        assert_eq!(table.column_widths(), &[2, 4]);
        assert!(!table.is_stale());
    }

    #[test]
    fn test_replacing_model_repacks_and_unsubscribes() {
        let mut table = PackedTable::with_margin(0);
        table.set_model(store(&["a"], vec![vec!["1234".into()]]));
        table.set_model(store(&["a", "b"], vec![vec!["1".into(), "12".into()]]));
        assert_eq!(table.column_widths(), &[1, 2]);
        assert!(!table.set_value_at("x".into(), 0, 0));
    }

    // --- selection ---

    fn grid_table() -> PackedTable {
        let mut table = PackedTable::with_margin(0);
        table.set_model(store(
            &["id", "name"],
            (1..=10)
                .map(|i| vec![CellValue::Int32(i), format!("user{}", i).into()])
                .collect(),
        ));
        table.set_viewport(4, 80);
        table
    }

    #[test]
    fn test_navigation_clamps() {
        let mut table = grid_table();
        table.select_previous_row();
        table.select_previous_column();
        assert_eq!(table.selection(), Some((0, 0)));

        table.select_last_row();
        table.select_next_column();
        table.select_next_column();
        assert_eq!(table.selection(), Some((9, 1)));
    }

    #[test]
    fn test_scrolls_to_keep_selection_visible() {
        let mut table = grid_table();
        assert_eq!(table.visible_rows(), 0..4);
        table.select(6, 0);
        assert_eq!(table.visible_rows(), 3..7);
        table.page_up();
        assert_eq!(table.selection(), Some((2, 0)));
        assert_eq!(table.visible_rows(), 2..6);
    }

    #[test]
    fn test_horizontal_scroll() {
        let mut table = PackedTable::with_margin(0);
        table.set_model(store(
            &["aaaaaaaaaa", "bbbbbbbbbb", "cccccccccc"],
            vec![vec![1.into(), 2.into(), 3.into()]],
        ));
        table.set_viewport(5, 15);
        assert_eq!(table.visible_columns(), 0..2);
        table.select(0, 2);
        assert_eq!(table.visible_columns(), 2..3);
        table.select(0, 0);
        assert_eq!(table.visible_columns(), 0..2);
    }

    #[test]
    fn test_selection_text() {
        let mut table = grid_table();
        table.select(1, 1);
        assert_eq!(table.selection_text().as_deref(), Some("user2"));

        table.toggle_column_selection();
        let text = table.selection_text().unwrap();
        assert!(text.starts_with("name\nuser1\nuser2\n"));
        assert_eq!(text.lines().count(), 11);
    }

    #[test]
    fn test_new_model_resets_selection() {
        let mut table = grid_table();
        table.select(5, 1);
        table.toggle_column_selection();
        table.set_model(store(&["x"], vec![vec![1.into()]]));
        assert_eq!(table.selection(), Some((0, 0)));
        assert!(!table.is_column_selection());
    }
}
