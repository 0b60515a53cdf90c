use crate::db::{CellValue, CursorHandle, DataAccessError, ErrorCategory};

use super::{ListenerId, Listeners, TableModel, TableModelListener};

/// Live view over an open scrollable cursor.
///
/// Every cell read repositions the cursor. Column headers are the metadata
/// labels, so query aliases show through.
#[derive(Debug)]
pub struct ScrollableTableModel {
    cursor: CursorHandle,
    columns: Vec<String>,
    row_count: usize,
    listeners: Listeners,
}

impl ScrollableTableModel {
    /// Reads the labels and counts the rows by moving to the last one.
    pub fn new(cursor: CursorHandle) -> Result<Self, DataAccessError> {
        let columns = cursor
            .columns()?
            .into_iter()
            .map(|c| c.label)
            .collect();
        let row_count = cursor.with(|c| Ok(if c.last()? { c.position() } else { 0 }))?;

        Ok(Self {
            cursor,
            columns,
            row_count,
            listeners: Listeners::default(),
        })
    }

    pub fn cursor(&self) -> &CursorHandle {
        &self.cursor
    }

    fn read(&self, row: usize, column: usize) -> Result<CellValue, DataAccessError> {
        self.cursor.with(|c| {
            if !c.absolute(row + 1)? {
                return Err(DataAccessError::with_category(
                    ErrorCategory::State,
                    format!("no row at position {}", row + 1),
                ));
            }
            c.get(column)
        })
    }
}

impl TableModel for ScrollableTableModel {
    fn row_count(&self) -> usize {
        self.row_count
    }

    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn column_name(&self, column: usize) -> String {
        self.columns.get(column).cloned().unwrap_or_default()
    }

    /// A failed read shows up as an error cell instead of propagating.
    fn value_at(&self, row: usize, column: usize) -> CellValue {
        match self.read(row, column) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("read of cell ({}, {}) failed: {}", row, column, err);
                CellValue::from(err)
            }
        }
    }

    fn add_listener(&mut self, listener: TableModelListener) -> ListenerId {
        self.listeners.add(listener)
    }

    fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }
}
