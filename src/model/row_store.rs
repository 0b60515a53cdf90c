use crate::db::{CellValue, Cursor, DataAccessError};

use super::{ListenerId, Listeners, TableModel, TableModelListener};

/// In-memory snapshot of a result set.
///
/// Built by draining a cursor once; afterwards it never touches the cursor
/// again, so the cursor may be advanced or closed freely.
#[derive(Debug)]
pub struct RowStoreTableModel {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
    listeners: Listeners,
}

impl RowStoreTableModel {
    /// Drain `cursor` into a snapshot. Column headers are the metadata names.
    ///
    /// Any failure while reading aborts construction.
    pub fn from_cursor(cursor: &mut dyn Cursor) -> Result<Self, DataAccessError> {
        let columns: Vec<String> = cursor.columns().iter().map(|c| c.name.clone()).collect();
        let width = columns.len();

        let mut rows = Vec::new();
        while cursor.next()? {
            let row = (0..width)
                .map(|c| cursor.get(c))
                .collect::<Result<Vec<_>, _>>()?;
            rows.push(row);
        }

        tracing::debug!("snapshot of {} rows x {} columns", rows.len(), width);
        Ok(Self::new(columns, rows))
    }

    /// Snapshot from values already in hand. Short rows are padded with NULLs.
    pub fn new(columns: Vec<String>, mut rows: Vec<Vec<CellValue>>) -> Self {
        let width = columns.len();
        for row in &mut rows {
            row.resize(width, CellValue::Null);
        }
        Self {
            columns,
            rows,
            listeners: Listeners::default(),
        }
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }
}

impl TableModel for RowStoreTableModel {
    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn column_name(&self, column: usize) -> String {
        self.columns.get(column).cloned().unwrap_or_default()
    }

    fn value_at(&self, row: usize, column: usize) -> CellValue {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .cloned()
            .unwrap_or(CellValue::Null)
    }

    fn add_listener(&mut self, listener: TableModelListener) -> ListenerId {
        self.listeners.add(listener)
    }

    fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ColumnMeta, MemoryCursor, ScrollableCursor};

    /// Yields `good_rows` rows, then fails.
    struct FailingCursor {
        columns: Vec<ColumnMeta>,
        good_rows: usize,
        seen: usize,
    }

    impl Cursor for FailingCursor {
        fn columns(&self) -> &[ColumnMeta] {
            &self.columns
        }

        fn next(&mut self) -> Result<bool, DataAccessError> {
            if self.seen == self.good_rows {
                return Err(DataAccessError::from_string("connection reset"));
            }
            self.seen += 1;
            Ok(true)
        }

        fn get(&self, _column: usize) -> Result<CellValue, DataAccessError> {
            Ok(CellValue::Int32(self.seen as i32))
        }

        fn close(&mut self) -> Result<(), DataAccessError> {
            Ok(())
        }

        fn is_closed(&self) -> bool {
            false
        }
    }

    fn source() -> MemoryCursor {
        MemoryCursor::new(
            vec![
                ColumnMeta::new("id", "user_id", "int4"),
                ColumnMeta::new("name", "user_name", "text"),
            ],
            vec![
                vec![1.into(), "alice".into()],
                vec![2.into(), CellValue::Null],
                vec![3.into(), "carol".into()],
            ],
        )
    }

    #[test]
    fn test_snapshot_dimensions_and_values() {
        let mut cursor = source();
        let model = RowStoreTableModel::from_cursor(&mut cursor).unwrap();
        assert_eq!(model.row_count(), 3);
        assert_eq!(model.column_count(), 2);
        assert_eq!(model.value_at(0, 1), CellValue::from("alice"));
        assert_eq!(model.value_at(1, 1), CellValue::Null);
        assert_eq!(model.value_at(2, 0), CellValue::Int32(3));
    }

    #[test]
    fn test_snapshot_uses_column_names_not_labels() {
        let mut cursor = source();
        let model = RowStoreTableModel::from_cursor(&mut cursor).unwrap();
        assert_eq!(model.column_name(0), "id");
        assert_eq!(model.column_name(1), "name");
    }

    #[test]
    fn test_snapshot_survives_cursor_reuse_and_close() {
        let mut cursor = source();
        let model = RowStoreTableModel::from_cursor(&mut cursor).unwrap();
        cursor.absolute(1).unwrap();
        cursor.close().unwrap();
        assert_eq!(model.value_at(0, 0), CellValue::Int32(1));
        assert_eq!(model.value_at(2, 1), CellValue::from("carol"));
    }

    #[test]
    fn test_snapshot_fails_fast() {
        let mut cursor = FailingCursor {
            columns: vec![ColumnMeta::named("n", "int4")],
            good_rows: 2,
            seen: 0,
        };
        let err = RowStoreTableModel::from_cursor(&mut cursor).unwrap_err();
        assert_eq!(err.message, "connection reset");
    }

    #[test]
    fn test_empty_cursor() {
        let mut cursor = MemoryCursor::from_names(&["a", "b", "c"], vec![]);
        let model = RowStoreTableModel::from_cursor(&mut cursor).unwrap();
        assert_eq!(model.row_count(), 0);
        assert_eq!(model.column_count(), 3);
    }

    #[test]
    fn test_read_only() {
        let mut model = RowStoreTableModel::new(vec!["a".into()], vec![vec![1.into()]]);
        assert!(!model.is_cell_editable(0, 0));
        model.set_value_at(CellValue::Int32(9), 0, 0);
        assert_eq!(model.value_at(0, 0), CellValue::Int32(1));
    }

    #[test]
    fn test_new_pads_short_rows() {
        let model = RowStoreTableModel::new(vec!["a".into(), "b".into()], vec![vec![1.into()]]);
        assert_eq!(model.value_at(0, 1), CellValue::Null);
    }
}
