use crate::db::CellValue;

use super::{ListenerId, TableModel, TableModelListener};

const PIVOT_COLUMNS: [&str; 2] = ["Column", "Value"];

/// Shows the first row of a model as a vertical (column, value) list.
///
/// Row `i` holds the delegate's column name `i` and its value in row 0.
/// Meant for single-row delegates; other rows of the delegate are ignored.
#[derive(Debug)]
pub struct PivotTableModel<M> {
    delegate: M,
}

impl<M: TableModel> PivotTableModel<M> {
    pub fn new(delegate: M) -> Self {
        Self { delegate }
    }

    pub fn delegate(&self) -> &M {
        &self.delegate
    }

    pub fn into_inner(self) -> M {
        self.delegate
    }
}

impl<M: TableModel> TableModel for PivotTableModel<M> {
    fn row_count(&self) -> usize {
        self.delegate.column_count()
    }

    fn column_count(&self) -> usize {
        PIVOT_COLUMNS.len()
    }

    fn column_name(&self, column: usize) -> String {
        PIVOT_COLUMNS
            .get(column)
            .map(|name| name.to_string())
            .unwrap_or_default()
    }

    fn value_at(&self, row: usize, column: usize) -> CellValue {
        if column == 0 {
            CellValue::Text(self.delegate.column_name(row))
        } else {
            self.delegate.value_at(0, row)
        }
    }

    fn is_cell_editable(&self, row: usize, column: usize) -> bool {
        self.delegate.is_cell_editable(column, row)
    }

    fn set_value_at(&mut self, value: CellValue, row: usize, column: usize) {
        self.delegate.set_value_at(value, column, row)
    }

    fn add_listener(&mut self, listener: TableModelListener) -> ListenerId {
        self.delegate.add_listener(listener)
    }

    fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.delegate.remove_listener(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::testing::GridModel;
    use crate::model::{TableModelEvent, column_names};
    use std::sync::{Arc, Mutex};

    fn single_row() -> GridModel {
        GridModel::new(
            &["id", "name", "email"],
            vec![vec![7.into(), "alice".into(), CellValue::Null]],
        )
    }

    #[test]
    fn test_pivot_shape() {
        let pivot = PivotTableModel::new(single_row());
        assert_eq!(pivot.row_count(), 3);
        assert_eq!(pivot.column_count(), 2);
        assert_eq!(column_names(&pivot), vec!["Column", "Value"]);
    }

    #[test]
    fn test_pivot_mapping() {
        let delegate = single_row();
        let pivot = PivotTableModel::new(single_row());
        for i in 0..delegate.column_count() {
            assert_eq!(pivot.value_at(i, 0), CellValue::Text(delegate.column_name(i)));
            assert_eq!(pivot.value_at(i, 1), delegate.value_at(0, i));
        }
    }

    #[test]
    fn test_multi_row_delegate_pivots_first_row() {
        let pivot = PivotTableModel::new(GridModel::new(
            &["a", "b"],
            vec![vec![1.into(), 2.into()], vec![3.into(), 4.into()]],
        ));
        assert_eq!(pivot.row_count(), 2);
        assert_eq!(pivot.value_at(0, 1), CellValue::Int32(1));
        assert_eq!(pivot.value_at(1, 1), CellValue::Int32(2));
    }

    #[test]
    fn test_editability_and_writes_swap_coordinates() {
        let mut pivot = PivotTableModel::new(single_row());
        // GridModel only allows edits in its row 0, i.e. pivot column 0.
        assert!(pivot.is_cell_editable(2, 0));
        assert!(!pivot.is_cell_editable(0, 1));

        pivot.set_value_at("bob".into(), 1, 0);
        assert_eq!(pivot.delegate().value_at(0, 1), CellValue::from("bob"));
    }

    #[test]
    fn test_listeners_forward_to_delegate() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let mut pivot = PivotTableModel::new(single_row());
        let id = pivot.add_listener(Box::new(move |e: &TableModelEvent| {
            sink.lock().unwrap().push(e.clone())
        }));
        assert_eq!(pivot.delegate().listeners.len(), 1);

        pivot.set_value_at("x".into(), 2, 0);
        assert_eq!(
            events.lock().unwrap().as_slice(),
            &[TableModelEvent::CellUpdated { row: 0, column: 2 }]
        );

        assert!(pivot.remove_listener(id));
        assert!(pivot.into_inner().listeners.is_empty());
    }
}
