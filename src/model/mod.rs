//! Table models: the tabular data interface the result table draws from,
//! with adapters over cursors and decorators over other models.

mod best_guess;
mod pivot;
mod row_store;
mod scrollable;

pub use best_guess::*;
pub use pivot::*;
pub use row_store::*;
pub use scrollable::*;

use std::sync::atomic::{AtomicU64, Ordering};

use crate::db::CellValue;

/// What changed in a model.
#[derive(Debug, Clone, PartialEq)]
pub enum TableModelEvent {
    /// Rows or values changed; columns are unchanged.
    DataChanged,
    /// Column set changed.
    StructureChanged,
    CellUpdated { row: usize, column: usize },
}

pub type TableModelListener = Box<dyn Fn(&TableModelEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

static NEXT_LISTENER: AtomicU64 = AtomicU64::new(1);

/// Registered change listeners of one model.
#[derive(Default)]
pub struct Listeners {
    entries: Vec<(ListenerId, TableModelListener)>,
}

impl Listeners {
    pub fn add(&mut self, listener: TableModelListener) -> ListenerId {
        let id = ListenerId(NEXT_LISTENER.fetch_add(1, Ordering::Relaxed));
        self.entries.push((id, listener));
        id
    }

    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    pub fn fire(&self, event: &TableModelEvent) {
        for (_, listener) in &self.entries {
            listener(event);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners").field("count", &self.len()).finish()
    }
}

/// Tabular data as seen by the result table.
///
/// Rows and columns are 0-based. Models are read-only unless they say
/// otherwise through [`TableModel::is_cell_editable`].
pub trait TableModel: Send {
    fn row_count(&self) -> usize;

    fn column_count(&self) -> usize;

    fn column_name(&self, column: usize) -> String;

    fn value_at(&self, row: usize, column: usize) -> CellValue;

    fn is_cell_editable(&self, _row: usize, _column: usize) -> bool {
        false
    }

    /// Write a value. Read-only models ignore it.
    fn set_value_at(&mut self, _value: CellValue, _row: usize, _column: usize) {}

    fn add_listener(&mut self, listener: TableModelListener) -> ListenerId;

    fn remove_listener(&mut self, id: ListenerId) -> bool;
}

impl<M: TableModel + ?Sized> TableModel for Box<M> {
    fn row_count(&self) -> usize {
        (**self).row_count()
    }

    fn column_count(&self) -> usize {
        (**self).column_count()
    }

    fn column_name(&self, column: usize) -> String {
        (**self).column_name(column)
    }

    fn value_at(&self, row: usize, column: usize) -> CellValue {
        (**self).value_at(row, column)
    }

    fn is_cell_editable(&self, row: usize, column: usize) -> bool {
        (**self).is_cell_editable(row, column)
    }

    fn set_value_at(&mut self, value: CellValue, row: usize, column: usize) {
        (**self).set_value_at(value, row, column)
    }

    fn add_listener(&mut self, listener: TableModelListener) -> ListenerId {
        (**self).add_listener(listener)
    }

    fn remove_listener(&mut self, id: ListenerId) -> bool {
        (**self).remove_listener(id)
    }
}

/// Zero rows, zero columns. Installed when a query fails.
#[derive(Debug, Default)]
pub struct EmptyTableModel {
    listeners: Listeners,
}

impl EmptyTableModel {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TableModel for EmptyTableModel {
    fn row_count(&self) -> usize {
        0
    }

    fn column_count(&self) -> usize {
        0
    }

    fn column_name(&self, _column: usize) -> String {
        String::new()
    }

    fn value_at(&self, _row: usize, _column: usize) -> CellValue {
        CellValue::Text(String::new())
    }

    fn add_listener(&mut self, listener: TableModelListener) -> ListenerId {
        self.listeners.add(listener)
    }

    fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }
}

/// Column names of a model, in order.
pub fn column_names(model: &dyn TableModel) -> Vec<String> {
    (0..model.column_count())
        .map(|c| model.column_name(c))
        .collect()
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_empty_model() {
        let model = EmptyTableModel::new();
        assert_eq!(model.row_count(), 0);
        assert_eq!(model.column_count(), 0);
        assert!(!model.is_cell_editable(0, 0));
    }

    #[test]
    fn test_listener_add_fire_remove() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut listeners = Listeners::default();
        let counter = Arc::clone(&hits);
        let id = listeners.add(Box::new(move |_: &TableModelEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        listeners.fire(&TableModelEvent::DataChanged);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        assert!(listeners.remove(id));
        assert!(!listeners.remove(id));
        listeners.fire(&TableModelEvent::DataChanged);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(listeners.is_empty());
    }

    #[test]
    fn test_boxed_model_forwards() {
        let model: Box<dyn TableModel> = Box::new(testing::GridModel::new(
            &["a", "b"],
            vec![vec![1.into(), 2.into()]],
        ));
        assert_eq!(model.row_count(), 1);
        assert_eq!(column_names(&model), vec!["a", "b"]);
        assert_eq!(model.value_at(0, 1), CellValue::Int32(2));
    }
}
