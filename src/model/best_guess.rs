use crate::db::CellValue;

use super::{ListenerId, PivotTableModel, TableModel, TableModelListener};

/// Picks a presentation from the shape of the data: a single row is shown
/// pivoted, anything else as-is. The choice is made once, at construction.
#[derive(Debug)]
pub enum BestGuessTableModel<M> {
    Pivot(PivotTableModel<M>),
    Direct(M),
}

impl<M: TableModel> BestGuessTableModel<M> {
    pub fn new(delegate: M) -> Self {
        if delegate.row_count() == 1 {
            BestGuessTableModel::Pivot(PivotTableModel::new(delegate))
        } else {
            BestGuessTableModel::Direct(delegate)
        }
    }

    pub fn is_pivoted(&self) -> bool {
        matches!(self, BestGuessTableModel::Pivot(_))
    }

    fn chosen(&self) -> &dyn TableModel {
        match self {
            BestGuessTableModel::Pivot(pivot) => pivot,
            BestGuessTableModel::Direct(model) => model,
        }
    }

    fn chosen_mut(&mut self) -> &mut dyn TableModel {
        match self {
            BestGuessTableModel::Pivot(pivot) => pivot,
            BestGuessTableModel::Direct(model) => model,
        }
    }
}

impl<M: TableModel> TableModel for BestGuessTableModel<M> {
    fn row_count(&self) -> usize {
        self.chosen().row_count()
    }

    fn column_count(&self) -> usize {
        self.chosen().column_count()
    }

    fn column_name(&self, column: usize) -> String {
        self.chosen().column_name(column)
    }

    fn value_at(&self, row: usize, column: usize) -> CellValue {
        self.chosen().value_at(row, column)
    }

    fn is_cell_editable(&self, row: usize, column: usize) -> bool {
        self.chosen().is_cell_editable(row, column)
    }

    fn set_value_at(&mut self, value: CellValue, row: usize, column: usize) {
        self.chosen_mut().set_value_at(value, row, column)
    }

    fn add_listener(&mut self, listener: TableModelListener) -> ListenerId {
        self.chosen_mut().add_listener(listener)
    }

    fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.chosen_mut().remove_listener(id)
    }
}
