//! Database collaborator interfaces: connections hand out statements,
//! statements execute queries into cursors, cursors expose column metadata
//! and cell access.
//!
//! Row positions follow SQL cursor conventions and are 1-based (position 0
//! means "before the first row"). Column indexes are 0-based.

use std::sync::{Arc, Mutex, MutexGuard};

use super::{CellValue, DataAccessError, ErrorCategory};

/// Metadata for one result column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMeta {
    /// Underlying column name (the table column, when there is one)
    pub name: String,
    /// Output label, reflecting any alias in the query
    pub label: String,
    pub type_name: String,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, label: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            type_name: type_name.into(),
        }
    }

    /// Column whose name and label are the same.
    pub fn named(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            type_name: type_name.into(),
        }
    }
}

/// Forward-only view of a result set.
pub trait Cursor: Send {
    fn columns(&self) -> &[ColumnMeta];

    fn column_count(&self) -> usize {
        self.columns().len()
    }

    /// Advance to the next row. Returns `false` once past the last row.
    fn next(&mut self) -> Result<bool, DataAccessError>;

    /// Read a column of the current row.
    fn get(&self, column: usize) -> Result<CellValue, DataAccessError>;

    fn close(&mut self) -> Result<(), DataAccessError>;

    fn is_closed(&self) -> bool;
}

/// Cursor that can be positioned on any row.
pub trait ScrollableCursor: Cursor {
    /// Move to the given 1-based row. Returns whether that row exists.
    fn absolute(&mut self, row: usize) -> Result<bool, DataAccessError>;

    /// Move to the last row. Returns `false` when the result is empty.
    fn last(&mut self) -> Result<bool, DataAccessError>;

    /// Current 1-based row, or 0 when not on a row.
    fn position(&self) -> usize;
}

/// A read-only, scrollable statement.
pub trait Statement: Send {
    /// Execute a query. Any cursor previously produced by this statement is closed.
    fn execute_query(&mut self, sql: &str) -> Result<Box<dyn ScrollableCursor>, DataAccessError>;

    fn close(&mut self) -> Result<(), DataAccessError>;
}

/// Source of statements. Owned by whoever opened it; viewers only borrow it.
pub trait Connection: Send + Sync {
    fn create_statement(&self) -> Result<Box<dyn Statement>, DataAccessError>;

    /// Short human-readable description (user@host/db).
    fn describe(&self) -> String;
}

/// Shared handle on a live cursor.
///
/// One clone reads through it while another keeps the right to close it.
/// Each access locks the cursor for the whole seek-then-read step.
#[derive(Clone)]
pub struct CursorHandle {
    inner: Arc<Mutex<Box<dyn ScrollableCursor>>>,
}

impl CursorHandle {
    pub fn new(cursor: Box<dyn ScrollableCursor>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(cursor)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Box<dyn ScrollableCursor>>, DataAccessError> {
        self.inner.lock().map_err(|_| {
            DataAccessError::with_category(ErrorCategory::State, "cursor lock poisoned")
        })
    }

    /// Run `f` with exclusive access to the cursor.
    pub fn with<R>(
        &self,
        f: impl FnOnce(&mut dyn ScrollableCursor) -> Result<R, DataAccessError>,
    ) -> Result<R, DataAccessError> {
        let mut cursor = self.lock()?;
        f(cursor.as_mut())
    }

    pub fn columns(&self) -> Result<Vec<ColumnMeta>, DataAccessError> {
        Ok(self.lock()?.columns().to_vec())
    }

    pub fn close(&self) -> Result<(), DataAccessError> {
        let mut cursor = self.lock()?;
        if cursor.is_closed() {
            return Ok(());
        }
        cursor.close()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().map(|c| c.is_closed()).unwrap_or(true)
    }
}

impl std::fmt::Debug for CursorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CursorHandle")
            .field("closed", &self.is_closed())
            .finish()
    }
}
