//! In-memory cursors and connections, for embedding canned results and for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{
    CellValue, ColumnMeta, Connection, Cursor, DataAccessError, ErrorCategory, ScrollableCursor,
    Statement,
};

/// Scrollable cursor over rows held in memory.
///
/// A clone starts with its own open/closed flag, so closing one copy leaves
/// the others usable.
#[derive(Debug)]
pub struct MemoryCursor {
    columns: Vec<ColumnMeta>,
    rows: Vec<Vec<CellValue>>,
    position: usize,
    /// Shared with the statement that handed the cursor out.
    closed: Arc<AtomicBool>,
}

impl Clone for MemoryCursor {
    fn clone(&self) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: self.rows.clone(),
            position: self.position,
            closed: Arc::new(AtomicBool::new(self.closed.load(Ordering::Acquire))),
        }
    }
}

impl MemoryCursor {
    pub fn new(columns: Vec<ColumnMeta>, rows: Vec<Vec<CellValue>>) -> Self {
        Self {
            columns,
            rows,
            position: 0,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cursor whose column names double as labels.
    pub fn from_names(names: &[&str], rows: Vec<Vec<CellValue>>) -> Self {
        let columns = names
            .iter()
            .map(|name| ColumnMeta::named(*name, "text"))
            .collect();
        Self::new(columns, rows)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn ensure_open(&self) -> Result<(), DataAccessError> {
        if self.closed.load(Ordering::Acquire) {
            Err(DataAccessError::closed("cursor"))
        } else {
            Ok(())
        }
    }
}

impl Cursor for MemoryCursor {
    fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    fn next(&mut self) -> Result<bool, DataAccessError> {
        self.ensure_open()?;
        if self.position <= self.rows.len() {
            self.position += 1;
        }
        Ok(self.position <= self.rows.len())
    }

    fn get(&self, column: usize) -> Result<CellValue, DataAccessError> {
        self.ensure_open()?;
        let row = self
            .position
            .checked_sub(1)
            .and_then(|idx| self.rows.get(idx))
            .ok_or_else(|| DataAccessError::with_category(ErrorCategory::State, "no current row"))?;
        row.get(column).cloned().ok_or_else(|| {
            DataAccessError::with_category(
                ErrorCategory::State,
                format!("column index {} out of range", column),
            )
        })
    }

    fn close(&mut self) -> Result<(), DataAccessError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl ScrollableCursor for MemoryCursor {
    fn absolute(&mut self, row: usize) -> Result<bool, DataAccessError> {
        self.ensure_open()?;
        if row == 0 || row > self.rows.len() {
            // Off either end: 0 before the first row, len + 1 after the last.
            self.position = if row == 0 { 0 } else { self.rows.len() + 1 };
            return Ok(false);
        }
        self.position = row;
        Ok(true)
    }

    fn last(&mut self) -> Result<bool, DataAccessError> {
        self.ensure_open()?;
        self.position = self.rows.len();
        Ok(!self.rows.is_empty())
    }

    fn position(&self) -> usize {
        if self.position == 0 || self.position > self.rows.len() {
            0
        } else {
            self.position
        }
    }
}

#[derive(Debug, Clone)]
enum CannedResult {
    Rows(MemoryCursor),
    Fails(DataAccessError),
}

/// Connection answering queries from a fixed table of results.
///
/// Query text is matched after trimming whitespace and a trailing `;`.
#[derive(Debug, Default)]
pub struct MemoryConnection {
    results: Arc<Mutex<HashMap<String, CannedResult>>>,
    statements_created: AtomicUsize,
}

impl MemoryConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result(self, query: &str, cursor: MemoryCursor) -> Self {
        self.insert(query, CannedResult::Rows(cursor));
        self
    }

    pub fn with_error(self, query: &str, err: DataAccessError) -> Self {
        self.insert(query, CannedResult::Fails(err));
        self
    }

    fn insert(&self, query: &str, result: CannedResult) {
        if let Ok(mut results) = self.results.lock() {
            results.insert(normalize(query), result);
        }
    }

    pub fn statements_created(&self) -> usize {
        self.statements_created.load(Ordering::SeqCst)
    }
}

fn normalize(query: &str) -> String {
    query.trim().trim_end_matches(';').trim_end().to_string()
}

impl Connection for MemoryConnection {
    fn create_statement(&self) -> Result<Box<dyn Statement>, DataAccessError> {
        self.statements_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryStatement {
            results: Arc::clone(&self.results),
            current: None,
            closed: false,
        }))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

struct MemoryStatement {
    results: Arc<Mutex<HashMap<String, CannedResult>>>,
    /// Closed flag of the last cursor handed out.
    current: Option<Arc<AtomicBool>>,
    closed: bool,
}

impl MemoryStatement {
    fn close_current(&mut self) {
        if let Some(flag) = self.current.take() {
            flag.store(true, Ordering::Release);
        }
    }
}

impl Statement for MemoryStatement {
    fn execute_query(&mut self, sql: &str) -> Result<Box<dyn ScrollableCursor>, DataAccessError> {
        if self.closed {
            return Err(DataAccessError::closed("statement"));
        }
        self.close_current();
        let results = self
            .results
            .lock()
            .map_err(|_| DataAccessError::from_string("connection lock poisoned"))?;
        match results.get(&normalize(sql)) {
            Some(CannedResult::Rows(template)) => {
                let cursor = template.clone();
                self.current = Some(Arc::clone(&cursor.closed));
                Ok(Box::new(cursor))
            }
            Some(CannedResult::Fails(err)) => Err(err.clone()),
            None => Err(DataAccessError::with_category(
                ErrorCategory::Semantic,
                format!("no result registered for query: {}", sql.trim()),
            )),
        }
    }

    fn close(&mut self) -> Result<(), DataAccessError> {
        self.closed = true;
        self.close_current();
        Ok(())
    }
}
