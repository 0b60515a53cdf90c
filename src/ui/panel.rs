//! Query execution and result display.
//!
//! A [`ResultPanel`] lives off the UI thread. It owns the statement and the
//! cursor of the last query, and hands finished models to the [`ResultView`]
//! on the UI thread, waiting until they are installed.

use std::sync::Arc;

use crate::db::{Connection, Cursor, CursorHandle, DataAccessError, ErrorCategory, Statement};
use crate::model::{BestGuessTableModel, EmptyTableModel, RowStoreTableModel, ScrollableTableModel, TableModel};

use super::dispatch::UiHandle;
use super::view::ResultView;

pub const ERROR_TITLE: &str = "Database Error";

/// Tells the user about a failure.
pub trait Notifier: Send + Sync {
    /// Blocks until the user has seen the message, if the implementation
    /// can tell.
    fn notify_error(&self, title: &str, message: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelState {
    Idle,
    QueryInFlight,
    DisplayingResults,
    Disposed,
}

pub struct ResultPanel {
    connection: Option<Arc<dyn Connection>>,
    statement: Option<Box<dyn Statement>>,
    cursor: Option<CursorHandle>,
    ui: UiHandle<ResultView>,
    notifier: Arc<dyn Notifier>,
    best_layout: bool,
    state: PanelState,
}

impl ResultPanel {
    pub fn new(ui: UiHandle<ResultView>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            connection: None,
            statement: None,
            cursor: None,
            ui,
            notifier,
            best_layout: false,
            state: PanelState::Idle,
        }
    }

    pub fn connection(&self) -> Option<&Arc<dyn Connection>> {
        self.connection.as_ref()
    }

    pub fn set_connection(&mut self, connection: Arc<dyn Connection>) {
        self.connection = Some(connection);
    }

    pub fn best_layout(&self) -> bool {
        self.best_layout
    }

    /// Layout used by [`ResultPanel::send`].
    pub fn set_best_layout(&mut self, best_layout: bool) {
        self.best_layout = best_layout;
    }

    pub fn state(&self) -> PanelState {
        self.state
    }

    /// Cursor of the query on display, if it came from [`ResultPanel::execute_query`].
    pub fn cursor(&self) -> Option<&CursorHandle> {
        self.cursor.as_ref()
    }

    /// Run the query typed by the user. A failure clears the table and is
    /// reported once through the notifier before being returned.
    pub fn send(&mut self, query: &str) -> Result<(), DataAccessError> {
        match self.execute_query_with_layout(query, self.best_layout) {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::error!("query failed: {}", err);
                self.clear_table();
                self.notifier.notify_error(ERROR_TITLE, &err.display_full());
                Err(err)
            }
        }
    }

    pub fn execute_query(&mut self, query: &str) -> Result<(), DataAccessError> {
        self.execute_query_with_layout(query, false)
    }

    /// Release the previous query, then run this one over a live scrollable
    /// cursor and display it.
    pub fn execute_query_with_layout(&mut self, query: &str, best_layout: bool) -> Result<(), DataAccessError> {
        // The live model on display reads through the cursor about to be
        // closed, so it has to leave the view first.
        if self.cursor.is_some() {
            self.clear_table();
        }
        self.dispose();
        self.state = PanelState::QueryInFlight;
        let result = self.open_and_display(query, best_layout);
        if result.is_err() {
            self.state = PanelState::Idle;
        }
        result
    }

    fn open_and_display(&mut self, query: &str, best_layout: bool) -> Result<(), DataAccessError> {
        let connection = self
            .connection
            .clone()
            .ok_or_else(|| DataAccessError::with_category(ErrorCategory::Connection, "not connected"))?;
        tracing::debug!("executing on {}: {}", connection.describe(), query);

        let statement = self.statement.insert(connection.create_statement()?);
        let cursor = CursorHandle::new(statement.execute_query(query)?);
        self.cursor = Some(cursor.clone());
        let model = ScrollableTableModel::new(cursor)?;
        tracing::info!(rows = model.row_count(), columns = model.column_count(), "query complete");

        self.display_model(query, Box::new(model), best_layout)
    }

    /// Copy every row out of `cursor` and display the snapshot. The cursor
    /// stays owned by the caller.
    pub fn display_results(&mut self, query: &str, cursor: &mut dyn Cursor, best_layout: bool) -> Result<(), DataAccessError> {
        let model = RowStoreTableModel::from_cursor(cursor)?;
        self.display_model(query, Box::new(model), best_layout)
    }

    /// Install `model` and show `query` in the query box, optionally letting
    /// the shape of the data pick the layout. Fails when the view is gone.
    pub fn display_model(
        &mut self,
        query: &str,
        model: Box<dyn TableModel>,
        best_layout: bool,
    ) -> Result<(), DataAccessError> {
        let model: Box<dyn TableModel> = if best_layout {
            Box::new(BestGuessTableModel::new(model))
        } else {
            model
        };
        let query = query.to_string();
        let installed = self.ui.invoke_and_wait(move |view: &mut ResultView| {
            view.set_query_text(&query);
            view.install_model(model);
        });
        match installed {
            Ok(()) => {
                self.state = PanelState::DisplayingResults;
                Ok(())
            }
            Err(e) => {
                tracing::error!("could not display results: {}", e);
                self.state = PanelState::Idle;
                Err(DataAccessError::with_category(
                    ErrorCategory::State,
                    format!("could not display results: {}", e),
                ))
            }
        }
    }

    pub fn clear_table(&self) {
        let cleared = self
            .ui
            .invoke_and_wait(|view: &mut ResultView| view.install_model(Box::new(EmptyTableModel::new())));
        if let Err(e) = cleared {
            tracing::error!("could not clear results: {}", e);
        }
    }

    /// Close the cursor and statement of the last query. Failures are logged
    /// and otherwise ignored. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        if let Some(cursor) = self.cursor.take() {
            if let Err(e) = cursor.close() {
                tracing::warn!("failed to close cursor: {}", e);
            }
        }
        if let Some(mut statement) = self.statement.take() {
            if let Err(e) = statement.close() {
                tracing::warn!("failed to close statement: {}", e);
            }
        }
        self.state = PanelState::Disposed;
    }
}

impl Drop for ResultPanel {
    fn drop(&mut self) {
        self.dispose();
    }
}
