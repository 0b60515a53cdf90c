use std::error::Error as StdError;
use std::fmt;

/// Broad classification of a data-access failure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ErrorCategory {
    /// Syntax errors (SQLSTATE 42601 and friends)
    Syntax,
    /// Semantic errors (missing table/column, ambiguous reference)
    Semantic,
    /// Execution/runtime errors (division by zero, constraint violation)
    Execution,
    /// Transaction state errors
    Transaction,
    /// Connection/communication errors
    Connection,
    /// Misuse of a cursor or statement (closed handle, no current row)
    State,
    /// Unknown or unclassified errors
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Syntax => write!(f, "Syntax Error"),
            ErrorCategory::Semantic => write!(f, "Semantic Error"),
            ErrorCategory::Execution => write!(f, "Execution Error"),
            ErrorCategory::Transaction => write!(f, "Transaction Error"),
            ErrorCategory::Connection => write!(f, "Connection Error"),
            ErrorCategory::State => write!(f, "Cursor Error"),
            ErrorCategory::Unknown => write!(f, "Error"),
        }
    }
}

/// Failure raised by a connection, statement or cursor.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct DataAccessError {
    pub category: ErrorCategory,
    /// SQLSTATE code, empty when the failure did not come from the server
    pub code: String,
    pub message: String,
    pub detail: Option<String>,
    pub hint: Option<String>,
    /// 1-based line/column in the query text, when the server reported a position
    pub line: Option<usize>,
    pub col: Option<usize>,
}

impl DataAccessError {
    pub fn from_string(msg: impl Into<String>) -> Self {
        Self::with_category(ErrorCategory::Unknown, msg)
    }

    pub fn with_category(category: ErrorCategory, msg: impl Into<String>) -> Self {
        DataAccessError {
            category,
            code: String::new(),
            message: msg.into(),
            detail: None,
            hint: None,
            line: None,
            col: None,
        }
    }

    pub fn closed(what: &str) -> Self {
        Self::with_category(ErrorCategory::State, format!("{} is closed", what))
    }

    /// Build from a driver error. `query` is the text the user wrote;
    /// `offset` is the byte length of any prefix the driver saw in front of it,
    /// so server positions map back onto the user's text.
    pub fn from_pg_error(err: &tokio_postgres::Error, query: &str, offset: usize) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let code = db_err.code().code().to_string();
            let position = db_err.position().and_then(|p| match p {
                tokio_postgres::error::ErrorPosition::Original(pos) => {
                    (*pos as usize).checked_sub(offset)
                }
                tokio_postgres::error::ErrorPosition::Internal { .. } => None,
            });
            let (line, col) = match position {
                Some(pos) => byte_offset_to_line_col(query, pos),
                None => (None, None),
            };

            DataAccessError {
                category: categorize_sqlstate(&code),
                code,
                message: db_err.message().to_string(),
                detail: db_err.detail().map(|s| s.to_string()),
                hint: db_err.hint().map(|s| s.to_string()),
                line,
                col,
            }
        } else {
            let category = if err.is_closed() || err.source().is_some() {
                ErrorCategory::Connection
            } else {
                ErrorCategory::Unknown
            };
            DataAccessError {
                detail: err.source().map(|e| e.to_string()),
                ..Self::with_category(category, err.to_string())
            }
        }
    }

    /// Multi-line rendering for the error dialog.
    pub fn display_full(&self) -> String {
        let mut lines = vec![format!("{}: {}", self.category, self.message)];

        if let (Some(line), Some(col)) = (self.line, self.col) {
            lines.push(format!("  at line {}, column {}", line, col));
        }
        if !self.code.is_empty() {
            lines.push(format!("  SQLSTATE: {}", self.code));
        }
        if let Some(detail) = &self.detail {
            lines.push(format!("  Detail: {}", detail));
        }
        if let Some(hint) = &self.hint {
            lines.push(format!("  Hint: {}", hint));
        }

        lines.join("\n")
    }
}

/// Convert a 1-based byte offset in a query string to 1-based (line, column).
fn byte_offset_to_line_col(query: &str, byte_pos: usize) -> (Option<usize>, Option<usize>) {
    if byte_pos == 0 || query.is_empty() {
        return (Some(1), Some(1));
    }
    let target = (byte_pos - 1).min(query.len());
    let mut line = 1usize;
    let mut col = 1usize;
    for (i, ch) in query.char_indices() {
        if i >= target {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (Some(line), Some(col))
}

fn categorize_sqlstate(code: &str) -> ErrorCategory {
    if code.len() < 2 {
        return ErrorCategory::Unknown;
    }
    match &code[..2] {
        "42" if code == "42601" || code == "42000" => ErrorCategory::Syntax,
        "42" => ErrorCategory::Semantic,
        "22" | "23" | "53" | "54" | "55" | "57" => ErrorCategory::Execution,
        "25" | "40" => ErrorCategory::Transaction,
        "08" => ErrorCategory::Connection,
        "24" | "34" => ErrorCategory::State,
        _ => ErrorCategory::Unknown,
    }
}
