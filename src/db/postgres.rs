//! PostgreSQL statements and scrollable cursors.
//!
//! Each query runs as `DECLARE <name> SCROLL CURSOR WITH HOLD FOR <query>`:
//! the server materializes the result and every seek is a `FETCH ABSOLUTE`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::fmt::Write;
use tokio_postgres::types::{FromSql, Type};
use tokio_postgres::Row;

use super::connection::PgSession;
use super::{
    CellValue, ColumnMeta, Cursor, DataAccessError, ErrorCategory, ScrollableCursor, Statement,
};

static CURSOR_SEQ: AtomicU64 = AtomicU64::new(1);

pub(crate) struct PgStatement {
    session: Arc<PgSession>,
    /// Name and open flag of the last cursor this statement declared.
    current: Option<(String, Arc<AtomicBool>)>,
    closed: bool,
}

impl PgStatement {
    pub(crate) fn new(session: Arc<PgSession>) -> Self {
        Self {
            session,
            current: None,
            closed: false,
        }
    }

    fn close_current(&mut self) -> Result<(), DataAccessError> {
        if let Some((name, open)) = self.current.take() {
            if open.swap(false, Ordering::SeqCst) {
                close_cursor(&self.session, &name)?;
            }
        }
        Ok(())
    }
}

impl Statement for PgStatement {
    fn execute_query(&mut self, sql: &str) -> Result<Box<dyn ScrollableCursor>, DataAccessError> {
        if self.closed {
            return Err(DataAccessError::closed("statement"));
        }
        self.close_current()?;

        let query = strip_terminator(sql);
        if query.is_empty() {
            return Err(DataAccessError::with_category(
                ErrorCategory::Syntax,
                "empty query",
            ));
        }
        check_row_query(query)?;

        let session = &self.session;
        let client = session.client();

        // Preparing first yields column metadata and error positions that
        // refer to the user's text rather than the DECLARE wrapper.
        let prepared = session
            .block_on(client.prepare(query))
            .map_err(|e| DataAccessError::from_pg_error(&e, query, 0))?;
        let columns = resolve_columns(session, prepared.columns());

        let name = format!("rsview_cursor_{}", CURSOR_SEQ.fetch_add(1, Ordering::Relaxed));
        let prefix = format!("DECLARE {} SCROLL CURSOR WITH HOLD FOR ", name);
        let declare = format!("{}{}", prefix, query);
        session
            .block_on(client.batch_execute(&declare))
            .map_err(|e| DataAccessError::from_pg_error(&e, query, prefix.len()))?;
        tracing::debug!("declared cursor {} ({} columns)", name, columns.len());

        let open = Arc::new(AtomicBool::new(true));
        self.current = Some((name.clone(), Arc::clone(&open)));

        Ok(Box::new(PgCursor {
            session: Arc::clone(&self.session),
            name,
            columns,
            open,
            position: 0,
            past_end: false,
            row_count: None,
            current: None,
        }))
    }

    fn close(&mut self) -> Result<(), DataAccessError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.close_current()
    }
}

/// Server-side scrollable cursor.
struct PgCursor {
    session: Arc<PgSession>,
    name: String,
    columns: Vec<ColumnMeta>,
    /// Shared with the statement so either side can close it exactly once.
    open: Arc<AtomicBool>,
    position: usize,
    /// Set once a forward step runs off the end.
    past_end: bool,
    row_count: Option<usize>,
    /// Row at `position`, so repeated reads of one row cost a single fetch.
    current: Option<Row>,
}

impl PgCursor {
    fn ensure_open(&self) -> Result<(), DataAccessError> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DataAccessError::closed("cursor"))
        }
    }

    fn fetch(&mut self, command: &str) -> Result<Option<Row>, DataAccessError> {
        let sql = format!("{} FROM {}", command, self.name);
        let rows = self
            .session
            .block_on(self.session.client().query(sql.as_str(), &[]))
            .map_err(|e| DataAccessError::from_pg_error(&e, &sql, 0))?;
        Ok(rows.into_iter().next())
    }

    fn count_rows(&mut self) -> Result<usize, DataAccessError> {
        if let Some(count) = self.row_count {
            return Ok(count);
        }
        let client = self.session.client();
        let rewind = format!("MOVE ABSOLUTE 0 IN {}", self.name);
        let forward = format!("MOVE FORWARD ALL IN {}", self.name);
        let count = self.session.block_on(async {
            match client.execute(rewind.as_str(), &[]).await {
                Ok(_) => client.execute(forward.as_str(), &[]).await,
                Err(e) => Err(e),
            }
        });
        let count = count.map_err(|e| DataAccessError::from_pg_error(&e, &forward, 0))? as usize;
        // The server cursor now sits after the last row.
        self.position = 0;
        self.current = None;
        self.row_count = Some(count);
        Ok(count)
    }
}

impl Cursor for PgCursor {
    fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    fn next(&mut self) -> Result<bool, DataAccessError> {
        self.ensure_open()?;
        if self.past_end {
            return Ok(false);
        }
        let target = self.position + 1;
        let found = self.absolute(target)?;
        self.past_end = !found;
        Ok(found)
    }

    fn get(&self, column: usize) -> Result<CellValue, DataAccessError> {
        self.ensure_open()?;
        let row = self.current.as_ref().ok_or_else(|| {
            DataAccessError::with_category(ErrorCategory::State, "no current row")
        })?;
        if column >= row.len() {
            return Err(DataAccessError::with_category(
                ErrorCategory::State,
                format!("column index {} out of range", column),
            ));
        }
        Ok(extract_value(row, column, row.columns()[column].type_()))
    }

    fn close(&mut self) -> Result<(), DataAccessError> {
        self.current = None;
        if self.open.swap(false, Ordering::SeqCst) {
            close_cursor(&self.session, &self.name)?;
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        !self.open.load(Ordering::SeqCst)
    }
}

impl ScrollableCursor for PgCursor {
    fn absolute(&mut self, row: usize) -> Result<bool, DataAccessError> {
        self.ensure_open()?;
        if row != 0 && row == self.position && self.current.is_some() {
            return Ok(true);
        }
        let fetched = self.fetch(&format!("FETCH ABSOLUTE {}", row))?;
        match fetched {
            Some(r) => {
                self.position = row;
                self.past_end = false;
                self.current = Some(r);
                Ok(true)
            }
            None => {
                self.position = 0;
                self.current = None;
                Ok(false)
            }
        }
    }

    fn last(&mut self) -> Result<bool, DataAccessError> {
        self.ensure_open()?;
        let count = self.count_rows()?;
        if count == 0 {
            return Ok(false);
        }
        self.absolute(count)
    }

    fn position(&self) -> usize {
        self.position
    }
}

fn close_cursor(session: &PgSession, name: &str) -> Result<(), DataAccessError> {
    let sql = format!("CLOSE {}", name);
    session
        .block_on(session.client().batch_execute(&sql))
        .map_err(|e| DataAccessError::from_pg_error(&e, &sql, 0))?;
    tracing::debug!("closed cursor {}", name);
    Ok(())
}

/// Drop trailing whitespace and statement terminators.
fn strip_terminator(sql: &str) -> &str {
    sql.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace())
}

/// Statements a cursor can be declared over.
const CURSOR_KEYWORDS: [&str; 4] = ["select", "values", "with", "table"];

/// First keyword of `query`, lowercased, past comments and opening parens.
fn leading_keyword(query: &str) -> String {
    let mut rest = query;
    loop {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == '(');
        if let Some(after) = rest.strip_prefix("--") {
            rest = after.find('\n').map_or("", |i| &after[i + 1..]);
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.find("*/").map_or("", |i| &after[i + 2..]);
        } else {
            break;
        }
    }
    rest.chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect::<String>()
        .to_lowercase()
}

/// `DECLARE ... CURSOR FOR` only takes SELECT and VALUES; anything else
/// would fail with a syntax error pointing into the wrapper.
fn check_row_query(query: &str) -> Result<(), DataAccessError> {
    let keyword = leading_keyword(query);
    if CURSOR_KEYWORDS.contains(&keyword.as_str()) {
        Ok(())
    } else {
        Err(DataAccessError::with_category(
            ErrorCategory::Syntax,
            format!(
                "only row-returning SELECT/VALUES queries can be viewed (got {})",
                if keyword.is_empty() { "no statement".to_string() } else { keyword.to_uppercase() }
            ),
        ))
    }
}

/// Column labels come from the result description; underlying names are
/// looked up in the catalog for columns that map onto a table column.
fn resolve_columns(session: &PgSession, columns: &[tokio_postgres::Column]) -> Vec<ColumnMeta> {
    columns
        .iter()
        .map(|col| {
            let label = col.name().to_string();
            let name = match (col.table_oid(), col.column_id()) {
                (Some(table), Some(attnum)) => base_column_name(session, table, attnum),
                _ => None,
            };
            ColumnMeta::new(name.unwrap_or_else(|| label.clone()), label, col.type_().name())
        })
        .collect()
}

fn base_column_name(session: &PgSession, table: u32, attnum: i16) -> Option<String> {
    let lookup = session.block_on(session.client().query_opt(
        "SELECT attname::text FROM pg_catalog.pg_attribute WHERE attrelid = $1 AND attnum = $2",
        &[&table, &attnum],
    ));
    match lookup {
        Ok(row) => row.and_then(|r| r.try_get::<_, String>(0).ok()),
        Err(e) => {
            tracing::debug!("column name lookup failed for {}.{}: {}", table, attnum, e);
            None
        }
    }
}

fn decode<'a, T>(row: &'a Row, idx: usize, wrap: fn(T) -> CellValue) -> CellValue
where
    T: FromSql<'a>,
{
    match row.try_get::<_, Option<T>>(idx) {
        Ok(Some(v)) => wrap(v),
        Ok(None) => CellValue::Null,
        Err(e) => CellValue::from(DataAccessError::with_category(
            ErrorCategory::Execution,
            format!("cannot decode column {}: {}", idx, e),
        )),
    }
}

/// NUMERIC rendered exactly, from its binary wire form.
struct Numeric(String);

impl<'a> FromSql<'a> for Numeric {
    fn from_sql(_: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        numeric_to_string(raw).map(Numeric)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

fn numeric_to_string(raw: &[u8]) -> Result<String, Box<dyn std::error::Error + Sync + Send>> {
    let word = |i: usize| -> Result<u16, Box<dyn std::error::Error + Sync + Send>> {
        raw.get(i * 2..i * 2 + 2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
            .ok_or_else(|| "truncated numeric value".into())
    };

    let ndigits = word(0)? as usize;
    let weight = word(1)? as i16 as i32;
    let sign = word(2)?;
    let dscale = word(3)? as usize;
    let digits = (0..ndigits)
        .map(|i| word(4 + i))
        .collect::<Result<Vec<u16>, _>>()?;

    match sign {
        0xC000 => return Ok("NaN".to_string()),
        0xD000 => return Ok("Infinity".to_string()),
        0xF000 => return Ok("-Infinity".to_string()),
        _ => {}
    }

    // digits[k] is a base-10000 group with weight `weight - k`.
    let group = |k: i32| -> u16 {
        if k < 0 {
            0
        } else {
            digits.get(k as usize).copied().unwrap_or(0)
        }
    };

    let mut out = String::new();
    if sign == 0x4000 {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        for k in 0..=weight {
            if k == 0 {
                let _ = write!(out, "{}", group(k));
            } else {
                let _ = write!(out, "{:04}", group(k));
            }
        }
    }
    if dscale > 0 {
        let mut frac = String::new();
        let mut k = weight + 1;
        while frac.len() < dscale {
            let _ = write!(frac, "{:04}", group(k));
            k += 1;
        }
        frac.truncate(dscale);
        out.push('.');
        out.push_str(&frac);
    }
    Ok(out)
}

fn extract_value(row: &Row, idx: usize, pg_type: &Type) -> CellValue {
    match *pg_type {
        Type::BOOL => decode(row, idx, CellValue::Bool),
        Type::INT2 => decode(row, idx, CellValue::Int16),
        Type::INT4 => decode(row, idx, CellValue::Int32),
        Type::INT8 => decode(row, idx, CellValue::Int64),
        Type::FLOAT4 => decode(row, idx, CellValue::Float32),
        Type::FLOAT8 => decode(row, idx, CellValue::Float64),
        Type::OID => decode(row, idx, |v: u32| CellValue::Int64(v as i64)),
        Type::NUMERIC => decode(row, idx, |v: Numeric| CellValue::Text(v.0)),
        Type::CHAR => decode(row, idx, |v: i8| CellValue::Text(char::from(v as u8).to_string())),
        Type::TEXT | Type::VARCHAR | Type::NAME | Type::BPCHAR | Type::UNKNOWN => {
            decode(row, idx, CellValue::Text)
        }
        Type::BYTEA => decode(row, idx, CellValue::Bytes),
        Type::DATE => decode::<NaiveDate>(row, idx, CellValue::Date),
        Type::TIME => decode::<NaiveTime>(row, idx, CellValue::Time),
        Type::TIMESTAMP => decode::<NaiveDateTime>(row, idx, CellValue::DateTime),
        Type::TIMESTAMPTZ => decode::<DateTime<Utc>>(row, idx, CellValue::TimestampTz),
        Type::JSON | Type::JSONB => decode(row, idx, CellValue::Json),
        Type::INT4_ARRAY => decode(row, idx, |v: Vec<Option<i32>>| {
            CellValue::Array(v.into_iter().map(CellValue::from).collect())
        }),
        Type::INT8_ARRAY => decode(row, idx, |v: Vec<Option<i64>>| {
            CellValue::Array(v.into_iter().map(CellValue::from).collect())
        }),
        Type::TEXT_ARRAY | Type::VARCHAR_ARRAY => decode(row, idx, |v: Vec<Option<String>>| {
            CellValue::Array(v.into_iter().map(CellValue::from).collect())
        }),
        _ => match row.try_get::<_, Option<String>>(idx) {
            Ok(Some(s)) => CellValue::Text(s),
            Ok(None) => CellValue::Null,
            Err(_) => CellValue::Unknown(pg_type.name().to_string()),
        },
    }
}
