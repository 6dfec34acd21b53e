//! Paged, single-pass iteration over query results.

use std::collections::VecDeque;

use ouroboros::self_referencing;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, CachedStatement, Connection, Rows};
use tracing::debug;

use sem_core::Result;

/// One result row, column values in select order.
pub type Row = Vec<SqlValue>;

/// A query waiting to be streamed by `rows()`.
#[derive(Debug, Clone)]
pub(crate) struct PendingQuery {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// An executing statement and its open result cursor.
#[self_referencing]
struct Cursor<'c> {
    stmt: CachedStatement<'c>,
    #[borrows(mut stmt)]
    #[not_covariant]
    rows: Rows<'this>,
}

impl<'c> Cursor<'c> {
    /// Prepare and execute `query`, positioned before the first row.
    fn open(conn: &'c Connection, query: &PendingQuery) -> Result<(Self, usize)> {
        let stmt = conn.prepare_cached(&query.sql)?;
        let columns = stmt.column_count();

        let cursor = Cursor::try_new(stmt, |stmt| {
            stmt.query(params_from_iter(query.params.iter()))
        })?;

        Ok((cursor, columns))
    }

    /// Step the cursor for up to `limit` rows.
    fn read(&mut self, columns: usize, limit: usize, page: &mut VecDeque<Row>) -> Result<()> {
        self.with_rows_mut(|rows| {
            while page.len() < limit {
                let Some(row) = rows.next()? else {
                    break;
                };
                let values = (0..columns)
                    .map(|i| row.get::<_, SqlValue>(i))
                    .collect::<rusqlite::Result<Row>>()?;
                page.push_back(values);
            }
            Ok(())
        })
    }
}

/// Lazy iterator over a query's result set.
///
/// The query is executed once and its cursor stepped `fetch_size` rows at a
/// time, so at most one page is held in memory. The stream ends at the first
/// empty page, or after yielding an error. It cannot be restarted.
pub struct RowStream<'c> {
    conn: &'c Connection,
    query: Option<PendingQuery>,
    cursor: Option<(Cursor<'c>, usize)>,
    page: VecDeque<Row>,
    fetched: usize,
    fetch_size: usize,
}

impl<'c> RowStream<'c> {
    pub(crate) fn new(
        conn: &'c Connection,
        query: Option<PendingQuery>,
        fetch_size: usize,
    ) -> Self {
        Self {
            conn,
            query,
            cursor: None,
            page: VecDeque::new(),
            fetched: 0,
            fetch_size: fetch_size.max(1),
        }
    }

    /// Fetch the next page into the buffer and return its size.
    fn fetch(&mut self) -> Result<usize> {
        if self.cursor.is_none() {
            let Some(query) = self.query.take() else {
                return Ok(0);
            };
            self.cursor = Some(Cursor::open(self.conn, &query)?);
        }

        let Some((cursor, columns)) = self.cursor.as_mut() else {
            return Ok(0);
        };
        cursor.read(*columns, self.fetch_size, &mut self.page)?;

        let size = self.page.len();
        self.fetched += size;
        debug!("Fetched page of {} rows ({} total)", size, self.fetched);
        Ok(size)
    }

    /// Release the cursor and any pending query.
    fn close(&mut self) {
        self.cursor = None;
        self.query = None;
    }
}

impl Iterator for RowStream<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(row) = self.page.pop_front() {
            return Some(Ok(row));
        }

        match self.fetch() {
            Ok(0) => {
                self.close();
                None
            }
            Ok(_) => self.page.pop_front().map(Ok),
            Err(e) => {
                self.close();
                self.page.clear();
                Some(Err(e))
            }
        }
    }
}
