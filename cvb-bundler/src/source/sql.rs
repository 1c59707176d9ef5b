//! SQL cursor over the clip metadata query
//!
//! Uses the sqlx `Any` driver so the same code reads from MySQL in
//! production and SQLite in tests. The query text is supplied externally;
//! only the column names below are relied on.

use crate::models::ClipRow;
use cvb_common::{Error, Result};
use futures::{Stream, TryStreamExt};
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Row};

/// Open a pool on the clip metadata database
pub async fn connect(database_url: &str) -> Result<AnyPool> {
    sqlx::any::install_default_drivers();
    tracing::debug!("Connecting to clip metadata database");

    let pool = AnyPoolOptions::new()
        .max_connections(1)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Forward-only stream of clip rows for `sql`
pub fn clip_rows(pool: AnyPool, sql: String) -> impl Stream<Item = Result<ClipRow>> + Send + 'static {
    async_stream::try_stream! {
        let mut rows = sqlx::query(&sql).fetch(&pool);
        while let Some(row) = rows.try_next().await? {
            yield clip_row_from(&row)?;
        }
    }
}

/// Map one result row to a ClipRow
///
/// `id`, `client_id`, `path`, `sentence` and `locale` are required; the vote
/// counts and category columns default when absent or NULL.
pub fn clip_row_from(row: &AnyRow) -> Result<ClipRow> {
    Ok(ClipRow {
        id: required_text(row, "id")?,
        client_id: required_text(row, "client_id")?,
        path: required_text(row, "path")?,
        sentence: required_text(row, "sentence")?,
        up_votes: optional_int(row, "up_votes")?,
        down_votes: optional_int(row, "down_votes")?,
        age: optional_text(row, "age")?,
        gender: optional_text(row, "gender")?,
        accent: optional_text(row, "accent")?,
        locale: required_text(row, "locale")?,
        segment: optional_text(row, "segment")?,
    })
}

fn required_text(row: &AnyRow, column: &str) -> Result<String> {
    text(row, column)?.ok_or_else(|| {
        Error::Config(format!("Source query returned no value for column '{}'", column))
    })
}

fn optional_text(row: &AnyRow, column: &str) -> Result<String> {
    match text(row, column) {
        Ok(value) => Ok(value.unwrap_or_default()),
        Err(Error::Database(sqlx::Error::ColumnNotFound(_))) => Ok(String::new()),
        Err(e) => Err(e),
    }
}

/// Column as text; integer columns are stringified
fn text(row: &AnyRow, column: &str) -> Result<Option<String>> {
    match row.try_get::<Option<String>, _>(column) {
        Ok(value) => Ok(value),
        Err(sqlx::Error::ColumnDecode { .. }) => Ok(row
            .try_get::<Option<i64>, _>(column)?
            .map(|n| n.to_string())),
        Err(e) => Err(e.into()),
    }
}

fn optional_int(row: &AnyRow, column: &str) -> Result<i64> {
    match row.try_get::<Option<i64>, _>(column) {
        Ok(value) => Ok(value.unwrap_or(0)),
        Err(sqlx::Error::ColumnNotFound(_)) => Ok(0),
        Err(sqlx::Error::ColumnDecode { .. }) => {
            let raw = row.try_get::<Option<String>, _>(column)?;
            match raw {
                Some(s) if !s.trim().is_empty() => s.trim().parse::<i64>().map_err(|e| {
                    Error::Config(format!("Column '{}' is not an integer: {}", column, e))
                }),
                _ => Ok(0),
            }
        }
        Err(e) => Err(e.into()),
    }
}
