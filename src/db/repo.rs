use super::model::{DestinationSummary, LedgerRow};
use crate::ledger::LedgerEntry;
use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, instrument};

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let opts = SqliteConnectOptions::from_str(&normalized)
        .with_context(|| format!("invalid database url: {}", normalized))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full);
    let pool = SqlitePool::connect_with(opts)
        .await
        .with_context(|| format!("failed to open {}", normalized))?;
    Ok(pool)
}

/// Expand a leading `~/` in file-backed SQLite URLs and make sure the parent
/// directory exists. In-memory and non-sqlite URLs pass through.
fn prepare_sqlite_url(url: &str) -> String {
    let Some(rest) = url.strip_prefix("sqlite:") else {
        return url.to_string();
    };
    if rest.starts_with(":memory") {
        return url.to_string();
    }
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let (path, query) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };
    if path.is_empty() {
        return url.to_string();
    }

    let path = match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(tail), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), tail),
        _ => path.to_string(),
    };
    if let Some(parent) = std::path::Path::new(&path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    match query {
        Some(q) => format!("sqlite://{}?{}", path, q),
        None => format!("sqlite://{}", path),
    }
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn ledger_row(row: &SqliteRow) -> LedgerRow {
    LedgerRow {
        destination: row.get("destination"),
        recipient_id: row.get("recipient_id"),
        display_name: row.get("display_name"),
        invited_at: row.get("invited_at"),
    }
}

/// Entries for one destination, oldest first.
#[instrument(skip_all)]
pub async fn load_ledger(pool: &Pool, destination: &str) -> sqlx::Result<Vec<LedgerEntry>> {
    let rows = sqlx::query(
        "SELECT destination, recipient_id, display_name, invited_at FROM invited_ledger WHERE destination = ? ORDER BY invited_at ASC, rowid ASC",
    )
    .bind(destination)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(|r| ledger_row(r).into()).collect())
}

/// Replace a destination's rows and trim the whole table to `capacity`
/// newest rows, in one transaction. Returns the number of rows evicted.
#[instrument(skip_all)]
pub async fn replace_ledger(
    pool: &Pool,
    destination: &str,
    entries: &[LedgerEntry],
    capacity: usize,
) -> sqlx::Result<u64> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM invited_ledger WHERE destination = ?")
        .bind(destination)
        .execute(&mut *tx)
        .await?;
    for e in entries {
        sqlx::query(
            "INSERT OR IGNORE INTO invited_ledger (destination, recipient_id, display_name, invited_at) VALUES (?, ?, ?, ?)",
        )
        .bind(destination)
        .bind(e.recipient_id)
        .bind(e.display_name.as_deref())
        .bind(e.invited_at)
        .execute(&mut *tx)
        .await?;
    }
    let evicted = sqlx::query(
        "DELETE FROM invited_ledger WHERE rowid NOT IN (SELECT rowid FROM invited_ledger ORDER BY invited_at DESC, rowid DESC LIMIT ?)",
    )
    .bind(capacity as i64)
    .execute(&mut *tx)
    .await?
    .rows_affected();
    tx.commit().await?;
    if evicted > 0 {
        debug!(evicted, "ledger trimmed to capacity");
    }
    Ok(evicted)
}

/// Clear one destination, or the whole ledger. Returns the number of rows removed.
#[instrument(skip_all)]
pub async fn clear_ledger(pool: &Pool, destination: Option<&str>) -> sqlx::Result<u64> {
    let res = match destination {
        Some(d) => {
            sqlx::query("DELETE FROM invited_ledger WHERE destination = ?")
                .bind(d)
                .execute(pool)
                .await?
        }
        None => sqlx::query("DELETE FROM invited_ledger").execute(pool).await?,
    };
    Ok(res.rows_affected())
}

#[instrument(skip_all)]
pub async fn ledger_summary(pool: &Pool) -> sqlx::Result<Vec<DestinationSummary>> {
    let rows = sqlx::query(
        "SELECT destination, COUNT(*) AS entries, MAX(invited_at) AS newest FROM invited_ledger GROUP BY destination ORDER BY destination",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows
        .iter()
        .map(|r| DestinationSummary {
            destination: r.get("destination"),
            entries: r.get("entries"),
            newest: r.try_get("newest").ok().flatten(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_urls_untouched() {
        assert_eq!(prepare_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(
            prepare_sqlite_url("postgres://x/y"),
            "postgres://x/y"
        );
    }

    #[test]
    fn file_urls_normalized() {
        let td = tempfile::tempdir().unwrap();
        let db = td.path().join("nested").join("ledger.db");
        let url = format!("sqlite:{}?mode=rwc", db.display());
        let out = prepare_sqlite_url(&url);
        assert_eq!(out, format!("sqlite://{}?mode=rwc", db.display()));
        assert!(db.parent().unwrap().exists());
    }
}
