//! SQLite-backed implementation of [`Store`].
//!
//! A single `repowatch.db` file in WAL mode holds the watchlist, the
//! hash-chained event log, derived statistics and health analyses.

use crate::store::Store;
use anyhow::Context;
use repowatch_core::types::{
    CommitAggregates, ContributorStats, HealthAnalysisResult, LogEntry, RepoStats, ScoreSource,
    WatchStatus, WatchlistEntry, WatchlistFilter,
};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS watchlist (
    id TEXT PRIMARY KEY,
    owner TEXT NOT NULL,
    name TEXT NOT NULL,
    branch TEXT NOT NULL,
    status TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS log_entries (
    rowid INTEGER PRIMARY KEY,
    event_id TEXT NOT NULL,
    watchlist_id TEXT NOT NULL,
    event_type TEXT NOT NULL,
    actor TEXT NOT NULL,
    ts TEXT NOT NULL,
    payload TEXT NOT NULL,
    event_hash TEXT NOT NULL,
    prev_event_hash TEXT,
    UNIQUE (watchlist_id, event_id)
);

CREATE INDEX IF NOT EXISTS idx_log_watchlist ON log_entries(watchlist_id);
CREATE INDEX IF NOT EXISTS idx_log_watchlist_type ON log_entries(watchlist_id, event_type);

CREATE TABLE IF NOT EXISTS contributor_stats (
    watchlist_id TEXT NOT NULL,
    author_email TEXT NOT NULL,
    author_name TEXT NOT NULL,
    aggregates TEXT NOT NULL,
    computed_at TEXT NOT NULL,
    PRIMARY KEY (watchlist_id, author_email)
);

CREATE TABLE IF NOT EXISTS repo_stats (
    watchlist_id TEXT PRIMARY KEY,
    total_contributors INTEGER NOT NULL,
    aggregates TEXT NOT NULL,
    computed_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS health_analysis (
    rowid INTEGER PRIMARY KEY,
    watchlist_id TEXT NOT NULL,
    commit_sha TEXT NOT NULL,
    commit_date TEXT NOT NULL,
    raw_output TEXT,
    health_score INTEGER NOT NULL,
    analyzed_at TEXT NOT NULL,
    source TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_health_watchlist ON health_analysis(watchlist_id, commit_date);
";

/// Upper bound on bound parameters per `IN (...)` query.
const MAX_IN_PARAMS: usize = 500;

/// SQLite-backed storage engine.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a database file with the full schema.
    pub fn open_or_create(db_path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("opening database {}", db_path.display()))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        Self::with_schema(conn)
    }

    /// Private in-memory database, used by tests and dry runs.
    pub fn open_in_memory() -> anyhow::Result<Self> {
        Self::with_schema(Connection::open_in_memory()?)
    }

    fn with_schema(conn: Connection) -> anyhow::Result<Self> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("sqlite connection mutex poisoned"))
    }
}

impl Store for SqliteStore {
    // ── Watchlist ───────────────────────────────────────────────────

    fn upsert_watchlist_entry(&self, entry: &WatchlistEntry) -> anyhow::Result<()> {
        self.conn()?.execute(
            "INSERT INTO watchlist (id, owner, name, branch, status)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                owner = excluded.owner, name = excluded.name,
                branch = excluded.branch, status = excluded.status",
            params![
                entry.id,
                entry.owner,
                entry.name,
                entry.branch,
                entry.status.as_str()
            ],
        )?;
        Ok(())
    }

    fn find_watchlist_entries(
        &self,
        filter: &WatchlistFilter,
    ) -> anyhow::Result<Vec<WatchlistEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, owner, name, branch, status FROM watchlist
             WHERE (?1 IS NULL OR status = ?1) AND (?2 IS NULL OR id = ?2)
             ORDER BY owner, name",
        )?;
        let rows = stmt
            .query_map(
                params![filter.status.map(|s| s.as_str()), filter.id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, owner, name, branch, status)| -> anyhow::Result<WatchlistEntry> {
                let status = WatchStatus::parse(&status)
                    .ok_or_else(|| anyhow::anyhow!("unknown watchlist status {status:?} for {id}"))?;
                Ok(WatchlistEntry {
                    id,
                    owner,
                    name,
                    branch,
                    status,
                })
            })
            .collect()
    }

    // ── Event log ───────────────────────────────────────────────────

    fn find_last_log_entry(&self, watchlist_id: &str) -> anyhow::Result<Option<LogEntry>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT event_id, event_type, actor, ts, payload, event_hash, prev_event_hash, watchlist_id
                 FROM log_entries WHERE watchlist_id = ?1
                 ORDER BY rowid DESC LIMIT 1",
                params![watchlist_id],
                map_log_row,
            )
            .optional()?;
        row.map(row_to_log_entry).transpose()
    }

    fn existing_event_ids(
        &self,
        event_ids: &[String],
        watchlist_id: &str,
    ) -> anyhow::Result<HashSet<String>> {
        let conn = self.conn()?;
        let mut found = HashSet::new();
        for chunk in event_ids.chunks(MAX_IN_PARAMS) {
            let placeholders = (0..chunk.len())
                .map(|i| format!("?{}", i + 2))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "SELECT event_id FROM log_entries
                 WHERE watchlist_id = ?1 AND event_id IN ({placeholders})"
            );
            let mut stmt = conn.prepare(&sql)?;
            let params = std::iter::once(watchlist_id).chain(chunk.iter().map(|s| s.as_str()));
            let ids = stmt
                .query_map(params_from_iter(params), |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            found.extend(ids);
        }
        Ok(found)
    }

    fn create_log_entries(&self, entries: &[LogEntry]) -> anyhow::Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO log_entries (
                    event_id, watchlist_id, event_type, actor, ts,
                    payload, event_hash, prev_event_hash
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for entry in entries {
                let payload = serde_json::to_string(&entry.payload)?;
                stmt.execute(params![
                    entry.event_id,
                    entry.watchlist_id,
                    entry.event_type,
                    entry.actor,
                    entry.timestamp,
                    payload,
                    entry.event_hash,
                    entry.prev_event_hash,
                ])
                .with_context(|| format!("inserting {}", entry.event_id))?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn log_entries(
        &self,
        watchlist_id: &str,
        event_type: Option<&str>,
    ) -> anyhow::Result<Vec<LogEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT event_id, event_type, actor, ts, payload, event_hash, prev_event_hash, watchlist_id
             FROM log_entries
             WHERE watchlist_id = ?1 AND (?2 IS NULL OR event_type = ?2)
             ORDER BY rowid",
        )?;
        let rows = stmt
            .query_map(params![watchlist_id, event_type], map_log_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(row_to_log_entry).collect()
    }

    // ── Derived statistics ──────────────────────────────────────────

    fn upsert_contributor_stats(&self, stats: &ContributorStats) -> anyhow::Result<()> {
        let aggregates = serde_json::to_string(&stats.aggregates)?;
        self.conn()?.execute(
            "INSERT INTO contributor_stats
                (watchlist_id, author_email, author_name, aggregates, computed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(watchlist_id, author_email) DO UPDATE SET
                author_name = excluded.author_name,
                aggregates = excluded.aggregates,
                computed_at = excluded.computed_at",
            params![
                stats.watchlist_id,
                stats.author_email,
                stats.author_name,
                aggregates,
                stats.computed_at
            ],
        )?;
        Ok(())
    }

    fn upsert_repo_stats(&self, stats: &RepoStats) -> anyhow::Result<()> {
        let aggregates = serde_json::to_string(&stats.aggregates)?;
        self.conn()?.execute(
            "INSERT INTO repo_stats (watchlist_id, total_contributors, aggregates, computed_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(watchlist_id) DO UPDATE SET
                total_contributors = excluded.total_contributors,
                aggregates = excluded.aggregates,
                computed_at = excluded.computed_at",
            params![
                stats.watchlist_id,
                stats.total_contributors as i64,
                aggregates,
                stats.computed_at
            ],
        )?;
        Ok(())
    }

    fn find_repo_stats(&self, watchlist_id: &str) -> anyhow::Result<Option<RepoStats>> {
        let conn = self.conn()?;
        let row: Option<(i64, String, String)> = conn
            .query_row(
                "SELECT total_contributors, aggregates, computed_at
                 FROM repo_stats WHERE watchlist_id = ?1",
                params![watchlist_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        match row {
            None => Ok(None),
            Some((total_contributors, aggregates, computed_at)) => {
                let aggregates: CommitAggregates = serde_json::from_str(&aggregates)
                    .with_context(|| format!("decoding repo stats for {watchlist_id}"))?;
                Ok(Some(RepoStats {
                    watchlist_id: watchlist_id.to_string(),
                    total_contributors: total_contributors.max(0) as u64,
                    aggregates,
                    computed_at,
                }))
            }
        }
    }

    fn contributor_stats(&self, watchlist_id: &str) -> anyhow::Result<Vec<ContributorStats>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT author_email, author_name, aggregates, computed_at
             FROM contributor_stats WHERE watchlist_id = ?1
             ORDER BY author_email",
        )?;
        let rows: Vec<(String, String, String, String)> = stmt
            .query_map(params![watchlist_id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        let mut out = Vec::with_capacity(rows.len());
        for (author_email, author_name, aggregates, computed_at) in rows {
            let aggregates: CommitAggregates = serde_json::from_str(&aggregates)
                .with_context(|| format!("decoding stats for {author_email}"))?;
            out.push(ContributorStats {
                watchlist_id: watchlist_id.to_string(),
                author_email,
                author_name,
                aggregates,
                computed_at,
            });
        }
        Ok(out)
    }

    // ── Health analyses ─────────────────────────────────────────────

    fn create_health_analysis(&self, result: &HealthAnalysisResult) -> anyhow::Result<()> {
        let raw = result
            .raw_output
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        self.conn()?.execute(
            "INSERT INTO health_analysis
                (watchlist_id, commit_sha, commit_date, raw_output, health_score, analyzed_at, source)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                result.watchlist_id,
                result.commit_sha,
                result.commit_date,
                raw,
                result.health_score,
                result.analyzed_at,
                result.source.as_str()
            ],
        )?;
        Ok(())
    }

    fn health_analyses(&self, watchlist_id: &str) -> anyhow::Result<Vec<HealthAnalysisResult>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT commit_sha, commit_date, raw_output, health_score, analyzed_at, source
             FROM health_analysis WHERE watchlist_id = ?1
             ORDER BY commit_date, rowid",
        )?;
        let rows: Vec<(String, String, Option<String>, u8, String, String)> = stmt
            .query_map(params![watchlist_id], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        let mut out = Vec::with_capacity(rows.len());
        for (commit_sha, commit_date, raw, health_score, analyzed_at, source) in rows {
            let raw_output = raw
                .map(|r| serde_json::from_str::<serde_json::Value>(&r))
                .transpose()?;
            let source = ScoreSource::parse(&source)
                .ok_or_else(|| anyhow::anyhow!("unknown score source {source:?}"))?;
            out.push(HealthAnalysisResult {
                watchlist_id: watchlist_id.to_string(),
                commit_sha,
                commit_date,
                raw_output,
                health_score,
                analyzed_at,
                source,
            });
        }
        Ok(out)
    }
}

// ── Internal helpers ────────────────────────────────────────────────

/// Intermediate row struct for deserialization.
struct LogRow {
    event_id: String,
    event_type: String,
    actor: String,
    ts: String,
    payload_str: String,
    event_hash: String,
    prev_event_hash: Option<String>,
    watchlist_id: String,
}

fn map_log_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<LogRow> {
    Ok(LogRow {
        event_id: row.get(0)?,
        event_type: row.get(1)?,
        actor: row.get(2)?,
        ts: row.get(3)?,
        payload_str: row.get(4)?,
        event_hash: row.get(5)?,
        prev_event_hash: row.get(6)?,
        watchlist_id: row.get(7)?,
    })
}

fn row_to_log_entry(row: LogRow) -> anyhow::Result<LogEntry> {
    let payload = serde_json::from_str(&row.payload_str)
        .with_context(|| format!("decoding payload of {}", row.event_id))?;
    Ok(LogEntry {
        event_id: row.event_id,
        event_type: row.event_type,
        actor: row.actor,
        timestamp: row.ts,
        payload,
        event_hash: row.event_hash,
        prev_event_hash: row.prev_event_hash,
        watchlist_id: row.watchlist_id,
    })
}
