//! SQLite-backed record of delivered reminders

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use calremind_schema::{format_instant, LedgerStats, SentReminder};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection};
use tokio::sync::Mutex;

/// The ledger operations a reminder cycle needs.
#[async_trait]
pub trait SentLedger: Send + Sync {
    async fn exists(&self, event_id: &str, fire_at: DateTime<Utc>) -> Result<bool>;

    async fn commit_at(
        &self,
        event_id: &str,
        event_title: &str,
        event_start: DateTime<Utc>,
        fire_at: DateTime<Utc>,
        sent_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn prune_at(&self, retention_days: u32, now: DateTime<Utc>) -> Result<usize>;
}

/// Sole source of truth for "has this reminder already gone out?".
///
/// Fire instants are stored in their canonical nanosecond text form so
/// lookups compare at full precision; millisecond columns back the range
/// queries used by pruning and stats.
pub struct ReminderLedger {
    conn: Arc<Mutex<Connection>>,
}

impl ReminderLedger {
    /// Open or create the database at the given path
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub async fn exists(&self, event_id: &str, fire_at: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn.lock().await;
        let found: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sent_reminders WHERE event_id = ?1 AND fire_at = ?2)",
            params![event_id, format_instant(fire_at)],
            |row| row.get(0),
        )?;
        Ok(found)
    }

    /// Record a delivery that already succeeded.
    pub async fn commit(
        &self,
        event_id: &str,
        event_title: &str,
        event_start: DateTime<Utc>,
        fire_at: DateTime<Utc>,
    ) -> Result<()> {
        self.commit_at(event_id, event_title, event_start, fire_at, Utc::now())
            .await
    }

    pub async fn commit_at(
        &self,
        event_id: &str,
        event_title: &str,
        event_start: DateTime<Utc>,
        fire_at: DateTime<Utc>,
        sent_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT INTO sent_reminders
               (event_id, event_title, event_start, event_start_ms, fire_at, sent_at, sent_at_ms)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            params![
                event_id,
                event_title,
                format_instant(event_start),
                event_start.timestamp_millis(),
                format_instant(fire_at),
                format_instant(sent_at),
                sent_at.timestamp_millis(),
            ],
        )?;
        tracing::debug!("ledger commit {event_id} @ {}", format_instant(fire_at));
        Ok(())
    }

    /// Drop entries whose event started more than `retention_days` ago.
    pub async fn prune(&self, retention_days: u32) -> Result<usize> {
        self.prune_at(retention_days, Utc::now()).await
    }

    pub async fn prune_at(&self, retention_days: u32, now: DateTime<Utc>) -> Result<usize> {
        self.prune_before(now - Duration::days(i64::from(retention_days)))
            .await
    }

    pub async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock().await;
        let removed = conn.execute(
            "DELETE FROM sent_reminders WHERE event_start_ms < ?1",
            [cutoff.timestamp_millis()],
        )?;
        Ok(removed)
    }

    pub async fn stats(&self) -> Result<LedgerStats> {
        self.stats_at(Utc::now()).await
    }

    pub async fn stats_at(&self, now: DateTime<Utc>) -> Result<LedgerStats> {
        let week_ago = (now - Duration::days(7)).timestamp_millis();
        let conn = self.conn.lock().await;
        let (total, last_7_days): (i64, i64) = conn.query_row(
            r#"SELECT COUNT(*),
                      COALESCE(SUM(CASE WHEN sent_at_ms >= ?1 THEN 1 ELSE 0 END), 0)
               FROM sent_reminders"#,
            [week_ago],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(LedgerStats {
            total: total.max(0) as u64,
            last_7_days: last_7_days.max(0) as u64,
        })
    }

    /// Most recent deliveries, newest first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<SentReminder>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            r#"SELECT event_id, event_title, event_start, fire_at, sent_at
               FROM sent_reminders
               ORDER BY sent_at_ms DESC, id DESC
               LIMIT ?1"#,
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            Ok(SentReminder {
                event_id: row.get(0)?,
                event_title: row.get(1)?,
                event_start: parse_instant(row, 2)?,
                fire_at: parse_instant(row, 3)?,
                sent_at: parse_instant(row, 4)?,
            })
        })?;

        let mut sent = Vec::new();
        for row in rows {
            sent.push(row?);
        }
        Ok(sent)
    }
}

#[async_trait]
impl SentLedger for ReminderLedger {
    async fn exists(&self, event_id: &str, fire_at: DateTime<Utc>) -> Result<bool> {
        ReminderLedger::exists(self, event_id, fire_at).await
    }

    async fn commit_at(
        &self,
        event_id: &str,
        event_title: &str,
        event_start: DateTime<Utc>,
        fire_at: DateTime<Utc>,
        sent_at: DateTime<Utc>,
    ) -> Result<()> {
        ReminderLedger::commit_at(self, event_id, event_title, event_start, fire_at, sent_at).await
    }

    async fn prune_at(&self, retention_days: u32, now: DateTime<Utc>) -> Result<usize> {
        ReminderLedger::prune_at(self, retention_days, now).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn parse_instant(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"CREATE TABLE IF NOT EXISTS __ledger_schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );"#,
    )?;

    let applied: std::collections::HashSet<i64> = {
        let mut stmt = conn.prepare("SELECT version FROM __ledger_schema_version")?;
        let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
        rows.filter_map(|r| r.ok()).collect()
    };

    let migrations: Vec<(i64, &str)> = vec![
        (
            1,
            r#"
            CREATE TABLE IF NOT EXISTS sent_reminders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id TEXT NOT NULL,
                event_title TEXT NOT NULL,
                event_start TEXT NOT NULL,
                event_start_ms INTEGER NOT NULL,
                fire_at TEXT NOT NULL,
                sent_at TEXT NOT NULL,
                sent_at_ms INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sent_reminders_lookup ON sent_reminders(event_id, fire_at);
            CREATE INDEX IF NOT EXISTS idx_sent_reminders_start ON sent_reminders(event_start_ms);
            "#,
        ),
        (
            2,
            "CREATE INDEX IF NOT EXISTS idx_sent_reminders_sent ON sent_reminders(sent_at_ms);",
        ),
    ];

    for (version, sql) in migrations {
        if applied.contains(&version) {
            continue;
        }
        conn.execute_batch(sql)?;
        conn.execute(
            "INSERT INTO __ledger_schema_version (version) VALUES (?1)",
            [version],
        )?;
        tracing::debug!("applied ledger migration v{version}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use tempfile::TempDir;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn exists_after_commit() {
        let ledger = ReminderLedger::open_in_memory().unwrap();
        let fire_at = now() + Duration::minutes(10);

        assert!(!ledger.exists("evt", fire_at).await.unwrap());
        ledger
            .commit("evt", "Board Review", now() + Duration::hours(24), fire_at)
            .await
            .unwrap();
        assert!(ledger.exists("evt", fire_at).await.unwrap());
        assert!(!ledger.exists("other", fire_at).await.unwrap());
    }

    #[tokio::test]
    async fn exists_compares_full_precision() {
        let ledger = ReminderLedger::open_in_memory().unwrap();
        let fire_at = Utc.timestamp_opt(1_772_366_400, 500_000_001).unwrap();
        ledger.commit("evt", "t", fire_at, fire_at).await.unwrap();

        assert!(ledger.exists("evt", fire_at).await.unwrap());
        assert!(!ledger
            .exists("evt", fire_at + Duration::nanoseconds(1))
            .await
            .unwrap());
        assert!(!ledger
            .exists("evt", fire_at - Duration::nanoseconds(1))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn duplicate_commit_does_not_error() {
        let ledger = ReminderLedger::open_in_memory().unwrap();
        let fire_at = now();
        ledger.commit("evt", "t", fire_at, fire_at).await.unwrap();
        ledger.commit("evt", "t", fire_at, fire_at).await.unwrap();
        assert_eq!(ledger.stats_at(now()).await.unwrap().total, 2);
    }

    #[tokio::test]
    async fn prune_removes_only_entries_past_retention() {
        let ledger = ReminderLedger::open_in_memory().unwrap();
        let old_start = now() - Duration::days(31);
        let recent_start = now() - Duration::days(29);
        ledger.commit("old", "Old", old_start, old_start).await.unwrap();
        ledger
            .commit("recent", "Recent", recent_start, recent_start)
            .await
            .unwrap();

        let removed = ledger.prune_at(30, now()).await.unwrap();

        assert_eq!(removed, 1);
        assert!(!ledger.exists("old", old_start).await.unwrap());
        assert!(ledger.exists("recent", recent_start).await.unwrap());
    }

    #[tokio::test]
    async fn stats_counts_last_seven_days_by_delivery_time() {
        let ledger = ReminderLedger::open_in_memory().unwrap();
        let start = now() + Duration::days(1);
        for (i, days_ago) in [0_i64, 3, 6, 8, 20].iter().enumerate() {
            ledger
                .commit_at(
                    &format!("evt-{i}"),
                    "t",
                    start,
                    start,
                    now() - Duration::days(*days_ago),
                )
                .await
                .unwrap();
        }

        let stats = ledger.stats_at(now()).await.unwrap();
        assert_eq!(stats.total, 5);
        assert_eq!(stats.last_7_days, 3);
    }

    #[tokio::test]
    async fn empty_ledger_stats_are_zero() {
        let ledger = ReminderLedger::open_in_memory().unwrap();
        assert_eq!(ledger.stats_at(now()).await.unwrap(), LedgerStats::default());
    }

    #[tokio::test]
    async fn recent_returns_newest_first() {
        let ledger = ReminderLedger::open_in_memory().unwrap();
        let start = now() + Duration::hours(3);
        ledger
            .commit_at("a", "First", start, start, now() - Duration::hours(2))
            .await
            .unwrap();
        ledger
            .commit_at("b", "Second", start, start, now() - Duration::hours(1))
            .await
            .unwrap();

        let recent = ledger.recent(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].event_id, "b");
        assert_eq!(recent[1].event_start, start);
    }

    #[tokio::test]
    async fn entries_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("data").join("reminders.db");
        let fire_at = now();

        {
            let ledger = ReminderLedger::open(&db_path).unwrap();
            ledger.commit("evt", "t", fire_at, fire_at).await.unwrap();
        }

        let reopened = ReminderLedger::open(&db_path).unwrap();
        assert!(reopened.exists("evt", fire_at).await.unwrap());
    }
}
