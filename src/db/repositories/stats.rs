use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::params;

use crate::db::{
    connection::Database,
    helpers::{format_date, parse_date, to_u64},
    models::{DailyCount, GlobalStats, RecordCounts},
};

impl Database {
    /// Bumps the global total and the counter for `day` in one transaction.
    pub async fn increment_session_count(&self, day: NaiveDate) -> Result<()> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE global_stats SET total_sessions = total_sessions + 1 WHERE id = 1",
                [],
            )?;
            tx.execute(
                "INSERT INTO daily_counts (date, count) VALUES (?1, 1)
                 ON CONFLICT(date) DO UPDATE SET count = count + 1",
                params![format_date(day)],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    /// Never lowers the stored record.
    pub async fn raise_longest_duration(&self, duration_secs: i64) -> Result<()> {
        self.execute(move |conn| {
            conn.execute(
                "UPDATE global_stats
                 SET longest_duration = MAX(longest_duration, ?1)
                 WHERE id = 1",
                params![duration_secs],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_global_stats(&self) -> Result<GlobalStats> {
        self.execute(|conn| {
            let (total, longest, present): (i64, i64, bool) = conn.query_row(
                "SELECT total_sessions,
                        longest_duration,
                        EXISTS (SELECT 1 FROM player_sessions WHERE end_time IS NULL)
                 FROM global_stats
                 WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;

            Ok(GlobalStats {
                total_sessions: to_u64(total, "total_sessions")?,
                longest_duration_seconds: longest,
                currently_present: present,
            })
        })
        .await
    }

    pub async fn count_records(&self) -> Result<RecordCounts> {
        self.execute(|conn| {
            let (readings, sessions): (i64, i64) = conn.query_row(
                "SELECT (SELECT COUNT(*) FROM readings),
                        (SELECT COUNT(*) FROM player_sessions)",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            Ok(RecordCounts {
                readings: to_u64(readings, "readings")?,
                sessions: to_u64(sessions, "sessions")?,
            })
        })
        .await
    }

    pub async fn get_daily_counts(&self, since: NaiveDate) -> Result<Vec<DailyCount>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT date, count FROM daily_counts WHERE date >= ?1 ORDER BY date ASC",
            )?;

            let mut rows = stmt.query(params![format_date(since)])?;
            let mut counts = Vec::new();
            while let Some(row) = rows.next()? {
                let date: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                counts.push(DailyCount {
                    date: parse_date(&date, "date")?,
                    count: to_u64(count, "count")?,
                });
            }
            Ok(counts)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn open_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("stats.sqlite3")).unwrap();
        (dir, db)
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, d).unwrap()
    }

    #[tokio::test]
    async fn counts_accumulate_per_day() {
        let (_dir, db) = open_db();
        db.increment_session_count(day(2)).await.unwrap();
        db.increment_session_count(day(2)).await.unwrap();
        db.increment_session_count(day(1)).await.unwrap();

        let counts = db.get_daily_counts(day(1)).await.unwrap();
        assert_eq!(
            counts,
            vec![
                DailyCount { date: day(1), count: 1 },
                DailyCount { date: day(2), count: 2 },
            ]
        );
        assert_eq!(db.get_daily_counts(day(2)).await.unwrap().len(), 1);
        assert_eq!(db.get_global_stats().await.unwrap().total_sessions, 3);
    }

    #[tokio::test]
    async fn longest_duration_is_monotonic() {
        let (_dir, db) = open_db();
        db.raise_longest_duration(40).await.unwrap();
        db.raise_longest_duration(12).await.unwrap();
        assert_eq!(
            db.get_global_stats().await.unwrap().longest_duration_seconds,
            40
        );
    }

    #[tokio::test]
    async fn presence_follows_open_sessions() {
        let (_dir, db) = open_db();
        assert!(!db.get_global_stats().await.unwrap().currently_present);

        let start = Utc.with_ymd_and_hms(2025, 5, 1, 9, 0, 0).unwrap();
        let opened = db.open_session(start).await.unwrap();
        assert!(db.get_global_stats().await.unwrap().currently_present);

        db.close_session(opened.id, start, 0).await.unwrap();
        assert!(!db.get_global_stats().await.unwrap().currently_present);
    }

    #[tokio::test]
    async fn record_counts_include_open_sessions() {
        let (_dir, db) = open_db();
        assert_eq!(db.count_records().await.unwrap(), RecordCounts::default());

        let start = Utc.with_ymd_and_hms(2025, 5, 1, 9, 0, 0).unwrap();
        db.insert_reading(&crate::db::Sample::new(start, 120, 40))
            .await
            .unwrap();
        let first = db.open_session(start).await.unwrap();
        db.close_session(first.id, start + Duration::seconds(5), 5)
            .await
            .unwrap();
        db.open_session(start + Duration::minutes(1)).await.unwrap();

        let counts = db.count_records().await.unwrap();
        assert_eq!(counts.readings, 1);
        assert_eq!(counts.sessions, 2);
    }
}
