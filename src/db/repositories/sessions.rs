use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use crate::db::{
    connection::Database,
    helpers::{format_datetime, parse_datetime, parse_optional_datetime},
    models::{duration_seconds, Session, SessionId},
};

/// Result of opening a session: the new row plus any sessions that were
/// still open and had to be closed first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedSession {
    pub id: SessionId,
    pub closed: Vec<Session>,
}

fn row_to_session(row: &Row) -> Result<Session> {
    let start_time: String = row.get("start_time")?;
    let end_time: Option<String> = row.get("end_time")?;

    Ok(Session {
        id: row.get("id")?,
        start_time: parse_datetime(&start_time, "start_time")?,
        end_time: parse_optional_datetime(end_time, "end_time")?,
        duration_seconds: row.get("duration_seconds")?,
    })
}

fn query_open_sessions(conn: &Connection) -> Result<Vec<Session>> {
    let mut stmt = conn.prepare(
        "SELECT id, start_time, end_time, duration_seconds
         FROM player_sessions
         WHERE end_time IS NULL
         ORDER BY start_time ASC, id ASC",
    )?;

    let mut rows = stmt.query([])?;
    let mut sessions = Vec::new();
    while let Some(row) = rows.next()? {
        sessions.push(row_to_session(row)?);
    }
    Ok(sessions)
}

/// Closes every open session at `end`, oldest first.
fn close_all_open(conn: &Connection, end: DateTime<Utc>) -> Result<Vec<Session>> {
    let mut closed = query_open_sessions(conn)?;
    for session in closed.iter_mut() {
        let duration = duration_seconds(session.start_time, end);
        conn.execute(
            "UPDATE player_sessions
             SET end_time = ?1,
                 duration_seconds = ?2
             WHERE id = ?3",
            params![format_datetime(end), duration, session.id],
        )?;
        session.close(end, duration);
    }
    Ok(closed)
}

impl Database {
    pub async fn open_session(&self, start: DateTime<Utc>) -> Result<OpenedSession> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let closed = close_all_open(&tx, start)?;
            tx.execute(
                "INSERT INTO player_sessions (start_time) VALUES (?1)",
                params![format_datetime(start)],
            )?;
            let id = tx.last_insert_rowid();
            tx.commit()?;
            Ok(OpenedSession { id, closed })
        })
        .await
    }

    /// Returns `false` when no session with that id exists.
    pub async fn close_session(
        &self,
        session_id: SessionId,
        end: DateTime<Utc>,
        duration_secs: i64,
    ) -> Result<bool> {
        self.execute(move |conn| {
            let updated = conn.execute(
                "UPDATE player_sessions
                 SET end_time = ?1,
                     duration_seconds = ?2
                 WHERE id = ?3",
                params![format_datetime(end), duration_secs, session_id],
            )?;
            Ok(updated > 0)
        })
        .await
    }

    pub async fn close_open_sessions(&self, end: DateTime<Utc>) -> Result<Vec<Session>> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let closed = close_all_open(&tx, end)?;
            tx.commit()?;
            Ok(closed)
        })
        .await
    }

    pub async fn get_open_sessions(&self) -> Result<Vec<Session>> {
        self.execute(|conn| query_open_sessions(conn)).await
    }

    pub async fn get_closed_sessions_since(&self, since: DateTime<Utc>) -> Result<Vec<Session>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, start_time, end_time, duration_seconds
                 FROM player_sessions
                 WHERE start_time >= ?1 AND end_time IS NOT NULL
                 ORDER BY start_time ASC, id ASC",
            )?;

            let mut rows = stmt.query(params![format_datetime(since)])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }
            Ok(sessions)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn open_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("sessions.sqlite3")).unwrap();
        (dir, db)
    }

    #[tokio::test]
    async fn open_then_close_round_trip() {
        let (_dir, db) = open_db();
        let start = Utc.with_ymd_and_hms(2025, 5, 1, 9, 0, 0).unwrap();

        let opened = db.open_session(start).await.unwrap();
        assert!(opened.closed.is_empty());
        assert_eq!(db.get_open_sessions().await.unwrap().len(), 1);

        let end = start + Duration::seconds(95);
        assert!(db.close_session(opened.id, end, 95).await.unwrap());
        assert!(db.get_open_sessions().await.unwrap().is_empty());

        let sessions = db.get_closed_sessions_since(start).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].end_time, Some(end));
        assert_eq!(sessions[0].duration_seconds, Some(95));
    }

    #[tokio::test]
    async fn opening_closes_stale_sessions_first() {
        let (_dir, db) = open_db();
        let first = Utc.with_ymd_and_hms(2025, 5, 1, 9, 0, 0).unwrap();
        let second = first + Duration::seconds(30);

        let stale = db.open_session(first).await.unwrap();
        let fresh = db.open_session(second).await.unwrap();

        assert_eq!(fresh.closed.len(), 1);
        assert_eq!(fresh.closed[0].id, stale.id);
        assert_eq!(fresh.closed[0].duration_seconds, Some(30));

        let open = db.get_open_sessions().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, fresh.id);
    }

    #[tokio::test]
    async fn closing_unknown_session_reports_false() {
        let (_dir, db) = open_db();
        let now = Utc.with_ymd_and_hms(2025, 5, 1, 9, 0, 0).unwrap();
        assert!(!db.close_session(404, now, 1).await.unwrap());
    }

    #[tokio::test]
    async fn close_open_sessions_sweeps_everything() {
        let (_dir, db) = open_db();
        let start = Utc.with_ymd_and_hms(2025, 5, 1, 9, 0, 0).unwrap();
        db.open_session(start).await.unwrap();

        let closed = db
            .close_open_sessions(start + Duration::seconds(12))
            .await
            .unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].duration_seconds, Some(12));
        assert!(db.get_open_sessions().await.unwrap().is_empty());
    }
}
