use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{format_datetime, parse_datetime},
    models::Sample,
};

fn row_to_sample(row: &Row) -> Result<Sample> {
    let timestamp: String = row.get("timestamp")?;

    Ok(Sample {
        id: Some(row.get("id")?),
        timestamp: parse_datetime(&timestamp, "timestamp")?,
        distance: row.get("distance")?,
        volume: row.get("volume")?,
        frequency: row.get("frequency")?,
        note: row.get("note")?,
        octave: row.get("octave")?,
    })
}

impl Database {
    /// Inserts the reading and returns the row id SQLite assigned to it.
    pub async fn insert_reading(&self, sample: &Sample) -> Result<i64> {
        let record = sample.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO readings (timestamp, distance, volume, frequency, note, octave)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    format_datetime(record.timestamp),
                    record.distance,
                    record.volume,
                    record.frequency,
                    record.note,
                    record.octave,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    pub async fn get_readings_since(&self, since: DateTime<Utc>) -> Result<Vec<Sample>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, timestamp, distance, volume, frequency, note, octave
                 FROM readings
                 WHERE timestamp >= ?1
                 ORDER BY timestamp ASC, id ASC",
            )?;

            let mut rows = stmt.query(params![format_datetime(since)])?;
            let mut readings = Vec::new();
            while let Some(row) = rows.next()? {
                readings.push(row_to_sample(row)?);
            }
            Ok(readings)
        })
        .await
    }

    pub async fn latest_reading(&self) -> Result<Option<Sample>> {
        self.execute(|conn| {
            let raw = conn
                .query_row(
                    "SELECT id, timestamp, distance, volume, frequency, note, octave
                     FROM readings
                     ORDER BY timestamp DESC, id DESC
                     LIMIT 1",
                    [],
                    |row| Ok(row_to_sample(row)),
                )
                .optional()?;

            raw.transpose()
        })
        .await
    }
}
