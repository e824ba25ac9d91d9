use crate::events::{EventRecord, EventStatus, NewEvent, schema};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;

const RECORD_COLUMNS: &str = "id, event_id, event_json, status, created_at, updated_at";

type RawRecord = (i64, String, String, String, DateTime<Utc>, DateTime<Utc>);

pub struct EventStore {
    conn: Connection,
}

impl EventStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create db parent dir {}", parent.display()))?;
        }
        let conn =
            Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
        schema::migrate(&conn)?;
        Ok(Self { conn })
    }

    /// Stores the event as RECEIVED unless a record with the same id exists.
    /// Returns whether a new record was written.
    pub fn insert_if_absent(&self, event: &NewEvent) -> Result<bool> {
        Ok(self.insert_many(std::slice::from_ref(event))? == 1)
    }

    /// Inserts all events in one transaction; existing ids are left untouched.
    pub fn insert_many(&self, events: &[NewEvent]) -> Result<usize> {
        let now = Utc::now();
        let tx = self.conn.unchecked_transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO alert_events (event_id, event_json, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
            )?;
            for event in events {
                inserted += stmt.execute(params![
                    event.event_id,
                    event.event_payload.to_string(),
                    EventStatus::Received.as_str(),
                    now
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    pub fn get(&self, event_id: &str) -> Result<Option<EventRecord>> {
        let raw = self
            .conn
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM alert_events WHERE event_id = ?1"),
                params![event_id],
                read_raw,
            )
            .optional()?;
        raw.map(into_record).transpose()
    }

    /// Records awaiting delivery (RECEIVED or FAILED), in insertion order.
    pub fn list_pending(&self) -> Result<Vec<EventRecord>> {
        self.pending_after(0, None)
    }

    /// Pending records with `seq > after`, in insertion order, at most `limit`
    /// of them. Paging on the last returned `seq` never revisits a record.
    pub fn pending_after(&self, after: i64, limit: Option<usize>) -> Result<Vec<EventRecord>> {
        let limit = limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {RECORD_COLUMNS} FROM alert_events
             WHERE status IN (?1, ?2) AND id > ?3 ORDER BY id ASC LIMIT ?4"
        ))?;
        let rows = stmt
            .query_map(
                params![
                    EventStatus::PENDING[0].as_str(),
                    EventStatus::PENDING[1].as_str(),
                    after,
                    limit
                ],
                read_raw,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter().map(into_record).collect()
    }

    /// Moves the given records to `status` in a single transaction and
    /// refreshes `updated_at`. CREATED records are never moved.
    pub fn mark_status(&self, event_ids: &[String], status: EventStatus) -> Result<usize> {
        let now = Utc::now();
        let tx = self.conn.unchecked_transaction()?;
        let mut updated = 0;
        {
            let mut stmt = tx.prepare_cached(
                "UPDATE alert_events SET status = ?2, updated_at = ?3
                 WHERE event_id = ?1 AND status != ?4",
            )?;
            for id in event_ids {
                updated += stmt.execute(params![
                    id,
                    status.as_str(),
                    now,
                    EventStatus::Created.as_str()
                ])?;
            }
        }
        tx.commit()
            .with_context(|| format!("commit {status} for {} events", event_ids.len()))?;
        Ok(updated)
    }

    pub fn status_counts(&self) -> Result<BTreeMap<EventStatus, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM alert_events GROUP BY status")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut counts = BTreeMap::new();
        for (status, count) in rows {
            counts.insert(status.parse::<EventStatus>()?, count.max(0) as u64);
        }
        Ok(counts)
    }
}

fn read_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn into_record(raw: RawRecord) -> Result<EventRecord> {
    let (seq, event_id, payload, status, created_at, updated_at) = raw;
    let status = status
        .parse::<EventStatus>()
        .with_context(|| format!("read status of event {event_id}"))?;
    let event_payload = serde_json::from_str(&payload).unwrap_or_else(|e| {
        warn!(event_id = %event_id, error = %e, "stored payload is not valid JSON");
        Value::Null
    });
    Ok(EventRecord {
        seq,
        event_id,
        event_payload,
        status,
        created_at,
        updated_at,
    })
}
