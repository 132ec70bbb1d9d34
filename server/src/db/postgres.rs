//! PostgreSQL event store.

use async_trait::async_trait;
use marksync_engine::{
    EventAction, EventDraft, EventId, EventStatus, SyncEvent, SyncState, Timestamp,
};
use sqlx::{PgPool, Row};

use super::EventStore;
use crate::error::Result;

/// A stored event row from the database.
#[derive(Debug)]
pub struct StoredEvent {
    pub id: i64,
    pub category: String,
    pub user_id: String,
    pub resource_id: String,
    pub action: String,
    pub payload: Option<serde_json::Value>,
    pub device_id: String,
    pub status: String,
    pub timestamp: i64,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredEvent {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(StoredEvent {
            id: row.try_get("id")?,
            category: row.try_get("category")?,
            user_id: row.try_get("user_id")?,
            resource_id: row.try_get("resource_id")?,
            action: row.try_get("action")?,
            payload: row.try_get("payload")?,
            device_id: row.try_get("device_id")?,
            status: row.try_get("status")?,
            timestamp: row.try_get("timestamp")?,
        })
    }
}

impl StoredEvent {
    /// Convert database row to an engine SyncEvent.
    pub fn to_event(&self) -> std::result::Result<SyncEvent, String> {
        let action = self
            .action
            .parse::<EventAction>()
            .map_err(|e| e.to_string())?;
        let status = self.status.parse::<EventStatus>()?;

        Ok(SyncEvent {
            id: self.id as EventId,
            category: self.category.clone(),
            user_id: self.user_id.clone(),
            resource_id: self.resource_id.clone(),
            action,
            payload: self.payload.clone().unwrap_or(serde_json::Value::Null),
            device_id: self.device_id.clone(),
            status,
            timestamp: self.timestamp as Timestamp,
        })
    }
}

/// Convert rows, skipping any that no longer decode.
fn decode_rows(rows: Vec<StoredEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::with_capacity(rows.len());
    for row in &rows {
        match row.to_event() {
            Ok(event) => events.push(event),
            Err(e) => {
                tracing::warn!("Failed to convert stored event {}: {}", row.id, e);
            }
        }
    }
    events
}

const EVENT_COLUMNS: &str = "id, category, user_id, resource_id, action, payload, device_id, status, timestamp";

/// Event store backed by the `sync_events` and `sync_states` tables.
#[derive(Debug, Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn append(&self, draft: EventDraft) -> Result<SyncEvent> {
        let payload = (!draft.payload.is_null()).then_some(&draft.payload);

        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO sync_events (
                category, user_id, resource_id, action, payload, device_id, status, timestamp
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(&draft.category)
        .bind(&draft.user_id)
        .bind(&draft.resource_id)
        .bind(draft.action.as_str())
        .bind(payload)
        .bind(&draft.device_id)
        .bind(EventStatus::Pending.as_str())
        .bind(i64::try_from(draft.timestamp).unwrap_or(i64::MAX))
        .fetch_one(&self.pool)
        .await?;

        Ok(SyncEvent::from_draft(row.0 as EventId, draft))
    }

    async fn events_since(
        &self,
        user_id: &str,
        since: Timestamp,
        exclude_device: Option<&str>,
    ) -> Result<Vec<SyncEvent>> {
        let sql = format!(
            r#"
            SELECT {EVENT_COLUMNS}
            FROM sync_events
            WHERE user_id = $1
              AND timestamp > $2
              AND ($3::TEXT IS NULL OR device_id <> $3)
            ORDER BY id ASC
            "#
        );

        let rows = sqlx::query_as::<_, StoredEvent>(&sql)
            .bind(user_id)
            .bind(i64::try_from(since).unwrap_or(i64::MAX))
            .bind(exclude_device)
            .fetch_all(&self.pool)
            .await?;

        Ok(decode_rows(rows))
    }

    async fn latest_for_resource(
        &self,
        user_id: &str,
        resource_id: &str,
    ) -> Result<Option<SyncEvent>> {
        let sql = format!(
            r#"
            SELECT {EVENT_COLUMNS}
            FROM sync_events
            WHERE user_id = $1 AND resource_id = $2
            ORDER BY timestamp DESC, id DESC
            LIMIT 1
            "#
        );

        let rows = sqlx::query_as::<_, StoredEvent>(&sql)
            .bind(user_id)
            .bind(resource_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(decode_rows(rows).into_iter().next())
    }

    async fn set_status(&self, ids: &[EventId], status: EventStatus) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids: Vec<i64> = ids.iter().map(|&id| id as i64).collect();

        let result = sqlx::query(
            r#"
            UPDATE sync_events
            SET status = $2
            WHERE id = ANY($1) AND status <> $2
            "#,
        )
        .bind(&ids)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn sync_state(&self, user_id: &str, device_id: &str) -> Result<Option<SyncState>> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT last_sync_time
            FROM sync_states
            WHERE user_id = $1 AND device_id = $2
            "#,
        )
        .bind(user_id)
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(last_sync_time,)| {
            SyncState::new(user_id, device_id, last_sync_time as Timestamp)
        }))
    }

    async fn save_sync_state(&self, state: &SyncState) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_states (user_id, device_id, last_sync_time)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, device_id) DO UPDATE SET
                last_sync_time = GREATEST(sync_states.last_sync_time, EXCLUDED.last_sync_time),
                updated_at = NOW()
            "#,
        )
        .bind(&state.user_id)
        .bind(&state.device_id)
        .bind(i64::try_from(state.last_sync_time).unwrap_or(i64::MAX))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(action: &str, status: &str) -> StoredEvent {
        StoredEvent {
            id: 4,
            category: "bookmark_update".into(),
            user_id: "u".into(),
            resource_id: "b-1".into(),
            action: action.into(),
            payload: Some(json!({"title": "x"})),
            device_id: "d".into(),
            status: status.into(),
            timestamp: 1_000,
        }
    }

    #[test]
    fn row_to_event() {
        let event = row("update", "synced").to_event().unwrap();
        assert_eq!(event.id, 4);
        assert_eq!(event.action, EventAction::Update);
        assert_eq!(event.status, EventStatus::Synced);
        assert_eq!(event.timestamp, 1_000);
    }

    #[test]
    fn undecodable_rows_are_skipped() {
        let events = decode_rows(vec![row("update", "pending"), row("rename", "pending")]);
        assert_eq!(events.len(), 1);

        let events = decode_rows(vec![row("delete", "lost")]);
        assert!(events.is_empty());
    }

    #[test]
    fn missing_payload_is_null() {
        let mut stored = row("delete", "pending");
        stored.payload = None;
        assert!(stored.to_event().unwrap().payload.is_null());
    }
}
