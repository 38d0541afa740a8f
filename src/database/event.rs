use crate::database::postgres_repository::PostgresTransaction;
use crate::database::store::EventLog;
use crate::error::app_error::AppError;
use crate::models::event::{SessionEvent, SessionEventType, UserEvent, UserEventType};
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[async_trait::async_trait]
impl EventLog for PostgresTransaction {
    async fn append_session_event(
        &mut self,
        session_id: &Uuid,
        event_type: SessionEventType,
        timestamp: DateTime<Utc>,
        data: Option<JsonValue>,
    ) -> Result<(), AppError> {
        tracing::info!(
            category = "audit",
            session_id = %session_id,
            event_type = ?event_type,
            "session event"
        );

        sqlx::query(
            r#"
            INSERT INTO identity_session_event (type, timestamp, data, session_id)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(event_type)
        .bind(timestamp)
        .bind(data)
        .bind(session_id)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| AppError::db("Failed to append session event", e))?;

        Ok(())
    }

    async fn list_session_events(&mut self, session_id: &Uuid) -> Result<Vec<SessionEvent>, AppError> {
        let events = sqlx::query_as::<_, SessionEvent>(
            r#"
            SELECT id, session_id, type AS event_type, timestamp, data
            FROM identity_session_event
            WHERE session_id = $1
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| AppError::db("Failed to list session events", e))?;

        Ok(events)
    }

    async fn append_user_event(&mut self, user_id: i32, event_type: UserEventType, timestamp: DateTime<Utc>, data: Option<JsonValue>) -> Result<(), AppError> {
        tracing::info!(
            category = "audit",
            user_id = user_id,
            event_type = ?event_type,
            "user event"
        );

        sqlx::query(
            r#"
            INSERT INTO identity_user_event (type, timestamp, data, user_id)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(event_type)
        .bind(timestamp)
        .bind(data)
        .bind(user_id)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| AppError::db("Failed to append user event", e))?;

        Ok(())
    }

    async fn list_user_events(&mut self, user_id: i32) -> Result<Vec<UserEvent>, AppError> {
        let events = sqlx::query_as::<_, UserEvent>(
            r#"
            SELECT id, user_id, type AS event_type, timestamp, data
            FROM identity_user_event
            WHERE user_id = $1
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| AppError::db("Failed to list user events", e))?;

        Ok(events)
    }

    async fn count_user_events(&mut self, user_id: i32, event_type: UserEventType) -> Result<i64, AppError> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM identity_user_event
            WHERE user_id = $1
              AND type = $2
            "#,
        )
        .bind(user_id)
        .bind(event_type)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| AppError::db("Failed to count user events", e))?;

        Ok(count.0)
    }
}
