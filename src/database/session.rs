use crate::database::postgres_repository::PostgresTransaction;
use crate::database::store::SessionStore;
use crate::error::app_error::AppError;
use crate::models::session::{NewSession, Session, SessionState};
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};
use rand::RngCore;
use uuid::Uuid;

const XSRF_TOKEN_BYTES: usize = 48;

/// Generate a session XSRF token: 48 random bytes, URL-safe base64 (64 chars).
pub fn generate_xsrf_token() -> String {
    let mut token_bytes = [0u8; XSRF_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut token_bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(token_bytes)
}

/// Constant-time string comparison for presented XSRF tokens.
pub(crate) fn xsrf_tokens_match(stored: &str, presented: &str) -> bool {
    if stored.len() != presented.len() {
        return false;
    }

    let mut result = 0u8;
    for (a, b) in stored.bytes().zip(presented.bytes()) {
        result |= a ^ b;
    }

    result == 0
}

#[async_trait::async_trait]
impl SessionStore for PostgresTransaction {
    async fn insert_session(&mut self, session: &NewSession) -> Result<Session, AppError> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO identity_session (id, state, xsrf_token, agreed_to_cookie_policy, user_id, time_created, time_last_updated, time_removed)
            VALUES ($1, $2, $3, $4, NULL, $5, $5, NULL)
            RETURNING id, state, xsrf_token, agreed_to_cookie_policy, user_id, time_created, time_last_updated, time_removed
            "#,
        )
        .bind(session.id)
        .bind(session.state)
        .bind(&session.xsrf_token)
        .bind(session.agreed_to_cookie_policy)
        .bind(session.time_created)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| AppError::db("Failed to create session", e))?;

        Ok(session)
    }

    async fn find_active_session(&mut self, id: &Uuid) -> Result<Option<Session>, AppError> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            SELECT id, state, xsrf_token, agreed_to_cookie_policy, user_id, time_created, time_last_updated, time_removed
            FROM identity_session
            WHERE id = $1
              AND state IN ($2, $3)
            "#,
        )
        .bind(id)
        .bind(SessionState::Active)
        .bind(SessionState::ActiveAndLinkedWithUser)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| AppError::db("Failed to fetch session", e))?;

        Ok(session)
    }

    async fn find_active_session_for_update(&mut self, id: &Uuid) -> Result<Option<Session>, AppError> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            SELECT id, state, xsrf_token, agreed_to_cookie_policy, user_id, time_created, time_last_updated, time_removed
            FROM identity_session
            WHERE id = $1
              AND state IN ($2, $3)
            FOR UPDATE
            "#,
        )
        .bind(id)
        .bind(SessionState::Active)
        .bind(SessionState::ActiveAndLinkedWithUser)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| AppError::db("Failed to lock session", e))?;

        Ok(session)
    }

    async fn link_session_to_user(&mut self, id: &Uuid, user_id: i32, agreed_to_cookie_policy: bool, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE identity_session
            SET state = $2, user_id = $3, agreed_to_cookie_policy = identity_session.agreed_to_cookie_policy OR $4, time_last_updated = $5
            WHERE id = $1
              AND user_id IS NULL
              AND state = $6
            "#,
        )
        .bind(id)
        .bind(SessionState::ActiveAndLinkedWithUser)
        .bind(user_id)
        .bind(agreed_to_cookie_policy)
        .bind(now)
        .bind(SessionState::Active)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| AppError::db("Failed to link session to user", e))?;

        Ok(result.rows_affected())
    }

    async fn expire_session(&mut self, id: &Uuid, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE identity_session
            SET state = $2, time_last_updated = $3, time_removed = $3
            WHERE id = $1
              AND state IN ($4, $5)
            "#,
        )
        .bind(id)
        .bind(SessionState::Expired)
        .bind(now)
        .bind(SessionState::Active)
        .bind(SessionState::ActiveAndLinkedWithUser)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| AppError::db("Failed to expire session", e))?;

        Ok(result.rows_affected())
    }

    async fn agree_session_to_cookie_policy(&mut self, id: &Uuid, now: DateTime<Utc>) -> Result<Option<Session>, AppError> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            UPDATE identity_session
            SET agreed_to_cookie_policy = TRUE, time_last_updated = $2
            WHERE id = $1
              AND state IN ($3, $4)
            RETURNING id, state, xsrf_token, agreed_to_cookie_policy, user_id, time_created, time_last_updated, time_removed
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(SessionState::Active)
        .bind(SessionState::ActiveAndLinkedWithUser)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| AppError::db("Failed to record cookie policy agreement for session", e))?;

        Ok(session)
    }
}
