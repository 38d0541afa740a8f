use crate::database::postgres_repository::PostgresTransaction;
use crate::database::store::UserStore;
use crate::error::app_error::AppError;
use crate::models::user::{UpsertedUser, User, UserState, UserUpsert};
use chrono::{DateTime, Utc};

#[async_trait::async_trait]
impl UserStore for PostgresTransaction {
    async fn upsert_user(&mut self, user: &UserUpsert) -> Result<UpsertedUser, AppError> {
        // Consent is OR-merged so a user who agreed once never reads as non-consenting.
        let upserted = sqlx::query_as::<_, UpsertedUser>(
            r#"
            INSERT INTO identity_user (
                state,
                role,
                agreed_to_cookie_policy,
                external_identity_id,
                external_identity_hash,
                external_profile,
                time_created,
                time_last_updated,
                time_removed
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7, NULL)
            ON CONFLICT (external_identity_hash)
            DO UPDATE SET
                state = EXCLUDED.state,
                agreed_to_cookie_policy = identity_user.agreed_to_cookie_policy OR EXCLUDED.agreed_to_cookie_policy,
                external_identity_id = EXCLUDED.external_identity_id,
                external_profile = EXCLUDED.external_profile,
                time_last_updated = EXCLUDED.time_last_updated,
                time_removed = NULL
            RETURNING id, time_created, agreed_to_cookie_policy
            "#,
        )
        .bind(UserState::Active)
        .bind(user.role)
        .bind(user.agreed_to_cookie_policy)
        .bind(&user.external_identity_id)
        .bind(&user.identity_hash)
        .bind(&user.external_profile)
        .bind(user.request_time)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| AppError::db("Failed to upsert user", e))?;

        Ok(upserted)
    }

    async fn find_user_by_identity_hash(&mut self, identity_hash: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, state, role, agreed_to_cookie_policy, external_identity_id, external_identity_hash,
                   external_profile, time_created, time_last_updated, time_removed
            FROM identity_user
            WHERE external_identity_hash = $1
              AND state = $2
            "#,
        )
        .bind(identity_hash)
        .bind(UserState::Active)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| AppError::db("Failed to fetch user by identity", e))?;

        Ok(user)
    }

    async fn find_user_by_id(&mut self, id: i32) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, state, role, agreed_to_cookie_policy, external_identity_id, external_identity_hash,
                   external_profile, time_created, time_last_updated, time_removed
            FROM identity_user
            WHERE id = $1
              AND state = $2
            "#,
        )
        .bind(id)
        .bind(UserState::Active)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| AppError::db("Failed to fetch user", e))?;

        Ok(user)
    }

    async fn find_users_by_ids(&mut self, ids: &[i32]) -> Result<Vec<User>, AppError> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT id, state, role, agreed_to_cookie_policy, external_identity_id, external_identity_hash,
                   external_profile, time_created, time_last_updated, time_removed
            FROM identity_user
            WHERE id = ANY($1)
              AND state = $2
            ORDER BY id
            "#,
        )
        .bind(ids)
        .bind(UserState::Active)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| AppError::db("Failed to fetch users", e))?;

        Ok(users)
    }

    async fn agree_user_to_cookie_policy(&mut self, id: i32, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE identity_user
            SET agreed_to_cookie_policy = TRUE, time_last_updated = $2
            WHERE id = $1
              AND state = $3
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(UserState::Active)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| AppError::db("Failed to record cookie policy agreement for user", e))?;

        Ok(result.rows_affected())
    }
}
