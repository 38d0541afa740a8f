use crate::error::app_error::AppError;
use crate::models::event::{SessionEvent, SessionEventType, UserEvent, UserEventType};
use crate::models::session::{NewSession, Session};
use crate::models::user::{UpsertedUser, User, UserUpsert};
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Session rows. Lookups only ever see sessions in a live state.
#[async_trait::async_trait]
pub trait SessionStore {
    async fn insert_session(&mut self, session: &NewSession) -> Result<Session, AppError>;
    async fn find_active_session(&mut self, id: &Uuid) -> Result<Option<Session>, AppError>;
    /// Like `find_active_session`, but holds the row lock until the transaction ends.
    async fn find_active_session_for_update(&mut self, id: &Uuid) -> Result<Option<Session>, AppError>;
    /// Only applies while the session has no user. Consent is OR-merged; returns rows affected.
    async fn link_session_to_user(&mut self, id: &Uuid, user_id: i32, agreed_to_cookie_policy: bool, now: DateTime<Utc>) -> Result<u64, AppError>;
    async fn expire_session(&mut self, id: &Uuid, now: DateTime<Utc>) -> Result<u64, AppError>;
    async fn agree_session_to_cookie_policy(&mut self, id: &Uuid, now: DateTime<Utc>) -> Result<Option<Session>, AppError>;
}

#[async_trait::async_trait]
pub trait UserStore {
    async fn upsert_user(&mut self, user: &UserUpsert) -> Result<UpsertedUser, AppError>;
    async fn find_user_by_identity_hash(&mut self, identity_hash: &str) -> Result<Option<User>, AppError>;
    async fn find_user_by_id(&mut self, id: i32) -> Result<Option<User>, AppError>;
    async fn find_users_by_ids(&mut self, ids: &[i32]) -> Result<Vec<User>, AppError>;
    /// Only applies to active users; returns rows affected.
    async fn agree_user_to_cookie_policy(&mut self, id: i32, now: DateTime<Utc>) -> Result<u64, AppError>;
}

/// Append-only audit trail for both sessions and users.
#[async_trait::async_trait]
pub trait EventLog {
    async fn append_session_event(
        &mut self,
        session_id: &Uuid,
        event_type: SessionEventType,
        timestamp: DateTime<Utc>,
        data: Option<JsonValue>,
    ) -> Result<(), AppError>;
    async fn list_session_events(&mut self, session_id: &Uuid) -> Result<Vec<SessionEvent>, AppError>;
    async fn append_user_event(&mut self, user_id: i32, event_type: UserEventType, timestamp: DateTime<Utc>, data: Option<JsonValue>) -> Result<(), AppError>;
    async fn list_user_events(&mut self, user_id: i32) -> Result<Vec<UserEvent>, AppError>;
    async fn count_user_events(&mut self, user_id: i32, event_type: UserEventType) -> Result<i64, AppError>;
}

/// One unit of work. Dropping it without `commit` rolls everything back.
#[async_trait::async_trait]
pub trait IdentityTransaction: SessionStore + UserStore + EventLog + Send {
    async fn commit(self) -> Result<(), AppError>;
}

#[async_trait::async_trait]
pub trait TransactionProvider: Send + Sync {
    type Transaction: IdentityTransaction;

    async fn begin(&self) -> Result<Self::Transaction, AppError>;
}
