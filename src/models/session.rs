use crate::models::user::{User, UserResponse};
use chrono::{DateTime, Utc};
use rocket::serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, JsonSchema, sqlx::Type)]
#[repr(i16)]
pub enum SessionState {
    Active = 1,
    ActiveAndLinkedWithUser = 2,
    Expired = 3,
}

impl SessionState {
    /// States visible to lookups. Expired rows are tombstones.
    pub const LIVE: [SessionState; 2] = [SessionState::Active, SessionState::ActiveAndLinkedWithUser];

    pub fn is_live(self) -> bool {
        Self::LIVE.contains(&self)
    }
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Session {
    pub id: Uuid,
    pub state: SessionState,
    pub xsrf_token: String,
    pub agreed_to_cookie_policy: bool,
    pub user_id: Option<i32>,
    pub time_created: DateTime<Utc>,
    pub time_last_updated: DateTime<Utc>,
    pub time_removed: Option<DateTime<Utc>>,
}

/// Values for a session row about to be inserted.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub id: Uuid,
    pub state: SessionState,
    pub xsrf_token: String,
    pub agreed_to_cookie_policy: bool,
    pub time_created: DateTime<Utc>,
}

impl NewSession {
    pub fn anonymous(xsrf_token: String, time_created: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Active,
            xsrf_token,
            agreed_to_cookie_policy: false,
            time_created,
        }
    }
}

/// A live session together with the user it is linked to, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionWithUser {
    pub session: Session,
    pub user: Option<User>,
}

#[derive(Serialize, Debug, JsonSchema)]
pub struct SessionResponse {
    pub id: Uuid,
    pub state: SessionState,
    pub xsrf_token: String,
    pub agreed_to_cookie_policy: bool,
    pub user: Option<UserResponse>,
    pub time_created: DateTime<Utc>,
    pub time_last_updated: DateTime<Utc>,
}

impl From<&SessionWithUser> for SessionResponse {
    fn from(view: &SessionWithUser) -> Self {
        let session = &view.session;
        Self {
            id: session.id,
            state: session.state,
            xsrf_token: session.xsrf_token.clone(),
            agreed_to_cookie_policy: session.agreed_to_cookie_policy,
            user: view.user.as_ref().map(UserResponse::from),
            time_created: session.time_created,
            time_last_updated: session.time_last_updated,
        }
    }
}
