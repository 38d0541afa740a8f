use chrono::{DateTime, Utc};
use rocket::serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, JsonSchema, sqlx::Type)]
#[repr(i16)]
pub enum SessionEventType {
    Created = 1,
    Expired = 2,
    AgreedToCookiePolicy = 3,
    LinkedWithUser = 4,
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, JsonSchema, sqlx::Type)]
#[repr(i16)]
pub enum UserEventType {
    Created = 1,
    Recreated = 2,
    AgreedToCookiePolicy = 3,
}

#[derive(Serialize, Debug, Clone, PartialEq, JsonSchema, sqlx::FromRow)]
pub struct SessionEvent {
    pub id: i32,
    pub session_id: Uuid,
    pub event_type: SessionEventType,
    pub timestamp: DateTime<Utc>,
    pub data: Option<JsonValue>,
}

#[derive(Serialize, Debug, Clone, PartialEq, JsonSchema, sqlx::FromRow)]
pub struct UserEvent {
    pub id: i32,
    pub user_id: i32,
    pub event_type: UserEventType,
    pub timestamp: DateTime<Utc>,
    pub data: Option<JsonValue>,
}

#[derive(Serialize, Debug, JsonSchema)]
pub struct SessionEventsResponse {
    pub events: Vec<SessionEvent>,
}

#[derive(Serialize, Debug, JsonSchema)]
pub struct UserEventsResponse {
    pub events: Vec<UserEvent>,
}
