use chrono::{DateTime, Utc};
use rocket::serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use serde_json::Value as JsonValue;

#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, JsonSchema, sqlx::Type)]
#[repr(i16)]
pub enum UserState {
    Active = 1,
    Removed = 2,
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Default, JsonSchema, sqlx::Type)]
#[repr(i16)]
pub enum Role {
    #[default]
    Regular = 1,
    Admin = 2,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct User {
    pub id: i32,
    pub state: UserState,
    pub role: Role,
    pub agreed_to_cookie_policy: bool,
    pub external_identity_id: String,
    pub external_identity_hash: String,
    pub external_profile: JsonValue,
    pub time_created: DateTime<Utc>,
    pub time_last_updated: DateTime<Utc>,
    pub time_removed: Option<DateTime<Utc>>,
}

impl User {
    fn profile_field(&self, key: &str) -> String {
        self.external_profile.get(key).and_then(JsonValue::as_str).unwrap_or_default().to_string()
    }

    pub fn name(&self) -> String {
        self.profile_field("name")
    }

    pub fn picture_uri(&self) -> String {
        self.profile_field("picture")
    }

    pub fn locale(&self) -> String {
        self.profile_field("locale")
    }
}

/// Insert-or-update request keyed on `identity_hash`.
#[derive(Debug, Clone)]
pub struct UserUpsert {
    pub identity_hash: String,
    pub role: Role,
    pub agreed_to_cookie_policy: bool,
    pub external_identity_id: String,
    pub external_profile: JsonValue,
    pub request_time: DateTime<Utc>,
}

/// What the store reports back from an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct UpsertedUser {
    pub id: i32,
    pub time_created: DateTime<Utc>,
    pub agreed_to_cookie_policy: bool,
}

impl UpsertedUser {
    /// A row created by this very upsert carries the request tick as its creation time.
    pub fn was_created_at(&self, request_time: DateTime<Utc>) -> bool {
        self.time_created == request_time
    }
}

#[derive(Serialize, Debug, JsonSchema)]
pub struct UserResponse {
    pub id: i32,
    pub state: UserState,
    pub role: Role,
    pub name: String,
    pub picture_uri: String,
    pub locale: String,
    pub agreed_to_cookie_policy: bool,
    pub time_created: DateTime<Utc>,
    pub time_last_updated: DateTime<Utc>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            state: user.state,
            role: user.role,
            name: user.name(),
            picture_uri: user.picture_uri(),
            locale: user.locale(),
            agreed_to_cookie_policy: user.agreed_to_cookie_policy,
            time_created: user.time_created,
            time_last_updated: user.time_last_updated,
        }
    }
}

/// Public projection handed out by the bulk users lookup.
#[derive(Serialize, Debug, PartialEq, JsonSchema)]
pub struct PublicUserResponse {
    pub id: i32,
    pub name: String,
    pub picture_uri: String,
}

impl From<&User> for PublicUserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name(),
            picture_uri: user.picture_uri(),
        }
    }
}

#[derive(Serialize, Debug, JsonSchema)]
pub struct UsersInfoResponse {
    pub users: Vec<PublicUserResponse>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_user;
    use chrono::Duration;

    #[test]
    fn profile_fields_come_from_snapshot() {
        let user = sample_user(7);
        let public = PublicUserResponse::from(&user);
        assert_eq!(public.id, 7);
        assert_eq!(public.name, "User 7");
        assert_eq!(public.picture_uri, "https://example.com/7.png");
        assert_eq!(user.locale(), "en");
    }

    #[test]
    fn missing_profile_fields_are_empty() {
        let mut user = sample_user(1);
        user.external_profile = serde_json::json!({});
        assert_eq!(user.name(), "");
    }

    #[test]
    fn upsert_created_iff_time_created_is_request_time() {
        let now = Utc::now();
        let created = UpsertedUser {
            id: 1,
            time_created: now,
            agreed_to_cookie_policy: false,
        };
        assert!(created.was_created_at(now));

        let updated = UpsertedUser {
            time_created: now - Duration::days(3),
            ..created
        };
        assert!(!updated.was_created_at(now));
    }
}
