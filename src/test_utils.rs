use crate::database::store::{EventLog, IdentityTransaction, SessionStore, TransactionProvider, UserStore};
use crate::error::app_error::AppError;
use crate::models::event::{SessionEvent, SessionEventType, UserEvent, UserEventType};
use crate::models::identity::ExternalIdentityProfile;
use crate::models::session::{NewSession, Session, SessionState};
use crate::models::user::{Role, UpsertedUser, User, UserState, UserUpsert};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub fn sample_profile(external_id: &str) -> ExternalIdentityProfile {
    ExternalIdentityProfile {
        external_id: external_id.to_string(),
        display_name: format!("Name of {external_id}"),
        picture_uri: format!("https://example.com/{external_id}.png"),
        locale: "en".to_string(),
    }
}

pub fn sample_user(id: i32) -> User {
    let created = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    User {
        id,
        state: UserState::Active,
        role: Role::Regular,
        agreed_to_cookie_policy: false,
        external_identity_id: format!("external|{id}"),
        external_identity_hash: crate::models::identity::hash_external_identity(&format!("external|{id}")),
        external_profile: serde_json::json!({
            "name": format!("User {id}"),
            "picture": format!("https://example.com/{id}.png"),
            "locale": "en",
        }),
        time_created: created,
        time_last_updated: created,
        time_removed: None,
    }
}

#[derive(Debug, Default, Clone)]
struct MemoryState {
    sessions: HashMap<Uuid, Session>,
    users: BTreeMap<i32, User>,
    session_events: Vec<SessionEvent>,
    user_events: Vec<UserEvent>,
    last_user_id: i32,
    last_event_id: i32,
}

impl MemoryState {
    fn next_event_id(&mut self) -> i32 {
        self.last_event_id += 1;
        self.last_event_id
    }

    fn live_session_mut(&mut self, id: &Uuid) -> Option<&mut Session> {
        self.sessions.get_mut(id).filter(|s| s.state.is_live())
    }
}

/// In-memory store with snapshot transactions: a transaction works on a copy of the
/// state and publishes it on commit, so a dropped transaction leaves nothing behind.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    begun: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn put_user(&self, user: User) {
        let mut state = self.state.lock().unwrap();
        state.last_user_id = state.last_user_id.max(user.id);
        state.users.insert(user.id, user);
    }

    /// Raw row lookup, including removed users.
    pub fn user(&self, id: i32) -> Option<User> {
        self.state.lock().unwrap().users.get(&id).cloned()
    }

    /// Raw row lookup, including expired sessions.
    pub fn session(&self, id: &Uuid) -> Option<Session> {
        self.state.lock().unwrap().sessions.get(id).cloned()
    }

    pub fn user_count(&self) -> usize {
        self.state.lock().unwrap().users.len()
    }

    pub fn session_events(&self, id: &Uuid) -> Vec<SessionEvent> {
        self.state.lock().unwrap().session_events.iter().filter(|e| e.session_id == *id).cloned().collect()
    }

    pub fn user_events(&self, user_id: i32) -> Vec<UserEvent> {
        self.state.lock().unwrap().user_events.iter().filter(|e| e.user_id == user_id).cloned().collect()
    }

    pub fn begun_transactions(&self) -> usize {
        self.begun.load(Ordering::SeqCst)
    }
}

pub struct MemoryTransaction {
    shared: Arc<Mutex<MemoryState>>,
    working: MemoryState,
}

#[async_trait::async_trait]
impl TransactionProvider for MemoryStore {
    type Transaction = MemoryTransaction;

    async fn begin(&self) -> Result<MemoryTransaction, AppError> {
        self.begun.fetch_add(1, Ordering::SeqCst);
        let working = self.state.lock().unwrap().clone();
        Ok(MemoryTransaction {
            shared: self.state.clone(),
            working,
        })
    }
}

#[async_trait::async_trait]
impl IdentityTransaction for MemoryTransaction {
    async fn commit(self) -> Result<(), AppError> {
        *self.shared.lock().unwrap() = self.working;
        Ok(())
    }
}

#[async_trait::async_trait]
impl SessionStore for MemoryTransaction {
    async fn insert_session(&mut self, session: &NewSession) -> Result<Session, AppError> {
        let row = Session {
            id: session.id,
            state: session.state,
            xsrf_token: session.xsrf_token.clone(),
            agreed_to_cookie_policy: session.agreed_to_cookie_policy,
            user_id: None,
            time_created: session.time_created,
            time_last_updated: session.time_created,
            time_removed: None,
        };
        self.working.sessions.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_active_session(&mut self, id: &Uuid) -> Result<Option<Session>, AppError> {
        Ok(self.working.live_session_mut(id).map(|s| s.clone()))
    }

    async fn find_active_session_for_update(&mut self, id: &Uuid) -> Result<Option<Session>, AppError> {
        self.find_active_session(id).await
    }

    async fn link_session_to_user(&mut self, id: &Uuid, user_id: i32, agreed_to_cookie_policy: bool, now: DateTime<Utc>) -> Result<u64, AppError> {
        match self.working.live_session_mut(id) {
            Some(session) if session.user_id.is_none() && session.state == SessionState::Active => {
                session.state = SessionState::ActiveAndLinkedWithUser;
                session.user_id = Some(user_id);
                session.agreed_to_cookie_policy |= agreed_to_cookie_policy;
                session.time_last_updated = now;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn expire_session(&mut self, id: &Uuid, now: DateTime<Utc>) -> Result<u64, AppError> {
        match self.working.live_session_mut(id) {
            Some(session) => {
                session.state = SessionState::Expired;
                session.time_last_updated = now;
                session.time_removed = Some(now);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn agree_session_to_cookie_policy(&mut self, id: &Uuid, now: DateTime<Utc>) -> Result<Option<Session>, AppError> {
        Ok(self.working.live_session_mut(id).map(|session| {
            session.agreed_to_cookie_policy = true;
            session.time_last_updated = now;
            session.clone()
        }))
    }
}

#[async_trait::async_trait]
impl UserStore for MemoryTransaction {
    async fn upsert_user(&mut self, upsert: &UserUpsert) -> Result<UpsertedUser, AppError> {
        let existing = self.working.users.values_mut().find(|u| u.external_identity_hash == upsert.identity_hash);

        let user = match existing {
            Some(user) => {
                user.state = UserState::Active;
                user.agreed_to_cookie_policy |= upsert.agreed_to_cookie_policy;
                user.external_identity_id = upsert.external_identity_id.clone();
                user.external_profile = upsert.external_profile.clone();
                user.time_last_updated = upsert.request_time;
                user.time_removed = None;
                user.clone()
            }
            None => {
                self.working.last_user_id += 1;
                let user = User {
                    id: self.working.last_user_id,
                    state: UserState::Active,
                    role: upsert.role,
                    agreed_to_cookie_policy: upsert.agreed_to_cookie_policy,
                    external_identity_id: upsert.external_identity_id.clone(),
                    external_identity_hash: upsert.identity_hash.clone(),
                    external_profile: upsert.external_profile.clone(),
                    time_created: upsert.request_time,
                    time_last_updated: upsert.request_time,
                    time_removed: None,
                };
                self.working.users.insert(user.id, user.clone());
                user
            }
        };

        Ok(UpsertedUser {
            id: user.id,
            time_created: user.time_created,
            agreed_to_cookie_policy: user.agreed_to_cookie_policy,
        })
    }

    async fn find_user_by_identity_hash(&mut self, identity_hash: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .working
            .users
            .values()
            .find(|u| u.external_identity_hash == identity_hash && u.state == UserState::Active)
            .cloned())
    }

    async fn find_user_by_id(&mut self, id: i32) -> Result<Option<User>, AppError> {
        Ok(self.working.users.get(&id).filter(|u| u.state == UserState::Active).cloned())
    }

    async fn find_users_by_ids(&mut self, ids: &[i32]) -> Result<Vec<User>, AppError> {
        Ok(self
            .working
            .users
            .values()
            .filter(|u| ids.contains(&u.id) && u.state == UserState::Active)
            .cloned()
            .collect())
    }

    async fn agree_user_to_cookie_policy(&mut self, id: i32, now: DateTime<Utc>) -> Result<u64, AppError> {
        match self.working.users.get_mut(&id) {
            Some(user) if user.state == UserState::Active => {
                user.agreed_to_cookie_policy = true;
                user.time_last_updated = now;
                Ok(1)
            }
            _ => Ok(0),
        }
    }
}

#[async_trait::async_trait]
impl EventLog for MemoryTransaction {
    async fn append_session_event(
        &mut self,
        session_id: &Uuid,
        event_type: SessionEventType,
        timestamp: DateTime<Utc>,
        data: Option<JsonValue>,
    ) -> Result<(), AppError> {
        let id = self.working.next_event_id();
        self.working.session_events.push(SessionEvent {
            id,
            session_id: *session_id,
            event_type,
            timestamp,
            data,
        });
        Ok(())
    }

    async fn list_session_events(&mut self, session_id: &Uuid) -> Result<Vec<SessionEvent>, AppError> {
        let mut events: Vec<SessionEvent> = self.working.session_events.iter().filter(|e| e.session_id == *session_id).cloned().collect();
        events.sort_by_key(|e| (e.timestamp, e.id));
        Ok(events)
    }

    async fn append_user_event(&mut self, user_id: i32, event_type: UserEventType, timestamp: DateTime<Utc>, data: Option<JsonValue>) -> Result<(), AppError> {
        let id = self.working.next_event_id();
        self.working.user_events.push(UserEvent {
            id,
            user_id,
            event_type,
            timestamp,
            data,
        });
        Ok(())
    }

    async fn list_user_events(&mut self, user_id: i32) -> Result<Vec<UserEvent>, AppError> {
        let mut events: Vec<UserEvent> = self.working.user_events.iter().filter(|e| e.user_id == user_id).cloned().collect();
        events.sort_by_key(|e| (e.timestamp, e.id));
        Ok(events)
    }

    async fn count_user_events(&mut self, user_id: i32, event_type: UserEventType) -> Result<i64, AppError> {
        Ok(self.working.user_events.iter().filter(|e| e.user_id == user_id && e.event_type == event_type).count() as i64)
    }
}
