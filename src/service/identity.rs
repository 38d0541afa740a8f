use crate::database::session::{generate_xsrf_token, xsrf_tokens_match};
use crate::database::store::{EventLog, IdentityTransaction, SessionStore, TransactionProvider, UserStore};
use crate::error::app_error::AppError;
use crate::models::event::{SessionEvent, SessionEventType, UserEvent, UserEventType};
use crate::models::identity::ExternalIdentityProfile;
use crate::models::session::{NewSession, Session, SessionState, SessionWithUser};
use crate::models::user::{Role, User, UserUpsert};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{info, warn};
use uuid::Uuid;

/// Orchestrates sessions, users and their event logs. Every public operation runs in
/// exactly one transaction and either commits fully or leaves no trace.
pub struct IdentityService<'a, P: TransactionProvider> {
    provider: &'a P,
    max_users_batch: usize,
}

impl<'a, P: TransactionProvider> IdentityService<'a, P> {
    pub fn new(provider: &'a P, max_users_batch: usize) -> Self {
        IdentityService { provider, max_users_batch }
    }

    /// Returns the live session for `token` untouched, or starts a fresh anonymous one.
    pub async fn get_or_create_session(&self, token: Option<Uuid>, now: DateTime<Utc>) -> Result<(SessionWithUser, bool), AppError> {
        let mut tx = self.provider.begin().await?;

        if let Some(token) = token
            && let Some(session) = tx.find_active_session(&token).await?
        {
            let view = with_linked_user(&mut tx, session).await?;
            tx.commit().await?;
            return Ok((view, false));
        }

        let session = tx.insert_session(&NewSession::anonymous(generate_xsrf_token(), now)).await?;
        tx.append_session_event(&session.id, SessionEventType::Created, now, None).await?;
        tx.commit().await?;

        info!(session_id = %session.id, "session created");

        Ok((SessionWithUser { session, user: None }, true))
    }

    pub async fn get_session(&self, token: &Uuid) -> Result<SessionWithUser, AppError> {
        let mut tx = self.provider.begin().await?;
        let session = tx.find_active_session(token).await?.ok_or(AppError::SessionNotFound)?;
        let view = with_linked_user(&mut tx, session).await?;
        tx.commit().await?;

        Ok(view)
    }

    pub async fn expire_session(&self, token: &Uuid, xsrf_token: &str, now: DateTime<Utc>) -> Result<(), AppError> {
        let mut tx = self.provider.begin().await?;
        let session = tx.find_active_session_for_update(token).await?.ok_or(AppError::SessionNotFound)?;
        check_xsrf_token(&session, xsrf_token)?;

        if tx.expire_session(token, now).await? == 0 {
            return Err(AppError::SessionNotFound);
        }
        tx.append_session_event(token, SessionEventType::Expired, now, None).await?;
        tx.commit().await?;

        info!(session_id = %token, "session expired");

        Ok(())
    }

    pub async fn set_cookie_consent_for_session(&self, token: &Uuid, xsrf_token: &str, now: DateTime<Utc>) -> Result<SessionWithUser, AppError> {
        let mut tx = self.provider.begin().await?;
        let session = tx.find_active_session_for_update(token).await?.ok_or(AppError::SessionNotFound)?;
        check_xsrf_token(&session, xsrf_token)?;

        let session = if session.agreed_to_cookie_policy {
            session
        } else {
            let updated = tx.agree_session_to_cookie_policy(token, now).await?.ok_or(AppError::SessionNotFound)?;
            tx.append_session_event(token, SessionEventType::AgreedToCookiePolicy, now, None).await?;
            updated
        };

        if let Some(user_id) = session.user_id
            && tx.agree_user_to_cookie_policy(user_id, now).await? > 0
        {
            record_first_user_consent(&mut tx, user_id, now).await?;
        }

        let view = with_linked_user(&mut tx, session).await?;
        tx.commit().await?;

        info!(session_id = %token, user_id = ?view.session.user_id, "cookie policy agreed");

        Ok(view)
    }

    /// Provisions (or refreshes) the user behind `profile` and links it to the session.
    /// A session already bound to a different user is reported as not found.
    pub async fn get_or_create_user_on_session(
        &self,
        token: &Uuid,
        profile: &ExternalIdentityProfile,
        xsrf_token: &str,
        now: DateTime<Utc>,
    ) -> Result<(SessionWithUser, bool), AppError> {
        let mut tx = self.provider.begin().await?;
        let session = tx.find_active_session_for_update(token).await?.ok_or(AppError::SessionNotFound)?;
        check_xsrf_token(&session, xsrf_token)?;

        let upserted = tx
            .upsert_user(&UserUpsert {
                identity_hash: profile.identity_hash(),
                role: Role::Regular,
                agreed_to_cookie_policy: session.agreed_to_cookie_policy,
                external_identity_id: profile.external_id.clone(),
                external_profile: profile.snapshot(),
                request_time: now,
            })
            .await?;

        if let Some(linked_user_id) = session.user_id
            && linked_user_id != upserted.id
        {
            warn!(session_id = %token, linked_user_id, user_id = upserted.id, "session is linked to another user");
            return Err(AppError::SessionNotFound);
        }

        let user_created = upserted.was_created_at(now);
        let user_event = if user_created {
            UserEventType::Created
        } else {
            UserEventType::Recreated
        };
        tx.append_user_event(upserted.id, user_event, now, None).await?;

        if upserted.agreed_to_cookie_policy {
            if user_created {
                tx.append_user_event(upserted.id, UserEventType::AgreedToCookiePolicy, now, None).await?;
            } else {
                record_first_user_consent(&mut tx, upserted.id, now).await?;
            }
        }

        if session.user_id.is_none() {
            if tx.link_session_to_user(token, upserted.id, upserted.agreed_to_cookie_policy, now).await? == 0 {
                return Err(AppError::SessionNotFound);
            }
            tx.append_session_event(token, SessionEventType::LinkedWithUser, now, Some(serde_json::json!({ "userId": upserted.id })))
                .await?;
            if upserted.agreed_to_cookie_policy != session.agreed_to_cookie_policy {
                tx.append_session_event(token, SessionEventType::AgreedToCookiePolicy, now, None).await?;
            }
        }

        let session = tx.find_active_session(token).await?.ok_or(AppError::SessionNotFound)?;
        let view = with_linked_user(&mut tx, session).await?;
        tx.commit().await?;

        info!(session_id = %token, user_id = upserted.id, user_created, "user resolved on session");

        Ok((view, user_created))
    }

    /// Read-only: the session must already be linked to the user behind `profile`.
    pub async fn get_user_on_session(&self, token: &Uuid, profile: &ExternalIdentityProfile) -> Result<SessionWithUser, AppError> {
        let mut tx = self.provider.begin().await?;
        let user = tx
            .find_user_by_identity_hash(&profile.identity_hash())
            .await?
            .ok_or_else(AppError::user_not_found)?;
        let session = tx.find_active_session(token).await?.ok_or(AppError::SessionNotFound)?;

        if session.state != SessionState::ActiveAndLinkedWithUser || session.user_id != Some(user.id) {
            return Err(AppError::SessionNotFound);
        }
        tx.commit().await?;

        Ok(SessionWithUser { session, user: Some(user) })
    }

    pub async fn get_users_info(&self, ids: &[i32]) -> Result<Vec<User>, AppError> {
        if ids.len() > self.max_users_batch {
            return Err(AppError::BadRequest(format!("Can't retrieve more than {} users", self.max_users_batch)));
        }
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.provider.begin().await?;
        let users = tx.find_users_by_ids(ids).await?;
        tx.commit().await?;

        let missing = missing_user_ids(ids, &users);
        if !missing.is_empty() {
            return Err(AppError::UserNotFound { missing });
        }

        Ok(users)
    }

    pub async fn get_user_events(&self, profile: &ExternalIdentityProfile) -> Result<Vec<UserEvent>, AppError> {
        let mut tx = self.provider.begin().await?;
        let user = tx
            .find_user_by_identity_hash(&profile.identity_hash())
            .await?
            .ok_or_else(AppError::user_not_found)?;
        let events = tx.list_user_events(user.id).await?;
        tx.commit().await?;

        // Every user has at least its Created event.
        if events.is_empty() {
            return Err(AppError::user_not_found());
        }

        Ok(events)
    }

    pub async fn get_session_events(&self, token: &Uuid) -> Result<Vec<SessionEvent>, AppError> {
        let mut tx = self.provider.begin().await?;
        let session = tx.find_active_session(token).await?.ok_or(AppError::SessionNotFound)?;
        let events = tx.list_session_events(&session.id).await?;
        tx.commit().await?;

        if events.is_empty() {
            return Err(AppError::SessionNotFound);
        }

        Ok(events)
    }
}

fn check_xsrf_token(session: &Session, presented: &str) -> Result<(), AppError> {
    if xsrf_tokens_match(&session.xsrf_token, presented) {
        Ok(())
    } else {
        warn!(session_id = %session.id, "xsrf token mismatch");
        Err(AppError::XsrfTokenMismatch)
    }
}

async fn with_linked_user<T: IdentityTransaction>(tx: &mut T, session: Session) -> Result<SessionWithUser, AppError> {
    let user = match session.user_id {
        Some(user_id) => tx.find_user_by_id(user_id).await?,
        None => None,
    };

    Ok(SessionWithUser { session, user })
}

/// The user-side consent event is a first-occurrence record.
async fn record_first_user_consent<T: IdentityTransaction>(tx: &mut T, user_id: i32, now: DateTime<Utc>) -> Result<(), AppError> {
    if tx.count_user_events(user_id, UserEventType::AgreedToCookiePolicy).await? == 0 {
        tx.append_user_event(user_id, UserEventType::AgreedToCookiePolicy, now, None).await?;
    }

    Ok(())
}

fn missing_user_ids(requested: &[i32], found: &[User]) -> Vec<i32> {
    let found: HashSet<i32> = found.iter().map(|user| user.id).collect();
    let mut missing: Vec<i32> = requested.iter().copied().filter(|id| !found.contains(id)).collect();
    missing.sort_unstable();
    missing.dedup();
    missing
}
