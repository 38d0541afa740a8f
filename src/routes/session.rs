use crate::auth::{ExternalIdentity, OptionalSessionToken, SessionToken, XsrfToken};
use crate::config::{SessionConfig, UsersConfig};
use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::middleware::RequestTime;
use crate::models::event::SessionEventsResponse;
use crate::models::session::SessionResponse;
use crate::service::identity::IdentityService;
use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::serde::json::Json;
use rocket::{State, delete, get, post};
use rocket_okapi::openapi;
use sqlx::PgPool;
use uuid::Uuid;

pub(crate) fn build_session_cookie(config: &SessionConfig, token: &Uuid) -> Cookie<'static> {
    Cookie::build((config.cookie_name.clone(), token.to_string()))
        .path("/")
        .http_only(true)
        .secure(config.secure_cookie)
        .same_site(SameSite::Lax)
        .build()
}

fn created_or_ok(created: bool) -> Status {
    if created { Status::Created } else { Status::Ok }
}

/// Resume the caller's session, or start a new anonymous one.
/// Returns 201 when a session was created and 200 when an active one was found.
#[openapi(tag = "Session")]
#[post("/")]
pub async fn post_session(
    pool: &State<PgPool>,
    session_config: &State<SessionConfig>,
    users_config: &State<UsersConfig>,
    cookies: &CookieJar<'_>,
    token: OptionalSessionToken,
    now: RequestTime,
) -> Result<(Status, Json<SessionResponse>), AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let service = IdentityService::new(&repo, users_config.max_batch_size);
    let (view, created) = service.get_or_create_session(token.0, now.0).await?;

    cookies.add_private(build_session_cookie(session_config, &view.session.id));

    Ok((created_or_ok(created), Json(SessionResponse::from(&view))))
}

/// Get the caller's active session.
#[openapi(tag = "Session")]
#[get("/")]
pub async fn get_session(pool: &State<PgPool>, users_config: &State<UsersConfig>, token: SessionToken) -> Result<Json<SessionResponse>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let view = IdentityService::new(&repo, users_config.max_batch_size).get_session(&token.0).await?;
    Ok(Json(SessionResponse::from(&view)))
}

/// Expire the caller's session (logout).
#[openapi(tag = "Session")]
#[delete("/")]
pub async fn delete_session(
    pool: &State<PgPool>,
    session_config: &State<SessionConfig>,
    users_config: &State<UsersConfig>,
    cookies: &CookieJar<'_>,
    token: SessionToken,
    xsrf: XsrfToken,
    now: RequestTime,
) -> Result<Status, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    IdentityService::new(&repo, users_config.max_batch_size)
        .expire_session(&token.0, &xsrf.0, now.0)
        .await?;

    cookies.remove_private(Cookie::build(session_config.cookie_name.clone()).path("/").build());
    Ok(Status::NoContent)
}

/// Record cookie-policy consent on the session, propagating it to a linked user.
#[openapi(tag = "Session")]
#[post("/agree-to-cookie-policy")]
pub async fn agree_to_cookie_policy(
    pool: &State<PgPool>,
    users_config: &State<UsersConfig>,
    token: SessionToken,
    xsrf: XsrfToken,
    now: RequestTime,
) -> Result<Json<SessionResponse>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let view = IdentityService::new(&repo, users_config.max_batch_size)
        .set_cookie_consent_for_session(&token.0, &xsrf.0, now.0)
        .await?;
    Ok(Json(SessionResponse::from(&view)))
}

/// Log in: provision the user behind the access token and link it to the session.
/// Returns 201 when the user was created and 200 when an existing user was refreshed.
#[openapi(tag = "Session")]
#[post("/user")]
pub async fn post_session_user(
    pool: &State<PgPool>,
    users_config: &State<UsersConfig>,
    token: SessionToken,
    xsrf: XsrfToken,
    identity: ExternalIdentity,
    now: RequestTime,
) -> Result<(Status, Json<SessionResponse>), AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let (view, created) = IdentityService::new(&repo, users_config.max_batch_size)
        .get_or_create_user_on_session(&token.0, &identity.0, &xsrf.0, now.0)
        .await?;
    Ok((created_or_ok(created), Json(SessionResponse::from(&view))))
}

/// Get the session together with the user it is linked to.
/// Returns 404 unless the session is linked to the user behind the access token.
#[openapi(tag = "Session")]
#[get("/user")]
pub async fn get_session_user(
    pool: &State<PgPool>,
    users_config: &State<UsersConfig>,
    token: SessionToken,
    identity: ExternalIdentity,
) -> Result<Json<SessionResponse>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let view = IdentityService::new(&repo, users_config.max_batch_size)
        .get_user_on_session(&token.0, &identity.0)
        .await?;
    Ok(Json(SessionResponse::from(&view)))
}

/// Audit trail of the caller's session, oldest first.
#[openapi(tag = "Session")]
#[get("/events")]
pub async fn get_session_events(pool: &State<PgPool>, users_config: &State<UsersConfig>, token: SessionToken) -> Result<Json<SessionEventsResponse>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let events = IdentityService::new(&repo, users_config.max_batch_size)
        .get_session_events(&token.0)
        .await?;
    Ok(Json(SessionEventsResponse { events }))
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![
        post_session,
        get_session,
        delete_session,
        agree_to_cookie_policy,
        post_session_user,
        get_session_user,
        get_session_events
    ]
}
