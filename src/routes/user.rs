use crate::auth::ExternalIdentity;
use crate::config::UsersConfig;
use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::event::UserEventsResponse;
use crate::service::identity::IdentityService;
use rocket::serde::json::Json;
use rocket::{State, get};
use rocket_okapi::openapi;
use sqlx::PgPool;

/// Audit trail of the user behind the access token, oldest first.
#[openapi(tag = "User")]
#[get("/events")]
pub async fn get_user_events(pool: &State<PgPool>, users_config: &State<UsersConfig>, identity: ExternalIdentity) -> Result<Json<UserEventsResponse>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let events = IdentityService::new(&repo, users_config.max_batch_size)
        .get_user_events(&identity.0)
        .await?;
    Ok(Json(UserEventsResponse { events }))
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![get_user_events]
}
