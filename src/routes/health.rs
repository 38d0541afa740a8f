use crate::database::postgres_repository::PostgresRepository;
use crate::models::health::HealthResponse;
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{State, get};
use rocket_okapi::openapi;
use sqlx::PgPool;
use tracing::error;

/// Liveness plus a database round trip. Returns 503 when the database is unreachable.
#[openapi(tag = "Health")]
#[get("/")]
pub async fn healthcheck(pool: &State<PgPool>) -> (Status, Json<HealthResponse>) {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    match repo.ping().await {
        Ok(()) => (
            Status::Ok,
            Json(HealthResponse {
                status: "ok",
                database: "up",
            }),
        ),
        Err(err) => {
            error!(error = ?err, "health check database ping failed");
            (
                Status::ServiceUnavailable,
                Json(HealthResponse {
                    status: "degraded",
                    database: "down",
                }),
            )
        }
    }
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![healthcheck]
}
