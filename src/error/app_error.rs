use rocket::http::Status;
use rocket::response::Responder;
use rocket::{Request, Response};
use rocket_okapi::OpenApiError;
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::Responses;
use rocket_okapi::response::OpenApiResponderInner;
use std::io::Cursor;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Internal server error")]
    Db {
        message: String,
        #[source]
        source: sqlx::error::Error,
    },
    #[error("Session not found")]
    SessionNotFound,
    #[error("User not found")]
    UserNotFound { missing: Vec<i32> },
    #[error("XSRF token mismatch")]
    XsrfTokenMismatch,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Identity provider error")]
    IdentityProvider { message: String },
}

impl AppError {
    pub fn db(message: impl Into<String>, source: sqlx::error::Error) -> Self {
        Self::Db {
            message: message.into(),
            source,
        }
    }

    pub fn user_not_found() -> Self {
        Self::UserNotFound { missing: Vec::new() }
    }

    pub fn identity_provider(message: impl Into<String>) -> Self {
        Self::IdentityProvider { message: message.into() }
    }
}

impl From<&AppError> for Status {
    fn from(e: &AppError) -> Self {
        match e {
            AppError::Db { .. } => Status::InternalServerError,
            AppError::SessionNotFound => Status::NotFound,
            AppError::UserNotFound { .. } => Status::NotFound,
            AppError::XsrfTokenMismatch => Status::BadRequest,
            AppError::Unauthorized => Status::Unauthorized,
            AppError::BadRequest(_) => Status::BadRequest,
            AppError::IdentityProvider { .. } => Status::BadGateway,
        }
    }
}

impl<'r> Responder<'r, 'static> for AppError {
    fn respond_to(self, req: &Request<'_>) -> rocket::response::Result<'static> {
        let method = req.method();
        let uri = req.uri();

        let request_id = req
            .local_cache(|| None::<crate::middleware::RequestId>)
            .as_ref()
            .map(|r| r.0.as_str())
            .unwrap_or("unknown");

        error!(
            error = ?self,
            request_id = %request_id,
            method = %method,
            uri = %uri,
            "request failed"
        );

        let status = Status::from(&self);
        let body = match &self {
            AppError::UserNotFound { missing } if !missing.is_empty() => {
                let ids: Vec<String> = missing.iter().map(i32::to_string).collect();
                format!("{}: {}", self, ids.join(","))
            }
            _ => self.to_string(),
        };

        Response::build().status(status).sized_body(body.len(), Cursor::new(body)).ok()
    }
}

impl OpenApiResponderInner for AppError {
    fn responses(_gen: &mut OpenApiGenerator) -> Result<Responses, OpenApiError> {
        use rocket_okapi::okapi::openapi3::{RefOr, Response as OpenApiResponse};
        let mut responses = Responses::default();
        for (code, description) in [
            ("400", "Bad Request"),
            ("401", "Unauthorized"),
            ("404", "Not Found"),
            ("500", "Internal Server Error"),
            ("502", "Bad Gateway"),
        ] {
            responses.responses.insert(
                code.to_string(),
                RefOr::Object(OpenApiResponse {
                    description: description.to_string(),
                    ..Default::default()
                }),
            );
        }
        Ok(responses)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::db("Database error", e)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::identity_provider(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_for_repository_kinds() {
        assert_eq!(Status::from(&AppError::SessionNotFound), Status::NotFound);
        assert_eq!(Status::from(&AppError::user_not_found()), Status::NotFound);
        assert_eq!(Status::from(&AppError::XsrfTokenMismatch), Status::BadRequest);
        assert_eq!(Status::from(&AppError::db("boom", sqlx::Error::PoolTimedOut)), Status::InternalServerError);
    }

    #[test]
    fn status_mapping_for_transport_kinds() {
        assert_eq!(Status::from(&AppError::Unauthorized), Status::Unauthorized);
        assert_eq!(Status::from(&AppError::identity_provider("down")), Status::BadGateway);
        assert_eq!(Status::from(&AppError::BadRequest("nope".to_string())), Status::BadRequest);
    }

    #[test]
    fn row_not_found_is_a_store_failure() {
        let err = AppError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, AppError::Db { .. }));
    }
}
