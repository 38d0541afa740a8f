use crate::config::{DEFAULT_SESSION_COOKIE, SessionConfig};
use crate::error::app_error::AppError;
use crate::models::identity::ExternalIdentityProfile;
use crate::service::identity_provider::IdentityProviderClient;
use rocket::http::Status;
use rocket::outcome::Outcome;
use rocket::request::{FromRequest, Outcome as RequestOutcome, Request};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::{Object, Responses, SecurityRequirement, SecurityScheme, SecuritySchemeData};
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};
use std::sync::Arc;
use uuid::Uuid;

pub const SESSION_HEADER: &str = "X-Identity-Session";
pub const XSRF_HEADER: &str = "X-XSRF-Token";

pub(crate) fn parse_session_token(value: &str) -> Option<Uuid> {
    Uuid::parse_str(value.trim()).ok()
}

pub(crate) fn parse_bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token)
    } else {
        None
    }
}

pub(crate) fn session_cookie_name(req: &Request<'_>) -> String {
    req.rocket()
        .state::<SessionConfig>()
        .map(|config| config.cookie_name.clone())
        .unwrap_or_else(|| DEFAULT_SESSION_COOKIE.to_string())
}

fn session_token_from_request(req: &Request<'_>) -> Option<Uuid> {
    if let Some(cookie) = req.cookies().get_private(&session_cookie_name(req))
        && let Some(token) = parse_session_token(cookie.value())
    {
        return Some(token);
    }

    req.headers().get_one(SESSION_HEADER).and_then(parse_session_token)
}

fn session_security(required: bool) -> RequestHeaderInput {
    let security_scheme = SecurityScheme {
        description: Some(format!(
            "Session token from the `{DEFAULT_SESSION_COOKIE}` cookie or the `{SESSION_HEADER}` header. Obtain one via POST /api/session."
        )),
        data: SecuritySchemeData::ApiKey {
            name: SESSION_HEADER.to_string(),
            location: "header".to_string(),
        },
        extensions: Object::default(),
    };

    let mut security_req = SecurityRequirement::new();
    if required {
        security_req.insert("sessionAuth".to_string(), Vec::new());
    }

    RequestHeaderInput::Security("sessionAuth".to_string(), security_scheme, security_req)
}

fn single_response(code: &str, description: &str) -> rocket_okapi::Result<Responses> {
    use rocket_okapi::okapi::openapi3::{RefOr, Response};
    let mut responses = Responses::default();
    responses.responses.insert(
        code.to_string(),
        RefOr::Object(Response {
            description: description.to_string(),
            ..Default::default()
        }),
    );
    Ok(responses)
}

/// Token of a session the caller claims to hold. Missing or malformed tokens read as an unknown session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionToken(pub Uuid);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for SessionToken {
    type Error = AppError;

    async fn from_request(req: &'r Request<'_>) -> RequestOutcome<Self, Self::Error> {
        match session_token_from_request(req) {
            Some(token) => Outcome::Success(SessionToken(token)),
            None => Outcome::Error((Status::NotFound, AppError::SessionNotFound)),
        }
    }
}

impl<'a> OpenApiFromRequest<'a> for SessionToken {
    fn from_request_input(_gen: &mut OpenApiGenerator, _name: String, _required: bool) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(session_security(true))
    }

    fn get_responses(_gen: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        single_response("404", "Not Found - Session unknown or expired")
    }
}

/// Session token when one was presented; used where a fresh session may be started instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionalSessionToken(pub Option<Uuid>);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for OptionalSessionToken {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> RequestOutcome<Self, Self::Error> {
        Outcome::Success(OptionalSessionToken(session_token_from_request(req)))
    }
}

impl<'a> OpenApiFromRequest<'a> for OptionalSessionToken {
    fn from_request_input(_gen: &mut OpenApiGenerator, _name: String, _required: bool) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(session_security(false))
    }
}

/// XSRF token echoed back by the client on every mutating session call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XsrfToken(pub String);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for XsrfToken {
    type Error = AppError;

    async fn from_request(req: &'r Request<'_>) -> RequestOutcome<Self, Self::Error> {
        match req.headers().get_one(XSRF_HEADER).map(str::trim).filter(|v| !v.is_empty()) {
            Some(token) => Outcome::Success(XsrfToken(token.to_string())),
            None => Outcome::Error((Status::BadRequest, AppError::XsrfTokenMismatch)),
        }
    }
}

impl<'a> OpenApiFromRequest<'a> for XsrfToken {
    fn from_request_input(_gen: &mut OpenApiGenerator, _name: String, _required: bool) -> rocket_okapi::Result<RequestHeaderInput> {
        let security_scheme = SecurityScheme {
            description: Some("XSRF token returned in the session payload.".to_string()),
            data: SecuritySchemeData::ApiKey {
                name: XSRF_HEADER.to_string(),
                location: "header".to_string(),
            },
            extensions: Object::default(),
        };

        let mut security_req = SecurityRequirement::new();
        security_req.insert("xsrfToken".to_string(), Vec::new());

        Ok(RequestHeaderInput::Security("xsrfToken".to_string(), security_scheme, security_req))
    }

    fn get_responses(_gen: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        single_response("400", "Bad Request - XSRF token missing or mismatched")
    }
}

/// The caller's external identity, resolved from a Bearer access token through the identity provider.
#[derive(Debug, Clone)]
pub struct ExternalIdentity(pub ExternalIdentityProfile);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ExternalIdentity {
    type Error = AppError;

    async fn from_request(req: &'r Request<'_>) -> RequestOutcome<Self, Self::Error> {
        let Some(access_token) = req.headers().get_one("Authorization").and_then(parse_bearer_token) else {
            return Outcome::Error((Status::Unauthorized, AppError::Unauthorized));
        };

        let client = match req.rocket().state::<Arc<dyn IdentityProviderClient>>() {
            Some(client) => client,
            None => return Outcome::Error((Status::InternalServerError, AppError::identity_provider("identity provider not configured"))),
        };

        match client.get_profile(access_token).await {
            Ok(profile) => Outcome::Success(ExternalIdentity(profile)),
            Err(err) => Outcome::Error((Status::from(&err), err)),
        }
    }
}

impl<'a> OpenApiFromRequest<'a> for ExternalIdentity {
    fn from_request_input(_gen: &mut OpenApiGenerator, _name: String, _required: bool) -> rocket_okapi::Result<RequestHeaderInput> {
        let security_scheme = SecurityScheme {
            description: Some("Identity provider access token.".to_string()),
            data: SecuritySchemeData::Http {
                scheme: "bearer".to_string(),
                bearer_format: None,
            },
            extensions: Object::default(),
        };

        let mut security_req = SecurityRequirement::new();
        security_req.insert("bearerAuth".to_string(), Vec::new());

        Ok(RequestHeaderInput::Security("bearerAuth".to_string(), security_scheme, security_req))
    }

    fn get_responses(_gen: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        single_response("401", "Unauthorized - Access token missing or rejected")
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_bearer_token, parse_session_token};
    use uuid::Uuid;

    #[test]
    fn parse_session_token_valid() {
        let token = Uuid::new_v4();
        assert_eq!(parse_session_token(&token.to_string()), Some(token));
        assert_eq!(parse_session_token(&format!(" {token} ")), Some(token));
    }

    #[test]
    fn parse_session_token_invalid() {
        assert!(parse_session_token("not-a-uuid").is_none());
        assert!(parse_session_token("").is_none());
    }

    #[test]
    fn parse_bearer_token_valid() {
        assert_eq!(parse_bearer_token("Bearer abc.def"), Some("abc.def"));
        assert_eq!(parse_bearer_token("bearer   xyz"), Some("xyz"));
    }

    #[test]
    fn parse_bearer_token_rejects_other_schemes() {
        assert!(parse_bearer_token("Basic dXNlcjpwYXNz").is_none());
        assert!(parse_bearer_token("Bearer").is_none());
        assert!(parse_bearer_token("Bearer   ").is_none());
    }
}
