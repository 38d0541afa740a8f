use rocket::serde::Serialize;
use rocket::serde::json::Json;
use rocket::{Request, catch};

#[derive(Serialize)]
#[serde(crate = "rocket::serde")]
pub struct Error {
    pub message: String,
}

fn error(message: &str) -> Json<Error> {
    Json(Error { message: message.to_string() })
}

#[catch(400)]
pub fn bad_request(_: &Request) -> Json<Error> {
    error("Bad request")
}

#[catch(401)]
pub fn unauthorized(_: &Request) -> Json<Error> {
    error("Unauthorized")
}

#[catch(404)]
pub fn not_found(_: &Request) -> Json<Error> {
    error("Not found")
}

#[catch(500)]
pub fn internal_error(_: &Request) -> Json<Error> {
    error("Internal server error")
}

#[catch(502)]
pub fn bad_gateway(_: &Request) -> Json<Error> {
    error("Identity provider unavailable")
}
