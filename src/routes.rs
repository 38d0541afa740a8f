pub mod error;
pub mod health;
pub mod session;
pub mod user;
pub mod users;
