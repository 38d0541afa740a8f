pub mod event;
pub mod postgres_repository;
pub mod session;
pub mod store;
pub mod user;
