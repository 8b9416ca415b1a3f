//! Route handlers for the auth service.

pub mod auth;
pub mod health;
pub mod profile;
pub mod root;
