//! Web API module for the skybook application.

pub mod auth;
pub mod error;
pub mod middleware;
pub mod routes;

pub use routes::*;
