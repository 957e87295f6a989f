//! HTTP gateway for studybell.

pub mod auth;
pub mod routes;
pub mod server;

pub use server::{AppState, build_router, start};
