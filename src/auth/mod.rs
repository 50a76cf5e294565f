use crate::state::AppState;
use axum::Router;

mod dto;
pub mod engine;
pub(crate) mod extractors;
pub mod handlers;
pub(crate) mod password;
pub mod service;

pub use extractors::AuthUser;

pub fn router() -> Router<AppState> {
    handlers::router()
}
