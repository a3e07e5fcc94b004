//! HTTP/WebSocket 接口层

pub mod auth;
pub mod error;
pub mod routes;
pub mod state;
pub mod websocket;

pub use auth::{Claims, JwtService, LoginResponse};
pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
