pub mod auth;
pub mod client;
pub mod response;

pub use auth::{route_gate, RouteGuard, RoutePolicy};
pub use response::{ApiJson, ApiResponse, ApiResult};
