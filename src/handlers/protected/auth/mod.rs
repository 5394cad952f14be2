// handlers/protected/auth/mod.rs - Session endpoints for authenticated callers

pub mod session; // GET /api/auth/whoami, POST /api/auth/logout

pub use session::{logout_post, whoami_get};
