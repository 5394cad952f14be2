// handlers/public/mod.rs - Public handlers (no authentication required)
//
// Security Level: None
// Route Prefix: no /api prefix (/, /health, /auth/*, /webhooks/*)
// Middleware: none; webhook deliveries authenticate through their signature

pub mod auth;
pub mod root;
pub mod webhook;

pub use auth::*;
pub use root::{health, not_found, root};
pub use webhook::payments_post;
