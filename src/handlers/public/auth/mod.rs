// handlers/public/auth/mod.rs - Public authentication handlers
//
// Account creation and token acquisition. No credential is required to reach
// these routes.

pub mod login;    // POST /auth/login - exchange email + password for a JWT
pub mod register; // POST /auth/register - create a user account

pub use login::login_post;
pub use register::register_post;
