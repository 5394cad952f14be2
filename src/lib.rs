pub mod audit;
pub mod auth;
pub mod cli;
pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod services;
pub mod webhook;

pub use routes::build_router;
pub use server::AppState;
