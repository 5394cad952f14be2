// handlers/protected/mod.rs - Protected handlers (JWT or API key required)
//
// Security Level: resolved Identity required
// Route Prefix: /api/*
// Middleware: route gate (credential resolution, optional scope, rate limit)
//
// Handlers read the caller from `Extension<Identity>`; the gate guarantees it
// is present before any of them runs.

pub mod auth;   // whoami, logout
pub mod groups; // scoped group listing and creation
pub mod keys;   // API key lifecycle, session callers only

pub use auth::*;
