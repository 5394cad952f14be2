// handlers/elevated/mod.rs - Role-gated handlers
//
// Security Level: resolved Identity plus a role check (ADMINISTRATEUR)
// Route Prefix: /api/admin/*
// Middleware: route gate with a required role; failures are audited

pub mod admin;

pub use admin::secret_get;
