// handlers/mod.rs - 3-tier handler layout
//
// Public (no credential) → Protected (Identity required) → Elevated (Identity + role)
//
// Which tier a route belongs to is declared in the route table (`crate::routes`);
// the gate enforces it before the handler runs.

pub mod elevated;
pub mod protected;
pub mod public;
