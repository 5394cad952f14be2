pub mod memory;
pub mod models;
pub mod postgres;
pub mod store;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use store::{
    ApiKeyStore, GroupStore, RateLimitStore, StoreError, StoreHealth, StoreResult, Stores,
    UserStore, ValidTokenStore,
};
