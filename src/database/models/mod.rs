pub mod api_key;
pub mod group;
pub mod user;

pub use api_key::{ApiKeyRecord, ApiKeyView, KeyEnvironment};
pub use group::GroupRecord;
pub use user::{Role, UserRecord, UserView};
