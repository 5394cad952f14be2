//! Capability strings an API key can be granted. Matching is exact.

pub const READ_GROUPS: &str = "read:groups";
pub const WRITE_GROUPS: &str = "write:groups";
pub const READ_MEMORIES: &str = "read:memories";
pub const WRITE_MEMORIES: &str = "write:memories";
pub const READ_TAGS: &str = "read:tags";
pub const WRITE_TAGS: &str = "write:tags";
pub const READ_INVITATIONS: &str = "read:invitations";
pub const WRITE_INVITATIONS: &str = "write:invitations";

pub const KNOWN_SCOPES: &[&str] = &[
    READ_GROUPS,
    WRITE_GROUPS,
    READ_MEMORIES,
    WRITE_MEMORIES,
    READ_TAGS,
    WRITE_TAGS,
    READ_INVITATIONS,
    WRITE_INVITATIONS,
];

pub fn is_known(scope: &str) -> bool {
    KNOWN_SCOPES.contains(&scope)
}
