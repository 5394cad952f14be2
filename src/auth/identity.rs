use serde::Serialize;
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::database::models::KeyEnvironment;

/// Who is calling. Built once per request by the resolver and handed to
/// handlers through request extensions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "auth_type", rename_all = "snake_case")]
pub enum Identity {
    Jwt {
        user_id: Uuid,
        email: Option<String>,
    },
    ApiKey {
        user_id: Uuid,
        api_key_id: Uuid,
        api_key_name: String,
        scopes: BTreeSet<String>,
        environment: KeyEnvironment,
    },
}

impl Identity {
    pub fn user_id(&self) -> Uuid {
        match self {
            Identity::Jwt { user_id, .. } | Identity::ApiKey { user_id, .. } => *user_id,
        }
    }

    pub fn auth_type(&self) -> &'static str {
        match self {
            Identity::Jwt { .. } => "jwt",
            Identity::ApiKey { .. } => "api_key",
        }
    }

    pub fn is_session(&self) -> bool {
        matches!(self, Identity::Jwt { .. })
    }
}

/// SHA-256 of the bearer token that authenticated a session request
#[derive(Debug, Clone)]
pub struct SessionToken {
    pub hash: String,
}
