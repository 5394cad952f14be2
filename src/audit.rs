// Security audit trail
//
// Events are structured and emitted through an `AuditSink`. The default sink
// writes one JSON line per event to the `security_audit` tracing target.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventType {
    LoginAttempt,
    Logout,
    ApiKeyCreated,
    ApiKeyRevoked,
    ApiKeyRegenerated,
    /// Presented API key did not resolve to a usable key
    AuthenticationFailure,
    RateLimitViolation,
    /// Authenticated caller lacked the role a route requires
    RoleCheckFailure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: String,
    pub event_type: AuditEventType,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempted_role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType, success: bool) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            event_type,
            success,
            user_id: None,
            client_ip: None,
            user_agent: None,
            endpoint: None,
            attempted_role: None,
            details: None,
        }
    }

    pub fn user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn client(mut self, client: &ClientInfo) -> Self {
        self.client_ip = Some(client.ip.clone());
        self.user_agent = client.user_agent.clone();
        self.endpoint = Some(client.endpoint.clone());
        self
    }

    pub fn attempted_role(mut self, role: &str) -> Self {
        self.attempted_role = Some(role.to_string());
        self
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Caller facts recorded alongside security events
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip: String,
    pub user_agent: Option<String>,
    /// `METHOD /path`
    pub endpoint: String,
}

pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Writes events to the log stream
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        if event.success {
            tracing::info!(target: "security_audit", "{}", event.to_json());
        } else {
            tracing::warn!(target: "security_audit", "{}", event.to_json());
        }
    }
}

/// Keeps events in memory; used by tests to assert on the audit trail
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        let mut events = self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        events.push(event);
    }
}
