use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Fine-grained permissions checked by handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum Permission {
    WebhooksRead,
    WebhooksWrite,
    EventsPublish,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::WebhooksRead => "webhooks:read",
            Permission::WebhooksWrite => "webhooks:write",
            Permission::EventsPublish => "events:publish",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "webhooks:read" => Some(Permission::WebhooksRead),
            "webhooks:write" => Some(Permission::WebhooksWrite),
            "events:publish" => Some(Permission::EventsPublish),
            _ => None,
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Organization roles. The `users.role` column stores the lowercase form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Member => "member",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Role::Admin),
            "member" => Some(Role::Member),
            _ => None,
        }
    }

    pub fn permissions(&self) -> Vec<Permission> {
        match self {
            Role::Admin => vec![
                Permission::WebhooksRead,
                Permission::WebhooksWrite,
                Permission::EventsPublish,
            ],
            Role::Member => vec![Permission::WebhooksRead, Permission::EventsPublish],
        }
    }

    pub fn has_permission(&self, permission: &Permission) -> bool {
        self.permissions().contains(permission)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
