use super::permissions::{Permission, Role};
use aira_entities::users;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AuthSource {
    ApiKey { key_name: String, key_id: i32 },
}

/// Authenticated caller, inserted into request extensions by the auth
/// middleware and pulled out by the `RequireAuth` extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthContext {
    pub user: users::Model,
    pub organization_id: i32,
    pub role: Role,
    pub source: AuthSource,
}

impl AuthContext {
    pub fn new_api_key(user: users::Model, role: Role, key_name: String, key_id: i32) -> Self {
        Self {
            organization_id: user.organization_id,
            user,
            role,
            source: AuthSource::ApiKey { key_name, key_id },
        }
    }

    pub fn has_permission(&self, permission: &Permission) -> bool {
        self.role.has_permission(permission)
    }

    pub fn has_role(&self, role: &Role) -> bool {
        &self.role == role
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(&Role::Admin)
    }

    pub fn user_id(&self) -> i32 {
        self.user.id
    }

    pub fn api_key_info(&self) -> Option<(String, i32)> {
        match &self.source {
            AuthSource::ApiKey { key_name, key_id } => Some((key_name.clone(), *key_id)),
        }
    }
}
