use crate::permissions::Role;
use aira_core::UtcDateTime;
use aira_database::DbConnection;
use aira_entities::api_keys::{ActiveModel as ApiKeyActiveModel, Entity as ApiKeyEntity};
use aira_entities::users;
use chrono::Utc;
use rand::Rng;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiKeyServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

/// Full key material, returned exactly once at creation time. Only the
/// SHA-256 hash and the 8-character prefix are persisted.
#[derive(Debug, Clone)]
pub struct CreatedApiKey {
    pub id: i32,
    pub name: String,
    pub key_prefix: String,
    pub api_key: String,
    pub expires_at: Option<UtcDateTime>,
    pub created_at: UtcDateTime,
}

pub struct ApiKeyService {
    db: Arc<DbConnection>,
}

impl ApiKeyService {
    pub fn new(db: Arc<DbConnection>) -> Self {
        Self { db }
    }

    pub async fn create_api_key(
        &self,
        user_id: i32,
        name: &str,
        expires_at: Option<UtcDateTime>,
    ) -> Result<CreatedApiKey, ApiKeyServiceError> {
        if name.trim().is_empty() {
            return Err(ApiKeyServiceError::ValidationError(
                "API key name cannot be empty".to_string(),
            ));
        }

        // Check if name is unique for this user
        let existing_key = ApiKeyEntity::find()
            .filter(aira_entities::api_keys::Column::UserId.eq(user_id))
            .filter(aira_entities::api_keys::Column::Name.eq(name))
            .one(self.db.as_ref())
            .await?;

        if existing_key.is_some() {
            return Err(ApiKeyServiceError::Conflict(
                "API key with this name already exists".to_string(),
            ));
        }

        let api_key = self.generate_api_key();
        let key_hash = self.hash_api_key(&api_key);
        let key_prefix = api_key.chars().take(8).collect::<String>();

        let now = Utc::now();
        let new_api_key = ApiKeyActiveModel {
            name: Set(name.to_string()),
            key_hash: Set(key_hash),
            key_prefix: Set(key_prefix.clone()),
            user_id: Set(user_id),
            is_active: Set(true),
            expires_at: Set(expires_at),
            last_used_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let api_key_model = new_api_key.insert(self.db.as_ref()).await?;

        Ok(CreatedApiKey {
            id: api_key_model.id,
            name: api_key_model.name,
            key_prefix,
            api_key, // Only returned on creation
            expires_at: api_key_model.expires_at,
            created_at: api_key_model.created_at,
        })
    }

    /// Validate a bearer token and resolve the owning user.
    /// Returns (user, role, key_name, key_id).
    pub async fn validate_api_key(
        &self,
        api_key: &str,
    ) -> Result<(users::Model, Role, String, i32), ApiKeyServiceError> {
        let key_hash = self.hash_api_key(api_key);
        let key_prefix = api_key.chars().take(8).collect::<String>();

        let api_key_model = ApiKeyEntity::find()
            .filter(aira_entities::api_keys::Column::KeyHash.eq(&key_hash))
            .filter(aira_entities::api_keys::Column::KeyPrefix.eq(&key_prefix))
            .filter(aira_entities::api_keys::Column::IsActive.eq(true))
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ApiKeyServiceError::Unauthorized("Invalid API key".to_string()))?;

        // Check if expired
        if let Some(expires_at) = api_key_model.expires_at {
            if expires_at <= Utc::now() {
                return Err(ApiKeyServiceError::Unauthorized(
                    "API key has expired".to_string(),
                ));
            }
        }

        // Get user
        let user = users::Entity::find_by_id(api_key_model.user_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ApiKeyServiceError::NotFound("User not found".to_string()))?;

        let role = Role::from_str(&user.role).ok_or_else(|| {
            ApiKeyServiceError::InternalServerError("Invalid role in database".to_string())
        })?;

        // Update last_used_at
        let mut api_key_active: ApiKeyActiveModel = api_key_model.clone().into();
        api_key_active.last_used_at = Set(Some(Utc::now()));
        let _ = api_key_active.update(self.db.as_ref()).await; // Don't fail if this fails

        Ok((user, role, api_key_model.name, api_key_model.id))
    }

    fn generate_api_key(&self) -> String {
        const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
        let mut rng = rand::thread_rng();

        let prefix = "ak_";
        let random_part: String = (0..40)
            .map(|_| {
                let idx = rng.gen_range(0..CHARSET.len());
                CHARSET[idx] as char
            })
            .collect();

        format!("{}{}", prefix, random_part)
    }

    pub(crate) fn hash_api_key(&self, api_key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(api_key.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aira_database::test_utils::TestDatabase;
    use aira_entities::organizations;
    use chrono::Duration;

    async fn setup_test_env() -> (TestDatabase, ApiKeyService, users::Model) {
        let db = TestDatabase::new().await.unwrap();

        let org = organizations::ActiveModel {
            name: Set("Test Org".to_string()),
            slug: Set(format!("test-org-{}", uuid::Uuid::new_v4())),
            ..Default::default()
        };
        let org = org.insert(db.db.as_ref()).await.unwrap();

        // Generate unique email to avoid conflicts in parallel tests
        let email = format!("test_{}@example.com", uuid::Uuid::new_v4());
        let user = users::ActiveModel {
            organization_id: Set(org.id),
            name: Set("Test User".to_string()),
            email: Set(email),
            role: Set("admin".to_string()),
            ..Default::default()
        };
        let user = user.insert(db.db.as_ref()).await.unwrap();

        let api_key_service = ApiKeyService::new(db.db.clone());
        (db, api_key_service, user)
    }

    #[tokio::test]
    async fn test_create_api_key_format() {
        let (_db, api_key_service, user) = setup_test_env().await;

        let created = api_key_service
            .create_api_key(user.id, "Primary Key", None)
            .await
            .unwrap();

        assert_eq!(created.name, "Primary Key");
        assert!(created.api_key.starts_with("ak_"));
        assert_eq!(created.api_key.len(), 43); // ak_ + 40 chars
        assert_eq!(created.key_prefix, created.api_key[..8].to_string());
        assert!(created.expires_at.is_none());
    }

    #[tokio::test]
    async fn test_create_api_key_empty_name_fails() {
        let (_db, api_key_service, user) = setup_test_env().await;

        let result = api_key_service.create_api_key(user.id, "  ", None).await;

        assert!(result.is_err());
        matches!(result.unwrap_err(), ApiKeyServiceError::ValidationError(_));
    }

    #[tokio::test]
    async fn test_create_api_key_duplicate_name_fails() {
        let (_db, api_key_service, user) = setup_test_env().await;

        api_key_service
            .create_api_key(user.id, "Duplicate Name", None)
            .await
            .unwrap();

        let result = api_key_service
            .create_api_key(user.id, "Duplicate Name", None)
            .await;

        assert!(result.is_err());
        matches!(result.unwrap_err(), ApiKeyServiceError::Conflict(_));
    }

    #[tokio::test]
    async fn test_hash_api_key_is_stable() {
        let (_db, api_key_service, _user) = setup_test_env().await;

        let hash1 = api_key_service.hash_api_key("ak_abc123");
        let hash2 = api_key_service.hash_api_key("ak_abc123");
        let hash3 = api_key_service.hash_api_key("ak_other");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert_eq!(hash1.len(), 64); // hex-encoded SHA-256
    }

    #[tokio::test]
    async fn test_validate_api_key_success() {
        let (db, api_key_service, user) = setup_test_env().await;

        let created = api_key_service
            .create_api_key(user.id, "Valid Key", None)
            .await
            .unwrap();

        let (resolved_user, role, key_name, key_id) = api_key_service
            .validate_api_key(&created.api_key)
            .await
            .unwrap();

        assert_eq!(resolved_user.id, user.id);
        assert_eq!(role, Role::Admin);
        assert_eq!(key_name, "Valid Key");
        assert_eq!(key_id, created.id);

        // last_used_at is bumped on successful validation
        let stored = ApiKeyEntity::find_by_id(created.id)
            .one(db.db.as_ref())
            .await
            .unwrap()
            .unwrap();
        assert!(stored.last_used_at.is_some());
    }

    #[tokio::test]
    async fn test_validate_api_key_resolves_member_role() {
        let (db, api_key_service, user) = setup_test_env().await;

        let member = users::ActiveModel {
            organization_id: Set(user.organization_id),
            name: Set("Member User".to_string()),
            email: Set(format!("member_{}@example.com", uuid::Uuid::new_v4())),
            role: Set("member".to_string()),
            ..Default::default()
        };
        let member = member.insert(db.db.as_ref()).await.unwrap();

        let created = api_key_service
            .create_api_key(member.id, "Member Key", None)
            .await
            .unwrap();

        let (_, role, _, _) = api_key_service
            .validate_api_key(&created.api_key)
            .await
            .unwrap();

        assert_eq!(role, Role::Member);
    }

    #[tokio::test]
    async fn test_validate_unknown_api_key_fails() {
        let (_db, api_key_service, _user) = setup_test_env().await;

        let result = api_key_service
            .validate_api_key("ak_doesnotexist0000000000000000000000000000")
            .await;

        assert!(result.is_err());
        matches!(result.unwrap_err(), ApiKeyServiceError::Unauthorized(_));
    }

    #[tokio::test]
    async fn test_validate_inactive_api_key_fails() {
        let (db, api_key_service, user) = setup_test_env().await;

        let created = api_key_service
            .create_api_key(user.id, "Inactive Key", None)
            .await
            .unwrap();

        let stored = ApiKeyEntity::find_by_id(created.id)
            .one(db.db.as_ref())
            .await
            .unwrap()
            .unwrap();
        let mut active: ApiKeyActiveModel = stored.into();
        active.is_active = Set(false);
        active.update(db.db.as_ref()).await.unwrap();

        let result = api_key_service.validate_api_key(&created.api_key).await;

        assert!(result.is_err());
        matches!(result.unwrap_err(), ApiKeyServiceError::Unauthorized(_));
    }

    #[tokio::test]
    async fn test_validate_expired_api_key_fails() {
        let (_db, api_key_service, user) = setup_test_env().await;

        let created = api_key_service
            .create_api_key(user.id, "Expired Key", Some(Utc::now() - Duration::hours(1)))
            .await
            .unwrap();

        let result = api_key_service.validate_api_key(&created.api_key).await;

        assert!(result.is_err());
        matches!(result.unwrap_err(), ApiKeyServiceError::Unauthorized(_));
    }
}
