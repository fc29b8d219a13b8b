use async_trait::async_trait;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue::Set, ConnectionTrait, DbErr};
use serde::{Deserialize, Serialize};
use aira_core::DBDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "webhook_endpoints")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub organization_id: i32,
    /// User that created the endpoint
    pub user_id: i32,
    pub name: String,
    pub url: String,
    /// Shared HMAC secret (`whsec_` prefixed)
    pub secret: String,
    /// JSON array of subscribed event-type strings
    #[sea_orm(column_type = "Text")]
    pub events: String,
    pub active: bool,
    /// JSON object of custom headers sent with every delivery
    #[sea_orm(column_type = "Text", nullable)]
    pub headers: Option<String>,
    pub timeout_ms: i32,
    pub retry_count: i32,
    pub retry_delay_ms: i32,
    pub created_at: DBDateTime,
    pub updated_at: DBDateTime,
}

impl Model {
    /// Parse the stored events column into a list of event-type strings
    pub fn event_types(&self) -> Vec<String> {
        serde_json::from_str(&self.events).unwrap_or_default()
    }

    /// Check whether this endpoint is subscribed to the given event type
    pub fn subscribes_to(&self, event_type: &str) -> bool {
        self.event_types().iter().any(|e| e == event_type)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::organizations::Entity",
        from = "Column::OrganizationId",
        to = "super::organizations::Column::Id"
    )]
    Organization,
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id"
    )]
    User,
    #[sea_orm(has_many = "super::webhook_delivery_attempts::Entity")]
    DeliveryAttempts,
}

impl Related<super::organizations::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Organization.def()
    }
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::webhook_delivery_attempts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DeliveryAttempts.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(mut self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let now = chrono::Utc::now();

        if insert {
            if self.created_at.is_not_set() {
                self.created_at = Set(now);
            }
            if self.updated_at.is_not_set() {
                self.updated_at = Set(now);
            }
            if self.active.is_not_set() {
                self.active = Set(true);
            }
        } else {
            self.updated_at = Set(now);
        }

        Ok(self)
    }
}
