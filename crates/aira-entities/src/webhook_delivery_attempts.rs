use async_trait::async_trait;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue::Set, ConnectionTrait, DbErr};
use serde::{Deserialize, Serialize};
use aira_core::DBDateTime;

/// Append-only record of one physical HTTP delivery attempt.
/// `attempt_number` is 1-based and strictly increasing per (webhook, event).
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "webhook_delivery_attempts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub webhook_id: i32,
    pub event_id: String,
    pub attempt_number: i32,
    /// Target URL at the time of the attempt
    pub url: String,
    /// HTTP status for completed exchanges, null on transport failure
    pub status_code: Option<i32>,
    /// Response body for completed exchanges, truncated to 1000 characters
    #[sea_orm(column_type = "Text", nullable)]
    pub response_body: Option<String>,
    /// Transport error description, null for completed exchanges
    pub error_message: Option<String>,
    pub duration_ms: i64,
    pub created_at: DBDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::webhook_endpoints::Entity",
        from = "Column::WebhookId",
        to = "super::webhook_endpoints::Column::Id"
    )]
    Webhook,
    #[sea_orm(
        belongs_to = "super::webhook_events::Entity",
        from = "Column::EventId",
        to = "super::webhook_events::Column::Id"
    )]
    Event,
}

impl Related<super::webhook_endpoints::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Webhook.def()
    }
}

impl Related<super::webhook_events::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Event.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(mut self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        if insert {
            if self.created_at.is_not_set() {
                self.created_at = Set(chrono::Utc::now());
            }
            if self.attempt_number.is_not_set() {
                self.attempt_number = Set(1);
            }
        }

        Ok(self)
    }
}
