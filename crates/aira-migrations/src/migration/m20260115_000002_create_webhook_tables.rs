use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ========================================
        // WEBHOOK_ENDPOINTS TABLE
        // ========================================
        manager
            .create_table(
                Table::create()
                    .table(WebhookEndpoints::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WebhookEndpoints::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(WebhookEndpoints::OrganizationId)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(WebhookEndpoints::UserId).integer().not_null())
                    .col(ColumnDef::new(WebhookEndpoints::Name).string().not_null())
                    .col(ColumnDef::new(WebhookEndpoints::Url).string().not_null())
                    .col(ColumnDef::new(WebhookEndpoints::Secret).string().not_null())
                    .col(ColumnDef::new(WebhookEndpoints::Events).text().not_null())
                    .col(
                        ColumnDef::new(WebhookEndpoints::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(WebhookEndpoints::Headers).text().null())
                    .col(
                        ColumnDef::new(WebhookEndpoints::TimeoutMs)
                            .integer()
                            .not_null()
                            .default(30000),
                    )
                    .col(
                        ColumnDef::new(WebhookEndpoints::RetryCount)
                            .integer()
                            .not_null()
                            .default(3),
                    )
                    .col(
                        ColumnDef::new(WebhookEndpoints::RetryDelayMs)
                            .integer()
                            .not_null()
                            .default(1000),
                    )
                    .col(
                        ColumnDef::new(WebhookEndpoints::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(WebhookEndpoints::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_webhook_endpoints_organization")
                            .from(WebhookEndpoints::Table, WebhookEndpoints::OrganizationId)
                            .to(Organizations::Table, Organizations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_webhook_endpoints_user")
                            .from(WebhookEndpoints::Table, WebhookEndpoints::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_webhook_endpoints_organization_id")
                    .table(WebhookEndpoints::Table)
                    .col(WebhookEndpoints::OrganizationId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_webhook_endpoints_active")
                    .table(WebhookEndpoints::Table)
                    .col(WebhookEndpoints::Active)
                    .to_owned(),
            )
            .await?;

        // ========================================
        // WEBHOOK_EVENTS TABLE
        // ========================================
        manager
            .create_table(
                Table::create()
                    .table(WebhookEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WebhookEvents::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(WebhookEvents::EventType).string().not_null())
                    .col(ColumnDef::new(WebhookEvents::Payload).text().not_null())
                    .col(
                        ColumnDef::new(WebhookEvents::OrganizationId)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(WebhookEvents::UserId).integer().null())
                    .col(ColumnDef::new(WebhookEvents::RequestId).string().not_null())
                    .col(
                        ColumnDef::new(WebhookEvents::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_webhook_events_organization")
                            .from(WebhookEvents::Table, WebhookEvents::OrganizationId)
                            .to(Organizations::Table, Organizations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_webhook_events_organization_id")
                    .table(WebhookEvents::Table)
                    .col(WebhookEvents::OrganizationId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_webhook_events_event_type")
                    .table(WebhookEvents::Table)
                    .col(WebhookEvents::EventType)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_webhook_events_created_at")
                    .table(WebhookEvents::Table)
                    .col(WebhookEvents::CreatedAt)
                    .to_owned(),
            )
            .await?;

        // ========================================
        // WEBHOOK_DELIVERY_ATTEMPTS TABLE
        // ========================================
        manager
            .create_table(
                Table::create()
                    .table(WebhookDeliveryAttempts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WebhookDeliveryAttempts::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(WebhookDeliveryAttempts::WebhookId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WebhookDeliveryAttempts::EventId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WebhookDeliveryAttempts::AttemptNumber)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(ColumnDef::new(WebhookDeliveryAttempts::Url).string().not_null())
                    .col(
                        ColumnDef::new(WebhookDeliveryAttempts::StatusCode)
                            .integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(WebhookDeliveryAttempts::ResponseBody)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(WebhookDeliveryAttempts::ErrorMessage)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(WebhookDeliveryAttempts::DurationMs)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WebhookDeliveryAttempts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_webhook_delivery_attempts_webhook")
                            .from(
                                WebhookDeliveryAttempts::Table,
                                WebhookDeliveryAttempts::WebhookId,
                            )
                            .to(WebhookEndpoints::Table, WebhookEndpoints::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_webhook_delivery_attempts_event")
                            .from(
                                WebhookDeliveryAttempts::Table,
                                WebhookDeliveryAttempts::EventId,
                            )
                            .to(WebhookEvents::Table, WebhookEvents::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_webhook_delivery_attempts_webhook_id")
                    .table(WebhookDeliveryAttempts::Table)
                    .col(WebhookDeliveryAttempts::WebhookId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_webhook_delivery_attempts_event_id")
                    .table(WebhookDeliveryAttempts::Table)
                    .col(WebhookDeliveryAttempts::EventId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_webhook_delivery_attempts_created_at")
                    .table(WebhookDeliveryAttempts::Table)
                    .col(WebhookDeliveryAttempts::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_webhook_delivery_attempts_created_at")
                    .table(WebhookDeliveryAttempts::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_webhook_delivery_attempts_event_id")
                    .table(WebhookDeliveryAttempts::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_webhook_delivery_attempts_webhook_id")
                    .table(WebhookDeliveryAttempts::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(
                Table::drop()
                    .table(WebhookDeliveryAttempts::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_webhook_events_created_at")
                    .table(WebhookEvents::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_webhook_events_event_type")
                    .table(WebhookEvents::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_webhook_events_organization_id")
                    .table(WebhookEvents::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(WebhookEvents::Table).to_owned())
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_webhook_endpoints_active")
                    .table(WebhookEndpoints::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_webhook_endpoints_organization_id")
                    .table(WebhookEndpoints::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(WebhookEndpoints::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Organizations {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum WebhookEndpoints {
    Table,
    Id,
    OrganizationId,
    UserId,
    Name,
    Url,
    Secret,
    Events,
    Active,
    Headers,
    TimeoutMs,
    RetryCount,
    RetryDelayMs,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum WebhookEvents {
    Table,
    Id,
    EventType,
    Payload,
    OrganizationId,
    UserId,
    RequestId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum WebhookDeliveryAttempts {
    Table,
    Id,
    WebhookId,
    EventId,
    AttemptNumber,
    Url,
    StatusCode,
    ResponseBody,
    ErrorMessage,
    DurationMs,
    CreatedAt,
}
