use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum Deal {
    Table,
    Id,
    Title,
    Contact,
    Stage,
    Probability,
    Value,
    Attributes,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum DealStageHistory {
    Table,
    Id,
    DealId,
    FromStage,
    ToStage,
    Probability,
    ChangedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Deal::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Deal::Id)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Deal::Title).string().not_null())
                    .col(ColumnDef::new(Deal::Contact).string())
                    .col(ColumnDef::new(Deal::Stage).string_len(64).not_null())
                    .col(
                        ColumnDef::new(Deal::Probability)
                            .small_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Deal::Value).big_integer())
                    .col(ColumnDef::new(Deal::Attributes).json().not_null())
                    .col(
                        ColumnDef::new(Deal::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Deal::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_deal_stage")
                    .table(Deal::Table)
                    .col(Deal::Stage)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DealStageHistory::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DealStageHistory::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(DealStageHistory::DealId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(ColumnDef::new(DealStageHistory::FromStage).string_len(64))
                    .col(
                        ColumnDef::new(DealStageHistory::ToStage)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DealStageHistory::Probability)
                            .small_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DealStageHistory::ChangedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_deal_stage_history_deal")
                            .from(DealStageHistory::Table, DealStageHistory::DealId)
                            .to(Deal::Table, Deal::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_deal_stage_history_deal")
                    .table(DealStageHistory::Table)
                    .col(DealStageHistory::DealId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DealStageHistory::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Deal::Table).to_owned())
            .await
    }
}
