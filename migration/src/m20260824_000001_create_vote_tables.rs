use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Raw votes, one row per cast vote.
        manager
            .create_table(
                Table::create()
                    .table(Votes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Votes::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Votes::TargetType).string_len(64).not_null())
                    .col(ColumnDef::new(Votes::TargetId).big_integer().not_null())
                    .col(ColumnDef::new(Votes::Value).double().not_null())
                    .col(ColumnDef::new(Votes::ValueType).string_len(64).not_null())
                    .col(ColumnDef::new(Votes::Tag).string_len(64).not_null())
                    .col(ColumnDef::new(Votes::ActorId).big_integer().not_null())
                    // Client-identifying token (e.g. network address) for
                    // anonymous dedup; empty for identified actors.
                    .col(ColumnDef::new(Votes::Source).string_len(255).not_null())
                    .col(ColumnDef::new(Votes::Timestamp).big_integer().not_null())
                    .index(
                        Index::create()
                            .name("idx_votes_target")
                            .col(Votes::TargetType)
                            .col(Votes::TargetId),
                    )
                    // Watermark scans for deferred recalculation drivers.
                    .index(
                        Index::create()
                            .name("idx_votes_timestamp")
                            .col(Votes::Timestamp),
                    )
                    // Rollover deletes scoped by actor within a tag.
                    .index(
                        Index::create()
                            .name("idx_votes_actor_scope")
                            .col(Votes::TargetType)
                            .col(Votes::TargetId)
                            .col(Votes::Tag)
                            .col(Votes::ActorId),
                    )
                    .index(
                        Index::create()
                            .name("idx_votes_source_scope")
                            .col(Votes::TargetType)
                            .col(Votes::TargetId)
                            .col(Votes::Tag)
                            .col(Votes::Source),
                    )
                    .to_owned(),
            )
            .await?;

        // Cached aggregate results, destructively replaced per target.
        manager
            .create_table(
                Table::create()
                    .table(VoteResults::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(VoteResults::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(VoteResults::TargetType)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VoteResults::TargetId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(VoteResults::Value).double().not_null())
                    .col(
                        ColumnDef::new(VoteResults::ValueType)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(ColumnDef::new(VoteResults::Tag).string_len(64).not_null())
                    .col(
                        ColumnDef::new(VoteResults::Function)
                            .string_len(128)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VoteResults::Timestamp)
                            .big_integer()
                            .not_null(),
                    )
                    .index(
                        Index::create()
                            .name("idx_vote_results_target")
                            .col(VoteResults::TargetType)
                            .col(VoteResults::TargetId),
                    )
                    .index(
                        Index::create()
                            .name("idx_vote_results_unique_function")
                            .col(VoteResults::TargetType)
                            .col(VoteResults::TargetId)
                            .col(VoteResults::Tag)
                            .col(VoteResults::ValueType)
                            .col(VoteResults::Function)
                            .unique(),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(VoteResults::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Votes::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Votes {
    Table,
    Id,
    TargetType,
    TargetId,
    Value,
    ValueType,
    Tag,
    ActorId,
    Source,
    Timestamp,
}

#[derive(DeriveIden)]
enum VoteResults {
    Table,
    Id,
    TargetType,
    TargetId,
    Value,
    ValueType,
    Tag,
    Function,
    Timestamp,
}
