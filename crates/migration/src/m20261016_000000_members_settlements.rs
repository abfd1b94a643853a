//! Group membership and settling of splits.
//!
//! - `group_members`: who belongs to a group, and with which role
//! - `expense_splits.is_paid`: whether a share has been paid back
//! - `settlements`: a payment from a split's debtor to the expense's payer

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
enum GroupMembers {
    Table,
    GroupId,
    UserId,
    Role,
    JoinedAt,
}

#[derive(Iden)]
enum ExpenseSplits {
    Table,
    Id,
    IsPaid,
}

#[derive(Iden)]
enum Settlements {
    Table,
    Id,
    SplitId,
    FromId,
    ToId,
    AmountMinor,
    PaidAt,
}

#[derive(Iden)]
enum Groups {
    Table,
    Id,
}

#[derive(Iden)]
enum Users {
    Table,
    Id,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(GroupMembers::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(GroupMembers::GroupId).string().not_null())
                    .col(ColumnDef::new(GroupMembers::UserId).string().not_null())
                    .col(ColumnDef::new(GroupMembers::Role).string().not_null())
                    .col(ColumnDef::new(GroupMembers::JoinedAt).timestamp().not_null())
                    .primary_key(
                        Index::create()
                            .col(GroupMembers::GroupId)
                            .col(GroupMembers::UserId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-group_members-group_id")
                            .from(GroupMembers::Table, GroupMembers::GroupId)
                            .to(Groups::Table, Groups::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-group_members-user_id")
                            .from(GroupMembers::Table, GroupMembers::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-group_members-user_id")
                    .table(GroupMembers::Table)
                    .col(GroupMembers::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .alter_table(
                Table::alter()
                    .table(ExpenseSplits::Table)
                    .add_column(
                        ColumnDef::new(ExpenseSplits::IsPaid)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Settlements::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Settlements::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Settlements::SplitId).string().not_null())
                    .col(ColumnDef::new(Settlements::FromId).string().not_null())
                    .col(ColumnDef::new(Settlements::ToId).string().not_null())
                    .col(
                        ColumnDef::new(Settlements::AmountMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Settlements::PaidAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-settlements-split_id")
                            .from(Settlements::Table, Settlements::SplitId)
                            .to(ExpenseSplits::Table, ExpenseSplits::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-settlements-from_id")
                            .from(Settlements::Table, Settlements::FromId)
                            .to(Users::Table, Users::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-settlements-to_id")
                            .from(Settlements::Table, Settlements::ToId)
                            .to(Users::Table, Users::Id),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Settlements::Table).to_owned())
            .await?;
        manager
            .alter_table(
                Table::alter()
                    .table(ExpenseSplits::Table)
                    .drop_column(ExpenseSplits::IsPaid)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(GroupMembers::Table).to_owned())
            .await?;
        Ok(())
    }
}
