use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ChatMessages::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ChatMessages::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ChatMessages::ProjectId).integer().not_null())
                    .col(ColumnDef::new(ChatMessages::Seq).big_integer().not_null())
                    .col(ColumnDef::new(ChatMessages::Author).string().not_null())
                    .col(ColumnDef::new(ChatMessages::Text).text().not_null())
                    .col(ColumnDef::new(ChatMessages::CreatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_chat_messages_project_id")
                            .from(ChatMessages::Table, ChatMessages::ProjectId)
                            .to(Projects::Table, Projects::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_chat_messages_project_seq")
                    .table(ChatMessages::Table)
                    .col(ChatMessages::ProjectId)
                    .col(ChatMessages::Seq)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ChatMessages::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum ChatMessages {
    Table,
    Id,
    ProjectId,
    Seq,
    Author,
    Text,
    CreatedAt,
}

#[derive(Iden)]
enum Projects {
    Table,
    Id,
}
