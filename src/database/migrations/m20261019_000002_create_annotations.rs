use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Annotations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Annotations::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Annotations::ProjectId).integer().not_null())
                    .col(ColumnDef::new(Annotations::Seq).big_integer().not_null())
                    .col(ColumnDef::new(Annotations::PositionX).double().not_null())
                    .col(ColumnDef::new(Annotations::PositionY).double().not_null())
                    .col(ColumnDef::new(Annotations::PositionZ).double().not_null())
                    .col(ColumnDef::new(Annotations::Text).text().not_null())
                    .col(ColumnDef::new(Annotations::Author).string().not_null())
                    .col(ColumnDef::new(Annotations::CreatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_annotations_project_id")
                            .from(Annotations::Table, Annotations::ProjectId)
                            .to(Projects::Table, Projects::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // One entry per sequence number per project
        manager
            .create_index(
                Index::create()
                    .name("idx_annotations_project_seq")
                    .table(Annotations::Table)
                    .col(Annotations::ProjectId)
                    .col(Annotations::Seq)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Annotations::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Annotations {
    Table,
    Id,
    ProjectId,
    Seq,
    PositionX,
    PositionY,
    PositionZ,
    Text,
    Author,
    CreatedAt,
}

#[derive(Iden)]
enum Projects {
    Table,
    Id,
}
