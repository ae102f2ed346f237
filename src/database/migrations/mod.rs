pub use sea_orm_migration::prelude::*;

mod m20261019_000001_create_projects;
mod m20261019_000002_create_annotations;
mod m20261019_000003_create_chat_messages;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261019_000001_create_projects::Migration),
            Box::new(m20261019_000002_create_annotations::Migration),
            Box::new(m20261019_000003_create_chat_messages::Migration),
        ]
    }
}
