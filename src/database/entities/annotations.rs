use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "annotations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub project_id: i32,
    pub seq: i64,
    pub position_x: f64,
    pub position_y: f64,
    pub position_z: f64,
    #[sea_orm(column_type = "Text")]
    pub text: String,
    pub author: String,
    pub created_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::projects::Entity",
        from = "Column::ProjectId",
        to = "super::projects::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Project,
}

impl Related<super::projects::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Project.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for crate::scene::Annotation {
    fn from(model: Model) -> Self {
        Self {
            seq: model.seq,
            position: [model.position_x, model.position_y, model.position_z],
            text: model.text,
            author: model.author,
            at: model.created_at,
        }
    }
}
