//! `SeaORM` Entity for students enrolled in a member area

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(schema_name = "public", table_name = "member_area_students")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub member_area_id: String,
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub student_email: String,
    #[sea_orm(column_type = "Text")]
    pub student_name: String,
    /// blake3 hex digest of the temporary password
    #[sea_orm(column_type = "Text")]
    pub credential_hash: String,
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::member_area::Entity",
        from = "Column::MemberAreaId",
        to = "super::member_area::Column::Id"
    )]
    MemberArea,
}

impl Related<super::member_area::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MemberArea.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
