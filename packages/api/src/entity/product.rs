//! `SeaORM` Entity for products

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(schema_name = "public", table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,
    #[sea_orm(column_type = "Text")]
    pub name: String,
    /// Formatted list price, e.g. "5,000 KZ"
    #[sea_orm(column_type = "Text")]
    pub price: String,
    /// Owning seller
    #[sea_orm(column_type = "Text")]
    pub user_id: String,
    /// Completed sales counter, only ever incremented
    #[sea_orm(default_value = 0)]
    pub sales: i32,
    /// Access-granting area unlocked by a purchase
    #[sea_orm(column_type = "Text", nullable)]
    pub member_area_id: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order::Entity")]
    Order,
    #[sea_orm(has_many = "super::customer_subscription::Entity")]
    CustomerSubscription,
    #[sea_orm(
        belongs_to = "super::member_area::Entity",
        from = "Column::MemberAreaId",
        to = "super::member_area::Column::Id",
        on_update = "Cascade",
        on_delete = "SetNull"
    )]
    MemberArea,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl Related<super::customer_subscription::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CustomerSubscription.def()
    }
}

impl Related<super::member_area::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MemberArea.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
