//! `SeaORM` Entity for checkout orders

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One checkout attempt. Created `pending` by the checkout flow and resolved by the
/// payment reconciler.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(schema_name = "public", table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,
    /// External order identifier carried in payment metadata
    #[sea_orm(column_type = "Text", unique)]
    pub order_id: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub product_id: Option<String>,
    /// Seller owning the product at checkout time
    #[sea_orm(column_type = "Text", nullable)]
    pub user_id: Option<String>,
    #[sea_orm(column_type = "Text")]
    pub customer_email: String,
    #[sea_orm(column_type = "Text")]
    pub customer_name: String,
    /// Decimal amount rendered as text
    #[sea_orm(column_type = "Text")]
    pub amount: String,
    #[sea_orm(column_type = "Text")]
    pub currency: String,
    #[sea_orm(column_type = "Double", nullable)]
    pub seller_commission: Option<f64>,
    pub status: super::sea_orm_active_enums::OrderStatus,
    #[sea_orm(column_type = "Text", nullable)]
    pub cancellation_reason: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub affiliate_code: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub payment_method: Option<String>,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub order_bump_data: Option<Json>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id",
        on_update = "Cascade",
        on_delete = "SetNull"
    )]
    Product,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
