//! `SeaORM` Entity for recurring-billing subscriptions

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(schema_name = "public", table_name = "customer_subscriptions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,
    /// Upsert key, one row per provider subscription
    #[sea_orm(column_type = "Text", unique)]
    pub stripe_subscription_id: String,
    #[sea_orm(column_type = "Text")]
    pub stripe_customer_id: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub product_id: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub customer_email: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub customer_name: Option<String>,
    /// Provider status string (`active`, `past_due`, `canceled`, ...)
    #[sea_orm(column_type = "Text")]
    pub status: String,
    #[sea_orm(nullable)]
    pub current_period_start: Option<DateTime>,
    #[sea_orm(nullable)]
    pub current_period_end: Option<DateTime>,
    #[sea_orm(nullable)]
    pub trial_start: Option<DateTime>,
    #[sea_orm(nullable)]
    pub trial_end: Option<DateTime>,
    #[sea_orm(default_value = false)]
    pub cancel_at_period_end: bool,
    #[sea_orm(nullable)]
    pub canceled_at: Option<DateTime>,
    #[sea_orm(column_type = "Text")]
    pub renewal_type: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub metadata: Json,
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
    #[sea_orm(has_many = "super::subscription_event::Entity")]
    SubscriptionEvent,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl Related<super::subscription_event::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SubscriptionEvent.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
