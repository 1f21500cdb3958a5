//! Append-only audit trail of subscription lifecycle transitions.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(schema_name = "public", table_name = "subscription_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,
    #[sea_orm(column_type = "Text")]
    pub subscription_id: String,
    /// Provider event that caused the transition
    #[sea_orm(column_type = "Text")]
    pub stripe_event_id: String,
    pub event_type: super::sea_orm_active_enums::SubscriptionEventType,
    #[sea_orm(column_type = "Double", nullable)]
    pub amount: Option<f64>,
    #[sea_orm(column_type = "Text", nullable)]
    pub currency: Option<String>,
    /// Raw provider object snapshot
    #[sea_orm(column_type = "JsonBinary")]
    pub payload: Json,
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::customer_subscription::Entity",
        from = "Column::SubscriptionId",
        to = "super::customer_subscription::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    CustomerSubscription,
}

impl Related<super::customer_subscription::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CustomerSubscription.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
