//! `SeaORM` entities for the tables the reconciler reads and writes.

pub mod prelude;

pub mod balance_transaction;
pub mod customer_subscription;
pub mod member_area;
pub mod member_area_student;
pub mod order;
pub mod product;
pub mod profile;
pub mod sea_orm_active_enums;
pub mod stripe_event;
pub mod subscription_event;
