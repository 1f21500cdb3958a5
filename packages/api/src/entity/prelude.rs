pub use super::balance_transaction::Entity as BalanceTransaction;
pub use super::customer_subscription::Entity as CustomerSubscription;
pub use super::member_area::Entity as MemberArea;
pub use super::member_area_student::Entity as MemberAreaStudent;
pub use super::order::Entity as Order;
pub use super::product::Entity as Product;
pub use super::profile::Entity as Profile;
pub use super::stripe_event::Entity as StripeEvent;
pub use super::subscription_event::Entity as SubscriptionEvent;
