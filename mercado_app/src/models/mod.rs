// mercado_app/src/models/mod.rs

//! Persisted entities touched by the fulfillment core.

pub mod claim;
pub mod message;
pub mod notification;
pub mod order;
pub mod order_item;
pub mod product;
pub mod review;
pub mod user;

pub use claim::{Claim, ClaimStatus, ClaimType};
pub use message::OrderMessage;
pub use notification::{Notification, Severity};
pub use order::{DeliveryMethod, DeliveryStatus, Order, OrderStatus, PaymentMethod, RefundStatus};
pub use order_item::OrderItem;
pub use product::Product;
pub use review::Review;
pub use user::{Actor, ReputationTier, Role, User};
