// mercado_app/src/services/mod.rs

pub mod audit;
pub mod blob_store;
pub mod geo;
pub mod inventory;
pub mod mailer;
pub mod notifier;
pub mod order_thread;
pub mod order_view;
pub mod reputation;
pub mod secrets;
